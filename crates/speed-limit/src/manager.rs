//! Lifecycle Manager Implementation

use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use sign_text::SpeedLimit;
use timer::{Scheduler, TimerHandle};
use tracing::{debug, info};

/// Lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Detector pause after a sign was passed (seconds)
    pub sleep_seconds: u64,
    /// How long an accepted value stays displayed (seconds)
    pub validity_seconds: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sleep_seconds: 3,
            validity_seconds: 180, // 3 minutes
        }
    }
}

impl LifecycleConfig {
    pub fn sleep_duration(&self) -> Duration {
        Duration::from_secs(self.sleep_seconds)
    }

    pub fn validity_duration(&self) -> Duration {
        Duration::from_secs(self.validity_seconds)
    }
}

/// Timer messages, each tagged with the generation it was armed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleTimer {
    Resume(u64),
    Expire(u64),
}

/// What the lifecycle asks of the outside world
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Show(SpeedLimit),
    Hide,
    /// The detector's sleep period is over
    ResumeDetection,
}

/// A timer currently armed
#[derive(Debug, Clone, Copy)]
struct Armed {
    token: u64,
    handle: TimerHandle,
}

/// Manages the displayed speed limit and its timers
pub struct SpeedLimitLifecycle<S> {
    config: LifecycleConfig,
    scheduler: S,
    displayed: Option<SpeedLimit>,
    expiry: Option<Armed>,
    resume: Option<Armed>,
    next_token: u64,
}

impl<S: Scheduler<LifecycleTimer>> SpeedLimitLifecycle<S> {
    /// Create a lifecycle manager with nothing displayed
    pub fn new(config: LifecycleConfig, scheduler: S) -> Self {
        info!("Creating speed-limit lifecycle with config: {:?}", config);
        Self {
            config,
            scheduler,
            displayed: None,
            expiry: None,
            resume: None,
            next_token: 0,
        }
    }

    /// Display `value`, replacing any shown value, and restart its validity period
    pub fn accept(&mut self, value: SpeedLimit) -> Vec<LifecycleEvent> {
        if let Some(previous) = self.displayed.replace(value) {
            debug!("Replacing displayed speed limit {} with {}", previous, value);
        }

        if let Some(armed) = self.expiry.take() {
            self.scheduler.cancel(armed.handle);
        }
        let token = self.next_token();
        let handle = self
            .scheduler
            .schedule(self.config.validity_duration(), LifecycleTimer::Expire(token));
        self.expiry = Some(Armed { token, handle });

        info!(
            "Showing speed limit {} for {}s",
            value, self.config.validity_seconds
        );
        vec![LifecycleEvent::Show(value)]
    }

    /// Arm the detector's resume after its sleep period, superseding any earlier one
    pub fn schedule_resume(&mut self) {
        self.cancel_resume();
        let token = self.next_token();
        let handle = self
            .scheduler
            .schedule(self.config.sleep_duration(), LifecycleTimer::Resume(token));
        self.resume = Some(Armed { token, handle });
        debug!("Detector resumes in {}s", self.config.sleep_seconds);
    }

    /// Drop a pending resume
    pub fn cancel_resume(&mut self) {
        if let Some(armed) = self.resume.take() {
            self.scheduler.cancel(armed.handle);
        }
    }

    /// Handle a fired timer. Superseded firings produce nothing.
    pub fn on_timer(&mut self, timer: LifecycleTimer) -> Vec<LifecycleEvent> {
        match timer {
            LifecycleTimer::Expire(token) if self.expiry.is_some_and(|a| a.token == token) => {
                counter!("speedsign_speed_limits_expired_total").increment(1);
                self.cancel_expired()
            }
            LifecycleTimer::Resume(token) if self.resume.is_some_and(|a| a.token == token) => {
                self.resume = None;
                vec![LifecycleEvent::ResumeDetection]
            }
            stale => {
                debug!("Ignoring superseded timer {:?}", stale);
                Vec::new()
            }
        }
    }

    /// Expiry: clear the displayed value unconditionally
    pub fn cancel_expired(&mut self) -> Vec<LifecycleEvent> {
        self.expiry = None;
        self.hide()
    }

    /// Driver dismissal: stop the expiry timer and clear the value now
    pub fn cancel_manual(&mut self) -> Vec<LifecycleEvent> {
        if let Some(armed) = self.expiry.take() {
            self.scheduler.cancel(armed.handle);
        }
        self.hide()
    }

    /// Value currently shown
    pub fn displayed(&self) -> Option<SpeedLimit> {
        self.displayed
    }

    pub fn expiry_pending(&self) -> bool {
        self.expiry.is_some()
    }

    pub fn resume_pending(&self) -> bool {
        self.resume.is_some()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    fn hide(&mut self) -> Vec<LifecycleEvent> {
        match self.displayed.take() {
            Some(value) => {
                info!("Hiding speed limit {}", value);
                vec![LifecycleEvent::Hide]
            }
            None => Vec::new(),
        }
    }

    fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timer::ManualScheduler;

    fn limit(token: &str) -> SpeedLimit {
        SpeedLimit::from_token(token).unwrap()
    }

    fn lifecycle() -> SpeedLimitLifecycle<ManualScheduler<LifecycleTimer>> {
        SpeedLimitLifecycle::new(LifecycleConfig::default(), ManualScheduler::new())
    }

    /// Advance the virtual clock and feed every fired timer back
    fn advance(
        lifecycle: &mut SpeedLimitLifecycle<ManualScheduler<LifecycleTimer>>,
        seconds: u64,
    ) -> Vec<LifecycleEvent> {
        let fired = lifecycle
            .scheduler_mut()
            .advance(Duration::from_secs(seconds));
        fired
            .into_iter()
            .flat_map(|timer| lifecycle.on_timer(timer))
            .collect()
    }

    #[test]
    fn test_accepted_value_expires() {
        let mut lifecycle = lifecycle();
        assert_eq!(lifecycle.accept(limit("50")), vec![LifecycleEvent::Show(limit("50"))]);
        assert!(lifecycle.expiry_pending());

        assert!(advance(&mut lifecycle, 179).is_empty());
        assert_eq!(advance(&mut lifecycle, 1), vec![LifecycleEvent::Hide]);
        assert_eq!(lifecycle.displayed(), None);
        assert!(!lifecycle.expiry_pending());
    }

    #[test]
    fn test_new_value_supersedes_expiry() {
        let mut lifecycle = lifecycle();
        lifecycle.accept(limit("80"));
        advance(&mut lifecycle, 100);

        lifecycle.accept(limit("60"));
        assert_eq!(lifecycle.displayed(), Some(limit("60")));
        assert_eq!(lifecycle.scheduler().pending(), 1);

        // The "80" timer would have fired here
        assert!(advance(&mut lifecycle, 80).is_empty());
        assert_eq!(lifecycle.displayed(), Some(limit("60")));

        // Fresh full validity period for "60"
        assert!(advance(&mut lifecycle, 99).is_empty());
        assert_eq!(advance(&mut lifecycle, 1), vec![LifecycleEvent::Hide]);
    }

    #[test]
    fn test_superseded_firing_in_flight_is_ignored() {
        let mut lifecycle = lifecycle();
        lifecycle.accept(limit("80"));

        // Timer fired but its message has not been handled yet
        let fired = lifecycle.scheduler_mut().advance(Duration::from_secs(180));
        assert_eq!(fired.len(), 1);

        lifecycle.accept(limit("70"));
        assert!(lifecycle.on_timer(fired[0]).is_empty());
        assert_eq!(lifecycle.displayed(), Some(limit("70")));
        assert!(lifecycle.expiry_pending());
    }

    #[test]
    fn test_manual_cancel() {
        let mut lifecycle = lifecycle();
        lifecycle.accept(limit("30"));

        assert_eq!(lifecycle.cancel_manual(), vec![LifecycleEvent::Hide]);
        assert_eq!(lifecycle.scheduler().pending(), 0);
        assert!(lifecycle.cancel_manual().is_empty());
        assert!(advance(&mut lifecycle, 200).is_empty());
    }

    #[test]
    fn test_expiry_without_display_is_silent() {
        let mut lifecycle = lifecycle();
        assert!(lifecycle.cancel_expired().is_empty());
    }

    #[test]
    fn test_resume_after_sleep() {
        let mut lifecycle = lifecycle();
        lifecycle.schedule_resume();
        assert!(advance(&mut lifecycle, 2).is_empty());
        assert_eq!(advance(&mut lifecycle, 1), vec![LifecycleEvent::ResumeDetection]);
        assert!(!lifecycle.resume_pending());
    }

    #[test]
    fn test_rescheduled_resume_fires_once() {
        let mut lifecycle = lifecycle();
        lifecycle.schedule_resume();
        advance(&mut lifecycle, 2);
        lifecycle.schedule_resume();

        assert!(advance(&mut lifecycle, 2).is_empty());
        assert_eq!(advance(&mut lifecycle, 1), vec![LifecycleEvent::ResumeDetection]);
        assert!(advance(&mut lifecycle, 10).is_empty());
    }

    #[test]
    fn test_cancelled_resume_never_fires() {
        let mut lifecycle = lifecycle();
        lifecycle.schedule_resume();
        lifecycle.cancel_resume();
        assert!(advance(&mut lifecycle, 5).is_empty());
        assert!(lifecycle.on_timer(LifecycleTimer::Resume(1)).is_empty());
    }
}
