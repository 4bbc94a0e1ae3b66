//! Serialized event loop
//!
//! Every input the watch reacts to, whether a camera frame, a perception
//! result, a timer or a driver command, arrives as an [`Input`] on one
//! queue and is handled to completion before the next one is looked at.

use std::sync::Arc;

use detector::{DetectorConfig, DetectorEvent, DetectorPhase, DetectorStateMachine, ObservationOverlay};
use perception::{Completion, PerceptionGateway};
use serde::Serialize;
use sign_text::SpeedLimit;
use speed_limit::{LifecycleConfig, LifecycleEvent, LifecycleTimer, SpeedLimitLifecycle};
use timer::Scheduler;
use tokio::sync::mpsc;
use tracing::{debug, info};
use video_frame::VideoFrame;

/// Everything that can happen to the watch
#[derive(Debug)]
pub enum Input {
    Frame(Arc<VideoFrame>),
    Perception(Completion),
    Timer(LifecycleTimer),
    /// Driver dismissed the displayed value
    Dismiss,
    /// Camera view covered; stop looking for signs
    Suspend,
    /// Camera view visible again
    Resume,
    Shutdown,
}

impl From<Completion> for Input {
    fn from(completion: Completion) -> Self {
        Input::Perception(completion)
    }
}

impl From<LifecycleTimer> for Input {
    fn from(timer: LifecycleTimer) -> Self {
        Input::Timer(timer)
    }
}

/// Events for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PresentationEvent {
    ShowSpeedLimit { value: SpeedLimit },
    HideSpeedLimit,
    ObservationRectangle { overlay: Option<ObservationOverlay> },
    GeneralError { reason: String },
}

/// Owns the detector and the lifecycle manager and feeds them inputs in order
pub struct Engine<G, S> {
    detector: DetectorStateMachine,
    lifecycle: SpeedLimitLifecycle<S>,
    gateway: G,
}

impl<G, S> Engine<G, S>
where
    G: PerceptionGateway,
    S: Scheduler<LifecycleTimer>,
{
    pub fn new(
        detector_config: DetectorConfig,
        lifecycle_config: LifecycleConfig,
        gateway: G,
        scheduler: S,
    ) -> Self {
        Self {
            detector: DetectorStateMachine::new(detector_config),
            lifecycle: SpeedLimitLifecycle::new(lifecycle_config, scheduler),
            gateway,
        }
    }

    /// Start looking for signs
    pub fn start(&mut self) {
        if self.detector.wake() {
            info!("Sign watch started");
        }
    }

    pub fn phase(&self) -> DetectorPhase {
        self.detector.phase()
    }

    pub fn detector(&self) -> &DetectorStateMachine {
        &self.detector
    }

    pub fn lifecycle(&self) -> &SpeedLimitLifecycle<S> {
        &self.lifecycle
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        self.lifecycle.scheduler_mut()
    }

    /// Handle one input to completion
    pub fn handle(&mut self, input: Input) -> Vec<PresentationEvent> {
        let mut out = Vec::new();

        match input {
            Input::Frame(frame) => {
                let events = self.detector.on_frame(frame, &mut self.gateway);
                self.forward_detector(events, &mut out);
            }
            Input::Perception(completion) => {
                let events = self.detector.on_completion(completion, &mut self.gateway);
                self.forward_detector(events, &mut out);
            }
            Input::Timer(timer) => {
                let events = self.lifecycle.on_timer(timer);
                self.forward_lifecycle(events, &mut out);
            }
            Input::Dismiss => {
                info!("Speed limit dismissed");
                let events = self.lifecycle.cancel_manual();
                self.forward_lifecycle(events, &mut out);
                let events = self.detector.suspend();
                self.forward_detector(events, &mut out);
                self.lifecycle.schedule_resume();
            }
            Input::Suspend => {
                self.lifecycle.cancel_resume();
                let events = self.detector.suspend();
                self.forward_detector(events, &mut out);
            }
            Input::Resume => {
                self.lifecycle.cancel_resume();
                self.detector.wake();
            }
            Input::Shutdown => {}
        }

        out
    }

    /// Process inputs until `Shutdown` or until every sender is gone
    pub async fn run(
        mut self,
        mut inbox: mpsc::Receiver<Input>,
        outbox: mpsc::Sender<PresentationEvent>,
    ) {
        self.start();

        while let Some(input) = inbox.recv().await {
            if matches!(input, Input::Shutdown) {
                info!("Sign watch shutting down");
                break;
            }

            for event in self.handle(input) {
                if outbox.send(event).await.is_err() {
                    debug!("Presentation receiver dropped");
                    return;
                }
            }
        }
    }

    fn forward_detector(&mut self, events: Vec<DetectorEvent>, out: &mut Vec<PresentationEvent>) {
        for event in events {
            match event {
                DetectorEvent::SpeedLimitAccepted(value) => {
                    let events = self.lifecycle.accept(value);
                    self.forward_lifecycle(events, out);
                    self.lifecycle.schedule_resume();
                }
                DetectorEvent::ObservationRectangle(overlay) => {
                    out.push(PresentationEvent::ObservationRectangle { overlay });
                }
                DetectorEvent::GeneralError(reason) => {
                    out.push(PresentationEvent::GeneralError { reason });
                }
            }
        }
    }

    fn forward_lifecycle(&mut self, events: Vec<LifecycleEvent>, out: &mut Vec<PresentationEvent>) {
        for event in events {
            match event {
                LifecycleEvent::Show(value) => out.push(PresentationEvent::ShowSpeedLimit { value }),
                LifecycleEvent::Hide => out.push(PresentationEvent::HideSpeedLimit),
                LifecycleEvent::ResumeDetection => {
                    if self.detector.wake() {
                        debug!("Sleep over, detecting again");
                    }
                }
            }
        }
    }
}
