//! Detector state machine

use std::sync::Arc;

use metrics::counter;
use perception::{
    CallId, Capability, Completion, ObjectObservation, PerceptionError, PerceptionGateway,
    TextCandidate, TrackSequence,
};
use serde::{Deserialize, Serialize};
use sign_text::SpeedLimit;
use tracing::{debug, info, warn};
use video_frame::{BoundingBox, VideoFrame};

use crate::guard::CallGuard;
use crate::session::TrackingSession;
use crate::DetectorConfig;

/// Detector state, each variant carrying only the data valid in it
#[derive(Debug)]
pub enum DetectorState {
    /// Frames are ignored
    Sleeping,
    /// Looking for a sign in full frames
    Detecting,
    /// Following a detected sign
    Tracking(TrackingSession),
}

/// Data-free view of [`DetectorState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorPhase {
    Sleeping,
    Detecting,
    Tracking,
}

/// Tracked region for the debug overlay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationOverlay {
    pub bounding_box: BoundingBox,
    /// A speed limit has already been read from this sign
    pub confirmed: bool,
}

/// Events produced by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    /// A sign was passed and its value should be shown
    SpeedLimitAccepted(SpeedLimit),

    /// Tracked region moved (`Some`) or tracking ended (`None`)
    ObservationRectangle(Option<ObservationOverlay>),

    /// A perception call could not be started
    GeneralError(String),
}

/// What a tracking frame does about recognition
enum ReadStep {
    /// Value known or a read is still in flight
    Skip,
    Issue(BoundingBox),
    Exhausted,
}

/// Orchestrates detection, tracking and recognition frame by frame
pub struct DetectorStateMachine {
    config: DetectorConfig,
    state: DetectorState,
    /// Bumped on every transition; results issued in an older epoch are stale
    epoch: u64,
    /// Frames seen, the clock for giving up on lost calls
    frames: u64,
    next_call: u64,
    detection: CallGuard<Arc<VideoFrame>>,
    tracking: CallGuard<()>,
    recognition: CallGuard<()>,
}

impl DetectorStateMachine {
    /// Create a sleeping state machine
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: DetectorState::Sleeping,
            epoch: 0,
            frames: 0,
            next_call: 0,
            detection: CallGuard::new(Capability::Detector),
            tracking: CallGuard::new(Capability::Tracker),
            recognition: CallGuard::new(Capability::Recognizer),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn phase(&self) -> DetectorPhase {
        match self.state {
            DetectorState::Sleeping => DetectorPhase::Sleeping,
            DetectorState::Detecting => DetectorPhase::Detecting,
            DetectorState::Tracking(_) => DetectorPhase::Tracking,
        }
    }

    /// Current tracking session, only while tracking
    pub fn session(&self) -> Option<&TrackingSession> {
        match &self.state {
            DetectorState::Tracking(session) => Some(session),
            _ => None,
        }
    }

    /// Whether a call to `capability` is in flight
    pub fn is_outstanding(&self, capability: Capability) -> bool {
        match capability {
            Capability::Detector => self.detection.is_busy(),
            Capability::Tracker => self.tracking.is_busy(),
            Capability::Recognizer => self.recognition.is_busy(),
        }
    }

    /// Leave Sleeping for Detecting. Returns `false` if not sleeping.
    pub fn wake(&mut self) -> bool {
        if self.phase() != DetectorPhase::Sleeping {
            return false;
        }
        let mut events = Vec::new();
        self.transition(DetectorState::Detecting, &mut events);
        true
    }

    /// Go to sleep without scheduling a return, dropping any session
    pub fn suspend(&mut self) -> Vec<DetectorEvent> {
        let mut events = Vec::new();
        if self.phase() != DetectorPhase::Sleeping {
            self.transition(DetectorState::Sleeping, &mut events);
        }
        events
    }

    /// Process one camera frame
    pub fn on_frame(
        &mut self,
        frame: Arc<VideoFrame>,
        gateway: &mut dyn PerceptionGateway,
    ) -> Vec<DetectorEvent> {
        let mut events = Vec::new();
        self.frames += 1;
        self.expire_lost_calls(&mut events);

        match self.phase() {
            DetectorPhase::Sleeping => {}
            DetectorPhase::Detecting => self.issue_detection(frame, gateway, &mut events),
            DetectorPhase::Tracking => self.advance_tracking(frame, gateway, &mut events),
        }

        counter!("speedsign_frames_processed_total").increment(1);
        events
    }

    /// Process the result of a previously issued perception call
    pub fn on_completion(
        &mut self,
        completion: Completion,
        gateway: &mut dyn PerceptionGateway,
    ) -> Vec<DetectorEvent> {
        let mut events = Vec::new();

        match completion {
            Completion::Detected { call, result } => {
                self.on_detection(call, result, gateway, &mut events)
            }
            Completion::Tracked {
                call,
                sequence,
                result,
            } => self.on_tracking(call, sequence, result, &mut events),
            Completion::Recognized { call, result } => self.on_recognition(call, result),
        }

        events
    }

    fn issue_detection(
        &mut self,
        frame: Arc<VideoFrame>,
        gateway: &mut dyn PerceptionGateway,
        events: &mut Vec<DetectorEvent>,
    ) {
        if self.detection.is_busy() {
            return;
        }

        let call = self.next_call_id();
        match gateway.detect(call, Arc::clone(&frame)) {
            Ok(()) => {
                self.detection.arm(call, self.epoch, self.frames, frame);
                counter!("speedsign_detections_issued_total").increment(1);
            }
            Err(e) => {
                // Stay in Detecting, the next frame tries again
                warn!("Detection not started: {}", e);
                events.push(DetectorEvent::GeneralError(e.to_string()));
            }
        }
    }

    fn advance_tracking(
        &mut self,
        frame: Arc<VideoFrame>,
        gateway: &mut dyn PerceptionGateway,
        events: &mut Vec<DetectorEvent>,
    ) {
        let max_retries = self.config.max_recognition_attempts.saturating_sub(1);

        let step = match &self.state {
            DetectorState::Tracking(session) if session.upcoming.is_none() => {
                if session.first_read_issued && session.attempts >= max_retries {
                    ReadStep::Exhausted
                } else if self.recognition.is_busy() {
                    ReadStep::Skip
                } else {
                    ReadStep::Issue(session.observation.bounding_box)
                }
            }
            _ => ReadStep::Skip,
        };

        match step {
            ReadStep::Exhausted => {
                info!("No speed limit read after {} attempts, back to detection", max_retries + 1);
                counter!("speedsign_recognition_exhausted_total").increment(1);
                self.transition(DetectorState::Detecting, events);
                return;
            }
            ReadStep::Issue(region) => {
                if !self.issue_recognition(Arc::clone(&frame), region, gateway, events) {
                    return;
                }
            }
            ReadStep::Skip => {}
        }

        if self.tracking.is_busy() {
            return;
        }

        let (sequence, reference) = match &mut self.state {
            DetectorState::Tracking(session) => (session.sequence.take(), session.observation),
            _ => return,
        };

        let sequence = match sequence {
            Some(sequence) => sequence,
            None => match gateway.begin_tracking() {
                Ok(sequence) => {
                    debug!("Opened tracker sequence for epoch {}", self.epoch);
                    sequence
                }
                Err(e) => {
                    self.fail_tracking(e, events);
                    return;
                }
            },
        };

        let call = self.next_call_id();
        match gateway.track(call, sequence, frame, reference) {
            Ok(()) => self.tracking.arm(call, self.epoch, self.frames, ()),
            Err(e) => self.fail_tracking(e, events),
        }
    }

    /// Issue a recognition call for the current session. Every read after
    /// the first counts as a retry. On failure the session is abandoned and
    /// `false` returned.
    fn issue_recognition(
        &mut self,
        frame: Arc<VideoFrame>,
        region: BoundingBox,
        gateway: &mut dyn PerceptionGateway,
        events: &mut Vec<DetectorEvent>,
    ) -> bool {
        let call = self.next_call_id();
        match gateway.recognize(call, frame, region) {
            Ok(()) => {
                self.recognition.arm(call, self.epoch, self.frames, ());
                counter!("speedsign_recognition_attempts_total").increment(1);
                if let DetectorState::Tracking(session) = &mut self.state {
                    if session.first_read_issued {
                        session.attempts += 1;
                    } else {
                        session.first_read_issued = true;
                    }
                }
                true
            }
            Err(e) => {
                self.fail_tracking(e, events);
                false
            }
        }
    }

    fn fail_tracking(&mut self, error: PerceptionError, events: &mut Vec<DetectorEvent>) {
        warn!("Tracking abandoned: {}", error);
        events.push(DetectorEvent::GeneralError(error.to_string()));
        self.transition(DetectorState::Detecting, events);
    }

    fn on_detection(
        &mut self,
        call: CallId,
        result: Result<Vec<ObjectObservation>, PerceptionError>,
        gateway: &mut dyn PerceptionGateway,
        events: &mut Vec<DetectorEvent>,
    ) {
        let Some(outstanding) = self.detection.settle(call) else {
            self.discard(Capability::Detector, call);
            return;
        };
        if outstanding.epoch != self.epoch || self.phase() != DetectorPhase::Detecting {
            self.discard(Capability::Detector, call);
            return;
        }
        let frame = outstanding.context;

        let observations = match result {
            Ok(observations) => observations,
            Err(e) => {
                warn!("Detection {} failed: {}", call, e);
                return;
            }
        };

        let Some(best) = self.select_candidate(&observations, &frame) else {
            debug!("No qualifying sign among {} detections", observations.len());
            return;
        };

        info!(
            "Sign detected (confidence {:.2}), tracking",
            best.confidence
        );
        self.transition(DetectorState::Tracking(TrackingSession::new(best)), events);

        // A read left over from an abandoned session still holds the recognizer,
        // the first read then goes out with the next frame
        if !self.recognition.is_busy() {
            self.issue_recognition(frame, best.bounding_box, gateway, events);
        }
    }

    /// Highest-confidence qualifying observation, first one wins ties
    fn select_candidate(
        &self,
        observations: &[ObjectObservation],
        frame: &VideoFrame,
    ) -> Option<ObjectObservation> {
        observations
            .iter()
            .filter(|o| self.qualifies(o, frame))
            .fold(None, |best: Option<&ObjectObservation>, candidate| match best {
                Some(best) if best.confidence >= candidate.confidence => Some(best),
                _ => Some(candidate),
            })
            .copied()
    }

    fn qualifies(&self, observation: &ObjectObservation, frame: &VideoFrame) -> bool {
        let bbox = &observation.bounding_box;
        let aspect = bbox.pixel_aspect_ratio(frame.width, frame.height);

        observation.confidence >= self.config.detection_confidence
            && bbox.height() >= self.config.minimum_height
            && (aspect - 1.0).abs() <= self.config.max_aspect_ratio_deviation
    }

    fn on_tracking(
        &mut self,
        call: CallId,
        sequence: Option<Box<dyn TrackSequence>>,
        result: Result<Vec<ObjectObservation>, PerceptionError>,
        events: &mut Vec<DetectorEvent>,
    ) {
        let Some(outstanding) = self.tracking.settle(call) else {
            self.discard(Capability::Tracker, call);
            return;
        };
        if outstanding.epoch != self.epoch {
            self.discard(Capability::Tracker, call);
            return;
        }
        let Some(upcoming) = self.session().map(|s| s.upcoming) else {
            self.discard(Capability::Tracker, call);
            return;
        };

        let top = match result {
            Ok(observations) => observations.into_iter().next(),
            Err(e) => {
                warn!("Tracking {} failed: {}", call, e);
                None
            }
        };
        let Some(top) = top else {
            self.transition(DetectorState::Detecting, events);
            return;
        };

        let confident = top.confidence >= self.config.tracking_confidence;
        if !confident && upcoming.is_none() {
            debug!("Lost sign (confidence {:.2})", top.confidence);
            self.transition(DetectorState::Detecting, events);
            return;
        }

        if !confident || top.bounding_box.escapes(self.config.escape_margin) {
            match upcoming {
                Some(limit) => {
                    info!("Sign passed, speed limit {}", limit);
                    counter!("speedsign_speed_limits_accepted_total").increment(1);
                    events.push(DetectorEvent::SpeedLimitAccepted(limit));
                    self.transition(DetectorState::Sleeping, events);
                }
                None => {
                    debug!("Sign left the frame unread");
                    self.transition(DetectorState::Detecting, events);
                }
            }
            return;
        }

        if let DetectorState::Tracking(session) = &mut self.state {
            session.observation = top;
            session.sequence = sequence;
            session.overlay_shown = true;
        }
        events.push(DetectorEvent::ObservationRectangle(Some(ObservationOverlay {
            bounding_box: top.bounding_box,
            confirmed: upcoming.is_some(),
        })));
    }

    fn on_recognition(&mut self, call: CallId, result: Result<Vec<TextCandidate>, PerceptionError>) {
        let Some(outstanding) = self.recognition.settle(call) else {
            self.discard(Capability::Recognizer, call);
            return;
        };
        if outstanding.epoch != self.epoch {
            self.discard(Capability::Recognizer, call);
            return;
        }

        let threshold = self.config.recognition_confidence;
        let DetectorState::Tracking(session) = &mut self.state else {
            return;
        };

        let candidates = match result {
            Ok(candidates) => candidates,
            Err(e) => {
                debug!("Recognition {} failed: {}", call, e);
                return;
            }
        };
        let Some(top) = candidates.first() else {
            return;
        };

        match sign_text::read(&top.text, top.confidence, threshold) {
            Ok(limit) if session.upcoming.is_none() => {
                info!("Read speed limit {} from {:?}", limit, top.text);
                session.upcoming = Some(limit);
            }
            Ok(_) => {}
            Err(reason) => debug!("Reading {:?} rejected: {}", top.text, reason),
        }
    }

    /// Release guards whose calls have gone unanswered for too long
    fn expire_lost_calls(&mut self, events: &mut Vec<DetectorEvent>) {
        let limit = u64::from(self.config.call_timeout_frames);

        if let Some(lost) = self.detection.expire(self.frames, limit) {
            self.give_up(Capability::Detector, lost.call);
        }
        if let Some(lost) = self.recognition.expire(self.frames, limit) {
            self.give_up(Capability::Recognizer, lost.call);
        }
        if let Some(lost) = self.tracking.expire(self.frames, limit) {
            self.give_up(Capability::Tracker, lost.call);
            // The session's tracker context was lost with the call
            if lost.epoch == self.epoch && self.phase() == DetectorPhase::Tracking {
                self.transition(DetectorState::Detecting, events);
            }
        }
    }

    fn give_up(&self, capability: Capability, call: CallId) {
        warn!(
            "No answer to {} call {} after {} frames, giving up",
            capability, call, self.config.call_timeout_frames
        );
        counter!("speedsign_lost_calls_total", "capability" => capability.to_string()).increment(1);
    }

    fn discard(&self, capability: Capability, call: CallId) {
        debug!("Discarding stale {} result {}", capability, call);
        counter!("speedsign_stale_results_total", "capability" => capability.to_string())
            .increment(1);
    }

    fn transition(&mut self, next: DetectorState, events: &mut Vec<DetectorEvent>) {
        let from = self.phase();
        let overlay_shown = matches!(
            &self.state,
            DetectorState::Tracking(session) if session.overlay_shown
        );

        self.state = next;
        self.epoch += 1;

        if overlay_shown {
            events.push(DetectorEvent::ObservationRectangle(None));
        }
        info!("Detector {:?} -> {:?}", from, self.phase());
    }

    fn next_call_id(&mut self) -> CallId {
        self.next_call += 1;
        CallId(self.next_call)
    }
}
