//! Perception gateway
//!
//! A gateway issues capability calls without waiting for them. Every call
//! carries a [`CallId`]; its answer comes back later as a [`Completion`]
//! through whatever ordered queue the caller drains.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use video_frame::{BoundingBox, VideoFrame};

use crate::capability::{Capabilities, TrackSequence};
use crate::preprocess::{self, PreprocessConfig};
use crate::{Capability, ObjectObservation, PerceptionError, TextCandidate};

/// Identifier attached to an issued call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of a previously issued call
pub enum Completion {
    Detected {
        call: CallId,
        result: Result<Vec<ObjectObservation>, PerceptionError>,
    },
    /// The sequence context travels with the call and is handed back here,
    /// unless the tracker panicked while holding it
    Tracked {
        call: CallId,
        sequence: Option<Box<dyn TrackSequence>>,
        result: Result<Vec<ObjectObservation>, PerceptionError>,
    },
    Recognized {
        call: CallId,
        result: Result<Vec<TextCandidate>, PerceptionError>,
    },
}

impl Completion {
    /// Failed completion of `call` on `capability`
    pub fn failed(call: CallId, capability: Capability, error: PerceptionError) -> Self {
        match capability {
            Capability::Detector => Completion::Detected {
                call,
                result: Err(error),
            },
            Capability::Tracker => Completion::Tracked {
                call,
                sequence: None,
                result: Err(error),
            },
            Capability::Recognizer => Completion::Recognized {
                call,
                result: Err(error),
            },
        }
    }

    pub fn call(&self) -> CallId {
        match self {
            Completion::Detected { call, .. }
            | Completion::Tracked { call, .. }
            | Completion::Recognized { call, .. } => *call,
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Completion::Detected { .. } => Capability::Detector,
            Completion::Tracked { .. } => Capability::Tracker,
            Completion::Recognized { .. } => Capability::Recognizer,
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Detected { call, result } => f
                .debug_struct("Detected")
                .field("call", call)
                .field("result", result)
                .finish(),
            Completion::Tracked { call, result, .. } => f
                .debug_struct("Tracked")
                .field("call", call)
                .field("result", result)
                .finish_non_exhaustive(),
            Completion::Recognized { call, result } => f
                .debug_struct("Recognized")
                .field("call", call)
                .field("result", result)
                .finish(),
        }
    }
}

/// Fire-and-forget access to the perception capabilities.
///
/// An `Err` from any method means the call never started and no
/// completion will follow.
pub trait PerceptionGateway {
    /// Run detection on a full frame
    fn detect(&mut self, call: CallId, frame: Arc<VideoFrame>) -> Result<(), PerceptionError>;

    /// Open the sequence context for a new tracking session
    fn begin_tracking(&mut self) -> Result<Box<dyn TrackSequence>, PerceptionError>;

    /// Propagate `reference` into `frame` using the session's sequence
    fn track(
        &mut self,
        call: CallId,
        sequence: Box<dyn TrackSequence>,
        frame: Arc<VideoFrame>,
        reference: ObjectObservation,
    ) -> Result<(), PerceptionError>;

    /// Read the text inside `region` of `frame`
    fn recognize(
        &mut self,
        call: CallId,
        frame: Arc<VideoFrame>,
        region: BoundingBox,
    ) -> Result<(), PerceptionError>;
}

/// Gateway running every call on tokio's blocking pool.
///
/// Completions are converted into the queue's message type `C` and sent
/// back in the order the calls finish.
pub struct TokioGateway<C> {
    capabilities: Capabilities,
    preprocess: PreprocessConfig,
    completions: mpsc::Sender<C>,
    runtime: Handle,
}

impl<C> TokioGateway<C>
where
    C: From<Completion> + Send + 'static,
{
    /// Create a gateway bound to the current tokio runtime
    pub fn new(
        capabilities: Capabilities,
        preprocess: PreprocessConfig,
        completions: mpsc::Sender<C>,
    ) -> Result<Self, PerceptionError> {
        let runtime = Handle::try_current().map_err(|e| PerceptionError::NotStarted {
            capability: Capability::Detector,
            reason: e.to_string(),
        })?;

        Ok(Self {
            capabilities,
            preprocess,
            completions,
            runtime,
        })
    }

    fn ensure_open(&self, capability: Capability) -> Result<(), PerceptionError> {
        if self.completions.is_closed() {
            return Err(PerceptionError::NotStarted {
                capability,
                reason: "completion queue closed".to_string(),
            });
        }
        Ok(())
    }

    /// Run `work` on the blocking pool. A panic still completes `call`, with an error.
    fn spawn<F>(&self, call: CallId, capability: Capability, work: F)
    where
        F: FnOnce() -> Completion + Send + 'static,
    {
        let completions = self.completions.clone();
        self.runtime.spawn_blocking(move || {
            let completion = panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
                let reason = panic_reason(payload.as_ref());
                warn!("{} call {} panicked: {}", capability, call, reason);
                Completion::failed(
                    call,
                    capability,
                    PerceptionError::Inference(format!("{} panicked: {}", capability, reason)),
                )
            });
            if completions.blocking_send(completion.into()).is_err() {
                debug!("Completion for call {} dropped, queue closed", call);
            }
        });
    }
}

impl<C> PerceptionGateway for TokioGateway<C>
where
    C: From<Completion> + Send + 'static,
{
    fn detect(&mut self, call: CallId, frame: Arc<VideoFrame>) -> Result<(), PerceptionError> {
        self.ensure_open(Capability::Detector)?;
        let detector = Arc::clone(&self.capabilities.detector);
        self.spawn(call, Capability::Detector, move || Completion::Detected {
            call,
            result: detector.detect(&frame),
        });
        Ok(())
    }

    fn begin_tracking(&mut self) -> Result<Box<dyn TrackSequence>, PerceptionError> {
        self.capabilities.tracker.begin_session()
    }

    fn track(
        &mut self,
        call: CallId,
        sequence: Box<dyn TrackSequence>,
        frame: Arc<VideoFrame>,
        reference: ObjectObservation,
    ) -> Result<(), PerceptionError> {
        self.ensure_open(Capability::Tracker)?;
        self.spawn(call, Capability::Tracker, move || {
            let mut sequence = sequence;
            let result = sequence.track(&frame, &reference);
            Completion::Tracked {
                call,
                sequence: Some(sequence),
                result,
            }
        });
        Ok(())
    }

    fn recognize(
        &mut self,
        call: CallId,
        frame: Arc<VideoFrame>,
        region: BoundingBox,
    ) -> Result<(), PerceptionError> {
        self.ensure_open(Capability::Recognizer)?;
        let recognizer = Arc::clone(&self.capabilities.recognizer);
        let config = self.preprocess.clone();
        self.spawn(call, Capability::Recognizer, move || {
            let result = preprocess::prepare(&frame, &region, &config).and_then(|image| {
                recognizer.recognize(&image)
            });
            if let Err(e) = &result {
                warn!("Recognition call {} failed: {}", call, e);
            }
            Completion::Recognized { call, result }
        });
        Ok(())
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        reason.to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Sequence context handed out by [`RecordingGateway`]. Never tracks anything.
struct RecordedSequence;

impl TrackSequence for RecordedSequence {
    fn track(
        &mut self,
        _frame: &VideoFrame,
        _reference: &ObjectObservation,
    ) -> Result<Vec<ObjectObservation>, PerceptionError> {
        Ok(Vec::new())
    }
}

/// Gateway that only records issued calls.
///
/// Lets callers decide when and how each call completes, which makes the
/// ordering of results fully deterministic.
#[derive(Default)]
pub struct RecordingGateway {
    detections: VecDeque<(CallId, Arc<VideoFrame>)>,
    trackings: VecDeque<(CallId, Box<dyn TrackSequence>, ObjectObservation)>,
    recognitions: VecDeque<(CallId, BoundingBox)>,
    sessions_started: usize,
    refuse_next: Option<Capability>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call to `capability` fail to start
    pub fn refuse_next(&mut self, capability: Capability) {
        self.refuse_next = Some(capability);
    }

    /// Number of issued, not yet taken calls
    pub fn pending(&self, capability: Capability) -> usize {
        match capability {
            Capability::Detector => self.detections.len(),
            Capability::Tracker => self.trackings.len(),
            Capability::Recognizer => self.recognitions.len(),
        }
    }

    /// Tracking sequence contexts created so far
    pub fn sessions_started(&self) -> usize {
        self.sessions_started
    }

    pub fn take_detect(&mut self) -> Option<(CallId, Arc<VideoFrame>)> {
        self.detections.pop_front()
    }

    pub fn take_track(&mut self) -> Option<(CallId, Box<dyn TrackSequence>, ObjectObservation)> {
        self.trackings.pop_front()
    }

    pub fn take_recognize(&mut self) -> Option<(CallId, BoundingBox)> {
        self.recognitions.pop_front()
    }

    fn check_refusal(&mut self, capability: Capability) -> Result<(), PerceptionError> {
        if self.refuse_next == Some(capability) {
            self.refuse_next = None;
            return Err(PerceptionError::NotStarted {
                capability,
                reason: "refused".to_string(),
            });
        }
        Ok(())
    }
}

impl PerceptionGateway for RecordingGateway {
    fn detect(&mut self, call: CallId, frame: Arc<VideoFrame>) -> Result<(), PerceptionError> {
        self.check_refusal(Capability::Detector)?;
        self.detections.push_back((call, frame));
        Ok(())
    }

    fn begin_tracking(&mut self) -> Result<Box<dyn TrackSequence>, PerceptionError> {
        self.sessions_started += 1;
        Ok(Box::new(RecordedSequence))
    }

    fn track(
        &mut self,
        call: CallId,
        sequence: Box<dyn TrackSequence>,
        _frame: Arc<VideoFrame>,
        reference: ObjectObservation,
    ) -> Result<(), PerceptionError> {
        self.check_refusal(Capability::Tracker)?;
        self.trackings.push_back((call, sequence, reference));
        Ok(())
    }

    fn recognize(
        &mut self,
        call: CallId,
        _frame: Arc<VideoFrame>,
        region: BoundingBox,
    ) -> Result<(), PerceptionError> {
        self.check_refusal(Capability::Recognizer)?;
        self.recognitions.push_back((call, region));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Detector, Recognizer, Tracker};
    use crate::mock::{MockDetector, MockRecognizer, MockTracker};
    use image::GrayImage;

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        fn detect(&self, _frame: &VideoFrame) -> Result<Vec<ObjectObservation>, PerceptionError> {
            panic!("model crashed")
        }
    }

    struct PanickingSequence;

    impl TrackSequence for PanickingSequence {
        fn track(
            &mut self,
            _frame: &VideoFrame,
            _reference: &ObjectObservation,
        ) -> Result<Vec<ObjectObservation>, PerceptionError> {
            panic!("tracker state corrupted")
        }
    }

    struct PanickingTracker;

    impl Tracker for PanickingTracker {
        fn begin_session(&self) -> Result<Box<dyn TrackSequence>, PerceptionError> {
            Ok(Box::new(PanickingSequence))
        }
    }

    struct FailingRecognizer;

    impl Recognizer for FailingRecognizer {
        fn recognize(&self, _image: &GrayImage) -> Result<Vec<TextCandidate>, PerceptionError> {
            Err(PerceptionError::Inference("no model".into()))
        }
    }

    fn frame() -> Arc<VideoFrame> {
        Arc::new(VideoFrame::filled(64, 48, [200, 200, 200], 0, 1))
    }

    fn region() -> BoundingBox {
        BoundingBox::new(0.25, 0.25, 0.5, 0.5).unwrap()
    }

    #[tokio::test]
    async fn test_tokio_gateway_delivers_completions() {
        let (tx, mut rx) = mpsc::channel::<Completion>(8);
        let mut gateway = TokioGateway::new(Capabilities::mock(), PreprocessConfig::default(), tx).unwrap();

        gateway.detect(CallId(1), frame()).unwrap();
        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.call(), CallId(1));
        match completion {
            Completion::Detected { result, .. } => assert!(!result.unwrap().is_empty()),
            other => panic!("unexpected {:?}", other),
        }

        let sequence = gateway.begin_tracking().unwrap();
        let reference = MockDetector::default().detect(&frame()).unwrap()[0];
        gateway.track(CallId(2), sequence, frame(), reference).unwrap();
        match rx.recv().await.unwrap() {
            Completion::Tracked { call, result, .. } => {
                assert_eq!(call, CallId(2));
                assert_eq!(result.unwrap().len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        gateway.recognize(CallId(3), frame(), region()).unwrap();
        assert_eq!(rx.recv().await.unwrap().capability(), Capability::Recognizer);
    }

    #[tokio::test]
    async fn test_recognizer_errors_come_back_as_completions() {
        let (tx, mut rx) = mpsc::channel::<Completion>(8);
        let capabilities = Capabilities::new(
            Arc::new(MockDetector::default()),
            Arc::new(MockTracker::default()),
            Arc::new(FailingRecognizer),
        );
        let mut gateway = TokioGateway::new(capabilities, PreprocessConfig::default(), tx).unwrap();

        gateway.recognize(CallId(9), frame(), region()).unwrap();
        match rx.recv().await.unwrap() {
            Completion::Recognized { result, .. } => {
                assert_eq!(result, Err(PerceptionError::Inference("no model".into())))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panicking_detector_reports_error() {
        let (tx, mut rx) = mpsc::channel::<Completion>(8);
        let capabilities = Capabilities::new(
            Arc::new(PanickingDetector),
            Arc::new(MockTracker::default()),
            Arc::new(MockRecognizer::default()),
        );
        let mut gateway = TokioGateway::new(capabilities, PreprocessConfig::default(), tx).unwrap();

        gateway.detect(CallId(5), frame()).unwrap();
        match rx.recv().await.unwrap() {
            Completion::Detected { call, result } => {
                assert_eq!(call, CallId(5));
                match result {
                    Err(PerceptionError::Inference(reason)) => assert!(reason.contains("model crashed")),
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panicking_tracker_reports_error_without_sequence() {
        let (tx, mut rx) = mpsc::channel::<Completion>(8);
        let capabilities = Capabilities::new(
            Arc::new(MockDetector::default()),
            Arc::new(PanickingTracker),
            Arc::new(MockRecognizer::default()),
        );
        let mut gateway = TokioGateway::new(capabilities, PreprocessConfig::default(), tx).unwrap();

        let sequence = gateway.begin_tracking().unwrap();
        let reference = MockDetector::default().detect(&frame()).unwrap()[0];
        gateway.track(CallId(6), sequence, frame(), reference).unwrap();
        match rx.recv().await.unwrap() {
            Completion::Tracked { call, sequence, result } => {
                assert_eq!(call, CallId(6));
                assert!(sequence.is_none());
                assert!(result.is_err());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_failed_completion_matches_capability() {
        let error = PerceptionError::Inference("gone".into());
        for capability in [Capability::Detector, Capability::Tracker, Capability::Recognizer] {
            let completion = Completion::failed(CallId(7), capability, error.clone());
            assert_eq!(completion.call(), CallId(7));
            assert_eq!(completion.capability(), capability);
        }
    }

    #[tokio::test]
    async fn test_closed_queue_refuses_calls() {
        let (tx, rx) = mpsc::channel::<Completion>(1);
        drop(rx);
        let mut gateway = TokioGateway::new(Capabilities::mock(), PreprocessConfig::default(), tx).unwrap();

        let err = gateway.detect(CallId(1), frame()).unwrap_err();
        assert!(matches!(err, PerceptionError::NotStarted { capability: Capability::Detector, .. }));
    }

    #[test]
    fn test_gateway_requires_runtime() {
        let (tx, _rx) = mpsc::channel::<Completion>(1);
        assert!(TokioGateway::new(Capabilities::mock(), PreprocessConfig::default(), tx).is_err());
    }

    #[test]
    fn test_recording_gateway() {
        let mut gateway = RecordingGateway::new();
        gateway.detect(CallId(1), frame()).unwrap();
        assert_eq!(gateway.pending(Capability::Detector), 1);

        gateway.refuse_next(Capability::Recognizer);
        assert!(gateway.recognize(CallId(2), frame(), region()).is_err());
        assert!(gateway.recognize(CallId(3), frame(), region()).is_ok());
        assert_eq!(gateway.take_recognize().map(|(call, _)| call), Some(CallId(3)));

        gateway.begin_tracking().unwrap();
        assert_eq!(gateway.sessions_started(), 1);
    }
}
