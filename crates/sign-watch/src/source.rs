//! Synthetic camera

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};
use video_frame::VideoFrame;

use crate::config::SourceConfig;
use crate::engine::Input;

/// Produces uniform grey frames at a fixed rate.
///
/// Frames are offered without waiting: when the engine is behind, the
/// frame is dropped instead of queueing behind perception results.
pub struct FrameSource {
    config: SourceConfig,
    sequence: u32,
    dropped: u64,
}

impl FrameSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            sequence: 0,
            dropped: 0,
        }
    }

    /// Frames dropped because the input queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn next_frame(&mut self) -> VideoFrame {
        let period_ns = 1_000_000_000 / u64::from(self.config.fps.max(1));
        let frame = VideoFrame::filled(
            self.config.width,
            self.config.height,
            [96, 104, 110],
            u64::from(self.sequence) * period_ns,
            self.sequence,
        );
        self.sequence += 1;
        frame
    }

    /// Offer one frame. Returns `false` once the engine is gone.
    pub fn offer(&mut self, inbox: &mpsc::Sender<Input>) -> bool {
        let frame = Arc::new(self.next_frame());
        match inbox.try_send(Input::Frame(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                counter!("speedsign_frames_dropped_total").increment(1);
                debug!("Input queue full, frame {} dropped", self.sequence - 1);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Emit frames until `run_seconds` elapsed (forever if zero), then ask the engine to stop
    pub async fn run(mut self, inbox: mpsc::Sender<Input>) -> Self {
        let period = Duration::from_nanos(1_000_000_000 / u64::from(self.config.fps.max(1)));
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let deadline = (self.config.run_seconds > 0)
            .then(|| time::Instant::now() + Duration::from_secs(self.config.run_seconds));

        info!(
            "Frame source {}x{} @ {} fps",
            self.config.width, self.config.height, self.config.fps
        );

        loop {
            ticker.tick().await;
            if deadline.is_some_and(|deadline| time::Instant::now() >= deadline) {
                break;
            }
            if !self.offer(&inbox) {
                debug!("Engine gone, frame source stopping");
                return self;
            }
        }

        info!(
            "Frame source done: {} frames, {} dropped",
            self.sequence, self.dropped
        );
        // Engine may already be gone
        let _ = inbox.send(Input::Shutdown).await;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SourceConfig {
        SourceConfig {
            fps: 10,
            width: 32,
            height: 24,
            run_seconds: 1,
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_frames() {
        let (tx, mut rx) = mpsc::channel(2);
        let mut source = FrameSource::new(config());

        for _ in 0..5 {
            assert!(source.offer(&tx));
        }
        assert_eq!(source.dropped(), 3);

        match rx.recv().await {
            Some(Input::Frame(frame)) => assert_eq!(frame.sequence, 0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_queue_stops_source() {
        let (tx, rx) = mpsc::channel(2);
        drop(rx);
        let mut source = FrameSource::new(config());
        assert!(!source.offer(&tx));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ends_with_shutdown() {
        let (tx, mut rx) = mpsc::channel(64);
        let source = FrameSource::new(config()).run(tx).await;
        assert_eq!(source.dropped(), 0);

        let mut frames = 0;
        while let Some(input) = rx.recv().await {
            match input {
                Input::Frame(_) => frames += 1,
                Input::Shutdown => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!((9..=11).contains(&frames), "{} frames", frames);
    }
}
