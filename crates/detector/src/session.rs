//! Tracking session

use perception::{ObjectObservation, TrackSequence};
use sign_text::SpeedLimit;

/// Everything known about the sign currently being tracked.
///
/// Only exists inside [`crate::DetectorState::Tracking`]; leaving that state
/// drops the session along with its tracker context and any value read.
pub struct TrackingSession {
    pub(crate) observation: ObjectObservation,
    pub(crate) attempts: u32,
    /// The session's first read has been issued
    pub(crate) first_read_issued: bool,
    /// An overlay rectangle has been sent for this sign
    pub(crate) overlay_shown: bool,
    pub(crate) upcoming: Option<SpeedLimit>,
    /// Tracker context, opened lazily. `None` while a track call holds it.
    pub(crate) sequence: Option<Box<dyn TrackSequence>>,
}

impl TrackingSession {
    pub(crate) fn new(observation: ObjectObservation) -> Self {
        Self {
            observation,
            attempts: 0,
            first_read_issued: false,
            overlay_shown: false,
            upcoming: None,
            sequence: None,
        }
    }

    /// Latest accepted observation of the sign
    pub fn observation(&self) -> &ObjectObservation {
        &self.observation
    }

    /// Recognition retries issued after the initial read
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Recognition calls issued in this session
    pub fn reads_issued(&self) -> u32 {
        if self.first_read_issued {
            self.attempts + 1
        } else {
            0
        }
    }

    /// Value read from the sign, shown once the sign is passed
    pub fn upcoming_speed_limit(&self) -> Option<SpeedLimit> {
        self.upcoming
    }
}

impl std::fmt::Debug for TrackingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingSession")
            .field("observation", &self.observation)
            .field("attempts", &self.attempts)
            .field("first_read_issued", &self.first_read_issued)
            .field("upcoming", &self.upcoming)
            .field("sequence_open", &self.sequence.is_some())
            .finish()
    }
}
