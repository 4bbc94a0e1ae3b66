//! Speed-Limit Sign Detector
//!
//! Frame-driven state machine sequencing the perception stages:
//! - Sleeping: frames are ignored until a resume
//! - Detecting: full-frame detection until a sign qualifies
//! - Tracking: follow the sign, read its text, and hand over the value
//!   once the sign leaves the frame
//!
//! Perception calls are fire-and-forget. Every result is checked against
//! the call that is actually outstanding and the state it was issued in,
//! so late answers from an abandoned session are dropped.

pub mod config;
mod guard;
pub mod machine;
pub mod session;

pub use config::DetectorConfig;
pub use machine::{DetectorEvent, DetectorPhase, DetectorState, DetectorStateMachine, ObservationOverlay};
pub use session::TrackingSession;
