//! Speed-Limit Lifecycle
//!
//! Owns the value currently shown to the driver and the two timers around it:
//! - Expiry: a shown value is hidden after its validity period
//! - Resume: the detector sleeps for a moment after a sign was passed
//!
//! Timers are armed with a generation token. A firing whose token is no
//! longer current was superseded and is ignored.

mod manager;

pub use manager::{LifecycleConfig, LifecycleEvent, LifecycleTimer, SpeedLimitLifecycle};
