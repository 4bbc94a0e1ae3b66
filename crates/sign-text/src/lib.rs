//! Speed-Limit Sign Text
//!
//! Turns noisy text recognition output into a validated speed-limit token.
//! Validation is set membership only: a string is a speed limit when it is
//! one of the values printed on real signs, never because it parses as a
//! plausible number.

mod normalizer;
mod speed_limit;
pub mod tables;

pub use normalizer::{normalize, read, correct};
pub use speed_limit::SpeedLimit;

use thiserror::Error;

/// Reasons a recognized string is not accepted
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    /// Recognition confidence below the configured gate
    #[error("Confidence {confidence:.2} below threshold {threshold:.2}")]
    LowConfidence { confidence: f32, threshold: f32 },

    /// Raw text contains a character that never appears on a speed-limit sign
    #[error("Forbidden character {0:?} in recognized text")]
    ForbiddenCharacter(char),

    /// Corrected text is not a known speed-limit value
    #[error("{0:?} is not a speed-limit value")]
    NotASpeedLimit(String),
}
