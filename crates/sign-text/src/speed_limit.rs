//! Validated speed-limit token

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use crate::tables::VALID_SPEED_LIMITS;

/// A speed-limit value read from a sign.
///
/// Can only hold one of [`VALID_SPEED_LIMITS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpeedLimit(&'static str);

impl SpeedLimit {
    /// Look a token up in the valid set
    pub fn from_token(token: &str) -> Option<Self> {
        VALID_SPEED_LIMITS
            .iter()
            .copied()
            .find(|valid| *valid == token)
            .map(Self)
    }

    /// Token as printed on the sign
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for SpeedLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for SpeedLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for SpeedLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        SpeedLimit::from_token(&token).ok_or_else(|| {
            serde::de::Error::custom(format!("{token:?} is not a speed-limit value"))
        })
    }
}
