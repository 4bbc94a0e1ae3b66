//! Recognized text normalization
//!
//! Three ordered passes: confusable glyph substitution, whole-string
//! shorthand expansion, then contextual corrections. The result is only
//! accepted when it lands in the valid token set.

use tracing::debug;

use crate::tables::{
    CHARACTER_CONFUSIONS, CONTEXTUAL_CORRECTIONS, FORBIDDEN_CHARACTERS, SHORTHAND_EXPANSIONS,
};
use crate::{RejectReason, SpeedLimit};

/// Normalize raw recognized text into a speed limit
pub fn normalize(raw: &str) -> Option<SpeedLimit> {
    check_forbidden(raw).ok()?;
    SpeedLimit::from_token(&correct(raw))
}

/// Gate a recognition candidate on confidence, then normalize it.
///
/// Same outcome as [`normalize`] for confident candidates, but keeps the
/// reason a reading was thrown away.
pub fn read(raw: &str, confidence: f32, threshold: f32) -> Result<SpeedLimit, RejectReason> {
    if confidence < threshold {
        return Err(RejectReason::LowConfidence {
            confidence,
            threshold,
        });
    }

    check_forbidden(raw)?;

    let corrected = correct(raw);
    match SpeedLimit::from_token(&corrected) {
        Some(limit) => Ok(limit),
        None => {
            debug!("Reading {:?} corrected to {:?}, not a speed limit", raw, corrected);
            Err(RejectReason::NotASpeedLimit(corrected))
        }
    }
}

/// Apply every correction pass without validating the result
pub fn correct(raw: &str) -> String {
    let mut text = raw.to_string();

    // One replacement pass per confusable glyph
    for (digit, confusions) in CHARACTER_CONFUSIONS {
        for confusion in *confusions {
            text = text.replace(confusion, digit);
        }
    }

    if let Some((_, expansion)) = SHORTHAND_EXPANSIONS
        .iter()
        .find(|(shorthand, _)| *shorthand == text)
    {
        text = expansion.to_string();
    }

    for correction in CONTEXTUAL_CORRECTIONS {
        text = correction(text);
    }

    text
}

fn check_forbidden(raw: &str) -> Result<(), RejectReason> {
    match raw.chars().find(|c| FORBIDDEN_CHARACTERS.contains(c)) {
        Some(c) => Err(RejectReason::ForbiddenCharacter(c)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::VALID_SPEED_LIMITS;
    use proptest::prelude::*;

    fn token(raw: &str) -> Option<&'static str> {
        normalize(raw).map(|limit| limit.as_str())
    }

    #[test]
    fn test_confusable_glyphs() {
        assert_eq!(token("6O"), Some("60"));
        assert_eq!(token("bo"), Some("60"));
        assert_eq!(token("SO"), Some("50"));
        assert_eq!(token("l2O"), Some("120"));
        assert_eq!(token("I()"), Some("10"));
        assert_eq!(token("zs"), Some("25"));
        assert_eq!(token("B("), Some("80"));
        assert_eq!(token("qU"), Some("90"));
        assert_eq!(token("$"), Some("5"));
    }

    #[test]
    fn test_shorthand_expansion() {
        assert_eq!(token("4"), Some("40"));
        assert_eq!(token("7"), Some("70"));
        assert_eq!(token("G"), Some("60"));
        assert_eq!(token("q"), Some("90"));
        // Only whole strings expand
        assert_eq!(token("44"), None);
        assert_eq!(token("3"), None);
    }

    #[test]
    fn test_double_zero_becomes_hundred() {
        assert_eq!(token("900"), Some("100"));
        assert_eq!(token("OO"), Some("100"));
        assert_eq!(token("1000"), Some("100"));
        assert_eq!(token("x00y"), Some("100"));
    }

    #[test]
    fn test_forbidden_characters() {
        assert_eq!(token("60 km/h"), None);
        assert_eq!(token("5,0"), None);
        assert_eq!(token("stop"), None);
        assert!(matches!(
            read("60m", 0.9, 0.6),
            Err(RejectReason::ForbiddenCharacter('m'))
        ));
    }

    #[test]
    fn test_confidence_gate() {
        assert!(matches!(
            read("60", 0.5, 0.6),
            Err(RejectReason::LowConfidence { .. })
        ));
        assert_eq!(read("60", 0.6, 0.6).map(|l| l.as_str()), Ok("60"));
    }

    #[test]
    fn test_rejects_values_outside_the_set() {
        assert_eq!(token("65"), None);
        assert_eq!(token("140"), None);
        assert_eq!(
            read("35", 0.9, 0.6),
            Err(RejectReason::NotASpeedLimit("35".to_string()))
        );
    }

    proptest! {
        #[test]
        fn prop_forbidden_character_always_rejects(
            prefix in "[0-9OoSl]{0,3}",
            forbidden in prop::sample::select(vec![',', 'm', 't']),
            suffix in "[0-9OoSl]{0,3}",
        ) {
            let raw = format!("{prefix}{forbidden}{suffix}");
            prop_assert_eq!(normalize(&raw), None);
        }

        #[test]
        fn prop_result_is_always_a_valid_token(raw in "\\PC{0,6}") {
            if let Some(limit) = normalize(&raw) {
                prop_assert!(VALID_SPEED_LIMITS.contains(&limit.as_str()));
            }
        }

        #[test]
        fn prop_valid_tokens_survive_glyph_swaps(
            index in 0usize..VALID_SPEED_LIMITS.len(),
            zero_glyph in prop::sample::select(vec!["0", "o", "O", "Q", "U", "c", "C"]),
        ) {
            let valid = VALID_SPEED_LIMITS[index];
            let raw = valid.replace('0', zero_glyph);
            prop_assert_eq!(normalize(&raw).map(|l| l.as_str()), Some(valid));
        }
    }
}
