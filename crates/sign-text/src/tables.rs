//! Fixed correction tables

/// Every value accepted as a speed limit
pub const VALID_SPEED_LIMITS: [&str; 16] = [
    "5", "10", "15", "20", "25", "30", "40", "50", "60", "70", "80", "90", "100", "110", "120",
    "130",
];

/// Characters that disqualify a reading outright (units, punctuation of other signs)
pub const FORBIDDEN_CHARACTERS: [char; 3] = [',', 'm', 't'];

/// Glyphs the recognizer mistakes for digits.
///
/// Within an entry, longer glyphs come first so `"()"` is replaced before
/// its halves.
pub const CHARACTER_CONFUSIONS: &[(&str, &[&str])] = &[
    ("0", &["c", "C", "o", "O", "Q", "U", "()", "(", ")"]),
    ("1", &["i", "I", "l", "!"]),
    ("2", &["z", "Z"]),
    ("5", &["s", "S", "$"]),
    ("6", &["b", "G"]),
    ("8", &["B"]),
    ("9", &["q"]),
];

/// Whole-string shorthands: a lone digit that can only be the first digit of a limit
pub const SHORTHAND_EXPANSIONS: &[(&str, &str)] = &[
    ("4", "40"),
    ("6", "60"),
    ("7", "70"),
    ("8", "80"),
    ("9", "90"),
];

/// Pattern-based fixes, applied in order after expansion
pub const CONTEXTUAL_CORRECTIONS: &[fn(String) -> String] = &[double_zero_is_hundred];

/// Any reading with a double zero is a (partially misread) 100
fn double_zero_is_hundred(text: String) -> String {
    if text.contains("00") {
        "100".to_string()
    } else {
        text
    }
}
