//! Small pure text helpers for the host's status counters.

/// Count words the way the status bar does: split on spaces and line breaks,
/// empty fragments discarded.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split([' ', '\n', '\r'])
        .filter(|fragment| !fragment.is_empty())
        .count()
}

/// Count characters (Unicode scalar values, not bytes).
#[must_use]
pub fn char_count(text: &str) -> usize {
    text.chars().count()
}
