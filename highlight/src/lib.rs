//! Stateless source highlighter.
//!
//! [`highlight`] is a pure function over a buffer snapshot: safe to re-run
//! on every keystroke, no hidden state. The host is responsible for diffing
//! and applying the returned spans efficiently.
//!
//! Classification happens in two passes over a per-byte class array:
//! a whole-token keyword pass driven by a fixed ordered table, then a
//! pattern pass (strings, include targets, comments) that overrides
//! keyword marks wherever the two overlap.

mod palette;
pub use palette::{Palette, Rgb};

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use regex::Regex;

use kiln_types::{ColorClass, EditorMode, HighlightSpan};

/// Fixed ordered keyword table. First class written at an offset wins;
/// later categories never override earlier keyword marks.
const KEYWORD_TABLE: &[(ColorClass, &[&str])] = &[
    (
        ColorClass::Type,
        &["int", "float", "double", "bool", "string", "char", "void"],
    ),
    (
        ColorClass::Flow,
        &[
            "if", "else", "switch", "case", "for", "while", "do", "break", "continue", "return",
        ],
    ),
    (
        ColorClass::Access,
        &["public", "private", "protected", "class", "struct"],
    ),
    (
        ColorClass::Std,
        &["std", "cout", "cin", "endl", "namespace", "using"],
    ),
    (ColorClass::Preproc, &["#include"]),
];

/// Pattern pass, applied in this fixed order after the keyword pass.
/// Each rule overrides any earlier mark at the same offsets.
///
/// The angle-bracket rule is textually naive: it exists for include targets
/// but also matches real less-than/greater-than expressions on one line.
/// That behavior is part of the contract and must not be "fixed" here.
static PATTERN_RULES: LazyLock<Vec<(Regex, ColorClass)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r#"".*?""#).unwrap(), ColorClass::Literal),
        (Regex::new(r"<.*?>").unwrap(), ColorClass::Literal),
        (Regex::new(r"(?m)//.*?$").unwrap(), ColorClass::Comment),
        (Regex::new(r"(?s)/\*.*?\*/").unwrap(), ColorClass::Comment),
    ]
});

/// One automaton over the flattened keyword table; pattern index maps back
/// to the owning category's class.
static KEYWORD_SCANNER: LazyLock<(AhoCorasick, Vec<ColorClass>)> = LazyLock::new(|| {
    let mut words = Vec::new();
    let mut classes = Vec::new();
    for (class, keywords) in KEYWORD_TABLE {
        for keyword in *keywords {
            words.push(*keyword);
            classes.push(*class);
        }
    }
    let scanner = AhoCorasick::new(&words).expect("keyword table is a valid pattern set");
    (scanner, classes)
});

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
}

/// Whole-token test: the bytes immediately before and after the match, when
/// present, must not be alphanumeric.
fn is_whole_token(text: &str, start: usize, end: usize) -> bool {
    let bytes = text.as_bytes();
    let before_ok = start == 0 || !is_word_byte(bytes[start - 1]);
    let after_ok = end == bytes.len() || !is_word_byte(bytes[end]);
    before_ok && after_ok
}

/// Re-color a full buffer snapshot.
///
/// Returns spans in left-to-right offset order; regions with no special
/// meaning are omitted (implied [`ColorClass::Default`]), except in plain
/// text mode where a single default span covers the whole buffer.
#[must_use]
pub fn highlight(text: &str, mode: EditorMode) -> Vec<HighlightSpan> {
    if text.is_empty() {
        return Vec::new();
    }
    if mode == EditorMode::PlainText {
        return vec![HighlightSpan::new(0, text.len(), ColorClass::Default)];
    }

    let mut classes = vec![ColorClass::Default; text.len()];

    let (scanner, match_classes) = &*KEYWORD_SCANNER;
    for found in scanner.find_overlapping_iter(text) {
        if !is_whole_token(text, found.start(), found.end()) {
            continue;
        }
        let class = match_classes[found.pattern().as_usize()];
        for slot in &mut classes[found.start()..found.end()] {
            if *slot == ColorClass::Default {
                *slot = class;
            }
        }
    }

    for (pattern, class) in &*PATTERN_RULES {
        for found in pattern.find_iter(text) {
            for slot in &mut classes[found.start()..found.end()] {
                *slot = *class;
            }
        }
    }

    collect_spans(&classes)
}

/// Merge runs of equal non-default class into spans.
fn collect_spans(classes: &[ColorClass]) -> Vec<HighlightSpan> {
    let mut spans = Vec::new();
    let mut run_start = 0;
    let mut run_class = ColorClass::Default;

    for (offset, class) in classes.iter().copied().enumerate() {
        if class == run_class {
            continue;
        }
        if run_class != ColorClass::Default {
            spans.push(HighlightSpan::new(run_start, offset - run_start, run_class));
        }
        run_start = offset;
        run_class = class;
    }
    if run_class != ColorClass::Default {
        spans.push(HighlightSpan::new(
            run_start,
            classes.len() - run_start,
            run_class,
        ));
    }
    spans
}
