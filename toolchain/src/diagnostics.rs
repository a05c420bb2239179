//! Best-effort extraction of structured diagnostics from compiler stderr.
//!
//! Matches the leading shape `<token without ':'>:<integer>:` per line.
//! This is a heuristic extractor, not a diagnostic grammar: multi-line
//! messages, column carets, and "note:" continuations produce no records.

use kiln_types::Diagnostic;

/// Parse the concatenated stderr text of one build.
#[must_use]
pub fn parse(stderr_text: &str) -> Vec<Diagnostic> {
    stderr_text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Diagnostic> {
    let mut parts = line.splitn(3, ':');
    let file = parts.next()?;
    let number = parts.next()?;
    // The shape requires a second ':' after the integer.
    let message = parts.next()?;
    if file.is_empty() {
        return None;
    }
    // Malformed integers are skipped silently.
    let line_number = number.parse::<u32>().ok()?;
    if line_number == 0 {
        return None;
    }
    Some(Diagnostic::new(file, line_number, message.trim()))
}
