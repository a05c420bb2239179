//! Interactive console protocol.
//!
//! Models the console surface as an append-only transcript plus a single
//! editable input region (the prompt) at its tail. The transcript before
//! `prompt_start` is immutable; keystroke arbitration enforces that here so
//! the host widget never has to.
//!
//! This crate is pure state. The engine is the sole caller that mutates a
//! [`Console`]; child-process output reaches it only after being marshaled
//! onto the engine's coordination context.

use kiln_types::Key;

/// Prompt marker appended when an input region opens.
pub const DEFAULT_PROMPT: &str = "> ";

/// What the host should do with a keystroke after arbitration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Let the widget handle the key normally.
    Passthrough,
    /// Drop the key entirely; it would edit or leave the protected region.
    Suppressed,
    /// The key was applied at the end of the transcript; move the caret
    /// there.
    SnapToEnd,
    /// Enter submitted this line; forward it to the running child.
    Submitted(String),
}

/// Transcript plus prompt boundary.
///
/// `prompt_start` never decreases except through [`Console::clear`] at the
/// start of a new build.
#[derive(Debug)]
pub struct Console {
    transcript: String,
    /// Offset before which edits are forbidden.
    prompt_start: usize,
    /// Offset where the open prompt's marker begins. Output arriving while
    /// the prompt is open is inserted here, keeping the prompt at the tail.
    prompt_anchor: usize,
    prompt_open: bool,
    marker: String,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT)
    }
}

impl Console {
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            transcript: String::new(),
            prompt_start: 0,
            prompt_anchor: 0,
            prompt_open: false,
            marker: marker.into(),
        }
    }

    #[must_use]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    #[must_use]
    pub fn prompt_start(&self) -> usize {
        self.prompt_start
    }

    #[must_use]
    pub fn is_prompt_open(&self) -> bool {
        self.prompt_open
    }

    /// Empty the surface for a new build. The only operation that moves
    /// `prompt_start` backwards.
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.prompt_start = 0;
        self.prompt_anchor = 0;
        self.prompt_open = false;
    }

    /// Append the prompt marker and arm the editable boundary at the new
    /// transcript end.
    pub fn open_prompt(&mut self) {
        self.prompt_anchor = self.transcript.len();
        self.transcript.push_str(&self.marker);
        self.prompt_start = self.transcript.len();
        self.prompt_open = true;
    }

    /// Disarm the prompt without touching the transcript (run child exited).
    /// Whatever was typed but not submitted stays visible; the surface is
    /// append-only.
    pub fn close_prompt(&mut self) {
        self.prompt_open = false;
    }

    /// Append one line of child output (a line terminator is added).
    ///
    /// While a prompt is open, output is inserted before the prompt marker
    /// so the prompt and any partially typed input stay at the tail;
    /// `prompt_start` shifts forward by the inserted length.
    pub fn append_output(&mut self, text: &str) {
        if self.prompt_open {
            let mut inserted = String::with_capacity(text.len() + 1);
            inserted.push_str(text);
            inserted.push('\n');
            self.transcript.insert_str(self.prompt_anchor, &inserted);
            self.prompt_anchor += inserted.len();
            self.prompt_start += inserted.len();
        } else {
            self.transcript.push_str(text);
            self.transcript.push('\n');
        }
    }

    /// Arbitrate one keystroke at the given caret offset (bytes into the
    /// transcript).
    ///
    /// Destructive and caret-repositioning keys are suppressed at or before
    /// `prompt_start`; clipboard keys pass through unrestricted; ordinary
    /// typing with the caret in the protected region snaps to the end of
    /// the transcript instead of erroring.
    pub fn handle_key(&mut self, caret: usize, key: Key) -> KeyOutcome {
        match key {
            Key::Copy | Key::Cut | Key::Paste | Key::SelectAll => KeyOutcome::Passthrough,
            _ if !self.prompt_open => KeyOutcome::Suppressed,
            Key::Backspace => {
                if caret <= self.prompt_start {
                    KeyOutcome::Suppressed
                } else {
                    let caret = self.clamp_to_boundary(caret.min(self.transcript.len()));
                    if caret > self.prompt_start {
                        let removed_at = prev_char_boundary(&self.transcript, caret);
                        self.transcript.remove(removed_at);
                    }
                    KeyOutcome::Passthrough
                }
            }
            Key::Left | Key::Up => {
                if caret <= self.prompt_start {
                    KeyOutcome::Suppressed
                } else {
                    KeyOutcome::Passthrough
                }
            }
            Key::Char(ch) => {
                if caret < self.prompt_start {
                    self.transcript.push(ch);
                    KeyOutcome::SnapToEnd
                } else {
                    let caret = self.clamp_to_boundary(caret.min(self.transcript.len()));
                    self.transcript.insert(caret, ch);
                    KeyOutcome::Passthrough
                }
            }
            Key::Enter => {
                let line = self.transcript[self.prompt_start..]
                    .trim_end()
                    .to_string();
                self.transcript.push('\n');
                self.open_prompt();
                KeyOutcome::Submitted(line)
            }
        }
    }

    fn clamp_to_boundary(&self, caret: usize) -> usize {
        let mut caret = caret;
        while caret > 0 && !self.transcript.is_char_boundary(caret) {
            caret -= 1;
        }
        caret
    }
}

fn prev_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset - 1;
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::{Console, DEFAULT_PROMPT, KeyOutcome};
    use kiln_types::Key;

    fn type_line(console: &mut Console, line: &str) {
        for ch in line.chars() {
            let caret = console.transcript().len();
            assert_eq!(console.handle_key(caret, Key::Char(ch)), KeyOutcome::Passthrough);
        }
    }

    #[test]
    fn open_prompt_arms_boundary_at_tail() {
        let mut console = Console::default();
        console.append_output("hello");
        console.open_prompt();
        assert_eq!(console.transcript(), format!("hello\n{DEFAULT_PROMPT}"));
        assert_eq!(console.prompt_start(), console.transcript().len());
    }

    #[test]
    fn backspace_at_boundary_is_noop() {
        let mut console = Console::default();
        console.open_prompt();
        let before = console.transcript().to_string();
        let outcome = console.handle_key(console.prompt_start(), Key::Backspace);
        assert_eq!(outcome, KeyOutcome::Suppressed);
        assert_eq!(console.transcript(), before);
    }

    #[test]
    fn backspace_inside_input_region_deletes() {
        let mut console = Console::default();
        console.open_prompt();
        type_line(&mut console, "ab");
        let caret = console.transcript().len();
        assert_eq!(console.handle_key(caret, Key::Backspace), KeyOutcome::Passthrough);
        assert!(console.transcript().ends_with("a"));
    }

    #[test]
    fn left_and_up_suppressed_at_boundary() {
        let mut console = Console::default();
        console.open_prompt();
        assert_eq!(
            console.handle_key(console.prompt_start(), Key::Left),
            KeyOutcome::Suppressed
        );
        assert_eq!(
            console.handle_key(console.prompt_start() - 1, Key::Up),
            KeyOutcome::Suppressed
        );
    }

    #[test]
    fn clipboard_keys_pass_through_anywhere() {
        let mut console = Console::default();
        console.open_prompt();
        assert_eq!(console.handle_key(0, Key::Copy), KeyOutcome::Passthrough);
        assert_eq!(console.handle_key(0, Key::SelectAll), KeyOutcome::Passthrough);
        assert_eq!(console.handle_key(0, Key::Paste), KeyOutcome::Passthrough);
        assert_eq!(console.handle_key(0, Key::Cut), KeyOutcome::Passthrough);
    }

    #[test]
    fn typing_before_boundary_snaps_to_end() {
        let mut console = Console::default();
        console.append_output("old output");
        console.open_prompt();
        let outcome = console.handle_key(0, Key::Char('x'));
        assert_eq!(outcome, KeyOutcome::SnapToEnd);
        assert!(console.transcript().ends_with('x'));
    }

    #[test]
    fn enter_submits_trimmed_line_and_rearms() {
        let mut console = Console::default();
        console.open_prompt();
        type_line(&mut console, "hello world   ");
        let caret = console.transcript().len();
        let outcome = console.handle_key(caret, Key::Enter);
        assert_eq!(outcome, KeyOutcome::Submitted("hello world".to_string()));
        // New prompt at the new tail, boundary advanced.
        assert!(console.is_prompt_open());
        assert_eq!(console.prompt_start(), console.transcript().len());
        assert!(console.transcript().contains("hello world   \n"));
    }

    #[test]
    fn prompt_start_never_decreases_across_submissions() {
        let mut console = Console::default();
        console.open_prompt();
        let mut last = console.prompt_start();
        for _ in 0..3 {
            type_line(&mut console, "x");
            let caret = console.transcript().len();
            console.handle_key(caret, Key::Enter);
            assert!(console.prompt_start() > last);
            last = console.prompt_start();
        }
    }

    #[test]
    fn output_with_open_prompt_lands_before_marker() {
        let mut console = Console::default();
        console.open_prompt();
        type_line(&mut console, "partial");
        let boundary_before = console.prompt_start();
        console.append_output("child says hi");
        // Output sits above the prompt; partial input still at the tail.
        assert!(console.transcript().ends_with("> partial"));
        assert!(console.transcript().starts_with("child says hi\n"));
        assert!(console.prompt_start() > boundary_before);
    }

    #[test]
    fn keys_suppressed_when_no_prompt_open() {
        let mut console = Console::default();
        console.append_output("done");
        assert_eq!(console.handle_key(0, Key::Char('x')), KeyOutcome::Suppressed);
        assert_eq!(
            console.handle_key(0, Key::Enter),
            KeyOutcome::Suppressed
        );
    }

    #[test]
    fn clear_resets_boundary() {
        let mut console = Console::default();
        console.append_output("line");
        console.open_prompt();
        console.clear();
        assert_eq!(console.transcript(), "");
        assert_eq!(console.prompt_start(), 0);
        assert!(!console.is_prompt_open());
    }

    #[test]
    fn custom_marker_is_used() {
        let mut console = Console::new("$ ");
        console.open_prompt();
        assert_eq!(console.transcript(), "$ ");
    }
}
