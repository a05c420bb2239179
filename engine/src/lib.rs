//! Engine - the single coordinator.
//!
//! Owns the supervisor, the console, and the current editor mode. All
//! shared state (console transcript, highlight results) is mutated here
//! and only here; reader tasks reach this context exclusively through the
//! supervisor's event channel, drained by [`Engine::pump`].
//!
//! The host talks to kiln through the methods on [`Engine`] and listens on
//! the [`HostEvent`] channel returned by [`Engine::new`].


use tokio::sync::mpsc;

use kiln_config::KilnConfig;
use kiln_console::{Console, DEFAULT_PROMPT, KeyOutcome};
use kiln_toolchain::{Supervisor, SupervisorEvent, SupervisorOptions};
use kiln_types::{BuildArtifact, Diagnostic, EditorMode, HighlightSpan, Key, ToolchainError};

/// Channel capacity for events flowing back to the host.
const HOST_CHANNEL_CAPACITY: usize = 256;

/// Notifications for the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A fresh highlight result for the last snapshot handed in.
    HighlightReady(Vec<HighlightSpan>),
    /// One parsed compiler message; the host marks the editor line.
    Diagnostic(Diagnostic),
    /// Text appended to the console surface (child output, status lines,
    /// prompt markers). Keystroke echoes are not mirrored here - the host
    /// widget already shows them; `transcript()` holds the full surface.
    ConsoleAppend(String),
    BuildFinished { success: bool },
    RunFinished,
}

/// The core's host-facing coordinator.
pub struct Engine {
    mode: EditorMode,
    supervisor: Supervisor,
    events: mpsc::Receiver<SupervisorEvent>,
    console: Console,
    prompt_marker: String,
    host_tx: mpsc::Sender<HostEvent>,
}

impl Engine {
    /// Build the engine and the host event channel.
    #[must_use]
    pub fn new(config: &KilnConfig) -> (Self, mpsc::Receiver<HostEvent>) {
        let toolchain = config.toolchain.as_ref();
        let options = SupervisorOptions {
            compiler: toolchain.and_then(|t| t.binary.clone()),
            extra_args: toolchain.map(|t| t.extra_args.clone()).unwrap_or_default(),
            temp_dir: toolchain.and_then(|t| t.temp_dir.clone()),
        };
        let (supervisor, events) = Supervisor::new(options);

        let marker = config
            .console
            .as_ref()
            .and_then(|c| c.prompt.clone())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string());

        let (host_tx, host_rx) = mpsc::channel(HOST_CHANNEL_CAPACITY);
        let engine = Self {
            mode: EditorMode::default(),
            supervisor,
            events,
            console: Console::new(marker.clone()),
            prompt_marker: marker,
            host_tx,
        };
        (engine, host_rx)
    }

    #[must_use]
    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    /// Full console surface, for hosts that re-render rather than mirror
    /// appends.
    #[must_use]
    pub fn transcript(&self) -> &str {
        self.console.transcript()
    }

    #[must_use]
    pub fn is_run_live(&self) -> bool {
        self.supervisor.is_run_live()
    }

    /// Switch the buffer mode. Leaving C-like mode invalidates any
    /// in-flight run, so a live child is terminated. The host follows up
    /// with `request_highlight` for the current snapshot.
    pub async fn set_mode(&mut self, mode: EditorMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        if mode == EditorMode::PlainText && self.supervisor.is_run_live() {
            self.supervisor.terminate_run().await;
        }
    }

    /// Re-color a buffer snapshot under the current mode.
    ///
    /// Pure computation invoked only from this coordinator, never from a
    /// change-notification handler - there is no re-entry to guard
    /// against.
    pub fn request_highlight(&mut self, text: &str) -> Vec<HighlightSpan> {
        let spans = kiln_highlight::highlight(text, self.mode);
        self.emit(HostEvent::HighlightReady(spans.clone()));
        spans
    }

    /// Compile a buffer snapshot.
    ///
    /// Clears the console, blocks this coordination flow until the
    /// toolchain exits, then surfaces diagnostics and a closing status
    /// line. Recoverable failures land in the console and the returned
    /// error; the engine stays usable for a retry.
    pub async fn request_compile(
        &mut self,
        text: &str,
    ) -> Result<BuildArtifact, ToolchainError> {
        self.console.clear();

        match self.supervisor.compile(text).await {
            Ok(artifact) => {
                // Build output lines queued while we were waiting.
                self.pump();
                for diagnostic in &artifact.diagnostics {
                    self.emit(HostEvent::Diagnostic(diagnostic.clone()));
                }
                let status = if artifact.success {
                    "build succeeded"
                } else {
                    "build failed"
                };
                self.console_line(status);
                self.emit(HostEvent::BuildFinished {
                    success: artifact.success,
                });
                Ok(artifact)
            }
            Err(e) => {
                self.console_line(&e.to_string());
                self.emit(HostEvent::BuildFinished { success: false });
                Err(e)
            }
        }
    }

    /// Launch the last compiled binary and open the first prompt.
    pub async fn request_run(&mut self) -> Result<(), ToolchainError> {
        match self.supervisor.run().await {
            Ok(()) => {
                self.open_prompt();
                Ok(())
            }
            Err(e) => {
                self.console_line(&e.to_string());
                Err(e)
            }
        }
    }

    /// Arbitrate one console keystroke; Enter forwards the submitted line
    /// to the run child.
    pub async fn console_key(&mut self, caret: usize, key: Key) -> KeyOutcome {
        let outcome = self.console.handle_key(caret, key);
        if let KeyOutcome::Submitted(line) = &outcome {
            self.forward_line(line.clone()).await;
        }
        outcome
    }

    /// Submit a full console line programmatically, as if typed at the
    /// prompt and terminated with Enter.
    pub async fn send_console_line(&mut self, text: &str) {
        let mut caret = self.console.transcript().len();
        for ch in text.chars() {
            self.console.handle_key(caret, Key::Char(ch));
            caret = self.console.transcript().len();
        }
        if let KeyOutcome::Submitted(line) = self.console.handle_key(caret, Key::Enter) {
            self.forward_line(line).await;
        }
    }

    /// Drain pending supervisor events into console mutations and host
    /// events. Non-blocking; call from the host's idle loop.
    pub fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                SupervisorEvent::Line { line, .. } => {
                    self.console.append_output(&line);
                    self.emit(HostEvent::ConsoleAppend(format!("{line}\n")));
                }
                SupervisorEvent::RunExited { success } => {
                    self.console.close_prompt();
                    let notice = if success {
                        "[program finished]"
                    } else {
                        "[program terminated]"
                    };
                    self.console_line(notice);
                    self.emit(HostEvent::RunFinished);
                }
            }
        }
    }

    /// Terminate all owned children before host exit. Bounded; an
    /// unreapable child is logged and abandoned rather than blocking exit.
    pub async fn shutdown(&mut self) {
        self.supervisor.shutdown().await;
    }

    /// Forward a submitted line to the run child; a write failure is
    /// reported inline in the console and is not fatal.
    async fn forward_line(&mut self, line: String) {
        if let Err(e) = self.supervisor.send_line(&line).await {
            tracing::warn!("console line not delivered: {e}");
            self.console_line(&e.to_string());
        }
    }

    fn open_prompt(&mut self) {
        self.console.open_prompt();
        self.emit(HostEvent::ConsoleAppend(self.prompt_marker.clone()));
    }

    fn console_line(&mut self, line: &str) {
        self.console.append_output(line);
        self.emit(HostEvent::ConsoleAppend(format!("{line}\n")));
    }

    fn emit(&self, event: HostEvent) {
        if self.host_tx.try_send(event).is_err() {
            tracing::warn!("host event dropped: channel full or closed");
        }
    }
}
