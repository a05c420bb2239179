//! Process supervisor - owns the build and run children.
//!
//! At most one build child and one run child exist at a time. The build
//! path is synchronous from the caller's perspective (`compile` resolves
//! when the toolchain exits); the run path returns immediately after spawn
//! and stays interactive through [`Supervisor::send_line`] and the event
//! channel.
//!
//! Reader tasks never touch shared state: every complete output line is
//! handed to the single coordinator through the [`SupervisorEvent`] channel
//! returned by [`Supervisor::new`].

pub mod diagnostics;
mod process;

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use kiln_types::{BuildArtifact, ToolchainError};

use process::ChildGuard;

/// Channel capacity for the event channel between reader tasks and the
/// coordinator.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for lines queued toward the run child's stdin.
const STDIN_CHANNEL_CAPACITY: usize = 64;

/// Cap on stderr text retained for diagnostics parsing.
const MAX_COLLECTED_STDERR: usize = 1 << 20;

/// Bounded wait for a killed child to be reaped.
const KILL_TIMEOUT: Duration = Duration::from_secs(2);

/// Compilers tried in order when no override is configured.
const DEFAULT_COMPILERS: &[&str] = &["g++", "c++", "clang++"];

/// Fixed temp source name, overwritten on each compile.
const TEMP_SOURCE_NAME: &str = "temp_code.cpp";

#[cfg(windows)]
const TEMP_BINARY_NAME: &str = "temp_code.exe";
#[cfg(not(windows))]
const TEMP_BINARY_NAME: &str = "temp_code";

/// Which child a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRole {
    Build,
    Run,
}

/// Which stream of that child produced the line.
///
/// Per-stream ordering is preserved; stdout and stderr of the same child
/// may interleave relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Lines and lifecycle notices handed to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// One complete output line from a child.
    Line {
        role: ChildRole,
        stream: OutputStream,
        line: String,
    },
    /// The run child exited (naturally or by termination).
    RunExited { success: bool },
}

/// Supervisor construction options, typically derived from config.
#[derive(Debug, Default)]
pub struct SupervisorOptions {
    /// Compiler binary override; defaults try `g++`, `c++`, `clang++`.
    pub compiler: Option<String>,
    /// Extra compiler arguments inserted before the source path.
    pub extra_args: Vec<String>,
    /// Directory for the fixed temp file pair; defaults to the platform
    /// temp directory.
    pub temp_dir: Option<PathBuf>,
}

/// Live run child bookkeeping. Removal from the supervisor is the state
/// transition for termination; the `live` flag tracks natural exit.
struct RunChild {
    stdin_tx: mpsc::Sender<String>,
    kill_tx: mpsc::Sender<()>,
    live: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
}

impl RunChild {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

/// Owns the lifecycle of at most one build child and one run child.
pub struct Supervisor {
    compiler_override: Option<String>,
    extra_args: Vec<String>,
    temp_dir: PathBuf,
    event_tx: mpsc::Sender<SupervisorEvent>,
    last_artifact: Option<BuildArtifact>,
    run: Option<RunChild>,
}

impl Supervisor {
    /// Build a supervisor and the event channel the coordinator drains.
    #[must_use]
    pub fn new(options: SupervisorOptions) -> (Self, mpsc::Receiver<SupervisorEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let temp_dir = options
            .temp_dir
            .unwrap_or_else(|| std::env::temp_dir().join("kiln"));
        let supervisor = Self {
            compiler_override: options.compiler,
            extra_args: options.extra_args,
            temp_dir,
            event_tx,
            last_artifact: None,
            run: None,
        };
        (supervisor, event_rx)
    }

    /// Fixed temp source path.
    #[must_use]
    pub fn source_path(&self) -> PathBuf {
        self.temp_dir.join(TEMP_SOURCE_NAME)
    }

    /// Fixed temp binary path.
    #[must_use]
    pub fn binary_path(&self) -> PathBuf {
        self.temp_dir.join(TEMP_BINARY_NAME)
    }

    /// Most recent compile result, if any.
    #[must_use]
    pub fn last_artifact(&self) -> Option<&BuildArtifact> {
        self.last_artifact.as_ref()
    }

    /// Whether a run child is currently live.
    #[must_use]
    pub fn is_run_live(&self) -> bool {
        self.run.as_ref().is_some_and(RunChild::is_live)
    }

    /// Locate the compiler: configured override first, then the default
    /// candidates in order.
    fn resolve_compiler(&self) -> Result<PathBuf, ToolchainError> {
        if let Some(name) = &self.compiler_override {
            return which::which(name).map_err(|_| ToolchainError::ToolchainNotFound {
                name: name.clone(),
            });
        }
        for candidate in DEFAULT_COMPILERS {
            if let Ok(path) = which::which(candidate) {
                return Ok(path);
            }
        }
        Err(ToolchainError::ToolchainNotFound {
            name: DEFAULT_COMPILERS.join("/"),
        })
    }

    /// Compile a source snapshot with the external toolchain.
    ///
    /// Terminates any live run child first - the old binary must not be
    /// held open when it is replaced. Resolves when the toolchain exits;
    /// output lines stream through the event channel while it runs.
    pub async fn compile(&mut self, source_text: &str) -> Result<BuildArtifact, ToolchainError> {
        self.terminate_run().await;

        let compiler = self.resolve_compiler()?;
        let source_path = self.source_path();
        let binary_path = self.binary_path();

        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| ToolchainError::io("creating temp directory", e))?;
        tokio::fs::write(&source_path, source_text)
            .await
            .map_err(|e| ToolchainError::io("writing temp source", e))?;
        match tokio::fs::remove_file(&binary_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ToolchainError::io("removing previous binary", e)),
        }

        tracing::info!(compiler = %compiler.display(), "starting build");

        let mut cmd = Command::new(&compiler);
        cmd.args(&self.extra_args)
            .arg(&source_path)
            .arg("-o")
            .arg(&binary_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        process::set_new_session(&mut cmd);
        process::suppress_console_window(&mut cmd);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolchainError::ToolchainNotFound {
                    name: compiler.display().to_string(),
                }
            } else {
                ToolchainError::io("launching toolchain", e)
            }
        })?;
        let mut guard = ChildGuard::new(child);

        let stdout = guard
            .child_mut()
            .stdout
            .take()
            .ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = guard
            .child_mut()
            .stderr
            .take()
            .ok_or_else(|| missing_pipe("stderr"))?;

        let stdout_task = tokio::spawn(read_lines(
            stdout,
            self.event_tx.clone(),
            ChildRole::Build,
            OutputStream::Stdout,
        ));
        let stderr_task = tokio::spawn(read_lines(
            stderr,
            self.event_tx.clone(),
            ChildRole::Build,
            OutputStream::Stderr,
        ));

        let status = guard
            .child_mut()
            .wait()
            .await
            .map_err(|e| ToolchainError::io("waiting for toolchain", e))?;
        guard.disarm();

        let _ = stdout_task.await;
        let stderr_text = stderr_task.await.unwrap_or_default();

        let success = status.success();
        let artifact = BuildArtifact {
            source_path,
            binary_path,
            success,
            diagnostics: diagnostics::parse(&stderr_text),
        };
        tracing::info!(success, diagnostics = artifact.diagnostics.len(), "build finished");
        self.last_artifact = Some(artifact.clone());
        Ok(artifact)
    }

    /// Launch the last successfully compiled binary.
    ///
    /// Returns immediately after spawn; output lines and the exit notice
    /// arrive through the event channel. Never blocks the coordinator.
    pub async fn run(&mut self) -> Result<(), ToolchainError> {
        if self.is_run_live() {
            return Err(ToolchainError::ProcessAlreadyRunning);
        }
        let artifact = self
            .last_artifact
            .as_ref()
            .filter(|artifact| artifact.success)
            .ok_or(ToolchainError::NoExecutableAvailable)?;
        if !artifact.binary_path.exists() {
            return Err(ToolchainError::NoExecutableAvailable);
        }

        let mut cmd = Command::new(&artifact.binary_path);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        process::set_new_session(&mut cmd);
        process::suppress_console_window(&mut cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| ToolchainError::io("launching program", e))?;

        tracing::info!(binary = %artifact.binary_path.display(), "program started");

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        tokio::spawn(read_lines(
            stdout,
            self.event_tx.clone(),
            ChildRole::Run,
            OutputStream::Stdout,
        ));
        tokio::spawn(read_lines(
            stderr,
            self.event_tx.clone(),
            ChildRole::Run,
            OutputStream::Stderr,
        ));

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(STDIN_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_rx.recv().await {
                let mut payload = line.into_bytes();
                payload.push(b'\n');
                if let Err(e) = stdin.write_all(&payload).await {
                    tracing::warn!("stdin write to run child failed: {e}");
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    tracing::warn!("stdin flush to run child failed: {e}");
                    break;
                }
            }
        });

        let live = Arc::new(AtomicBool::new(true));
        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
        let monitor_live = live.clone();
        let monitor_tx = self.event_tx.clone();
        let monitor = tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx.recv() => {
                    process::kill_child(&mut child);
                    child.wait().await
                }
            };
            monitor_live.store(false, Ordering::Release);
            let success = status.as_ref().is_ok_and(std::process::ExitStatus::success);
            match status {
                Ok(status) => tracing::info!(%status, "program exited"),
                Err(e) => tracing::warn!("failed to reap run child: {e}"),
            }
            let _ = monitor_tx.send(SupervisorEvent::RunExited { success }).await;
        });

        self.run = Some(RunChild {
            stdin_tx,
            kill_tx,
            live,
            monitor: Some(monitor),
        });
        Ok(())
    }

    /// Forward one line to the run child's stdin.
    pub async fn send_line(&self, line: &str) -> Result<(), ToolchainError> {
        let run = self
            .run
            .as_ref()
            .filter(|run| run.is_live())
            .ok_or(ToolchainError::StdinWriteFailure)?;
        run.stdin_tx
            .send(line.to_string())
            .await
            .map_err(|_| ToolchainError::StdinWriteFailure)
    }

    /// Forcefully terminate the run child, if any, and wait (bounded) for
    /// it to be reaped. Idempotent: terminating an already-exited child is
    /// not an error.
    pub async fn terminate_run(&mut self) {
        let Some(mut run) = self.run.take() else {
            return;
        };
        let _ = run.kill_tx.try_send(());
        if let Some(monitor) = run.monitor.take() {
            if tokio::time::timeout(KILL_TIMEOUT, monitor).await.is_err() {
                tracing::warn!("run child was not reaped within the kill window");
            }
        }
    }

    /// Terminate everything still owned before host exit. Never blocks
    /// indefinitely.
    pub async fn shutdown(&mut self) {
        self.terminate_run().await;
    }
}

fn missing_pipe(name: &str) -> ToolchainError {
    ToolchainError::io(
        "capturing child pipes",
        std::io::Error::other(format!("failed to capture child {name}")),
    )
}

/// Read complete lines from a child stream and hand them to the
/// coordinator, preserving per-stream order. Returns the collected text
/// (capped) for diagnostics parsing.
///
/// Build lines must use `try_send`: the coordinator is blocked inside
/// `compile` while these readers run, so awaiting channel capacity there
/// could deadlock. Run lines use backpressure sends - the coordinator is
/// never blocked while a run child is live.
async fn read_lines<R>(
    reader: R,
    tx: mpsc::Sender<SupervisorEvent>,
    role: ChildRole,
    stream: OutputStream,
) -> String
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    let mut collected = String::new();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        if collected.len() < MAX_COLLECTED_STDERR {
            collected.push_str(&line);
            collected.push('\n');
        }
        let event = SupervisorEvent::Line { role, stream, line };
        match role {
            ChildRole::Build => {
                if tx.try_send(event).is_err() {
                    tracing::warn!("build output line dropped: event channel full");
                }
            }
            ChildRole::Run => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::{Supervisor, SupervisorOptions};
    use kiln_types::ToolchainError;

    fn options_with_compiler(compiler: &str, temp_dir: std::path::PathBuf) -> SupervisorOptions {
        SupervisorOptions {
            compiler: Some(compiler.to_string()),
            extra_args: Vec::new(),
            temp_dir: Some(temp_dir),
        }
    }

    #[tokio::test]
    async fn run_before_any_compile_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (mut supervisor, _rx) =
            Supervisor::new(options_with_compiler("g++", dir.path().to_path_buf()));
        let err = supervisor.run().await.unwrap_err();
        assert!(matches!(err, ToolchainError::NoExecutableAvailable));
        assert!(!supervisor.is_run_live());
    }

    #[tokio::test]
    async fn missing_compiler_is_a_distinct_condition() {
        let dir = tempfile::tempdir().unwrap();
        let (mut supervisor, _rx) = Supervisor::new(options_with_compiler(
            "kiln-no-such-compiler",
            dir.path().to_path_buf(),
        ));
        let err = supervisor.compile("int main() {}").await.unwrap_err();
        assert!(matches!(err, ToolchainError::ToolchainNotFound { .. }));
    }

    #[tokio::test]
    async fn send_line_without_live_child_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, _rx) =
            Supervisor::new(options_with_compiler("g++", dir.path().to_path_buf()));
        let err = supervisor.send_line("hello").await.unwrap_err();
        assert!(matches!(err, ToolchainError::StdinWriteFailure));
    }

    #[tokio::test]
    async fn terminate_with_no_child_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (mut supervisor, _rx) =
            Supervisor::new(options_with_compiler("g++", dir.path().to_path_buf()));
        supervisor.terminate_run().await;
        supervisor.terminate_run().await;
    }

    #[cfg(unix)]
    mod unix {
        use super::super::{ChildRole, OutputStream, Supervisor, SupervisorEvent, SupervisorOptions};
        use kiln_types::ToolchainError;
        use std::path::{Path, PathBuf};

        /// Write an executable shell script standing in for the toolchain.
        fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
            use std::os::unix::fs::PermissionsExt;
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        /// Fake compiler: emits a runnable program into "$3" (the `-o` target).
        fn fake_compiler(dir: &Path, program_body: &str) -> PathBuf {
            let body = format!(
                "cat > \"$3\" <<'EOF'\n#!/bin/sh\n{program_body}\nEOF\nchmod +x \"$3\""
            );
            write_script(dir, "fakecc", &body)
        }

        fn options(compiler: &Path, temp_dir: &Path) -> SupervisorOptions {
            SupervisorOptions {
                compiler: Some(compiler.display().to_string()),
                extra_args: Vec::new(),
                temp_dir: Some(temp_dir.to_path_buf()),
            }
        }

        async fn next_event(
            rx: &mut tokio::sync::mpsc::Receiver<SupervisorEvent>,
        ) -> SupervisorEvent {
            tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
                .await
                .expect("event within timeout")
                .expect("channel open")
        }

        #[tokio::test]
        async fn successful_compile_produces_runnable_artifact() {
            let dir = tempfile::tempdir().unwrap();
            let compiler = fake_compiler(dir.path(), "echo built-program");
            let (mut supervisor, _rx) = Supervisor::new(options(&compiler, dir.path()));

            let artifact = supervisor.compile("int main() { return 0; }").await.unwrap();
            assert!(artifact.success);
            assert!(artifact.diagnostics.is_empty());
            assert!(artifact.binary_path.exists());
            assert_eq!(
                std::fs::read_to_string(&artifact.source_path).unwrap(),
                "int main() { return 0; }"
            );
        }

        #[tokio::test]
        async fn failed_compile_surfaces_diagnostics() {
            let dir = tempfile::tempdir().unwrap();
            let compiler = write_script(
                dir.path(),
                "fakecc",
                "echo 'temp_code.cpp:2: error: expected }' >&2\nexit 1",
            );
            let (mut supervisor, mut rx) = Supervisor::new(options(&compiler, dir.path()));

            let artifact = supervisor.compile("int main() { return").await.unwrap();
            assert!(!artifact.success);
            assert_eq!(artifact.diagnostics.len(), 1);
            assert_eq!(artifact.diagnostics[0].line, 2);

            // The diagnostic line also streamed through the event channel.
            let event = next_event(&mut rx).await;
            assert_eq!(
                event,
                SupervisorEvent::Line {
                    role: ChildRole::Build,
                    stream: OutputStream::Stderr,
                    line: "temp_code.cpp:2: error: expected }".to_string(),
                }
            );

            // And the failed artifact is not runnable.
            let err = supervisor.run().await.unwrap_err();
            assert!(matches!(err, ToolchainError::NoExecutableAvailable));
        }

        #[tokio::test]
        async fn run_echo_round_trip() {
            let dir = tempfile::tempdir().unwrap();
            let compiler = fake_compiler(dir.path(), "read line; echo \"you said $line\"");
            let (mut supervisor, mut rx) = Supervisor::new(options(&compiler, dir.path()));

            supervisor.compile("int main() {}").await.unwrap();
            supervisor.run().await.unwrap();
            assert!(supervisor.is_run_live());

            supervisor.send_line("hello").await.unwrap();

            let mut saw_echo = false;
            let mut saw_exit = false;
            while !saw_exit {
                match next_event(&mut rx).await {
                    SupervisorEvent::Line {
                        role: ChildRole::Run,
                        stream: OutputStream::Stdout,
                        line,
                    } => {
                        assert_eq!(line, "you said hello");
                        saw_echo = true;
                    }
                    SupervisorEvent::RunExited { success } => {
                        assert!(success);
                        saw_exit = true;
                    }
                    _ => {}
                }
            }
            assert!(saw_echo);
            assert!(!supervisor.is_run_live());
        }

        #[tokio::test]
        async fn second_run_refused_while_first_is_live() {
            let dir = tempfile::tempdir().unwrap();
            let compiler = fake_compiler(dir.path(), "sleep 30");
            let (mut supervisor, _rx) = Supervisor::new(options(&compiler, dir.path()));

            supervisor.compile("int main() {}").await.unwrap();
            supervisor.run().await.unwrap();
            let err = supervisor.run().await.unwrap_err();
            assert!(matches!(err, ToolchainError::ProcessAlreadyRunning));

            supervisor.terminate_run().await;
            assert!(!supervisor.is_run_live());
        }

        #[tokio::test]
        async fn compile_terminates_a_live_run_child() {
            let dir = tempfile::tempdir().unwrap();
            let compiler = fake_compiler(dir.path(), "sleep 30");
            let (mut supervisor, _rx) = Supervisor::new(options(&compiler, dir.path()));

            supervisor.compile("int main() {}").await.unwrap();
            supervisor.run().await.unwrap();
            assert!(supervisor.is_run_live());

            supervisor.compile("int main() { return 1; }").await.unwrap();
            assert!(!supervisor.is_run_live());
        }

        #[tokio::test]
        async fn terminate_after_natural_exit_is_idempotent() {
            let dir = tempfile::tempdir().unwrap();
            let compiler = fake_compiler(dir.path(), "exit 0");
            let (mut supervisor, mut rx) = Supervisor::new(options(&compiler, dir.path()));

            supervisor.compile("int main() {}").await.unwrap();
            supervisor.run().await.unwrap();

            // Wait for the natural exit notice.
            loop {
                if let SupervisorEvent::RunExited { .. } = next_event(&mut rx).await {
                    break;
                }
            }
            supervisor.terminate_run().await;
            supervisor.terminate_run().await;
            assert!(!supervisor.is_run_live());
        }

        #[tokio::test]
        async fn run_refused_when_binary_was_removed() {
            let dir = tempfile::tempdir().unwrap();
            let compiler = fake_compiler(dir.path(), "exit 0");
            let (mut supervisor, _rx) = Supervisor::new(options(&compiler, dir.path()));

            let artifact = supervisor.compile("int main() {}").await.unwrap();
            std::fs::remove_file(&artifact.binary_path).unwrap();
            let err = supervisor.run().await.unwrap_err();
            assert!(matches!(err, ToolchainError::NoExecutableAvailable));
        }
    }
}
