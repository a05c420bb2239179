//! Child-process plumbing shared by the build and run paths.

use tokio::process::{Child, Command};

/// RAII guard that kills a child process on drop.
///
/// Wrap a spawned child immediately after `spawn()` so the process is
/// reaped even if the owning future is cancelled. Call `disarm()` once the
/// child has exited normally.
pub(crate) struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    pub fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    pub fn child_mut(&mut self) -> &mut Child {
        self.child.as_mut().expect("child present")
    }

    pub fn disarm(&mut self) {
        self.child = None;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        kill_child(child);
        let _ = child.try_wait();
    }
}

/// Forceful, best-effort kill. Errors from an already-dead process are
/// swallowed; terminating a dead child is not an error.
pub(crate) fn kill_child(child: &mut Child) {
    #[cfg(unix)]
    {
        // The child was placed in its own session, so its pid doubles as a
        // process group id; take the whole group down with it.
        if let Some(pid) = child.id() {
            unsafe {
                if libc::killpg(pid as i32, libc::SIGKILL) == -1 {
                    let _ = child.start_kill();
                }
            }
            return;
        }
    }
    let _ = child.start_kill();
}

/// Put the child in its own session (Unix only) so `kill_child` can target
/// the whole process group, and arrange for the kernel to reap it if the
/// host dies first.
#[cfg(unix)]
pub(crate) fn set_new_session(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    unsafe {
        cmd.as_std_mut().pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            #[cfg(target_os = "linux")]
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

/// Keep the child from opening a console window of its own.
#[cfg(windows)]
pub(crate) fn suppress_console_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    cmd.as_std_mut()
        .creation_flags(windows_sys::Win32::System::Threading::CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
pub(crate) fn suppress_console_window(_cmd: &mut Command) {}
