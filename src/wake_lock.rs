//! Best-effort wake lock held while the countdown runs.
//!
//! Implemented by keeping a platform inhibitor process alive
//! (`systemd-inhibit` on Linux, `caffeinate` on macOS). The inhibitor wraps
//! `cat` reading from a pipe we own, so closing the pipe on release ends the
//! whole process tree.

use std::io;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum WakeLockError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },
}

pub trait WakeLock {
    /// Acquires the lock. Acquiring a held lock does nothing.
    fn acquire(&mut self) -> Result<(), WakeLockError>;

    /// Releases the lock if held.
    fn release(&mut self);

    fn is_held(&self) -> bool;
}

/// Wake lock for platforms without an inhibitor, and for tests.
#[derive(Debug, Default)]
pub struct NoWakeLock {
    held: bool,
}

impl WakeLock for NoWakeLock {
    fn acquire(&mut self) -> Result<(), WakeLockError> {
        self.held = true;
        Ok(())
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_held(&self) -> bool {
        self.held
    }
}

/// How long a released inhibitor gets to exit on its own before it is killed.
const RELEASE_GRACE: Duration = Duration::from_secs(1);

/// Holds the lock for as long as a child process runs.
///
/// The child gets a piped stdin and must exit once that pipe closes.
#[derive(Debug)]
pub struct InhibitorProcess {
    program: &'static str,
    args: Vec<String>,
    child: Option<Child>,
}

impl InhibitorProcess {
    pub fn new(program: &'static str, args: &[&str]) -> Self {
        Self {
            program,
            args: args.iter().map(|arg| arg.to_string()).collect(),
            child: None,
        }
    }
}

/// Waits up to `grace` for `child` to exit.
fn wait_for_exit(child: &mut Child, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "failed to poll wake lock process");
                return false;
            }
        }
    }
}

impl WakeLock for InhibitorProcess {
    fn acquire(&mut self) -> Result<(), WakeLockError> {
        if self.child.is_some() {
            return Ok(());
        }

        let child = Command::new(self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| WakeLockError::Spawn {
                program: self.program,
                source,
            })?;

        debug!(program = self.program, pid = child.id(), "wake lock acquired");
        self.child = Some(child);
        Ok(())
    }

    fn release(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        // EOF on stdin ends the wrapped `cat`, and with it the inhibitor.
        drop(child.stdin.take());
        if !wait_for_exit(&mut child, RELEASE_GRACE) {
            warn!(program = self.program, "wake lock process ignored EOF, killing it");
            if let Err(e) = child.kill() {
                warn!(program = self.program, error = %e, "failed to stop wake lock process");
            }
        }
        // Reap so the inhibitor does not linger as a zombie.
        let _ = child.wait();
        debug!(program = self.program, "wake lock released");
    }

    fn is_held(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for InhibitorProcess {
    fn drop(&mut self) {
        self.release();
    }
}

/// Returns the wake lock for the current platform.
pub fn platform() -> Box<dyn WakeLock> {
    if cfg!(target_os = "linux") {
        Box::new(InhibitorProcess::new(
            "systemd-inhibit",
            &[
                "--what=idle:sleep",
                "--who=pomocycle",
                "--why=Interval timer running",
                "cat",
            ],
        ))
    } else if cfg!(target_os = "macos") {
        Box::new(InhibitorProcess::new("caffeinate", &["-i", "cat"]))
    } else {
        Box::new(NoWakeLock::default())
    }
}
