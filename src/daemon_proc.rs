//! Process lifecycle: double-fork daemonization, pidfile management, and
//! async-signal-safe shutdown/poke flags backing the `start`/`stop`/
//! `restart`/`status` commands and signal handling. Unix-only, matching the
//! `cfg(unix)` dependency gate on `nix`/`libc`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::{self, ForkResult};

use crate::error::{Error, Result};

/// Default pidfile path.
pub const DEFAULT_PIDFILE: &str = "/var/run/thermal-control.pid";

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static POKE_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_terminate(_signum: i32) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

extern "C" fn handle_poke(_signum: i32) {
    POKE_REQUESTED.store(true, Ordering::SeqCst);
}

/// Installs SIGTERM/SIGINT (request shutdown) and SIGUSR1/SIGUSR2 (request
/// a manual `check_trip_min_vs_current_temp` poke) handlers.
///
/// The *effect* of SIGUSR1/SIGUSR2 is taken from the original's intent (a
/// diagnostic poke), not its literal `sys.exit(1)` — the handler here only
/// sets a flag for the main loop to observe and act on, then returns; it
/// never terminates the process.
pub fn install_handlers() -> Result<()> {
    let term_action = SigAction::new(
        SigHandler::Handler(handle_terminate),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let poke_action = SigAction::new(
        SigHandler::Handler(handle_poke),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        signal::sigaction(Signal::SIGTERM, &term_action)?;
        signal::sigaction(Signal::SIGINT, &term_action)?;
        signal::sigaction(Signal::SIGUSR1, &poke_action)?;
        signal::sigaction(Signal::SIGUSR2, &poke_action)?;
    }
    Ok(())
}

/// True once SIGTERM/SIGINT has been observed. The main loop polls this
/// once per second — the poll callback itself runs synchronously, so there
/// is no asynchronous cancellation mid-tick.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Consumes a pending SIGUSR1/SIGUSR2 poke request, if any.
pub fn take_poke_requested() -> bool {
    POKE_REQUESTED.swap(false, Ordering::SeqCst)
}

/// Double-fork, detach from the controlling TTY, and redirect all three
/// standard streams to `/dev/null`, per the original `Daemon.daemonize`.
/// Unlike the original, which reopens stdout/stderr onto its own log file
/// descriptors, this redirects them unconditionally: `logging::init` opens
/// its file sink independently of fd 1/2, so nothing is lost by the time
/// it's called (it must run after `daemonize`, before any other output).
/// Must be called before any threads are spawned (forking a multithreaded
/// process is unsound).
pub fn daemonize() -> Result<()> {
    // First fork: detach the shell that launched us.
    match unsafe { unistd::fork() }? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    unistd::chdir("/")?;
    unistd::setsid()?;
    nix::sys::stat::umask(nix::sys::stat::Mode::empty());

    // Second fork: guarantee we can never reacquire a controlling TTY.
    match unsafe { unistd::fork() }? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    redirect_stdio()?;
    Ok(())
}

fn redirect_stdio() -> Result<()> {
    use std::fs::OpenOptions;
    use std::os::unix::io::AsRawFd;

    let dev_null_r = std::fs::File::open("/dev/null")?;
    unistd::dup2(dev_null_r.as_raw_fd(), 0)?;

    let dev_null_w = OpenOptions::new().write(true).open("/dev/null")?;
    unistd::dup2(dev_null_w.as_raw_fd(), 1)?;
    unistd::dup2(dev_null_w.as_raw_fd(), 2)?;
    Ok(())
}

/// Pidfile read/write/remove, plus the `/proc/<pid>` liveness check used by
/// `stop`/`status`.
pub struct Pidfile {
    path: PathBuf,
}

impl Pidfile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current process's PID. Errors if a pidfile already exists
    /// and names a still-alive process (init-time failures
    /// propagate to process exit).
    pub fn write_current_pid(&self) -> Result<()> {
        if let Some(existing) = self.read_pid() {
            if Self::process_alive(existing) {
                return Err(Error::AlreadyRunning(existing, self.path.display().to_string()));
            }
        }
        std::fs::write(&self.path, std::process::id().to_string())?;
        Ok(())
    }

    pub fn read_pid(&self) -> Option<u32> {
        std::fs::read_to_string(&self.path)
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    pub fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }

    /// `/proc/<pid>` existence, backing the `status` contract.
    pub fn process_alive(pid: u32) -> bool {
        Path::new(&format!("/proc/{pid}")).is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn pidfile_round_trips() {
        let path = std::env::temp_dir().join(format!("thermal-controld-pidfile-test-{}", std::process::id()));
        let pidfile = Pidfile::new(&path);
        pidfile.write_current_pid().unwrap();
        assert_eq!(pidfile.read_pid(), Some(std::process::id()));
        assert!(Pidfile::process_alive(std::process::id()));
        pidfile.remove();
        assert_eq!(pidfile.read_pid(), None);
    }

    #[test]
    fn nonexistent_pid_is_not_alive() {
        // PID 1 nearly always exists in a real system/container init, so use
        // an implausibly high PID instead.
        assert!(!Pidfile::process_alive(u32::MAX - 1));
    }

    #[test]
    fn poke_flag_consumed_once() {
        POKE_REQUESTED.store(true, Ordering::SeqCst);
        assert!(take_poke_requested());
        assert!(!take_poke_requested());
    }
}
