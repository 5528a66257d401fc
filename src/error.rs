//! Error types for the thermal control daemon.

use std::io;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Init-time and CLI-time failures. Per-tick faults (PSU missing, tacho
/// fault, unparseable sensor value) are *not* represented here — they are
/// operational states the controller logs and recovers from on its own,
/// never propagated as an `Error`.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unix syscall error (fork/setsid/kill/sigaction).
    #[cfg(unix)]
    #[error("system call failed: {0}")]
    Nix(#[from] nix::Error),

    /// Config file could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// `-c` names a thermal class with no known table (only 1..6 supported).
    #[error("unsupported thermal class: {0}")]
    UnsupportedClass(u8),

    /// `start` found a pidfile naming a process that's still alive.
    #[error("already running (pid {0} from {1})")]
    AlreadyRunning(u32, String),

    /// `stop`/`status` found no usable pidfile.
    #[error("no pidfile at {0}")]
    NoPidfile(String),

    /// Generic process/daemon management failure.
    #[error("daemon error: {0}")]
    Daemon(String),
}
