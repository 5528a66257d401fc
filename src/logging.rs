//! Three-parallel-sink message logging.
//!
//! Tick-level diagnostics (`log::info!`/`warn!`/`error!`, used throughout
//! `hwmtree`, `zone_governor`, `controller`, ...) are routed through a
//! [`FanoutLogger`] installed once at startup: every record is written to
//! stderr (with `env_logger`-style formatting) and, if configured,
//! mirrored to a log file and to syslog.
//!
//! CLI lifecycle messages (`start`/`stop`/`restart`/`status` announcements)
//! use the original's distinct `action`/`success`/`failure`/`warn` verbs,
//! which additionally shell out to the init-functions script
//! (`log_action_msg` et al.) the way the original `Logger` class does —
//! [`DaemonLogger`] carries that behavior forward.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Installed-once fan-out logger backing every `log::*!` call in the crate.
struct FanoutLogger {
    file: Option<Mutex<std::fs::File>>,
    use_syslog: bool,
}

impl Log for FanoutLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{} [{}] {}",
            chrono_like_timestamp(),
            record.level(),
            record.args()
        );
        eprintln!("{line}");

        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{line}");
            }
        }

        if self.use_syslog {
            syslog_shellout(record.level(), &record.args().to_string());
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                let _ = f.flush();
            }
        }
    }
}

/// No `chrono`/`time` dependency for this file-sink format; the original's
/// own `logging.Formatter` line
/// (`%(asctime)s - %(levelname)s - %(message)s`) is mirrored with a
/// monotonic-ish wall clock via `SystemTime`, which is all `std` offers
/// without pulling in a date-formatting crate purely for a log prefix.
fn chrono_like_timestamp() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}

fn syslog_priority(level: Level) -> &'static str {
    match level {
        Level::Error => "daemon.err",
        Level::Warn => "daemon.warning",
        _ => "daemon.info",
    }
}

/// Mirrors a record to the system log via the standard `logger(1)` CLI,
/// an optional syslog sink (via a `logger`-over-shellout,
/// matching the original's `logger`-over-subprocess approach)".
fn syslog_shellout(level: Level, msg: &str) {
    let priority = syslog_priority(level);
    if let Err(e) = Command::new("logger")
        .args(["-t", "thermal-controld", "-p", priority, msg])
        .status()
    {
        eprintln!("logging: syslog shellout failed (ignored): {e}");
    }
}

/// Installs the fan-out logger. Call once, from `main`, before the
/// controller starts ticking.
pub fn init(log_file: Option<&Path>, use_syslog: bool) -> Result<(), crate::error::Error> {
    let file = match log_file {
        Some(path) => {
            let f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(Mutex::new(f))
        }
        None => None,
    };

    let logger = FanoutLogger { file, use_syslog };
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| crate::error::Error::Config(format!("logger already installed: {e}")))?;
    log::set_max_level(LevelFilter::Info);
    Ok(())
}

/// The original `Logger` class's `action`/`success`/`failure`/`warn` verbs:
/// each logs through the installed [`FanoutLogger`] *and* shells out to the
/// init-functions script, matching the distinct CLI-visible wording the
/// original prints on `start`/`stop`/`restart`/`status`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DaemonLogger;

impl DaemonLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn action(&self, msg: &str) {
        log::info!("{msg}");
        self.init_functions_shellout("log_action_msg", msg);
    }

    pub fn success(&self, msg: &str) {
        log::info!("{msg}");
        self.init_functions_shellout("log_success_msg", msg);
    }

    pub fn failure(&self, msg: &str) {
        log::error!("{msg}");
        self.init_functions_shellout("log_failure_msg", msg);
    }

    pub fn warn(&self, msg: &str) {
        log::warn!("{msg}");
        self.init_functions_shellout("log_warning_msg", msg);
    }

    fn init_functions_shellout(&self, func: &str, msg: &str) {
        let script = format!(". /lib/lsb/init-functions && {func} '{}'", msg.replace('\'', "'\\''"));
        if let Err(e) = Command::new("sh").arg("-c").arg(script).status() {
            eprintln!("logging: init-functions shellout failed (ignored): {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syslog_priority_maps_error_and_warn() {
        assert_eq!(syslog_priority(Level::Error), "daemon.err");
        assert_eq!(syslog_priority(Level::Warn), "daemon.warning");
        assert_eq!(syslog_priority(Level::Info), "daemon.info");
    }

    #[test]
    fn daemon_logger_without_file_does_not_panic() {
        let logger = DaemonLogger::new();
        // shellout targets may not exist in the test sandbox; the call must
        // not panic regardless.
        logger.action("test action message");
    }
}
