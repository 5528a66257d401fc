//! CLI argument parsing and config-file token prepending.
//!
//! The original parses `sys.argv` once with `argparse`, then — if the
//! resolved `-f`/`--config-file` path exists — re-parses with that file's
//! whitespace-split contents prepended to the *original* argv (so a later
//! command-line flag always wins over the file). `load_args` reproduces
//! that exact two-pass behavior using `clap`'s derive API in place of
//! `argparse`.

use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `start|stop|restart|suspend|resume|status`.
///
/// Modeled as a plain positional `ValueEnum`, not a `#[command(subcommand)]`
/// tree: the original is a single flat `argparse` parser with one
/// positional `cmd` choice and a handful of options that may appear in any
/// order relative to it (`thermal-control -c 2 start` and
/// `thermal-control start -c 2` are both valid). Clap's nested-subcommand
/// style partitions options by which side of the subcommand name they fall
/// on, which would reject the first form; a positional enum keeps the
/// original's flat, order-independent option parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Command {
    /// Run the controller in the foreground (or daemonized with `-d`).
    Start,
    /// Signal a running daemon to stop.
    Stop,
    /// `stop` then `start`.
    Restart,
    /// Write `1` to `config/suspend`.
    Suspend,
    /// Write `0` to `config/suspend`.
    Resume,
    /// Exit 0 and print "service is running" if the pidfile names a live process.
    Status,
}

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct Flags {
    /// `-c`: system thermal class (1..6; 6 aliases TC5).
    #[arg(short = 'c', long = "class", default_value_t = 1)]
    pub class: u8,

    /// `-t`: fan tacho count for this system.
    #[arg(short = 't', long = "max-tacho", default_value_t = 4)]
    pub tacho: u16,

    /// `-p`: replaceable PSU count for this system.
    #[arg(short = 'p', long = "max-psu", default_value_t = 0)]
    pub psu: u16,

    /// `-f`: config file whose whitespace-split tokens are prepended to argv.
    #[arg(short = 'f', long = "config-file", default_value = "/etc/thermal-control.conf")]
    pub config_file: PathBuf,

    /// `-l`: additional log file.
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// `-s`: also log to syslog.
    #[arg(short = 's', long = "syslog", default_value_t = false)]
    pub syslog: bool,

    /// `-r`: hw-management root folder.
    #[arg(short = 'r', long = "root-folder", default_value = "/var/run/hw-management")]
    pub root_folder: PathBuf,

    /// `-w`: seconds to sleep before the controller starts ticking.
    #[arg(short = 'w', long = "wait", default_value_t = 0)]
    pub wait: u64,

    /// `-d`: daemonize (double-fork + detach) before running.
    #[arg(short = 'd', long = "daemonize", default_value_t = false)]
    pub daemonize: bool,
}

/// Documents the same fields `-f`'s whitespace-token file may set, as a
/// round-trippable TOML document. The daemon never reads this format
/// itself (its actual config file is the flat argparse-style token list
/// `parse_with_config_prepend` handles above); this exists so operators
/// have a generated, validated starting point instead of hand-writing the
/// token file from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleConfig {
    pub class: u8,
    pub tacho: u16,
    pub psu: u16,
    pub log_file: Option<PathBuf>,
    pub syslog: bool,
    pub root_folder: PathBuf,
    pub wait: u64,
    pub daemonize: bool,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            class: 1,
            tacho: 4,
            psu: 0,
            log_file: None,
            syslog: false,
            root_folder: PathBuf::from("/var/run/hw-management"),
            wait: 0,
            daemonize: false,
        }
    }
}

impl SampleConfig {
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }
}

#[derive(Debug, Parser)]
#[command(name = "thermal-controld")]
#[command(about = "Thermal control daemon for switch ASIC/optics/gearbox/fan/PSU cooling")]
#[command(version)]
pub struct Cli {
    /// `start|stop|restart|suspend|resume|status`.
    #[arg(value_enum)]
    pub command: Command,

    #[command(flatten)]
    pub flags: Flags,
}

/// Parses `std::env::args()`, then — if the resolved config file exists —
/// re-parses with its tokens prepended ahead of the original argv.
pub fn load_args() -> Result<Cli> {
    let argv: Vec<String> = std::env::args().collect();
    parse_with_config_prepend(&argv)
}

fn parse_with_config_prepend(argv: &[String]) -> Result<Cli> {
    let first_pass =
        Cli::try_parse_from(argv.iter().cloned()).map_err(|e| Error::Config(e.to_string()))?;

    if !first_pass.flags.config_file.exists() {
        return Ok(first_pass);
    }

    let contents = std::fs::read_to_string(&first_pass.flags.config_file)?;
    let mut full_argv = Vec::with_capacity(argv.len() + 8);
    full_argv.push(argv[0].clone());
    full_argv.extend(contents.split_whitespace().map(str::to_string));
    full_argv.extend(argv[1..].iter().cloned());

    Cli::try_parse_from(full_argv).map_err(|e| Error::Config(e.to_string()))
}
