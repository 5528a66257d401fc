//! `thermal-controld`: a closed-loop thermal control daemon for network
//! switch hardware (ASIC, optical transceiver modules, gearboxes, fan
//! tachometers, and PSUs).
//!
//! The library crate holds the control algorithm; `src/bin/main.rs` is a
//! thin CLI wrapper (`start`/`stop`/`restart`/`suspend`/`resume`/`status`)
//! gated behind the `cli` feature.

pub mod controller;
pub mod error;
pub mod highest_zone_tracker;
pub mod hwmtree;
pub mod logging;
pub mod psu_fan_sync;
pub mod sensor_view;
pub mod thermal_tables;
pub mod ticker;
pub mod zone_governor;

#[cfg(feature = "cli")]
pub mod config;

#[cfg(unix)]
pub mod daemon_proc;

pub use error::{Error, Result};
