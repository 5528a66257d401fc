//! Pushes a PSU fan speed byte over I²C matching the current cooling level.

use std::process::Command;

use crate::hwmtree::HwmTree;

/// `FAN_MAX_STATE`: the kernel cooling-device baseline offset. `cooling_cur_state`
/// is on the 10..20 `dynamic_min` scale; the PSU speed vector
/// is indexed 0..10, so the offset is subtracted before indexing.
const FAN_MAX_STATE: i64 = 10;

/// 11-entry PSU fan speed byte vector, indexed by `cooling_cur_state -
/// FAN_MAX_STATE` clamped to `0..=10`. Values taken verbatim from
/// `original_source`'s `PSU_FAN_SPEED`.
const PSU_FAN_SPEED: [&str; 11] = [
    "0x3c", "0x3c", "0x3c", "0x3c", "0x3c", "0x3c", "0x3c", "0x46", "0x50", "0x5a", "0x64",
];

/// Looks up the speed byte for a given `cooling_cur_state` value.
pub fn speed_for_cooling_state(cooling_cur_state: i64) -> &'static str {
    let idx = (cooling_cur_state - FAN_MAX_STATE).clamp(0, 10) as usize;
    PSU_FAN_SPEED[idx]
}

/// Drives PSU fan speed via `i2cset`.
pub struct PsuFanSync<'a> {
    tree: &'a HwmTree,
    max_psus: u16,
}

impl<'a> PsuFanSync<'a> {
    pub fn new(tree: &'a HwmTree, max_psus: u16) -> Self {
        Self { tree, max_psus }
    }

    /// For each powered PSU, shell out `i2cset -f -y <bus> <addr> <cmd>
    /// <speed> wp`. The controller does not consume the result — a failed
    /// `i2cset` is logged and otherwise ignored, matching the original's
    /// bare `subprocess.call`.
    pub fn push(&self) {
        for psu in 1..=self.max_psus {
            if self.tree.thermal_read_str(&format!("psu{psu}_pwr_status"), "0") != "1" {
                continue;
            }
            let bus = self.tree.read_str(&format!("config/psu{psu}_i2c_bus"), "");
            let addr = self.tree.read_str(&format!("config/psu{psu}_i2c_addr"), "");
            let command = self.tree.read_str("config/fan_command", "");
            if bus.is_empty() || addr.is_empty() || command.is_empty() {
                log::warn!("psu_fan_sync: psu{psu} missing i2c config, skipping");
                continue;
            }
            let cooling = self.tree.thermal_read_int("cooling_cur_state", FAN_MAX_STATE);
            let speed = speed_for_cooling_state(cooling);

            match Command::new("i2cset")
                .args(["-f", "-y", &bus, &addr, &command, speed, "wp"])
                .status()
            {
                Ok(status) if status.success() => {}
                Ok(status) => log::warn!("psu_fan_sync: i2cset for psu{psu} exited {status}"),
                Err(e) => log::warn!("psu_fan_sync: failed to spawn i2cset for psu{psu}: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_at_baseline_cooling_state() {
        assert_eq!(speed_for_cooling_state(10), "0x3c");
    }

    #[test]
    fn speed_climbs_with_cooling_state() {
        assert_eq!(speed_for_cooling_state(17), "0x46");
        assert_eq!(speed_for_cooling_state(18), "0x50");
        assert_eq!(speed_for_cooling_state(19), "0x5a");
        assert_eq!(speed_for_cooling_state(20), "0x64");
    }

    #[test]
    fn speed_clamps_out_of_range_state() {
        assert_eq!(speed_for_cooling_state(0), "0x3c");
        assert_eq!(speed_for_cooling_state(999), "0x64");
    }
}
