//! Typed snapshot accessors over [`HwmTree`]: ambients, tacho, PSU status,
//! and per-zone dicts.

use thiserror::Error;

use crate::hwmtree::HwmTree;
use crate::thermal_tables::{AirflowDirection, Trust};
use crate::zone_governor::{ZoneId, ZonePolicy};

/// The `(fan_amb, port_amb)` ambient pair, in milli-°C.
#[derive(Debug, Clone, Copy)]
pub struct AmbientPair {
    pub fan_milli_c: i64,
    pub port_milli_c: i64,
}

impl AmbientPair {
    /// Direction and the single ambient reading the thermal tables consume.
    ///
    /// The direction with the *lower* ambient is always the one fed to
    /// `ThermalTables::lookup` — matching the original control script's
    /// `_set_pwm_min_threshold` (`ambient = min(fan, port)`), not a
    /// per-direction-specific side. This is also literally what "the cooler
    /// side" rule.
    pub fn direction_and_ambient(&self) -> (AirflowDirection, i64) {
        use std::cmp::Ordering::*;
        match self.fan_milli_c.cmp(&self.port_milli_c) {
            Greater => (AirflowDirection::P2c, self.port_milli_c),
            Less => (AirflowDirection::C2p, self.fan_milli_c),
            Equal => (AirflowDirection::Unk, self.fan_milli_c),
        }
    }
}

/// A materialized kernel thermal zone dict; only built when the zone's mode
/// is `enabled` and it reports a non-empty temperature — preserving the
/// source's "skip reporting disabled zones" contract.
#[derive(Debug, Clone, Copy)]
pub struct ZoneSnapshot {
    pub temp_milli_c: i64,
    pub trip_norm_milli_c: i64,
    pub trip_high_milli_c: i64,
    pub trip_hot_milli_c: i64,
    pub trip_crit_milli_c: i64,
    pub policy: ZonePolicy,
}

/// Which class of required attribute was missing, for `validate()`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("FAN fault/speed attributes are not present for tacho {0}")]
    TachoAttributes(u16),
    #[error("ASIC thermal zone attributes are not present")]
    AsicZoneAttributes,
    #[error("PWM control and ASIC attributes are not present")]
    PwmAndAsicAttributes,
    #[error("QSFP module {0} fault attribute is not present")]
    ModuleFaultAttribute(u16),
    #[error("ambient temperature sensor attributes are not present")]
    AmbientAttributes,
    #[error("PSU {0} status attribute is not present")]
    PsuStatusAttribute(u16),
}

/// Snapshot-style reader over [`HwmTree`], parameterized by the topology
/// counts read once at init (`module_counter`, `gearbox_counter`,
/// `max_tachos`, `max_psus`).
pub struct SensorView<'a> {
    tree: &'a HwmTree,
    pub max_tachos: u16,
    pub max_psus: u16,
    pub module_counter: u16,
    pub gearbox_counter: u16,
}

impl<'a> SensorView<'a> {
    pub fn new(
        tree: &'a HwmTree,
        max_tachos: u16,
        max_psus: u16,
        module_counter: u16,
        gearbox_counter: u16,
    ) -> Self {
        Self {
            tree,
            max_tachos,
            max_psus,
            module_counter,
            gearbox_counter,
        }
    }

    pub fn ambient_pair(&self) -> AmbientPair {
        AmbientPair {
            fan_milli_c: self.tree.thermal_read_int("fan_amb", 0),
            port_milli_c: self.tree.thermal_read_int("port_amb", 0),
        }
    }

    pub fn suspended(&self) -> bool {
        self.tree.read_str("config/suspend", "0") == "1"
    }

    /// `untrust` if any `moduleN_temp_fault == 1`. While the system is
    /// suspended the original never evaluates module sensors and always
    /// reports `trust` — preserved here.
    pub fn trust(&self) -> Trust {
        if self.suspended() {
            return Trust::Trust;
        }
        for i in 1..=self.module_counter {
            if self.tree.thermal_read_str(&format!("module{i}_temp_fault"), "0") == "1" {
                return Trust::Untrust;
            }
        }
        Trust::Trust
    }

    pub fn tacho_fault(&self, tacho: u16) -> bool {
        self.tree.thermal_read_str(&format!("fan{tacho}_fault"), "0") == "1"
    }

    pub fn tacho_speed(&self, tacho: u16) -> i64 {
        self.tree.thermal_read_int(&format!("fan{tacho}_speed_get"), 0)
    }

    pub fn psu_present(&self, psu: u16) -> bool {
        self.tree.thermal_read_str(&format!("psu{psu}_status"), "0") == "1"
    }

    pub fn psu_powered(&self, psu: u16) -> bool {
        self.tree.thermal_read_str(&format!("psu{psu}_pwr_status"), "0") == "1"
    }

    pub fn module_temp_milli_c(&self, module: u16) -> Option<i64> {
        if !self.tree.thermal_exists(&format!("module{module}_temp")) {
            return None;
        }
        Some(self.tree.thermal_read_int(&format!("module{module}_temp"), 0))
    }

    /// Read a zone dict, returning `None` if the zone reports no temperature
    /// or mode is not `enabled` (disabled zones are not reported).
    pub fn read_zone(&self, zone: &ZoneId) -> Option<ZoneSnapshot> {
        let dir = zone.dir_name();
        if !self.tree.thermal_exists(&format!("{dir}/thermal_zone_temp")) {
            return None;
        }
        let mode = self.tree.thermal_read_str(&format!("{dir}/thermal_zone_mode"), "disabled");
        if mode != "enabled" {
            return None;
        }
        let policy = match self.tree.thermal_read_str(&format!("{dir}/thermal_zone_policy"), "step_wise").as_str() {
            "user_space" => ZonePolicy::UserSpace,
            _ => ZonePolicy::StepWise,
        };
        Some(ZoneSnapshot {
            temp_milli_c: self.tree.thermal_read_int(&format!("{dir}/thermal_zone_temp"), 0),
            trip_norm_milli_c: self.tree.thermal_read_int(&format!("{dir}/temp_trip_norm"), 0),
            trip_high_milli_c: self.tree.thermal_read_int(&format!("{dir}/temp_trip_high"), 0),
            trip_hot_milli_c: self.tree.thermal_read_int(&format!("{dir}/temp_trip_hot"), 0),
            trip_crit_milli_c: self.tree.thermal_read_int(&format!("{dir}/temp_trip_crit"), 0),
            policy,
        })
    }

    /// Confirms every attribute the controller depends on is present.
    /// Mirrors `_validate_thermal_configuration`'s check order and messages.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for i in 1..=self.max_tachos {
            if !self.tree.thermal_exists(&format!("fan{i}_fault"))
                || !self.tree.thermal_exists(&format!("fan{i}_speed_get"))
            {
                return Err(ValidationError::TachoAttributes(i));
            }
        }

        if !self.tree.thermal_exists("cooling_cur_state")
            || !self.tree.thermal_exists("mlxsw/thermal_zone_mode")
            || !self.tree.thermal_exists("mlxsw/temp_trip_norm")
            || !self.tree.thermal_exists("mlxsw/thermal_zone_temp")
        {
            return Err(ValidationError::AsicZoneAttributes);
        }

        if !self.tree.thermal_exists("pwm1") || !self.tree.thermal_exists("asic") {
            return Err(ValidationError::PwmAndAsicAttributes);
        }

        for i in 1..=self.module_counter {
            if self.tree.thermal_exists(&format!("module{i}_temp"))
                && !self.tree.thermal_exists(&format!("module{i}_temp_fault"))
            {
                return Err(ValidationError::ModuleFaultAttribute(i));
            }
        }

        if !self.tree.thermal_exists("fan_amb") || !self.tree.thermal_exists("port_amb") {
            return Err(ValidationError::AmbientAttributes);
        }

        for i in 1..=self.max_psus {
            if !self.tree.thermal_exists(&format!("psu{i}_status")) {
                return Err(ValidationError::PsuStatusAttribute(i));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    struct ScratchDir(std::path::PathBuf);

    impl ScratchDir {
        fn new() -> Self {
            let id = COUNTER.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!("sensor-view-test-{}-{}", std::process::id(), id));
            fs::create_dir_all(dir.join("thermal/mlxsw")).unwrap();
            fs::create_dir_all(dir.join("thermal/mlxsw-module1")).unwrap();
            fs::create_dir_all(dir.join("config")).unwrap();
            Self(dir)
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn minimal_fixture() -> (ScratchDir, HwmTree) {
        let scratch = ScratchDir::new();
        let tree = HwmTree::new(scratch.0.clone());
        tree.thermal_write("fan_amb", 25000);
        tree.thermal_write("port_amb", 25000);
        tree.thermal_write("cooling_cur_state", 16);
        tree.thermal_write("mlxsw/thermal_zone_mode", "enabled");
        tree.thermal_write("mlxsw/thermal_zone_temp", 45000);
        tree.thermal_write("mlxsw/temp_trip_norm", 75000);
        tree.thermal_write("pwm1", 153);
        tree.thermal_write("asic", 45000);
        for i in 1..=2 {
            tree.thermal_write(format!("fan{i}_fault"), 0);
            tree.thermal_write(format!("fan{i}_speed_get"), 9000);
        }
        (scratch, tree)
    }

    #[test]
    fn direction_picks_cooler_side_p2c() {
        let pair = AmbientPair { fan_milli_c: 45_000, port_milli_c: 20_000 };
        let (dir, ambient) = pair.direction_and_ambient();
        assert_eq!(dir, AirflowDirection::P2c);
        assert_eq!(ambient, 20_000);
    }

    #[test]
    fn direction_picks_cooler_side_c2p() {
        let pair = AmbientPair { fan_milli_c: 20_000, port_milli_c: 25_000 };
        let (dir, ambient) = pair.direction_and_ambient();
        assert_eq!(dir, AirflowDirection::C2p);
        assert_eq!(ambient, 20_000);
    }

    #[test]
    fn direction_unk_on_equal_ambients() {
        let pair = AmbientPair { fan_milli_c: 30_000, port_milli_c: 30_000 };
        let (dir, ambient) = pair.direction_and_ambient();
        assert_eq!(dir, AirflowDirection::Unk);
        assert_eq!(ambient, 30_000);
    }

    #[test]
    fn trust_is_untrust_when_any_module_faulted() {
        let (_scratch, tree) = minimal_fixture();
        tree.thermal_write("module1_temp_fault", 1);
        let view = SensorView::new(&tree, 2, 0, 1, 0);
        assert_eq!(view.trust(), Trust::Untrust);
    }

    #[test]
    fn trust_is_trust_when_suspended_even_with_fault() {
        let (_scratch, tree) = minimal_fixture();
        tree.write("config/suspend", 1);
        tree.thermal_write("module1_temp_fault", 1);
        let view = SensorView::new(&tree, 2, 0, 1, 0);
        assert_eq!(view.trust(), Trust::Trust);
    }

    #[test]
    fn validate_passes_on_minimal_fixture() {
        let (_scratch, tree) = minimal_fixture();
        let view = SensorView::new(&tree, 2, 0, 0, 0);
        assert_eq!(view.validate(), Ok(()));
    }

    #[test]
    fn validate_fails_on_missing_tacho() {
        let (_scratch, tree) = minimal_fixture();
        let view = SensorView::new(&tree, 5, 0, 0, 0);
        assert_eq!(view.validate(), Err(ValidationError::TachoAttributes(3)));
    }

    #[test]
    fn validate_fails_on_missing_module_fault_attribute() {
        let (_scratch, tree) = minimal_fixture();
        tree.thermal_write("module1_temp", 35000);
        let view = SensorView::new(&tree, 2, 0, 1, 0);
        assert_eq!(
            view.validate(),
            Err(ValidationError::ModuleFaultAttribute(1))
        );
    }

    #[test]
    fn disabled_zone_is_not_reported() {
        let (_scratch, tree) = minimal_fixture();
        tree.thermal_write("mlxsw-module1/thermal_zone_temp", 40000);
        tree.thermal_write("mlxsw-module1/thermal_zone_mode", "disabled");
        let view = SensorView::new(&tree, 2, 0, 1, 0);
        assert!(view.read_zone(&ZoneId::Module(1)).is_none());
    }

    #[test]
    fn enabled_zone_is_reported_with_trips() {
        let (_scratch, tree) = minimal_fixture();
        let view = SensorView::new(&tree, 2, 0, 0, 0);
        let snap = view.read_zone(&ZoneId::Asic).expect("asic zone enabled");
        assert_eq!(snap.temp_milli_c, 45000);
        assert_eq!(snap.trip_norm_milli_c, 75000);
    }
}
