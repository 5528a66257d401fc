//! Two-axis kernel thermal zone control: `mode` (enabled/disabled) and
//! `policy` (step_wise/user_space).

use std::fmt;

use crate::hwmtree::HwmTree;

/// Logical handle to a kernel thermal zone. The ASIC zone lives at
/// `thermal/mlxsw`; module and gearbox zones live at `thermal/mlxsw-moduleN`
/// and `thermal/mlxsw-gearboxN` respectively (1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneId {
    Asic,
    Module(u16),
    Gearbox(u16),
}

impl ZoneId {
    /// Directory name relative to the hw-management root's `thermal/`
    /// subtree, e.g. `mlxsw`, `mlxsw-module3`, `mlxsw-gearbox1`.
    pub fn dir_name(&self) -> String {
        match self {
            ZoneId::Asic => "mlxsw".to_string(),
            ZoneId::Module(n) => format!("mlxsw-module{n}"),
            ZoneId::Gearbox(n) => format!("mlxsw-gearbox{n}"),
        }
    }

    /// Resolve `HighestZoneTracker`'s flat `max_tz` index (`0` = ASIC, else
    /// a module/gearbox index sharing one numbering space) into a `ZoneId`.
    ///
    /// `max_tz <= module_counter` names a module;
    /// `max_tz > module_counter` names a gearbox at `max_tz - module_counter`.
    pub fn from_max_tz(max_tz: u16, module_counter: u16) -> ZoneId {
        if max_tz == 0 {
            ZoneId::Asic
        } else if max_tz <= module_counter {
            ZoneId::Module(max_tz)
        } else {
            ZoneId::Gearbox(max_tz - module_counter)
        }
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Whether the kernel thermal zone is under step-wise (kernel) control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneMode {
    Enabled,
    Disabled,
}

impl ZoneMode {
    fn parse(raw: &str) -> Self {
        if raw == "enabled" {
            ZoneMode::Enabled
        } else {
            ZoneMode::Disabled
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ZoneMode::Enabled => "enabled",
            ZoneMode::Disabled => "disabled",
        }
    }
}

/// Which side governs `cooling_cur_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZonePolicy {
    StepWise,
    UserSpace,
}

impl ZonePolicy {
    fn as_str(&self) -> &'static str {
        match self {
            ZonePolicy::StepWise => "step_wise",
            ZonePolicy::UserSpace => "user_space",
        }
    }
}

/// Read-modify-write access to zone `mode`/`policy`/`cooling_cur_state`.
pub struct ZoneGovernor<'a> {
    tree: &'a HwmTree,
}

impl<'a> ZoneGovernor<'a> {
    pub fn new(tree: &'a HwmTree) -> Self {
        Self { tree }
    }

    fn mode_rel(zone: &ZoneId) -> String {
        format!("{}/thermal_zone_mode", zone.dir_name())
    }

    fn policy_rel(zone: &ZoneId) -> String {
        format!("{}/thermal_zone_policy", zone.dir_name())
    }

    pub fn mode(&self, zone: &ZoneId) -> ZoneMode {
        ZoneMode::parse(&self.tree.thermal_read_str(&Self::mode_rel(zone), "disabled"))
    }

    /// Disable the zone: set mode=disabled (if enabled) and policy=user_space
    /// (if step_wise). Idempotent.
    pub fn disable(&self, zone: &ZoneId) {
        if self.mode(zone) == ZoneMode::Enabled {
            self.tree
                .thermal_write(&Self::mode_rel(zone), ZoneMode::Disabled.as_str());
            log::debug!("zone {zone} disabled");
        }
        self.tree
            .thermal_write(&Self::policy_rel(zone), ZonePolicy::UserSpace.as_str());
    }

    /// Re-enable the zone under kernel step-wise control.
    pub fn enable(&self, zone: &ZoneId) {
        self.tree
            .thermal_write(&Self::mode_rel(zone), ZoneMode::Enabled.as_str());
        self.tree
            .thermal_write(&Self::policy_rel(zone), ZonePolicy::StepWise.as_str());
        log::debug!("zone {zone} enabled (step_wise)");
    }

    /// Write `cooling_cur_state` directly. Level is `10..=20`.
    pub fn set_cooling(&self, level: u8) {
        self.tree.thermal_write("cooling_cur_state", level);
    }

    pub fn cooling_cur_state(&self, default: u8) -> u8 {
        self.tree.thermal_read_int("cooling_cur_state", default as i64) as u8
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
            let dir = std::env::temp_dir().join(format!("zone-governor-test-{}-{}", std::process::id(), id));
            fs::create_dir_all(dir.join("thermal/mlxsw")).unwrap();
            fs::create_dir_all(dir.join("thermal/mlxsw-module1")).unwrap();
            Self(dir)
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn dir_names() {
        assert_eq!(ZoneId::Asic.dir_name(), "mlxsw");
        assert_eq!(ZoneId::Module(3).dir_name(), "mlxsw-module3");
        assert_eq!(ZoneId::Gearbox(1).dir_name(), "mlxsw-gearbox1");
    }

    #[test]
    fn disable_then_enable_round_trips() {
        let scratch = ScratchDir::new();
        let tree = HwmTree::new(scratch.0.clone());
        tree.thermal_write("mlxsw/thermal_zone_mode", "enabled");
        tree.thermal_write("mlxsw/thermal_zone_policy", "step_wise");
        let gov = ZoneGovernor::new(&tree);

        gov.disable(&ZoneId::Asic);
        assert_eq!(gov.mode(&ZoneId::Asic), ZoneMode::Disabled);
        assert_eq!(
            tree.thermal_read_str("mlxsw/thermal_zone_policy", ""),
            "user_space"
        );

        gov.enable(&ZoneId::Asic);
        assert_eq!(gov.mode(&ZoneId::Asic), ZoneMode::Enabled);
        assert_eq!(
            tree.thermal_read_str("mlxsw/thermal_zone_policy", ""),
            "step_wise"
        );
    }

    #[test]
    fn disable_is_idempotent() {
        let scratch = ScratchDir::new();
        let tree = HwmTree::new(scratch.0.clone());
        let gov = ZoneGovernor::new(&tree);
        gov.disable(&ZoneId::Module(1));
        gov.disable(&ZoneId::Module(1));
        assert_eq!(gov.mode(&ZoneId::Module(1)), ZoneMode::Disabled);
    }

    #[test]
    fn set_cooling_and_read_back() {
        let scratch = ScratchDir::new();
        let tree = HwmTree::new(scratch.0.clone());
        let gov = ZoneGovernor::new(&tree);
        gov.set_cooling(17);
        assert_eq!(gov.cooling_cur_state(0), 17);
    }
}
