//! The top-level thermal control state machine: poll tick, periodic report,
//! suspend/resume, and the fault-driven emergency path.

use crate::error::{Error, Result};
use crate::highest_zone_tracker::{self, HighestZoneTracker, TrackerState};
use crate::hwmtree::HwmTree;
use crate::psu_fan_sync::PsuFanSync;
use crate::sensor_view::SensorView;
use crate::thermal_tables::{ThermalClass, ThermalTables};
use crate::zone_governor::{ZoneGovernor, ZoneId, ZoneMode};

/// Kernel cooling-device baseline offset (also used by [`crate::psu_fan_sync`]).
pub const FAN_MAX_STATE: i64 = 10;
/// Default ("idle") committed cooling level.
pub const COOLING_SET_DEF_STATE: u8 = 16;
/// Forced cooling level during emergency.
pub const COOLING_SET_MAX_STATE: u8 = 20;
/// Default chassis PWM duty (0..255 scale), restored on suspend/resume and
/// after an emergency clears.
pub const PWM_DEF_RPM: i64 = 153;
pub const PWM_MAX_RPM: i64 = 255;

/// Why the controller forced max cooling and disabled all zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyReason {
    PsuAbsent(u16),
    TachoFault(u16),
}

impl EmergencyReason {
    fn log_message(&self) -> String {
        match self {
            EmergencyReason::PsuAbsent(psu) => {
                format!("ASIC thermal zone is disabled due to PS absence (psu{psu})")
            }
            EmergencyReason::TachoFault(tacho) => {
                format!("ASIC thermal zone is disabled due to FAN fault (fan{tacho})")
            }
        }
    }
}

/// Reason passed to `check_trip_min_vs_current_temp`'s log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryReason {
    ThermalZoneEvent,
    SystemHealthRecovery,
}

/// Persistent (across ticks, not across restarts) controller state.
pub struct ThermalController {
    tree: HwmTree,
    class: ThermalClass,
    tables: ThermalTables,
    max_tachos: u16,
    max_psus: u16,
    module_counter: u16,
    gearbox_counter: u16,
    calculate_tz_score: bool,

    dynamic_min: u8,
    dynamic_min_last: u8,
    set_cur_state: u8,
    /// Cached suspend flag, mirrors the filesystem for edge detection.
    /// Starts `false`, matching the original's initial `'0'` — so a daemon
    /// that boots unsuspended runs a normal control tick immediately rather
    /// than treating tick 1 as a no-op edge.
    suspend_thermal: bool,
    tracker_state: TrackerState,
}

impl ThermalController {
    /// Construct and initialize: resolves the thermal class table and reads
    /// topology counts. Mirrors the original's `init()`.
    pub fn new(
        tree: HwmTree,
        class_cli: u8,
        max_tachos: u16,
        max_psus: u16,
        calculate_tz_score: bool,
    ) -> Result<Self> {
        let class = ThermalClass::from_cli(class_cli).ok_or(Error::UnsupportedClass(class_cli))?;
        let module_counter = tree.read_int("config/module_counter", 0) as u16;
        let gearbox_counter = tree.read_int("config/gearbox_counter", 0) as u16;

        Ok(Self {
            tree,
            class,
            tables: ThermalTables::new(),
            max_tachos,
            max_psus,
            module_counter,
            gearbox_counter,
            calculate_tz_score,
            dynamic_min: COOLING_SET_DEF_STATE,
            dynamic_min_last: COOLING_SET_DEF_STATE,
            set_cur_state: 0,
            suspend_thermal: false,
            tracker_state: TrackerState::default(),
        })
    }

    // SensorView/ZoneGovernor are constructed inline from `&self.tree` at
    // each call site rather than behind a `&self`-taking helper: a direct
    // field projection like `&self.tree` borrows only that field, so the
    // borrow checker can see it as disjoint from a later mutation of
    // `self.dynamic_min` or `self.tracker_state`. A helper method taking
    // `&self` would instead borrow the whole struct for the return value's
    // lifetime and spuriously conflict with those mutations.

    /// One poll tick. Never returns an `Err` for operational conditions
    /// (missing attributes, PSU/tacho faults) — those are handled in place
    /// and the tick simply returns `Ok(())`: no exception escapes the poll
    /// loop, and the tick itself is the unit of recovery.
    pub fn tick(&mut self) -> Result<()> {
        let suspend_now = self.tree.read_str("config/suspend", "0") == "1";

        if suspend_now != self.suspend_thermal {
            self.suspend_thermal = suspend_now;
            if suspend_now {
                self.disable_zones_default_pwm();
                log::info!("Thermal algorithm is manually suspend");
            } else {
                log::info!("Thermal algorithm is manually resumed");
            }
            return Ok(());
        } else if self.suspend_thermal {
            let pwm = self.tree.thermal_read_int("pwm1", PWM_DEF_RPM);
            if pwm != PWM_DEF_RPM {
                self.disable_zones_default_pwm();
            }
            return Ok(());
        }

        // Nothing in this block mutates `self` or the hw-management tree
        // (the PSU fan push is an I2C shellout, not a tree write); it only
        // borrows `self.tree` through `view`. Its result feeds the mutations
        // below once the borrow has ended.
        enum Outcome {
            Invalid,
            PsuAbsent(u16),
            TachoFault(u16),
            Normal { dynamic_min: u8 },
        }

        let outcome = {
            let view = SensorView::new(
                &self.tree,
                self.max_tachos,
                self.max_psus,
                self.module_counter,
                self.gearbox_counter,
            );
            if let Err(e) = view.validate() {
                log::error!("thermal configuration invalid, skipping tick: {e}");
                Outcome::Invalid
            } else {
                let (direction, ambient_milli_c) = view.ambient_pair().direction_and_ambient();
                let trust = view.trust();
                let dynamic_min = self.tables.lookup(self.class, direction, trust, ambient_milli_c);

                PsuFanSync::new(&self.tree, self.max_psus).push();

                let mut found = None;
                for psu in 1..=self.max_psus {
                    if !view.psu_present(psu) {
                        found = Some(Outcome::PsuAbsent(psu));
                        break;
                    }
                }
                if found.is_none() {
                    for tacho in 1..=self.max_tachos {
                        if view.tacho_fault(tacho) || view.tacho_speed(tacho) == 0 {
                            found = Some(Outcome::TachoFault(tacho));
                            break;
                        }
                    }
                }
                found.unwrap_or(Outcome::Normal { dynamic_min })
            }
        };

        match outcome {
            Outcome::Invalid => return Ok(()),
            Outcome::PsuAbsent(psu) => {
                self.enter_emergency(EmergencyReason::PsuAbsent(psu));
                return Ok(());
            }
            Outcome::TachoFault(tacho) => {
                self.enter_emergency(EmergencyReason::TachoFault(tacho));
                return Ok(());
            }
            Outcome::Normal { dynamic_min } => {
                self.dynamic_min = dynamic_min;
            }
        }

        if self.dynamic_min != self.dynamic_min_last {
            ZoneGovernor::new(&self.tree).set_cooling(self.dynamic_min);
            log::info!(
                "FAN minimum speed is changed from {} to {} percent",
                (self.dynamic_min_last as i64 - FAN_MAX_STATE) * 10,
                (self.dynamic_min as i64 - FAN_MAX_STATE) * 10
            );
            self.dynamic_min_last = self.dynamic_min;
            self.tree
                .thermal_write("fan_dynamic_min", (self.dynamic_min as i64 - FAN_MAX_STATE) * 10);
        }

        if self.calculate_tz_score
            && self.tracker_state.highest_tz_num == 0
            && ZoneGovernor::new(&self.tree).mode(&ZoneId::Asic) == ZoneMode::Disabled
        {
            ZoneGovernor::new(&self.tree).enable(&ZoneId::Asic);
        }

        self.check_trip_min_vs_current_temp(RecoveryReason::SystemHealthRecovery);

        if self.calculate_tz_score {
            let view = SensorView::new(
                &self.tree,
                self.max_tachos,
                self.max_psus,
                self.module_counter,
                self.gearbox_counter,
            );
            let tracker = HighestZoneTracker::new(&self.tree);
            let governor = ZoneGovernor::new(&self.tree);
            self.tracker_state = tracker.step(&view, &governor, self.dynamic_min, self.tracker_state);
        }

        Ok(())
    }

    /// Shared emergency path for PSU-absent and tacho-fault: force max
    /// cooling and disable every zone. Folds the original's
    /// `_get_psu_presence`/`_get_fan_faults` into one helper (SPEC_FULL.md
    /// §9 supplement) while preserving their distinct log messages.
    fn enter_emergency(&mut self, reason: EmergencyReason) {
        let governor = ZoneGovernor::new(&self.tree);
        governor.disable(&ZoneId::Asic);
        for m in 1..=self.module_counter {
            governor.disable(&ZoneId::Module(m));
        }
        for g in 1..=self.gearbox_counter {
            governor.disable(&ZoneId::Gearbox(g));
        }

        self.dynamic_min = COOLING_SET_MAX_STATE;
        self.dynamic_min_last = COOLING_SET_MAX_STATE;
        self.set_cur_state = COOLING_SET_MAX_STATE - FAN_MAX_STATE as u8;
        governor.set_cooling(COOLING_SET_MAX_STATE);
        self.tree.thermal_write("pwm1", PWM_MAX_RPM);

        log::warn!("{}", reason.log_message());

        if self.calculate_tz_score {
            HighestZoneTracker::new(&self.tree).init_symlink_if_absent();
        }
    }

    /// If no moduleN/gearboxN zone is above its `temp_trip_norm`, and the
    /// ASIC is below its own `temp_trip_norm`, the fan may idle down to
    /// `dynamic_min`.
    fn check_trip_min_vs_current_temp(&mut self, reason: RecoveryReason) {
        let view = SensorView::new(&self.tree, self.max_tachos, self.max_psus, self.module_counter, self.gearbox_counter);

        for m in 1..=self.module_counter {
            if let Some(snap) = view.read_zone(&ZoneId::Module(m)) {
                if snap.temp_milli_c > 0 && snap.trip_norm_milli_c < snap.temp_milli_c {
                    return;
                }
            }
        }
        for g in 1..=self.gearbox_counter {
            if let Some(snap) = view.read_zone(&ZoneId::Gearbox(g)) {
                if snap.temp_milli_c > 0 && snap.trip_norm_milli_c < snap.temp_milli_c {
                    return;
                }
            }
        }

        let asic_temp = self.tree.thermal_read_int("mlxsw/thermal_zone_temp", 0);
        let asic_trip_norm = self.tree.thermal_read_int("mlxsw/temp_trip_norm", 0);
        if asic_trip_norm > asic_temp {
            self.set_cur_state = self.dynamic_min - FAN_MAX_STATE as u8;
            ZoneGovernor::new(&self.tree).set_cooling(self.dynamic_min);
            let percent = self.set_cur_state as i64 * 10;
            let message = match reason {
                RecoveryReason::ThermalZoneEvent => "FAN speed is set due to thermal zone event",
                RecoveryReason::SystemHealthRecovery => "FAN speed is set due to system health recovery",
            };
            log::info!("{message} ({percent} percent)");
        }
    }

    fn disable_zones_default_pwm(&self) {
        let governor = ZoneGovernor::new(&self.tree);
        governor.disable(&ZoneId::Asic);
        for m in 1..=self.module_counter {
            governor.disable(&ZoneId::Module(m));
        }
        for g in 1..=self.gearbox_counter {
            governor.disable(&ZoneId::Gearbox(g));
        }
        self.tree.thermal_write("pwm1", PWM_DEF_RPM);
        log::info!("Set fan speed to default");
    }

    /// Fired every `periodic_report_time` seconds. Pure observation — no
    /// writes.
    pub fn periodic_report(&self) {
        let view = SensorView::new(&self.tree, self.max_tachos, self.max_psus, self.module_counter, self.gearbox_counter);
        let asic_temp = self.tree.thermal_read_int("mlxsw/thermal_zone_temp", 0);
        let ambient = view.ambient_pair();
        let cooling = self.tree.thermal_read_int("cooling_cur_state", self.dynamic_min as i64);
        let pwm = self.tree.thermal_read_int("pwm1", PWM_DEF_RPM);

        let speed_idx = (cooling - FAN_MAX_STATE).clamp(0, 10);
        let ps_fan_speed = crate::psu_fan_sync::speed_for_cooling_state(cooling);

        log::info!("Thermal periodic report");
        log::info!("=======================");
        log::info!(
            "Temperature(mC): asic {asic_temp} fan amb {} port amb {}",
            ambient.fan_milli_c,
            ambient.port_milli_c
        );
        log::info!(
            "Cooling(%): pwm {pwm} ps_fan_speed {ps_fan_speed} dynamic_min {} (idx {speed_idx})",
            self.dynamic_min
        );

        for tacho in 1..=self.max_tachos {
            log::info!(
                "fan{tacho}: speed {} fault {}",
                view.tacho_speed(tacho),
                view.tacho_fault(tacho)
            );
        }

        for m in 1..=self.module_counter {
            if let Some(temp) = view.module_temp_milli_c(m) {
                log::info!("module{m}: temp_input {temp}");
            }
            if let Some(snap) = view.read_zone(&ZoneId::Module(m)) {
                log::info!(
                    "module{m} zone: temp {} norm {} high {} hot {} crit {} policy {:?}",
                    snap.temp_milli_c,
                    snap.trip_norm_milli_c,
                    snap.trip_high_milli_c,
                    snap.trip_hot_milli_c,
                    snap.trip_crit_milli_c,
                    snap.policy
                );
            }
        }

        for g in 1..=self.gearbox_counter {
            if let Some(snap) = view.read_zone(&ZoneId::Gearbox(g)) {
                log::info!(
                    "gearbox{g} zone: temp {} norm {} high {} hot {} crit {} policy {:?}",
                    snap.temp_milli_c,
                    snap.trip_norm_milli_c,
                    snap.trip_high_milli_c,
                    snap.trip_hot_milli_c,
                    snap.trip_crit_milli_c,
                    snap.policy
                );
            }
        }

        if let Some(snap) = view.read_zone(&ZoneId::Asic) {
            log::info!(
                "asic zone: temp {} norm {} high {} hot {} crit {} policy {:?}",
                snap.temp_milli_c,
                snap.trip_norm_milli_c,
                snap.trip_high_milli_c,
                snap.trip_hot_milli_c,
                snap.trip_crit_milli_c,
                snap.policy
            );
        }
    }

    /// Manual poke, fired from the SIGUSR1/SIGUSR2 handler path: runs the
    /// same trip-vs-current-temp recovery check a normal
    /// tick would, tagged as a "thermal zone event" rather than a routine
    /// system-health recovery. Never exits the process.
    pub fn poke(&mut self) {
        self.check_trip_min_vs_current_temp(RecoveryReason::ThermalZoneEvent);
    }

    pub fn dynamic_min(&self) -> u8 {
        self.dynamic_min
    }

    pub fn dynamic_min_last(&self) -> u8 {
        self.dynamic_min_last
    }

    pub fn tracker_state(&self) -> TrackerState {
        self.tracker_state
    }
}

/// Used by `controller.rs` tests and the CLI's `-c` validation path.
pub fn asic_leader_is_idle(governor: &ZoneGovernor, state: TrackerState) -> bool {
    highest_zone_tracker::asic_is_disabled_and_no_leader(governor, state)
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
            let dir = std::env::temp_dir().join(format!("controller-test-{}-{}", std::process::id(), id));
            fs::create_dir_all(dir.join("thermal/mlxsw")).unwrap();
            fs::create_dir_all(dir.join("config")).unwrap();
            Self(dir)
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn fixture(scratch: &ScratchDir) -> HwmTree {
        let tree = HwmTree::new(scratch.0.clone());
        tree.thermal_write("fan_amb", 20_000);
        tree.thermal_write("port_amb", 25_000);
        tree.thermal_write("cooling_cur_state", 16);
        tree.thermal_write("pwm1", PWM_DEF_RPM);
        tree.thermal_write("asic", 45_000);
        tree.thermal_write("mlxsw/thermal_zone_mode", "enabled");
        tree.thermal_write("mlxsw/thermal_zone_policy", "step_wise");
        tree.thermal_write("mlxsw/thermal_zone_temp", 45_000);
        tree.thermal_write("mlxsw/temp_trip_norm", 75_000);
        tree.thermal_write("mlxsw/temp_trip_high", 85_000);
        tree.thermal_write("mlxsw/temp_trip_hot", 105_000);
        tree.thermal_write("mlxsw/temp_trip_crit", 110_000);
        for i in 1..=2 {
            tree.thermal_write(format!("fan{i}_fault"), 0);
            tree.thermal_write(format!("fan{i}_speed_get"), 9000);
        }
        for i in 1..=1 {
            tree.thermal_write(format!("psu{i}_status"), 1);
            tree.thermal_write(format!("psu{i}_pwr_status"), 0);
        }
        tree
    }

    #[test]
    fn new_rejects_unsupported_class() {
        let scratch = ScratchDir::new();
        let tree = fixture(&scratch);
        let err = ThermalController::new(tree, 9, 2, 1, false).unwrap_err();
        assert!(matches!(err, Error::UnsupportedClass(9)));
    }

    #[test]
    fn first_tick_runs_full_control_when_not_suspended() {
        // the original starts cached suspend at '0'; an unsuspended boot
        // means tick 1 is a real control tick, not a cache-only no-op.
        let scratch = ScratchDir::new();
        let tree = fixture(&scratch);
        let mut ctl = ThermalController::new(tree, 2, 2, 1, false).unwrap();
        ctl.tick().unwrap();
        assert!((10..=20).contains(&ctl.dynamic_min()));
    }

    #[test]
    fn psu_absent_forces_emergency() {
        let scratch = ScratchDir::new();
        let tree = fixture(&scratch);
        tree.thermal_write("psu1_status", 0);
        let mut ctl = ThermalController::new(tree, 2, 2, 1, false).unwrap();
        ctl.tick().unwrap();
        assert_eq!(ctl.dynamic_min(), COOLING_SET_MAX_STATE);
        assert_eq!(
            ctl.tree.thermal_read_int("cooling_cur_state", -1),
            COOLING_SET_MAX_STATE as i64
        );
        assert_eq!(
            ctl.tree.thermal_read_str("mlxsw/thermal_zone_mode", ""),
            "disabled"
        );
    }

    #[test]
    fn tacho_fault_forces_emergency() {
        let scratch = ScratchDir::new();
        let tree = fixture(&scratch);
        tree.thermal_write("fan1_fault", 1);
        let mut ctl = ThermalController::new(tree, 2, 2, 1, false).unwrap();
        ctl.tick().unwrap();
        assert_eq!(ctl.dynamic_min(), COOLING_SET_MAX_STATE);
    }

    #[test]
    fn poke_runs_trip_recovery_without_a_tick() {
        // fixture's asic temp (45_000) sits below its trip_norm (75_000),
        // so a poke alone (no tick()) should idle cooling back to dynamic_min.
        let scratch = ScratchDir::new();
        let tree = fixture(&scratch);
        let mut ctl = ThermalController::new(tree, 2, 2, 1, false).unwrap();
        ctl.tick().unwrap();
        ctl.poke();
        assert_eq!(
            ctl.tree.thermal_read_int("cooling_cur_state", -1),
            ctl.dynamic_min() as i64
        );
    }

    #[test]
    fn suspend_resume_restores_default_pwm() {
        let scratch = ScratchDir::new();
        let tree = fixture(&scratch);
        let mut ctl = ThermalController::new(tree, 2, 2, 1, false).unwrap();
        ctl.tick().unwrap(); // unsuspended boot: real control tick

        ctl.tree.write("config/suspend", 1);
        ctl.tick().unwrap(); // edge: suspend 0->1, disables + defaults pwm
        assert_eq!(ctl.tree.thermal_read_int("pwm1", -1), PWM_DEF_RPM);
        assert_eq!(
            ctl.tree.thermal_read_str("mlxsw/thermal_zone_mode", ""),
            "disabled"
        );

        ctl.tree.write("config/suspend", 0);
        ctl.tick().unwrap(); // edge: suspend 1->0, resumes (no forced write here)
        ctl.tick().unwrap(); // first real control tick after resume
        assert_eq!(ctl.tree.thermal_read_int("pwm1", -1), PWM_DEF_RPM);
    }
}
