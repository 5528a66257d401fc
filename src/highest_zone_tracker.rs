//! Computes a per-zone "score", promotes the hottest-relative-to-its-trips
//! zone to be the kernel-governed leader, and maintains the
//! `highest_thermal_zone` symlink plus a hysteresis gate against kernel
//! override.

use crate::hwmtree::HwmTree;
use crate::sensor_view::SensorView;
use crate::zone_governor::{ZoneGovernor, ZoneId, ZoneMode};

/// Degrees C trip quadruples, fixed per zone family (`norm, high, hot,
/// crit`).
const ASIC_TRIPS: [i64; 4] = [75, 85, 105, 110];
const MODULE_TRIPS: [i64; 4] = [60, 70, 80, 90];
const GEARBOX_TRIPS: [i64; 4] = [75, 85, 105, 110];

/// Recovery margin applied to `temp_trip_high` before deciding whether the
/// new leader may idle back down to `dynamic_min`.
pub const HYSTERESIS_MILLI_C: i64 = 5000;

/// `score(temp, trip) = ((trip - temp) / 2) / (trip + temp) + shift`, where
/// `shift` starts at 1 and is multiplied by 256 per trip tier advanced past.
/// The first trip with `temp < trip` wins and the scan stops — so a zone
/// sitting just under a higher trip always outscores one sitting just under
/// a lower one (the `* 256` per tier dominates the `(trip-temp)/(trip+temp)`
/// term, which is bounded in `(-1, 1)`).
fn score(temp_milli_c: i64, trips_c: [i64; 4]) -> f64 {
    let temp_c = temp_milli_c as f64 / 1000.0;
    let mut shift: f64 = 1.0;
    for trip_c in trips_c {
        let trip_c = trip_c as f64;
        if temp_c < trip_c {
            return (trip_c - temp_c) / 2.0 / (trip_c + temp_c) + shift;
        }
        shift *= 256.0;
    }
    // Past every trip (crit exceeded): keep climbing past the last tier so a
    // zone in true overtemp still dominates any zone that stayed under crit.
    shift + (temp_c - trips_c[3] as f64)
}

fn trips_for(zone: &ZoneId) -> [i64; 4] {
    match zone {
        ZoneId::Asic => ASIC_TRIPS,
        ZoneId::Module(_) => MODULE_TRIPS,
        ZoneId::Gearbox(_) => GEARBOX_TRIPS,
    }
}

/// Mirrors the on-disk `highest_tz_num`/`highest_score` persistence.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerState {
    pub highest_tz_num: u16,
    pub highest_score: f64,
}

pub struct HighestZoneTracker<'a> {
    tree: &'a HwmTree,
}

impl<'a> HighestZoneTracker<'a> {
    pub fn new(tree: &'a HwmTree) -> Self {
        Self { tree }
    }

    pub fn load_state(&self) -> TrackerState {
        TrackerState {
            highest_tz_num: self.tree.thermal_read_int("highest_tz_num", 0) as u16,
            highest_score: self
                .tree
                .thermal_read_str("highest_score", "0")
                .parse()
                .unwrap_or(0.0),
        }
    }

    fn persist_state(&self, state: TrackerState) {
        self.tree.thermal_write("highest_tz_num", state.highest_tz_num);
        self.tree.thermal_write("highest_score", state.highest_score);
    }

    /// One tick of the tracker: recompute scores across ASIC/module/gearbox
    /// zones, rebind the leader if it changed, and apply the hysteresis gate
    /// to the (possibly new) leader. Returns the updated state.
    pub fn step(
        &self,
        view: &SensorView,
        governor: &ZoneGovernor,
        dynamic_min: u8,
        state: TrackerState,
    ) -> TrackerState {
        let mut max_tz = 0u16;
        let mut max_score = f64::MIN;

        if let Some(asic) = view.read_zone(&ZoneId::Asic) {
            max_score = score(asic.temp_milli_c, ASIC_TRIPS);
        }

        for m in 1..=view.module_counter {
            if let Some(snap) = view.read_zone(&ZoneId::Module(m)) {
                let s = score(snap.temp_milli_c, MODULE_TRIPS);
                if s > max_score {
                    max_score = s;
                    max_tz = m;
                }
            }
        }

        for g in 1..=view.gearbox_counter {
            if let Some(snap) = view.read_zone(&ZoneId::Gearbox(g)) {
                let s = score(snap.temp_milli_c, GEARBOX_TRIPS);
                if s > max_score {
                    max_score = s;
                    max_tz = view.module_counter + g;
                }
            }
        }

        let new_leader = ZoneId::from_max_tz(max_tz, view.module_counter);
        let mut next = state;

        if max_tz != state.highest_tz_num {
            let old_leader = ZoneId::from_max_tz(state.highest_tz_num, view.module_counter);
            governor.disable(&old_leader);
            self.tree.thermal_symlink_replace("highest_thermal_zone", &new_leader.dir_name());

            next = TrackerState {
                highest_tz_num: max_tz,
                highest_score: max_score,
            };
            self.persist_state(next);

            governor.enable(&new_leader);
            log::info!("highest thermal zone switched to {new_leader}");
        }

        self.apply_hysteresis_gate(view, governor, &new_leader, dynamic_min);
        next
    }

    /// If `temp_trip_high - HYSTERESIS > temp_now` for the current leader,
    /// the kernel would otherwise keep step-wise control pinned above where
    /// the daemon has decided it can idle. Briefly disable, drop to
    /// `dynamic_min`, re-enable.
    fn apply_hysteresis_gate(
        &self,
        view: &SensorView,
        governor: &ZoneGovernor,
        leader: &ZoneId,
        dynamic_min: u8,
    ) {
        let Some(snap) = view.read_zone(leader) else {
            return;
        };
        if snap.trip_high_milli_c - HYSTERESIS_MILLI_C > snap.temp_milli_c {
            governor.disable(leader);
            governor.set_cooling(dynamic_min);
            governor.enable(leader);
            log::debug!("{leader}: hysteresis gate dropped to dynamic_min {dynamic_min}");
        }
    }

    pub fn init_symlink_if_absent(&self) {
        if self.tree.thermal_symlink_target_basename("highest_thermal_zone").is_none() {
            self.tree.thermal_symlink_replace("highest_thermal_zone", &ZoneId::Asic.dir_name());
        }
    }
}

pub fn asic_is_disabled_and_no_leader(governor: &ZoneGovernor, state: TrackerState) -> bool {
    state.highest_tz_num == 0 && governor.mode(&ZoneId::Asic) == ZoneMode::Disabled
}
