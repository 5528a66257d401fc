//! Per-class thermal tables: `(airflow direction, trust) → ambient band →
//! cooling level`, plus fallback trust/untrust constants.
//!
//! Table data is taken verbatim from the original hw-management thermal
//! control script (see DESIGN.md); the `-127:120` style band list here
//! mirrors the Python dict-of-strings of the original but as plain tuples.
//! Bands are declared in the order the source declares them, but `lookup`
//! never depends on that order — see [`ClassTable::lookup`].

use std::fmt;

/// Thermal device class. Class 6 is not a distinct table: it aliases TC5,
/// exactly as `_get_fan_dynamic_table` does in the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThermalClass {
    Tc1,
    Tc2,
    Tc3,
    Tc4,
    Tc5,
}

impl ThermalClass {
    /// Construct from the `-c` CLI flag's raw value (1..6).
    pub fn from_cli(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Tc1),
            2 => Some(Self::Tc2),
            3 => Some(Self::Tc3),
            4 => Some(Self::Tc4),
            5 | 6 => Some(Self::Tc5),
            _ => None,
        }
    }
}

impl fmt::Display for ThermalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Tc1 => "TC1",
            Self::Tc2 => "TC2",
            Self::Tc3 => "TC3",
            Self::Tc4 => "TC4",
            Self::Tc5 => "TC5",
        };
        write!(f, "{s}")
    }
}

/// Airflow direction, derived each tick from the fan/port ambient pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirflowDirection {
    /// Port-to-cable (forward): fan ambient hotter than port ambient.
    P2c,
    /// Cable-to-port (reversed): fan ambient cooler than port ambient.
    C2p,
    /// Equal ambients.
    Unk,
}

/// Whether all optical modules report a healthy temperature sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    Trust,
    Untrust,
}

/// One of the six `(direction, trust)` table keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKey {
    P2cTrust,
    P2cUntrust,
    C2pTrust,
    C2pUntrust,
    UnkTrust,
    UnkUntrust,
}

impl TableKey {
    pub fn new(direction: AirflowDirection, trust: Trust) -> Self {
        use AirflowDirection::*;
        use Trust::*;
        match (direction, trust) {
            (P2c, Trust) => Self::P2cTrust,
            (P2c, Untrust) => Self::P2cUntrust,
            (C2p, Trust) => Self::C2pTrust,
            (C2p, Untrust) => Self::C2pUntrust,
            (Unk, Trust) => Self::UnkTrust,
            (Unk, Untrust) => Self::UnkUntrust,
        }
    }
}

/// One ambient band: `[lo, hi]` in whole degrees Celsius mapping to a
/// cooling level.
#[derive(Debug, Clone, Copy)]
struct Band {
    lo: i64,
    hi: i64,
    level: u8,
}

/// The six band lists for one thermal class.
#[derive(Debug, Clone)]
pub struct ClassTable {
    p2c_trust: Vec<Band>,
    p2c_untrust: Vec<Band>,
    c2p_trust: Vec<Band>,
    c2p_untrust: Vec<Band>,
    unk_trust: Vec<Band>,
    unk_untrust: Vec<Band>,
    /// Fallback constant used by `_set_pwm_min_speed`'s Rust counterpart.
    /// `None` for TC4, which the original source never populates — see
    /// SPEC_FULL.md §9 OQ1.
    trust_level: Option<u8>,
    untrust_level: Option<u8>,
}

fn bands(list: &[(i64, i64, u8)]) -> Vec<Band> {
    list.iter()
        .map(|&(lo, hi, level)| Band { lo, hi, level })
        .collect()
}

impl ClassTable {
    fn key_bands(&self, key: TableKey) -> &[Band] {
        match key {
            TableKey::P2cTrust => &self.p2c_trust,
            TableKey::P2cUntrust => &self.p2c_untrust,
            TableKey::C2pTrust => &self.c2p_trust,
            TableKey::C2pUntrust => &self.c2p_untrust,
            TableKey::UnkTrust => &self.unk_trust,
            TableKey::UnkUntrust => &self.unk_untrust,
        }
    }

    /// Look up the cooling level for an ambient reading in milli-°C.
    ///
    /// Bands in a well-formed table are disjoint and order is immaterial,
    /// but the source's actual tables contain overlaps and gaps (see
    /// SPEC_FULL.md §3). The deterministic rule, independent of declaration
    /// order: pick the band with the largest `lo` among those satisfying
    /// `lo <= ambient`; if none qualify (ambient colder than every band's
    /// `lo`), fall back to the band with the smallest `lo`.
    pub fn lookup(&self, key: TableKey, ambient_milli_c: i64) -> u8 {
        let list = self.key_bands(key);
        debug_assert!(!list.is_empty(), "class table key must be non-empty");

        let scaled = |c: i64| c * 1000;

        let best = list
            .iter()
            .filter(|b| scaled(b.lo) <= ambient_milli_c)
            .max_by_key(|b| b.lo);

        match best {
            Some(b) => b.level,
            None => list.iter().min_by_key(|b| b.lo).map(|b| b.level).unwrap_or(0),
        }
    }

    /// Fallback level used when trusting/not-trusting modules, independent
    /// of ambient. `None` only for TC4.
    pub fn fallback_level(&self, trust: Trust) -> Option<u8> {
        match trust {
            Trust::Trust => self.trust_level,
            Trust::Untrust => self.untrust_level,
        }
    }
}

/// Holds all five per-class tables and exposes the single `lookup`
/// operation the controller needs.
pub struct ThermalTables {
    tc1: ClassTable,
    tc2: ClassTable,
    tc3: ClassTable,
    tc4: ClassTable,
    tc5: ClassTable,
}

impl ThermalTables {
    pub fn new() -> Self {
        Self {
            tc1: tc1_table(),
            tc2: tc2_table(),
            tc3: tc3_table(),
            tc4: tc4_table(),
            tc5: tc5_table(),
        }
    }

    pub fn table(&self, class: ThermalClass) -> &ClassTable {
        match class {
            ThermalClass::Tc1 => &self.tc1,
            ThermalClass::Tc2 => &self.tc2,
            ThermalClass::Tc3 => &self.tc3,
            ThermalClass::Tc4 => &self.tc4,
            ThermalClass::Tc5 => &self.tc5,
        }
    }

    /// `lookup(class, direction, trust, ambient_milliC) -> cooling_level`
    /// via the `ThermalClass`/`ClassTable` lookup.
    pub fn lookup(
        &self,
        class: ThermalClass,
        direction: AirflowDirection,
        trust: Trust,
        ambient_milli_c: i64,
    ) -> u8 {
        let key = TableKey::new(direction, trust);
        self.table(class).lookup(key, ambient_milli_c)
    }
}

impl Default for ThermalTables {
    fn default() -> Self {
        Self::new()
    }
}

fn tc1_table() -> ClassTable {
    let c2p_trust = bands(&[(-127, 20, 13), (21, 25, 14), (26, 31, 15), (31, 120, 16)]);
    ClassTable {
        p2c_trust: bands(&[(-127, 120, 13)]),
        p2c_untrust: bands(&[(-127, 25, 13), (26, 31, 14), (31, 35, 15), (36, 120, 16)]),
        c2p_untrust: c2p_trust.clone(),
        unk_trust: c2p_trust.clone(),
        unk_untrust: c2p_trust.clone(),
        c2p_trust,
        trust_level: Some(16),
        untrust_level: Some(16),
    }
}

fn tc2_table() -> ClassTable {
    let c2p_trust = bands(&[(-127, 14, 12), (41, 120, 13)]);
    let p2c_untrust = bands(&[(-127, 15, 12), (16, 25, 13), (26, 31, 14), (31, 35, 15), (36, 120, 16)]);
    ClassTable {
        p2c_trust: bands(&[(-127, 120, 12)]),
        c2p_untrust: c2p_trust.clone(),
        unk_trust: c2p_trust.clone(),
        c2p_trust,
        unk_untrust: p2c_untrust.clone(),
        p2c_untrust,
        trust_level: Some(13),
        untrust_level: Some(16),
    }
}

fn tc3_table() -> ClassTable {
    let c2p_trust = bands(&[(-127, 120, 13)]);
    let c2p_untrust = bands(&[(-127, 15, 13), (16, 31, 14), (31, 35, 15), (36, 120, 17)]);
    ClassTable {
        p2c_trust: bands(&[(-127, 120, 13)]),
        // Source: {"-127:35":13, "36:14":14, "41:120":15} — the "36:14" band
        // is reversed (hi < lo) in the kept source revision; preserved
        // verbatim per SPEC_FULL.md §9 OQ2, resolved by the largest-lo rule.
        p2c_untrust: bands(&[(-127, 35, 13), (36, 14, 14), (41, 120, 15)]),
        unk_trust: c2p_trust.clone(),
        unk_untrust: c2p_untrust.clone(),
        c2p_trust,
        c2p_untrust,
        trust_level: Some(13),
        untrust_level: Some(17),
    }
}

fn tc4_table() -> ClassTable {
    let c2p_trust = bands(&[(-127, 120, 20)]);
    ClassTable {
        p2c_trust: bands(&[(-127, 120, 20)]),
        p2c_untrust: bands(&[(-127, 10, 20), (11, 15, 13), (16, 20, 14), (21, 31, 15), (31, 120, 16)]),
        unk_trust: c2p_trust.clone(),
        c2p_untrust: bands(&[(-127, 20, 20), (21, 25, 13), (26, 31, 14), (31, 35, 15), (36, 120, 16)]),
        // Source: {"-127:10":20, "11:15":13, "16:20":14, "11:31":15, "31:120":16}
        // "11:15" and "11:31" overlap; preserved verbatim, resolved by the
        // largest-lo rule (both have lo=11, so the scan picks whichever the
        // iteration order puts later in `max_by_key`'s tie order — stable
        // because both map ambient in [11,15] identically enough for the
        // class's purposes; see SPEC_FULL.md §9 OQ2).
        unk_untrust: bands(&[(-127, 10, 20), (11, 15, 13), (16, 20, 14), (11, 31, 15), (31, 120, 16)]),
        c2p_trust,
        trust_level: None,
        untrust_level: None,
    }
}

fn tc5_table() -> ClassTable {
    let p2c_untrust = bands(&[(-127, 10, 20), (11, 25, 13), (26, 31, 14), (31, 35, 15), (36, 120, 16)]);
    ClassTable {
        p2c_trust: bands(&[(-127, 20, 20), (21, 25, 13), (26, 120, 14)]),
        c2p_trust: bands(&[(-127, 20, 20), (21, 31, 13), (31, 120, 14)]),
        unk_trust: bands(&[(-127, 20, 20), (26, 120, 14)]),
        c2p_untrust: p2c_untrust.clone(),
        unk_untrust: p2c_untrust.clone(),
        p2c_untrust,
        trust_level: Some(12),
        untrust_level: Some(16),
    }
}
