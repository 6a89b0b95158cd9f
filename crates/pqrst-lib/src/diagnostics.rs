//! Threshold rules turning a measurement set into diagnostic flags.
//!
//! Every rule is a plain predicate over a [`MeasurementSet`] and can be called
//! on its own; [`evaluate`] runs them all.

use crate::{
    config::DiagnosticThresholds,
    metrics::measurements::{values, MeasurementSet},
};
use serde::{Serialize, Serializer};
use std::{collections::HashSet, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticFlag {
    Tachycardia,
    Bradycardia,
    PrProlonged,
    PrShort,
    QrsProlonged,
    StElevation,
    StDepression,
    PWaveAbsent,
    QtProlonged,
    LvHypertrophy,
    AtrialFibrillation,
    AcuteInfarction,
    Hyperkalemia,
    Hypokalemia,
}

impl DiagnosticFlag {
    pub const ALL: [DiagnosticFlag; 14] = [
        DiagnosticFlag::Tachycardia,
        DiagnosticFlag::Bradycardia,
        DiagnosticFlag::PrProlonged,
        DiagnosticFlag::PrShort,
        DiagnosticFlag::QrsProlonged,
        DiagnosticFlag::StElevation,
        DiagnosticFlag::StDepression,
        DiagnosticFlag::PWaveAbsent,
        DiagnosticFlag::QtProlonged,
        DiagnosticFlag::LvHypertrophy,
        DiagnosticFlag::AtrialFibrillation,
        DiagnosticFlag::AcuteInfarction,
        DiagnosticFlag::Hyperkalemia,
        DiagnosticFlag::Hypokalemia,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticFlag::Tachycardia => "tachycardia",
            DiagnosticFlag::Bradycardia => "bradycardia",
            DiagnosticFlag::PrProlonged => "pr_prolonged",
            DiagnosticFlag::PrShort => "pr_short",
            DiagnosticFlag::QrsProlonged => "qrs_prolonged",
            DiagnosticFlag::StElevation => "st_elevation",
            DiagnosticFlag::StDepression => "st_depression",
            DiagnosticFlag::PWaveAbsent => "p_wave_absent",
            DiagnosticFlag::QtProlonged => "qt_prolonged",
            DiagnosticFlag::LvHypertrophy => "lv_hypertrophy",
            DiagnosticFlag::AtrialFibrillation => "atrial_fibrillation",
            DiagnosticFlag::AcuteInfarction => "acute_infarction",
            DiagnosticFlag::Hyperkalemia => "hyperkalemia",
            DiagnosticFlag::Hypokalemia => "hypokalemia",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for DiagnosticFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn tachycardia(m: &MeasurementSet, t: &DiagnosticThresholds) -> bool {
    m.heart_rate() > t.tachycardia_bpm
}

pub fn bradycardia(m: &MeasurementSet, t: &DiagnosticThresholds) -> bool {
    m.heart_rate() < t.bradycardia_bpm
}

pub fn pr_prolonged(m: &MeasurementSet, t: &DiagnosticThresholds) -> bool {
    values(&m.pr_intervals).any(|pr| pr > t.pr_prolonged_ms)
}

pub fn pr_short(m: &MeasurementSet, t: &DiagnosticThresholds) -> bool {
    values(&m.pr_intervals).any(|pr| pr < t.pr_short_ms)
}

pub fn qrs_prolonged(m: &MeasurementSet, t: &DiagnosticThresholds) -> bool {
    values(&m.qrs_durations).any(|qrs| qrs > t.qrs_prolonged_ms)
}

pub fn st_elevation(m: &MeasurementSet, t: &DiagnosticThresholds) -> bool {
    values(&m.st_deviations).any(|st| st > t.st_elevation_mv)
}

pub fn st_depression(m: &MeasurementSet, t: &DiagnosticThresholds) -> bool {
    values(&m.st_deviations).any(|st| st < t.st_depression_mv)
}

/// True when every P amplitude is exactly zero, including when there are none.
pub fn p_wave_absent(m: &MeasurementSet) -> bool {
    values(&m.p_amplitudes).all(|p| p == 0.0)
}

/// QTc limit for a patient age; unknown age uses the adult limit.
pub fn qtc_limit_ms(age: Option<u32>, t: &DiagnosticThresholds) -> f64 {
    match age {
        Some(age) if age <= t.qtc_age_threshold_years => t.qtc_pediatric_ms,
        _ => t.qtc_adult_ms,
    }
}

/// Any Bazett-corrected QT above the age-dependent limit.
pub fn qt_prolonged(m: &MeasurementSet, t: &DiagnosticThresholds, age: Option<u32>) -> bool {
    let limit = qtc_limit_ms(age, t);
    values(&m.qtc_bazett()).any(|qtc| qtc > limit)
}

/// Sokolow-Lyon style voltage criterion over the summed QRS amplitudes.
pub fn lv_hypertrophy(m: &MeasurementSet, t: &DiagnosticThresholds) -> bool {
    values(&m.qrs_amplitudes).sum::<f64>() * t.mm_per_mv > t.lvh_sokolow_mm
}

/// Absent P waves with an irregular RR series.
pub fn atrial_fibrillation(m: &MeasurementSet) -> bool {
    let distinct: HashSet<u64> = values(&m.rr_intervals).map(f64::to_bits).collect();
    p_wave_absent(m) && distinct.len() > 1
}

pub fn acute_infarction(m: &MeasurementSet, t: &DiagnosticThresholds) -> bool {
    st_elevation(m, t) && qrs_prolonged(m, t)
}

pub fn hyperkalemia(m: &MeasurementSet, t: &DiagnosticThresholds) -> bool {
    values(&m.t_amplitudes).any(|amp| amp > t.hyperkalemia_t_mv)
}

pub fn hypokalemia(m: &MeasurementSet, t: &DiagnosticThresholds) -> bool {
    values(&m.t_amplitudes).any(|amp| amp < t.hypokalemia_t_mv) && st_depression(m, t)
}

/// Evaluate one rule.
pub fn check(
    flag: DiagnosticFlag,
    m: &MeasurementSet,
    t: &DiagnosticThresholds,
    age: Option<u32>,
) -> bool {
    match flag {
        DiagnosticFlag::Tachycardia => tachycardia(m, t),
        DiagnosticFlag::Bradycardia => bradycardia(m, t),
        DiagnosticFlag::PrProlonged => pr_prolonged(m, t),
        DiagnosticFlag::PrShort => pr_short(m, t),
        DiagnosticFlag::QrsProlonged => qrs_prolonged(m, t),
        DiagnosticFlag::StElevation => st_elevation(m, t),
        DiagnosticFlag::StDepression => st_depression(m, t),
        DiagnosticFlag::PWaveAbsent => p_wave_absent(m),
        DiagnosticFlag::QtProlonged => qt_prolonged(m, t, age),
        DiagnosticFlag::LvHypertrophy => lv_hypertrophy(m, t),
        DiagnosticFlag::AtrialFibrillation => atrial_fibrillation(m),
        DiagnosticFlag::AcuteInfarction => acute_infarction(m, t),
        DiagnosticFlag::Hyperkalemia => hyperkalemia(m, t),
        DiagnosticFlag::Hypokalemia => hypokalemia(m, t),
    }
}

/// Outcome of every rule, in [`DiagnosticFlag::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticFlags {
    values: [bool; 14],
}

impl DiagnosticFlags {
    pub fn get(&self, flag: DiagnosticFlag) -> bool {
        self.values[flag as usize]
    }

    pub fn by_name(&self, name: &str) -> Option<bool> {
        DiagnosticFlag::from_name(name).map(|f| self.get(f))
    }

    pub fn iter(&self) -> impl Iterator<Item = (DiagnosticFlag, bool)> + '_ {
        DiagnosticFlag::ALL.into_iter().map(|f| (f, self.get(f)))
    }

    /// Flags that fired.
    pub fn raised(&self) -> Vec<DiagnosticFlag> {
        self.iter().filter(|(_, on)| *on).map(|(f, _)| f).collect()
    }
}

impl Serialize for DiagnosticFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(DiagnosticFlag::ALL.len()))?;
        for (flag, on) in self.iter() {
            map.serialize_entry(flag.name(), &on)?;
        }
        map.end()
    }
}

/// Run every rule against one measurement set.
pub fn evaluate(m: &MeasurementSet, t: &DiagnosticThresholds, age: Option<u32>) -> DiagnosticFlags {
    let mut values = [false; 14];
    for flag in DiagnosticFlag::ALL {
        values[flag as usize] = check(flag, m, t, age);
    }
    DiagnosticFlags { values }
}
