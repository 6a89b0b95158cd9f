use crate::error::{EcgError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label suffix appended to every conditioned lead.
pub const TREATED_SUFFIX: &str = " (treated)";

/// Label of the synthetic cross-lead average.
pub const MERGED_LABEL: &str = "Merged";

/// Named fiducial points located on each beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FiducialKind {
    #[serde(rename = "P")]
    POnset,
    #[serde(rename = "Q")]
    Q,
    #[serde(rename = "R")]
    R,
    #[serde(rename = "S")]
    S,
    #[serde(rename = "T_end")]
    TEnd,
}

impl FiducialKind {
    pub const ALL: [FiducialKind; 5] = [
        FiducialKind::POnset,
        FiducialKind::Q,
        FiducialKind::R,
        FiducialKind::S,
        FiducialKind::TEnd,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FiducialKind::POnset => "P",
            FiducialKind::Q => "Q",
            FiducialKind::R => "R",
            FiducialKind::S => "S",
            FiducialKind::TEnd => "T_end",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for FiducialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fiducial kind -> strictly increasing sample indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Fiducials {
    points: BTreeMap<FiducialKind, Vec<usize>>,
}

impl Fiducials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store indices for `kind`, sorted into temporal order with duplicates
    /// removed. Indices must lie inside a waveform of `len` samples.
    pub fn insert(&mut self, kind: FiducialKind, mut indices: Vec<usize>, len: usize) -> Result<()> {
        indices.sort_unstable();
        indices.dedup();
        if let Some(&index) = indices.last() {
            if index >= len {
                return Err(EcgError::FiducialOutOfBounds {
                    kind: kind.name(),
                    index,
                    len,
                });
            }
        }
        self.points.insert(kind, indices);
        Ok(())
    }

    /// Indices for `kind`; empty when detection produced none.
    pub fn get(&self, kind: FiducialKind) -> &[usize] {
        self.points.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_name(&self, name: &str) -> Option<&[usize]> {
        FiducialKind::from_name(name).map(|kind| self.get(kind))
    }

    pub fn iter(&self) -> impl Iterator<Item = (FiducialKind, &[usize])> {
        self.points.iter().map(|(kind, idx)| (*kind, idx.as_slice()))
    }

    fn max_index(&self) -> Option<(FiducialKind, usize)> {
        self.points
            .iter()
            .filter_map(|(kind, idx)| idx.last().map(|&last| (*kind, last)))
            .max_by_key(|(_, last)| *last)
    }
}

/// One ECG lead: labelled samples at a uniform sampling rate, optionally
/// annotated with detected fiducials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waveform {
    label: String,
    points: Vec<f64>,
    sampling_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    fiducials: Option<Fiducials>,
}

impl Waveform {
    pub fn new(label: impl AsRef<str>, points: Vec<f64>, sampling_rate: u32) -> Result<Self> {
        let label = label.as_ref().trim();
        if label.is_empty() {
            return Err(EcgError::EmptyLabel);
        }
        if points.is_empty() {
            return Err(EcgError::EmptySignal {
                label: label.to_string(),
            });
        }
        if sampling_rate == 0 {
            return Err(EcgError::InvalidSamplingRate {
                label: label.to_string(),
                rate: sampling_rate,
            });
        }
        Ok(Self {
            label: label.to_string(),
            points,
            sampling_rate,
            fiducials: None,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Label with the conditioning suffix stripped, e.g. `"II (treated)"` -> `"II"`.
    pub fn base_label(&self) -> &str {
        self.label
            .strip_suffix(TREATED_SUFFIX)
            .unwrap_or(&self.label)
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    /// Sampling rate as a float for time/sample conversions.
    pub fn fs(&self) -> f64 {
        self.sampling_rate as f64
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.points.len() as f64 / self.fs()
    }

    pub fn fiducials(&self) -> Option<&Fiducials> {
        self.fiducials.as_ref()
    }

    /// New waveform sharing this one's sampling rate, without fiducials.
    pub fn derive(&self, label: impl AsRef<str>, points: Vec<f64>) -> Result<Self> {
        Waveform::new(label, points, self.sampling_rate)
    }

    /// Consume the waveform and attach a complete fiducial map, replacing any
    /// previous annotation.
    pub fn with_fiducials(mut self, fiducials: Fiducials) -> Result<Self> {
        if let Some((kind, index)) = fiducials.max_index() {
            if index >= self.len() {
                return Err(EcgError::FiducialOutOfBounds {
                    kind: kind.name(),
                    index,
                    len: self.len(),
                });
            }
        }
        self.fiducials = Some(fiducials);
        Ok(self)
    }
}

/// Point events on a timeline (e.g., R-peak indices).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    /// Sort, de-duplicate and bounds-check externally supplied indices.
    pub fn validated(mut self, len: usize) -> Result<Self> {
        self.indices.sort_unstable();
        self.indices.dedup();
        if let Some(&index) = self.indices.last() {
            if index >= len {
                return Err(EcgError::FiducialOutOfBounds {
                    kind: FiducialKind::R.name(),
                    index,
                    len,
                });
            }
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Convert a duration in seconds to a whole number of samples.
pub fn seconds_to_samples(seconds: f64, fs: f64) -> usize {
    (seconds * fs).round().max(0.0) as usize
}

/// Convert a sample-count delta to milliseconds.
pub fn samples_to_ms(samples: usize, fs: f64) -> f64 {
    samples as f64 * 1000.0 / fs
}
