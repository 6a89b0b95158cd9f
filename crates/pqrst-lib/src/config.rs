use crate::error::{EcgError, Result};
use serde::{Deserialize, Serialize};

/// Signal conditioning parameters (band-pass, baseline median, smoothing).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningConfig {
    /// Lowest frequency kept by the FFT band-pass (Hz).
    pub low_cutoff_hz: f64,
    /// Highest frequency kept by the FFT band-pass (Hz).
    pub high_cutoff_hz: f64,
    /// Sliding-median window used to estimate baseline wander (ms).
    pub baseline_window_ms: f64,
    /// Savitzky–Golay window length (samples, odd).
    pub smooth_window_samples: usize,
    /// Savitzky–Golay polynomial order.
    pub smooth_poly_order: usize,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            low_cutoff_hz: 0.5,
            high_cutoff_hz: 40.0,
            baseline_window_ms: 200.0,
            smooth_window_samples: 31,
            smooth_poly_order: 2,
        }
    }
}

/// Which R-peak detector to run when no external peak list is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RPeakMethod {
    #[default]
    LocalMaxima,
    PanTompkins,
}

/// Envelope detector tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanTompkinsConfig {
    /// Lower cutoff for the single-pole high-pass filter (Hz).
    pub lowcut_hz: f64,
    /// Upper cutoff for the single-pole low-pass filter (Hz).
    pub highcut_hz: f64,
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum physiological RR distance / refractory period (seconds).
    pub min_rr_s: f64,
    /// Scale between noise and signal envelopes for the adaptive threshold.
    pub threshold_scale: f64,
    /// How far back to search (seconds) for the precise R-peak after a detection.
    pub search_back_s: f64,
}

impl Default for PanTompkinsConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 5.0,
            highcut_hz: 15.0,
            integration_window_s: 0.150,
            min_rr_s: 0.280,
            threshold_scale: 0.3,
            search_back_s: 0.150,
        }
    }
}

/// Fiducial detection parameters. Durations are in seconds, slopes in signal
/// units per sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub r_peak_method: RPeakMethod,
    /// Fraction of the signal range above the minimum that marks an R candidate.
    pub r_threshold_ratio: f64,
    /// Half of the QRS search span on each side of R.
    pub qrs_half_window_s: f64,
    pub p_search_window_s: f64,
    pub p_deriv_window_s: f64,
    pub p_slope_threshold: f64,
    /// Span immediately before R that the P-onset scan never enters.
    pub p_exclusion_s: f64,
    pub t_search_window_s: f64,
    pub t_deriv_window_s: f64,
    pub pan_tompkins: PanTompkinsConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            r_peak_method: RPeakMethod::default(),
            r_threshold_ratio: 0.7,
            qrs_half_window_s: 0.10,
            p_search_window_s: 0.3,
            p_deriv_window_s: 0.08,
            p_slope_threshold: 0.25,
            p_exclusion_s: 0.2,
            t_search_window_s: 0.3,
            t_deriv_window_s: 0.04,
            pan_tompkins: PanTompkinsConfig::default(),
        }
    }
}

/// Measurement engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Offset after S (the J point) at which ST deviation is sampled (seconds).
    pub st_offset_s: f64,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self { st_offset_s: 0.06 }
    }
}

/// Diagnostic cut-offs, each tagged with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticThresholds {
    pub tachycardia_bpm: f64,
    pub bradycardia_bpm: f64,
    pub pr_prolonged_ms: f64,
    pub pr_short_ms: f64,
    pub qrs_prolonged_ms: f64,
    pub st_elevation_mv: f64,
    pub st_depression_mv: f64,
    /// Patients at or below this age use the pediatric QTc limit.
    pub qtc_age_threshold_years: u32,
    pub qtc_pediatric_ms: f64,
    pub qtc_adult_ms: f64,
    /// Standard paper calibration used to express amplitudes in mm.
    pub mm_per_mv: f64,
    pub lvh_sokolow_mm: f64,
    pub hyperkalemia_t_mv: f64,
    pub hypokalemia_t_mv: f64,
}

impl Default for DiagnosticThresholds {
    fn default() -> Self {
        Self {
            tachycardia_bpm: 100.0,
            bradycardia_bpm: 60.0,
            pr_prolonged_ms: 200.0,
            pr_short_ms: 120.0,
            qrs_prolonged_ms: 120.0,
            st_elevation_mv: 0.2,
            st_depression_mv: -0.1,
            qtc_age_threshold_years: 18,
            qtc_pediatric_ms: 440.0,
            qtc_adult_ms: 460.0,
            mm_per_mv: 10.0,
            lvh_sokolow_mm: 35.0,
            hyperkalemia_t_mv: 0.5,
            hypokalemia_t_mv: 0.1,
        }
    }
}

/// Complete pipeline configuration, loadable from TOML. Missing tables and
/// keys fall back to their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub conditioning: ConditioningConfig,
    pub detection: DetectionConfig,
    pub measurement: MeasurementConfig,
    pub thresholds: DiagnosticThresholds,
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let cfg: PipelineConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.conditioning;
        if !(c.low_cutoff_hz >= 0.0 && c.low_cutoff_hz < c.high_cutoff_hz) {
            return Err(invalid(format!(
                "band-pass cutoffs must satisfy 0 <= low < high (got {} .. {})",
                c.low_cutoff_hz, c.high_cutoff_hz
            )));
        }
        if c.baseline_window_ms <= 0.0 {
            return Err(invalid("baseline_window_ms must be positive"));
        }
        if c.smooth_window_samples % 2 == 0 {
            return Err(invalid("smooth_window_samples must be odd"));
        }
        if c.smooth_poly_order >= c.smooth_window_samples {
            return Err(invalid("smooth_poly_order must be less than smooth_window_samples"));
        }

        let d = &self.detection;
        if !(0.0..=1.0).contains(&d.r_threshold_ratio) {
            return Err(invalid("r_threshold_ratio must lie in [0, 1]"));
        }
        let windows = [
            ("qrs_half_window_s", d.qrs_half_window_s),
            ("p_search_window_s", d.p_search_window_s),
            ("p_deriv_window_s", d.p_deriv_window_s),
            ("t_search_window_s", d.t_search_window_s),
            ("t_deriv_window_s", d.t_deriv_window_s),
        ];
        for (name, value) in windows {
            if value <= 0.0 {
                return Err(invalid(format!("{name} must be positive")));
            }
        }
        if d.p_exclusion_s < 0.0 {
            return Err(invalid("p_exclusion_s must not be negative"));
        }
        if self.measurement.st_offset_s < 0.0 {
            return Err(invalid("st_offset_s must not be negative"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> EcgError {
    EcgError::InvalidConfig(msg.into())
}
