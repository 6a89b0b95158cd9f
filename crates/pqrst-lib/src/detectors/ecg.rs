use crate::{
    config::{DetectionConfig, RPeakMethod},
    detectors::pan_tompkins::PanTompkins,
    error::Result,
    signal::{seconds_to_samples, Events, FiducialKind, Fiducials, Waveform},
};
use log::{debug, warn};
use num_traits::Float;

/// Capability interface for anything that can locate R peaks in a lead.
pub trait RPeakDetector {
    fn detect(&self, signal: &[f64], fs: f64) -> Events;
}

/// Threshold-run detector: one R peak per contiguous run above
/// `threshold_ratio * (max - min) + min`.
#[derive(Debug, Clone, Copy)]
pub struct LocalMaxima {
    pub threshold_ratio: f64,
}

impl Default for LocalMaxima {
    fn default() -> Self {
        Self {
            threshold_ratio: 0.7,
        }
    }
}

impl RPeakDetector for LocalMaxima {
    fn detect(&self, signal: &[f64], _fs: f64) -> Events {
        detect_local_maxima(signal, self.threshold_ratio)
    }
}

/// Build the detector selected by the configuration.
pub fn detector_for(cfg: &DetectionConfig) -> Box<dyn RPeakDetector> {
    match cfg.r_peak_method {
        RPeakMethod::LocalMaxima => Box::new(LocalMaxima {
            threshold_ratio: cfg.r_threshold_ratio,
        }),
        RPeakMethod::PanTompkins => Box::new(PanTompkins::new(cfg.pan_tompkins)),
    }
}

/// Emit the argmax (first occurrence) of every run of samples at or above the
/// threshold. A run still open when the signal ends is dropped.
pub fn detect_local_maxima(signal: &[f64], threshold_ratio: f64) -> Events {
    let Some((min, max)) = min_max(signal) else {
        return Events::default();
    };
    let threshold = threshold_ratio * (max - min) + min;
    let mut peaks = Vec::new();
    let mut run: Option<(usize, f64)> = None;
    for (i, &x) in signal.iter().enumerate() {
        if x >= threshold {
            match run {
                Some((_, best)) if x <= best => {}
                _ => run = Some((i, x)),
            }
        } else if let Some((idx, _)) = run.take() {
            peaks.push(idx);
        }
    }
    if let Some((idx, _)) = run {
        debug!("dropping candidate R peak at {idx}: run reaches end of signal");
    }
    Events::from_indices(peaks)
}

/// Q and S indices, one per R peak whose search window is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QsPoints {
    pub q: Vec<usize>,
    pub s: Vec<usize>,
}

/// Q = minimum of `[r - half, r)`, S = minimum of `[r, r + half)`, with
/// `half = round(half_window_s * fs)` and both windows clipped to the signal.
pub fn detect_q_and_s(signal: &[f64], r_peaks: &[usize], fs: f64, half_window_s: f64) -> QsPoints {
    let half = seconds_to_samples(half_window_s, fs);
    let n = signal.len();
    let mut out = QsPoints::default();
    for &r in r_peaks.iter().filter(|&&r| r < n) {
        let left_start = r.saturating_sub(half);
        if let Some(q) = argmin(&signal[left_start..r]) {
            out.q.push(left_start + q);
        }
        let right_end = n.min(r + half);
        if let Some(s) = argmin(&signal[r..right_end]) {
            out.s.push(r + s);
        }
    }
    out
}

/// First index before each R whose forward slope exceeds the P threshold.
///
/// The scan covers `[start, start + search - exclusion)` with
/// `start = r - search` clipped at zero. For an R closer to the start of the
/// trace than `search`, the scan end is measured from the clipped start.
pub fn detect_p_onsets(signal: &[f64], r_peaks: &[usize], fs: f64, cfg: &DetectionConfig) -> Vec<usize> {
    let n = signal.len();
    let search = seconds_to_samples(cfg.p_search_window_s, fs);
    let deriv = seconds_to_samples(cfg.p_deriv_window_s, fs).max(1);
    let exclusion = seconds_to_samples(cfg.p_exclusion_s, fs);
    let mut onsets = Vec::new();
    for &r in r_peaks {
        let start = r.saturating_sub(search);
        let end = (start + search).saturating_sub(exclusion);
        let found = (start..end)
            .take_while(|&i| i + deriv < n)
            .find(|&i| slope(signal, i, deriv) > cfg.p_slope_threshold);
        match found {
            Some(i) => onsets.push(i),
            None => debug!("no P onset found for R at {r}"),
        }
    }
    onsets
}

/// First index after each R where the slope turns from negative to
/// non-negative, scanning `[r + search, r + 2 * search)` clipped to the signal.
///
/// The previous slope is seeded with 0 for every beat, so a scan that opens on
/// a rising edge cannot fire on its first sample.
pub fn detect_t_ends(signal: &[f64], r_peaks: &[usize], fs: f64, cfg: &DetectionConfig) -> Vec<usize> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let search = seconds_to_samples(cfg.t_search_window_s, fs);
    let deriv = seconds_to_samples(cfg.t_deriv_window_s, fs).max(1);
    let mut ends = Vec::new();
    for &r in r_peaks {
        let start = (n - 1).min(r + search);
        let end = n.min(start + search);
        let mut prev = 0.0;
        let mut found = None;
        for i in (start..end).take_while(|&i| i + deriv < n) {
            let cur = slope(signal, i, deriv);
            if prev < 0.0 && cur >= 0.0 {
                found = Some(i);
                break;
            }
            prev = cur;
        }
        match found {
            Some(i) => ends.push(i),
            None => debug!("no T end found for R at {r}"),
        }
    }
    ends
}

/// Run every fiducial detector around the supplied R peaks.
pub fn detect_fiducials(signal: &[f64], r_peaks: &Events, fs: f64, cfg: &DetectionConfig) -> Result<Fiducials> {
    let n = signal.len();
    let r = &r_peaks.indices;
    let qs = detect_q_and_s(signal, r, fs, cfg.qrs_half_window_s);
    let p = detect_p_onsets(signal, r, fs, cfg);
    let t = detect_t_ends(signal, r, fs, cfg);

    let mut fiducials = Fiducials::new();
    fiducials.insert(FiducialKind::R, r.clone(), n)?;
    fiducials.insert(FiducialKind::Q, qs.q, n)?;
    fiducials.insert(FiducialKind::S, qs.s, n)?;
    fiducials.insert(FiducialKind::POnset, p, n)?;
    fiducials.insert(FiducialKind::TEnd, t, n)?;
    Ok(fiducials)
}

/// Return a copy of `lead` annotated with fiducials. R peaks come from
/// `external` when given, otherwise from the configured detector.
pub fn annotate_waveform(lead: &Waveform, external: Option<&Events>, cfg: &DetectionConfig) -> Result<Waveform> {
    let peaks = match external {
        Some(events) => events.clone().validated(lead.len())?,
        None => detector_for(cfg).detect(lead.points(), lead.fs()),
    };
    if peaks.is_empty() {
        warn!("no R peaks in `{}`; its measurements will be empty", lead.label());
    }
    let fiducials = detect_fiducials(lead.points(), &peaks, lead.fs(), cfg)?;
    debug!(
        "`{}`: R={} Q={} S={} P={} T_end={}",
        lead.label(),
        fiducials.get(FiducialKind::R).len(),
        fiducials.get(FiducialKind::Q).len(),
        fiducials.get(FiducialKind::S).len(),
        fiducials.get(FiducialKind::POnset).len(),
        fiducials.get(FiducialKind::TEnd).len(),
    );
    lead.clone().with_fiducials(fiducials)
}

fn slope(signal: &[f64], i: usize, deriv: usize) -> f64 {
    (signal[i + deriv] - signal[i]) / deriv as f64
}

fn argmin<T: Float>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

fn min_max<T: Float>(values: &[T]) -> Option<(T, T)> {
    let first = *values.first()?;
    Some(
        values
            .iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_region_yields_its_argmax() {
        let signal = [0.0, 0.1, 0.2, 0.8, 1.0, 0.9, 0.95, 0.1, 0.0, 0.05];
        let events = detect_local_maxima(&signal, 0.7);
        assert_eq!(events.indices, vec![4]);
    }

    #[test]
    fn repeated_maximum_keeps_first_occurrence() {
        let signal = [0.0, 1.0, 1.0, 0.0];
        assert_eq!(detect_local_maxima(&signal, 0.7).indices, vec![1]);
    }

    #[test]
    fn several_runs_give_increasing_peaks() {
        let signal = [0.0, 1.0, 0.0, 0.0, 0.9, 0.0, 0.95, 0.0];
        assert_eq!(detect_local_maxima(&signal, 0.7).indices, vec![1, 4, 6]);
    }

    #[test]
    fn run_open_at_the_end_is_dropped() {
        let signal = [0.0, 1.0, 0.0, 0.2, 0.9, 1.0];
        assert_eq!(detect_local_maxima(&signal, 0.7).indices, vec![1]);
        assert!(detect_local_maxima(&[], 0.7).is_empty());
    }

    #[test]
    fn q_and_s_stay_inside_their_windows() {
        // Rises to the midpoint then falls: minima sit at the window edges.
        let n = 201;
        let r = 100;
        let signal: Vec<f64> = (0..n).map(|i| -((i as f64) - r as f64).abs()).collect();
        let fs = 500.0;
        let qs = detect_q_and_s(&signal, &[r], fs, 0.10);
        let half = 50;
        assert_eq!(qs.q, vec![r - half]);
        assert_eq!(qs.s, vec![r + half - 1]);
    }

    #[test]
    fn q_and_s_on_v_shaped_signal() {
        let signal: Vec<f64> = (0..21).map(|i| ((i as f64) - 10.0).abs()).collect();
        let qs = detect_q_and_s(&signal, &[10], 100.0, 0.05);
        assert_eq!(qs.q, vec![9]);
        assert_eq!(qs.s, vec![10]);
        assert!(qs.q[0] >= 5 && qs.s[0] <= 15);
    }

    #[test]
    fn r_peak_at_zero_has_no_q() {
        let signal = [1.0, 0.2, -0.5, 0.0, 0.1, 0.0];
        let qs = detect_q_and_s(&signal, &[0], 20.0, 0.15);
        assert!(qs.q.is_empty());
        assert_eq!(qs.s, vec![2]);
    }

    #[test]
    fn p_onset_is_first_steep_rise_before_r() {
        let fs = 100.0;
        let mut signal = vec![0.0; 200];
        // P wave rising from 80, R at 110.
        for (k, v) in signal.iter_mut().enumerate().skip(80).take(10) {
            *v = (k - 80) as f64;
        }
        signal[110] = 20.0;
        let onsets = detect_p_onsets(&signal, &[110], fs, &DetectionConfig::default());
        // scan [80, 90); slope window 8 samples, slope 1.0 > 0.25 from 80.
        assert_eq!(onsets, vec![80]);
    }

    #[test]
    fn p_scan_for_early_r_runs_from_clipped_start() {
        let fs = 500.0;
        // Flat up to 65, then rising one unit per sample. R at 120 is closer
        // to the trace start than the 150-sample search window.
        let signal: Vec<f64> = (0..200).map(|i| (i as f64 - 65.0).max(0.0)).collect();
        let onsets = detect_p_onsets(&signal, &[120], fs, &DetectionConfig::default());
        // scan [0, 50); slope over 40 samples first exceeds 0.25 at 36 (11 / 40).
        assert_eq!(onsets, vec![36]);
    }

    #[test]
    fn t_end_slope_seed_resets_per_beat() {
        let fs = 100.0;
        // Descends through the whole first scan [40, 70), rises from 75 to 95,
        // falls to 105 and rises again.
        let signal: Vec<f64> = (0..200)
            .map(|i| match i {
                0..=75 => -(i as f64),
                76..=95 => -75.0 + (i - 75) as f64,
                96..=105 => -55.0 - 2.0 * (i - 95) as f64,
                _ => -75.0 + (i - 105) as f64,
            })
            .collect();
        let ends = detect_t_ends(&signal, &[10, 50], fs, &DetectionConfig::default());
        // The first beat finds nothing. The second scan [80, 110) opens on a
        // rise, which does not count, and fires at the next trough.
        assert_eq!(ends, vec![104]);
    }

    #[test]
    fn t_end_is_slope_sign_change() {
        let fs = 100.0;
        let r = 10;
        // Falling until 60, flat after.
        let signal: Vec<f64> = (0..120)
            .map(|i| if i < 60 { -(i as f64) } else { -60.0 })
            .collect();
        let ends = detect_t_ends(&signal, &[r], fs, &DetectionConfig::default());
        // deriv = 4 samples: slope at 56 is (-60 - -56)/4 < 0, at 57..59 still < 0, at 60 == 0.
        assert_eq!(ends, vec![60]);
    }

    #[test]
    fn t_end_scan_near_the_end_is_truncated_quietly() {
        let signal = vec![0.0; 50];
        let ends = detect_t_ends(&signal, &[45], 100.0, &DetectionConfig::default());
        assert!(ends.is_empty());
    }

    #[test]
    fn annotate_uses_external_peaks_and_checks_bounds() {
        let lead = Waveform::new("II", vec![0.0; 100], 100).unwrap();
        let cfg = DetectionConfig::default();
        let peaks = Events::from_indices(vec![60, 20]);
        let out = annotate_waveform(&lead, Some(&peaks), &cfg).unwrap();
        assert_eq!(out.fiducials().unwrap().get(FiducialKind::R), &[20, 60]);

        let bad = Events::from_indices(vec![100]);
        assert!(annotate_waveform(&lead, Some(&bad), &cfg).is_err());
    }
}
