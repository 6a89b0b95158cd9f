//! Signal conditioning: FFT band-pass, sliding-median baseline removal and
//! Savitzky–Golay smoothing, plus the cross-lead merge.

use crate::{
    config::ConditioningConfig,
    error::{EcgError, Result},
    signal::{Waveform, MERGED_LABEL, TREATED_SUFFIX},
};
use log::debug;
use num_traits::Float;
use realfft::RealFftPlanner;

/// Condition a raw lead: denoise -> baseline-correct -> smooth.
///
/// Returns a new waveform labelled `"<label> (treated)"`; `raw` is untouched.
pub fn condition_waveform(raw: &Waveform, cfg: &ConditioningConfig) -> Result<Waveform> {
    if raw.len() < cfg.smooth_window_samples {
        return Err(EcgError::SignalTooShort {
            label: raw.label().to_string(),
            len: raw.len(),
            window: cfg.smooth_window_samples,
        });
    }
    let fs = raw.fs();
    let denoised = bandpass_fft(raw.points(), fs, cfg.low_cutoff_hz, cfg.high_cutoff_hz)?;
    let window = baseline_window_len(cfg.baseline_window_ms, fs);
    let corrected = remove_baseline(&denoised, window);
    let smoothed = savgol_smooth(&corrected, cfg.smooth_window_samples, cfg.smooth_poly_order)?;
    debug!(
        "conditioned `{}`: {} samples, baseline window {} samples",
        raw.label(),
        raw.len(),
        window
    );
    raw.derive(format!("{}{}", raw.label(), TREATED_SUFFIX), smoothed)
}

/// Condition every raw lead, appending the `"Merged"` average when requested.
pub fn condition_all(raw: &[Waveform], cfg: &ConditioningConfig, merge: bool) -> Result<Vec<Waveform>> {
    let mut treated = raw
        .iter()
        .map(|lead| condition_waveform(lead, cfg))
        .collect::<Result<Vec<_>>>()?;
    if merge {
        let merged = merge_waveforms(&treated)?;
        treated.push(merged);
    }
    Ok(treated)
}

/// Elementwise mean of leads that share one sampling rate and one length.
pub fn merge_waveforms(leads: &[Waveform]) -> Result<Waveform> {
    let first = leads.first().ok_or(EcgError::EmptyMerge)?;
    let (rate, len) = (first.sampling_rate(), first.len());
    if let Some(bad) = leads
        .iter()
        .find(|lead| lead.sampling_rate() != rate || lead.len() != len)
    {
        return Err(EcgError::MergeMismatch {
            label: bad.label().to_string(),
            rate: bad.sampling_rate(),
            len: bad.len(),
            expected_rate: rate,
            expected_len: len,
        });
    }
    let mut sum = vec![0.0; len];
    for lead in leads {
        for (acc, &x) in sum.iter_mut().zip(lead.points()) {
            *acc += x;
        }
    }
    let count = leads.len() as f64;
    let mean = sum.into_iter().map(|x| x / count).collect();
    Waveform::new(MERGED_LABEL, mean, rate)
}

/// Zero every real-FFT bin whose frequency lies outside `[low, high]` Hz.
///
/// Forward and inverse transforms are planned for the exact input length, so
/// odd lengths round-trip to the same number of samples.
pub fn bandpass_fft(data: &[f64], fs: f64, low: f64, high: f64) -> Result<Vec<f64>> {
    let n = data.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n);
    let c2r = planner.plan_fft_inverse(n);

    let mut input = data.to_vec();
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut input, &mut spectrum)
        .map_err(|e| EcgError::Fft(e.to_string()))?;

    let bin_hz = fs / n as f64;
    for (k, bin) in spectrum.iter_mut().enumerate() {
        let freq = k as f64 * bin_hz;
        if freq < low || freq > high {
            *bin = realfft::num_complex::Complex::new(0.0, 0.0);
        }
    }
    // c2r rejects non-zero imaginary parts on the purely real bins.
    spectrum[0].im = 0.0;
    if n % 2 == 0 {
        if let Some(nyquist) = spectrum.last_mut() {
            nyquist.im = 0.0;
        }
    }

    let mut output = c2r.make_output_vec();
    c2r.process(&mut spectrum, &mut output)
        .map_err(|e| EcgError::Fft(e.to_string()))?;
    let scale = 1.0 / n as f64;
    Ok(output.into_iter().map(|x| x * scale).collect())
}

/// Median window length for a duration in ms, forced odd.
pub fn baseline_window_len(window_ms: f64, fs: f64) -> usize {
    let len = ((window_ms / 1000.0) * fs).round().max(1.0) as usize;
    if len % 2 == 0 {
        len + 1
    } else {
        len
    }
}

/// Subtract a sliding-median estimate of the baseline.
pub fn remove_baseline(data: &[f64], window: usize) -> Vec<f64> {
    let baseline = median_filter(data, window);
    data.iter().zip(baseline).map(|(x, b)| x - b).collect()
}

/// Centered sliding median with symmetric (mirror) edge extension.
pub fn median_filter(data: &[f64], window: usize) -> Vec<f64> {
    let n = data.len();
    if n == 0 || window <= 1 {
        return data.to_vec();
    }
    let half = (window / 2) as isize;
    let mut scratch = Vec::with_capacity(window);
    (0..n as isize)
        .map(|i| {
            scratch.clear();
            scratch.extend((i - half..=i + half).map(|j| data[mirror_index(j, n)]));
            let mid = scratch.len() / 2;
            let (_, median, _) = scratch.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            *median
        })
        .collect()
}

fn mirror_index(j: isize, n: usize) -> usize {
    let n = n as isize;
    let m = j.rem_euclid(2 * n);
    (if m < n { m } else { 2 * n - 1 - m }) as usize
}

/// Savitzky–Golay smoothing. Interior samples use the centered fit; the first
/// and last half-windows are evaluated on the polynomial fitted to the first
/// and last full window.
pub fn savgol_smooth(data: &[f64], window: usize, order: usize) -> Result<Vec<f64>> {
    let n = data.len();
    if window % 2 == 0 || order >= window {
        return Err(EcgError::InvalidConfig(format!(
            "Savitzky-Golay needs an odd window larger than the order (window {window}, order {order})"
        )));
    }
    if n < window {
        return Err(EcgError::SignalTooShort {
            label: String::from("<samples>"),
            len: n,
            window,
        });
    }
    let half = window / 2;
    let mut out = vec![0.0; n];

    let center = polyfit_weights(window, order, 0.0)?;
    for i in half..n - half {
        out[i] = dot(&center, &data[i - half..=i + half]);
    }

    let head = &data[..window];
    let tail = &data[n - window..];
    for i in 0..half {
        let w = polyfit_weights(window, order, i as f64 - half as f64)?;
        out[i] = dot(&w, head);
        let w = polyfit_weights(window, order, (i + 1) as f64)?;
        out[n - half + i] = dot(&w, tail);
    }
    Ok(out)
}

fn dot(weights: &[f64], samples: &[f64]) -> f64 {
    weights.iter().zip(samples).map(|(w, x)| w * x).sum()
}

/// Weights `w` such that `sum(w[j] * y[j])` is the least-squares polynomial of
/// `order`, fitted to `window` samples at offsets `j - window/2`, evaluated at
/// offset `at`.
fn polyfit_weights(window: usize, order: usize, at: f64) -> Result<Vec<f64>> {
    let half = (window / 2) as f64;
    let xs: Vec<f64> = (0..window).map(|j| j as f64 - half).collect();
    let terms = order + 1;
    let mut normal = vec![vec![0.0; terms]; terms];
    for (a, row) in normal.iter_mut().enumerate() {
        for (b, cell) in row.iter_mut().enumerate() {
            *cell = xs.iter().map(|x| x.powi((a + b) as i32)).sum();
        }
    }
    let rhs: Vec<f64> = (0..terms).map(|a| at.powi(a as i32)).collect();
    let z = solve_linear(normal, rhs).ok_or_else(|| {
        EcgError::InvalidConfig(format!("singular Savitzky-Golay system (window {window}, order {order})"))
    })?;
    Ok(xs
        .iter()
        .map(|x| z.iter().enumerate().map(|(a, za)| x.powi(a as i32) * za).sum())
        .collect())
}

/// Gaussian elimination with partial pivoting.
fn solve_linear<T: Float>(mut m: Vec<Vec<T>>, mut v: Vec<T>) -> Option<Vec<T>> {
    let n = v.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&a, &b| {
            m[a][col]
                .abs()
                .partial_cmp(&m[b][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if m[pivot][col].abs() <= T::epsilon() {
            return None;
        }
        m.swap(col, pivot);
        v.swap(col, pivot);
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = m[row][col] / m[col][col];
            for k in col..n {
                let delta = factor * m[col][k];
                m[row][k] = m[row][k] - delta;
            }
            let delta = factor * v[col];
            v[row] = v[row] - delta;
        }
    }
    Some((0..n).map(|i| v[i] / m[i][i]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(fs: f64, freq: f64, n: usize, amp: f64) -> Vec<f64> {
        (0..n)
            .map(|i| amp * (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
    }

    #[test]
    fn bandpass_keeps_length_for_odd_input() {
        let data = sine(500.0, 10.0, 1001, 1.0);
        let out = bandpass_fft(&data, 500.0, 0.5, 40.0).unwrap();
        assert_eq!(out.len(), 1001);
    }

    #[test]
    fn bandpass_removes_out_of_band_components() {
        let fs = 500.0;
        let n = 1000;
        let wanted = sine(fs, 10.0, n, 1.0);
        let hum = sine(fs, 60.0, n, 0.5);
        let drift: Vec<f64> = (0..n).map(|_| 2.0).collect();
        let noisy: Vec<f64> = (0..n).map(|i| wanted[i] + hum[i] + drift[i]).collect();
        let out = bandpass_fft(&noisy, fs, 0.5, 40.0).unwrap();
        assert!(max_abs_diff(&out, &wanted) < 1e-9);
    }

    #[test]
    fn baseline_window_is_forced_odd() {
        assert_eq!(baseline_window_len(200.0, 500.0), 101);
        assert_eq!(baseline_window_len(200.0, 250.0), 51);
        assert_eq!(baseline_window_len(1.0, 100.0), 1);
    }

    #[test]
    fn median_filter_mirrors_edges() {
        let out = median_filter(&[5.0, 1.0, 9.0, 3.0], 3);
        // [5 | 5 1 9 3 | 3]
        assert_eq!(out, vec![5.0, 5.0, 3.0, 3.0]);
    }

    #[test]
    fn baseline_removal_cancels_constant_offset() {
        let out = remove_baseline(&[4.0; 20], 5);
        assert!(out.iter().all(|x| x.abs() < 1e-12));
    }

    #[test]
    fn savgol_preserves_quadratics_everywhere() {
        let data: Vec<f64> = (0..50).map(|i| 0.5 * (i as f64).powi(2) - 3.0 * i as f64 + 1.0).collect();
        let out = savgol_smooth(&data, 31, 2).unwrap();
        assert!(max_abs_diff(&out, &data) < 1e-6);
    }

    #[test]
    fn savgol_rejects_short_signal() {
        assert!(matches!(
            savgol_smooth(&[1.0; 10], 31, 2),
            Err(EcgError::SignalTooShort { len: 10, window: 31, .. })
        ));
    }

    #[test]
    fn conditioning_labels_copy_and_keeps_raw() {
        let raw = Waveform::new("II", sine(500.0, 5.0, 1000, 1.0), 500).unwrap();
        let before = raw.clone();
        let treated = condition_waveform(&raw, &ConditioningConfig::default()).unwrap();
        assert_eq!(treated.label(), "II (treated)");
        assert_eq!(treated.base_label(), "II");
        assert_eq!(treated.len(), raw.len());
        assert_eq!(raw, before);
    }

    #[test]
    fn conditioning_short_lead_fails() {
        let raw = Waveform::new("V1", vec![0.0; 12], 500).unwrap();
        let err = condition_waveform(&raw, &ConditioningConfig::default()).unwrap_err();
        assert!(matches!(err, EcgError::SignalTooShort { ref label, .. } if label == "V1"));
    }

    #[test]
    fn conditioning_is_idempotent_in_the_interior() {
        // 5 Hz at 1 kHz: in-band, whole periods under the 201-sample median.
        let fs = 1000;
        let x = sine(fs as f64, 5.0, 2000, 1.0);
        let cfg = ConditioningConfig::default();
        let raw = Waveform::new("I", x.clone(), fs).unwrap();
        let once = condition_waveform(&raw, &cfg).unwrap();
        assert!(max_abs_diff(&once.points()[300..1700], &x[300..1700]) < 1e-3);

        let twice = condition_waveform(&once, &cfg).unwrap();
        assert!(max_abs_diff(&twice.points()[500..1500], &once.points()[500..1500]) < 1e-2);
    }

    #[test]
    fn merge_rejects_mismatched_leads() {
        let a = Waveform::new("I", vec![0.0; 10], 500).unwrap();
        let b = Waveform::new("II", vec![0.0; 10], 250).unwrap();
        let c = Waveform::new("III", vec![0.0; 11], 500).unwrap();
        assert!(matches!(
            merge_waveforms(&[a.clone(), b]),
            Err(EcgError::MergeMismatch { rate: 250, .. })
        ));
        assert!(matches!(
            merge_waveforms(&[a, c]),
            Err(EcgError::MergeMismatch { len: 11, .. })
        ));
        assert_eq!(merge_waveforms(&[]).unwrap_err(), EcgError::EmptyMerge);
    }

    #[test]
    fn merging_identical_leads_reproduces_the_lead() {
        let lead = Waveform::new("V2", sine(500.0, 3.0, 300, 0.7), 500).unwrap();
        let merged = merge_waveforms(&[lead.clone(), lead.clone(), lead.clone()]).unwrap();
        assert_eq!(merged.label(), "Merged");
        assert_eq!(merged.sampling_rate(), 500);
        assert!(max_abs_diff(merged.points(), lead.points()) < 1e-12);
    }

    #[test]
    fn condition_all_appends_merged_lead() {
        let leads = vec![
            Waveform::new("I", sine(500.0, 5.0, 600, 1.0), 500).unwrap(),
            Waveform::new("II", sine(500.0, 7.0, 600, 1.0), 500).unwrap(),
        ];
        let out = condition_all(&leads, &ConditioningConfig::default(), true).unwrap();
        let labels: Vec<_> = out.iter().map(|w| w.label()).collect();
        assert_eq!(labels, vec!["I (treated)", "II (treated)", "Merged"]);
    }
}
