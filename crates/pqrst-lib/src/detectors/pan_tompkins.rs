//! Envelope-based R-peak detector in the Pan–Tompkins family.

use crate::{
    config::PanTompkinsConfig,
    detectors::ecg::RPeakDetector,
    signal::{seconds_to_samples, Events},
};
use log::debug;
use std::f64::consts::PI;

/// Band-pass -> derivative -> square -> moving-window integration, followed by
/// an adaptive threshold with refractory period and search-back.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanTompkins {
    cfg: PanTompkinsConfig,
}

impl PanTompkins {
    pub fn new(cfg: PanTompkinsConfig) -> Self {
        Self { cfg }
    }

    /// Band-passed signal and its integrated energy envelope.
    fn envelope(&self, data: &[f64], fs: f64) -> (Vec<f64>, Vec<f64>) {
        let bandpassed = bandpass(data, fs, self.cfg.lowcut_hz, self.cfg.highcut_hz);
        let energy: Vec<f64> = first_difference(&bandpassed).iter().map(|d| d * d).collect();
        let win = seconds_to_samples(self.cfg.integration_window_s, fs).max(1);
        let integrated = moving_average(&energy, win);
        (bandpassed, integrated)
    }

    fn pick_peaks(&self, bandpassed: &[f64], envelope: &[f64], fs: f64) -> Vec<usize> {
        if bandpassed.is_empty() || envelope.is_empty() {
            return Vec::new();
        }
        let refractory = seconds_to_samples(self.cfg.min_rr_s, fs).max(1);
        let search = seconds_to_samples(self.cfg.search_back_s, fs).max(1);

        let init = envelope.len().min((fs as usize).max(1));
        let avg = envelope[..init].iter().sum::<f64>() / init as f64;
        let mut signal_level = avg;
        let mut noise_level = avg * 0.5;
        let scale = self.cfg.threshold_scale;
        let threshold = |signal: f64, noise: f64| noise + scale * (signal - noise).max(0.0);
        let mut current = threshold(signal_level, noise_level);
        let mut last_detection: Option<usize> = None;
        let mut peaks = Vec::new();

        for (i, &sample) in envelope.iter().enumerate() {
            let refractory_ok = last_detection.map_or(true, |last| i - last >= refractory);
            if sample >= current && refractory_ok {
                let start = i.saturating_sub(search);
                let end = i.min(bandpassed.len() - 1);
                let idx = (start..=end)
                    .max_by(|&a, &b| bandpassed[a].total_cmp(&bandpassed[b]).then(b.cmp(&a)))
                    .unwrap_or(start);
                peaks.push(idx);
                last_detection = Some(i);
                signal_level = 0.125 * sample + 0.875 * signal_level;
            } else {
                noise_level = 0.125 * sample + 0.875 * noise_level;
            }
            current = threshold(signal_level, noise_level);
        }

        peaks.sort_unstable();
        peaks.dedup();
        peaks
    }

    /// Local maxima of the signal above its own 150 ms moving average,
    /// separated by the refractory period.
    fn fallback_peaks(&self, data: &[f64], fs: f64) -> Vec<usize> {
        if data.len() < 3 {
            return Vec::new();
        }
        let min_gap = seconds_to_samples(self.cfg.min_rr_s, fs).max(1);
        let ma = moving_average(data, seconds_to_samples(0.150, fs).max(1));
        let detrended: Vec<f64> = data.iter().zip(&ma).map(|(x, m)| x - m).collect();

        let mut peaks: Vec<usize> = Vec::new();
        for i in 1..data.len() - 1 {
            let y = detrended[i];
            let is_peak = y > 0.0 && y > detrended[i - 1] && y > detrended[i + 1];
            let spaced = peaks.last().map_or(true, |&last| i - last >= min_gap);
            if is_peak && spaced {
                peaks.push(i);
            }
        }
        peaks
    }
}

impl RPeakDetector for PanTompkins {
    fn detect(&self, signal: &[f64], fs: f64) -> Events {
        if signal.is_empty() {
            return Events::default();
        }
        let fs = fs.max(1.0);
        let (bandpassed, integrated) = self.envelope(signal, fs);
        let peaks = self.pick_peaks(&bandpassed, &integrated, fs);
        if peaks.len() < 2 {
            debug!("adaptive threshold found {} peak(s); using fallback picker", peaks.len());
            return Events::from_indices(self.fallback_peaks(signal, fs));
        }
        Events::from_indices(peaks)
    }
}

fn bandpass(data: &[f64], fs: f64, low: f64, high: f64) -> Vec<f64> {
    let hp = if low > 0.0 {
        single_pole_highpass(data, fs, low)
    } else {
        data.to_vec()
    };
    if high <= 0.0 || high >= fs * 0.5 {
        hp
    } else {
        single_pole_lowpass(&hp, fs, high)
    }
}

fn rc_constant(cutoff: f64) -> f64 {
    1.0 / (2.0 * PI * cutoff.max(0.01))
}

fn single_pole_highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let rc = rc_constant(cutoff);
    let alpha = rc / (rc + 1.0 / fs);
    let (mut prev_y, mut prev_x) = (first, first);
    data.iter()
        .map(|&x| {
            let y = alpha * (prev_y + x - prev_x);
            prev_y = y;
            prev_x = x;
            y
        })
        .collect()
}

fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let dt = 1.0 / fs;
    let alpha = dt / (rc_constant(cutoff) + dt);
    let mut prev = first;
    data.iter()
        .map(|&x| {
            prev += alpha * (x - prev);
            prev
        })
        .collect()
}

fn first_difference(data: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; data.len()];
    for i in 1..data.len() {
        out[i] = data[i] - data[i - 1];
    }
    out
}

/// Trailing moving average over `win` samples (zero-padded warm-up).
fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 {
        return data.to_vec();
    }
    let mut out = Vec::with_capacity(data.len());
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out.push(acc / win as f64);
    }
    out
}
