use crate::{
    config::MeasurementConfig,
    error::{EcgError, Result},
    metrics::hrv::{hrv_time, HrvTime},
    signal::{samples_to_ms, seconds_to_samples, FiducialKind, Fiducials, Waveform},
};
use serde::{Deserialize, Serialize};

/// One per-beat measurement, keyed by the sample index of its R peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatValue {
    pub r: usize,
    pub value: f64,
}

impl BeatValue {
    pub fn new(r: usize, value: f64) -> Self {
        Self { r, value }
    }
}

/// Fiducials associated with a single R peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Beat {
    pub r: usize,
    pub next_r: Option<usize>,
    pub p_onset: Option<usize>,
    pub q: Option<usize>,
    pub s: Option<usize>,
    pub t_end: Option<usize>,
}

/// Join every fiducial kind onto the R peaks. P and Q are the latest points
/// between the previous R and this one, S the earliest at or after R and T end
/// the earliest after R, both before the next R.
pub fn beats(fiducials: &Fiducials, len: usize) -> Vec<Beat> {
    let rs = fiducials.get(FiducialKind::R);
    rs.iter()
        .enumerate()
        .map(|(i, &r)| {
            let prev_r = i.checked_sub(1).map(|j| rs[j]);
            let next_r = rs.get(i + 1).copied();
            let upper = next_r.unwrap_or(len);
            Beat {
                r,
                next_r,
                p_onset: latest_before(fiducials.get(FiducialKind::POnset), prev_r, r),
                q: latest_before(fiducials.get(FiducialKind::Q), prev_r, r),
                s: earliest_from(fiducials.get(FiducialKind::S), r, upper),
                t_end: earliest_from(fiducials.get(FiducialKind::TEnd), r + 1, upper),
            }
        })
        .collect()
}

/// Latest index in `(lower, upper)`.
fn latest_before(sorted: &[usize], lower: Option<usize>, upper: usize) -> Option<usize> {
    let idx = sorted.partition_point(|&x| x < upper);
    let candidate = *sorted.get(idx.checked_sub(1)?)?;
    lower.map_or(true, |lo| candidate > lo).then_some(candidate)
}

/// Earliest index in `[lower, upper)`.
fn earliest_from(sorted: &[usize], lower: usize, upper: usize) -> Option<usize> {
    let idx = sorted.partition_point(|&x| x < lower);
    sorted.get(idx).copied().filter(|&x| x < upper)
}

/// Per-beat interval and amplitude measurements for one lead.
///
/// Series have independent lengths: a beat missing a fiducial is left out of
/// the measurements that need it. Join across series on [`BeatValue::r`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSet {
    /// P onset -> R (ms).
    pub pr_intervals: Vec<BeatValue>,
    /// P onset -> Q (ms).
    pub pr_segments: Vec<BeatValue>,
    /// Q -> S (ms).
    pub qrs_durations: Vec<BeatValue>,
    /// Q -> T end (ms).
    pub qt_intervals: Vec<BeatValue>,
    /// ST level relative to the isoelectric PR segment (mV).
    pub st_deviations: Vec<BeatValue>,
    /// R -> next R (ms), keyed by the first R.
    pub rr_intervals: Vec<BeatValue>,
    pub p_amplitudes: Vec<BeatValue>,
    pub qrs_amplitudes: Vec<BeatValue>,
    pub t_amplitudes: Vec<BeatValue>,
    /// Frontal-plane QRS axis (degrees), when limb leads allow it.
    pub qrs_axis: Option<f64>,
}

impl MeasurementSet {
    /// `60000 / mean(RR)` in bpm; 0 when there are no RR intervals.
    pub fn heart_rate(&self) -> f64 {
        if self.rr_intervals.is_empty() {
            return 0.0;
        }
        let mean = values(&self.rr_intervals).sum::<f64>() / self.rr_intervals.len() as f64;
        if mean > 0.0 {
            60000.0 / mean
        } else {
            0.0
        }
    }

    /// Bazett-corrected QT for every beat with both a QT and an RR interval.
    pub fn qtc_bazett(&self) -> Vec<BeatValue> {
        self.qt_intervals
            .iter()
            .filter_map(|qt| {
                self.rr_intervals
                    .iter()
                    .find(|rr| rr.r == qt.r)
                    .map(|rr| BeatValue::new(qt.r, bazett_qtc(qt.value, rr.value)))
            })
            .collect()
    }

    /// Time-domain variability of the RR series.
    pub fn rhythm(&self) -> HrvTime {
        let rr: Vec<f64> = values(&self.rr_intervals).collect();
        hrv_time(&rr)
    }
}

/// Plain values of a per-beat series.
pub fn values(series: &[BeatValue]) -> impl Iterator<Item = f64> + '_ {
    series.iter().map(|b| b.value)
}

/// `QTc = QT / sqrt(RR in seconds)`, both inputs in ms.
pub fn bazett_qtc(qt_ms: f64, rr_ms: f64) -> f64 {
    qt_ms / (rr_ms / 1000.0).sqrt()
}

/// Measure an annotated lead.
pub fn measure_waveform(lead: &Waveform, cfg: &MeasurementConfig) -> Result<MeasurementSet> {
    let fiducials = lead
        .fiducials()
        .ok_or_else(|| EcgError::NotAnnotated(lead.label().to_string()))?;
    let x = lead.points();
    let fs = lead.fs();
    let n = x.len();
    let st_offset = seconds_to_samples(cfg.st_offset_s, fs);
    let ms = |from: usize, to: usize| samples_to_ms(to - from, fs);

    let mut set = MeasurementSet::default();
    for beat in beats(fiducials, n) {
        let r = beat.r;
        if let Some(next) = beat.next_r {
            set.rr_intervals.push(BeatValue::new(r, ms(r, next)));
        }
        if let Some(p) = beat.p_onset {
            set.pr_intervals.push(BeatValue::new(r, ms(p, r)));
            let end = beat.q.unwrap_or(r);
            if let Some(peak) = x.get(p..end).and_then(window_max) {
                set.p_amplitudes.push(BeatValue::new(r, peak));
            }
        }
        let isoelectric = match (beat.p_onset, beat.q) {
            (Some(p), Some(q)) if q > p => {
                set.pr_segments.push(BeatValue::new(r, ms(p, q)));
                x[p..q].iter().sum::<f64>() / (q - p) as f64
            }
            _ => 0.0,
        };
        if let (Some(q), Some(s)) = (beat.q, beat.s) {
            set.qrs_durations.push(BeatValue::new(r, ms(q, s)));
        }
        if let (Some(q), Some(t)) = (beat.q, beat.t_end) {
            set.qt_intervals.push(BeatValue::new(r, ms(q, t)));
        }
        if let Some(s) = beat.s {
            let point = s + st_offset;
            if point < n && beat.t_end.map_or(true, |t| point <= t) {
                set.st_deviations.push(BeatValue::new(r, x[point] - isoelectric));
            }
        }
        let trough = [beat.q, beat.s]
            .into_iter()
            .flatten()
            .map(|i| x[i])
            .reduce(f64::min);
        set.qrs_amplitudes
            .push(BeatValue::new(r, x[r] - trough.unwrap_or(0.0)));
        if let Some(t) = beat.t_end {
            let start = beat.s.map_or(r + 1, |s| s + st_offset);
            if start <= t {
                if let Some(peak) = signed_extremum(&x[start..=t]) {
                    set.t_amplitudes.push(BeatValue::new(r, peak));
                }
            }
        }
    }
    Ok(set)
}

/// Net QRS deflection per beat: R height plus the deeper of Q/S when negative.
pub fn net_qrs_deflections(lead: &Waveform) -> Result<Vec<BeatValue>> {
    let fiducials = lead
        .fiducials()
        .ok_or_else(|| EcgError::NotAnnotated(lead.label().to_string()))?;
    let x = lead.points();
    Ok(beats(fiducials, x.len())
        .into_iter()
        .map(|beat| {
            let trough = [beat.q, beat.s]
                .into_iter()
                .flatten()
                .map(|i| x[i])
                .fold(0.0, f64::min);
            BeatValue::new(beat.r, x[beat.r] + trough)
        })
        .collect())
}

fn window_max(window: &[f64]) -> Option<f64> {
    window.iter().copied().reduce(f64::max)
}

fn signed_extremum(window: &[f64]) -> Option<f64> {
    window
        .iter()
        .copied()
        .reduce(|best, v| if v.abs() > best.abs() { v } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotated(points: Vec<f64>, fs: u32, marks: &[(FiducialKind, &[usize])]) -> Waveform {
        let n = points.len();
        let mut f = Fiducials::new();
        for (kind, idx) in marks {
            f.insert(*kind, idx.to_vec(), n).unwrap();
        }
        Waveform::new("II (treated)", points, fs)
            .unwrap()
            .with_fiducials(f)
            .unwrap()
    }

    #[test]
    fn beats_join_on_neighbouring_r_peaks() {
        let mut f = Fiducials::new();
        f.insert(FiducialKind::R, vec![100, 300], 500).unwrap();
        f.insert(FiducialKind::POnset, vec![40, 250], 500).unwrap();
        f.insert(FiducialKind::Q, vec![280], 500).unwrap();
        f.insert(FiducialKind::S, vec![110, 320], 500).unwrap();
        f.insert(FiducialKind::TEnd, vec![260], 500).unwrap();
        let b = beats(&f, 500);
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].p_onset, Some(40));
        assert_eq!(b[0].q, None);
        assert_eq!(b[0].s, Some(110));
        assert_eq!(b[0].t_end, Some(260));
        assert_eq!(b[1].p_onset, Some(250));
        assert_eq!(b[1].q, Some(280));
        assert_eq!(b[1].s, Some(320));
        assert_eq!(b[1].t_end, None);
        assert_eq!(b[1].next_r, None);
    }

    #[test]
    fn heart_rate_from_regular_rr() {
        let set = MeasurementSet {
            rr_intervals: vec![
                BeatValue::new(0, 800.0),
                BeatValue::new(400, 800.0),
                BeatValue::new(800, 800.0),
            ],
            ..MeasurementSet::default()
        };
        assert_eq!(set.heart_rate(), 75.0);
        assert_eq!(MeasurementSet::default().heart_rate(), 0.0);
    }

    #[test]
    fn bazett_at_one_second_is_identity() {
        assert_eq!(bazett_qtc(400.0, 1000.0), 400.0);
        let set = MeasurementSet {
            qt_intervals: vec![BeatValue::new(10, 400.0), BeatValue::new(600, 380.0)],
            rr_intervals: vec![BeatValue::new(10, 1000.0)],
            ..MeasurementSet::default()
        };
        assert_eq!(set.qtc_bazett(), vec![BeatValue::new(10, 400.0)]);
    }

    #[test]
    fn intervals_are_reported_in_ms() {
        // fs 1000: one sample per ms.
        let mut x = vec![0.0; 1200];
        x[100] = 0.15; // P peak
        x[200] = -0.1; // Q
        x[220] = 1.5; // R
        x[260] = -0.5; // S
        x[320] = 0.05; // ST point (S + 60)
        x[400] = 0.4; // T peak
        x[1000] = 1.5; // next R
        let lead = annotated(
            x,
            1000,
            &[
                (FiducialKind::R, &[220, 1000]),
                (FiducialKind::POnset, &[80]),
                (FiducialKind::Q, &[200]),
                (FiducialKind::S, &[260]),
                (FiducialKind::TEnd, &[500]),
            ],
        );
        let set = measure_waveform(&lead, &MeasurementConfig::default()).unwrap();
        assert_eq!(set.pr_intervals, vec![BeatValue::new(220, 140.0)]);
        assert_eq!(set.pr_segments, vec![BeatValue::new(220, 120.0)]);
        assert_eq!(set.qrs_durations, vec![BeatValue::new(220, 60.0)]);
        assert_eq!(set.qt_intervals, vec![BeatValue::new(220, 300.0)]);
        assert_eq!(set.rr_intervals, vec![BeatValue::new(220, 780.0)]);
        assert_eq!(set.p_amplitudes, vec![BeatValue::new(220, 0.15)]);
        assert_eq!(set.t_amplitudes, vec![BeatValue::new(220, 0.4)]);
        // isoelectric level: mean of [80, 200) = 0.15 / 120
        let st = set.st_deviations[0];
        assert_eq!(st.r, 220);
        assert!((st.value - (0.05 - 0.15 / 120.0)).abs() < 1e-12);
        // R at 1000 has no Q/S: amplitude is the raw R height.
        assert_eq!(
            set.qrs_amplitudes,
            vec![BeatValue::new(220, 2.0), BeatValue::new(1000, 1.5)]
        );
    }

    #[test]
    fn missing_fiducials_drop_only_their_measurements() {
        let lead = annotated(
            vec![0.0; 100],
            100,
            &[(FiducialKind::R, &[0, 50]), (FiducialKind::S, &[2])],
        );
        let set = measure_waveform(&lead, &MeasurementConfig::default()).unwrap();
        assert_eq!(set.rr_intervals.len(), 1);
        assert!(set.pr_intervals.is_empty());
        assert!(set.qrs_durations.is_empty());
        assert!(set.qt_intervals.is_empty());
        assert_eq!(set.qrs_amplitudes.len(), 2);
    }

    #[test]
    fn unannotated_lead_is_rejected() {
        let lead = Waveform::new("I", vec![0.0; 10], 100).unwrap();
        assert!(matches!(
            measure_waveform(&lead, &MeasurementConfig::default()),
            Err(EcgError::NotAnnotated(_))
        ));
    }

    #[test]
    fn net_deflection_adds_negative_trough() {
        let mut x = vec![0.0; 20];
        x[5] = -0.2;
        x[8] = 1.0;
        x[11] = -0.5;
        let lead = annotated(
            x,
            100,
            &[
                (FiducialKind::R, &[8]),
                (FiducialKind::Q, &[5]),
                (FiducialKind::S, &[11]),
            ],
        );
        assert_eq!(net_qrs_deflections(&lead).unwrap(), vec![BeatValue::new(8, 0.5)]);
    }
}
