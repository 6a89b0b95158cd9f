use serde::{Deserialize, Serialize};

/// Successive-difference threshold for pNN50 (ms).
const NN50_MS: f64 = 50.0;

/// Time-domain variability of an RR series, all durations in ms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrvTime {
    pub n: usize,
    pub mean_rr_ms: f64,
    pub sdnn_ms: f64,
    pub rmssd_ms: f64,
    pub pnn50: f64,
}

pub fn hrv_time(rr_ms: &[f64]) -> HrvTime {
    let n = rr_ms.len();
    let mean_rr_ms = if n > 0 {
        rr_ms.iter().sum::<f64>() / n as f64
    } else {
        0.0
    };
    if n < 2 {
        return HrvTime {
            n,
            mean_rr_ms,
            sdnn_ms: 0.0,
            rmssd_ms: 0.0,
            pnn50: 0.0,
        };
    }
    let dof = n as f64 - 1.0;
    let sdnn_ms = (rr_ms.iter().map(|x| (x - mean_rr_ms).powi(2)).sum::<f64>() / dof).sqrt();
    let diffs: Vec<f64> = rr_ms.windows(2).map(|w| w[1] - w[0]).collect();
    let rmssd_ms = (diffs.iter().map(|d| d * d).sum::<f64>() / dof).sqrt();
    let pnn50 = diffs.iter().filter(|d| d.abs() > NN50_MS).count() as f64 / dof;
    HrvTime {
        n,
        mean_rr_ms,
        sdnn_ms,
        rmssd_ms,
        pnn50,
    }
}
