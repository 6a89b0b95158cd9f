//! Frontal-plane QRS axis from limb-lead net deflections.

use crate::{
    error::Result,
    metrics::measurements::{net_qrs_deflections, values},
    signal::Waveform,
};
use log::debug;

/// Axis in degrees from the net QRS deflections of leads I and aVF.
pub fn qrs_axis_degrees(lead_i: f64, lead_avf: f64) -> f64 {
    lead_avf.atan2(lead_i).to_degrees()
}

/// Mean net QRS deflection of an annotated lead; `None` without beats.
pub fn mean_net_deflection(lead: &Waveform) -> Result<Option<f64>> {
    let net = net_qrs_deflections(lead)?;
    if net.is_empty() {
        return Ok(None);
    }
    Ok(Some(values(&net).sum::<f64>() / net.len() as f64))
}

/// QRS axis of a study from its annotated limb leads.
///
/// Leads are matched on their base label, case-insensitively. Missing I is
/// derived as `II - III` and missing aVF as `(II + III) / 2`. Leads without
/// fiducials are ignored. Returns `None` when either input cannot be found.
pub fn study_qrs_axis(leads: &[Waveform]) -> Option<f64> {
    let net = |name: &str| -> Option<f64> {
        leads
            .iter()
            .filter(|w| w.base_label().eq_ignore_ascii_case(name))
            .find_map(|w| mean_net_deflection(w).ok().flatten())
    };
    let (ii, iii) = (net("II"), net("III"));
    let lead_i = net("I").or_else(|| Some(ii? - iii?));
    let lead_avf = net("aVF").or_else(|| Some((ii? + iii?) / 2.0));
    match (lead_i, lead_avf) {
        (Some(i), Some(avf)) => Some(qrs_axis_degrees(i, avf)),
        _ => {
            debug!("limb leads I/aVF not derivable; QRS axis left undefined");
            None
        }
    }
}
