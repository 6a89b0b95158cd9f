use anyhow::{Context, Result};
use std::{path::Path, str::FromStr};

use crate::signal::{Events, Waveform};

/// Parse one value per line, skipping blank and `#` comment lines.
fn parse_lines<T: FromStr>(text: &str, what: &str) -> Result<Vec<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val = trimmed
            .parse()
            .with_context(|| format!("line {} is not {what}: {trimmed}", idx + 1))?;
        out.push(val);
    }
    Ok(out)
}

/// Parse a newline-delimited series of samples.
pub fn parse_samples(text: &str) -> Result<Vec<f64>> {
    let out = parse_lines(text, "a number")?;
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

/// Read a single lead stored as newline-delimited samples. The label is the
/// file stem.
pub fn read_single_lead(path: &Path, sampling_rate: u32) -> Result<Waveform> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let points = parse_samples(&text).with_context(|| format!("in {}", path.display()))?;
    let label = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("lead");
    Ok(Waveform::new(label, points, sampling_rate)?)
}

/// Parse newline-delimited sample indices, e.g. externally detected R peaks.
/// An empty list is valid.
pub fn parse_event_indices(text: &str) -> Result<Events> {
    Ok(Events::from_indices(parse_lines(text, "an integer index")?))
}

pub fn read_event_indices(path: &Path) -> Result<Events> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_event_indices(&text).with_context(|| format!("in {}", path.display()))
}
