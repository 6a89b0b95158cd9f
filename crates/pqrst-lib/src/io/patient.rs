use anyhow::{Context, Result};
use std::path::Path;

use crate::study::PatientRecord;

pub fn parse_patient(text: &str) -> Result<PatientRecord> {
    serde_json::from_str(text).context("parsing patient record")
}

/// Load a patient record from a JSON file.
pub fn read_patient(path: &Path) -> Result<PatientRecord> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_patient(&text).with_context(|| format!("in {}", path.display()))
}
