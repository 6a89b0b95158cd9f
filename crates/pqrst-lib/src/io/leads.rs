use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use std::{io::Read, path::Path};

use crate::signal::Waveform;

/// Read a lead table: a header row naming the leads, then one sample per lead
/// on every row. Columns with a blank header are skipped.
pub fn read_lead_table(path: &Path, sampling_rate: u32) -> Result<Vec<Waveform>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_lead_table(file, sampling_rate).with_context(|| format!("reading {}", path.display()))
}

pub fn parse_lead_table<R: Read>(input: R, sampling_rate: u32) -> Result<Vec<Waveform>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    let headers = reader.headers().context("reading header row")?.clone();
    let columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.trim().is_empty())
        .map(|(i, h)| (i, h.trim().to_string()))
        .collect();
    if columns.is_empty() {
        anyhow::bail!("header row names no leads");
    }

    let mut samples: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
    for (row, record) in reader.records().enumerate() {
        // Header is line 1.
        let line = row + 2;
        let record = record.with_context(|| format!("reading row {line}"))?;
        for ((col, label), out) in columns.iter().zip(samples.iter_mut()) {
            let cell = record
                .get(*col)
                .ok_or_else(|| anyhow!("row {line}: missing column `{label}`"))?;
            let value: f64 = cell
                .parse()
                .with_context(|| format!("row {line}, column `{label}`: not a number: {cell:?}"))?;
            out.push(value);
        }
    }

    columns
        .into_iter()
        .zip(samples)
        .map(|((_, label), points)| Waveform::new(&label, points, sampling_rate).map_err(Into::into))
        .collect()
}
