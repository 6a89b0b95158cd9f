//! A patient's recording: metadata, raw leads and their derived versions.

use crate::{
    config::PipelineConfig,
    conditioning::condition_all,
    detectors::ecg::annotate_waveform,
    diagnostics::{evaluate, DiagnosticFlags},
    error::{EcgError, Result},
    metrics::{
        axis::study_qrs_axis,
        hrv::HrvTime,
        measurements::{measure_waveform, MeasurementSet},
    },
    signal::{Events, Waveform},
};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// A single text or a list of texts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextList {
    One(String),
    Many(Vec<String>),
}

/// Sex as recorded: either a coded integer or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sex {
    Code(i64),
    Text(String),
}

/// Patient metadata. Only `age` feeds the analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientRecord {
    pub patient_id: Option<String>,
    pub age: Option<u32>,
    pub date_of_birth: Option<String>,
    #[serde(alias = "gender")]
    pub sex: Option<Sex>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub date: Option<String>,
    pub location: Option<String>,
    pub diagnosis: Option<TextList>,
    pub original_diagnosis: Option<TextList>,
}

/// Analysis output for one lead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyReport {
    pub lead: String,
    pub heart_rate_bpm: f64,
    pub measurements: MeasurementSet,
    pub rhythm: HrvTime,
    pub flags: DiagnosticFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EcgStudy {
    patient: PatientRecord,
    raw: Vec<Waveform>,
    conditioned: Vec<Waveform>,
}

impl EcgStudy {
    pub fn new(patient: PatientRecord, raw: Vec<Waveform>) -> Result<Self> {
        if raw.is_empty() {
            return Err(EcgError::EmptyStudy);
        }
        Ok(Self {
            patient,
            raw,
            conditioned: Vec::new(),
        })
    }

    pub fn patient(&self) -> &PatientRecord {
        &self.patient
    }

    pub fn raw(&self) -> &[Waveform] {
        &self.raw
    }

    pub fn conditioned(&self) -> &[Waveform] {
        &self.conditioned
    }

    /// Condition every raw lead, replacing any previous conditioned set.
    pub fn condition(&mut self, cfg: &PipelineConfig, merge: bool) -> Result<()> {
        self.conditioned = condition_all(&self.raw, &cfg.conditioning, merge)?;
        info!(
            "conditioned {} lead(s){}",
            self.raw.len(),
            if merge { " with merged composite" } else { "" }
        );
        Ok(())
    }

    /// Annotate every conditioned lead. External R peaks, when given, replace
    /// the configured detector for all leads.
    pub fn detect(&mut self, external: Option<&Events>, cfg: &PipelineConfig) -> Result<()> {
        if self.conditioned.is_empty() {
            self.condition(cfg, false)?;
        }
        self.conditioned = self
            .conditioned
            .iter()
            .map(|lead| annotate_waveform(lead, external, &cfg.detection))
            .collect::<Result<Vec<_>>>()?;
        debug!("annotated {} conditioned lead(s)", self.conditioned.len());
        Ok(())
    }

    /// Conditioned lead by full or base label, case-insensitive.
    pub fn lead(&self, label: &str) -> Result<&Waveform> {
        let label = label.trim();
        self.conditioned
            .iter()
            .find(|w| w.label().eq_ignore_ascii_case(label))
            .or_else(|| {
                self.conditioned
                    .iter()
                    .find(|w| w.base_label().eq_ignore_ascii_case(label))
            })
            .ok_or_else(|| EcgError::UnknownLead(label.to_string()))
    }

    /// Raw lead behind a conditioned label, e.g. `"II"` for `"II (treated)"`.
    /// `None` for the merged composite, which has no raw counterpart.
    pub fn raw_lead(&self, label: &str) -> Option<&Waveform> {
        let base = self.lead(label).ok()?.base_label();
        self.raw
            .iter()
            .find(|w| w.base_label().eq_ignore_ascii_case(base))
    }

    /// Measurements of one annotated lead, with the study-wide QRS axis.
    pub fn measure(&self, label: &str, cfg: &PipelineConfig) -> Result<MeasurementSet> {
        let mut set = measure_waveform(self.lead(label)?, &cfg.measurement)?;
        set.qrs_axis = study_qrs_axis(&self.conditioned);
        Ok(set)
    }

    pub fn diagnose(&self, label: &str, cfg: &PipelineConfig) -> Result<DiagnosticFlags> {
        let set = self.measure(label, cfg)?;
        Ok(evaluate(&set, &cfg.thresholds, self.patient.age))
    }

    pub fn report(&self, label: &str, cfg: &PipelineConfig) -> Result<StudyReport> {
        let lead = self.lead(label)?;
        let measurements = self.measure(label, cfg)?;
        let flags = evaluate(&measurements, &cfg.thresholds, self.patient.age);
        Ok(StudyReport {
            lead: lead.label().to_string(),
            heart_rate_bpm: measurements.heart_rate(),
            rhythm: measurements.rhythm(),
            measurements,
            flags,
        })
    }
}

/// Condition, detect and report on one lead in a single call.
pub fn run_pipeline(
    study: &mut EcgStudy,
    lead: &str,
    external: Option<&Events>,
    cfg: &PipelineConfig,
    merge: bool,
) -> Result<StudyReport> {
    cfg.validate()?;
    study.condition(cfg, merge)?;
    study.detect(external, cfg)?;
    study.report(lead, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::MERGED_LABEL;
    use std::f64::consts::PI;

    /// Two seconds of Gaussian "beats" every 0.8 s at 500 Hz.
    fn synthetic_lead(label: &str, gain: f64) -> Waveform {
        let fs = 500.0;
        let points = (0..2000)
            .map(|i| {
                let t = i as f64 / fs;
                let mut v = 0.0;
                for k in 0..5 {
                    let bt = 0.4 + 0.8 * k as f64;
                    v += 1.2 * (-0.5 * ((t - bt) / 0.012).powi(2)).exp();
                    v += 0.25 * (-0.5 * ((t - bt - 0.3) / 0.04).powi(2)).exp();
                }
                gain * (v + 0.02 * (2.0 * PI * 0.1 * t).sin())
            })
            .collect();
        Waveform::new(label, points, 500).unwrap()
    }

    fn study() -> EcgStudy {
        EcgStudy::new(
            PatientRecord {
                age: Some(40),
                ..PatientRecord::default()
            },
            vec![synthetic_lead("II", 1.0), synthetic_lead("III", 0.6)],
        )
        .unwrap()
    }

    #[test]
    fn studies_can_move_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EcgStudy>();
        assert_send_sync::<StudyReport>();
        assert_send_sync::<PipelineConfig>();
    }

    #[test]
    fn empty_study_is_rejected() {
        assert_eq!(
            EcgStudy::new(PatientRecord::default(), Vec::new()),
            Err(EcgError::EmptyStudy)
        );
    }

    #[test]
    fn conditioning_replaces_previous_run() {
        let mut s = study();
        let cfg = PipelineConfig::default();
        s.condition(&cfg, true).unwrap();
        assert_eq!(s.conditioned().len(), 3);
        s.condition(&cfg, false).unwrap();
        let labels: Vec<_> = s.conditioned().iter().map(|w| w.label()).collect();
        assert_eq!(labels, ["II (treated)", "III (treated)"]);
        assert_eq!(s.raw()[0].label(), "II");
    }

    #[test]
    fn lead_lookup_by_base_label() {
        let mut s = study();
        s.condition(&PipelineConfig::default(), true).unwrap();
        assert_eq!(s.lead("ii").unwrap().label(), "II (treated)");
        assert_eq!(s.lead(MERGED_LABEL).unwrap().label(), MERGED_LABEL);
        assert!(matches!(s.lead("V6"), Err(EcgError::UnknownLead(_))));
    }

    #[test]
    fn raw_lead_follows_conditioned_label() {
        let mut s = study();
        s.condition(&PipelineConfig::default(), true).unwrap();
        assert_eq!(s.raw_lead("II (treated)").map(Waveform::label), Some("II"));
        assert_eq!(s.raw_lead("iii").map(Waveform::label), Some("III"));
        assert!(s.raw_lead(MERGED_LABEL).is_none());
        assert!(s.raw_lead("V6").is_none());
    }

    #[test]
    fn measuring_before_detection_fails() {
        let mut s = study();
        s.condition(&PipelineConfig::default(), false).unwrap();
        assert!(matches!(
            s.measure("II", &PipelineConfig::default()),
            Err(EcgError::NotAnnotated(_))
        ));
    }

    #[test]
    fn pipeline_with_external_peaks() {
        let mut s = study();
        let peaks = Events::from_indices(vec![200, 600, 1000, 1400, 1800]);
        let report =
            run_pipeline(&mut s, "II", Some(&peaks), &PipelineConfig::default(), false).unwrap();
        assert_eq!(report.lead, "II (treated)");
        assert_eq!(report.measurements.rr_intervals.len(), 4);
        assert!((report.heart_rate_bpm - 75.0).abs() < 1e-9);
        assert_eq!(report.rhythm.n, 4);
        assert!(!report.flags.get(crate::diagnostics::DiagnosticFlag::Tachycardia));
        assert!(report.measurements.qrs_axis.is_some());
    }

    #[test]
    fn patient_record_accepts_mixed_shapes() {
        let p: PatientRecord = serde_json::from_str(
            r#"{"patient_id": "abc", "age": 52, "gender": 1,
                "diagnosis": ["sinus rhythm", "normal ecg"],
                "original_diagnosis": "SR"}"#,
        )
        .unwrap();
        assert_eq!(p.age, Some(52));
        assert_eq!(p.sex, Some(Sex::Code(1)));
        assert_eq!(
            p.diagnosis,
            Some(TextList::Many(vec!["sinus rhythm".into(), "normal ecg".into()]))
        );
        assert_eq!(p.original_diagnosis, Some(TextList::One("SR".into())));
        assert_eq!(p.height_cm, None);
    }
}
