use thiserror::Error;

/// Validation failures raised by the ECG pipeline.
///
/// Boundary truncation during detection is never reported here; a missing
/// fiducial is simply absent from the output.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EcgError {
    #[error("waveform label must not be empty")]
    EmptyLabel,
    #[error("waveform `{label}` has no samples")]
    EmptySignal { label: String },
    #[error("waveform `{label}` has invalid sampling rate {rate} Hz")]
    InvalidSamplingRate { label: String, rate: u32 },
    #[error("cannot merge an empty set of waveforms")]
    EmptyMerge,
    #[error(
        "cannot merge `{label}` ({rate} Hz, {len} samples) with leads at {expected_rate} Hz, {expected_len} samples"
    )]
    MergeMismatch {
        label: String,
        rate: u32,
        len: usize,
        expected_rate: u32,
        expected_len: usize,
    },
    #[error("waveform `{label}` has {len} samples, shorter than the {window}-sample smoothing window")]
    SignalTooShort {
        label: String,
        len: usize,
        window: usize,
    },
    #[error("{kind} index {index} is outside waveform of {len} samples")]
    FiducialOutOfBounds {
        kind: &'static str,
        index: usize,
        len: usize,
    },
    #[error("waveform `{0}` has no fiducials; run detection first")]
    NotAnnotated(String),
    #[error("study has no lead labelled `{0}`")]
    UnknownLead(String),
    #[error("study must contain at least one waveform")]
    EmptyStudy,
    #[error("FFT failed: {0}")]
    Fft(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, EcgError>;
