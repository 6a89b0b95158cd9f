pub mod conditioning;
pub mod config;
pub mod detectors;
pub mod diagnostics;
pub mod error;
pub mod io;
pub mod metrics;
pub mod plot;
pub mod signal;
pub mod study;

pub use config::PipelineConfig;
pub use error::{EcgError, Result};
pub use metrics::*;
pub use signal::*;
pub use study::{EcgStudy, PatientRecord, StudyReport};
