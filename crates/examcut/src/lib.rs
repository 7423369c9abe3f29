//! Extracts individual exam problems from multi-column test-paper page
//! images as cropped boundaries, driven by a two-stage local/remote OCR
//! orchestrator with coordinate-space reconciliation.

pub mod boundary;
pub mod core;
pub mod crop;
pub mod error;
pub mod layout;
pub mod markers;
pub mod ocr;
pub mod orchestrator;
pub mod package;
pub mod raster;
pub mod types;
pub mod validator;

pub use core::{submit, ProgressCallback, ProgressEvent};
pub use error::{ExamCutError, OcrFailure, Result};
pub use orchestrator::{Collaborators, JobOutcome, Orchestrator};
pub use types::{
    Boundary, ColumnOcrResult, ColumnStrip, Diagnosis, DiagnosisStatus, EngineTag, JobConfig, JobStatus, PageImage,
    Point, ProblemMarker, Rect, RemoteCredentials, Strategy, TextBlock,
};
