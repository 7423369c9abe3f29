//! Job-level configuration and the top-level `submit` entry point.

pub mod config;

use crate::error::Result;
use crate::orchestrator::{Collaborators, JobOutcome, Orchestrator};
use std::path::Path;
use std::time::Duration;

/// Progress event pushed to the caller's callback. Percentages follow the
/// bucket contract: 0-10 rasterization, 10-30 layout, 30-60 local OCR,
/// 60-90 remote OCR/reconciliation, 90-100 cropping and packaging.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub job_id: String,
    pub percentage: u8,
    pub stage_label: &'static str,
}

pub type ProgressCallback = dyn Fn(ProgressEvent) + Send + Sync;

/// Run one extraction job end to end: rasterize, lay out, run the two-stage
/// OCR orchestrator per column, crop, and (if a packager is supplied)
/// assemble a ZIP. Returns the job's final outcome; output is written under
/// `output_root` and only published there once the job reaches a terminal
/// `COMPLETE_*` state.
pub async fn submit(
    pdf_path: &Path,
    output_root: &Path,
    config: crate::types::JobConfig,
    collaborators: Collaborators<'_>,
    deadline: Option<Duration>,
    progress: Option<&ProgressCallback>,
) -> Result<JobOutcome> {
    let job_id = uuid::Uuid::new_v4().to_string();
    let orchestrator = Orchestrator::new(job_id, config);
    orchestrator.run(pdf_path, output_root, collaborators, deadline, progress).await
}
