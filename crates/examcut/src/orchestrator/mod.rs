//! The two-stage orchestrator: drives one job from "PDF + config" to
//! "boundaries per column + rendered problem images", with a local-OCR pass
//! validated against the expected problem-number sequence and a remote-OCR
//! fallback for any gaps.
//!
//! Structured as a linear sequence of `await`ed stages with
//! `#[tracing::instrument]` and explicit `?` propagation, generalized into a
//! per-column branching state machine with an explicit "remote already
//! used" bit that makes a `VALIDATED_FINAL -> any OCR state` edge
//! structurally absent.

mod reconcile;

use crate::boundary;
use crate::core::{ProgressCallback, ProgressEvent};
use crate::crop::{ImageCropper, OutputFormat};
use crate::error::{ExamCutError, OcrFailure, Result};
use crate::layout::LayoutAnalyzer;
use crate::markers::{self, MarkerParser};
use crate::ocr::{LanguageHint, OcrEngine, DEFAULT_LANGUAGE_HINTS};
use crate::package::{Manifest, ManifestColumn, ManifestError, ManifestPage, ManifestProblem, ZipPackager};
use crate::raster::PageRasterizer;
use crate::types::{Boundary, ColumnStrip, EngineTag, JobConfig, JobStatus, ProblemMarker};
use crate::validator;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub use reconcile::reconcile_remote_markers;

/// Per-call budget for a single local-OCR invocation, independent of the
/// overall job deadline.
const LOCAL_OCR_TIMEOUT: Duration = Duration::from_secs(60);
/// Per-call budget for a single remote-OCR invocation.
const REMOTE_OCR_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-column processing state. Not
/// every state is materialized as a struct field; this enum exists mainly
/// so tests and logs can assert which state a column reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnState {
    LocalOcrDone,
    ValidatedStage1,
    StageOneGaps,
    RemoteOcrDone,
    Reconciled,
    ValidatedFinal,
    CompleteOk,
    CompletePartial,
    Failed,
}

struct ColumnResult {
    boundaries: Vec<Boundary>,
    missing: Vec<u32>,
    state: ColumnState,
}

/// External collaborators the orchestrator needs but does not own the
/// concrete implementation of. Bundled into one struct so `run`'s signature
/// stays manageable as the collaborator count grows.
pub struct Collaborators<'a> {
    pub rasterizer: &'a dyn PageRasterizer,
    pub local_engine: &'a dyn OcrEngine,
    pub remote_engine: Option<&'a dyn OcrEngine>,
    pub cropper: &'a dyn ImageCropper,
    pub packager: Option<&'a dyn ZipPackager>,
}

/// Outcome of one completed (or failed) job.
pub struct JobOutcome {
    pub job_id: String,
    pub status: JobStatus,
    pub output_dir: PathBuf,
    pub zip_path: Option<PathBuf>,
    pub manifest: Manifest,
}

pub struct Orchestrator {
    job_id: String,
    config: JobConfig,
}

impl Orchestrator {
    pub fn new(job_id: String, config: JobConfig) -> Self {
        Self { job_id, config }
    }

    fn emit(&self, progress: Option<&ProgressCallback>, percentage: u8, stage_label: &'static str) {
        if let Some(cb) = progress {
            cb(ProgressEvent { job_id: self.job_id.clone(), percentage, stage_label });
        }
    }

    /// Run the job to completion. Writes go to a scratch directory under
    /// `output_root` and are only exposed at `output_root` itself once a
    /// `COMPLETE_*` state is reached (atomic rename), so a `FAILED` job
    /// leaves no partial output in the published location.
    #[tracing::instrument(skip(self, collaborators, progress), fields(job_id = %self.job_id))]
    pub async fn run(
        &self,
        pdf_path: &Path,
        output_root: &Path,
        collaborators: Collaborators<'_>,
        deadline: Option<Duration>,
        progress: Option<&ProgressCallback>,
    ) -> Result<JobOutcome> {
        let started = Instant::now();
        let scratch_dir = output_root.with_extension("scratch");
        std::fs::create_dir_all(&scratch_dir).map_err(|e| ExamCutError::Io { path: scratch_dir.clone(), source: e })?;

        let result = self.run_inner(pdf_path, &scratch_dir, &collaborators, deadline, started, progress).await;

        match result {
            Ok(outcome) => {
                publish(&scratch_dir, output_root)?;
                Ok(JobOutcome { output_dir: output_root.to_path_buf(), ..outcome })
            }
            Err(err) => {
                let _ = std::fs::remove_dir_all(&scratch_dir);
                Err(err)
            }
        }
    }

    async fn run_inner(
        &self,
        pdf_path: &Path,
        scratch_dir: &Path,
        collaborators: &Collaborators<'_>,
        deadline: Option<Duration>,
        started: Instant,
        progress: Option<&ProgressCallback>,
    ) -> Result<JobOutcome> {
        check_deadline(started, deadline)?;
        self.emit(progress, 0, "rasterization");
        let pages = collaborators.rasterizer.rasterize(pdf_path, self.config.dpi)?;
        if pages.is_empty() {
            return Err(ExamCutError::InvalidInput { message: "PDF produced zero pages".into() });
        }
        self.emit(progress, 10, "rasterization");

        check_deadline(started, deadline)?;
        self.emit(progress, 10, "layout");
        let layout = LayoutAnalyzer::new();
        let mut page_strips: Vec<(u32, Vec<ColumnStrip>)> = Vec::with_capacity(pages.len());
        for page in &pages {
            page_strips.push((page.page_index, layout.analyze(page)));
        }
        self.emit(progress, 30, "layout");

        let mut manifest_pages = Vec::with_capacity(page_strips.len());
        let mut errors = Vec::new();
        let mut any_partial = false;

        let total_columns: usize = page_strips.iter().map(|(_, s)| s.len()).sum();
        let mut columns_done = 0usize;

        for (page_index, strips) in &page_strips {
            let mut manifest_columns = Vec::with_capacity(strips.len());
            for strip in strips {
                check_deadline(started, deadline)?;
                let result = self.process_column(strip, collaborators, started, deadline).await?;
                if result.state == ColumnState::CompletePartial {
                    any_partial = true;
                }

                let mut problems = Vec::with_capacity(result.boundaries.len());
                for boundary in &result.boundaries {
                    let file_name = format!("page{page_index}_col_{}_prob_{:02}.png", strip.column_index, boundary.problem_number);
                    let cropped = collaborators.cropper.crop(&strip.image, boundary.rect)?;
                    let encoded = collaborators.cropper.encode(&cropped, OutputFormat::Png)?;
                    let page_dir = scratch_dir.join(format!("page_{page_index}")).join("problems");
                    std::fs::create_dir_all(&page_dir).map_err(|e| ExamCutError::Io { path: page_dir.clone(), source: e })?;
                    let file_path = page_dir.join(&file_name);
                    std::fs::write(&file_path, &encoded).map_err(|e| ExamCutError::Io { path: file_path.clone(), source: e })?;
                    problems.push(ManifestProblem {
                        number: boundary.problem_number,
                        file: format!("page_{page_index}/problems/{file_name}"),
                        source: boundary.source_engine.to_string(),
                    });
                }

                manifest_columns.push(ManifestColumn { column: strip.column_index, problems, missing: result.missing });

                columns_done += 1;
                let pct = 90 + (columns_done * 10 / total_columns.max(1)) as u8;
                self.emit(progress, pct.min(100), "cropping and ZIP assembly");
            }
            manifest_pages.push(ManifestPage { page: *page_index, columns: manifest_columns });
        }

        check_deadline(started, deadline)?;

        let status = if any_partial { JobStatus::Partial } else { JobStatus::Ok };
        if any_partial {
            errors.push(ManifestError { kind: "validation_partial".into(), message: "one or more columns have missing problem numbers".into() });
        }

        let manifest = Manifest { job_id: self.job_id.clone(), pages: manifest_pages, status, errors };
        manifest.write_to_dir(scratch_dir)?;

        let zip_path = if let Some(packager) = collaborators.packager {
            let archive = scratch_dir.with_file_name(format!("{}.zip", self.job_id));
            Some(packager.package(scratch_dir, &archive)?)
        } else {
            None
        };

        self.emit(progress, 100, "cropping and ZIP assembly");

        Ok(JobOutcome { job_id: self.job_id.clone(), status, output_dir: scratch_dir.to_path_buf(), zip_path, manifest })
    }

    /// Drive one column through local OCR, validation, and (if needed) the
    /// remote-OCR fallback and reconciliation.
    async fn process_column(
        &self,
        strip: &ColumnStrip,
        collaborators: &Collaborators<'_>,
        started: Instant,
        deadline: Option<Duration>,
    ) -> Result<ColumnResult> {
        let parser = MarkerParser::new();

        let (local_markers, _state) = self.run_local_stage(strip, collaborators, &parser, None, started, deadline).await?;
        let detected: Vec<u32> = local_markers.iter().map(|m| m.number).collect();
        let expected = validator::infer_expected_set(&detected, &self.config);
        let diagnosis = validator::validate(&detected, &expected);

        if diagnosis.missing.is_empty() && diagnosis.duplicates.is_empty() {
            let boundaries = boundary::solve(&local_markers, strip.width, strip.height);
            return Ok(ColumnResult { boundaries, missing: Vec::new(), state: ColumnState::CompleteOk });
        }

        if diagnosis.missing.is_empty() {
            // Duplicates/out-of-order only: does not by itself trigger remote OCR.
            let boundaries = boundary::solve(&local_markers, strip.width, strip.height);
            return Ok(ColumnResult { boundaries, missing: Vec::new(), state: ColumnState::CompleteOk });
        }

        // One optional relaxed local retry before escalating to remote OCR.
        // Runs regardless of remote availability: a stricter-than-needed
        // confidence gate is worth relaxing even for a local-only job.
        let (local_markers, diagnosis) = if self.config.max_retries > 0 {
            let relaxed_config = relax(&self.config);
            let (retried_markers, _) =
                self.run_local_stage(strip, collaborators, &parser, Some(&relaxed_config), started, deadline).await?;
            let retried_detected: Vec<u32> = retried_markers.iter().map(|m| m.number).collect();
            let retried_expected = validator::infer_expected_set(&retried_detected, &self.config);
            let retried_diagnosis = validator::validate(&retried_detected, &retried_expected);
            if retried_diagnosis.missing.len() < diagnosis.missing.len() {
                (retried_markers, retried_diagnosis)
            } else {
                (local_markers, diagnosis)
            }
        } else {
            (local_markers, diagnosis)
        };

        if diagnosis.missing.is_empty() {
            let boundaries = boundary::solve(&local_markers, strip.width, strip.height);
            return Ok(ColumnResult { boundaries, missing: Vec::new(), state: ColumnState::CompleteOk });
        }

        if !self.config.strategy.allows_remote() || self.config.remote_credentials.is_none() || collaborators.remote_engine.is_none() {
            let boundaries = boundary::solve(&local_markers, strip.width, strip.height);
            return Ok(ColumnResult { boundaries, missing: diagnosis.missing, state: ColumnState::CompletePartial });
        }

        let remote_engine = collaborators.remote_engine.expect("checked above");
        let remote_response = self
            .run_with_retries(
                remote_engine,
                &strip.image,
                DEFAULT_LANGUAGE_HINTS,
                self.config.dpi,
                REMOTE_OCR_TIMEOUT,
                started,
                deadline,
            )
            .await;

        let remote_response = match remote_response {
            Ok(r) => r,
            Err(OcrFailure::Unavailable(_)) => {
                let boundaries = boundary::solve(&local_markers, strip.width, strip.height);
                return Ok(ColumnResult { boundaries, missing: diagnosis.missing, state: ColumnState::CompletePartial });
            }
            Err(e) => return Err(to_job_error(e, EngineTag::Remote)),
        };

        let reconciled = reconcile_remote_markers(
            &remote_response,
            &parser,
            &self.config,
            strip.width,
            strip.height,
            &diagnosis.missing,
        )?;

        let merged = markers::merge(local_markers, reconciled);
        let merged_detected: Vec<u32> = merged.iter().map(|m| m.number).collect();
        let final_expected = validator::infer_expected_set(&merged_detected, &self.config);
        let final_diagnosis = validator::validate(&merged_detected, &final_expected);

        let boundaries = boundary::solve(&merged, strip.width, strip.height);
        let state = if final_diagnosis.missing.is_empty() { ColumnState::CompleteOk } else { ColumnState::CompletePartial };

        Ok(ColumnResult { boundaries, missing: final_diagnosis.missing, state })
    }

    async fn run_local_stage(
        &self,
        strip: &ColumnStrip,
        collaborators: &Collaborators<'_>,
        parser: &MarkerParser,
        override_config: Option<&JobConfig>,
        started: Instant,
        deadline: Option<Duration>,
    ) -> Result<(Vec<ProblemMarker>, ColumnState)> {
        let config = override_config.unwrap_or(&self.config);
        let response = self
            .run_with_retries(
                collaborators.local_engine,
                &strip.image,
                DEFAULT_LANGUAGE_HINTS,
                config.dpi,
                LOCAL_OCR_TIMEOUT,
                started,
                deadline,
            )
            .await
            .map_err(|e| to_job_error(e, EngineTag::Local))?;
        let markers = parser.parse(&response.blocks, config, config.dpi);
        Ok((markers, ColumnState::LocalOcrDone))
    }

    /// Retry an engine call on `transient` failures up to `max_retries` times
    /// with exponential backoff; never retry `permanent` failures. Each
    /// attempt is bounded both by `per_call_timeout` and by whatever remains
    /// of the job's own `deadline`, whichever is tighter. A timeout that
    /// lands because the job deadline itself has passed is reported as
    /// `DeadlineExceeded`, not `Transient`, so it isn't retried.
    async fn run_with_retries(
        &self,
        engine: &dyn OcrEngine,
        image: &image::DynamicImage,
        hints: &[LanguageHint],
        dpi: u32,
        per_call_timeout: Duration,
        started: Instant,
        deadline: Option<Duration>,
    ) -> std::result::Result<crate::ocr::OcrResponse, OcrFailure> {
        let mut attempt = 0u32;
        loop {
            if let Some(deadline) = deadline {
                if started.elapsed() > deadline {
                    return Err(OcrFailure::DeadlineExceeded { elapsed_ms: started.elapsed().as_millis() });
                }
            }

            let budget = match deadline {
                Some(deadline) => per_call_timeout.min(deadline.saturating_sub(started.elapsed())),
                None => per_call_timeout,
            };

            match tokio::time::timeout(budget, engine.run(image, hints, dpi)).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(OcrFailure::Transient(msg))) if attempt < self.config.max_retries => {
                    let backoff = Duration::from_millis(100 * 2u64.pow(attempt));
                    tracing::warn!(attempt, %msg, "transient OCR failure, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Ok(Err(other)) => return Err(other),
                Err(_elapsed) => {
                    let exceeded_job_deadline = deadline.is_some_and(|d| started.elapsed() > d);
                    if exceeded_job_deadline {
                        return Err(OcrFailure::DeadlineExceeded { elapsed_ms: started.elapsed().as_millis() });
                    }
                    if attempt < self.config.max_retries {
                        tracing::warn!(attempt, "OCR call timed out, retrying");
                        attempt += 1;
                        continue;
                    }
                    return Err(OcrFailure::Transient(format!("OCR call timed out after {budget:?}")));
                }
            }
        }
    }
}

fn relax(config: &JobConfig) -> JobConfig {
    let mut relaxed = config.clone();
    relaxed.min_local_confidence = (config.min_local_confidence - 0.1).max(0.2);
    relaxed
}

fn to_job_error(failure: OcrFailure, engine: EngineTag) -> ExamCutError {
    match failure {
        OcrFailure::Unavailable(message) => ExamCutError::RemoteUnavailable { message },
        OcrFailure::Transient(message) | OcrFailure::Permanent(message) => {
            ExamCutError::OcrFailed { message: format!("{engine} engine: {message}"), source: None }
        }
        OcrFailure::DeadlineExceeded { elapsed_ms } => ExamCutError::DeadlineExceeded { elapsed_ms },
    }
}

fn check_deadline(started: Instant, deadline: Option<Duration>) -> Result<()> {
    if let Some(deadline) = deadline {
        if started.elapsed() > deadline {
            return Err(ExamCutError::DeadlineExceeded { elapsed_ms: started.elapsed().as_millis() });
        }
    }
    Ok(())
}

/// Atomically publish a finished scratch directory to its final location.
fn publish(scratch_dir: &Path, output_root: &Path) -> Result<()> {
    if output_root.exists() {
        std::fs::remove_dir_all(output_root).map_err(|e| ExamCutError::Io { path: output_root.to_path_buf(), source: e })?;
    }
    std::fs::rename(scratch_dir, output_root).map_err(|e| ExamCutError::Io { path: output_root.to_path_buf(), source: e })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relax_lowers_confidence_with_floor() {
        let mut config = JobConfig::default();
        config.min_local_confidence = 0.25;
        let relaxed = relax(&config);
        assert_eq!(relaxed.min_local_confidence, 0.2);
    }

    #[test]
    fn check_deadline_passes_when_unset() {
        assert!(check_deadline(Instant::now(), None).is_ok());
    }

    #[test]
    fn check_deadline_fails_when_exceeded() {
        let started = Instant::now() - Duration::from_secs(10);
        let result = check_deadline(started, Some(Duration::from_secs(1)));
        assert!(matches!(result, Err(ExamCutError::DeadlineExceeded { .. })));
    }

    use crate::crop::DefaultImageCropper;
    use crate::error::OcrFailure;
    use crate::ocr::{LanguageHint, OcrResponse};
    use crate::types::{EngineTag, PageImage, Rect, TextBlock};
    use async_trait::async_trait;

    struct FixedPageRasterizer {
        width: u32,
        height: u32,
    }

    impl PageRasterizer for FixedPageRasterizer {
        fn rasterize(&self, _pdf_path: &Path, _dpi: u32) -> Result<Vec<PageImage>> {
            Ok(vec![PageImage::new(0, image::DynamicImage::new_luma8(self.width, self.height))])
        }
    }

    struct FixedOcrEngine {
        tag: EngineTag,
        blocks: Vec<TextBlock>,
    }

    #[async_trait]
    impl OcrEngine for FixedOcrEngine {
        fn engine_id(&self) -> EngineTag {
            self.tag
        }

        async fn run(
            &self,
            _image: &image::DynamicImage,
            _language_hints: &[LanguageHint],
            _dpi: u32,
        ) -> std::result::Result<OcrResponse, OcrFailure> {
            Ok(OcrResponse {
                blocks: self.blocks.clone(),
                engine_id: self.tag,
                page_dims: (1169, 3309),
                elapsed: Duration::from_millis(1),
            })
        }
    }

    struct NeverReturningOcrEngine;

    #[async_trait]
    impl OcrEngine for NeverReturningOcrEngine {
        fn engine_id(&self) -> EngineTag {
            EngineTag::Local
        }

        async fn run(
            &self,
            _image: &image::DynamicImage,
            _language_hints: &[LanguageHint],
            _dpi: u32,
        ) -> std::result::Result<OcrResponse, OcrFailure> {
            std::future::pending().await
        }
    }

    fn marker_block(text: &str, y: u32, tag: EngineTag) -> TextBlock {
        TextBlock { text: text.to_string(), bbox: Rect::new(10, y, 40, 30), confidence: 0.9, engine_tag: tag }
    }

    #[tokio::test]
    async fn remote_unavailable_yields_partial_status_with_reported_gaps() {
        // Credentials absent: local detects [1, 2, 5], expected [1..5], and the
        // orchestrator must not even attempt remote escalation.
        let rasterizer = FixedPageRasterizer { width: 1169, height: 3309 };
        let local = FixedOcrEngine {
            tag: EngineTag::Local,
            blocks: vec![
                marker_block("1.", 100, EngineTag::Local),
                marker_block("2.", 800, EngineTag::Local),
                marker_block("5.", 2600, EngineTag::Local),
            ],
        };
        let cropper = DefaultImageCropper;

        let tmp = tempfile::tempdir().unwrap();
        let output_root = tmp.path().join("out");

        let config = JobConfig { remote_credentials: None, ..JobConfig::default() };
        let orchestrator = Orchestrator::new("job-partial".into(), config);
        let collaborators =
            Collaborators { rasterizer: &rasterizer, local_engine: &local, remote_engine: None, cropper: &cropper, packager: None };

        let outcome = orchestrator.run(Path::new("in.pdf"), &output_root, collaborators, None, None).await.unwrap();

        assert_eq!(outcome.status, JobStatus::Partial);
        let column = &outcome.manifest.pages[0].columns[0];
        assert_eq!(column.missing, vec![3, 4]);
        assert!(output_root.join("manifest.json").exists());
    }

    #[tokio::test]
    async fn deadline_exceeded_before_processing_fails_with_no_published_output() {
        let rasterizer = FixedPageRasterizer { width: 1169, height: 3309 };
        let local = NeverReturningOcrEngine;
        let cropper = DefaultImageCropper;

        let tmp = tempfile::tempdir().unwrap();
        let output_root = tmp.path().join("out");

        let orchestrator = Orchestrator::new("job-deadline".into(), JobConfig::default());
        let collaborators =
            Collaborators { rasterizer: &rasterizer, local_engine: &local, remote_engine: None, cropper: &cropper, packager: None };

        let result =
            orchestrator.run(Path::new("in.pdf"), &output_root, collaborators, Some(Duration::from_nanos(1)), None).await;

        assert!(matches!(result, Err(ExamCutError::DeadlineExceeded { .. })));
        assert!(!output_root.exists());
    }

    struct SlowOcrEngine {
        tag: EngineTag,
        delay: Duration,
    }

    #[async_trait]
    impl OcrEngine for SlowOcrEngine {
        fn engine_id(&self) -> EngineTag {
            self.tag
        }

        async fn run(
            &self,
            _image: &image::DynamicImage,
            _language_hints: &[LanguageHint],
            _dpi: u32,
        ) -> std::result::Result<OcrResponse, OcrFailure> {
            tokio::time::sleep(self.delay).await;
            Ok(OcrResponse { blocks: Vec::new(), engine_id: self.tag, page_dims: (1169, 3309), elapsed: self.delay })
        }
    }

    #[tokio::test]
    async fn deadline_exceeded_mid_call_fails_with_no_published_output() {
        let rasterizer = FixedPageRasterizer { width: 1169, height: 3309 };
        let local = SlowOcrEngine { tag: EngineTag::Local, delay: Duration::from_millis(50) };
        let cropper = DefaultImageCropper;

        let tmp = tempfile::tempdir().unwrap();
        let output_root = tmp.path().join("out");

        let orchestrator = Orchestrator::new("job-deadline-mid-call".into(), JobConfig::default());
        let collaborators =
            Collaborators { rasterizer: &rasterizer, local_engine: &local, remote_engine: None, cropper: &cropper, packager: None };

        let result =
            orchestrator.run(Path::new("in.pdf"), &output_root, collaborators, Some(Duration::from_millis(5)), None).await;

        assert!(matches!(result, Err(ExamCutError::DeadlineExceeded { .. })));
        assert!(!output_root.exists());
    }
}
