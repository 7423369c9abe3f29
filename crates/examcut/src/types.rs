//! The data model shared by every stage of the extraction pipeline.

use serde::{Deserialize, Serialize};

/// A pixel position, non-negative by construction (all fields are `u32`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// An axis-aligned pixel rectangle, `w > 0 && h > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn y_bottom(&self) -> u32 {
        self.y + self.h
    }

    pub fn x_right(&self) -> u32 {
        self.x + self.w
    }

    /// Whether `self` lies entirely within a `(width, height)` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x_right() <= width && self.y_bottom() <= height
    }
}

/// An immutable rasterized page. Pixel data lives in `pixels` (row-major RGB
/// or grayscale, as produced by the rasterizer); `width`/`height` describe
/// its extent and `page_index` its position within the job.
#[derive(Clone)]
pub struct PageImage {
    pub page_index: u32,
    pub width: u32,
    pub height: u32,
    pub image: image::DynamicImage,
}

impl PageImage {
    pub fn new(page_index: u32, image: image::DynamicImage) -> Self {
        let width = image.width();
        let height = image.height();
        Self { page_index, width, height, image }
    }
}

/// A sub-rectangle of a page image corresponding to one reading column.
#[derive(Clone)]
pub struct ColumnStrip {
    pub page_index: u32,
    pub column_index: u32,
    /// x-offset of this strip within the originating page image.
    pub page_x_offset: u32,
    pub width: u32,
    pub height: u32,
    pub image: image::DynamicImage,
}

/// Which OCR engine produced a text block or marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineTag {
    Local,
    Remote,
}

impl std::fmt::Display for EngineTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineTag::Local => write!(f, "local"),
            EngineTag::Remote => write!(f, "remote"),
        }
    }
}

/// One atom of OCR output: a recognized text span with its pixel bounding
/// box and confidence, tagged with the engine that produced it.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub text: String,
    pub bbox: Rect,
    pub confidence: f32,
    pub engine_tag: EngineTag,
}

/// A detected problem-number token within a column.
#[derive(Debug, Clone)]
pub struct ProblemMarker {
    pub number: u32,
    pub position_bbox: Rect,
    pub confidence: f32,
    pub source_engine: EngineTag,
}

/// The result of running one OCR engine over one column strip.
#[derive(Debug, Clone)]
pub struct ColumnOcrResult {
    pub column_id: u32,
    pub blocks: Vec<TextBlock>,
    pub engine: EngineTag,
    pub elapsed: std::time::Duration,
}

/// The final per-problem rectangle within a column strip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Boundary {
    pub problem_number: u32,
    pub rect: Rect,
    pub source_engine: EngineTag,
}

/// The OCR strategy selected for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    LocalOnly,
    LocalThenRemote,
    ManualFallback,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::LocalThenRemote
    }
}

impl Strategy {
    /// Whether this strategy permits escalating to the remote engine at all.
    pub fn allows_remote(&self) -> bool {
        matches!(self, Strategy::LocalThenRemote | Strategy::ManualFallback)
    }
}

/// Opaque remote-OCR credentials. Never logged or serialized in full.
#[derive(Clone)]
pub struct RemoteCredentials {
    pub app_id: String,
    pub app_key: String,
}

impl std::fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCredentials").field("app_id", &"<redacted>").field("app_key", &"<redacted>").finish()
    }
}

/// Immutable, job-scoped configuration.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub strategy: Strategy,
    pub dpi: u32,
    pub max_retries: u32,
    pub min_local_confidence: f32,
    pub min_remote_confidence: f32,
    pub expected_problem_count: Option<u32>,
    pub remote_credentials: Option<RemoteCredentials>,
}

impl JobConfig {
    pub const DEFAULT_DPI: u32 = 200;
    pub const DEFAULT_MAX_RETRIES: u32 = 2;
    pub const DEFAULT_MIN_LOCAL_CONFIDENCE: f32 = 0.5;
    pub const DEFAULT_MIN_REMOTE_CONFIDENCE: f32 = 0.7;
    pub const MIN_PROBLEM_NUMBER: u32 = 1;
    pub const MAX_PROBLEM_NUMBER: u32 = 100;
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            dpi: Self::DEFAULT_DPI,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            min_local_confidence: Self::DEFAULT_MIN_LOCAL_CONFIDENCE,
            min_remote_confidence: Self::DEFAULT_MIN_REMOTE_CONFIDENCE,
            expected_problem_count: None,
            remote_credentials: None,
        }
    }
}

/// Diagnosis produced by the validator from a set of detected numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub status: DiagnosisStatus,
    pub missing: Vec<u32>,
    pub duplicates: Vec<u32>,
    pub out_of_order: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosisStatus {
    Ok,
    Missing,
    Duplicate,
    Mixed,
}

/// Final per-job status, surfaced in the manifest and mapped to a CLI exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Ok,
    Partial,
    Failed,
}
