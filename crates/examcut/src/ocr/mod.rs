//! OCR engine abstraction: a small trait shared by the local and remote
//! engines, modeled on a priority/fallback recognizer rather than a single
//! monolithic backend.

pub mod local;
#[cfg(feature = "remote-ocr")]
pub mod remote;

use crate::error::OcrFailure;
use crate::types::{EngineTag, TextBlock};
use async_trait::async_trait;
use std::time::Duration;

pub use local::LocalOcrEngine;
#[cfg(feature = "tesseract-ocr")]
pub use local::TesseractRecognizer;
#[cfg(feature = "remote-ocr")]
pub use remote::RemoteOcrEngine;

/// Language hints passed to an engine; at minimum Korean and English.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageHint {
    Korean,
    English,
}

pub const DEFAULT_LANGUAGE_HINTS: &[LanguageHint] = &[LanguageHint::Korean, LanguageHint::English];

/// The response shape every engine returns. `page_dims` is the engine's own
/// declared coordinate space, which MAY differ from the input image's pixel
/// dimensions (see the orchestrator's reconciliation step).
#[derive(Debug, Clone)]
pub struct OcrResponse {
    pub blocks: Vec<TextBlock>,
    pub engine_id: EngineTag,
    pub page_dims: (u32, u32),
    pub elapsed: Duration,
}

/// Shared contract for both OCR engines. Implementations must never panic or
/// raise on unrecognized content (an empty block list is a valid response)
/// and must report confidence already mapped into `[0, 1]`.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn engine_id(&self) -> EngineTag;

    async fn run(
        &self,
        image: &image::DynamicImage,
        language_hints: &[LanguageHint],
        dpi: u32,
    ) -> Result<OcrResponse, OcrFailure>;
}
