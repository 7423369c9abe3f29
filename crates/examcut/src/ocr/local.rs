//! The local, synchronous, no-network OCR engine.
//!
//! The engine itself is a thin async wrapper (`spawn_blocking`) around a
//! swappable synchronous [`LocalRecognizer`] backend trait. This keeps the
//! orchestrator decoupled from any particular text-recognition library.

use super::{LanguageHint, OcrEngine, OcrResponse};
use crate::error::OcrFailure;
use crate::types::{EngineTag, Rect, TextBlock};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A synchronous text-recognition backend. `recognize` MUST report bounding
/// boxes in the input image's own pixel space and MUST NOT raise on
/// unrecognized content (an empty vector is a valid result).
pub trait LocalRecognizer: Send + Sync {
    fn recognize(
        &self,
        image: &image::DynamicImage,
        language_hints: &[LanguageHint],
    ) -> Result<Vec<TextBlock>, OcrFailure>;
}

pub struct LocalOcrEngine {
    recognizer: Arc<dyn LocalRecognizer>,
}

impl LocalOcrEngine {
    pub fn new(recognizer: Arc<dyn LocalRecognizer>) -> Self {
        Self { recognizer }
    }
}

#[async_trait]
impl OcrEngine for LocalOcrEngine {
    fn engine_id(&self) -> EngineTag {
        EngineTag::Local
    }

    async fn run(
        &self,
        image: &image::DynamicImage,
        language_hints: &[LanguageHint],
        _dpi: u32,
    ) -> Result<OcrResponse, OcrFailure> {
        let recognizer = self.recognizer.clone();
        let image = image.clone();
        let hints = language_hints.to_vec();
        let started = Instant::now();

        let (width, height) = (image.width(), image.height());
        let blocks = tokio::task::spawn_blocking(move || recognizer.recognize(&image, &hints))
            .await
            .map_err(|e| OcrFailure::Transient(format!("local OCR task panicked: {e}")))??;

        Ok(OcrResponse { blocks, engine_id: EngineTag::Local, page_dims: (width, height), elapsed: started.elapsed() })
    }
}

/// A [`LocalRecognizer`] that returns no blocks. Useful as a safe default
/// when no OCR backend is configured, and in tests that only exercise the
/// orchestrator's control flow.
#[derive(Default)]
pub struct NullRecognizer;

impl LocalRecognizer for NullRecognizer {
    fn recognize(
        &self,
        _image: &image::DynamicImage,
        _language_hints: &[LanguageHint],
    ) -> Result<Vec<TextBlock>, OcrFailure> {
        Ok(Vec::new())
    }
}

#[cfg(feature = "tesseract-ocr")]
mod tesseract_backend {
    use super::*;
    use kreuzberg_tesseract::TesseractAPI;
    use parking_lot::Mutex;

    struct TesseractState {
        api: TesseractAPI,
        initialized_lang: Option<String>,
    }

    /// Wraps `kreuzberg-tesseract`'s FFI binding behind [`LocalRecognizer`].
    /// The handle is not `Sync` on its own (it owns a raw Tesseract engine
    /// pointer), so calls are serialized with a mutex; the orchestrator
    /// already treats the local engine call as a blocking point. `init` is
    /// re-run only when the requested language set changes, since it reloads
    /// trained-data files from disk.
    pub struct TesseractRecognizer {
        state: Mutex<TesseractState>,
        datapath: String,
    }

    impl TesseractRecognizer {
        pub fn new(datapath: &str) -> Result<Self, OcrFailure> {
            let api = TesseractAPI::new();
            Ok(Self { state: Mutex::new(TesseractState { api, initialized_lang: None }), datapath: datapath.to_string() })
        }
    }

    impl LocalRecognizer for TesseractRecognizer {
        fn recognize(
            &self,
            image: &image::DynamicImage,
            language_hints: &[LanguageHint],
        ) -> Result<Vec<TextBlock>, OcrFailure> {
            let mut state = self.state.lock();
            let lang = build_lang(language_hints);
            if state.initialized_lang.as_deref() != Some(lang.as_str()) {
                state.api.init(&self.datapath, &lang).map_err(|e| OcrFailure::Permanent(format!("tesseract init: {e}")))?;
                state.initialized_lang = Some(lang);
            }
            let api = &state.api;

            let gray = image.to_luma8();
            let (width, height) = gray.dimensions();
            api.set_image(gray.as_raw(), width as i32, height as i32, 1, width as i32)
                .map_err(|e| OcrFailure::Transient(format!("tesseract set_image: {e}")))?;
            api.recognize().map_err(|e| OcrFailure::Transient(format!("tesseract recognize: {e}")))?;

            let iter = api.get_iterator().map_err(|e| OcrFailure::Transient(format!("tesseract get_iterator: {e}")))?;

            let mut blocks = Vec::new();
            loop {
                if let Ok((text, left, top, right, bottom, confidence)) = iter.get_word_with_bounds() {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        let w = (right - left).max(1) as u32;
                        let h = (bottom - top).max(1) as u32;
                        blocks.push(TextBlock {
                            text: trimmed.to_string(),
                            bbox: Rect::new(left.max(0) as u32, top.max(0) as u32, w, h),
                            confidence: (confidence / 100.0).clamp(0.0, 1.0),
                            engine_tag: EngineTag::Local,
                        });
                    }
                }
                if !iter.next_word().unwrap_or(false) {
                    break;
                }
            }
            Ok(blocks)
        }
    }

    /// Map the crate's language hints to Tesseract language codes, joined
    /// with `+` the way Tesseract expects for multi-language recognition.
    fn build_lang(hints: &[LanguageHint]) -> String {
        if hints.is_empty() {
            return "eng".to_string();
        }
        hints
            .iter()
            .map(|h| match h {
                LanguageHint::Korean => "kor",
                LanguageHint::English => "eng",
            })
            .collect::<Vec<_>>()
            .join("+")
    }
}

#[cfg(feature = "tesseract-ocr")]
pub use tesseract_backend::TesseractRecognizer;

#[cfg(test)]
mod tests {
    use super::*;

    fn block(text: &str, x: u32, y: u32) -> TextBlock {
        TextBlock { text: text.to_string(), bbox: Rect::new(x, y, 20, 20), confidence: 0.8, engine_tag: EngineTag::Local }
    }

    struct FixedRecognizer(Vec<TextBlock>);

    impl LocalRecognizer for FixedRecognizer {
        fn recognize(&self, _image: &image::DynamicImage, _hints: &[LanguageHint]) -> Result<Vec<TextBlock>, OcrFailure> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn run_reports_page_dims_matching_input_image() {
        let image = image::DynamicImage::new_luma8(200, 300);
        let engine = LocalOcrEngine::new(Arc::new(FixedRecognizer(vec![block("1.", 10, 10)])));
        let response = engine.run(&image, super::super::DEFAULT_LANGUAGE_HINTS, 200).await.unwrap();
        assert_eq!(response.page_dims, (200, 300));
        assert_eq!(response.blocks.len(), 1);
    }

    #[tokio::test]
    async fn null_recognizer_returns_empty() {
        let image = image::DynamicImage::new_luma8(10, 10);
        let engine = LocalOcrEngine::new(Arc::new(NullRecognizer));
        let response = engine.run(&image, super::super::DEFAULT_LANGUAGE_HINTS, 200).await.unwrap();
        assert!(response.blocks.is_empty());
    }
}
