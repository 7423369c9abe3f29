//! The remote, network-bound, coordinate-returning OCR engine.

use super::{LanguageHint, OcrEngine, OcrResponse};
use crate::error::OcrFailure;
use crate::types::{EngineTag, RemoteCredentials, Rect, TextBlock};
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use std::time::{Duration, Instant};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct RemoteOcrEngine {
    client: reqwest::Client,
    endpoint: String,
    credentials: RemoteCredentials,
}

impl RemoteOcrEngine {
    pub fn new(endpoint: impl Into<String>, credentials: RemoteCredentials) -> Self {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build().unwrap_or_default();
        Self { client, endpoint: endpoint.into(), credentials }
    }
}

#[derive(serde::Serialize)]
struct RemoteRequest<'a> {
    image_base64: String,
    languages: Vec<&'a str>,
}

#[derive(Deserialize)]
struct RemoteApiResponse {
    page_width: u32,
    page_height: u32,
    blocks: Vec<RemoteBlock>,
}

#[derive(Deserialize)]
struct RemoteBlock {
    text: String,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    confidence: f32,
}

fn hint_code(hint: LanguageHint) -> &'static str {
    match hint {
        LanguageHint::Korean => "ko",
        LanguageHint::English => "en",
    }
}

#[async_trait]
impl OcrEngine for RemoteOcrEngine {
    fn engine_id(&self) -> EngineTag {
        EngineTag::Remote
    }

    async fn run(
        &self,
        image: &image::DynamicImage,
        language_hints: &[LanguageHint],
        _dpi: u32,
    ) -> Result<OcrResponse, OcrFailure> {
        let started = Instant::now();

        let mut buf = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut buf, image::ImageFormat::Png)
            .map_err(|e| OcrFailure::Permanent(format!("failed to encode image for remote OCR: {e}")))?;
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(buf.into_inner());

        let request = RemoteRequest { image_base64, languages: language_hints.iter().copied().map(hint_code).collect() };

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-App-Id", &self.credentials.app_id)
            .header("X-App-Key", &self.credentials.app_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(OcrFailure::Unavailable(format!("remote OCR rejected credentials: {status}")));
        }
        if status.is_server_error() {
            return Err(OcrFailure::Transient(format!("remote OCR server error: {status}")));
        }
        if !status.is_success() {
            return Err(OcrFailure::Permanent(format!("remote OCR request rejected: {status}")));
        }

        let body: RemoteApiResponse =
            response.json().await.map_err(|e| OcrFailure::Permanent(format!("malformed remote OCR response: {e}")))?;

        let blocks = body
            .blocks
            .into_iter()
            .map(|b| TextBlock {
                text: b.text,
                bbox: Rect::new(b.x, b.y, b.w.max(1), b.h.max(1)),
                confidence: b.confidence.clamp(0.0, 1.0),
                engine_tag: EngineTag::Remote,
            })
            .collect();

        Ok(OcrResponse {
            blocks,
            engine_id: EngineTag::Remote,
            page_dims: (body.page_width, body.page_height),
            elapsed: started.elapsed(),
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> OcrFailure {
    if err.is_timeout() || err.is_connect() {
        OcrFailure::Transient(err.to_string())
    } else {
        OcrFailure::Permanent(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_codes_match_contract() {
        assert_eq!(hint_code(LanguageHint::Korean), "ko");
        assert_eq!(hint_code(LanguageHint::English), "en");
    }
}
