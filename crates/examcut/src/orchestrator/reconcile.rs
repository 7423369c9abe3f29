//! Coordinate-space reconciliation between the local engine's pixel grid and
//! the remote engine's declared page dimensions. This is the single
//! highest-risk piece of the system: local and remote bboxes must never be
//! compared or merged without going through here first.

use crate::error::{ExamCutError, Result};
use crate::markers::{self, MarkerParser};
use crate::ocr::OcrResponse;
use crate::types::{EngineTag, JobConfig, ProblemMarker, Rect};

/// Relative tolerance between the horizontal and vertical scale factors
/// before a reconciliation is considered suspicious.
const SCALE_MISMATCH_TOLERANCE: f32 = 0.05;

/// Scale remote-engine blocks into the local column strip's pixel space and
/// keep only those that the marker parser recognizes as a problem number in
/// `missing`. Asserts that every reconciled bbox lies within the strip.
pub fn reconcile_remote_markers(
    remote_response: &OcrResponse,
    _parser: &MarkerParser,
    config: &JobConfig,
    strip_width: u32,
    strip_height: u32,
    missing: &[u32],
) -> Result<Vec<ProblemMarker>> {
    let (remote_w, remote_h) = remote_response.page_dims;
    if remote_w == 0 || remote_h == 0 {
        return Ok(Vec::new());
    }

    let scale_x = strip_width as f32 / remote_w as f32;
    let scale_y = strip_height as f32 / remote_h as f32;
    let relative_diff = (scale_x - scale_y).abs() / scale_x.max(scale_y).max(f32::EPSILON);
    if relative_diff > SCALE_MISMATCH_TOLERANCE {
        tracing::warn!(scale_x, scale_y, relative_diff, "remote OCR scale factors diverge beyond tolerance");
    }

    let mut reconciled = Vec::new();
    for block in &remote_response.blocks {
        let Some(number) = markers::recognize_number(&block.text) else { continue };
        if !missing.contains(&number) {
            continue;
        }

        let scaled = Rect::new(
            (block.bbox.x as f32 * scale_x).round() as u32,
            (block.bbox.y as f32 * scale_y).round() as u32,
            ((block.bbox.w as f32 * scale_x).round() as u32).max(1),
            ((block.bbox.h as f32 * scale_y).round() as u32).max(1),
        );

        if !scaled.fits_within(strip_width, strip_height) {
            return Err(ExamCutError::InternalAssert {
                message: format!(
                    "reconciled remote marker {number} at {scaled:?} does not fit within strip {strip_width}x{strip_height}"
                ),
            });
        }

        if !markers::passes_position_gate(scaled.x, block.confidence, EngineTag::Remote, config, config.dpi) {
            continue;
        }

        reconciled.push(ProblemMarker {
            number,
            position_bbox: scaled,
            confidence: block.confidence,
            source_engine: EngineTag::Remote,
        });
    }

    Ok(reconciled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextBlock;
    use std::time::Duration;

    fn remote_response_with_block(text: &str, x: u32, y: u32, w: u32, h: u32, page_dims: (u32, u32)) -> OcrResponse {
        OcrResponse {
            blocks: vec![TextBlock { text: text.to_string(), bbox: Rect::new(x, y, w, h), confidence: 0.9, engine_tag: EngineTag::Remote }],
            engine_id: EngineTag::Remote,
            page_dims,
            elapsed: Duration::from_millis(1),
        }
    }

    #[test]
    fn missing_middle_problem_recovered_by_remote() {
        // A column strip of 1169x3309 against a remote page space of
        // 2923x8273 gives scale factors close to 0.4 in both axes; a remote
        // block for problem 3 near (245, 2374) lands near (98, 950) in local
        // space after rounding.
        let response = remote_response_with_block("3.", 245, 2374, 25, 27, (2923, 8273));
        let config = JobConfig::default();
        let reconciled = reconcile_remote_markers(&response, &MarkerParser::new(), &config, 1169, 3309, &[3, 4]).unwrap();
        assert_eq!(reconciled.len(), 1);
        let marker = &reconciled[0];
        assert_eq!(marker.number, 3);
        assert_eq!(marker.position_bbox.x, 98);
        assert_eq!(marker.position_bbox.y, 950);
        assert_eq!(marker.position_bbox.w, 10);
        assert_eq!(marker.position_bbox.h, 11);
        assert_eq!(marker.source_engine, EngineTag::Remote);
    }

    #[test]
    fn markers_not_in_missing_set_are_dropped() {
        let response = remote_response_with_block("1.", 50, 50, 20, 20, (1000, 1000));
        let config = JobConfig::default();
        let reconciled = reconcile_remote_markers(&response, &MarkerParser::new(), &config, 1000, 1000, &[5]).unwrap();
        assert!(reconciled.is_empty());
    }

    #[test]
    fn out_of_bounds_reconciliation_is_an_internal_assert() {
        // A pathological page_dims smaller than the block itself would scale
        // the bbox outside the strip; this must never happen for valid
        // remote responses, so it is treated as a bug, not swallowed.
        let response = remote_response_with_block("3.", 2000, 2000, 20, 20, (100, 100));
        let config = JobConfig::default();
        let result = reconcile_remote_markers(&response, &MarkerParser::new(), &config, 1000, 1000, &[3]);
        assert!(result.is_err());
    }
}
