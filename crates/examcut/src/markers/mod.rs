//! Marker parser: recognizes problem-number tokens within a column's OCR
//! text blocks.

use crate::types::{EngineTag, JobConfig, ProblemMarker, TextBlock};
use once_cell::sync::Lazy;
use regex::Regex;

/// Default position gate, scaled with DPI (default is calibrated for 200 dpi).
pub const MAX_MARKER_X_OFFSET_AT_200_DPI: u32 = 300;
const BASE_DPI: u32 = 200;

static DIGIT_DOT_OR_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,3})[.,]").unwrap());
static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\[(](\d{1,3})[\])]").unwrap());
static SCORE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[\s*\d{1,3}\s*점\s*\]").unwrap());

const CIRCLED_DIGITS: &[char] = &[
    '①', '②', '③', '④', '⑤', '⑥', '⑦', '⑧', '⑨', '⑩', '⑪', '⑫', '⑬', '⑭', '⑮', '⑯', '⑰', '⑱', '⑲', '⑳',
];

pub struct MarkerParser;

impl MarkerParser {
    pub fn new() -> Self {
        Self
    }

    /// Extract problem-number markers from `blocks`, honoring the position
    /// and confidence gates, rejecting score markers, deduplicating by
    /// number, and returning the survivors sorted by ascending `bbox.y`.
    pub fn parse(&self, blocks: &[TextBlock], config: &JobConfig, dpi: u32) -> Vec<ProblemMarker> {
        let max_x_offset = scale_offset(MAX_MARKER_X_OFFSET_AT_200_DPI, dpi);

        let mut candidates: Vec<ProblemMarker> = blocks
            .iter()
            .filter(|b| b.confidence >= confidence_threshold(b.engine_tag, config))
            .filter(|b| b.bbox.x <= max_x_offset)
            .filter_map(|b| recognize(b))
            .filter(|m| m.number >= JobConfig::MIN_PROBLEM_NUMBER && m.number <= JobConfig::MAX_PROBLEM_NUMBER)
            .collect();

        dedup_by_number(&mut candidates);
        candidates.sort_by_key(|m| m.position_bbox.y);
        candidates
    }
}

impl Default for MarkerParser {
    fn default() -> Self {
        Self::new()
    }
}

fn scale_offset(offset_at_200_dpi: u32, dpi: u32) -> u32 {
    (offset_at_200_dpi as u64 * dpi as u64 / BASE_DPI as u64) as u32
}

/// The confidence floor a marker must clear, which depends on which engine
/// produced it: local and remote OCR are calibrated differently, so the same
/// raw confidence value means something different coming from each.
fn confidence_threshold(engine: EngineTag, config: &JobConfig) -> f32 {
    match engine {
        EngineTag::Local => config.min_local_confidence,
        EngineTag::Remote => config.min_remote_confidence,
    }
}

/// Apply the recognized-pattern grammar, in order, to one text block's
/// trimmed text. Returns `None` if nothing matches or the match is rejected
/// as a score marker.
fn recognize(block: &TextBlock) -> Option<ProblemMarker> {
    recognize_number(&block.text).map(|number| make_marker(block, number))
}

/// The text-only half of the recognition grammar, with no position or
/// confidence gating. Used directly by the orchestrator's remote-marker
/// reconciliation, where the position gate must be evaluated only after
/// coordinates have been rescaled into local pixel space.
pub fn recognize_number(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if SCORE_MARKER.is_match(trimmed) {
        return None;
    }

    if let Some(caps) = DIGIT_DOT_OR_COMMA.captures(trimmed) {
        return caps.get(1)?.as_str().parse().ok();
    }

    if let Some(first) = trimmed.chars().next() {
        if let Some(pos) = CIRCLED_DIGITS.iter().position(|&c| c == first) {
            return Some((pos + 1) as u32);
        }
    }

    if let Some(caps) = BRACKETED.captures(trimmed) {
        return caps.get(1)?.as_str().parse().ok();
    }

    None
}

/// The position + confidence gate applied to a candidate marker bbox, in the
/// same pixel space [`MarkerParser::parse`] applies it in. `engine` selects
/// which of `min_local_confidence`/`min_remote_confidence` applies.
pub fn passes_position_gate(bbox_x: u32, confidence: f32, engine: EngineTag, config: &JobConfig, dpi: u32) -> bool {
    let max_x_offset = scale_offset(MAX_MARKER_X_OFFSET_AT_200_DPI, dpi);
    bbox_x <= max_x_offset && confidence >= confidence_threshold(engine, config)
}

fn make_marker(block: &TextBlock, number: u32) -> ProblemMarker {
    ProblemMarker {
        number,
        position_bbox: block.bbox,
        confidence: block.confidence,
        source_engine: block.engine_tag,
    }
}

/// Merge a surviving local marker list with reconciled remote markers,
/// applying the same number-collision tie-break as [`MarkerParser::parse`]'s
/// internal dedup (prefer higher confidence; prefer remote on exact ties).
pub fn merge(mut local: Vec<ProblemMarker>, remote: Vec<ProblemMarker>) -> Vec<ProblemMarker> {
    local.extend(remote);
    dedup_by_number(&mut local);
    local.sort_by_key(|m| m.position_bbox.y);
    local
}

/// Keep the higher-confidence marker for each number; break ties toward the
/// marker with the smaller `bbox.y`. Per the orchestrator's reconciliation
/// rule, a remote-vs-local tie (equal confidence AND equal y) prefers remote.
fn dedup_by_number(markers: &mut Vec<ProblemMarker>) {
    use std::collections::HashMap;
    let mut best: HashMap<u32, ProblemMarker> = HashMap::new();
    for m in markers.drain(..) {
        match best.get(&m.number) {
            None => {
                best.insert(m.number, m);
            }
            Some(existing) => {
                let replace = if m.confidence > existing.confidence {
                    true
                } else if m.confidence < existing.confidence {
                    false
                } else if m.position_bbox.y < existing.position_bbox.y {
                    true
                } else if m.position_bbox.y > existing.position_bbox.y {
                    false
                } else {
                    matches!(m.source_engine, EngineTag::Remote)
                };
                if replace {
                    best.insert(m.number, m);
                }
            }
        }
    }
    *markers = best.into_values().collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rect;

    fn block(text: &str, x: u32, y: u32, confidence: f32) -> TextBlock {
        TextBlock { text: text.to_string(), bbox: Rect::new(x, y, 30, 20), confidence, engine_tag: EngineTag::Local }
    }

    #[test]
    fn digit_dot_is_recognized() {
        let b = block("3.", 10, 100, 0.9);
        let m = recognize(&b).unwrap();
        assert_eq!(m.number, 3);
    }

    #[test]
    fn digit_comma_is_recognized() {
        let b = block("12,", 10, 100, 0.9);
        let m = recognize(&b).unwrap();
        assert_eq!(m.number, 12);
    }

    #[test]
    fn circled_digit_is_recognized() {
        let b = block("①", 10, 100, 0.9);
        let m = recognize(&b).unwrap();
        assert_eq!(m.number, 1);
    }

    #[test]
    fn bracketed_digit_is_recognized() {
        let b = block("[7]", 10, 100, 0.9);
        let m = recognize(&b).unwrap();
        assert_eq!(m.number, 7);
    }

    #[test]
    fn score_marker_is_rejected() {
        let b = block("[3점]", 500, 1500, 0.9);
        assert!(recognize(&b).is_none());
    }

    #[test]
    fn position_gate_rejects_far_right_marker() {
        let config = JobConfig::default();
        let blocks = vec![block("1.", 1200, 100, 0.9)];
        let markers = MarkerParser::new().parse(&blocks, &config, 200);
        assert!(markers.is_empty());
    }

    #[test]
    fn dedup_prefers_higher_confidence() {
        let mut markers = vec![
            ProblemMarker { number: 3, position_bbox: Rect::new(0, 100, 10, 10), confidence: 0.6, source_engine: EngineTag::Local },
            ProblemMarker { number: 3, position_bbox: Rect::new(0, 100, 10, 10), confidence: 0.9, source_engine: EngineTag::Remote },
        ];
        dedup_by_number(&mut markers);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].confidence, 0.9);
    }

    #[test]
    fn dedup_tie_prefers_remote() {
        let mut markers = vec![
            ProblemMarker { number: 3, position_bbox: Rect::new(0, 100, 10, 10), confidence: 0.8, source_engine: EngineTag::Local },
            ProblemMarker { number: 3, position_bbox: Rect::new(0, 100, 10, 10), confidence: 0.8, source_engine: EngineTag::Remote },
        ];
        dedup_by_number(&mut markers);
        assert_eq!(markers[0].source_engine, EngineTag::Remote);
    }

    #[test]
    fn remote_marker_below_remote_threshold_is_rejected() {
        let config = JobConfig::default();
        let mut b = block("3.", 10, 100, 0.6);
        b.engine_tag = EngineTag::Remote;
        let markers = MarkerParser::new().parse(&[b], &config, 200);
        assert!(markers.is_empty());
    }

    #[test]
    fn local_marker_above_local_but_below_remote_threshold_is_accepted() {
        let config = JobConfig::default();
        let b = block("3.", 10, 100, 0.6);
        let markers = MarkerParser::new().parse(&[b], &config, 200);
        assert_eq!(markers.len(), 1);
    }

    #[test]
    fn passes_position_gate_applies_source_specific_threshold() {
        let config = JobConfig::default();
        assert!(passes_position_gate(10, 0.6, EngineTag::Local, &config, 200));
        assert!(!passes_position_gate(10, 0.6, EngineTag::Remote, &config, 200));
    }

    #[test]
    fn output_is_sorted_by_y() {
        let config = JobConfig::default();
        let blocks = vec![block("2.", 10, 500, 0.9), block("1.", 10, 100, 0.9)];
        let markers = MarkerParser::new().parse(&blocks, &config, 200);
        assert_eq!(markers.iter().map(|m| m.number).collect::<Vec<_>>(), vec![1, 2]);
    }
}
