//! Boundary solver: turns an ordered list of markers within one column strip
//! into non-overlapping per-problem rectangles.

use crate::types::{Boundary, ProblemMarker, Rect};

/// Height cap applied only when a marker carries an explicit height hint and
/// no next marker exists to bound it.
pub const FIXED_PROBLEM_HEIGHT: u32 = 2000;

/// Compute boundaries for `markers` (assumed pre-sorted by ascending
/// `position_bbox.y`, as [`crate::markers::MarkerParser::parse`] returns
/// them) within a strip of the given width and height.
///
/// Invariants upheld: every rect lies within `[0, strip_width) x [0,
/// strip_height)`; adjacent rects never overlap; the last marker always
/// extends to `strip_height`.
pub fn solve(markers: &[ProblemMarker], strip_width: u32, strip_height: u32) -> Vec<Boundary> {
    let mut boundaries = Vec::with_capacity(markers.len());

    for (i, marker) in markers.iter().enumerate() {
        let y_top = marker.position_bbox.y.min(strip_height);
        let y_bottom = if i + 1 < markers.len() {
            markers[i + 1].position_bbox.y.max(y_top)
        } else {
            strip_height
        };

        let height = if height_hint(marker).is_some() && i + 1 >= markers.len() {
            let hint = height_hint(marker).unwrap();
            let cap = FIXED_PROBLEM_HEIGHT.max(strip_height.saturating_sub(y_top));
            hint.min(cap).max(y_bottom.saturating_sub(y_top))
        } else {
            y_bottom.saturating_sub(y_top)
        };

        let rect = Rect::new(0, y_top, strip_width, height.max(1));
        boundaries.push(Boundary { problem_number: marker.number, rect, source_engine: marker.source_engine });
    }

    boundaries
}

/// Placeholder hook for an explicit per-marker height hint; the marker
/// parser does not currently produce one, so this always returns `None`
/// until a future marker source carries it.
fn height_hint(_marker: &ProblemMarker) -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EngineTag, Rect as R};

    fn marker(number: u32, y: u32) -> ProblemMarker {
        ProblemMarker { number, position_bbox: R::new(10, y, 20, 20), confidence: 0.9, source_engine: EngineTag::Local }
    }

    #[test]
    fn last_marker_extends_to_strip_bottom() {
        let markers = vec![marker(1, 100), marker(2, 500)];
        let boundaries = solve(&markers, 1169, 3309);
        assert_eq!(boundaries[1].rect.y_bottom(), 3309);
    }

    #[test]
    fn boundaries_do_not_overlap() {
        let markers = vec![marker(1, 100), marker(2, 500), marker(3, 900)];
        let boundaries = solve(&markers, 1169, 3309);
        for w in boundaries.windows(2) {
            assert!(w[0].rect.y_bottom() <= w[1].rect.y);
        }
    }

    #[test]
    fn full_column_width_is_used() {
        let markers = vec![marker(1, 100)];
        let boundaries = solve(&markers, 1169, 3309);
        assert_eq!(boundaries[0].rect.w, 1169);
        assert_eq!(boundaries[0].rect.x, 0);
    }

    #[test]
    fn clean_two_column_scenario() {
        // Left column of a two-column page, 1169 px wide, 4 markers.
        let markers = vec![marker(1, 100), marker(2, 800), marker(3, 1600), marker(4, 2400)];
        let boundaries = solve(&markers, 1169, 3309);
        assert_eq!(boundaries.len(), 4);
        assert_eq!(boundaries.last().unwrap().rect.y_bottom(), 3309);
        assert!(boundaries.iter().all(|b| b.rect.fits_within(1169, 3309)));
    }

    #[test]
    fn zero_markers_yield_zero_boundaries() {
        let boundaries = solve(&[], 1169, 3309);
        assert!(boundaries.is_empty());
    }
}
