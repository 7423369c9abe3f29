//! Multi-column layout analysis: split a page image into column strips in
//! left-to-right reading order.

use crate::types::{ColumnStrip, PageImage};
use image::{GrayImage, Luma};
use rayon::prelude::*;

/// Minimum separation between two vertical-line candidates before they are
/// treated as distinct separators rather than one thick rule.
pub const MERGE_TOLERANCE: u32 = 20;
/// Minimum width (in the smoothed projection profile) of a content gap to
/// count as a column boundary.
pub const GAP_THRESHOLD: u32 = 50;
/// Minimum column width; narrower strips are folded into a neighbor.
pub const MIN_COLUMN_WIDTH: u32 = 100;
pub const MIN_COLUMN_WIDTH_FRACTION: f32 = 0.10;
/// Columns are only searched for in this interior x-band of the page.
const INTERIOR_BAND: (f32, f32) = (0.20, 0.80);
const MAX_COLUMNS: usize = 3;

pub struct LayoutAnalyzer;

impl LayoutAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Split `page` into column strips, sorted by ascending x. Never fails:
    /// a page with no detectable columns yields a single full-page strip.
    #[tracing::instrument(skip(self, page), fields(page = page.page_index))]
    pub fn analyze(&self, page: &PageImage) -> Vec<ColumnStrip> {
        let gray = page.image.to_luma8();
        let width = page.width;
        let height = page.height;

        let mut separators = detect_vertical_separators(&gray);
        merge_nearby(&mut separators, MERGE_TOLERANCE);

        let interior_lo = (width as f32 * INTERIOR_BAND.0) as u32;
        let interior_hi = (width as f32 * INTERIOR_BAND.1) as u32;
        separators.retain(|&x| x >= interior_lo && x <= interior_hi);

        if separators.is_empty() {
            separators = content_gap_fallback(&gray, interior_lo, interior_hi);
        }

        let mut bounds = build_strip_bounds(&separators, width);
        let min_width = (width as f32 * MIN_COLUMN_WIDTH_FRACTION).max(MIN_COLUMN_WIDTH as f32) as u32;
        filter_narrow(&mut bounds, min_width);
        cap_columns(&mut bounds, MAX_COLUMNS);

        if bounds.is_empty() {
            bounds = vec![(0, width)];
        }

        bounds
            .into_iter()
            .enumerate()
            .map(|(idx, (x0, x1))| {
                let strip_width = x1 - x0;
                let cropped = page.image.crop_imm(x0, 0, strip_width, height);
                ColumnStrip {
                    page_index: page.page_index,
                    column_index: idx as u32,
                    page_x_offset: x0,
                    width: strip_width,
                    height,
                    image: cropped,
                }
            })
            .collect()
    }
}

impl Default for LayoutAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Detect candidate vertical separator lines via Canny edge detection
/// followed by a column-wise vote: an x-coordinate is a candidate if a tall,
/// near-vertical run of edge pixels spans most of the page height.
fn detect_vertical_separators(gray: &GrayImage) -> Vec<u32> {
    let edges = imageproc::edges::canny(gray, 40.0, 80.0);
    let (width, height) = edges.dimensions();
    let min_run = (height as f32 * 0.6) as u32;

    (0..width)
        .into_par_iter()
        .filter(|&x| {
            let mut run = 0u32;
            let mut best_run = 0u32;
            for y in 0..height {
                if edges.get_pixel(x, y).0[0] > 0 {
                    run += 1;
                    best_run = best_run.max(run);
                } else {
                    run = 0;
                }
            }
            best_run >= min_run
        })
        .collect()
}

/// Merge any two candidates whose x-coordinates differ by at most
/// `tolerance` into one at their mean. Candidates are assumed pre-sorted or
/// are sorted here first.
fn merge_nearby(candidates: &mut Vec<u32>, tolerance: u32) {
    candidates.sort_unstable();
    let mut merged: Vec<u32> = Vec::new();
    for &x in candidates.iter() {
        if let Some(&last) = merged.last() {
            if x.saturating_sub(last) <= tolerance {
                let idx = merged.len() - 1;
                merged[idx] = (last + x) / 2;
                continue;
            }
        }
        merged.push(x);
    }
    *candidates = merged;
}

/// Vertical projection profile: sum of dark pixels per column, smoothed with
/// a small moving average, then local-minima search for gaps wider than
/// `GAP_THRESHOLD` within the interior band.
fn content_gap_fallback(gray: &GrayImage, interior_lo: u32, interior_hi: u32) -> Vec<u32> {
    let (width, height) = gray.dimensions();
    const DARK_THRESHOLD: u8 = 128;

    let profile: Vec<u32> = (0..width)
        .into_par_iter()
        .map(|x| (0..height).filter(|&y| gray.get_pixel(x, y).0[0] < DARK_THRESHOLD).count() as u32)
        .collect();

    let smoothed = moving_average(&profile, 5);

    let mut gaps = Vec::new();
    let mut gap_start: Option<u32> = None;
    for x in interior_lo..interior_hi.min(width) {
        let is_gap = smoothed[x as usize] == 0;
        match (is_gap, gap_start) {
            (true, None) => gap_start = Some(x),
            (false, Some(start)) => {
                if x - start >= GAP_THRESHOLD {
                    gaps.push((start + x) / 2);
                }
                gap_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = gap_start {
        if interior_hi.min(width) - start >= GAP_THRESHOLD {
            gaps.push((start + interior_hi.min(width)) / 2);
        }
    }
    gaps
}

fn moving_average(values: &[u32], window: usize) -> Vec<u32> {
    let half = window / 2;
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            let sum: u64 = values[lo..hi].iter().map(|&v| v as u64).sum();
            (sum / (hi - lo) as u64) as u32
        })
        .collect()
}

/// Turn a sorted list of separator x-coordinates into `(x_start, x_end)`
/// pairs covering the full page width.
fn build_strip_bounds(separators: &[u32], width: u32) -> Vec<(u32, u32)> {
    let mut xs = vec![0u32];
    xs.extend(separators.iter().copied());
    xs.push(width);
    xs.dedup();
    xs.windows(2).map(|w| (w[0], w[1])).filter(|(a, b)| b > a).collect()
}

/// Drop strips narrower than `min_width`, merging their content into the
/// nearest surviving neighbor (preferring the neighbor to the left).
fn filter_narrow(bounds: &mut Vec<(u32, u32)>, min_width: u32) {
    if bounds.len() <= 1 {
        return;
    }
    let mut result: Vec<(u32, u32)> = Vec::with_capacity(bounds.len());
    for &(x0, x1) in bounds.iter() {
        let width = x1 - x0;
        if width < min_width {
            if let Some(last) = result.last_mut() {
                last.1 = x1;
                continue;
            }
        }
        result.push((x0, x1));
    }
    // A narrow strip with no left neighbor merges into its right neighbor.
    if result.len() > 1 {
        let (x0, x1) = result[0];
        if x1 - x0 < min_width {
            result[1].0 = x0;
            result.remove(0);
        }
    }
    *bounds = result;
}

/// Keep at most `max_columns` strips: the widest `max_columns`, merging the
/// rest into their nearest neighbor in x-order.
fn cap_columns(bounds: &mut Vec<(u32, u32)>, max_columns: usize) {
    if bounds.len() <= max_columns {
        return;
    }
    let mut indexed: Vec<(usize, u32)> =
        bounds.iter().enumerate().map(|(i, &(x0, x1))| (i, x1 - x0)).collect();
    indexed.sort_by_key(|&(_, w)| std::cmp::Reverse(w));
    let mut keep: Vec<usize> = indexed.into_iter().take(max_columns).map(|(i, _)| i).collect();
    keep.sort_unstable();

    let mut result = Vec::with_capacity(max_columns);
    let mut i = 0usize;
    while i < bounds.len() {
        if keep.contains(&i) {
            result.push(bounds[i]);
            i += 1;
        } else if let Some(last) = result.last_mut() {
            last.1 = bounds[i].1;
            i += 1;
        } else {
            result.push(bounds[i]);
            i += 1;
        }
    }
    *bounds = result;
}
