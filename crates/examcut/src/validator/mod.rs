//! Validator: a pure function from detected problem numbers to a diagnosis
//! that drives the orchestrator's retry and fallback decisions.

use crate::types::{Diagnosis, DiagnosisStatus, JobConfig};
use std::collections::HashSet;

/// Compute the expected set used when `config.expected_problem_count` is not
/// set: the contiguous span `{min(D)..max(D)}` (clipped to `[MIN, MAX]`).
///
/// Numbering is continuous across a job rather than restarting in every
/// column (a later column may legitimately detect only 5, 6, 7, 8), so the
/// span is anchored at the column's own minimum rather than always at 1.
/// Anchoring at 1 would flag every column after the first as missing its
/// predecessors' numbers.
pub fn infer_expected_set(detected: &[u32], config: &JobConfig) -> HashSet<u32> {
    if let Some(count) = config.expected_problem_count {
        return (JobConfig::MIN_PROBLEM_NUMBER..=count.min(JobConfig::MAX_PROBLEM_NUMBER)).collect();
    }
    let Some(min) = detected.iter().copied().min() else { return HashSet::new() };
    let max = detected.iter().copied().max().unwrap_or(min).min(JobConfig::MAX_PROBLEM_NUMBER);
    let min = min.max(JobConfig::MIN_PROBLEM_NUMBER);
    if max < min {
        return HashSet::new();
    }
    (min..=max).collect()
}

/// Diagnose `detected` (in column-y order, duplicates permitted) against
/// `expected`.
pub fn validate(detected_in_order: &[u32], expected: &HashSet<u32>) -> Diagnosis {
    let detected_set: HashSet<u32> = detected_in_order.iter().copied().collect();

    let mut missing: Vec<u32> = expected.difference(&detected_set).copied().collect();
    missing.sort_unstable();

    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for &n in detected_in_order {
        if !seen.insert(n) && !duplicates.contains(&n) {
            duplicates.push(n);
        }
    }
    duplicates.sort_unstable();

    let out_of_order = detected_in_order.windows(2).any(|w| w[0] >= w[1]);

    let status = if missing.is_empty() && duplicates.is_empty() && !out_of_order {
        DiagnosisStatus::Ok
    } else if !missing.is_empty() && duplicates.is_empty() {
        DiagnosisStatus::Missing
    } else if missing.is_empty() && !duplicates.is_empty() {
        DiagnosisStatus::Duplicate
    } else {
        DiagnosisStatus::Mixed
    };

    Diagnosis { status, missing, duplicates, out_of_order }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_when_nothing_missing() {
        let expected: HashSet<u32> = (1..=4).collect();
        let diagnosis = validate(&[1, 2, 3, 4], &expected);
        assert_eq!(diagnosis.status, DiagnosisStatus::Ok);
        assert!(diagnosis.missing.is_empty());
    }

    #[test]
    fn missing_middle_problem() {
        let expected: HashSet<u32> = (1..=6).collect();
        let diagnosis = validate(&[1, 2, 5, 6], &expected);
        assert_eq!(diagnosis.status, DiagnosisStatus::Missing);
        assert_eq!(diagnosis.missing, vec![3, 4]);
    }

    #[test]
    fn duplicate_detected() {
        let expected: HashSet<u32> = (1..=3).collect();
        let diagnosis = validate(&[1, 2, 2, 3], &expected);
        assert_eq!(diagnosis.status, DiagnosisStatus::Duplicate);
        assert_eq!(diagnosis.duplicates, vec![2]);
    }

    #[test]
    fn out_of_order_is_flagged_but_not_fatal_alone() {
        let expected: HashSet<u32> = (1..=3).collect();
        let diagnosis = validate(&[1, 3, 2], &expected);
        assert!(diagnosis.out_of_order);
    }

    #[test]
    fn infer_expected_set_uses_max_detected() {
        let config = JobConfig::default();
        let expected = infer_expected_set(&[1, 2, 5], &config);
        assert_eq!(expected, (1..=5).collect());
    }

    #[test]
    fn infer_expected_set_empty_when_no_detections() {
        let config = JobConfig::default();
        let expected = infer_expected_set(&[], &config);
        assert!(expected.is_empty());
    }

    #[test]
    fn infer_expected_set_does_not_anchor_later_columns_at_one() {
        // A right-hand column whose numbering continues from a prior column
        // (5, 6, 7, 8) must not be diagnosed as missing 1-4.
        let config = JobConfig::default();
        let expected = infer_expected_set(&[5, 6, 7, 8], &config);
        assert_eq!(expected, (5..=8).collect());
        let diagnosis = validate(&[5, 6, 7, 8], &expected);
        assert_eq!(diagnosis.status, DiagnosisStatus::Ok);
    }
}
