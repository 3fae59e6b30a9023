//! Weighted Reciprocal Rank Fusion.
//!
//! Combines ranked hit lists from different retrievers into one ranking:
//! `score(x) = sum(weight_i / (k + rank_i(x)))`. Hits are keyed by
//! (file id, page number); the first-seen hit for a key is kept. Ties are
//! broken by (file id, page) ascending so fusion output is deterministic.

use std::collections::HashMap;

use crate::models::SearchResult;

/// Default RRF rank constant from the literature.
pub const DEFAULT_RRF_K: u32 = 60;

/// Fuses multiple ranked lists with per-list weights.
///
/// Lists beyond the weights slice fall back to weight 1.0. Empty lists
/// contribute nothing. Returns at most `limit` fused hits, scores replaced
/// by the fused RRF score.
#[must_use]
pub fn weighted_rrf_fusion(
    result_lists: &[Vec<SearchResult>],
    weights: &[f64],
    k: u32,
    limit: usize,
) -> Vec<SearchResult> {
    if result_lists.is_empty() {
        return Vec::new();
    }

    let mut scores: HashMap<(i64, u32), f64> = HashMap::new();
    let mut first_seen: HashMap<(i64, u32), SearchResult> = HashMap::new();

    for (list_idx, results) in result_lists.iter().enumerate() {
        let weight = weights.get(list_idx).copied().unwrap_or(1.0);
        for (rank, result) in results.iter().enumerate() {
            let key = (result.file_id, result.page_number);
            let rrf_score = weight / f64::from(k + (rank as u32) + 1);
            *scores.entry(key).or_insert(0.0) += rrf_score;
            first_seen.entry(key).or_insert_with(|| result.clone());
        }
    }

    let mut keys: Vec<(i64, u32)> = scores.keys().copied().collect();
    keys.sort_by(|a, b| {
        let sa = scores[a];
        let sb = scores[b];
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
            .then_with(|| a.1.cmp(&b.1))
    });

    keys.into_iter()
        .take(limit)
        .filter_map(|key| {
            first_seen.remove(&key).map(|mut result| {
                result.score = scores[&key];
                result
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(file_id: i64, page: u32) -> SearchResult {
        SearchResult {
            file_id,
            file_path: format!("/tmp/{file_id}.pdf"),
            filename: format!("{file_id}.pdf"),
            page_number: page,
            snippet: String::new(),
            score: 0.0,
        }
    }

    #[test]
    fn test_single_list_single_hit() {
        let fused = weighted_rrf_fusion(&[vec![hit(1, 1)]], &[1.5], 60, 10);
        assert_eq!(fused.len(), 1);
        // Weight w at rank 1: w / (k + 1)
        let expected = 1.5 / 61.0;
        assert!((fused[0].score - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scores_add_across_lists() {
        let fused = weighted_rrf_fusion(
            &[vec![hit(1, 1)], vec![hit(1, 1)]],
            &[1.0, 1.0],
            60,
            10,
        );
        assert_eq!(fused.len(), 1);
        let expected = 2.0 / 61.0;
        assert!((fused[0].score - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_weight_changes_order() {
        let fused = weighted_rrf_fusion(
            &[vec![hit(1, 1), hit(2, 1)], vec![hit(2, 1), hit(1, 1)]],
            &[2.0, 1.0],
            60,
            10,
        );
        // File 1 leads the double-weighted list
        assert_eq!(fused[0].file_id, 1);
    }

    #[test]
    fn test_dedup_keeps_first_seen() {
        let mut a = hit(1, 1);
        a.snippet = "first".to_string();
        let mut b = hit(1, 1);
        b.snippet = "second".to_string();

        let fused = weighted_rrf_fusion(&[vec![a], vec![b]], &[1.0, 1.0], 60, 10);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].snippet, "first");
    }

    #[test]
    fn test_deterministic_tiebreak() {
        // Same rank in equal-weight lists: tie broken by file id then page
        let fused = weighted_rrf_fusion(
            &[vec![hit(2, 5)], vec![hit(1, 9)]],
            &[1.0, 1.0],
            60,
            10,
        );
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].file_id, 1);
        assert_eq!(fused[1].file_id, 2);
    }

    #[test]
    fn test_limit_respected() {
        let list: Vec<SearchResult> = (1..=20).map(|i| hit(i, 1)).collect();
        let fused = weighted_rrf_fusion(&[list], &[1.0], 60, 5);
        assert_eq!(fused.len(), 5);
    }

    #[test]
    fn test_empty_input() {
        assert!(weighted_rrf_fusion(&[], &[], 60, 10).is_empty());
        assert!(weighted_rrf_fusion(&[vec![]], &[1.0], 60, 10).is_empty());
    }

    #[test]
    fn test_missing_weights_default_to_one() {
        let fused = weighted_rrf_fusion(&[vec![hit(1, 1)], vec![hit(2, 1)]], &[2.0], 60, 10);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].file_id, 1);
    }

    proptest::proptest! {
        #[test]
        fn prop_fused_scores_descending(
            pages in proptest::collection::vec(1u32..50, 0..20),
        ) {
            let list: Vec<SearchResult> = pages.iter().map(|p| hit(1, *p)).collect();
            let fused = weighted_rrf_fusion(&[list], &[1.0], 60, 100);
            for pair in fused.windows(2) {
                proptest::prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
