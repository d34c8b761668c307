//! Reciprocal-rank and weighted fusion across ranked retrieval strategies
//!

use std::collections::HashMap;

use crate::types::{FusedResult, RankedItem, SearchSource, SourceContribution};

/// Fuse one or more ranked lists by reciprocal rank: `Σ 1/(k+rank)` per
/// unique `content`, 1-based ranks within each list. With a single list the
/// fused score equals the original score so lone-source results aren't
/// distorted by RRF scaling
pub fn fuse_rrf(lists: &[Vec<RankedItem>], k: f64) -> Vec<FusedResult> {
    if lists.iter().filter(|l| !l.is_empty()).count() <= 1 {
        let Some(list) = lists.iter().find(|l| !l.is_empty()) else {
            return Vec::new();
        };
        let mut results: Vec<FusedResult> = list
            .iter()
            .enumerate()
            .map(|(idx, item)| FusedResult {
                entity_name: item.entity_name.clone(),
                entity_type: item.entity_type.clone(),
                content: item.content.clone(),
                fused_score: item.score,
                contributions: vec![SourceContribution {
                    source: item.source,
                    original_score: item.score,
                    rank: idx + 1,
                }],
            })
            .collect();
        results.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal));
        return results;
    }

    group_and_fuse(lists, |rank, _weight| 1.0 / (k + rank as f64))
}

/// Fuse by `Σ score * weight[source]` per unique content; a source missing
/// from `weights` defaults to 1.0
pub fn fuse_weighted(lists: &[Vec<RankedItem>], weights: &HashMap<SearchSource, f64>) -> Vec<FusedResult> {
    let mut results = group_and_fuse(lists, |_rank, score| score);
    for result in &mut results {
        result.fused_score = result
            .contributions
            .iter()
            .map(|c| c.original_score * weights.get(&c.source).copied().unwrap_or(1.0))
            .sum();
    }
    results.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal));
    results
}

fn group_and_fuse(
    lists: &[Vec<RankedItem>],
    contribution_value: impl Fn(usize, f64) -> f64,
) -> Vec<FusedResult> {
    struct Entry {
        entity_name: String,
        entity_type: String,
        content: String,
        fused_score: f64,
        contributions: Vec<SourceContribution>,
    }

    let mut grouped: HashMap<String, Entry> = HashMap::new();

    for list in lists {
        for (idx, item) in list.iter().enumerate() {
            let rank = idx + 1;
            let value = contribution_value(rank, item.score);
            let entry = grouped.entry(item.content.clone()).or_insert_with(|| Entry {
                entity_name: item.entity_name.clone(),
                entity_type: item.entity_type.clone(),
                content: item.content.clone(),
                fused_score: 0.0,
                contributions: Vec::new(),
            });
            entry.fused_score += value;
            entry.contributions.push(SourceContribution {
                source: item.source,
                original_score: item.score,
                rank,
            });
        }
    }

    let mut results: Vec<FusedResult> = grouped
        .into_values()
        .map(|e| FusedResult {
            entity_name: e.entity_name,
            entity_type: e.entity_type,
            content: e.content,
            fused_score: e.fused_score,
            contributions: e.contributions,
        })
        .collect();
    results.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal));
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(content: &str, score: f64, source: SearchSource) -> RankedItem {
        RankedItem {
            entity_name: "E".into(),
            entity_type: "t".into(),
            content: content.into(),
            score,
            source,
        }
    }

    #[test]
    fn single_list_passes_through_original_score() {
        let list = vec![item("a", 0.9, SearchSource::Fts), item("b", 0.5, SearchSource::Fts)];
        let fused = fuse_rrf(&[list], 60.0);
        assert_eq!(fused[0].content, "a");
        assert_eq!(fused[0].fused_score, 0.9);
    }

    #[test]
    fn rrf_boosts_items_ranked_well_in_both_lists() {
        let fts = vec![item("shared", 10.0, SearchSource::Fts), item("fts_only", 9.0, SearchSource::Fts)];
        let vector = vec![item("shared", 0.8, SearchSource::Vector), item("vec_only", 0.7, SearchSource::Vector)];
        let fused = fuse_rrf(&[fts, vector], 60.0);
        assert_eq!(fused[0].content, "shared");
        assert_eq!(fused[0].contributions.len(), 2);
    }

    #[test]
    fn empty_lists_yield_empty_result() {
        let fused = fuse_rrf(&[vec![], vec![]], 60.0);
        assert!(fused.is_empty());
    }

    #[test]
    fn weighted_fusion_applies_per_source_weight() {
        let fts = vec![item("a", 1.0, SearchSource::Fts)];
        let vector = vec![item("a", 1.0, SearchSource::Vector)];
        let mut weights = HashMap::new();
        weights.insert(SearchSource::Fts, 2.0);
        weights.insert(SearchSource::Vector, 0.5);
        let fused = fuse_weighted(&[fts, vector], &weights);
        assert!((fused[0].fused_score - 2.5).abs() < 1e-9);
    }
}
