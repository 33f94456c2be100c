//! Reciprocal Rank Fusion.
//!
//! A document at 0-based rank `r` of one list earns `1 / (r + k)`; earnings
//! are summed per id across both lists. The merged order is a stable sort of
//! "vector list, then keyword list" by summed score, so ties keep list order.

use std::collections::{HashMap, HashSet};

use zipsa_core::types::{DocId, Document, RankedResult, ScoreType};

pub const DEFAULT_K: u32 = 60;

#[derive(Default, Clone, Copy)]
struct Provenance {
    score: f64,
    in_vector: bool,
    in_keyword: bool,
}

pub fn fuse(vector_results: Vec<Document>, keyword_results: Vec<Document>, limit: usize, k: u32) -> Vec<RankedResult> {
    let mut acc: HashMap<DocId, Provenance> = HashMap::new();
    accumulate(&vector_results, k, &mut acc, |p| p.in_vector = true);
    accumulate(&keyword_results, k, &mut acc, |p| p.in_keyword = true);

    let mut all: Vec<Document> = vector_results;
    all.extend(keyword_results);
    let score_of = |doc: &Document| acc.get(&doc.id).map_or(0.0, |p| p.score);
    // Vec::sort_by is stable
    all.sort_by(|a, b| score_of(b).total_cmp(&score_of(a)));

    let mut seen: HashSet<DocId> = HashSet::new();
    let mut merged = Vec::with_capacity(limit.min(all.len()));
    for document in all {
        if merged.len() == limit {
            break;
        }
        if !seen.insert(document.id.clone()) {
            continue;
        }
        let p = acc.get(&document.id).copied().unwrap_or_default();
        let score_type = match (p.in_vector, p.in_keyword) {
            (true, true) => ScoreType::Fused,
            (true, false) => ScoreType::Vector,
            _ => ScoreType::Keyword,
        };
        merged.push(RankedResult { document, fusion_score: p.score, score_type });
    }
    merged
}

fn accumulate(list: &[Document], k: u32, acc: &mut HashMap<DocId, Provenance>, mark: impl Fn(&mut Provenance)) {
    let mut seen_here: HashSet<&str> = HashSet::new();
    for (rank, doc) in list.iter().enumerate() {
        // Repeats inside one list only count at their best rank.
        if !seen_here.insert(doc.id.as_str()) {
            continue;
        }
        let entry = acc.entry(doc.id.clone()).or_default();
        entry.score += 1.0 / (rank as f64 + f64::from(k));
        mark(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(ids: &[&str]) -> Vec<Document> {
        ids.iter().map(|id| Document::new(*id, format!("doc {id}"))).collect()
    }

    fn ids(results: &[RankedResult]) -> Vec<&str> {
        results.iter().map(|r| r.document.id.as_str()).collect()
    }

    #[test]
    fn rrf_example_scores_and_order() {
        let fused = fuse(docs(&["A", "B", "C"]), docs(&["B", "D"]), 10, DEFAULT_K);
        assert_eq!(ids(&fused), vec!["B", "A", "D", "C"]);
        let expected = [1.0 / 60.0 + 1.0 / 61.0, 1.0 / 60.0, 1.0 / 61.0, 1.0 / 62.0];
        for (r, want) in fused.iter().zip(expected) {
            assert!((r.fusion_score - want).abs() < 1e-12, "{} scored {}", r.document.id, r.fusion_score);
        }
        let types: Vec<ScoreType> = fused.iter().map(|r| r.score_type).collect();
        assert_eq!(types, vec![ScoreType::Fused, ScoreType::Vector, ScoreType::Keyword, ScoreType::Vector]);
    }

    #[test]
    fn shared_documents_appear_once() {
        let fused = fuse(docs(&["A", "B"]), docs(&["B", "A"]), 10, DEFAULT_K);
        assert_eq!(fused.len(), 2);
        assert!(fused.iter().all(|r| r.score_type == ScoreType::Fused));
    }

    #[test]
    fn empty_inputs() {
        assert!(fuse(Vec::new(), Vec::new(), 5, DEFAULT_K).is_empty());

        let keyword_only = fuse(Vec::new(), docs(&["X", "Y"]), 5, DEFAULT_K);
        assert_eq!(ids(&keyword_only), vec!["X", "Y"]);
        assert!((keyword_only[1].fusion_score - 1.0 / 61.0).abs() < 1e-12);

        let vector_only = fuse(docs(&["P", "Q"]), Vec::new(), 5, DEFAULT_K);
        assert_eq!(ids(&vector_only), vec!["P", "Q"]);
        assert_eq!(vector_only[0].score_type, ScoreType::Vector);
    }

    #[test]
    fn ties_keep_vector_list_first() {
        let fused = fuse(docs(&["V"]), docs(&["K"]), 5, DEFAULT_K);
        assert_eq!(ids(&fused), vec!["V", "K"]);
    }

    #[test]
    fn output_is_truncated() {
        let fused = fuse(docs(&["A", "B", "C", "D"]), docs(&["E", "F", "G"]), 3, DEFAULT_K);
        assert_eq!(ids(&fused), vec!["A", "E", "B"]);
        assert!(fuse(docs(&["A"]), Vec::new(), 0, DEFAULT_K).is_empty());
    }

    #[test]
    fn repeats_within_one_list_count_once() {
        let fused = fuse(docs(&["A", "A", "B"]), Vec::new(), 5, DEFAULT_K);
        assert_eq!(ids(&fused), vec!["A", "B"]);
        assert!((fused[0].fusion_score - 1.0 / 60.0).abs() < 1e-12);
        assert!((fused[1].fusion_score - 1.0 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn smaller_k_sharpens_rank_differences() {
        let fused = fuse(docs(&["A", "B"]), Vec::new(), 5, 1);
        assert!((fused[0].fusion_score - 1.0).abs() < 1e-12);
        assert!((fused[1].fusion_score - 0.5).abs() < 1e-12);
    }
}
