//! Score fusion and metadata boosting
//!
//! The decision layer that determines which chunks reach the LLM. Dense
//! and sparse scores are min-max normalized per list, combined with
//! configured weights, then adjusted by multiplicative metadata boosts.
//! Everything here is pure: identical inputs yield identical ordering.

use chrono::{DateTime, Utc};

use askfuze_core::{Candidate, DetectedTerm, ScoredChunk, SourceType};

use crate::sparse::SparseHit;

/// Fusion and boost parameters
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Weight on normalized dense scores
    pub alpha_dense: f32,
    /// Weight on normalized sparse scores
    pub beta_sparse: f32,
    /// Lower clamp on the combined boost multiplier
    pub boost_floor: f32,
    /// Upper clamp on the combined boost multiplier
    pub boost_ceiling: f32,
    pub recency_soft_months: u32,
    pub recency_hard_months: u32,
    /// Candidates kept after fusion
    pub k_fused: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            alpha_dense: 0.7,
            beta_sparse: 0.3,
            boost_floor: 0.5,
            boost_ceiling: 1.75,
            recency_soft_months: 24,
            recency_hard_months: 48,
            k_fused: 50,
        }
    }
}

impl From<&askfuze_config::RetrievalConfig> for FusionConfig {
    fn from(config: &askfuze_config::RetrievalConfig) -> Self {
        Self {
            alpha_dense: config.alpha_dense,
            beta_sparse: config.beta_sparse,
            boost_floor: config.boost_floor,
            boost_ceiling: config.boost_ceiling,
            recency_soft_months: config.recency_soft_months,
            recency_hard_months: config.recency_hard_months,
            k_fused: config.fuse_k,
        }
    }
}

/// Min-max normalization to [0, 1]
///
/// When max == min the whole list maps to zero: collapsing ties to 1.0
/// would erase the ranking and let every candidate through at full score.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let min = scores.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if (max - min).abs() < f32::EPSILON {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// Fuse dense and sparse lists and apply metadata boosts
///
/// Chunks present in only one list contribute zero for the missing score.
/// Ranking is by final score descending with chunk id as the tie-break.
pub fn fuse_and_boost(
    dense: &[ScoredChunk],
    sparse: &[SparseHit],
    terms: &[DetectedTerm],
    now: DateTime<Utc>,
    config: &FusionConfig,
) -> Vec<Candidate> {
    let dense_norm = min_max_normalize(&dense.iter().map(|c| c.score).collect::<Vec<_>>());
    let sparse_norm = min_max_normalize(&sparse.iter().map(|h| h.score).collect::<Vec<_>>());

    let mut by_id: std::collections::HashMap<String, (Candidate, f32, f32)> =
        std::collections::HashMap::new();

    for (chunk, &norm) in dense.iter().zip(dense_norm.iter()) {
        by_id.insert(
            chunk.chunk_id.clone(),
            (
                Candidate::from_scored(chunk.clone(), Some(chunk.score), None),
                norm,
                0.0,
            ),
        );
    }

    for (hit, &norm) in sparse.iter().zip(sparse_norm.iter()) {
        match by_id.get_mut(&hit.chunk_id) {
            Some((candidate, _, sparse_part)) => {
                candidate.sparse_score = Some(hit.score);
                *sparse_part = norm;
            }
            None => {
                let scored = ScoredChunk {
                    chunk_id: hit.chunk_id.clone(),
                    text: hit.text.clone(),
                    metadata: hit.metadata.clone(),
                    score: hit.score,
                };
                by_id.insert(
                    hit.chunk_id.clone(),
                    (
                        Candidate::from_scored(scored, None, Some(hit.score)),
                        0.0,
                        norm,
                    ),
                );
            }
        }
    }

    let mut candidates: Vec<Candidate> = by_id
        .into_values()
        .map(|(mut candidate, dense_part, sparse_part)| {
            let fused = config.alpha_dense * dense_part + config.beta_sparse * sparse_part;
            let (boost, reasons) = compute_boost(&candidate, terms, now, config);
            candidate.boost = boost;
            candidate.reasons = reasons;
            candidate.final_score = fused * boost;
            candidate
        })
        .collect();

    // Boost is the secondary key so that when every raw score ties (all
    // fused scores zero) the boosts alone still determine the ordering
    candidates.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.boost
                    .partial_cmp(&a.boost)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    candidates.truncate(config.k_fused);
    candidates
}

/// Combined boost multiplier and its explanations for one candidate
fn compute_boost(
    candidate: &Candidate,
    terms: &[DetectedTerm],
    now: DateTime<Utc>,
    config: &FusionConfig,
) -> (f32, Vec<String>) {
    let mut boost = 1.0f32;
    let mut reasons = Vec::new();
    let meta = &candidate.metadata;

    // Authoritative first-party documentation outranks marketing content
    if let Some(source_type) = meta.source_type {
        let multiplier: f32 = match source_type {
            SourceType::Document => 1.15,
            SourceType::Page => 1.10,
            SourceType::Email => 1.05,
            SourceType::Blog => 1.00,
        };
        if (multiplier - 1.0).abs() > f32::EPSILON {
            boost *= multiplier;
            reasons.push(format!("source type {} x{:.2}", source_type, multiplier));
        }
    }

    if let Some(file_name) = meta.file_name.as_deref() {
        let lower = file_name.to_lowercase();
        let matched = terms.iter().filter(|t| lower.contains(&t.text)).count();
        if matched >= 2 {
            boost *= 1.25;
            reasons.push(format!("file name matches {} detected terms x1.25", matched));
        }
    }

    let segments: Vec<String> = meta
        .folder_segments()
        .iter()
        .map(|s| s.to_lowercase())
        .collect();
    if !segments.is_empty() {
        if let Some(term) = terms
            .iter()
            .find(|t| segments.iter().any(|seg| seg.contains(&t.text)))
        {
            boost *= 1.10;
            reasons.push(format!("folder path matches term '{}' x1.10", term.text));
        }
    }

    if let Some(modified_at) = meta.modified_at {
        let age_days = (now - modified_at).num_days();
        let soft = i64::from(config.recency_soft_months) * 30;
        let hard = i64::from(config.recency_hard_months) * 30;
        if age_days > hard {
            boost *= 0.93;
            reasons.push(format!(
                "older than {} months x0.93",
                config.recency_hard_months
            ));
        } else if age_days > soft {
            boost *= 0.97;
            reasons.push(format!(
                "older than {} months x0.97",
                config.recency_soft_months
            ));
        }
    }

    let clamped = boost.clamp(config.boost_floor, config.boost_ceiling);
    if (clamped - boost).abs() > f32::EPSILON {
        reasons.push(format!("multiplier clamped to {:.2}", clamped));
    }
    (clamped, reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use askfuze_core::ChunkMetadata;
    use chrono::Duration;
    use std::collections::HashMap;

    fn scored(id: &str, score: f32, meta: ChunkMetadata) -> ScoredChunk {
        ScoredChunk {
            chunk_id: id.to_string(),
            text: format!("text for {}", id),
            metadata: meta,
            score,
        }
    }

    fn hit(id: &str, score: f32) -> SparseHit {
        SparseHit {
            chunk_id: id.to_string(),
            text: format!("text for {}", id),
            metadata: ChunkMetadata::default(),
            score,
        }
    }

    fn meta(entries: &[(&str, &str)]) -> ChunkMetadata {
        let map: HashMap<String, String> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ChunkMetadata::from_map(map)
    }

    #[test]
    fn test_normalize_preserves_order() {
        let normalized = min_max_normalize(&[0.2, 0.9, 0.5]);
        assert!(normalized[1] > normalized[2]);
        assert!(normalized[2] > normalized[0]);
        assert!((normalized[1] - 1.0).abs() < f32::EPSILON);
        assert!(normalized[0].abs() < f32::EPSILON);
    }

    #[test]
    fn test_normalize_ties_go_to_zero() {
        // All-equal raw scores must not collapse to 1.0
        let normalized = min_max_normalize(&[0.7, 0.7, 0.7]);
        assert!(normalized.iter().all(|v| v.abs() < f32::EPSILON));
    }

    #[test]
    fn test_chunk_in_both_lists_outranks_single_list() {
        let config = FusionConfig::default();
        let dense = vec![
            scored("both", 0.9, ChunkMetadata::default()),
            scored("dense_only", 0.95, ChunkMetadata::default()),
            scored("low", 0.1, ChunkMetadata::default()),
        ];
        let sparse = vec![hit("both", 12.0), hit("sparse_only", 8.0), hit("weak", 1.0)];

        let fused = fuse_and_boost(&dense, &sparse, &[], Utc::now(), &config);
        assert_eq!(fused[0].chunk_id, "both");
        assert!(fused[0].dense_score.is_some());
        assert!(fused[0].sparse_score.is_some());
    }

    #[test]
    fn test_source_type_boost_with_reason() {
        let config = FusionConfig::default();
        let dense = vec![
            scored("doc", 0.8, meta(&[("source_type", "document")])),
            scored("blog", 0.8, meta(&[("source_type", "blog")])),
            scored("floor", 0.0, ChunkMetadata::default()),
        ];

        let fused = fuse_and_boost(&dense, &[], &[], Utc::now(), &config);
        let doc = fused.iter().find(|c| c.chunk_id == "doc").unwrap();
        let blog = fused.iter().find(|c| c.chunk_id == "blog").unwrap();

        assert!(doc.final_score > blog.final_score);
        assert!((doc.boost - 1.15).abs() < 1e-6);
        assert!(doc.reasons.iter().any(|r| r.contains("document")));
        assert!(blog.reasons.is_empty());
    }

    #[test]
    fn test_filename_boost_needs_two_terms() {
        let config = FusionConfig::default();
        let terms = vec![
            DetectedTerm::new("slack", 2.5),
            DetectedTerm::new("json", 2.6),
        ];
        let dense = vec![
            scored("two", 0.5, meta(&[("file_name", "slack-json-export.pdf")])),
            scored("one", 0.5, meta(&[("file_name", "slack-overview.pdf")])),
            scored("none", 0.1, ChunkMetadata::default()),
        ];

        let fused = fuse_and_boost(&dense, &[], &terms, Utc::now(), &config);
        let two = fused.iter().find(|c| c.chunk_id == "two").unwrap();
        let one = fused.iter().find(|c| c.chunk_id == "one").unwrap();

        assert!((two.boost - 1.25).abs() < 1e-6);
        assert!((one.boost - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_folder_boost_single_term() {
        let config = FusionConfig::default();
        let terms = vec![DetectedTerm::new("migration", 2.4)];
        let dense = vec![
            scored("in", 0.5, meta(&[("folder_path", "guides/migration")])),
            scored("out", 0.5, meta(&[("folder_path", "guides/billing")])),
            scored("zero", 0.0, ChunkMetadata::default()),
        ];

        let fused = fuse_and_boost(&dense, &[], &terms, Utc::now(), &config);
        let matched = fused.iter().find(|c| c.chunk_id == "in").unwrap();
        assert!((matched.boost - 1.10).abs() < 1e-6);
        assert!(matched.reasons.iter().any(|r| r.contains("migration")));
    }

    #[test]
    fn test_recency_decay() {
        let config = FusionConfig::default();
        let now = Utc::now();
        let old = (now - Duration::days(30 * 30)).to_rfc3339();
        let ancient = (now - Duration::days(50 * 30)).to_rfc3339();

        let dense = vec![
            scored("fresh", 0.5, ChunkMetadata::default()),
            scored("old", 0.5, meta(&[("modified_at", old.as_str())])),
            scored("ancient", 0.5, meta(&[("modified_at", ancient.as_str())])),
            scored("zero", 0.0, ChunkMetadata::default()),
        ];

        let fused = fuse_and_boost(&dense, &[], &[], now, &config);
        let get = |id: &str| fused.iter().find(|c| c.chunk_id == id).unwrap().boost;
        assert!((get("fresh") - 1.0).abs() < 1e-6);
        assert!((get("old") - 0.97).abs() < 1e-6);
        assert!((get("ancient") - 0.93).abs() < 1e-6);
    }

    #[test]
    fn test_boost_ceiling_clamped() {
        let config = FusionConfig {
            boost_ceiling: 1.2,
            ..Default::default()
        };
        let terms = vec![
            DetectedTerm::new("slack", 2.5),
            DetectedTerm::new("json", 2.6),
        ];
        // document (1.15) * filename (1.25) * folder (1.10) > 1.2 ceiling
        let dense = vec![
            scored(
                "stacked",
                0.9,
                meta(&[
                    ("source_type", "document"),
                    ("file_name", "slack-json.pdf"),
                    ("folder_path", "kb/slack"),
                ]),
            ),
            scored("plain", 0.1, ChunkMetadata::default()),
        ];

        let fused = fuse_and_boost(&dense, &[], &terms, Utc::now(), &config);
        let stacked = fused.iter().find(|c| c.chunk_id == "stacked").unwrap();
        assert!((stacked.boost - 1.2).abs() < 1e-6);
        assert!(stacked.reasons.iter().any(|r| r.contains("clamped")));
    }

    #[test]
    fn test_all_tied_scores_rank_by_boost_alone() {
        let config = FusionConfig::default();
        let dense = vec![
            scored("blog", 0.5, meta(&[("source_type", "blog")])),
            scored("doc", 0.5, meta(&[("source_type", "document")])),
        ];

        // Tied raw scores normalize to zero (never 1.0) and the boost
        // becomes the ranking key
        let fused = fuse_and_boost(&dense, &[], &[], Utc::now(), &config);
        assert!(fused.iter().all(|c| c.final_score.abs() < f32::EPSILON));
        assert_eq!(fused[0].chunk_id, "doc");
        assert_eq!(fused[1].chunk_id, "blog");
    }

    #[test]
    fn test_determinism() {
        let config = FusionConfig::default();
        let terms = vec![DetectedTerm::new("slack", 2.5)];
        let dense = vec![
            scored("a", 0.9, meta(&[("source_type", "document")])),
            scored("b", 0.7, ChunkMetadata::default()),
        ];
        let sparse = vec![hit("b", 4.0), hit("c", 2.0)];

        let first = fuse_and_boost(&dense, &sparse, &terms, Utc::now(), &config);
        let second = fuse_and_boost(&dense, &sparse, &terms, Utc::now(), &config);
        let ids = |v: &[Candidate]| v.iter().map(|c| c.chunk_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_k_fused_truncation() {
        let config = FusionConfig {
            k_fused: 2,
            ..Default::default()
        };
        let dense = vec![
            scored("a", 0.9, ChunkMetadata::default()),
            scored("b", 0.5, ChunkMetadata::default()),
            scored("c", 0.1, ChunkMetadata::default()),
        ];
        let fused = fuse_and_boost(&dense, &[], &[], Utc::now(), &config);
        assert_eq!(fused.len(), 2);
    }
}
