//! Retrieval candidate and citation types

use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkMetadata, SourceType};

/// A chunk returned by a single retrieval stage with its raw score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// Per-candidate record carried through fusion, boosting and reranking
///
/// `final_score` is deterministic given the inputs and configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Raw dense similarity, None when the chunk came from sparse only
    pub dense_score: Option<f32>,
    /// Raw BM25 score, None when the chunk came from dense only
    pub sparse_score: Option<f32>,
    /// Raw cross-encoder score when reranking ran
    pub rerank_score: Option<f32>,
    /// Multiplicative boost applied to the fused score
    pub boost: f32,
    pub final_score: f32,
    /// Human-readable boost explanations
    pub reasons: Vec<String>,
}

impl Candidate {
    pub fn from_scored(chunk: ScoredChunk, dense: Option<f32>, sparse: Option<f32>) -> Self {
        Self {
            chunk_id: chunk.chunk_id,
            text: chunk.text,
            metadata: chunk.metadata,
            dense_score: dense,
            sparse_score: sparse,
            rerank_score: None,
            boost: 1.0,
            final_score: 0.0,
            reasons: Vec::new(),
        }
    }
}

/// Source attribution surfaced to the user alongside an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub source_type: SourceType,
}

impl Citation {
    /// Build a citation from candidate metadata. Returns None when the
    /// chunk carries no user-presentable name. Internal tags are never
    /// exposed; the url is only the public download link when one exists.
    pub fn from_metadata(metadata: &ChunkMetadata) -> Option<Self> {
        let file_name = metadata.file_name.clone()?;
        let source_type = metadata.source_type?;
        let url = if metadata.is_downloadable {
            metadata.download_url.clone()
        } else {
            None
        };
        Some(Self {
            file_name,
            url,
            source_type,
        })
    }
}
