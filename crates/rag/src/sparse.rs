//! Sparse BM25 index over content and metadata tokens
//!
//! An inverted index with IDF precomputed at build time. The token bag for
//! each chunk is its text plus file-name tokens and folder-path segments,
//! so lexical matches on metadata rank alongside content matches.
//!
//! Rebuilds happen behind a swap pointer: queries clone the current
//! snapshot Arc and are never served mid-rebuild. The index is persisted
//! as JSON with an atomic rename and loaded at startup.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use askfuze_core::{Chunk, ChunkMetadata};

use crate::tokenize::tokenize;
use crate::RagError;

/// BM25 term-frequency saturation
const K1: f32 = 1.2;
/// BM25 length normalization
const B: f32 = 0.75;

const INDEX_FILE: &str = "index.json";
const INDEX_TMP: &str = "index.json.tmp";

/// A sparse retrieval hit
#[derive(Debug, Clone)]
pub struct SparseHit {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Posting {
    doc: u32,
    tf: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDoc {
    id: String,
    text: String,
    metadata: ChunkMetadata,
}

/// One immutable build of the index
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    postings: HashMap<String, Vec<Posting>>,
    /// Precomputed at build time
    idf: HashMap<String, f32>,
    doc_lengths: Vec<u32>,
    avg_doc_length: f32,
    docs: Vec<StoredDoc>,
}

impl Snapshot {
    fn build(chunks: &[Chunk]) -> Self {
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut doc_lengths = Vec::with_capacity(chunks.len());
        let mut docs = Vec::with_capacity(chunks.len());

        for (doc_idx, chunk) in chunks.iter().enumerate() {
            let bag = Self::token_bag(chunk);
            doc_lengths.push(bag.len() as u32);

            let mut freqs: HashMap<&str, u32> = HashMap::new();
            for token in &bag {
                *freqs.entry(token.as_str()).or_insert(0) += 1;
            }
            for (token, tf) in freqs {
                postings.entry(token.to_string()).or_default().push(Posting {
                    doc: doc_idx as u32,
                    tf,
                });
            }

            docs.push(StoredDoc {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
            });
        }

        let n = chunks.len() as f32;
        let idf = postings
            .iter()
            .map(|(token, list)| {
                let df = list.len() as f32;
                (token.clone(), (1.0 + (n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();

        let avg_doc_length = if doc_lengths.is_empty() {
            0.0
        } else {
            doc_lengths.iter().sum::<u32>() as f32 / doc_lengths.len() as f32
        };

        Self {
            postings,
            idf,
            doc_lengths,
            avg_doc_length,
            docs,
        }
    }

    /// Content tokens plus metadata tokens for one chunk
    fn token_bag(chunk: &Chunk) -> Vec<String> {
        let mut bag = tokenize(&chunk.text);
        bag.extend(chunk.metadata.file_name_tokens());
        for segment in chunk.metadata.folder_segments() {
            bag.extend(tokenize(segment));
        }
        bag
    }

    fn score(&self, query_tokens: &[String], k: usize) -> Vec<(u32, f32)> {
        if self.docs.is_empty() {
            return Vec::new();
        }

        let mut scores: HashMap<u32, f32> = HashMap::new();
        for token in query_tokens {
            let (Some(list), Some(&idf)) = (self.postings.get(token), self.idf.get(token)) else {
                continue;
            };
            for posting in list {
                let len = self.doc_lengths[posting.doc as usize] as f32;
                let tf = posting.tf as f32;
                let norm = K1 * (1.0 - B + B * len / self.avg_doc_length.max(1.0));
                let contribution = idf * tf * (K1 + 1.0) / (tf + norm);
                *scores.entry(posting.doc).or_insert(0.0) += contribution;
            }
        }

        let mut ranked: Vec<(u32, f32)> = scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.docs[a.0 as usize].id.cmp(&self.docs[b.0 as usize].id))
        });
        ranked.truncate(k);
        ranked
    }
}

/// BM25 index with swap-pointer rebuilds and disk persistence
pub struct SparseIndex {
    current: RwLock<Arc<Snapshot>>,
    dir: PathBuf,
}

impl SparseIndex {
    /// Open the index directory, loading a persisted build when present
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, RagError> {
        let dir = dir.into();
        let path = dir.join(INDEX_FILE);

        let snapshot = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| RagError::Index(format!("read {}: {}", path.display(), e)))?;
            let snapshot: Snapshot = serde_json::from_str(&raw)
                .map_err(|e| RagError::Index(format!("parse {}: {}", path.display(), e)))?;
            tracing::info!(
                docs = snapshot.docs.len(),
                terms = snapshot.postings.len(),
                "Loaded sparse index from disk"
            );
            snapshot
        } else {
            tracing::info!(dir = %dir.display(), "No persisted sparse index, starting empty");
            Snapshot::default()
        };

        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            dir,
        })
    }

    /// Rebuild from the full chunk set, persist, then swap the pointer.
    ///
    /// In-flight queries keep scoring against the previous snapshot.
    pub fn rebuild(&self, chunks: &[Chunk]) -> Result<(), RagError> {
        let snapshot = Snapshot::build(chunks);
        self.persist(&snapshot)?;

        let docs = snapshot.docs.len();
        *self.current.write() = Arc::new(snapshot);
        tracing::info!(docs, "Sparse index rebuilt and swapped");
        Ok(())
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), RagError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| RagError::Index(format!("create {}: {}", self.dir.display(), e)))?;

        let tmp = self.dir.join(INDEX_TMP);
        let path = self.dir.join(INDEX_FILE);

        let raw = serde_json::to_string(snapshot)
            .map_err(|e| RagError::Index(format!("serialize index: {}", e)))?;
        fs::write(&tmp, raw)
            .map_err(|e| RagError::Index(format!("write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| RagError::Index(format!("rename to {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// BM25 query over the current snapshot
    ///
    /// CPU only; callers offload to a blocking worker when candidate sets
    /// are large.
    pub fn query(&self, text: &str, k: usize) -> Vec<SparseHit> {
        let snapshot = self.current.read().clone();
        let tokens = tokenize(text);

        snapshot
            .score(&tokens, k)
            .into_iter()
            .map(|(doc, score)| {
                let stored = &snapshot.docs[doc as usize];
                SparseHit {
                    chunk_id: stored.id.clone(),
                    text: stored.text.clone(),
                    metadata: stored.metadata.clone(),
                    score,
                }
            })
            .collect()
    }

    pub fn doc_count(&self) -> usize {
        self.current.read().docs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdMap;

    fn chunk(id: &str, text: &str, file_name: Option<&str>, folder: Option<&str>) -> Chunk {
        let mut map = StdMap::new();
        if let Some(f) = file_name {
            map.insert("file_name".to_string(), f.to_string());
        }
        if let Some(f) = folder {
            map.insert("folder_path".to_string(), f.to_string());
        }
        Chunk::new(id, text).with_metadata(ChunkMetadata::from_map(map))
    }

    fn sample_chunks() -> Vec<Chunk> {
        vec![
            chunk(
                "c1",
                "Slack conversations are exported as JSON files before the Teams migration begins.",
                Some("slack-json-export.pdf"),
                Some("guides/migration"),
            ),
            chunk(
                "c2",
                "SharePoint document libraries keep version history during migration.",
                Some("sharepoint-versions.docx"),
                Some("guides/sharepoint"),
            ),
            chunk(
                "c3",
                "Gold prices fluctuate daily in the commodities market.",
                None,
                None,
            ),
        ]
    }

    #[test]
    fn test_query_ranks_lexical_match_first() {
        let tmp = tempfile::tempdir().unwrap();
        let index = SparseIndex::open(tmp.path()).unwrap();
        index.rebuild(&sample_chunks()).unwrap();

        let hits = index.query("slack json export", 10);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk_id, "c1");
    }

    #[test]
    fn test_metadata_tokens_are_searchable() {
        let tmp = tempfile::tempdir().unwrap();
        let index = SparseIndex::open(tmp.path()).unwrap();
        index.rebuild(&sample_chunks()).unwrap();

        // "sharepoint" appears in c2's text, file name and folder path
        let hits = index.query("sharepoint", 10);
        assert_eq!(hits[0].chunk_id, "c2");
    }

    #[test]
    fn test_no_match_returns_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let index = SparseIndex::open(tmp.path()).unwrap();
        index.rebuild(&sample_chunks()).unwrap();

        assert!(index.query("quantum chromodynamics", 10).is_empty());
        assert!(index.query("", 10).is_empty());
    }

    #[test]
    fn test_persistence_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let index = SparseIndex::open(tmp.path()).unwrap();
            index.rebuild(&sample_chunks()).unwrap();
        }

        let reloaded = SparseIndex::open(tmp.path()).unwrap();
        assert_eq!(reloaded.doc_count(), 3);
        let hits = reloaded.query("slack json", 10);
        assert_eq!(hits[0].chunk_id, "c1");
    }

    #[test]
    fn test_rebuild_swaps_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let index = SparseIndex::open(tmp.path()).unwrap();
        index.rebuild(&sample_chunks()).unwrap();
        assert_eq!(index.doc_count(), 3);

        index
            .rebuild(&[chunk("only", "a single migration document", None, None)])
            .unwrap();
        assert_eq!(index.doc_count(), 1);
        assert!(index.query("slack", 10).is_empty());
    }

    #[test]
    fn test_empty_index_query() {
        let tmp = tempfile::tempdir().unwrap();
        let index = SparseIndex::open(tmp.path()).unwrap();
        assert_eq!(index.doc_count(), 0);
        assert!(index.query("anything", 10).is_empty());
    }

    #[test]
    fn test_deterministic_tie_break() {
        let tmp = tempfile::tempdir().unwrap();
        let index = SparseIndex::open(tmp.path()).unwrap();
        index
            .rebuild(&[
                chunk("b", "migration checklist", None, None),
                chunk("a", "migration checklist", None, None),
            ])
            .unwrap();

        let hits = index.query("migration", 10);
        assert_eq!(hits.len(), 2);
        // Equal scores break ties by chunk id
        assert_eq!(hits[0].chunk_id, "a");
        assert_eq!(hits[1].chunk_id, "b");
    }
}
