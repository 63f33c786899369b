//! Chunk and metadata types for the knowledge store
//!
//! A chunk is the atomic unit of retrievable text produced by the external
//! ingestion pipeline. The retriever holds read-only references and never
//! mutates chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Origin class of a chunk's source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Blog,
    Document,
    Email,
    Page,
}

impl SourceType {
    /// Parse from a metadata value. Unknown values map to None (fail soft).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "blog" => Some(Self::Blog),
            "document" => Some(Self::Document),
            "email" => Some(Self::Email),
            "page" => Some(Self::Page),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blog => "blog",
            Self::Document => "document",
            Self::Email => "email",
            Self::Page => "page",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata attached to a chunk
///
/// Recognized keys are parsed into typed fields; everything else lands in
/// `extra`. All accessors fail soft on absent keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_type: Option<SourceType>,
    /// Logical path or URL of the source document
    pub source_path: Option<String>,
    /// Terminal identifier (file name or page title)
    pub file_name: Option<String>,
    /// Hierarchical tag, e.g. `guides/migration/slack-teams`
    pub folder_path: Option<String>,
    /// pdf, docx, xlsx, pptx, txt, html
    pub file_type: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_downloadable: bool,
    pub download_url: Option<String>,
    /// Source-hierarchy tag, e.g. `sharepoint/guides/migration`
    pub tag: Option<String>,
    /// Unrecognized keys, kept verbatim
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl ChunkMetadata {
    /// Parse a free-form string map into typed metadata.
    ///
    /// Unparseable values for recognized keys are dropped, not errors.
    pub fn from_map(map: HashMap<String, String>) -> Self {
        let mut meta = ChunkMetadata::default();
        for (key, value) in map {
            match key.as_str() {
                "source_type" => meta.source_type = SourceType::parse(&value),
                "source_path" => meta.source_path = Some(value),
                "file_name" => meta.file_name = Some(value),
                "folder_path" => meta.folder_path = Some(value),
                "file_type" => meta.file_type = Some(value),
                "modified_at" => {
                    meta.modified_at = DateTime::parse_from_rfc3339(&value)
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc));
                }
                "is_downloadable" => meta.is_downloadable = value == "true",
                "download_url" => meta.download_url = Some(value),
                "tag" => meta.tag = Some(value),
                _ => {
                    meta.extra.insert(key, value);
                }
            }
        }
        meta
    }

    /// Flatten back to a string map (for store payloads)
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = self.extra.clone();
        if let Some(st) = self.source_type {
            map.insert("source_type".into(), st.as_str().into());
        }
        if let Some(ref v) = self.source_path {
            map.insert("source_path".into(), v.clone());
        }
        if let Some(ref v) = self.file_name {
            map.insert("file_name".into(), v.clone());
        }
        if let Some(ref v) = self.folder_path {
            map.insert("folder_path".into(), v.clone());
        }
        if let Some(ref v) = self.file_type {
            map.insert("file_type".into(), v.clone());
        }
        if let Some(ts) = self.modified_at {
            map.insert("modified_at".into(), ts.to_rfc3339());
        }
        if self.is_downloadable {
            map.insert("is_downloadable".into(), "true".into());
        }
        if let Some(ref v) = self.download_url {
            map.insert("download_url".into(), v.clone());
        }
        if let Some(ref v) = self.tag {
            map.insert("tag".into(), v.clone());
        }
        map
    }

    /// Folder path split into segments, empty when absent
    pub fn folder_segments(&self) -> Vec<&str> {
        self.folder_path
            .as_deref()
            .map(|p| p.split('/').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    /// File name split on non-alphanumerics, lowercased
    pub fn file_name_tokens(&self) -> Vec<String> {
        self.file_name
            .as_deref()
            .map(|name| {
                name.to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                    .map(|t| t.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// An atomic unit of retrievable text with its embedding and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable id, unique within the store
    pub id: String,
    /// UTF-8 text, typically 200-2000 tokens
    pub text: String,
    /// L2-normalized embedding; a chunk without one is not retrievable
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding: Vec::new(),
            metadata: ChunkMetadata::default(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_metadata(mut self, metadata: ChunkMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
