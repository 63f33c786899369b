//! Dense vector store backed by Qdrant
//!
//! The embedding store itself is owned by the ingestion pipeline; this
//! client only searches it (and exposes the ingestion-side upsert for
//! in-process index maintenance). Cosine space.

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        value::Kind, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
        UpsertPointsBuilder, VectorParamsBuilder,
    },
    Qdrant,
};
use std::collections::HashMap;

use askfuze_core::{Chunk, ChunkMetadata, Error, ScoredChunk, VectorSearch};

use crate::RagError;

/// Qdrant connection configuration
#[derive(Debug, Clone)]
pub struct QdrantStoreConfig {
    pub endpoint: String,
    pub collection: String,
    pub vector_dim: usize,
    pub api_key: Option<String>,
}

impl Default for QdrantStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:6334".to_string(),
            collection: "cloudfuze_kb".to_string(),
            vector_dim: 1536,
            api_key: None,
        }
    }
}

/// Vector store client
pub struct QdrantStore {
    client: Qdrant,
    config: QdrantStoreConfig,
}

impl QdrantStore {
    pub fn new(config: QdrantStoreConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create the collection when missing. HNSW parameters are left to the
    /// collection defaults configured by the ingestion pipeline so results
    /// stay stable for identical inputs and store state.
    pub async fn ensure_collection(&self) -> Result<(), RagError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                        VectorParamsBuilder::new(self.config.vector_dim as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
        }

        Ok(())
    }

    fn chunk_to_point(chunk: &Chunk) -> PointStruct {
        let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        payload.insert("text".to_string(), chunk.text.clone().into());
        for (k, v) in chunk.metadata.to_map() {
            payload.insert(k, v.into());
        }
        PointStruct::new(chunk.id.clone(), chunk.embedding.clone(), payload)
    }
}

#[async_trait]
impl VectorSearch for QdrantStore {
    async fn similarity_search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, Error> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.config.collection, vector.to_vec(), k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        let hits = results
            .result
            .into_iter()
            .map(|point| {
                let mut raw_meta = HashMap::new();
                let mut text = String::new();

                for (key, value) in point.payload {
                    if let Some(Kind::StringValue(s)) = value.kind {
                        if key == "text" {
                            text = s;
                        } else {
                            raw_meta.insert(key, s);
                        }
                    }
                }

                let chunk_id = point
                    .id
                    .map(|pid| match pid.point_id_options {
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => {
                            n.to_string()
                        }
                        None => String::new(),
                    })
                    .unwrap_or_default();

                ScoredChunk {
                    chunk_id,
                    text,
                    metadata: ChunkMetadata::from_map(raw_meta),
                    score: point.score,
                }
            })
            .collect();

        Ok(hits)
    }

    async fn add_documents(&self, chunks: &[Chunk]) -> Result<(), Error> {
        // A chunk without an embedding is not retrievable; reject rather
        // than silently index half the batch
        if let Some(missing) = chunks.iter().find(|c| c.embedding.is_empty()) {
            return Err(RagError::VectorStore(format!(
                "chunk {} has no embedding",
                missing.id
            ))
            .into());
        }

        let points: Vec<PointStruct> = chunks.iter().map(Self::chunk_to_point).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(())
    }

    async fn count(&self) -> Result<u64, Error> {
        let info = self
            .client
            .collection_info(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(info
            .result
            .map(|r| r.points_count.unwrap_or(0))
            .unwrap_or(0))
    }
}
