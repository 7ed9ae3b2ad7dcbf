//! Embedding and nearest-neighbour retrieval over stored chunks
//!
//! [`build_index`] embeds a chunk collection into a [`VectorIndex`];
//! [`Retriever`] embeds a question and returns the closest chunks with their
//! `{title, url, page, id}` metadata.

use crate::text::chunking::{Chunk, PageSpan};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_TOP_K: usize = 5;
pub const INDEX_FILE_NAME: &str = "index.json";

#[derive(thiserror::Error, Debug)]
pub enum RetrievalError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

impl RetrievalError {
    pub fn provider<S: Into<String>>(msg: S) -> Self {
        Self::Provider(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Turns text into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embeddings client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    batch_size: usize,
}

impl HttpEmbedder {
    pub fn new(
        api_key: Option<&str>,
        base_url: &str,
        model: &str,
        timeout: Duration,
        batch_size: usize,
    ) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(RetrievalError::configuration("missing embedding model name"));
        }
        if batch_size == 0 {
            return Err(RetrievalError::configuration(
                "embedding batch size must be greater than 0",
            ));
        }
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            let auth = format!("Bearer {key}");
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth)
                    .map_err(|_| RetrievalError::configuration("invalid API key"))?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            batch_size,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let resp = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RetrievalError::provider(format!(
                "embeddings request failed ({status}): {body}"
            )));
        }
        let parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
            RetrievalError::provider(format!("failed to parse embedding response: {e}"))
        })?;
        parsed.into_vectors(inputs.len())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RetrievalError::provider("empty embedding response"))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingResponse {
    /// Vectors in input order; the service may answer out of order.
    fn into_vectors(mut self, expected: usize) -> Result<Vec<Vec<f32>>> {
        self.data.sort_by_key(|entry| entry.index);
        if self.data.len() != expected {
            return Err(RetrievalError::provider(format!(
                "provider returned {} embeddings for {} inputs",
                self.data.len(),
                expected
            )));
        }
        Ok(self.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

/// Metadata stored next to every indexed chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    pub url: String,
    pub page: PageSpan,
    pub id: Uuid,
}

impl From<&Chunk> for ChunkMetadata {
    fn from(chunk: &Chunk) -> Self {
        Self {
            title: chunk.title.clone(),
            url: chunk.url.clone(),
            page: chunk.page,
            id: chunk.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

pub trait VectorIndex: Send + Sync {
    fn add(&mut self, entries: Vec<IndexEntry>) -> Result<()>;
    fn similarity_search_by_vector(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default, Deserialize)]
struct IndexFile {
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    dimension: Option<usize>,
    entries: &'a [IndexEntry],
}

/// Brute-force cosine similarity index persisted as one JSON file.
#[derive(Debug)]
pub struct LocalVectorIndex {
    path: PathBuf,
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
}

impl LocalVectorIndex {
    /// Empty index that will be persisted inside `dir`.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(INDEX_FILE_NAME),
            dimension: None,
            entries: Vec::new(),
        }
    }

    /// Load the index persisted inside `dir`, or start empty.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(INDEX_FILE_NAME);
        if !path.exists() {
            debug!("no index at {}, starting empty", path.display());
            return Ok(Self::new(dir));
        }
        let file: IndexFile = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
        debug!("loaded {} entries from {}", file.entries.len(), path.display());
        Ok(Self {
            path,
            dimension: file.dimension,
            entries: file.entries,
        })
    }

    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer(
            &mut writer,
            &IndexFileRef {
                dimension: self.dimension,
                entries: &self.entries,
            },
        )?;
        writer.flush()?;
        info!("persisted {} entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(RetrievalError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

impl VectorIndex for LocalVectorIndex {
    fn add(&mut self, entries: Vec<IndexEntry>) -> Result<()> {
        let mut dimension = self.dimension;
        for entry in &entries {
            let actual = entry.embedding.len();
            if actual == 0 {
                return Err(RetrievalError::provider("empty embedding vector"));
            }
            match dimension {
                Some(expected) if expected != actual => {
                    return Err(RetrievalError::DimensionMismatch { expected, actual });
                }
                _ => dimension = Some(actual),
            }
        }
        self.dimension = dimension;
        self.entries.extend(entries);
        Ok(())
    }

    fn similarity_search_by_vector(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        self.check_dimension(query.len())?;
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.embedding), entry))
            .collect();
        // Sort by score descending
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| RetrievedChunk {
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot_product = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denominator = (norm_a * norm_b).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    dot_product / denominator
}

/// Embed chunk texts in batches and add them to the index. Returns the number of entries added.
pub async fn build_index(
    chunks: &[Chunk],
    embedder: &dyn Embedder,
    index: &mut dyn VectorIndex,
    batch_size: usize,
) -> Result<usize> {
    if batch_size == 0 {
        return Err(RetrievalError::configuration(
            "embedding batch size must be greater than 0",
        ));
    }
    for (i, batch) in chunks.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_documents(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(RetrievalError::provider(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            )));
        }
        let entries = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, embedding)| IndexEntry {
                text: chunk.text.clone(),
                metadata: ChunkMetadata::from(chunk),
                embedding,
            })
            .collect();
        index.add(entries)?;
        debug!("indexed batch {} ({} chunks)", i, batch.len());
    }
    info!("Indexed {} chunks", chunks.len());
    Ok(chunks.len())
}

/// Looks up the chunks most similar to a question.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
        }
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    /// Top `k` chunks for the question, most similar first.
    pub async fn get_relevant_context(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let embedding = self.embedder.embed_query(query).await?;
        let results = self.index.similarity_search_by_vector(&embedding, k)?;
        debug!("retrieved {} chunks for query {:?}", results.len(), query);
        Ok(results)
    }
}
