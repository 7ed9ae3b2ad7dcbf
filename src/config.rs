use crate::chat::{self, ChatModel, DEFAULT_SYSTEM_PROMPT};
use crate::retrieval::DEFAULT_TOP_K;
use crate::text::chunking::{MetadataSource, SegmentationConfig};
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1";

/// Application settings, read from `RAG_*` environment variables.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub base_dir: PathBuf,
    /// Source PDF documents
    pub docs_path: PathBuf,
    /// Page-tagged text written by the extraction stage
    pub extracted_files_path: PathBuf,
    pub chunks_json_path: PathBuf,
    pub index_path: PathBuf,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// `first_page` or `spanning_page`
    pub metadata_source: String,

    pub api_key: Option<String>,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub embedding_batch_size: usize,
    pub chat_base_url: String,
    pub chat_model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub system_prompt: Option<String>,
    pub top_k: usize,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            docs_path: PathBuf::from("data/documents"),
            extracted_files_path: PathBuf::from("data/extracted"),
            chunks_json_path: PathBuf::from("data/chunks"),
            index_path: PathBuf::from("data/index"),
            chunk_size: SegmentationConfig::DEFAULT_CHUNK_SIZE,
            chunk_overlap: SegmentationConfig::DEFAULT_OVERLAP,
            metadata_source: "first_page".to_string(),
            api_key: None,
            embedding_base_url: DEFAULT_API_BASE_URL.to_string(),
            embedding_model: "Embeddings".to_string(),
            embedding_batch_size: 32,
            chat_base_url: DEFAULT_API_BASE_URL.to_string(),
            chat_model: ChatModel::default().name().to_string(),
            temperature: None,
            max_tokens: None,
            system_prompt: None,
            top_k: DEFAULT_TOP_K,
            request_timeout_secs: 60,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        envy::prefixed("RAG_")
            .from_env::<AppConfig>()
            .context("cannot read app config from env:")
    }

    /// Relative paths are taken from `base_dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.resolve(&self.docs_path)
    }

    pub fn extracted_dir(&self) -> PathBuf {
        self.resolve(&self.extracted_files_path)
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.resolve(&self.chunks_json_path)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.resolve(&self.index_path)
    }

    pub fn segmentation(&self) -> Result<SegmentationConfig> {
        let metadata_source = self
            .metadata_source
            .parse::<MetadataSource>()
            .map_err(|e| anyhow!("invalid chunking settings: {e}"))?;
        let config = SegmentationConfig::new(self.chunk_size, self.chunk_overlap)
            .with_metadata_source(metadata_source);
        config
            .validate()
            .map_err(|e| anyhow!("invalid chunking settings: {e}"))?;
        Ok(config)
    }

    pub fn chat_model(&self) -> chat::Result<ChatModel> {
        self.chat_model.parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>();
        Ok(envy::prefixed("RAG_").from_iter(vars)?)
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let conf = from_vars(&[])?;
        assert_eq!(conf, AppConfig::default());
        assert_eq!(conf.chunk_size, 512);
        assert_eq!(conf.chunk_overlap, 100);
        assert_eq!(conf.top_k, 5);
        assert_eq!(conf.chat_model()?, ChatModel::Lite);
        assert_eq!(conf.chunks_dir(), PathBuf::from("./data/chunks"));
        assert_eq!(conf.system_prompt(), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(conf.request_timeout(), Duration::from_secs(60));
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        let conf = from_vars(&[
            ("RAG_BASE_DIR", "/srv/rag"),
            ("RAG_INDEX_PATH", "/var/lib/index"),
            ("RAG_CHUNK_SIZE", "256"),
            ("RAG_CHUNK_OVERLAP", "32"),
            ("RAG_METADATA_SOURCE", "spanning_page"),
            ("RAG_CHAT_MODEL", "gigachat-max"),
            ("RAG_API_KEY", "token"),
            ("RAG_SYSTEM_PROMPT", "Отвечай кратко"),
            ("OTHER_CHUNK_SIZE", "1"),
        ])?;
        assert_eq!(conf.extracted_dir(), PathBuf::from("/srv/rag/data/extracted"));
        assert_eq!(conf.index_dir(), PathBuf::from("/var/lib/index"));
        let segmentation = conf.segmentation()?;
        assert_eq!(segmentation.chunk_size, 256);
        assert_eq!(segmentation.overlap, 32);
        assert_eq!(segmentation.metadata_source, MetadataSource::SpanningPage);
        assert_eq!(conf.chat_model()?, ChatModel::Max);
        assert_eq!(conf.api_key.as_deref(), Some("token"));
        assert_eq!(conf.system_prompt(), "Отвечай кратко");
        Ok(())
    }

    #[test]
    fn test_invalid_settings() -> Result<()> {
        let conf = from_vars(&[("RAG_CHUNK_SIZE", "100"), ("RAG_CHUNK_OVERLAP", "100")])?;
        assert!(conf.segmentation().is_err());

        let conf = from_vars(&[("RAG_METADATA_SOURCE", "last_page")])?;
        assert!(conf.segmentation().is_err());

        let conf = from_vars(&[("RAG_CHAT_MODEL", "gpt-4")])?;
        assert!(conf.chat_model().is_err());

        assert!(from_vars(&[("RAG_CHUNK_SIZE", "many")]).is_err());
        Ok(())
    }
}
