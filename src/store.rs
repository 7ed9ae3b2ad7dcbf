//! Persisted chunk collection
//!
//! One ingestion run writes all of its chunks as a single pretty-printed
//! JSON array of `{id, title, url, page, text}` objects.

use crate::text::chunking::Chunk;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CHUNKS_FILE_NAME: &str = "chunks.json";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error on {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn serialization(path: &Path, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub struct ChunkStore;

impl ChunkStore {
    /// Resolve the collection file: a directory gets `chunks.json` appended.
    pub fn resolve(path: &Path) -> PathBuf {
        if path.extension().is_some_and(|ext| ext == "json") {
            path.to_path_buf()
        } else {
            path.join(CHUNKS_FILE_NAME)
        }
    }

    /// Write the whole collection, replacing any previous run. Returns the file written.
    pub fn write(path: &Path, chunks: &[Chunk]) -> Result<PathBuf> {
        let file_path = Self::resolve(path);
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let file = File::create(&file_path).map_err(|e| StoreError::io(&file_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, chunks)
            .map_err(|e| StoreError::serialization(&file_path, e))?;
        writer
            .flush()
            .map_err(|e| StoreError::io(&file_path, e))?;

        tracing::debug!("wrote {} chunks to {}", chunks.len(), file_path.display());
        Ok(file_path)
    }

    pub fn read(path: &Path) -> Result<Vec<Chunk>> {
        let file_path = Self::resolve(path);
        let file = File::open(&file_path).map_err(|e| StoreError::io(&file_path, e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| StoreError::serialization(&file_path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::chunking::PageSpan;

    fn sample_chunks() -> Vec<Chunk> {
        vec![
            Chunk::new(
                "Отчёт".to_string(),
                "https://example.com/report.pdf".to_string(),
                PageSpan { first: 1, last: 2 },
                "Текст первой страницы".to_string(),
            ),
            Chunk::new(
                "Отчёт".to_string(),
                "https://example.com/report.pdf".to_string(),
                PageSpan::single(2),
                "second page".to_string(),
            ),
        ]
    }

    #[test]
    fn test_write_and_read_directory() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("data/chunks");
        let chunks = sample_chunks();

        let written = ChunkStore::write(&target, &chunks)?;
        assert_eq!(written, target.join(CHUNKS_FILE_NAME));
        assert_eq!(ChunkStore::read(&target)?, chunks);

        let raw = std::fs::read_to_string(&written)?;
        // non-ASCII stays verbatim and the page span is the rendered string
        assert!(raw.contains("\"title\": \"Отчёт\""));
        assert!(raw.contains("\"page\": \"1-2\""));
        assert!(raw.contains("\"page\": \"2\""));

        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let keys: Vec<_> = value[0]
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        assert_eq!(keys.len(), 5);
        for key in ["id", "title", "url", "page", "text"] {
            assert!(keys.iter().any(|k| k == key));
        }
        Ok(())
    }

    #[test]
    fn test_write_explicit_file_and_overwrite() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("out.json");
        ChunkStore::write(&target, &sample_chunks())?;
        ChunkStore::write(&target, &[])?;
        assert!(ChunkStore::read(&target)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_read_errors() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        assert!(matches!(
            ChunkStore::read(dir.path()),
            Err(StoreError::Io { .. })
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "[{\"id\": 1}]")?;
        assert!(matches!(
            ChunkStore::read(&broken),
            Err(StoreError::Serialization { .. })
        ));
        Ok(())
    }
}
