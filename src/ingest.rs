//! Batch ingestion of extracted page-tagged documents into one chunk collection

use crate::store::ChunkStore;
use crate::text::chunking::{Chunk, ChunkSegmenter, SegmentationConfig};
use crate::text::corpus::CorpusBuilder;
use crate::util::encoding;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Extension of the extracted page-tagged text files.
pub const DOCUMENT_EXTENSION: &str = "txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Documents found in the input directory
    pub documents: usize,
    /// Documents that could not be read or decoded
    pub skipped: usize,
    pub chunks: usize,
    pub output: PathBuf,
}

/// Outcome of chunking one document
enum DocumentChunks {
    Chunked(Vec<Chunk>),
    Skipped,
}

#[derive(Clone)]
pub struct DocumentIngestor {
    builder: Arc<CorpusBuilder>,
    config: SegmentationConfig,
}

impl DocumentIngestor {
    pub fn new(config: SegmentationConfig) -> Result<Self> {
        config
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid segmentation config")?;
        Ok(Self {
            builder: Arc::new(CorpusBuilder::new()?),
            config,
        })
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Parse and segment one page-tagged document.
    pub fn chunk_text(&self, text: &str) -> Result<Vec<Chunk>> {
        let corpus = self.builder.build(text);
        if corpus.is_empty() {
            return Ok(Vec::new());
        }
        let mut segmenter = ChunkSegmenter::new(self.config)?;
        Ok(segmenter.segment(&corpus)?)
    }

    /// `.txt` files directly inside `dir`, sorted by file name.
    pub fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("cannot read document directory {}", dir.display()))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
            {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(paths)
    }

    fn chunk_file(&self, path: &Path) -> Result<DocumentChunks> {
        let text = match encoding::read_to_utf8(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("skipping document {}: {:?}", path.display(), e);
                return Ok(DocumentChunks::Skipped);
            }
        };
        let chunks = self.chunk_text(&text)?;
        debug!("{}: {} chunks", path.display(), chunks.len());
        Ok(DocumentChunks::Chunked(chunks))
    }

    /// Chunk every document of `dir` concurrently on the blocking pool.
    /// Chunks come back concatenated in file-name order.
    pub async fn chunk_directory(&self, dir: &Path) -> Result<(Vec<Chunk>, usize, usize)> {
        let paths = Self::list_documents(dir)?;
        let documents = paths.len();

        let mut set = JoinSet::new();
        for (idx, path) in paths.into_iter().enumerate() {
            let ingestor = self.clone();
            set.spawn_blocking(move || (idx, ingestor.chunk_file(&path)));
        }

        let mut results = Vec::with_capacity(documents);
        while let Some(res) = set.join_next().await {
            let (idx, chunks) = res.context("document chunking task failed")?;
            results.push((idx, chunks?));
        }
        results.sort_by_key(|(idx, _)| *idx);

        let mut skipped = 0;
        let mut all_chunks = Vec::new();
        for (_, result) in results {
            match result {
                DocumentChunks::Chunked(chunks) => all_chunks.extend(chunks),
                DocumentChunks::Skipped => skipped += 1,
            }
        }
        Ok((all_chunks, documents, skipped))
    }

    /// Chunk every document of `input_dir` and persist one collection at `output`.
    pub async fn run(&self, input_dir: &Path, output: &Path) -> Result<IngestReport> {
        let (chunks, documents, skipped) = self.chunk_directory(input_dir).await?;
        let output = ChunkStore::write(output, &chunks)?;
        info!(
            "Total chunks: {} from {} documents ({} skipped) -> {}",
            chunks.len(),
            documents,
            skipped,
            output.display()
        );
        Ok(IngestReport {
            documents,
            skipped,
            chunks: chunks.len(),
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::corpus::PageBlock;

    fn document(title: &str, pages: &[&str]) -> String {
        pages
            .iter()
            .enumerate()
            .map(|(i, text)| {
                PageBlock {
                    page: i as u32 + 1,
                    title,
                    url: Some("https://example.com/doc.pdf"),
                    text: *text,
                }
                .render()
            })
            .collect()
    }

    #[test]
    fn test_rejects_degenerate_config() {
        assert!(DocumentIngestor::new(SegmentationConfig::new(10, 10)).is_err());
        assert!(DocumentIngestor::new(SegmentationConfig::new(0, 0)).is_err());
    }

    #[test]
    fn test_chunk_text() -> Result<()> {
        let ingestor = DocumentIngestor::new(SegmentationConfig::default())?;
        let chunks = ingestor.chunk_text(&document("Doc", &["first page", "second page"]))?;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "first page second page");
        assert_eq!(chunks[0].page.to_string(), "1-2");

        // fully malformed document: no pages, no chunks
        assert!(ingestor.chunk_text("Page: 1\nText: no title here")?.is_empty());
        assert!(ingestor.chunk_text("")?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_run_directory() -> Result<()> {
        crate::util::tracing::tracing_init_test(tracing::Level::DEBUG);
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("extracted");
        std::fs::create_dir_all(&input)?;
        std::fs::write(input.join("b.txt"), document("B", &["beta text"]))?;
        std::fs::write(input.join("a.txt"), document("A", &["alpha text"]))?;
        std::fs::write(input.join("broken.txt"), "no page markers at all")?;
        std::fs::write(input.join("notes.md"), document("M", &["ignored"]))?;
        std::fs::create_dir_all(input.join("nested.txt"))?;

        let ingestor = DocumentIngestor::new(SegmentationConfig::new(100, 20))?;
        let output = dir.path().join("chunks");
        let report = ingestor.run(&input, &output).await?;

        assert_eq!(report.documents, 3);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.output, output.join("chunks.json"));

        let stored = ChunkStore::read(&report.output)?;
        let titles: Vec<_> = stored.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ingestor = DocumentIngestor::new(SegmentationConfig::default())?;
        assert!(
            ingestor
                .chunk_directory(&dir.path().join("missing"))
                .await
                .is_err()
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_directory_writes_empty_collection() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ingestor = DocumentIngestor::new(SegmentationConfig::default())?;
        let report = ingestor.run(dir.path(), &dir.path().join("out")).await?;
        assert_eq!(report.documents, 0);
        assert!(ChunkStore::read(&report.output)?.is_empty());
        Ok(())
    }
}
