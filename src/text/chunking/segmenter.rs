//! Fixed-size overlapping segmentation with page attribution

use super::{
    config::{MetadataSource, SegmentationConfig, SegmentationStatistics},
    error::{ChunkingError, Result},
    sliding_window::{CharIndex, SlidingWindowCalculator},
    types::{Chunk, PageSpan},
};
use crate::text::corpus::{Corpus, PageSource};
use tracing::debug;

/// Slides a fixed-size window over a [`Corpus`] and emits word-aligned
/// chunks tagged with the pages each window touched.
pub struct ChunkSegmenter {
    config: SegmentationConfig,
    statistics: SegmentationStatistics,
}

impl ChunkSegmenter {
    /// Create a segmenter; degenerate window parameters are rejected here.
    pub fn new(config: SegmentationConfig) -> Result<Self> {
        config.validate().map_err(ChunkingError::configuration)?;
        Ok(Self {
            config,
            statistics: SegmentationStatistics::new(),
        })
    }

    /// Segment one corpus into chunks, in corpus order.
    pub fn segment(&mut self, corpus: &Corpus) -> Result<Vec<Chunk>> {
        let start = self.statistics.start_timing();
        self.statistics
            .record_corpus(corpus.char_len(), corpus.offsets().len());

        let index = CharIndex::new(corpus.text());
        let windows = SlidingWindowCalculator::calculate_windows(
            index.len(),
            self.config.chunk_size,
            self.config.overlap,
        )?;

        let mut chunks = Vec::with_capacity(windows.len());
        for window in windows {
            self.statistics.record_window();

            // page attribution uses the raw window, not the trimmed text
            let pages = corpus.pages_overlapping(window.start, window.end);
            let Some(&first_idx) = pages.first() else {
                debug!(
                    "Skipping window {}..{}: no page overlaps",
                    window.start, window.end
                );
                self.statistics.record_window_without_pages();
                continue;
            };

            let raw = index.slice(window.start, window.end);
            let text =
                SlidingWindowCalculator::trim_to_word_boundaries(raw, window.is_first, window.is_last);
            if text.is_empty() {
                debug!(
                    "Skipping window {}..{}: no whole word left after trimming",
                    window.start, window.end
                );
                self.statistics.record_window_without_words();
                continue;
            }

            let span = PageSpan::from_pages(pages.iter().map(|&idx| corpus.offsets()[idx].page))
                .ok_or_else(|| ChunkingError::internal("overlapping pages without numbers"))?;
            let source = self.metadata_for(corpus, first_idx)?;

            let chunk = Chunk::new(
                source.title.clone(),
                source.url.clone(),
                span,
                text.to_string(),
            );
            self.statistics
                .record_chunk(chunk.char_length(), !span.is_single());
            chunks.push(chunk);
        }

        self.statistics.finish_timing(start);
        self.statistics.calculate_derived_metrics();
        debug!("{}", self.statistics.summary());
        Ok(chunks)
    }

    fn metadata_for<'c>(&self, corpus: &'c Corpus, first_overlap: usize) -> Result<&'c PageSource> {
        let source = match self.config.metadata_source {
            MetadataSource::FirstPage => corpus.first_source(),
            MetadataSource::SpanningPage => corpus.sources().get(first_overlap),
        };
        source.ok_or_else(|| ChunkingError::internal("corpus has pages but no page metadata"))
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub fn statistics(&self) -> &SegmentationStatistics {
        &self.statistics
    }
}
