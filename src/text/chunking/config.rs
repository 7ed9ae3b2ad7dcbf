//! Configuration and statistics for page-attributed chunking

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Which page supplies a chunk's title and url
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    /// Every chunk carries the corpus' first page metadata
    #[default]
    FirstPage,
    /// First page overlapping the chunk's raw window
    SpanningPage,
}

impl FromStr for MetadataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "first_page" => Ok(Self::FirstPage),
            "spanning_page" => Ok(Self::SpanningPage),
            other => Err(format!(
                "unknown metadata source {other:?} (expected first_page or spanning_page)"
            )),
        }
    }
}

/// Configuration for fixed-size overlapping segmentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Window size in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive windows
    pub overlap: usize,
    pub metadata_source: MetadataSource,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            overlap: Self::DEFAULT_OVERLAP,
            metadata_source: MetadataSource::default(),
        }
    }
}

impl SegmentationConfig {
    pub const DEFAULT_CHUNK_SIZE: usize = 512;
    pub const DEFAULT_OVERLAP: usize = 100;

    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            ..Default::default()
        }
    }

    pub fn with_metadata_source(self, metadata_source: MetadataSource) -> Self {
        Self {
            metadata_source,
            ..self
        }
    }

    /// Cursor advance between windows. Only meaningful on a validated config.
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }

        // a zero stride never terminates, a negative one walks backwards
        if self.overlap >= self.chunk_size {
            return Err(format!(
                "overlap ({}) must be less than chunk_size ({})",
                self.overlap, self.chunk_size
            ));
        }

        Ok(())
    }
}

/// Counters and timing collected by the segmenter
#[derive(Debug, Clone, Default)]
pub struct SegmentationStatistics {
    pub total_processing_time: Duration,
    pub corpora_processed: usize,
    pub input_char_count: usize,
    pub input_page_count: usize,

    pub windows_visited: usize,
    pub chunks_emitted: usize,
    /// Windows that overlapped no page (trailing separators)
    pub windows_without_pages: usize,
    /// Windows whose text was empty after word-boundary trimming
    pub windows_without_words: usize,
    pub multi_page_chunks: usize,

    pub total_chunk_chars: usize,
    pub avg_chars_per_chunk: f32,
    pub chunks_per_second: f32,
}

impl SegmentationStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_timing(&self) -> Instant {
        Instant::now()
    }

    pub fn finish_timing(&mut self, start: Instant) {
        self.total_processing_time += start.elapsed();
    }

    pub fn record_corpus(&mut self, char_count: usize, page_count: usize) {
        self.corpora_processed += 1;
        self.input_char_count += char_count;
        self.input_page_count += page_count;
    }

    pub fn record_window(&mut self) {
        self.windows_visited += 1;
    }

    pub fn record_window_without_pages(&mut self) {
        self.windows_without_pages += 1;
    }

    pub fn record_window_without_words(&mut self) {
        self.windows_without_words += 1;
    }

    pub fn record_chunk(&mut self, char_count: usize, multi_page: bool) {
        self.chunks_emitted += 1;
        self.total_chunk_chars += char_count;
        if multi_page {
            self.multi_page_chunks += 1;
        }
    }

    /// Calculate derived metrics (call after processing is complete)
    pub fn calculate_derived_metrics(&mut self) {
        if self.chunks_emitted > 0 {
            self.avg_chars_per_chunk = self.total_chunk_chars as f32 / self.chunks_emitted as f32;
        }
        let total_seconds = self.total_processing_time.as_secs_f32();
        if total_seconds > 0.0 {
            self.chunks_per_second = self.chunks_emitted as f32 / total_seconds;
        }
    }

    /// Get summary as string for logging
    pub fn summary(&self) -> String {
        format!(
            "Segmentation Stats: {} corpora, {} pages, {} chars -> {} chunks \
            ({:.1} avg chars/chunk, {} multi-page) | windows: {} visited, {} without pages, \
            {} without words | {:.2}ms",
            self.corpora_processed,
            self.input_page_count,
            self.input_char_count,
            self.chunks_emitted,
            self.avg_chars_per_chunk,
            self.multi_page_chunks,
            self.windows_visited,
            self.windows_without_pages,
            self.windows_without_words,
            self.total_processing_time.as_secs_f64() * 1000.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SegmentationConfig::default();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.overlap, 100);
        assert_eq!(config.metadata_source, MetadataSource::FirstPage);
        assert_eq!(config.stride(), 412);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(SegmentationConfig::new(0, 0).validate().is_err());
        assert!(SegmentationConfig::new(100, 100).validate().is_err());
        assert!(SegmentationConfig::new(100, 150).validate().is_err());
        assert!(SegmentationConfig::new(100, 99).validate().is_ok());
        assert!(SegmentationConfig::new(1, 0).validate().is_ok());
    }

    #[test]
    fn test_metadata_source_parse() {
        assert_eq!(
            "first_page".parse::<MetadataSource>(),
            Ok(MetadataSource::FirstPage)
        );
        assert_eq!(
            "Spanning-Page".parse::<MetadataSource>(),
            Ok(MetadataSource::SpanningPage)
        );
        assert!("last_page".parse::<MetadataSource>().is_err());

        let config = SegmentationConfig::new(10, 2)
            .with_metadata_source(MetadataSource::SpanningPage);
        assert_eq!(config.metadata_source, MetadataSource::SpanningPage);
        assert_eq!(config.chunk_size, 10);
    }

    #[test]
    fn test_statistics() {
        let mut stats = SegmentationStatistics::new();
        stats.record_corpus(1000, 3);
        stats.record_window();
        stats.record_window();
        stats.record_window();
        stats.record_chunk(100, true);
        stats.record_chunk(50, false);
        stats.record_window_without_pages();
        stats.total_processing_time = Duration::from_millis(10);
        stats.calculate_derived_metrics();

        assert_eq!(stats.chunks_emitted, 2);
        assert_eq!(stats.multi_page_chunks, 1);
        assert_eq!(stats.avg_chars_per_chunk, 75.0);
        assert!(stats.chunks_per_second > 0.0);

        let summary = stats.summary();
        assert!(summary.contains("2 chunks"));
        assert!(summary.contains("75.0"));
    }
}
