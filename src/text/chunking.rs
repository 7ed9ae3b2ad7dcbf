//! Fixed-size overlapping text chunking with page attribution
//!
//! A [`ChunkSegmenter`] walks a [`crate::text::corpus::Corpus`] with a
//! character window, trims every window to whole words and tags the
//! resulting chunk with the page (or page range) the window touched.

pub mod config;
pub mod error;
pub mod segmenter;
pub mod sliding_window;
pub mod types;

// Re-export main public interfaces
pub use config::{MetadataSource, SegmentationConfig, SegmentationStatistics};
pub use error::{ChunkingError, Result};
pub use segmenter::ChunkSegmenter;
pub use sliding_window::{CharIndex, SlidingWindowCalculator};
pub use types::{Chunk, ChunkWindow, PageSpan};
