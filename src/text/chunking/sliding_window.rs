//! Sliding window utilities for character-based segmentation
//!
//! Window positions are measured in characters. [`CharIndex`] maps them
//! back to byte offsets so windows can be sliced out of the UTF-8 text
//! without copying it into a `Vec<char>`.

use crate::text::chunking::error::{ChunkingError, Result};
use crate::text::chunking::types::ChunkWindow;

/// Core sliding window calculation algorithm
pub struct SlidingWindowCalculator;

impl SlidingWindowCalculator {
    /// Calculate raw window spans over a text of `text_length` characters
    ///
    /// # Arguments
    /// * `text_length` - Length of the text in characters
    /// * `chunk_size` - Window size in characters
    /// * `overlap` - Characters shared by consecutive windows
    ///
    /// # Returns
    /// Windows starting at `0, stride, 2*stride, ...` while the start is
    /// inside the text; the tail window is shorter than `chunk_size`.
    pub fn calculate_windows(
        text_length: usize,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Vec<ChunkWindow>> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(ChunkingError::Configuration(format!(
                "Invalid window: chunk_size {chunk_size}, overlap {overlap}"
            )));
        }
        let stride = chunk_size - overlap;

        let windows = (0..text_length)
            .step_by(stride)
            .map(|start| ChunkWindow {
                start,
                end: std::cmp::min(start + chunk_size, text_length),
                is_first: start == 0,
                is_last: start + chunk_size >= text_length,
            })
            .collect();
        Ok(windows)
    }

    /// Trim a raw window to whole words.
    ///
    /// Unless the window is the first one, everything up to and including
    /// the first space is dropped; unless it is the last one, everything from
    /// the last space on is dropped. A window with no space to cut at trims
    /// to the empty string. The result is stripped of surrounding whitespace.
    pub fn trim_to_word_boundaries(window: &str, is_first: bool, is_last: bool) -> &str {
        let mut text = window;
        if !is_first {
            text = match text.find(' ') {
                Some(pos) => &text[pos + 1..],
                None => "",
            };
        }
        if !is_last {
            text = match text.rfind(' ') {
                Some(pos) => &text[..pos],
                None => "",
            };
        }
        text.trim()
    }
}

/// Character position to byte offset mapping for one text
pub struct CharIndex<'a> {
    text: &'a str,
    byte_positions: Vec<usize>,
}

impl<'a> CharIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            byte_positions: text.char_indices().map(|(byte_pos, _)| byte_pos).collect(),
        }
    }

    /// Number of characters in the text
    pub fn len(&self) -> usize {
        self.byte_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_positions.is_empty()
    }

    fn byte_offset(&self, char_pos: usize) -> usize {
        self.byte_positions
            .get(char_pos)
            .copied()
            .unwrap_or(self.text.len())
    }

    /// Slice by character range `[start, end)`, clamped to the text
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        let start = self.byte_offset(start);
        let end = self.byte_offset(end).max(start);
        &self.text[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sliding_window_algorithm() {
        // single window: text fits within the chunk size
        let windows = SlidingWindowCalculator::calculate_windows(400, 512, 100).unwrap();
        assert_eq!(
            windows,
            vec![ChunkWindow {
                start: 0,
                end: 400,
                is_first: true,
                is_last: true
            }]
        );

        // 1000 chars, stride 412
        let windows = SlidingWindowCalculator::calculate_windows(1000, 512, 100).unwrap();
        let spans: Vec<_> = windows.iter().map(|w| (w.start, w.end)).collect();
        assert_eq!(spans, vec![(0, 512), (412, 924), (824, 1000)]);
        assert!(windows[0].is_first && !windows[0].is_last);
        assert!(!windows[1].is_first && !windows[1].is_last);
        assert!(windows[2].is_last);

        // the tail window is last as soon as it reaches the end
        let windows = SlidingWindowCalculator::calculate_windows(924, 512, 100).unwrap();
        assert_eq!(windows.len(), 3);
        assert!(windows[1].is_last);
        assert_eq!((windows[2].start, windows[2].end), (824, 924));

        assert!(SlidingWindowCalculator::calculate_windows(0, 512, 100)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_invalid_window_parameters() {
        assert!(SlidingWindowCalculator::calculate_windows(100, 0, 0).is_err());
        assert!(SlidingWindowCalculator::calculate_windows(100, 10, 10).is_err());
        assert!(SlidingWindowCalculator::calculate_windows(100, 10, 20).is_err());
    }

    #[test]
    fn test_windows_cover_text() {
        for (len, size, overlap) in [(1, 1, 0), (97, 10, 3), (601, 500, 100), (5000, 512, 100)] {
            let windows = SlidingWindowCalculator::calculate_windows(len, size, overlap).unwrap();
            let mut covered = vec![false; len];
            for w in &windows {
                assert!(w.len() <= size);
                covered[w.start..w.end].iter_mut().for_each(|c| *c = true);
            }
            assert!(covered.iter().all(|c| *c), "gap for {len}/{size}/{overlap}");
            assert_eq!(windows.iter().filter(|w| w.is_first).count(), 1);
        }
    }

    #[test]
    fn test_trim_to_word_boundaries() {
        let trim = SlidingWindowCalculator::trim_to_word_boundaries;
        assert_eq!(trim("lo world foo ba", false, false), "world foo");
        assert_eq!(trim("lo world foo ba", true, false), "lo world foo");
        assert_eq!(trim("lo world foo ba", false, true), "world foo ba");
        assert_eq!(trim("lo world foo ba", true, true), "lo world foo ba");
        assert_eq!(trim("single", false, false), "");
        assert_eq!(trim("single", true, true), "single");
        assert_eq!(trim("end ", false, true), "");
        assert_eq!(trim(" line\nbreak x", false, false), "line\nbreak");
    }

    #[test]
    fn test_char_index_slice() {
        let index = CharIndex::new("aé漢😁b");
        assert_eq!(index.len(), 5);
        assert_eq!(index.slice(0, 2), "aé");
        assert_eq!(index.slice(2, 4), "漢😁");
        assert_eq!(index.slice(3, 100), "😁b");
        assert_eq!(index.slice(5, 6), "");
        assert!(CharIndex::new("").is_empty());
    }
}
