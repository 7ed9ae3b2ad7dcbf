//! Page-tagged text parsing and corpus construction
//!
//! Extracted documents are stored as repeated blocks:
//!
//! ```text
//! Page: 1
//! Document Title: ...
//! Document URL: ...
//! Text: ...
//! ```
//!
//! [`CorpusBuilder`] parses those blocks into [`PageRecord`]s and joins
//! their bodies into a single [`Corpus`] with a character offset index per
//! page.

use super::TextNormalizer;
use super::chunking::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing::debug;

/// Separator appended after every page body in the corpus text.
pub const PAGE_SEPARATOR: char = ' ';

/// One parsed page-tagged block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub page: u32,
    pub title: String,
    pub url: String,
    pub text: String,
}

/// Half-open character range `[start, end)` of one page body in the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOffsetEntry {
    pub start: usize,
    pub end: usize,
    pub page: u32,
}

impl PageOffsetEntry {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Open-interval overlap with the character span `[start, end)`.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        !(end <= self.start || start >= self.end)
    }
}

/// Document metadata carried by a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSource {
    pub title: String,
    pub url: String,
}

/// Concatenated page bodies of one source document.
///
/// `offsets[i]` and `sources[i]` describe the same page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    text: String,
    char_len: usize,
    offsets: Vec<PageOffsetEntry>,
    sources: Vec<PageSource>,
}

impl Corpus {
    pub fn from_records(records: Vec<PageRecord>) -> Self {
        let mut corpus = Corpus::default();
        for record in records {
            let start = corpus.char_len;
            let body_len = record.text.chars().count();
            corpus.text.push_str(&record.text);
            corpus.text.push(PAGE_SEPARATOR);
            corpus.char_len += body_len + 1;
            corpus.offsets.push(PageOffsetEntry {
                start,
                end: start + body_len,
                page: record.page,
            });
            corpus.sources.push(PageSource {
                title: record.title,
                url: record.url,
            });
        }
        corpus
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the corpus text in characters.
    pub fn char_len(&self) -> usize {
        self.char_len
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[PageOffsetEntry] {
        &self.offsets
    }

    pub fn sources(&self) -> &[PageSource] {
        &self.sources
    }

    pub fn first_source(&self) -> Option<&PageSource> {
        self.sources.first()
    }

    /// Indices of the pages whose range overlaps the character span `[start, end)`.
    pub fn pages_overlapping(&self, start: usize, end: usize) -> Vec<usize> {
        self.offsets
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.overlaps(start, end))
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// Parses page-tagged text into [`PageRecord`]s and [`Corpus`] values.
pub struct CorpusBuilder {
    block_start: Regex,
    page: Regex,
    title: Regex,
    url: Regex,
    body: Regex,
}

impl CorpusBuilder {
    pub fn new() -> Result<Self> {
        Ok(CorpusBuilder {
            block_start: Regex::new(r"(?m)^Page: \d+")?,
            page: Regex::new(r"Page:\s*(\d+)")?,
            title: Regex::new(r"Document Title:[ \t]*(.+)")?,
            url: Regex::new(r"Document URL:[ \t]*(.+)")?,
            body: Regex::new(r"(?s)Text:\s*(.+)")?,
        })
    }

    /// Split the input at page markers. Text before the first marker forms
    /// its own (usually invalid) block.
    pub fn split_blocks<'a>(&self, input: &'a str) -> Vec<&'a str> {
        let mut blocks = Vec::new();
        let mut prev = 0;
        for mat in self.block_start.find_iter(input) {
            if mat.start() > prev {
                blocks.push(&input[prev..mat.start()]);
            }
            prev = mat.start();
        }
        if prev < input.len() {
            blocks.push(&input[prev..]);
        }
        blocks
    }

    /// Parse one block. Returns `None` if any field is missing or empty,
    /// or the page number is not a positive `u32`.
    pub fn parse_block(&self, block: &str) -> Option<PageRecord> {
        let capture = |re: &Regex| {
            re.captures(block)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim())
                .filter(|s| !s.is_empty())
        };
        let page = capture(&self.page)?
            .parse::<u32>()
            .ok()
            .filter(|page| *page >= 1)?;
        let title = capture(&self.title)?;
        let url = capture(&self.url)?;
        let text = capture(&self.body)?;
        Some(PageRecord {
            page,
            title: title.to_string(),
            url: url.to_string(),
            text: text.to_string(),
        })
    }

    /// Parse every block of the input, silently dropping malformed ones.
    pub fn parse_pages(&self, input: &str) -> Vec<PageRecord> {
        self.split_blocks(input)
            .into_iter()
            .filter_map(|block| {
                let record = self.parse_block(block);
                if record.is_none() {
                    debug!(
                        "Dropping malformed page block: {:?}",
                        block.chars().take(50).collect::<String>()
                    );
                }
                record
            })
            .collect()
    }

    pub fn build(&self, input: &str) -> Corpus {
        Corpus::from_records(self.parse_pages(input))
    }
}

/// One page as written by the extraction stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBlock<'a> {
    pub page: u32,
    pub title: &'a str,
    pub url: Option<&'a str>,
    pub text: &'a str,
}

impl PageBlock<'_> {
    /// Render the block followed by a blank line. The URL line is omitted
    /// when no URL is known, which makes the block unparseable downstream.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = writeln!(out, "Page: {}", self.page);
        let _ = writeln!(out, "Document Title: {}", self.title);
        if let Some(url) = self.url {
            let _ = writeln!(out, "Document URL: {url}");
        }
        let _ = write!(out, "Text: {}\n\n", self.text);
        out
    }
}

/// Normalize raw page texts and render them as page-tagged blocks.
///
/// Pages are numbered from 1 in input order; pages that normalize to an
/// empty string are left out but keep their number.
pub fn render_document<'a, I>(
    normalizer: &TextNormalizer,
    title: &str,
    url: Option<&str>,
    pages: I,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    for (idx, raw) in pages.into_iter().enumerate() {
        let cleaned = normalizer.normalize(raw);
        if cleaned.is_empty() {
            continue;
        }
        let block = PageBlock {
            page: idx as u32 + 1,
            title,
            url,
            text: &cleaned,
        };
        out.push_str(&block.render());
    }
    out
}
