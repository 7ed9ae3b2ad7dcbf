//! Core data structures for page-attributed chunking

use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Pages a chunk was cut from, rendered as `"N"` or `"N-M"`.
///
/// Non-contiguous page sets collapse into their min-max range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageSpan {
    pub first: u32,
    pub last: u32,
}

impl PageSpan {
    pub fn single(page: u32) -> Self {
        Self {
            first: page,
            last: page,
        }
    }

    /// Span covering the smallest and largest page number, `None` if empty.
    pub fn from_pages<I: IntoIterator<Item = u32>>(pages: I) -> Option<Self> {
        match pages.into_iter().minmax() {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(page) => Some(Self::single(page)),
            MinMaxResult::MinMax(first, last) => Some(Self { first, last }),
        }
    }

    pub fn is_single(&self) -> bool {
        self.first == self.last
    }

    pub fn contains(&self, page: u32) -> bool {
        self.first <= page && page <= self.last
    }
}

impl fmt::Display for PageSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}-{}", self.first, self.last)
        }
    }
}

impl FromStr for PageSpan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid page number {v:?}: {e}"))
        };
        match s.split_once('-') {
            None => parse(s).map(Self::single),
            Some((first, last)) => {
                let (first, last) = (parse(first)?, parse(last)?);
                if first > last {
                    return Err(format!("invalid page range {s:?}"));
                }
                Ok(Self { first, last })
            }
        }
    }
}

impl Serialize for PageSpan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PageSpan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A word-aligned slice of a document tagged with its source pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub page: PageSpan,
    pub text: String,
}

impl Chunk {
    /// Create a chunk with a freshly generated id
    pub fn new(title: String, url: String, page: PageSpan, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            url,
            page,
            text,
        }
    }

    /// Length of the chunk text in characters
    pub fn char_length(&self) -> usize {
        self.text.chars().count()
    }
}

/// Raw (untrimmed) character span visited by the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    pub start: usize,
    pub end: usize,
    pub is_first: bool,
    pub is_last: bool,
}

impl ChunkWindow {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
