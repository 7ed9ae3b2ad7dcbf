pub mod chunking;
pub mod corpus;

use regex::Regex;

/// Cleans up line and whitespace artifacts left by PDF text extraction.
///
/// Applied to each page's raw text before it is written out as a
/// page-tagged block (see [`corpus::PageBlock`]).
pub struct TextNormalizer {
    newline_runs: Regex,
    blank_runs: Regex,
    page_footer: Regex,
    hyphenated_word: Regex,
    hyphenated_letters: Regex,
    whitespace_runs: Regex,
    url: Regex,
}

impl TextNormalizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(TextNormalizer {
            newline_runs: Regex::new(r"\n+")?,
            blank_runs: Regex::new(r"[ \t]+")?,
            // "– Page 12 –" running footers (en dash delimited)
            page_footer: Regex::new(r"(?i)–\s*Page\s*\d+\s*–")?,
            hyphenated_word: Regex::new(r"\b(\w+)\s*-\s*(\w+)\b")?,
            hyphenated_letters: Regex::new(r"\b([А-Яа-яA-Za-zёЁ]+)\s*-\s*([А-Яа-яA-Za-zёЁ]+)\b")?,
            whitespace_runs: Regex::new(r"\s{2,}")?,
            url: Regex::new(r"https?://\S+|www\.\S+")?,
        })
    }

    pub fn normalize(&self, text: &str) -> String {
        let text = self.newline_runs.replace_all(text, "\n");
        let text = self.blank_runs.replace_all(&text, " ");
        let text = text.replace('\u{a0}', " ");
        let text = self.page_footer.replace_all(&text, "");
        let text = self.hyphenated_word.replace_all(&text, "${1}${2}");
        let text = self.hyphenated_letters.replace_all(&text, "${1}${2}");
        let text = self.whitespace_runs.replace_all(&text, " ");
        text.trim().to_string()
    }

    /// First link found in the raw text of a page, used as the document URL.
    pub fn find_url<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.url.find(text).map(|m| m.as_str())
    }
}
