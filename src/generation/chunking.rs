//! Splitting markdown policy documents into prompt-sized chunks.
//!
//! Lengths are counted in characters, not bytes.

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::GenerationConfig;

/// Header-aware markdown chunker.
#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    chunk_size: usize,
    overlap: usize,
    max_chunk_limit: usize,
    image: Regex,
    header: Regex,
}

impl MarkdownChunker {
    /// `overlap` must be smaller than `chunk_size`; a larger value is clamped.
    ///
    /// # Errors
    ///
    /// Returns an error if the markdown patterns fail to compile.
    pub fn new(chunk_size: usize, overlap: usize, max_chunk_limit: usize) -> Result<Self> {
        let chunk_size = chunk_size.max(1);
        let image = Regex::new(r"!\[.*?\]\(.*?\)").context("failed to compile image regex")?;
        let header = Regex::new(r"(?m)^[ \t]*#\s").context("failed to compile header regex")?;
        Ok(Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
            max_chunk_limit,
            image,
            header,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the markdown patterns fail to compile.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap, config.max_chunk_limit)
    }

    /// Chunks a markdown document.
    ///
    /// Images are dropped, the text is cut before every level-one header, and
    /// consecutive sections are merged while the merged text stays under the
    /// chunk size. A merged chunk longer than the max limit is re-split into
    /// overlapping windows.
    pub fn chunk(&self, markdown: &str) -> Vec<String> {
        let text = self.image.replace_all(markdown, "");

        let mut merged: Vec<String> = Vec::new();
        let mut buffer = String::new();
        let mut buffer_len = 0;
        for section in split_sections(&self.header, &text) {
            let section_len = section.chars().count();
            if buffer_len + section_len < self.chunk_size {
                buffer.push_str("\n\n");
                buffer.push_str(section);
                buffer_len += section_len + 2;
            } else {
                push_trimmed(&mut merged, &buffer);
                buffer = section.to_string();
                buffer_len = section_len;
            }
        }
        push_trimmed(&mut merged, &buffer);

        merged
            .into_iter()
            .flat_map(|chunk| {
                if chunk.chars().count() > self.max_chunk_limit {
                    self.sliding_windows(&chunk)
                } else {
                    vec![chunk]
                }
            })
            .collect()
    }

    /// Cuts `text` into windows of `chunk_size` characters, each starting
    /// `chunk_size - overlap` characters after the previous one.
    pub fn sliding_windows(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.overlap;

        let mut windows = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            windows.push(chars[start..end].iter().collect());
            start += step;
        }
        windows
    }
}

/// Splits before each level-one header, dropping blank sections.
fn split_sections<'t>(header: &Regex, text: &'t str) -> Vec<&'t str> {
    let mut cuts: Vec<usize> = header.find_iter(text).map(|m| m.start()).collect();
    cuts.push(text.len());

    let mut sections = Vec::with_capacity(cuts.len());
    let mut previous = 0;
    for cut in cuts {
        let section = text[previous..cut].trim();
        if !section.is_empty() {
            sections.push(section);
        }
        previous = cut;
    }
    sections
}

fn push_trimmed(chunks: &mut Vec<String>, buffer: &str) {
    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_are_removed() {
        let chunker = MarkdownChunker::new(100, 10, 200).unwrap();
        let chunks = chunker.chunk("# Title\nSee ![logo](img/logo.png) here.");
        assert_eq!(chunks, vec!["# Title\nSee  here."]);
    }

    #[test]
    fn small_sections_are_merged() {
        let chunker = MarkdownChunker::new(100, 10, 200).unwrap();
        let chunks = chunker.chunk("# A\nalpha\n# B\nbeta\n");
        assert_eq!(chunks, vec!["# A\nalpha\n\n# B\nbeta"]);
    }

    #[test]
    fn sections_start_a_new_chunk_once_the_buffer_is_full() {
        let chunker = MarkdownChunker::new(20, 5, 100).unwrap();
        let a = format!("# A\n{}", "a".repeat(12));
        let b = format!("# B\n{}", "b".repeat(12));
        let chunks = chunker.chunk(&format!("{a}\n{b}"));
        assert_eq!(chunks, vec![a, b]);
    }

    #[test]
    fn subheaders_do_not_split() {
        let chunker = MarkdownChunker::new(5, 1, 1000).unwrap();
        let chunks = chunker.chunk("# A\n## sub\ntext");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn oversized_chunks_become_overlapping_windows() {
        let chunker = MarkdownChunker::new(4, 1, 6).unwrap();
        let windows = chunker.chunk("abcdefghij");
        assert_eq!(windows, vec!["abcd", "defg", "ghij", "j"]);
    }

    #[test]
    fn windows_respect_multibyte_characters() {
        let chunker = MarkdownChunker::new(2, 0, 1).unwrap();
        assert_eq!(chunker.sliding_windows("ééé"), vec!["éé", "é"]);
    }

    #[test]
    fn empty_document_has_no_chunks() {
        let chunker = MarkdownChunker::from_config(&GenerationConfig::default()).unwrap();
        assert!(chunker.chunk("  \n").is_empty());
    }
}
