use serde::{Deserialize, Serialize};

use crate::translate::markup::strip_markup;

/// Reader-facing JSON document stored next to the EPUB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderContent {
    pub chapters: Vec<ReaderChapter>,
    pub metadata: ReaderMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderChapter {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderMetadata {
    pub title: String,
    pub title_original: String,
    pub author: String,
    pub source_url: String,
    pub word_count: u64,
}

impl ReaderContent {
    /// Single-chapter document over the translated blocks.
    pub fn single_chapter(
        title: &str,
        title_original: &str,
        author: &str,
        source_url: &str,
        blocks: &[String],
    ) -> Self {
        Self {
            chapters: vec![ReaderChapter {
                title: title.to_owned(),
                content: blocks.join("\n"),
            }],
            metadata: ReaderMetadata {
                title: title.to_owned(),
                title_original: title_original.to_owned(),
                author: author.to_owned(),
                source_url: source_url.to_owned(),
                word_count: word_count(blocks),
            },
        }
    }
}

/// Whitespace-separated words across the text content of `blocks`.
pub fn word_count(blocks: &[String]) -> u64 {
    blocks
        .iter()
        .map(|block| strip_markup(block).split_whitespace().count() as u64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_words_without_markup() {
        let blocks = vec![
            "<p>Ele <em>correu</em> para casa.</p>".to_owned(),
            "<h2>Capítulo dois</h2>".to_owned(),
            "<p></p>".to_owned(),
        ];
        assert_eq!(word_count(&blocks), 6);
    }

    #[test]
    fn counts_words_after_decoding_entities() {
        let blocks = vec!["<p>Tom &amp; Jerry said&nbsp;hi</p>".to_owned()];
        assert_eq!(word_count(&blocks), 5);
    }

    #[test]
    fn serializes_reader_shape() {
        let content = ReaderContent::single_chapter(
            "Título",
            "Title",
            "anon",
            "https://archiveofourown.org/works/1",
            &["<p>um dois</p>".to_owned(), "<p>três</p>".to_owned()],
        );
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value["chapters"][0]["title"], "Título");
        assert_eq!(value["chapters"][0]["content"], "<p>um dois</p>\n<p>três</p>");
        assert_eq!(value["metadata"]["title_original"], "Title");
        assert_eq!(value["metadata"]["word_count"], 3);
    }
}
