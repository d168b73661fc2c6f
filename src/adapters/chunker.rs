//! The chunker capability: splits document text into ordered spans for
//! embedding and retrieval.
//!
//! Adapted from the teacher's `rag/chunker.rs::TextChunker`, generalized
//! with a `size_unit` so `chunk_size`/`chunk_overlap` can be expressed in
//! characters or in the crate's heuristic token estimate (`~4 chars/token`,
//! [`crate::types::estimate_tokens`]).

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use text_splitter::TextSplitter;

use crate::error::{RagError, Result};

/// Chunking strategy: which boundaries the splitter respects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkingStrategy {
    #[default]
    Word,
    Semantic,
    Character,
}

impl FromStr for ChunkingStrategy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "word" | "words" | "recursive" => Ok(Self::Word),
            "semantic" | "sentence" | "paragraph" | "markdown" => Ok(Self::Semantic),
            "character" | "char" | "chars" => Ok(Self::Character),
            _ => Err(RagError::ValidationError {
                field: "chunking_strategy".into(),
                reason: format!("unknown strategy: {s}"),
            }),
        }
    }
}

/// Whether `chunk_size`/`chunk_overlap` are counted in characters or in the
/// heuristic token estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizeUnit {
    #[default]
    Characters,
    Tokens,
}

/// `~4 chars/token`, matching [`crate::types::estimate_tokens`].
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    #[serde(default)]
    pub strategy: ChunkingStrategy,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default)]
    pub size_unit: SizeUnit,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_min_chunk_size() -> usize {
    20
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::default(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            size_unit: SizeUnit::default(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

impl ChunkerConfig {
    /// `chunk_size`/`chunk_overlap` translated into character counts, the
    /// unit every internal splitter actually works in.
    fn char_size(&self) -> usize {
        match self.size_unit {
            SizeUnit::Characters => self.chunk_size,
            SizeUnit::Tokens => self.chunk_size * CHARS_PER_TOKEN,
        }
    }

    fn char_overlap(&self) -> usize {
        match self.size_unit {
            SizeUnit::Characters => self.chunk_overlap,
            SizeUnit::Tokens => self.chunk_overlap * CHARS_PER_TOKEN,
        }
    }
}

/// One chunk produced by a [`Chunker`], with the offsets and token count the
/// ingestion pipeline attaches to the owning [`crate::types::Chunk`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub index: usize,
    pub content: String,
    pub start_char: usize,
    pub end_char: usize,
    pub token_count: usize,
}

/// Splits text into [`ChunkSpan`]s per a [`ChunkerConfig`].
pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str, config: &ChunkerConfig) -> Result<Vec<ChunkSpan>>;
}

/// The default, dependency-light chunker: word/character splitting with
/// overlap, and `text-splitter`-backed semantic splitting.
#[derive(Debug, Clone, Default)]
pub struct TextChunker;

impl TextChunker {
    pub fn new() -> Self {
        Self
    }

    fn chunk_by_words(text: &str, config: &ChunkerConfig) -> Vec<ChunkSpan> {
        let char_size = config.char_size();
        let char_overlap = config.char_overlap();
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut spans = Vec::new();
        let mut chunk_index = 0;
        let mut word_index = 0;
        let mut char_cursor = 0;

        while word_index < words.len() {
            let start_offset = char_cursor;
            let mut end = word_index;
            let mut content = String::new();
            while end < words.len() && content.len() < char_size {
                if !content.is_empty() {
                    content.push(' ');
                }
                content.push_str(words[end]);
                end += 1;
            }
            let end_offset = start_offset + content.len();

            if content.len() >= config.min_chunk_size || end == words.len() {
                spans.push(ChunkSpan {
                    index: chunk_index,
                    token_count: crate::types::estimate_tokens(&content),
                    content,
                    start_char: start_offset,
                    end_char: end_offset,
                });
                chunk_index += 1;
            }

            // Advance by roughly (size - overlap) characters, measured in
            // whole words, so consecutive chunks overlap by char_overlap.
            let mut advanced_chars = 0;
            let mut next_word_index = word_index;
            while next_word_index < end && advanced_chars < char_size.saturating_sub(char_overlap).max(1) {
                advanced_chars += words[next_word_index].len() + 1;
                next_word_index += 1;
            }
            if next_word_index <= word_index {
                next_word_index = word_index + 1;
            }
            char_cursor += advanced_chars;
            word_index = next_word_index;
        }

        spans
    }

    fn chunk_by_characters(text: &str, config: &ChunkerConfig) -> Vec<ChunkSpan> {
        let char_size = config.char_size();
        let char_overlap = config.char_overlap();
        let chars: Vec<char> = text.chars().collect();
        let step = char_size.saturating_sub(char_overlap).max(1);

        let mut spans = Vec::new();
        let mut index = 0;
        let mut chunk_index = 0;

        while index < chars.len() {
            let end = (index + char_size).min(chars.len());
            let content: String = chars[index..end].iter().collect();

            if content.len() >= config.min_chunk_size || end == chars.len() {
                spans.push(ChunkSpan {
                    index: chunk_index,
                    token_count: crate::types::estimate_tokens(&content),
                    content,
                    start_char: index,
                    end_char: end,
                });
                chunk_index += 1;
            }

            index += step;
        }

        spans
    }

    fn chunk_semantically(text: &str, config: &ChunkerConfig) -> Vec<ChunkSpan> {
        let splitter = TextSplitter::new(config.char_size());
        let mut spans = Vec::new();
        let mut cursor = 0;

        for (index, piece) in splitter.chunks(text).enumerate() {
            let start = text[cursor..].find(piece).map(|p| cursor + p).unwrap_or(cursor);
            let end = start + piece.len();
            if piece.len() >= config.min_chunk_size {
                spans.push(ChunkSpan {
                    index,
                    content: piece.to_string(),
                    token_count: crate::types::estimate_tokens(piece),
                    start_char: start,
                    end_char: end,
                });
            }
            cursor = end;
        }

        spans
    }
}

impl Chunker for TextChunker {
    fn chunk(&self, text: &str, config: &ChunkerConfig) -> Result<Vec<ChunkSpan>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(match config.strategy {
            ChunkingStrategy::Word => Self::chunk_by_words(text, config),
            ChunkingStrategy::Semantic => Self::chunk_semantically(text, config),
            ChunkingStrategy::Character => Self::chunk_by_characters(text, config),
        })
    }
}
