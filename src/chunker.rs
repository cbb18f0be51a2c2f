use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

pub const MAX_CHUNK_SIZE: usize = 4000;

/// One slice of the input text, in original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// Cut every `max_chars` characters.
    #[default]
    Fixed,
    /// Cut after sentence punctuation when it fits, hard-split otherwise.
    Sentences,
}

pub fn chunk_text(text: &str, max_chars: usize, strategy: ChunkStrategy) -> Vec<TextChunk> {
    let chunks = match strategy {
        ChunkStrategy::Fixed => split_fixed(text, max_chars),
        ChunkStrategy::Sentences => split_sentences(text, max_chars),
    };
    debug!(
        "Split {} chars into {} chunks ({:?}, max {})",
        text.chars().count(),
        chunks.len(),
        strategy,
        max_chars
    );
    chunks
}

/// Partition `text` into chunks of exactly `max_chars` characters (the last one
/// may be shorter). Empty text yields no chunks.
pub fn split_fixed(text: &str, max_chars: usize) -> Vec<TextChunk> {
    assert!(max_chars > 0, "max_chars must be positive");
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let cut = byte_offset_of_char(rest, max_chars);
        let (head, tail) = rest.split_at(cut);
        chunks.push(TextChunk {
            index: chunks.len(),
            content: head.to_string(),
        });
        rest = tail;
    }
    chunks
}

fn sentence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+\s*").expect("sentence pattern is valid"))
}

/// Like [`split_fixed`], but prefers to end chunks on a sentence boundary.
/// Whitespace after the punctuation stays with the sentence it follows, so the
/// chunks still concatenate back to `text`.
pub fn split_sentences(text: &str, max_chars: usize) -> Vec<TextChunk> {
    assert!(max_chars > 0, "max_chars must be positive");

    let mut sentences = Vec::new();
    let mut start = 0;
    for m in sentence_regex().find_iter(text) {
        sentences.push(&text[start..m.end()]);
        start = m.end();
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;
    for sentence in sentences {
        let len = sentence.chars().count();
        if current_chars + len <= max_chars {
            current.push_str(sentence);
            current_chars += len;
            continue;
        }
        if !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if len <= max_chars {
            current.push_str(sentence);
            current_chars = len;
        } else {
            // a single sentence longer than a chunk gets hard-split; the tail
            // stays open so the next sentence can join it
            let mut parts = split_fixed(sentence, max_chars);
            if let Some(last) = parts.pop() {
                current_chars = last.content.chars().count();
                current = last.content;
            }
            pieces.extend(parts.into_iter().map(|c| c.content));
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, content)| TextChunk { index, content })
        .collect()
}

fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}
