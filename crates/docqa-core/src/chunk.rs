//! Recursive, boundary-aware text chunker with overlap.
//!
//! Splits extracted document text into chunks of at most `chunk_size`
//! characters, where consecutive chunks share up to `chunk_overlap`
//! characters of context.
//!
//! # Algorithm
//!
//! 1. Pick the coarsest separator present in the text, trying paragraph
//!    (`\n\n`), line (`\n`), sentence (`". "`), word (`" "`) and finally
//!    individual characters.
//! 2. Split on it, keeping the separator attached to the end of each piece
//!    so that the pieces concatenate back to the input.
//! 3. Pieces longer than the piece limit are split again with the next,
//!    finer separator. Character splitting is the hard-cut fallback.
//! 4. All pieces are merged greedily, in order, into one sliding window.
//!    When the next piece would overflow the window, the window is emitted
//!    as a chunk and pieces are dropped from its front until at most
//!    `chunk_overlap` characters remain; those become the leading context of
//!    the next chunk.
//!
//! The piece limit is `min(chunk_overlap, chunk_size - chunk_overlap)`, or
//! `chunk_size` when no overlap is requested. With it, the retained tail
//! always holds at least one piece and still leaves room for the next one,
//! so neighbouring chunks share between 1 and `chunk_overlap` characters
//! whenever `chunk_overlap > 0`.
//!
//! Chunks are trimmed of surrounding whitespace and empty chunks are
//! dropped. Lengths are measured in characters, not bytes, so splitting is
//! always on UTF-8 boundaries.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::{chunk_text, ChunkParams};
//!
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", ChunkParams::default());
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph.".to_string()]);
//! assert!(chunk_text("", ChunkParams::default()).is_empty());
//! ```

use std::collections::VecDeque;

use anyhow::{ensure, Result};

/// Default maximum chunk length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Separators tried from coarsest to finest. The empty separator means
/// "split into characters" and always applies.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Chunk sizing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkParams {
    /// Validated constructor: `chunk_size > 0` and `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        ensure!(chunk_size > 0, "chunk_size must be > 0");
        ensure!(
            chunk_overlap < chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap,
            chunk_size
        );
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Split `text` into overlapping chunks.
///
/// Pure function: the same input and parameters always produce the same
/// sequence. Empty or whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, params: ChunkParams) -> Vec<String> {
    let mut chunks = Vec::new();
    if text.trim().is_empty() {
        return chunks;
    }
    let mut pieces = Vec::new();
    split_recursive(text, SEPARATORS, piece_limit(params), &mut pieces);
    merge_pieces(&pieces, params, &mut chunks);
    chunks
}

fn piece_limit(params: ChunkParams) -> usize {
    if params.chunk_overlap == 0 {
        params.chunk_size
    } else {
        params
            .chunk_overlap
            .min(params.chunk_size - params.chunk_overlap)
    }
}

fn split_recursive<'a>(text: &'a str, separators: &[&str], limit: usize, out: &mut Vec<&'a str>) {
    let position = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
        .unwrap_or(separators.len() - 1);
    let separator = separators[position];
    let finer = &separators[position + 1..];

    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) <= limit || finer.is_empty() {
            out.push(piece);
        } else {
            split_recursive(piece, finer, limit, out);
        }
    }
}

/// Split on `separator`, leaving it attached to the end of each piece.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        let end = idx + separator.len();
        pieces.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Greedily pack small pieces into chunks, carrying up to `chunk_overlap`
/// characters from the end of one chunk into the start of the next.
fn merge_pieces(pieces: &[&str], params: ChunkParams, out: &mut Vec<String>) {
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);

        if total + len > params.chunk_size && !window.is_empty() {
            emit_window(&window, out);
            while total > params.chunk_overlap || (total + len > params.chunk_size && total > 0) {
                match window.pop_front() {
                    Some((_, dropped)) => total -= dropped,
                    None => break,
                }
            }
        }

        window.push_back((piece, len));
        total += len;
    }

    if !window.is_empty() {
        emit_window(&window, out);
    }
}

fn emit_window(window: &VecDeque<(&str, usize)>, out: &mut Vec<String>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    push_chunk(&joined, out);
}

fn push_chunk(text: &str, out: &mut Vec<String>) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(count: usize) -> String {
        (0..count).map(|i| format!("word{} ", i)).collect()
    }

    /// Longest `k` such that the last `k` chars of `a` equal the first `k` of `b`.
    fn shared_boundary(a: &str, b: &str) -> usize {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let max = a.len().min(b.len());
        (1..=max)
            .rev()
            .find(|&k| a[a.len() - k..] == b[..k])
            .unwrap_or(0)
    }

    fn strip_ws(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", ChunkParams::default()).is_empty());
        assert!(chunk_text("   \n\n  ", ChunkParams::default()).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", ChunkParams::default());
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_3000_chars_gives_four_chunks() {
        let text = "abcd ".repeat(600);
        assert_eq!(text.len(), 3000);
        let chunks = chunk_text(&text, ChunkParams::new(1000, 200).unwrap());
        assert_eq!(chunks.len(), 4);
        for c in &chunks {
            assert!(c.chars().count() <= 1000);
        }
    }

    #[test]
    fn test_overlap_bound_between_neighbours() {
        let text = numbered_words(800);
        let params = ChunkParams::new(1000, 200).unwrap();
        let chunks = chunk_text(&text, params);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let shared = shared_boundary(&pair[0], &pair[1]);
            assert!(shared > 0, "adjacent chunks should share context");
            assert!(shared <= params.chunk_overlap, "overlap {} too large", shared);
        }
    }

    #[test]
    fn test_chunks_cover_input() {
        let text = format!(
            "{}\n\n{}\n{}",
            numbered_words(150),
            numbered_words(300),
            numbered_words(90)
        );
        let chunks = chunk_text(&text, ChunkParams::new(500, 100).unwrap());

        let mut rebuilt = String::new();
        for chunk in &chunks {
            let stripped = strip_ws(chunk);
            let skip = shared_boundary(&rebuilt, &stripped);
            rebuilt.extend(stripped.chars().skip(skip));
        }
        assert_eq!(rebuilt, strip_ws(&text));
    }

    #[test]
    fn test_deterministic() {
        let text = numbered_words(500);
        let params = ChunkParams::new(300, 50).unwrap();
        assert_eq!(chunk_text(&text, params), chunk_text(&text, params));
    }

    #[test]
    fn test_prefers_paragraph_boundaries_without_overlap() {
        let first = "alpha ".repeat(100);
        let second = "omega ".repeat(100);
        let text = format!("{}\n\n{}", first.trim(), second.trim());
        let chunks = chunk_text(&text, ChunkParams::new(1000, 0).unwrap());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], first.trim());
        assert_eq!(chunks[1], second.trim());
    }

    #[test]
    fn test_overlap_carries_across_paragraph_boundaries() {
        let text = format!(
            "short intro paragraph\n\n{}\n\ntail paragraph",
            numbered_words(170)
        );
        let params = ChunkParams::new(1000, 200).unwrap();
        let chunks = chunk_text(&text, params);
        assert!(chunks.len() > 1);
        for (i, pair) in chunks.windows(2).enumerate() {
            let shared = shared_boundary(&pair[0], &pair[1]);
            assert!(shared > 0, "chunks {} and {} share no context", i, i + 1);
            assert!(shared <= params.chunk_overlap, "overlap {} too large", shared);
        }
        assert!(chunks[0].starts_with("short intro paragraph"));
        assert!(chunks.last().unwrap().ends_with("tail paragraph"));
    }

    #[test]
    fn test_overlap_with_large_overlap_ratio() {
        let text = numbered_words(200);
        let params = ChunkParams::new(100, 80).unwrap();
        let chunks = chunk_text(&text, params);
        for pair in chunks.windows(2) {
            let shared = shared_boundary(&pair[0], &pair[1]);
            assert!(shared > 0 && shared <= params.chunk_overlap);
        }
        for c in &chunks {
            assert!(c.chars().count() <= 100);
        }
    }

    #[test]
    fn test_sentence_boundary_before_word() {
        let sentence = format!("{}end. ", "lorem ipsum ".repeat(5));
        let text = sentence.repeat(20);
        let chunks = chunk_text(&text, ChunkParams::new(200, 0).unwrap());
        for c in &chunks {
            assert!(c.ends_with("end."), "chunk should end on a sentence: {:?}", c);
        }
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let text = "x".repeat(2500);
        let chunks = chunk_text(&text, ChunkParams::new(1000, 200).unwrap());
        let lens: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lens, vec![1000, 1000, 900]);
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let text = "é".repeat(50);
        let chunks = chunk_text(&text, ChunkParams::new(20, 5).unwrap());
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 20);
        }
    }

    #[test]
    fn test_params_validation() {
        assert!(ChunkParams::new(0, 0).is_err());
        assert!(ChunkParams::new(100, 100).is_err());
        assert!(ChunkParams::new(100, 99).is_ok());
    }
}
