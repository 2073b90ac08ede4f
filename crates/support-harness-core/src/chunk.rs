//! Overlapping fixed-window text chunker.
//!
//! Splits document text into windows of at most `window_chars` characters.
//! Consecutive windows share roughly `overlap_fraction × window_chars`
//! characters so a sentence that straddles a boundary is still seen whole
//! by at least one chunk.
//!
//! # Algorithm
//!
//! 1. Measure everything in `char`s, never bytes, so multi-byte UTF-8 text
//!    can never be split mid-character.
//! 2. A window starts at `start` and nominally ends at `start + window_chars`.
//! 3. If the window does not reach the end of the text, its end backs off to
//!    the last whitespace, provided at least half the window is kept.
//! 4. The next window starts `overlap` characters before the previous end,
//!    nudged forward to a word start when one exists inside the overlap.
//! 5. Every step advances by at least one character.
//!
//! Chunk ids are UUID v5 values derived from `(source_type, title, index)`,
//! so re-ingesting the same document overwrites its chunks instead of
//! duplicating them.
//!
//! # Example
//!
//! ```rust
//! use support_harness_core::chunk::{split_windows, ChunkingParams};
//!
//! let params = ChunkingParams::new(500, 0.15).unwrap();
//! let windows = split_windows("Reset your password via Settings > Account", &params);
//! assert_eq!(windows.len(), 1);
//! assert_eq!(windows[0].index, 0);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::DocumentKey;

/// Namespace for chunk id derivation. Changing it re-keys every chunk.
const CHUNK_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_4c2e_9a3d_4e57_8c61_2f0a_d3b4_e5c7);

/// Window length and overlap used by [`split_windows`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkingParams {
    pub window_chars: usize,
    pub overlap_fraction: f32,
}

impl ChunkingParams {
    /// Validates `window_chars > 0` and `0.0 <= overlap_fraction < 0.5`.
    pub fn new(window_chars: usize, overlap_fraction: f32) -> Result<Self> {
        if window_chars == 0 {
            return Err(RagError::Config("chunking.window_chars must be > 0".into()));
        }
        if !(0.0..0.5).contains(&overlap_fraction) {
            return Err(RagError::Config(
                "chunking.overlap_fraction must be in [0.0, 0.5)".into(),
            ));
        }
        Ok(Self {
            window_chars,
            overlap_fraction,
        })
    }

    /// Overlap in characters, always strictly smaller than the window.
    pub fn overlap_chars(&self) -> usize {
        let overlap = (self.window_chars as f32 * self.overlap_fraction).round() as usize;
        overlap.min(self.window_chars.saturating_sub(1))
    }
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            window_chars: 500,
            overlap_fraction: 0.15,
        }
    }
}

/// One window of text produced by [`split_windows`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextWindow {
    /// Contiguous index among the emitted windows.
    pub index: i64,
    /// Window text with surrounding whitespace trimmed.
    pub text: String,
    /// Char offset where the untrimmed window begins.
    pub start: usize,
    /// Char offset one past the untrimmed window's last character.
    pub end: usize,
}

/// Split `text` into overlapping windows.
///
/// Returns an empty vector for empty or whitespace-only text; callers that
/// require content reject that case themselves.
pub fn split_windows(text: &str, params: &ChunkingParams) -> Vec<TextWindow> {
    let chars: Vec<char> = text.chars().collect();
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = chars.len();
    let window = params.window_chars.max(1);
    let overlap = params.overlap_chars();

    let mut windows = Vec::new();
    let mut start = 0usize;
    let mut index = 0i64;

    while start < total {
        let mut end = (start + window).min(total);

        if end < total {
            let floor = start + window / 2;
            if let Some(ws) = (floor + 1..=end).rev().find(|&j| chars[j].is_whitespace()) {
                end = ws;
            }
        }

        let piece = text[offsets[start]..offsets[end]].trim();
        if !piece.is_empty() {
            windows.push(TextWindow {
                index,
                text: piece.to_string(),
                start,
                end,
            });
            index += 1;
        }

        if end >= total {
            break;
        }

        let raw_next = end.saturating_sub(overlap).max(start + 1);
        start = align_to_word_start(&chars, raw_next, end);
    }

    windows
}

/// Move `pos` forward to the start of the next word, but never to `limit`.
fn align_to_word_start(chars: &[char], pos: usize, limit: usize) -> usize {
    if pos == 0 || chars[pos - 1].is_whitespace() {
        return pos;
    }
    let mut i = pos;
    while i < limit && !chars[i - 1].is_whitespace() {
        i += 1;
    }
    if i < limit {
        i
    } else {
        pos
    }
}

/// Deterministic chunk id for window `index` of the document `key`.
///
/// The product version is part of the id, so the same title ingested for
/// two versions keeps both sets of chunks.
pub fn chunk_id(key: &DocumentKey, product_version: Option<&str>, index: i64) -> String {
    let name = match product_version {
        Some(version) => format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}",
            key.source_type, key.title, version, index
        ),
        None => format!("{}\u{1f}{}\u{1f}{}", key.source_type, key.title, index),
    };
    Uuid::new_v5(&CHUNK_NAMESPACE, name.as_bytes()).to_string()
}

/// Hex-encoded SHA-256 of a chunk's text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use proptest::prelude::*;

    fn params(window: usize, overlap: f32) -> ChunkingParams {
        ChunkingParams::new(window, overlap).unwrap()
    }

    #[test]
    fn test_small_text_single_window() {
        let windows = split_windows("Hello, world!", &params(500, 0.15));
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].text, "Hello, world!");
        assert_eq!(windows[0].start, 0);
    }

    #[test]
    fn test_empty_and_blank_text() {
        assert!(split_windows("", &params(10, 0.1)).is_empty());
        assert!(split_windows("   \n\t ", &params(10, 0.1)).is_empty());
    }

    #[test]
    fn test_windows_overlap() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let windows = split_windows(text, &params(10, 0.2));
        assert!(windows.len() > 2);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 2, "overlap should be 2 chars");
        }
        assert_eq!(windows.last().unwrap().end, text.chars().count());
    }

    #[test]
    fn test_breaks_on_whitespace() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let windows = split_windows(text, &params(12, 0.0));
        for w in &windows {
            assert!(!w.text.starts_with(' ') && !w.text.ends_with(' '));
            assert!(w.text.chars().count() <= 12);
        }
        assert_eq!(windows[0].text, "alpha beta");
    }

    #[test]
    fn test_multibyte_utf8() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let windows = split_windows(text, &params(7, 0.25));
        assert!(!windows.is_empty());
        for w in &windows {
            assert!(w.text.chars().count() <= 7);
        }
    }

    #[test]
    fn test_indices_contiguous() {
        let text = (0..80)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let windows = split_windows(&text, &params(40, 0.15));
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.index, i as i64);
        }
    }

    #[test]
    fn test_params_validation() {
        assert!(ChunkingParams::new(0, 0.1).is_err());
        assert!(ChunkingParams::new(100, 0.5).is_err());
        assert!(ChunkingParams::new(100, -0.1).is_err());
        assert_eq!(params(500, 0.15).overlap_chars(), 75);
        assert_eq!(params(1, 0.4).overlap_chars(), 0);
    }

    #[test]
    fn test_chunk_id_deterministic() {
        let key = DocumentKey::new("Guide", SourceType::Md);
        assert_eq!(chunk_id(&key, None, 0), chunk_id(&key, None, 0));
        assert_ne!(chunk_id(&key, None, 0), chunk_id(&key, None, 1));
        let other = DocumentKey::new("Guide", SourceType::Txt);
        assert_ne!(chunk_id(&key, None, 0), chunk_id(&other, None, 0));
        assert_ne!(chunk_id(&key, Some("1.0"), 0), chunk_id(&key, Some("2.0"), 0));
        assert_ne!(chunk_id(&key, Some("1.0"), 0), chunk_id(&key, None, 0));
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(content_hash("a"), content_hash("a"));
        assert_ne!(content_hash("a"), content_hash("b"));
        assert_eq!(content_hash("").len(), 64);
    }

    proptest! {
        #[test]
        fn prop_windows_bounded_and_connected(
            text in "[a-zé漢]{1,6}( [a-zé漢]{1,6}){0,80}",
            window in 8usize..64,
            overlap in 0.0f32..0.45,
        ) {
            let p = params(window, overlap);
            let windows = split_windows(&text, &p);
            prop_assert!(!windows.is_empty());
            prop_assert_eq!(windows[0].start, 0);
            prop_assert_eq!(windows.last().unwrap().end, text.chars().count());
            for w in &windows {
                prop_assert!(w.end - w.start <= window);
                prop_assert!(text.contains(&w.text));
            }
            for pair in windows.windows(2) {
                prop_assert!(pair[1].start > pair[0].start);
                prop_assert!(pair[1].start <= pair[0].end);
            }
        }
    }
}
