//! Splits lesson text into overlapping fixed-size windows
//!
//! Chunks are measured in characters, not bytes, so multi-byte content
//! never splits inside a code point. Adjacent full-length chunks share
//! exactly `overlap` trailing/leading characters, and concatenating chunk 0
//! with the non-overlapping suffix of every later chunk reconstructs the
//! original text.

use crate::error::{LecternError, Result};
use crate::types::TextChunk;

/// Split `text` into chunks of at most `chunk_size` characters, each
/// advancing by `chunk_size - overlap` from the previous one.
///
/// Empty text yields an empty vec, not an error. Text no longer than
/// `chunk_size` yields a single chunk with index 0.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<TextChunk>> {
    if chunk_size == 0 {
        return Err(LecternError::InvalidArgument(
            "chunk size must be positive".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(LecternError::InvalidArgument(
            "overlap must be less than chunk size".to_string(),
        ));
    }

    if text.is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return Ok(vec![TextChunk {
            text: text.to_string(),
            index: 0,
        }]);
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::with_capacity((chars.len() - overlap).div_ceil(step));
    let mut position = 0;

    loop {
        let end = usize::min(position + chunk_size, chars.len());
        chunks.push(TextChunk {
            text: chars[position..end].iter().collect(),
            index: chunks.len(),
        });
        if end == chars.len() {
            break;
        }
        position += step;
    }

    Ok(chunks)
}
