//! Text chunkers.
//!
//! Two strategies are used by the ingest pipeline:
//!
//! - [`chunk_words`]: fixed word windows with overlap, used for PDFs.
//! - [`split_recursive`]: character-bounded pieces that prefer to break on
//!   paragraph, line, then sentence boundaries, used for short CSV
//!   responses.
//!
//! Chunk IDs are derived from a SHA-256 of the chunk text so that
//! re-ingesting identical text overwrites instead of duplicating.

use sha2::{Digest, Sha256};

use crate::models::{Chunk, ChunkMetadata};

/// Hex digits of the text hash kept in a chunk id.
const ID_HASH_LEN: usize = 32;

/// Separators tried in order by [`split_recursive`].
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". "];

/// Hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Split `text` into windows of `window` words, each starting `window - overlap`
/// words after the previous one. Whitespace-only input yields no chunks.
pub fn chunk_words(
    source: &str,
    source_hash: &str,
    text: &str,
    window: usize,
    overlap: usize,
) -> Vec<Chunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let step = window.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + window).min(words.len());
        let piece = words[start..end].join(" ");
        chunks.push(make_chunk(source, source_hash, chunks.len(), &piece));
        start += step;
    }
    chunks
}

pub fn make_chunk(source: &str, source_hash: &str, index: usize, text: &str) -> Chunk {
    let digest = sha256_hex(text.as_bytes());
    Chunk {
        id: format!("{}_{}", source, &digest[..ID_HASH_LEN]),
        text: text.to_string(),
        metadata: ChunkMetadata {
            source: source.to_string(),
            chunk_index: index,
            source_hash: source_hash.to_string(),
            tags: Default::default(),
        },
    }
}

/// Split `text` into pieces of at most `chunk_size` characters, consecutive
/// pieces sharing up to `overlap` characters.
///
/// The first separator present in the text is used; pieces still too long
/// are split again with the remaining separators, and finally by characters.
/// Separators stay attached to the end of the piece they terminate.
pub fn split_recursive(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);

    let (sep, rest) = match separators.iter().position(|s| text.contains(s)) {
        Some(i) => (separators[i], &separators[i + 1..]),
        None => return split_chars(text, chunk_size, overlap),
    };

    let pieces = split_keep_separator(text, sep);
    let mut out = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();

    for piece in pieces {
        if char_len(piece) <= chunk_size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            out.extend(merge_pieces(&fitting, chunk_size, overlap));
            fitting.clear();
        }
        out.extend(split_recursive(piece, chunk_size, overlap, rest));
    }
    if !fitting.is_empty() {
        out.extend(merge_pieces(&fitting, chunk_size, overlap));
    }
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_keep_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(sep) {
        let end = idx + sep.len();
        if end > start {
            pieces.push(&text[start..end]);
        }
        start = end;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Greedily pack small pieces into windows, carrying trailing pieces worth
/// at most `overlap` characters into the next window.
fn merge_pieces(pieces: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);
        if total + len > chunk_size && !window.is_empty() {
            push_trimmed(&mut out, &window.concat());
            while !window.is_empty() && (total > overlap || total + len > chunk_size) {
                total -= char_len(window[0]);
                window.remove(0);
            }
        }
        window.push(piece);
        total += len;
    }
    if !window.is_empty() {
        push_trimmed(&mut out, &window.concat());
    }
    out
}

fn split_chars(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - overlap;
    let mut out = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        push_trimmed(&mut out, &chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    out
}

fn push_trimmed(out: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}
