//! Overlapping text chunker.
//!
//! Splits extracted document text into [`Chunk`]s of at most `chunk_size`
//! characters. Paragraphs (`\n\n`) are packed greedily; paragraphs that are
//! too long on their own are broken into words, and words that are still too
//! long are cut at `chunk_size`. When a chunk is emitted, its trailing pieces
//! totalling at most `chunk_overlap` characters seed the next chunk.
//!
//! Lengths are counted in `char`s, so multi-byte scripts never split inside a
//! code point.

use std::collections::VecDeque;

use crate::models::Chunk;

const PARAGRAPH_BREAK: &str = "\n\n";
const WORD_BREAK: &str = " ";

struct Piece {
    text: String,
    len: usize,
    /// Separator placed before this piece unless it starts a chunk.
    joiner: &'static str,
}

/// Split text into overlapping chunks with contiguous indices starting at 0.
///
/// Returns no chunks for text that is empty after trimming.
pub fn chunk_text(source: &str, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut window: VecDeque<Piece> = VecDeque::new();
    let mut window_len = 0usize;
    let mut chunk_index: i64 = 0;

    for piece in split_pieces(text, chunk_size) {
        if !window.is_empty() && window_len + piece.joiner.len() + piece.len > chunk_size {
            chunks.push(make_chunk(source, chunk_index, &render(&window)));
            chunk_index += 1;

            // Keep a tail of at most `chunk_overlap` chars that still leaves
            // room for the incoming piece.
            while !window.is_empty()
                && (window_len > chunk_overlap
                    || window_len + piece.joiner.len() + piece.len > chunk_size)
            {
                window_len -= pop_front_len(&mut window);
            }
        }

        window_len = if window.is_empty() {
            piece.len
        } else {
            window_len + piece.joiner.len() + piece.len
        };
        window.push_back(piece);
    }

    if !window.is_empty() {
        chunks.push(make_chunk(source, chunk_index, &render(&window)));
    }

    chunks
}

fn split_pieces(text: &str, chunk_size: usize) -> Vec<Piece> {
    let mut pieces = Vec::new();

    for para in text.split(PARAGRAPH_BREAK) {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let len = trimmed.chars().count();
        if len <= chunk_size {
            pieces.push(Piece {
                text: trimmed.to_string(),
                len,
                joiner: PARAGRAPH_BREAK,
            });
            continue;
        }

        let mut joiner = PARAGRAPH_BREAK;
        for word in trimmed.split_whitespace() {
            for part in hard_split(word, chunk_size) {
                let len = part.chars().count();
                pieces.push(Piece {
                    text: part,
                    len,
                    joiner,
                });
                joiner = WORD_BREAK;
            }
        }
    }

    pieces
}

fn hard_split(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect())
        .collect()
}

/// Removes the first piece and returns how much the rendered length shrinks,
/// including the separator that preceded the new first piece.
fn pop_front_len(window: &mut VecDeque<Piece>) -> usize {
    let Some(front) = window.pop_front() else {
        return 0;
    };
    let joiner = window.front().map(|next| next.joiner.len()).unwrap_or(0);
    front.len + joiner
}

fn render(window: &VecDeque<Piece>) -> String {
    let mut out = String::new();
    for (i, piece) in window.iter().enumerate() {
        if i > 0 {
            out.push_str(piece.joiner);
        }
        out.push_str(&piece.text);
    }
    out
}

fn make_chunk(source: &str, index: i64, text: &str) -> Chunk {
    Chunk {
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
    }
}
