//! Recursive character text splitter.
//!
//! Splits document text for embedding: try paragraph boundaries first,
//! then lines, then words, finally falling back to a character-level cut
//! for pathological runs. Adjacent chunks overlap so retrieval never
//! loses the sentence that straddles a boundary. Sizes are measured in
//! bytes but cuts always land on character boundaries, so Vietnamese
//! text stays intact.

use std::collections::VecDeque;

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveCharacterSplitter {
    /// `chunk_overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        assert!(chunk_overlap < chunk_size, "overlap must be smaller than chunk size");
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        if text.len() <= self.chunk_size {
            return vec![text.to_string()];
        }

        let Some((separator, rest)) = separators.split_first() else {
            return self.hard_split(text);
        };
        if !text.contains(separator) {
            return self.split_recursive(text, rest);
        }

        let mut chunks = Vec::new();
        let mut small: Vec<String> = Vec::new();
        for piece in text.split(separator) {
            if piece.len() <= self.chunk_size {
                small.push(piece.to_string());
            } else {
                if !small.is_empty() {
                    chunks.extend(self.merge_pieces(std::mem::take(&mut small), separator));
                }
                chunks.extend(self.split_recursive(piece, rest));
            }
        }
        if !small.is_empty() {
            chunks.extend(self.merge_pieces(small, separator));
        }
        chunks
    }

    /// Packs small pieces back into chunks up to `chunk_size`, keeping up
    /// to `chunk_overlap` bytes of trailing pieces as the head of the next
    /// chunk.
    fn merge_pieces(&self, pieces: Vec<String>, separator: &str) -> Vec<String> {
        let sep_len = separator.len();
        let mut chunks = Vec::new();
        let mut window: VecDeque<String> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = piece.len();
            if !window.is_empty() && total + sep_len + len > self.chunk_size {
                chunks.push(join(&window, separator));
                // Slide: drop leading pieces until the retained tail fits
                // the overlap budget and leaves room for the new piece.
                while !window.is_empty()
                    && (total > self.chunk_overlap || total + sep_len + len > self.chunk_size)
                {
                    let front = window.pop_front().expect("window is non-empty");
                    total -= front.len();
                    if !window.is_empty() {
                        total -= sep_len;
                    }
                }
            }
            if !window.is_empty() {
                total += sep_len;
            }
            total += len;
            window.push_back(piece);
        }

        if !window.is_empty() {
            chunks.push(join(&window, separator));
        }
        chunks
    }

    /// Last resort for text with no usable separators: cut at character
    /// boundaries close to `chunk_size`.
    fn hard_split(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = String::new();
        for ch in text.chars() {
            if !current.is_empty() && current.len() + ch.len_utf8() > self.chunk_size {
                out.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
        if !current.is_empty() {
            out.push(current);
        }
        out
    }
}

fn join(window: &VecDeque<String>, separator: &str) -> String {
    window
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(separator)
}
