//! Sentence-aligned text chunking.
//!
//! Splits synthesized document text into bounded spans: sentences are packed
//! greedily up to `max_chars`, and anything without a usable sentence
//! boundary falls back to fixed-size character slicing.

use std::sync::OnceLock;

use regex::Regex;

fn sentence_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+\s+").expect("valid sentence boundary regex"))
}

/// Split `text` into non-empty chunks of at most `max_chars` characters.
///
/// Deterministic for a given input. Empty or whitespace-only input yields an
/// empty Vec. A single sentence longer than `max_chars` is sliced at fixed
/// character offsets instead.
pub fn chunk(text: &str, max_chars: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let max_chars = max_chars.max(1);

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(trimmed) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        let sentence_len = sentence.chars().count();

        if sentence_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            chunks.extend(slice_fixed(sentence, max_chars));
            continue;
        }

        if !current.is_empty() && current_len + 1 + sentence_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if current.is_empty() {
            current.push_str(sentence);
            current_len = sentence_len;
        } else {
            current.push(' ');
            current.push_str(sentence);
            current_len += 1 + sentence_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split on sentence-ending punctuation followed by whitespace, keeping the
/// punctuation with the preceding sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for boundary in sentence_boundary().find_iter(text) {
        sentences.push(&text[start..boundary.end()]);
        start = boundary.end();
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

fn slice_fixed(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|slice| slice.iter().collect::<String>().trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_whitespace(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn packs_sentences_up_to_limit() {
        let text = "The kitchen has hardwood floors. The walls are painted white. A large window faces the garden.";
        let chunks = chunk(text, 60);

        assert!(chunks.len() >= 2);
        for piece in &chunks {
            assert!(piece.chars().count() <= 60, "chunk too long: {piece:?}");
            assert!(!piece.is_empty());
        }
    }

    #[test]
    fn rejoined_output_preserves_non_whitespace() {
        let text = "Bathroom fixtures: double vanity, walk-in shower. Tiled in ceramic. Needs regrouting!";
        let chunks = chunk(text, 40);
        assert_eq!(non_whitespace(&chunks.join("")), non_whitespace(text));
    }

    #[test]
    fn falls_back_to_fixed_slices_without_boundaries() {
        let text = "x".repeat(250);
        let chunks = chunk(&text, 100);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 100);
        assert_eq!(chunks[2].chars().count(), 50);
    }

    #[test]
    fn oversized_sentence_is_sliced() {
        let long = format!("{}.", "word ".repeat(50).trim());
        let text = format!("Short one. {long}");
        let chunks = chunk(&text, 80);

        assert!(chunks.iter().all(|c| c.chars().count() <= 80));
        assert_eq!(non_whitespace(&chunks.join("")), non_whitespace(&text));
    }

    #[test]
    fn empty_and_whitespace_input_yield_nothing() {
        assert!(chunk("", 100).is_empty());
        assert!(chunk("   \n\t  ", 100).is_empty());
    }

    #[test]
    fn deterministic_for_same_input() {
        let text = "One. Two. Three. Four. Five.";
        assert_eq!(chunk(text, 12), chunk(text, 12));
    }
}
