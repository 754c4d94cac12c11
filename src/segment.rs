//! Word-aligned transcript segmentation.
//!
//! Long transcripts are split into chunks that each fit a single completion
//! request. Lengths are counted in `char`s so multi-byte text is budgeted the
//! same way it is displayed.

use serde::{Deserialize, Serialize};

/// Default per-chunk character budget
pub const DEFAULT_MAX_CHARS_PER_CHUNK: usize = 400_000;

/// A contiguous, word-aligned slice of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based position within the transcript
    pub index: usize,
    pub text: String,
    /// Length of `text` in chars
    pub char_len: usize,
}

impl Chunk {
    fn new(index: usize, text: String) -> Self {
        let char_len = text.chars().count();
        Self {
            index,
            text,
            char_len,
        }
    }
}

/// Segment boundary policy: the maximum number of chars per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    max_chars: usize,
}

impl Segmenter {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn segment(&self, text: &str) -> Vec<Chunk> {
        segment(text, self.max_chars)
    }

    /// Number of chunks `text` would be split into.
    pub fn count_chunks(&self, text: &str) -> usize {
        self.segment(text).len()
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS_PER_CHUNK)
    }
}

/// Split `text` into ordered chunks of at most `max_chars` chars.
///
/// Text that already fits is returned verbatim as a single chunk. Otherwise
/// whitespace-delimited words are packed greedily, each costing its length
/// plus one separator. A single word longer than the budget becomes its own
/// oversized chunk rather than being truncated. The result always holds at
/// least one chunk, so empty input yields one empty chunk.
pub fn segment(text: &str, max_chars: usize) -> Vec<Chunk> {
    if text.chars().count() <= max_chars {
        return vec![Chunk::new(0, text.to_string())];
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count() + 1;
        if !current.is_empty() && current_len + word_len > max_chars {
            chunks.push(Chunk::new(chunks.len(), current.join(" ")));
            current.clear();
            current_len = 0;
        }
        current.push(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(Chunk::new(chunks.len(), current.join(" ")));
    }

    // Whitespace-only input over budget has no words at all.
    if chunks.is_empty() {
        chunks.push(Chunk::new(0, String::new()));
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_of(chunks: &[Chunk]) -> Vec<String> {
        chunks
            .iter()
            .flat_map(|c| c.text.split_whitespace().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_short_input_is_single_verbatim_chunk() {
        let text = "  hello   world \n";
        let chunks = segment(text, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].char_len, text.chars().count());
    }

    #[test]
    fn test_exact_budget_is_single_chunk() {
        let text = "abcde fghij";
        let chunks = segment(text, text.len());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_empty_input_yields_one_empty_chunk() {
        let chunks = segment("", 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
        assert_eq!(chunks[0].char_len, 0);
    }

    #[test]
    fn test_whitespace_only_over_budget_yields_one_empty_chunk() {
        let chunks = segment(&" ".repeat(50), 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
    }

    #[test]
    fn test_greedy_packing() {
        // Each word costs 4 (3 chars + separator); budget 8 fits two words.
        let chunks = segment("aaa bbb ccc ddd eee", 8);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaa bbb", "ccc ddd", "eee"]);
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_word_sequence_is_preserved() {
        let text = "the quick brown fox jumps over the lazy dog again and again";
        let chunks = segment(text, 12);
        assert!(chunks.len() > 1);
        let expected: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        assert_eq!(words_of(&chunks), expected);
        assert_eq!(words_of(&chunks).join(" "), expected.join(" "));
    }

    #[test]
    fn test_chunks_respect_budget() {
        let text = (0..500)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let budget = 64;
        for chunk in segment(&text, budget) {
            assert!(chunk.char_len <= budget, "chunk too long: {}", chunk.char_len);
        }
    }

    #[test]
    fn test_single_giant_token_is_kept_whole() {
        let token = "x".repeat(25);
        let chunks = segment(&token, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, token);
        assert_eq!(chunks[0].char_len, 25);
    }

    #[test]
    fn test_oversized_word_between_small_words() {
        let giant = "y".repeat(30);
        let text = format!("aa bb {} cc", giant);
        let chunks = segment(&text, 10);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aa bb", giant.as_str(), "cc"]);
        for chunk in &chunks {
            let is_single_word = chunk.text.split_whitespace().count() == 1;
            assert!(chunk.char_len <= 10 || is_single_word);
        }
    }

    #[test]
    fn test_budget_counts_chars_not_bytes() {
        // 3 chars and 6 bytes per word
        let text = "ééé ééé ééé";
        let chunks = segment(text, 11);
        assert_eq!(chunks.len(), 1);
        let chunks = segment(text, 8);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["ééé ééé", "ééé"]);
    }

    #[test]
    fn test_segment_is_deterministic() {
        let text = "one two three four five six seven eight nine ten";
        assert_eq!(segment(text, 9), segment(text, 9));
    }

    #[test]
    fn test_segmenter_count_chunks() {
        let segmenter = Segmenter::new(8);
        assert_eq!(segmenter.count_chunks("aaa bbb ccc ddd eee"), 3);
        assert_eq!(Segmenter::default().max_chars(), DEFAULT_MAX_CHARS_PER_CHUNK);
    }
}
