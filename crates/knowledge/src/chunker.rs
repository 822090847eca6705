//! Sentence-respecting text chunker.
//!
//! Text is split at sentence boundaries, sentences are packed greedily into
//! chunks of at most `chunk_size` characters, and each new chunk repeats the
//! trailing `overlap` characters of the previous one. The overlap is never
//! shortened: when the carried characters plus the next sentence do not fit
//! in `chunk_size`, that chunk is allowed to run over. A sentence that is
//! longer than `chunk_size` on its own likewise becomes a single oversized
//! chunk instead of being cut.
//!
//! Sizes are measured in characters (Unicode scalar values). Offsets on the
//! produced spans are byte offsets into the source text, so
//! `&text[span.start..span.end]` is always a valid slice.

use serde::{Deserialize, Serialize};
use tars_core::{Chunk, Error, Result};

/// Words that end with a period without ending a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e", "inc", "ltd",
    "co", "no", "fig", "approx", "dept", "est", "cf",
];

/// Closing punctuation that may trail a sentence terminator.
const CLOSERS: &[char] = &['"', '\'', ')', ']', '}', '\u{201D}', '\u{2019}'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Max characters per chunk
    pub chunk_size: usize,
    /// Characters repeated at the start of each following chunk
    pub overlap: usize,
}

impl ChunkerConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self { chunk_size, overlap };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be > 0".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            overlap: 150,
        }
    }
}

/// A chunk's position within its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    pub char_length: usize,
}

/// Splits text into overlapping chunks. Cheap to copy; holds only its config.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    /// Compute chunk spans for `text`. Empty text yields no spans.
    pub fn spans(&self, text: &str) -> Vec<ChunkSpan> {
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let byte_at: Vec<usize> = text
            .char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(text.len()))
            .collect();
        let ChunkerConfig { chunk_size, overlap } = self.config;

        // Character positions. `carried_to` marks the end of the text carried
        // over from the previous chunk; `end > carried_to` means the buffer
        // holds at least one new sentence.
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        let mut start = 0;
        let mut end = 0;
        let mut carried_to = 0;

        for sentence_end in sentence_ends(&chars) {
            if end > carried_to && sentence_end - start > chunk_size {
                ranges.push((start, end));
                start = end.saturating_sub(overlap).max(start);
                carried_to = end;
            }
            end = sentence_end;
        }
        ranges.push((start, end));

        ranges
            .into_iter()
            .map(|(s, e)| ChunkSpan {
                start: byte_at[s],
                end: byte_at[e],
                char_length: e - s,
            })
            .collect()
    }

    /// Chunk a document's text into [`Chunk`]s with stable ids.
    pub fn chunk_document(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        self.spans(text)
            .into_iter()
            .enumerate()
            .map(|(i, span)| Chunk {
                id: Chunk::make_id(document_id, i),
                document_id: document_id.to_string(),
                sequence_index: i,
                text: text[span.start..span.end].to_string(),
                start_offset: span.start,
                end_offset: span.end,
                char_length: span.char_length,
            })
            .collect()
    }
}

/// Chunk `text` with the given parameters.
///
/// Fails with [`Error::InvalidConfig`] if `overlap >= chunk_size`.
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<ChunkSpan>> {
    let chunker = Chunker::new(ChunkerConfig { chunk_size, overlap })?;
    Ok(chunker.spans(text))
}

// ── Sentence boundaries ────────────────────────────────────────────────────

/// Exclusive end positions (in chars) of each sentence. Sentences include
/// their trailing whitespace, so consecutive sentences tile the text.
fn sentence_ends(chars: &[char]) -> Vec<usize> {
    let n = chars.len();
    let mut ends = Vec::new();
    let mut i = 0;

    while i < n {
        let boundary = match chars[i] {
            '.' | '!' | '?' => terminal_boundary(chars, i),
            '\n' => paragraph_boundary(chars, i),
            _ => None,
        };
        match boundary {
            Some(end) => {
                ends.push(end);
                i = end;
            }
            None => i += 1,
        }
    }

    if ends.last() != Some(&n) {
        ends.push(n);
    }
    ends
}

/// `chars[i]` is `.`, `!` or `?`. Returns the end of the sentence including
/// trailing whitespace, or `None` if this is not a sentence end.
fn terminal_boundary(chars: &[char], i: usize) -> Option<usize> {
    let n = chars.len();
    let mut j = i + 1;
    while j < n && matches!(chars[j], '.' | '!' | '?') {
        j += 1;
    }
    while j < n && CLOSERS.contains(&chars[j]) {
        j += 1;
    }
    if j < n && !chars[j].is_whitespace() {
        return None;
    }

    let mut k = j;
    while k < n && chars[k].is_whitespace() {
        k += 1;
    }
    if k == n {
        return Some(n);
    }
    if chars[k].is_lowercase() {
        return None;
    }
    if chars[i] == '.' && is_abbreviation(chars, i) {
        return None;
    }
    Some(k)
}

/// `chars[i]` is a newline. A blank line ends a sentence.
fn paragraph_boundary(chars: &[char], i: usize) -> Option<usize> {
    let n = chars.len();
    let mut j = i + 1;
    while j < n && chars[j] != '\n' && chars[j].is_whitespace() {
        j += 1;
    }
    if j >= n || chars[j] != '\n' {
        return None;
    }
    let mut k = j;
    while k < n && chars[k].is_whitespace() {
        k += 1;
    }
    Some(k)
}

/// Whether the word ending at the period `chars[dot]` is a known
/// abbreviation or a single-letter initial.
fn is_abbreviation(chars: &[char], dot: usize) -> bool {
    let mut w = dot;
    while w > 0 && !chars[w - 1].is_whitespace() {
        w -= 1;
    }
    let word: String = chars[w..dot]
        .iter()
        .skip_while(|c| !c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect();

    if word.is_empty() {
        return false;
    }
    let mut letters = word.chars();
    if let (Some(first), None) = (letters.next(), letters.next()) {
        return first.is_alphabetic();
    }
    ABBREVIATIONS.contains(&word.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capitalize(word: &str) -> String {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }

    /// Deterministic prose with varied sentence lengths, some non-ASCII
    /// characters, questions and paragraph breaks.
    fn sample_text() -> String {
        let words = [
            "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
            "lambda", "über", "café",
        ];
        let mut out = String::new();
        for s in 0..60 {
            let len = 4 + (s * 7) % 11;
            let mut sentence = String::new();
            for w in 0..len {
                let word = words[(s * 3 + w) % words.len()];
                if w == 0 {
                    sentence.push_str(&capitalize(word));
                } else {
                    sentence.push(' ');
                    sentence.push_str(word);
                }
            }
            sentence.push(if s % 5 == 0 { '?' } else { '.' });
            out.push_str(&sentence);
            out.push(' ');
            if s % 9 == 8 {
                out.push_str("\n\n");
            }
        }
        out
    }

    /// 30 sentences of exactly 100 characters each.
    fn hundred_char_sentences(count: usize) -> String {
        let sentence = format!("A{}. ", "a".repeat(97));
        assert_eq!(sentence.chars().count(), 100);
        sentence.repeat(count)
    }

    fn sentences(text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut start = 0;
        sentence_ends(&chars)
            .into_iter()
            .map(|end| {
                let s: String = chars[start..end].iter().collect();
                start = end;
                s
            })
            .collect()
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        assert!(chunker.spans("").is_empty());
        assert!(chunker.chunk_document("doc", "").is_empty());
    }

    #[test]
    fn short_text_is_single_chunk() {
        let text = "Rust is a systems language. It is fast.";
        let spans = chunk(text, 1200, 150).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[0].end, text.len());
        assert_eq!(spans[0].char_length, text.chars().count());
    }

    #[test]
    fn overlap_not_smaller_than_chunk_size_is_invalid() {
        assert!(matches!(chunk("text", 100, 100), Err(Error::InvalidConfig(_))));
        assert!(matches!(chunk("text", 100, 250), Err(Error::InvalidConfig(_))));
        assert!(matches!(chunk("text", 0, 0), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn three_thousand_chars_make_three_chunks() {
        let text = hundred_char_sentences(30);
        assert_eq!(text.chars().count(), 3000);

        let chunks = Chunker::new(ChunkerConfig::new(1200, 150).unwrap())
            .unwrap()
            .chunk_document("doc", &text);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.char_length <= 1200));
        assert_eq!((chunks[0].start_offset, chunks[0].end_offset), (0, 1200));
        assert_eq!((chunks[1].start_offset, chunks[1].end_offset), (1050, 2200));
        assert_eq!((chunks[2].start_offset, chunks[2].end_offset), (2050, 3000));

        let tail_of_first = &chunks[0].text[chunks[0].text.len() - 150..];
        assert!(chunks[1].text.starts_with(tail_of_first));
    }

    #[test]
    fn core_spans_reconstruct_text() {
        let text = sample_text();
        let spans = chunk(&text, 300, 50).unwrap();
        assert!(spans.len() > 3);

        let mut rebuilt = String::new();
        let mut covered = 0;
        for span in &spans {
            assert!(span.start <= covered, "gap before span {span:?}");
            rebuilt.push_str(&text[covered..span.end]);
            covered = span.end;
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn chunks_respect_size_bound() {
        let text = sample_text();
        let chunks = Chunker::new(ChunkerConfig::new(300, 50).unwrap())
            .unwrap()
            .chunk_document("doc", &text);
        for c in &chunks {
            assert!(c.char_length <= 300, "chunk {} has {} chars", c.id, c.char_length);
            assert_eq!(c.char_length, c.text.chars().count());
        }
    }

    #[test]
    fn adjacent_chunks_share_overlap() {
        let text = sample_text();
        let overlap = 50;
        let chunks = Chunker::new(ChunkerConfig::new(300, overlap).unwrap())
            .unwrap()
            .chunk_document("doc", &text);

        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let next: Vec<char> = pair[1].text.chars().collect();
            assert!(prev.len() > overlap && next.len() > overlap);
            assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
        }
    }

    #[test]
    fn chunks_end_on_sentence_boundaries() {
        let text = hundred_char_sentences(12);
        let chunks = Chunker::new(ChunkerConfig::new(250, 20).unwrap())
            .unwrap()
            .chunk_document("doc", &text);
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.text.ends_with(". "), "chunk {} ends mid-sentence", c.id);
        }
    }

    #[test]
    fn oversized_sentence_is_kept_whole() {
        let long = format!("Start {}end.", "word ".repeat(60));
        let text = format!("Short intro here. {long} Short outro here.");
        let chunks = Chunker::new(ChunkerConfig::new(100, 20).unwrap())
            .unwrap()
            .chunk_document("doc", &text);

        let oversized: Vec<_> = chunks.iter().filter(|c| c.char_length > 100).collect();
        assert_eq!(oversized.len(), 1);
        assert!(oversized[0].text.contains(&long));
        assert_eq!(chunks.last().unwrap().end_offset, text.len());
    }

    #[test]
    fn overlap_is_kept_when_next_sentence_barely_fits() {
        let first = format!("A{}. ", "a".repeat(47));
        let second = format!("B{}. ", "b".repeat(87));
        assert_eq!((first.chars().count(), second.chars().count()), (50, 90));
        let text = format!("{first}{second}");

        let chunks = Chunker::new(ChunkerConfig::new(100, 20).unwrap())
            .unwrap()
            .chunk_document("doc", &text);

        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].start_offset, chunks[0].end_offset), (0, 50));
        assert_eq!((chunks[1].start_offset, chunks[1].end_offset), (30, 140));
        assert_eq!(chunks[1].char_length, 110);
        assert!(chunks[1].text.starts_with(&chunks[0].text[30..]));
    }

    #[test]
    fn overlap_is_carried_after_oversized_sentence() {
        let long = format!("Start {}end. ", "word ".repeat(60));
        let text = format!("{long}Short outro here.");
        let chunks = Chunker::new(ChunkerConfig::new(100, 20).unwrap())
            .unwrap()
            .chunk_document("doc", &text);

        assert_eq!(chunks.len(), 2);
        let tail: String = long.chars().rev().take(20).collect::<Vec<_>>().into_iter().rev().collect();
        assert!(chunks[1].text.starts_with(&tail));
        assert!(chunks[1].text.ends_with("Short outro here."));
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = sample_text();
        let chunker = Chunker::new(ChunkerConfig::new(400, 80).unwrap()).unwrap();
        assert_eq!(chunker.chunk_document("d", &text), chunker.chunk_document("d", &text));
    }

    #[test]
    fn chunk_ids_and_sequence_are_ordered() {
        let text = hundred_char_sentences(30);
        let chunks = Chunker::new(ChunkerConfig::default())
            .unwrap()
            .chunk_document("doc-1", &text);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.sequence_index, i);
            assert_eq!(c.document_id, "doc-1");
            assert_eq!(c.id, Chunk::make_id("doc-1", i));
        }
    }

    #[test]
    fn abbreviations_do_not_split() {
        let parts = sentences("Dr. Smith met Mr. Jones at 3.30 p.m. on Friday. They talked, e.g. about Rust. Done!");
        assert_eq!(
            parts,
            vec![
                "Dr. Smith met Mr. Jones at 3.30 p.m. on Friday. ",
                "They talked, e.g. about Rust. ",
                "Done!",
            ]
        );
    }

    #[test]
    fn lowercase_continuation_does_not_split() {
        let parts = sentences("Version 2. is not a sentence end. Next one?");
        assert_eq!(parts, vec!["Version 2. is not a sentence end. ", "Next one?"]);
    }

    #[test]
    fn closing_quotes_stay_with_sentence() {
        let parts = sentences("He said \"stop.\" Then he left.");
        assert_eq!(parts, vec!["He said \"stop.\" ", "Then he left."]);
    }

    #[test]
    fn blank_line_ends_sentence() {
        let parts = sentences("Heading without period\n\nBody text.");
        assert_eq!(parts, vec!["Heading without period\n\n", "Body text."]);
    }

    #[test]
    fn multibyte_offsets_are_valid_slices() {
        let text = "Ünïcödé sentence one. Ελληνικά δύο. 日本語のテキスト。 Final sentence here.".repeat(10);
        let chunker = Chunker::new(ChunkerConfig::new(60, 10).unwrap()).unwrap();
        for c in chunker.chunk_document("u", &text) {
            assert_eq!(&text[c.start_offset..c.end_offset], c.text);
        }
    }
}
