//! Sentences as the lattice sees them: characters plus substring identities.

use std::hash::Hasher;

use rustc_hash::FxHasher;

/// Identifier of a substring treated as a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WordId(pub u64);

impl WordId {
    /// Beginning-of-sentence pseudo-word (zero length, at offset 0).
    pub const BOS: WordId = WordId(0);
    /// End-of-sentence pseudo-word.
    pub const EOS: WordId = WordId(1);

    /// First id not reserved for a sentinel.
    const FIRST_FREE: u64 = 2;
}

/// An unsegmented sentence consumed by the lattice.
///
/// Character offsets are 0-indexed; `word_id(start, end)` covers the
/// half-open range `start..end`.
pub trait Sentence {
    fn characters(&self) -> &[char];

    fn len(&self) -> usize {
        self.characters().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deterministic identifier of the substring `start..end`.
    fn word_id(&self, start: usize, end: usize) -> WordId;

    /// Materialise a segmentation given as ordered segment lengths.
    fn split(&mut self, segments: &[usize]);
}

/// A sentence backed by the characters of a string, with hashed word ids.
#[derive(Debug, Clone)]
pub struct CharSentence {
    chars: Vec<char>,
    segments: Vec<usize>,
}

impl CharSentence {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            segments: Vec::new(),
        }
    }

    /// Segment lengths of the last `split`, empty before any split.
    pub fn segments(&self) -> &[usize] {
        &self.segments
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Words of the last `split`.
    pub fn words(&self) -> Vec<String> {
        let mut start = 0;
        self.segments
            .iter()
            .map(|&len| {
                let word = self.chars[start..start + len].iter().collect();
                start += len;
                word
            })
            .collect()
    }

    /// Stable numeric code of the character at `pos`.
    pub fn char_code(&self, pos: usize) -> u32 {
        self.chars[pos] as u32
    }
}

impl Sentence for CharSentence {
    fn characters(&self) -> &[char] {
        &self.chars
    }

    fn word_id(&self, start: usize, end: usize) -> WordId {
        hash_chars(&self.chars[start..end])
    }

    fn split(&mut self, segments: &[usize]) {
        debug_assert_eq!(segments.iter().sum::<usize>(), self.chars.len());
        self.segments.clear();
        self.segments.extend_from_slice(segments);
    }
}

/// Hash a character run into a `WordId`, skipping the reserved sentinels.
///
/// The id depends only on the run length and the Unicode code points, fed
/// to an unseeded `FxHasher`, so it is the same across processes and
/// toolchains for a given `rustc-hash` major version on 64-bit targets.
/// Language models may persist tables keyed by these ids.
pub fn hash_chars(chars: &[char]) -> WordId {
    let mut hasher = FxHasher::default();
    hasher.write_u64(chars.len() as u64);
    for &c in chars {
        hasher.write_u32(c as u32);
    }
    let id = hasher.finish();
    if id < WordId::FIRST_FREE {
        WordId(id + WordId::FIRST_FREE)
    } else {
        WordId(id)
    }
}
