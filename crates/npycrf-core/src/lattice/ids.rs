use crate::sentence::{Sentence, WordId};
use crate::table::Table2;

/// Per-sentence cache of substring identities keyed by `(t, k)`.
///
/// `(t, k)` names the substring `t - k..t`. `None` marks an unset cell, so a
/// legitimately computed id of 0 is never mistaken for a miss.
#[derive(Debug)]
pub(crate) struct SubstringIds {
    ids: Table2<Option<WordId>>,
}

impl SubstringIds {
    pub fn new(seq_capacity: usize, word_capacity: usize) -> Self {
        Self {
            ids: Table2::new([seq_capacity, word_capacity]),
        }
    }

    pub fn grow(&mut self, seq_capacity: usize, word_capacity: usize) {
        self.ids.grow([seq_capacity, word_capacity]);
    }

    /// Invalidate offsets `0..=len`.
    pub fn clear(&mut self, len: usize) {
        self.ids.fill_rows(None, len + 1);
    }

    /// Id of the substring of length `k` ending at `t`; `BOS` at `t == 0`.
    pub fn get(&mut self, sentence: &dyn Sentence, t: usize, k: usize) -> WordId {
        if t == 0 {
            return WordId::BOS;
        }
        debug_assert!(k <= t, "substring ({t}, {k}) starts before the sentence");
        if let Some(id) = self.ids[[t, k]] {
            return id;
        }
        let id = sentence.word_id(t - k, t);
        self.ids[[t, k]] = Some(id);
        id
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Counts `word_id` calls and hands out 0 for every substring.
    struct CountingSentence {
        chars: Vec<char>,
        calls: Cell<usize>,
    }

    impl Sentence for CountingSentence {
        fn characters(&self) -> &[char] {
            &self.chars
        }

        fn word_id(&self, _start: usize, _end: usize) -> WordId {
            self.calls.set(self.calls.get() + 1);
            WordId(0)
        }

        fn split(&mut self, _segments: &[usize]) {}
    }

    fn counting(text: &str) -> CountingSentence {
        CountingSentence {
            chars: text.chars().collect(),
            calls: Cell::new(0),
        }
    }

    #[test]
    fn test_bos_at_offset_zero() {
        let sentence = counting("abc");
        let mut ids = SubstringIds::new(4, 4);
        assert_eq!(ids.get(&sentence, 0, 0), WordId::BOS);
        assert_eq!(ids.get(&sentence, 0, 2), WordId::BOS);
        assert_eq!(sentence.calls.get(), 0);
    }

    #[test]
    fn test_zero_id_is_cached() {
        let sentence = counting("abc");
        let mut ids = SubstringIds::new(4, 4);
        assert_eq!(ids.get(&sentence, 2, 2), WordId(0));
        assert_eq!(ids.get(&sentence, 2, 2), WordId(0));
        assert_eq!(sentence.calls.get(), 1);
    }

    #[test]
    fn test_clear_invalidates() {
        let sentence = counting("abc");
        let mut ids = SubstringIds::new(4, 4);
        ids.get(&sentence, 3, 1);
        ids.clear(3);
        ids.get(&sentence, 3, 1);
        assert_eq!(sentence.calls.get(), 2);
    }
}
