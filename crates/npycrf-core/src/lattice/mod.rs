//! Semi-Markov segmentation lattice.
//!
//! Every segmentation of a sentence is a path through states `(t, k, j)`:
//! a segment of length `k` ends at offset `t` (1-indexed, 0 is BOS) and is
//! preceded by a segment of length `j`. Trigram transitions add the length
//! `i` of the segment before that, so transition-level tables are indexed by
//! `(t, k, j, i)`. Length 0 stands for the BOS pseudo-word.
//!
//! One `Lattice` owns every buffer used for a sentence and must not serve two
//! sentences at once; run one instance per worker.

mod backward;
mod forward;
mod ids;
mod marginal;
mod sampler;
#[cfg(test)]
pub(crate) mod testutil;
#[cfg(test)]
mod tests;
mod viterbi;

use std::ops::{Range, RangeInclusive};

use tracing::{debug, debug_span};

use crate::error::LatticeError;
use crate::model::Scorer;
use crate::sentence::{Sentence, WordId};
use crate::settings::{settings, NumericSettings};
use crate::table::{Table2, Table3, Table4};

use ids::SubstringIds;

pub use marginal::Marginals;

/// Cache sentinel for transition-level tables; real values are strictly positive.
const UNSET: f64 = -1.0;

/// The lattice engine: DP tables plus the caches shared by every pass.
#[derive(Debug)]
pub struct Lattice {
    max_word_length: usize,
    max_sentence_length: usize,
    numeric: NumericSettings,
    /// Per-offset forward scaling factors, `0..=len + 1`.
    scaling: Vec<f64>,
    alpha: Table3<f64>,
    beta: Table3<f64>,
    /// Arg-max preceding-preceding length per Viterbi state.
    viterbi_backward: Table3<usize>,
    sampling_table: Vec<f64>,
    /// `p(substring t-k..t is a word | sentence)`.
    pc_s: Table2<f64>,
    /// `p(z_t, z_{t+1} | sentence)`.
    pz_s: Table3<f64>,
    /// Raw trigram probabilities, `UNSET` until computed.
    pw_h: Table4<f64>,
    /// Blended transition weights, `UNSET` until computed.
    p_transition: Table4<f64>,
    /// Trigram marginals.
    p_conc: Table4<f64>,
    word_ids: SubstringIds,
}

impl Lattice {
    /// A lattice with the configured initial sentence capacity.
    pub fn new(max_word_length: usize) -> Self {
        Self::with_capacity(
            max_word_length,
            settings().lattice.initial_sentence_capacity,
        )
    }

    pub fn with_capacity(max_word_length: usize, max_sentence_length: usize) -> Self {
        assert!(max_word_length > 0, "max word length must be positive");
        let mut lattice = Self {
            max_word_length: 0,
            max_sentence_length: 0,
            numeric: settings().numeric,
            scaling: Vec::new(),
            alpha: Table3::new([0, 0, 0]),
            beta: Table3::new([0, 0, 0]),
            viterbi_backward: Table3::new([0, 0, 0]),
            sampling_table: Vec::new(),
            pc_s: Table2::new([0, 0]),
            pz_s: Table3::new([0, 2, 2]),
            pw_h: Table4::new([0, 0, 0, 0]),
            p_transition: Table4::new([0, 0, 0, 0]),
            p_conc: Table4::new([0, 0, 0, 0]),
            word_ids: SubstringIds::new(0, 0),
        };
        lattice.reserve(max_word_length, max_sentence_length);
        lattice
    }

    pub fn max_word_length(&self) -> usize {
        self.max_word_length
    }

    pub fn max_sentence_length(&self) -> usize {
        self.max_sentence_length
    }

    /// Grow buffers to fit the given limits. Never shrinks; a no-op when
    /// capacity already suffices, so it is safe to call before every sentence.
    pub fn reserve(&mut self, max_word_length: usize, max_sentence_length: usize) {
        if max_word_length <= self.max_word_length
            && max_sentence_length <= self.max_sentence_length
        {
            return;
        }
        let max_word_length = max_word_length.max(self.max_word_length);
        let max_sentence_length = max_sentence_length.max(self.max_sentence_length);
        debug!(max_word_length, max_sentence_length, "growing lattice");

        let seq = max_sentence_length + 1;
        let word = max_word_length + 1;
        self.scaling.resize(seq + 1, 0.0);
        self.alpha.grow([seq + 1, word, word]);
        self.beta.grow([seq + 1, word, word]);
        self.viterbi_backward.grow([seq, word, word]);
        self.sampling_table.resize(word * word, 0.0);
        self.pc_s.grow([seq, word]);
        self.pz_s.grow([seq + 1, 2, 2]);
        self.pw_h.grow([seq + 1, word, word, word]);
        self.p_transition.grow([seq + 1, word, word, word]);
        self.p_conc.grow([seq + 1, word, word, word]);
        self.word_ids.grow(seq, word);

        self.max_word_length = max_word_length;
        self.max_sentence_length = max_sentence_length;
    }

    /// Validate the sentence and invalidate every cache row it can touch.
    fn begin_sentence(&mut self, sentence: &dyn Sentence) -> Result<usize, LatticeError> {
        let len = sentence.len();
        if len == 0 {
            return Err(LatticeError::EmptySentence);
        }
        if len > self.max_sentence_length {
            return Err(LatticeError::CapacityExceeded {
                len,
                capacity: self.max_sentence_length,
            });
        }
        self.word_ids.clear(len);
        // Rows 0..=len + 1 include the end-of-sentence transitions.
        self.pw_h.fill_rows(UNSET, len + 2);
        self.p_transition.fill_rows(UNSET, len + 2);
        Ok(len)
    }

    /// Scaled or unscaled forward value at `(t, k, j)`; log-space after Viterbi.
    pub fn alpha(&self, t: usize, k: usize, j: usize) -> f64 {
        self.alpha[[t, k, j]]
    }

    pub fn beta(&self, t: usize, k: usize, j: usize) -> f64 {
        self.beta[[t, k, j]]
    }

    pub fn scaling(&self, t: usize) -> f64 {
        self.scaling[t]
    }

    /// Cached trigram probability for `(t, k, j, i)`, if the last pass computed it.
    pub fn cached_p_w_given_h(&self, t: usize, k: usize, j: usize, i: usize) -> Option<f64> {
        let p = self.pw_h[[t, k, j, i]];
        (p > 0.0).then_some(p)
    }

    fn cached_transition(&self, index: [usize; 4]) -> Option<f64> {
        let weight = self.p_transition[index];
        (weight > 0.0).then_some(weight)
    }

    /// Word ids, language-model span and potential of the transition into
    /// the segment `(t, k)` after contexts `j` and `i`. `t == len + 1` with
    /// `k == 1` addresses the end-of-sentence token.
    fn transition_context(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
        [t, k, j, i]: [usize; 4],
    ) -> ([WordId; 3], Range<usize>, f64) {
        let (word, span) = if t > len {
            debug_assert_eq!(k, 1);
            (WordId::EOS, len..len)
        } else {
            (self.word_ids.get(sentence, t, k), t - k..t)
        };
        let word_ids = [
            self.word_ids.get(sentence, t - k - j, i),
            self.word_ids.get(sentence, t - k, j),
            word,
        ];
        (word_ids, span, scorer.potential(sentence, t - k, t))
    }

    /// Memoised probability-space transition weight at `(t, k, j, i)`.
    fn transition(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
        index: [usize; 4],
    ) -> Result<f64, LatticeError> {
        if let Some(weight) = self.cached_transition(index) {
            return Ok(weight);
        }
        let (word_ids, span, potential) = self.transition_context(sentence, scorer, len, index);
        let transition = scorer.transition(sentence, &word_ids, span, potential)?;
        let weight = checked_weight(transition.weight, index)?;
        if let Some(pw_h) = transition.pw_h {
            self.pw_h[index] = pw_h;
        }
        self.p_transition[index] = weight;
        Ok(weight)
    }

    /// Log-space transition weight at `(t, k, j, i)`, never cached.
    fn log_transition(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
        index: [usize; 4],
    ) -> Result<f64, LatticeError> {
        let (word_ids, span, potential) = self.transition_context(sentence, scorer, len, index);
        let log_weight = scorer.log_transition(sentence, &word_ids, span, potential)?;
        checked_log_weight(log_weight, index)
    }

    /// Log-space score of one given segmentation, end-of-sentence transition included.
    ///
    /// Subtracting the log partition function gives `log p(segments | sentence)`.
    pub fn log_path_score(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        segments: &[usize],
    ) -> Result<f64, LatticeError> {
        let len = self.begin_sentence(sentence)?;
        for (index, &length) in segments.iter().enumerate() {
            if length == 0 {
                return Err(LatticeError::EmptySegment { index });
            }
            if length > self.max_word_length {
                return Err(LatticeError::WordLengthExceeded {
                    length,
                    max: self.max_word_length,
                });
            }
        }
        let sum: usize = segments.iter().sum();
        if sum != len {
            return Err(LatticeError::InvalidSegmentation { sum, len });
        }

        let _span = debug_span!("log_path_score", len, segments = segments.len()).entered();
        let mut score = 0.0;
        let (mut t, mut j, mut i) = (0, 0, 0);
        for &k in segments {
            t += k;
            score += self.log_transition(sentence, scorer, len, [t, k, j, i])?;
            i = j;
            j = k;
        }
        score += self.log_transition(sentence, scorer, len, [len + 1, 1, j, i])?;
        debug!(score);
        Ok(score)
    }
}

/// Context lengths admissible before a segment starting at `offset`:
/// only the BOS length 0 at the sentence start, `1..=min(offset, W)` elsewhere.
pub(crate) fn context_range(offset: usize, max_word_length: usize) -> RangeInclusive<usize> {
    let first = if offset == 0 { 0 } else { 1 };
    first..=offset.min(max_word_length)
}

/// Every `(k, j)` state ending at `t`, in enumeration order.
pub(crate) fn states_at(
    t: usize,
    max_word_length: usize,
) -> impl Iterator<Item = (usize, usize)> + Clone {
    (1..=t.min(max_word_length))
        .flat_map(move |k| context_range(t - k, max_word_length).map(move |j| (k, j)))
}

fn checked_weight(weight: f64, [t, k, j, i]: [usize; 4]) -> Result<f64, LatticeError> {
    if weight > 0.0 && weight.is_finite() {
        Ok(weight)
    } else {
        Err(LatticeError::NonPositiveTransition { weight, t, k, j, i })
    }
}

/// Log-space counterpart of `checked_weight`: the weight must be finite and
/// strictly positive, so its log must be finite.
fn checked_log_weight(log_weight: f64, [t, k, j, i]: [usize; 4]) -> Result<f64, LatticeError> {
    if log_weight.is_finite() {
        Ok(log_weight)
    } else {
        Err(LatticeError::NonPositiveTransition {
            weight: log_weight.exp(),
            t,
            k,
            j,
            i,
        })
    }
}
