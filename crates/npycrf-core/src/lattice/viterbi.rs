use tracing::{debug, debug_span};

use super::{context_range, states_at, Lattice};
use crate::error::LatticeError;
use crate::model::Scorer;
use crate::sentence::Sentence;

impl Lattice {
    /// Most probable segmentation as segment lengths in sentence order.
    ///
    /// Runs in log space over the `alpha` table, so forward values from a
    /// previous pass are overwritten. Ties keep the first maximum.
    pub fn viterbi_decode(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
    ) -> Result<Vec<usize>, LatticeError> {
        let len = self.begin_sentence(sentence)?;
        let _span = debug_span!("viterbi", len).entered();
        self.viterbi_forward(sentence, scorer, len)?;
        let (score, k, j) = self.viterbi_argmax_eos(sentence, scorer, len)?;
        let segments = self.viterbi_traceback(len, k, j);
        debug!(?segments, score, "decoded");
        Ok(segments)
    }

    fn viterbi_forward(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
    ) -> Result<(), LatticeError> {
        let w = self.max_word_length;
        self.alpha.fill_rows(f64::NEG_INFINITY, len + 1);
        self.alpha[[0, 0, 0]] = 0.0;
        for t in 1..=len {
            for (k, j) in states_at(t, w) {
                let (score, i) = self.viterbi_argmax_alpha_t_k_j(sentence, scorer, len, t, k, j)?;
                self.alpha[[t, k, j]] = score;
                self.viterbi_backward[[t, k, j]] = i;
            }
        }
        Ok(())
    }

    /// Best log score into `(t, k, j)` and the context length `i` achieving it.
    fn viterbi_argmax_alpha_t_k_j(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
        t: usize,
        k: usize,
        j: usize,
    ) -> Result<(f64, usize), LatticeError> {
        let mut best: Option<(f64, usize)> = None;
        for i in context_range(t - k - j, self.max_word_length) {
            let score =
                self.log_transition(sentence, scorer, len, [t, k, j, i])? + self.alpha[[t - k, j, i]];
            if best.map_or(true, |(max, _)| score > max) {
                best = Some((score, i));
            }
        }
        Ok(best.unwrap_or((f64::NEG_INFINITY, 0)))
    }

    /// Best final state scored against the end-of-sentence transition.
    fn viterbi_argmax_eos(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
    ) -> Result<(f64, usize, usize), LatticeError> {
        let mut best: Option<(f64, usize, usize)> = None;
        for (k, j) in states_at(len, self.max_word_length) {
            let score = self.log_transition(sentence, scorer, len, [len + 1, 1, k, j])?
                + self.alpha[[len, k, j]];
            if best.map_or(true, |(max, _, _)| score > max) {
                best = Some((score, k, j));
            }
        }
        Ok(best.unwrap_or((f64::NEG_INFINITY, len.min(self.max_word_length), 0)))
    }

    fn viterbi_traceback(&self, len: usize, mut k: usize, mut j: usize) -> Vec<usize> {
        let mut t = len;
        let mut segments = vec![k];
        while j > 0 {
            let i = self.viterbi_backward[[t, k, j]];
            segments.push(j);
            t -= k;
            k = j;
            j = i;
        }
        segments.reverse();
        debug_assert_eq!(segments.iter().sum::<usize>(), len);
        segments
    }
}
