use tracing::{debug, debug_span};

use super::{context_range, states_at, Lattice};
use crate::error::LatticeError;
use crate::model::Scorer;
use crate::sentence::Sentence;

impl Lattice {
    /// Fill `alpha` for offsets `1..=len + 1`, the last row being the
    /// end-of-sentence absorption. With `use_scaling` every row is normalised
    /// to sum to 1 and `scaling[t]` holds the reciprocal of its raw sum.
    pub(super) fn enumerate_forward_variables(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
        use_scaling: bool,
    ) -> Result<(), LatticeError> {
        let w = self.max_word_length;
        self.alpha.fill_rows(0.0, len + 2);
        self.scaling[..len + 2].fill(1.0);
        self.alpha[[0, 0, 0]] = 1.0;

        for t in 1..=len {
            let mut prod_scaling = 1.0;
            for k in 1..=t.min(w) {
                // alpha(t - k, ..) already carries scaling[1..=t - k].
                if use_scaling && k > 1 {
                    prod_scaling *= self.scaling[t - k + 1];
                }
                for j in context_range(t - k, w) {
                    let sum = self.sum_alpha_t_k_j(sentence, scorer, len, t, k, j)?;
                    self.alpha[[t, k, j]] = sum * prod_scaling;
                }
            }
            if use_scaling {
                self.rescale_row(t, states_at(t, w));
            }
        }
        self.absorb_eos(sentence, scorer, len, use_scaling)
    }

    fn sum_alpha_t_k_j(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
        t: usize,
        k: usize,
        j: usize,
    ) -> Result<f64, LatticeError> {
        let mut sum = 0.0;
        for i in context_range(t - k - j, self.max_word_length) {
            let weight = self.transition(sentence, scorer, len, [t, k, j, i])?;
            sum += weight * self.alpha[[t - k, j, i]];
        }
        Ok(sum)
    }

    /// Transition every final state `(len, j, i)` into the end token.
    fn absorb_eos(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
        use_scaling: bool,
    ) -> Result<(), LatticeError> {
        let w = self.max_word_length;
        for j in context_range(len, w) {
            let mut sum = 0.0;
            for i in context_range(len - j, w) {
                let weight = self.transition(sentence, scorer, len, [len + 1, 1, j, i])?;
                sum += weight * self.alpha[[len, j, i]];
            }
            self.alpha[[len + 1, 1, j]] = sum;
        }
        if use_scaling {
            self.rescale_row(len + 1, context_range(len, w).map(|j| (1, j)));
        }
        Ok(())
    }

    fn rescale_row(&mut self, t: usize, states: impl Iterator<Item = (usize, usize)> + Clone) {
        let sum: f64 = states.clone().map(|(k, j)| self.alpha[[t, k, j]]).sum();
        debug_assert!(sum > 0.0 && sum.is_finite(), "row {t} sums to {sum}");
        let scale = 1.0 / sum;
        for (k, j) in states {
            self.alpha[[t, k, j]] *= scale;
        }
        self.scaling[t] = scale;
    }

    /// Unscaled end-of-sentence mass after a forward pass.
    pub(super) fn eos_mass(&self, len: usize) -> f64 {
        context_range(len, self.max_word_length)
            .map(|j| self.alpha[[len + 1, 1, j]])
            .sum()
    }

    /// `-ln` of the cumulative scaling, which is `ln Z` after a scaled pass.
    pub(super) fn log_inverse_scaling(&self, len: usize) -> f64 {
        -self.scaling[1..=len + 1].iter().map(|s| s.ln()).sum::<f64>()
    }

    /// Partition function `Z(sentence)`, end-of-sentence transition included.
    ///
    /// Without scaling the raw forward mass is returned and underflows to 0
    /// for long sentences.
    pub fn compute_normalizing_constant(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        use_scaling: bool,
    ) -> Result<f64, LatticeError> {
        let len = self.begin_sentence(sentence)?;
        let _span = debug_span!("normalizing_constant", len, use_scaling).entered();
        self.enumerate_forward_variables(sentence, scorer, len, use_scaling)?;
        let z = if use_scaling {
            self.scaling[1..=len + 1].iter().map(|s| 1.0 / s).product::<f64>()
        } else {
            self.eos_mass(len)
        };
        debug!(z);
        Ok(z)
    }

    /// `ln Z(sentence)`; use this with scaling on for anything but short sentences.
    pub fn compute_log_normalizing_constant(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        use_scaling: bool,
    ) -> Result<f64, LatticeError> {
        let len = self.begin_sentence(sentence)?;
        let _span = debug_span!("log_normalizing_constant", len, use_scaling).entered();
        self.enumerate_forward_variables(sentence, scorer, len, use_scaling)?;
        let log_z = if use_scaling {
            self.log_inverse_scaling(len)
        } else {
            self.eos_mass(len).ln()
        };
        debug!(log_z);
        Ok(log_z)
    }
}
