use tracing::{debug, debug_span};

use super::{states_at, Lattice};
use crate::error::LatticeError;
use crate::model::Scorer;
use crate::sentence::Sentence;

impl Lattice {
    /// Fill `beta` for offsets `len` down to 1, then `beta(0, 1, 1)`.
    ///
    /// Reuses the scaling factors of the preceding forward pass, so `beta`
    /// is scaled exactly when `alpha` is and `alpha * beta` is a posterior
    /// marginal in the scaled case.
    pub(super) fn enumerate_backward_variables(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
    ) -> Result<(), LatticeError> {
        let w = self.max_word_length;
        self.beta.fill_rows(0.0, len + 1);

        for (k, j) in states_at(len, w) {
            let weight = self.transition(sentence, scorer, len, [len + 1, 1, k, j])?;
            self.beta[[len, k, j]] = weight * self.scaling[len + 1];
        }
        for t in (1..len).rev() {
            for (k, j) in states_at(t, w) {
                let sum = self.sum_beta_t_k_j(sentence, scorer, len, t, k, j)?;
                self.beta[[t, k, j]] = sum;
            }
        }

        let mut sum = 0.0;
        let mut prod_scaling = 1.0;
        for i in 1..=len.min(w) {
            prod_scaling *= self.scaling[i];
            let weight = self.transition(sentence, scorer, len, [i, i, 0, 0])?;
            sum += self.beta[[i, i, 0]] * weight * prod_scaling;
        }
        self.beta[[0, 1, 1]] = sum;
        Ok(())
    }

    /// Mass of every continuation after segment `(t, k)` preceded by `j`.
    fn sum_beta_t_k_j(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
        t: usize,
        k: usize,
        j: usize,
    ) -> Result<f64, LatticeError> {
        let mut sum = 0.0;
        let mut prod_scaling = 1.0;
        for i in 1..=(len - t).min(self.max_word_length) {
            prod_scaling *= self.scaling[t + i];
            let weight = self.transition(sentence, scorer, len, [t + i, i, k, j])?;
            sum += weight * self.beta[[t + i, i, k]] * prod_scaling;
        }
        Ok(sum)
    }

    /// Unscaled `beta(0, 1, 1)`, the partition function seen from the end.
    pub fn compute_normalizing_constant_backward(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
    ) -> Result<f64, LatticeError> {
        let len = self.begin_sentence(sentence)?;
        let _span = debug_span!("normalizing_constant_backward", len).entered();
        self.enumerate_forward_variables(sentence, scorer, len, false)?;
        self.enumerate_backward_variables(sentence, scorer, len)?;
        let z = self.beta[[0, 1, 1]];
        debug!(z);
        Ok(z)
    }

    /// Run both passes and check that they agree on the partition function.
    ///
    /// Scaled, `beta(0, 1, 1)` must be 1. Unscaled, it must equal the forward
    /// end-of-sentence mass within `partition_tolerance` relative error.
    /// Returns the partition function.
    pub fn verify_partition_function(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        use_scaling: bool,
    ) -> Result<f64, LatticeError> {
        let len = self.begin_sentence(sentence)?;
        let _span = debug_span!("verify_partition_function", len, use_scaling).entered();
        self.enumerate_forward_variables(sentence, scorer, len, use_scaling)?;
        self.enumerate_backward_variables(sentence, scorer, len)?;

        let forward = if use_scaling { 1.0 } else { self.eos_mass(len) };
        let backward = self.beta[[0, 1, 1]];
        let gap = (forward - backward).abs() / forward.abs().max(f64::MIN_POSITIVE);
        if gap.is_nan() || gap > self.numeric.partition_tolerance {
            return Err(LatticeError::PartitionMismatch {
                expected: forward,
                actual: backward,
            });
        }
        let z = if use_scaling {
            self.log_inverse_scaling(len).exp()
        } else {
            forward
        };
        debug!(z, gap);
        Ok(z)
    }
}
