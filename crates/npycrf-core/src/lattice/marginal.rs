//! Posterior marginals derived from scaled forward and backward tables.

use tracing::{debug, debug_span, warn};

use super::{context_range, states_at, Lattice};
use crate::error::LatticeError;
use crate::model::Scorer;
use crate::sentence::Sentence;

/// Read-only view over the marginal tables of the last sentence.
#[derive(Debug, Clone, Copy)]
pub struct Marginals<'a> {
    lattice: &'a Lattice,
    len: usize,
}

impl Marginals<'_> {
    pub fn sentence_len(&self) -> usize {
        self.len
    }

    /// `p(characters t-k..t form one word | sentence)`, `t` 1-indexed.
    pub fn p_substring(&self, t: usize, k: usize) -> f64 {
        self.lattice.pc_s[[t, k]]
    }

    /// Joint boundary marginal `p(z_t, z_{t+1} | sentence)` for `t` in `0..=len + 1`.
    ///
    /// `z_t` is 1 when a word boundary falls right before character `t`
    /// and `z_{t+1}` when one falls right after it.
    pub fn p_boundary(&self, t: usize, z_t: bool, z_next: bool) -> f64 {
        self.lattice.pz_s[[t, usize::from(z_t), usize::from(z_next)]]
    }

    /// `p(words of lengths i, j, k are consecutive, k ending at t | sentence)`.
    ///
    /// `t == len + 1` with `k == 1` covers the end-of-sentence token.
    pub fn p_trigram(&self, t: usize, k: usize, j: usize, i: usize) -> f64 {
        self.lattice.p_conc[[t, k, j, i]]
    }
}

impl Lattice {
    /// Rebuild substring, boundary and trigram marginals for `sentence`.
    pub fn enumerate_marginals(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
    ) -> Result<Marginals<'_>, LatticeError> {
        let len = self.begin_sentence(sentence)?;
        let _span = debug_span!("marginals", len).entered();
        self.enumerate_forward_variables(sentence, scorer, len, true)?;
        self.enumerate_backward_variables(sentence, scorer, len)?;
        self.enumerate_marginal_p_substring(len)?;
        self.enumerate_marginal_p_z(len);
        self.enumerate_marginal_p_trigram(sentence, scorer, len)?;
        Ok(Marginals { lattice: self, len })
    }

    fn enumerate_marginal_p_substring(&mut self, len: usize) -> Result<(), LatticeError> {
        let w = self.max_word_length;
        self.pc_s.fill_rows(0.0, len + 1);
        for t in 1..=len {
            for k in 1..=t.min(w) {
                let sum: f64 = context_range(t - k, w)
                    .map(|j| self.alpha[[t, k, j]] * self.beta[[t, k, j]])
                    .sum();
                self.pc_s[[t, k]] = self.clamp_marginal(sum, t, k)?;
            }
        }
        Ok(())
    }

    /// Boundary marginals by case analysis over `pc_s`.
    fn enumerate_marginal_p_z(&mut self, len: usize) {
        let w = self.max_word_length;
        self.pz_s.fill_rows(0.0, len + 2);
        self.pz_s[[0, 1, 1]] = 1.0;
        self.pz_s[[len + 1, 1, 1]] = 1.0;
        for t in 1..=len {
            let p_11 = self.pc_s[[t, 1]];
            // A word of length >= 2 starts at t.
            let p_10: f64 = if t == len {
                0.0
            } else {
                (2..=(len - t + 1).min(w))
                    .map(|j| self.pc_s[[t + j - 1, j]])
                    .sum()
            };
            // A word of length >= 2 ends at t.
            let p_01: f64 = (2..=t.min(w)).map(|j| self.pc_s[[t, j]]).sum();
            let p_00 = (1.0 - p_11 - p_10 - p_01).max(0.0);

            let direct = self.p_z_inside(len, t);
            let gap = (direct - p_00).abs();
            if gap > self.numeric.boundary_tolerance {
                warn!(t, direct, complement = p_00, "boundary marginals disagree");
            }
            debug_assert!(
                gap <= self.numeric.boundary_tolerance,
                "p_z(t={t}, 0, 0): direct {direct} vs complement {p_00}"
            );

            self.pz_s[[t, 1, 1]] = p_11;
            self.pz_s[[t, 1, 0]] = p_10;
            self.pz_s[[t, 0, 1]] = p_01;
            self.pz_s[[t, 0, 0]] = p_00;
        }
    }

    /// Mass of words strictly enclosing character `t`.
    fn p_z_inside(&self, len: usize, t: usize) -> f64 {
        if t == 1 {
            return 0.0;
        }
        let w = self.max_word_length;
        let mut sum = 0.0;
        for k in 1..=(len - t).min(w.saturating_sub(2)) {
            for j in k + 2..=(t + k).min(w) {
                sum += self.pc_s[[t + k, j]];
            }
        }
        sum
    }

    fn enumerate_marginal_p_trigram(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
    ) -> Result<(), LatticeError> {
        let w = self.max_word_length;
        self.p_conc.fill_rows(0.0, len + 2);
        for t in 1..=len {
            for (k, j) in states_at(t, w) {
                let prod_scaling: f64 = self.scaling[t - k + 1..=t].iter().product();
                let beta = self.beta[[t, k, j]];
                for i in context_range(t - k - j, w) {
                    let weight = self.transition(sentence, scorer, len, [t, k, j, i])?;
                    let value = self.alpha[[t - k, j, i]] * beta * weight * prod_scaling;
                    self.p_conc[[t, k, j, i]] = self.clamp_marginal(value, t, k)?;
                }
            }
        }
        for (j, i) in states_at(len, w) {
            let weight = self.transition(sentence, scorer, len, [len + 1, 1, j, i])?;
            let value = self.alpha[[len, j, i]] * weight * self.scaling[len + 1];
            self.p_conc[[len + 1, 1, j, i]] = self.clamp_marginal(value, len + 1, 1)?;
        }
        Ok(())
    }

    /// Round a small overshoot above 1 down to 1; anything else out of range is an error.
    fn clamp_marginal(&self, value: f64, t: usize, k: usize) -> Result<f64, LatticeError> {
        if !(0.0..=1.0 + self.numeric.overshoot_tolerance).contains(&value) {
            return Err(LatticeError::MarginalOutOfRange { value, t, k });
        }
        if value > 1.0 {
            debug!(value, t, k, "clamping marginal");
            return Ok(1.0);
        }
        Ok(value)
    }
}
