use rand::Rng;
use tracing::{debug, debug_span};

use super::{context_range, states_at, Lattice};
use crate::error::LatticeError;
use crate::model::{Mode, Scorer};
use crate::sentence::Sentence;

impl Lattice {
    /// Draw one segmentation from the posterior (blocked Gibbs step).
    ///
    /// Returns segment lengths in sentence order. Discriminative mode has no
    /// trigram model to sample from and is rejected.
    pub fn blocked_gibbs<R: Rng + ?Sized>(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        rng: &mut R,
    ) -> Result<Vec<usize>, LatticeError> {
        if scorer.mode() == Mode::Discriminative {
            return Err(LatticeError::IncompatibleMode(scorer.mode()));
        }
        let len = self.begin_sentence(sentence)?;
        let _span = debug_span!("blocked_gibbs", len).entered();
        self.enumerate_forward_variables(sentence, scorer, len, true)?;
        let segments = self.backward_sampling(sentence, scorer, len, rng)?;
        debug!(?segments, "sampled");
        Ok(segments)
    }

    /// Ancestral sampling over a scaled forward table, right to left.
    fn backward_sampling<R: Rng + ?Sized>(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>, LatticeError> {
        let (mut k, mut j) = self.sample_eos_pair(sentence, scorer, len, rng)?;
        let mut t = len;
        let mut segments = vec![k];
        while j > 0 {
            let i = self.sample_context_length(sentence, scorer, len, [t, k, j], rng)?;
            segments.push(j);
            t -= k;
            k = j;
            j = i;
        }
        segments.reverse();
        debug_assert_eq!(segments.iter().sum::<usize>(), len);
        Ok(segments)
    }

    /// Last segment and its context, weighted by the end-of-sentence transition.
    fn sample_eos_pair<R: Rng + ?Sized>(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
        rng: &mut R,
    ) -> Result<(usize, usize), LatticeError> {
        let w = self.max_word_length;
        let mut n = 0;
        for (k, j) in states_at(len, w) {
            let weight = self.transition(sentence, scorer, len, [len + 1, 1, k, j])?;
            self.sampling_table[n] = weight * self.alpha[[len, k, j]];
            n += 1;
        }
        let index = draw(&self.sampling_table[..n], rng);
        // `index < n` and `n` counts exactly these states.
        Ok(states_at(len, w).nth(index).unwrap_or((len.min(w), 0)))
    }

    /// Length `i` of the segment before `j`, given segment `k` ending at `t`.
    fn sample_context_length<R: Rng + ?Sized>(
        &mut self,
        sentence: &dyn Sentence,
        scorer: &Scorer<'_>,
        len: usize,
        [t, k, j]: [usize; 3],
        rng: &mut R,
    ) -> Result<usize, LatticeError> {
        let contexts = context_range(t - k - j, self.max_word_length);
        let first = *contexts.start();
        let mut n = 0;
        for i in contexts {
            let weight = self.transition(sentence, scorer, len, [t, k, j, i])?;
            self.sampling_table[n] = weight * self.alpha[[t - k, j, i]];
            n += 1;
        }
        Ok(first + draw(&self.sampling_table[..n], rng))
    }
}

/// Inverse-CDF draw of an index proportional to `weights`.
///
/// A single candidate is returned without consuming randomness.
fn draw<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> usize {
    debug_assert!(!weights.is_empty());
    if weights.len() == 1 {
        return 0;
    }
    let total: f64 = weights.iter().sum();
    let target = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if target < cumulative {
            return index;
        }
    }
    weights.len() - 1
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::draw;

    #[test]
    fn test_draw_single_candidate() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            assert_eq!(draw(&[0.3], &mut rng), 0);
        }
    }

    #[test]
    fn test_draw_skips_zero_weights() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert_eq!(draw(&[0.0, 2.0, 0.0], &mut rng), 1);
        }
    }

    #[test]
    fn test_draw_frequencies() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0usize; 3];
        let draws = 30_000;
        for _ in 0..draws {
            counts[draw(&[1.0, 2.0, 1.0], &mut rng)] += 1;
        }
        let freq = counts[1] as f64 / draws as f64;
        assert!((freq - 0.5).abs() < 0.02, "freq = {freq}");
    }
}
