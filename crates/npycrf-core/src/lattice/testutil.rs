//! Deterministic toy collaborators and brute-force references for lattice tests.

use std::ops::Range;

use crate::model::{LanguageModel, Scorer, SpanPotential};
use crate::sentence::{Sentence, WordId};

/// Same probability for every word, end token included.
pub struct UniformLm(pub f64);

impl LanguageModel for UniformLm {
    fn p_w_given_h(&self, _: &dyn Sentence, _: &[WordId; 3], _: Range<usize>) -> f64 {
        self.0
    }
}

/// `0.5^len` times a context factor in `[0.5, 1]` hashed from all three ids,
/// so that the trigram context actually matters.
pub struct ToyLm;

impl LanguageModel for ToyLm {
    fn p_w_given_h(&self, _: &dyn Sentence, word_ids: &[WordId; 3], span: Range<usize>) -> f64 {
        let [a, b, c] = [word_ids[0].0, word_ids[1].0, word_ids[2].0];
        let mix = a.rotate_left(7) ^ b.rotate_left(19) ^ c;
        let context = 0.5 + 0.5 * (mix % 97) as f64 / 96.0;
        0.5f64.powi(span.len() as i32) * context
    }
}

/// Potentials from character codes; the end-of-sentence span scores 0.
pub struct ToyPotential {
    pub lambda_0: f64,
}

impl SpanPotential for ToyPotential {
    fn gamma(&self, sentence: &dyn Sentence, start: usize, end: usize) -> f64 {
        let chars = sentence.characters();
        let end = end.min(chars.len());
        let start = start.min(end);
        chars[start..end]
            .iter()
            .enumerate()
            .map(|(offset, &c)| {
                let code = (c as u32 as f64 * 0.618_033_988_7).fract() - 0.5;
                code * ((offset + 1) as f64).sqrt()
            })
            .sum()
    }

    fn lambda_0(&self) -> f64 {
        self.lambda_0
    }
}

pub struct ZeroPotential;

impl SpanPotential for ZeroPotential {
    fn gamma(&self, _: &dyn Sentence, _: usize, _: usize) -> f64 {
        0.0
    }

    fn lambda_0(&self) -> f64 {
        1.0
    }
}

/// Every segmentation of `len` characters into words of at most `max` characters.
pub fn all_segmentations(len: usize, max: usize) -> Vec<Vec<usize>> {
    if len == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    for first in 1..=len.min(max) {
        for mut rest in all_segmentations(len - first, max) {
            rest.insert(0, first);
            out.push(rest);
        }
    }
    out
}

/// Probability-space weight of one path, scored straight from the collaborators.
pub fn path_weight(sentence: &dyn Sentence, scorer: &Scorer<'_>, segments: &[usize]) -> f64 {
    let len = sentence.len();
    let mut ids = [WordId::BOS, WordId::BOS];
    let mut weight = 1.0;
    let mut start = 0;
    for &k in segments {
        let id = sentence.word_id(start, start + k);
        let potential = scorer.potential(sentence, start, start + k);
        let transition = scorer
            .transition(sentence, &[ids[0], ids[1], id], start..start + k, potential)
            .unwrap();
        weight *= transition.weight;
        ids = [ids[1], id];
        start += k;
    }
    let potential = scorer.potential(sentence, len, len + 1);
    let transition = scorer
        .transition(sentence, &[ids[0], ids[1], WordId::EOS], len..len, potential)
        .unwrap();
    weight * transition.weight
}

/// Posterior over every segmentation, with the partition function.
pub fn posterior(
    sentence: &dyn Sentence,
    scorer: &Scorer<'_>,
    max: usize,
) -> (Vec<(Vec<usize>, f64)>, f64) {
    let weighted: Vec<(Vec<usize>, f64)> = all_segmentations(sentence.len(), max)
        .into_iter()
        .map(|segments| {
            let weight = path_weight(sentence, scorer, &segments);
            (segments, weight)
        })
        .collect();
    let z: f64 = weighted.iter().map(|(_, w)| w).sum();
    let posterior = weighted.into_iter().map(|(s, w)| (s, w / z)).collect();
    (posterior, z)
}

/// `(t, k, j, i)` of every transition along a path, end-of-sentence included.
pub fn path_transitions(segments: &[usize]) -> Vec<[usize; 4]> {
    let mut out = Vec::with_capacity(segments.len() + 1);
    let (mut t, mut j, mut i) = (0, 0, 0);
    for &k in segments {
        t += k;
        out.push([t, k, j, i]);
        i = j;
        j = k;
    }
    out.push([t + 1, 1, j, i]);
    out
}

pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    let scale = expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= tolerance * scale,
        "expected {expected}, got {actual}"
    );
}
