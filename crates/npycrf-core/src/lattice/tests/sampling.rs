use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{lattice, toy_scorer};
use crate::error::LatticeError;
use crate::lattice::testutil::{posterior, UniformLm, ZeroPotential};
use crate::model::{Mode, Scorer};
use crate::sentence::CharSentence;

fn empirical(
    sentence: &CharSentence,
    scorer: &Scorer<'_>,
    w: usize,
    draws: usize,
    seed: u64,
) -> HashMap<Vec<usize>, f64> {
    let mut lattice = lattice(w);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut counts: HashMap<Vec<usize>, usize> = HashMap::new();
    for _ in 0..draws {
        let segments = lattice.blocked_gibbs(sentence, scorer, &mut rng).unwrap();
        *counts.entry(segments).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(segments, n)| (segments, n as f64 / draws as f64))
        .collect()
}

fn assert_matches_posterior(sentence: &CharSentence, scorer: &Scorer<'_>, w: usize, seed: u64) {
    let (exact, _) = posterior(sentence, scorer, w);
    let observed = empirical(sentence, scorer, w, 20_000, seed);
    for (segments, p) in &exact {
        let freq = observed.get(segments).copied().unwrap_or(0.0);
        assert!(
            (freq - p).abs() < 0.02,
            "{segments:?}: sampled {freq}, posterior {p}"
        );
    }
    // Nothing outside the support.
    assert!(observed.keys().all(|s| exact.iter().any(|(e, _)| e == s)));
}

#[test]
fn test_samples_follow_posterior() {
    let sentence = CharSentence::new("abcd");
    assert_matches_posterior(&sentence, &toy_scorer(Mode::Blended), 3, 1);
    assert_matches_posterior(&sentence, &toy_scorer(Mode::Generative), 4, 2);
}

#[test]
fn test_uniform_posterior_prefers_fewer_words() {
    // Every word and the end token cost 0.5: p(y) is proportional to 0.5^(|y| + 1).
    let sentence = CharSentence::new("abcde");
    let lm = UniformLm(0.5);
    let scorer = Scorer::blended(&lm, &ZeroPotential);
    assert_matches_posterior(&sentence, &scorer, 3, 3);
}

#[test]
fn test_samples_cover_sentence() {
    let sentence = CharSentence::new("わたしはがくせいです");
    let scorer = toy_scorer(Mode::Blended);
    let mut lattice = lattice(4);
    for seed in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed);
        let segments = lattice.blocked_gibbs(&sentence, &scorer, &mut rng).unwrap();
        assert_eq!(segments.iter().sum::<usize>(), 10);
        assert!(segments.iter().all(|&k| (1..=4).contains(&k)));
    }
}

#[test]
fn test_same_seed_same_sample() {
    let sentence = CharSentence::new("きょうはいいてんき");
    let scorer = toy_scorer(Mode::Blended);
    let mut a = lattice(4);
    let mut b = lattice(4);
    let mut rng_a = StdRng::seed_from_u64(99);
    let mut rng_b = StdRng::seed_from_u64(99);
    for _ in 0..10 {
        assert_eq!(
            a.blocked_gibbs(&sentence, &scorer, &mut rng_a).unwrap(),
            b.blocked_gibbs(&sentence, &scorer, &mut rng_b).unwrap()
        );
    }
}

#[test]
fn test_one_char_sentence() {
    let sentence = CharSentence::new("a");
    let mut rng = StdRng::seed_from_u64(0);
    for mode in [Mode::Generative, Mode::Blended] {
        let mut lattice = lattice(3);
        let segments = lattice
            .blocked_gibbs(&sentence, &toy_scorer(mode), &mut rng)
            .unwrap();
        assert_eq!(segments, vec![1]);
    }
}

#[test]
fn test_discriminative_sampling_is_rejected() {
    let sentence = CharSentence::new("abc");
    let mut lattice = lattice(3);
    let mut rng = StdRng::seed_from_u64(0);
    let err = lattice
        .blocked_gibbs(&sentence, &toy_scorer(Mode::Discriminative), &mut rng)
        .unwrap_err();
    assert!(matches!(
        err,
        LatticeError::IncompatibleMode(Mode::Discriminative)
    ));
}
