//! Collaborator contracts consumed by the lattice, and the log-linear scorer
//! that blends them into transition weights.

use std::ops::Range;

use crate::error::LatticeError;
use crate::sentence::{Sentence, WordId};

/// Bayesian n-gram model over substrings.
pub trait LanguageModel: Send + Sync {
    /// `p(w | h)` of the word covering `span`, where `word_ids` is
    /// `[w_{-2}, w_{-1}, w]`. The end-of-sentence token is passed with an
    /// empty span at the sentence end.
    ///
    /// Must be strictly positive for every triple the lattice builds.
    fn p_w_given_h(&self, sentence: &dyn Sentence, word_ids: &[WordId; 3], span: Range<usize>)
        -> f64;
}

/// Linear-chain scorer supplying span potentials.
pub trait SpanPotential: Send + Sync {
    /// Log-potential of the segment covering characters `start..end`.
    /// The end-of-sentence token covers `len..len + 1`.
    fn gamma(&self, sentence: &dyn Sentence, start: usize, end: usize) -> f64;

    /// Weight of the language-model term in the blended score.
    fn lambda_0(&self) -> f64;
}

/// Which terms make up a transition weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Language-model probability only.
    Generative,
    /// Span potential only.
    Discriminative,
    /// `exp(lambda_0 * ln p(w | h) + gamma)`.
    #[default]
    Blended,
}

impl Mode {
    pub fn uses_language_model(self) -> bool {
        !matches!(self, Mode::Discriminative)
    }

    pub fn uses_potential(self) -> bool {
        !matches!(self, Mode::Generative)
    }
}

/// A transition weight together with the raw trigram probability behind it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Transition {
    /// `None` when the mode never consults the language model.
    pub pw_h: Option<f64>,
    pub weight: f64,
}

/// A language model and a span scorer paired under one [`Mode`].
#[derive(Clone, Copy)]
pub struct Scorer<'a> {
    lm: &'a dyn LanguageModel,
    potential: &'a dyn SpanPotential,
    mode: Mode,
    lambda_0: f64,
}

impl<'a> Scorer<'a> {
    pub fn new(lm: &'a dyn LanguageModel, potential: &'a dyn SpanPotential, mode: Mode) -> Self {
        // lambda_0 is read once per scorer, not once per transition.
        let lambda_0 = match mode {
            Mode::Generative => 1.0,
            Mode::Discriminative => 0.0,
            Mode::Blended => potential.lambda_0(),
        };
        Self {
            lm,
            potential,
            mode,
            lambda_0,
        }
    }

    pub fn blended(lm: &'a dyn LanguageModel, potential: &'a dyn SpanPotential) -> Self {
        Self::new(lm, potential, Mode::Blended)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Effective weight of the language-model term.
    pub fn lambda_0(&self) -> f64 {
        self.lambda_0
    }

    /// Span potential of `start..end`, or 0 when the mode ignores potentials.
    pub(crate) fn potential(&self, sentence: &dyn Sentence, start: usize, end: usize) -> f64 {
        if self.mode.uses_potential() {
            self.potential.gamma(sentence, start, end)
        } else {
            0.0
        }
    }

    fn p_w_given_h(
        &self,
        sentence: &dyn Sentence,
        word_ids: &[WordId; 3],
        span: Range<usize>,
    ) -> Result<f64, LatticeError> {
        let p = self.lm.p_w_given_h(sentence, word_ids, span.clone());
        if p > 0.0 {
            Ok(p)
        } else {
            Err(LatticeError::NonPositiveProbability {
                p,
                start: span.start,
                end: span.end,
            })
        }
    }

    /// Probability-space transition weight into the word covering `span`.
    pub(crate) fn transition(
        &self,
        sentence: &dyn Sentence,
        word_ids: &[WordId; 3],
        span: Range<usize>,
        potential: f64,
    ) -> Result<Transition, LatticeError> {
        match self.mode {
            Mode::Discriminative => Ok(Transition {
                pw_h: None,
                weight: potential.exp(),
            }),
            Mode::Generative => {
                let pw_h = self.p_w_given_h(sentence, word_ids, span)?;
                Ok(Transition {
                    pw_h: Some(pw_h),
                    weight: pw_h,
                })
            }
            Mode::Blended => {
                let pw_h = self.p_w_given_h(sentence, word_ids, span)?;
                Ok(Transition {
                    pw_h: Some(pw_h),
                    weight: (self.lambda_0 * pw_h.ln() + potential).exp(),
                })
            }
        }
    }

    /// Log-space transition weight, used by Viterbi and path scoring.
    pub(crate) fn log_transition(
        &self,
        sentence: &dyn Sentence,
        word_ids: &[WordId; 3],
        span: Range<usize>,
        potential: f64,
    ) -> Result<f64, LatticeError> {
        match self.mode {
            Mode::Discriminative => Ok(potential),
            Mode::Generative => Ok(self.p_w_given_h(sentence, word_ids, span)?.ln()),
            Mode::Blended => {
                let pw_h = self.p_w_given_h(sentence, word_ids, span)?;
                Ok(self.lambda_0 * pw_h.ln() + potential)
            }
        }
    }
}
