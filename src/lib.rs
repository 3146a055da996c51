//! Word segmentation with a blended NPYLM + CRF model.
//!
//! [`Npycrf`] pairs one language model with one span scorer and owns a
//! lattice sized to the longest sentence seen so far. Batch parsing runs one
//! lattice per rayon worker.

mod trace_init;

use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use rayon::prelude::*;
use tracing::{debug, debug_span};

pub use npycrf_core::settings::{self, SettingsError};
pub use npycrf_core::{
    CharSentence, LanguageModel, Lattice, LatticeError, Marginals, Mode, Scorer, Sentence,
    SpanPotential, WordId,
};
pub use trace_init::init_tracing;

#[derive(Debug, thiserror::Error)]
pub enum NpycrfError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Lattice(#[from] LatticeError),
}

/// Install settings from a TOML file. Must run before the first model is built.
pub fn load_settings(path: &Path) -> Result<(), NpycrfError> {
    let content = std::fs::read_to_string(path).map_err(|source| NpycrfError::Io {
        path: path.display().to_string(),
        source,
    })?;
    settings::init_custom(content)?;
    Ok(())
}

/// The segmentation model: collaborators, scoring mode and a lattice.
pub struct Npycrf {
    lm: Arc<dyn LanguageModel>,
    potential: Arc<dyn SpanPotential>,
    mode: Mode,
    use_scaling: bool,
    lattice: Lattice,
}

impl Npycrf {
    pub fn new(lm: Arc<dyn LanguageModel>, potential: Arc<dyn SpanPotential>) -> Self {
        let max_word_length = settings::settings().lattice.max_word_length;
        Self::with_max_word_length(lm, potential, max_word_length)
    }

    pub fn with_max_word_length(
        lm: Arc<dyn LanguageModel>,
        potential: Arc<dyn SpanPotential>,
        max_word_length: usize,
    ) -> Self {
        let lattice_settings = &settings::settings().lattice;
        Self {
            lm,
            potential,
            mode: Mode::default(),
            use_scaling: lattice_settings.use_scaling,
            lattice: Lattice::with_capacity(
                max_word_length,
                lattice_settings.initial_sentence_capacity,
            ),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn max_word_length(&self) -> usize {
        self.lattice.max_word_length()
    }

    /// Most probable segmentation; the sentence is split accordingly.
    pub fn parse<S: Sentence>(&mut self, sentence: &mut S) -> Result<Vec<usize>, NpycrfError> {
        self.reserve_for(sentence.len());
        let scorer = Scorer::new(self.lm.as_ref(), self.potential.as_ref(), self.mode);
        let segments = self.lattice.viterbi_decode(&*sentence, &scorer)?;
        sentence.split(&segments);
        Ok(segments)
    }

    /// Resample the sentence's segmentation from the posterior and split it.
    pub fn gibbs<S: Sentence, R: Rng + ?Sized>(
        &mut self,
        sentence: &mut S,
        rng: &mut R,
    ) -> Result<Vec<usize>, NpycrfError> {
        self.reserve_for(sentence.len());
        let scorer = Scorer::new(self.lm.as_ref(), self.potential.as_ref(), self.mode);
        let segments = self.lattice.blocked_gibbs(&*sentence, &scorer, rng)?;
        sentence.split(&segments);
        Ok(segments)
    }

    pub fn compute_normalizing_constant(
        &mut self,
        sentence: &dyn Sentence,
    ) -> Result<f64, NpycrfError> {
        self.reserve_for(sentence.len());
        let scorer = Scorer::new(self.lm.as_ref(), self.potential.as_ref(), self.mode);
        Ok(self
            .lattice
            .compute_normalizing_constant(sentence, &scorer, self.use_scaling)?)
    }

    pub fn compute_log_normalizing_constant(
        &mut self,
        sentence: &dyn Sentence,
    ) -> Result<f64, NpycrfError> {
        self.reserve_for(sentence.len());
        let scorer = Scorer::new(self.lm.as_ref(), self.potential.as_ref(), self.mode);
        Ok(self
            .lattice
            .compute_log_normalizing_constant(sentence, &scorer, self.use_scaling)?)
    }

    /// Unnormalised `log p(y | x)` of the segmentation `segments`.
    ///
    /// In blended mode this is `lambda_0 * log p_lm(y) + sum gamma`.
    pub fn compute_log_proportional_p_y_given_sentence(
        &mut self,
        sentence: &dyn Sentence,
        segments: &[usize],
    ) -> Result<f64, NpycrfError> {
        self.reserve_for(sentence.len());
        let scorer = Scorer::new(self.lm.as_ref(), self.potential.as_ref(), self.mode);
        Ok(self.lattice.log_path_score(sentence, &scorer, segments)?)
    }

    /// Normalised `log p(y | x)`.
    pub fn compute_log_p_y_given_sentence(
        &mut self,
        sentence: &dyn Sentence,
        segments: &[usize],
    ) -> Result<f64, NpycrfError> {
        let log_score = self.compute_log_proportional_p_y_given_sentence(sentence, segments)?;
        let scorer = Scorer::new(self.lm.as_ref(), self.potential.as_ref(), self.mode);
        // Scaling stays on here: the unscaled mass underflows on long sentences.
        let log_z = self
            .lattice
            .compute_log_normalizing_constant(sentence, &scorer, true)?;
        Ok(log_score - log_z)
    }

    /// Posterior marginals for hyperparameter learning.
    pub fn marginals(&mut self, sentence: &dyn Sentence) -> Result<Marginals<'_>, NpycrfError> {
        self.reserve_for(sentence.len());
        let scorer = Scorer::new(self.lm.as_ref(), self.potential.as_ref(), self.mode);
        Ok(self.lattice.enumerate_marginals(sentence, &scorer)?)
    }

    /// Parse many sentences in parallel, one lattice per worker.
    ///
    /// Returns the words of every sentence, in input order.
    pub fn parse_batch(&self, texts: &[&str]) -> Result<Vec<Vec<String>>, NpycrfError> {
        let _span = debug_span!("parse_batch", sentences = texts.len()).entered();
        let scorer = Scorer::new(self.lm.as_ref(), self.potential.as_ref(), self.mode);
        let max_word_length = self.max_word_length();
        let capacity = self.lattice.max_sentence_length();
        let parsed = texts
            .par_iter()
            .map_init(
                || Lattice::with_capacity(max_word_length, capacity),
                |lattice, text| {
                    let mut sentence = CharSentence::new(text);
                    lattice.reserve(max_word_length, sentence.len());
                    let segments = lattice.viterbi_decode(&sentence, &scorer)?;
                    sentence.split(&segments);
                    Ok(sentence.words())
                },
            )
            .collect::<Result<Vec<_>, LatticeError>>()?;
        debug!(sentences = parsed.len(), "batch parsed");
        Ok(parsed)
    }

    fn reserve_for(&mut self, len: usize) {
        let max_word_length = self.lattice.max_word_length();
        self.lattice.reserve(max_word_length, len);
    }
}
