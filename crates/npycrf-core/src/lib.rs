//! Semi-Markov trigram lattice for unsupervised word segmentation.
//!
//! A sentence's segmentations are scored by a [`LanguageModel`] and a
//! [`SpanPotential`] combined under a [`Mode`]. [`Lattice`] computes partition
//! functions, draws posterior samples, decodes the best path and derives the
//! marginals used for hyperparameter learning.

pub mod error;
pub mod lattice;
pub mod model;
pub mod sentence;
pub mod settings;
pub mod table;

pub use error::LatticeError;
pub use lattice::{Lattice, Marginals};
pub use model::{LanguageModel, Mode, Scorer, SpanPotential};
pub use sentence::{CharSentence, Sentence, WordId};
