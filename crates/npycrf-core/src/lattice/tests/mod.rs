mod sampling;

use super::testutil::{ToyLm, ToyPotential};
use super::Lattice;
use crate::model::{Mode, Scorer};

static LM: ToyLm = ToyLm;
static POTENTIAL: ToyPotential = ToyPotential { lambda_0: 0.8 };

pub(super) fn toy_scorer(mode: Mode) -> Scorer<'static> {
    Scorer::new(&LM, &POTENTIAL, mode)
}

pub(super) fn lattice(max_word_length: usize) -> Lattice {
    Lattice::with_capacity(max_word_length, 16)
}
