use crate::model::Mode;

/// Failures surfaced by the lattice engine.
///
/// Precondition violations (capacity, mode, malformed segmentations) and
/// collaborator contract violations abort the current sentence. Out-of-range
/// table indexing is a programming error and panics instead.
#[derive(Debug, thiserror::Error)]
pub enum LatticeError {
    #[error("empty sentence")]
    EmptySentence,

    #[error("sentence of length {len} exceeds reserved capacity {capacity}")]
    CapacityExceeded { len: usize, capacity: usize },

    #[error("segment of length {length} exceeds max word length {max}")]
    WordLengthExceeded { length: usize, max: usize },

    #[error("operation is not defined in {0:?} mode")]
    IncompatibleMode(Mode),

    #[error("language model returned {p} for span {start}..{end}")]
    NonPositiveProbability { p: f64, start: usize, end: usize },

    #[error("transition weight {weight} at (t={t}, k={k}, j={j}, i={i}) is not strictly positive")]
    NonPositiveTransition {
        weight: f64,
        t: usize,
        k: usize,
        j: usize,
        i: usize,
    },

    #[error("marginal {value} at t={t}, k={k} is outside [0, 1]")]
    MarginalOutOfRange { value: f64, t: usize, k: usize },

    #[error("segment {index} has zero length")]
    EmptySegment { index: usize },

    #[error("segment lengths sum to {sum}, sentence has {len} characters")]
    InvalidSegmentation { sum: usize, len: usize },

    #[error("partition function mismatch: expected {expected}, got {actual}")]
    PartitionMismatch { expected: f64, actual: f64 },
}
