use thiserror::Error;

/// Errors raised while building, persisting or querying the n-gram index.
///
/// Lookup misses and empty prediction results are NOT errors: they are
/// normal outcomes propagated as empty sequences.
#[derive(Error, Debug)]
pub enum PredictError {
	/// N-gram orders below 2 have no lookup phrase.
	#[error("n must be >= 2, got {0}")]
	InvalidOrder(usize),

	/// An empty token reached the extractor, which means the upstream
	/// tokenizer broke its contract. Aborts that sentence only.
	#[error("empty token at position {0} in sentence")]
	InvalidToken(usize),

	/// The corpus sample produced zero pairs for an order. The build is
	/// aborted rather than persisting an empty table that would mask an
	/// upstream pipeline failure.
	#[error("corpus sample produced no n-grams of order {0}")]
	EmptyCorpusSample(usize),

	/// Attempted to merge builds of different orders.
	#[error("order mismatch: expected {expected}, got {found}")]
	OrderMismatch { expected: usize, found: usize },

	/// Attempted to merge states of different lookup phrases.
	#[error("state key mismatch: {0:?} vs {1:?}")]
	KeyMismatch(String, String),

	/// A store cannot hold two tables of the same order.
	#[error("duplicate table for order {0}")]
	DuplicateOrder(usize),

	/// Backoff weights must be positive and non-decreasing with order.
	#[error("backoff weights must be positive and non-decreasing with order")]
	InvalidWeights,

	/// The persisted store failed validation on load. Nothing is partially
	/// initialized.
	#[error("corrupt index store: {0}")]
	CorruptIndex(String),

	#[error("failed to encode: {0}")]
	Encode(#[from] postcard::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

pub type PredictResult<T> = Result<T, PredictError>;
