use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;

use super::error::{PredictError, PredictResult};
use super::filters::ProfanityFilter;
use super::index_store::IndexStore;

/// A ranked next-word candidate.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Prediction {
	pub word: String,
	pub score: f64,
}

/// Fixed per-order backoff weights.
///
/// Longer context carries more weight when it is present. Scores are a
/// literal weighted sum: the weights of absent orders are excluded and the
/// remaining weights are NOT renormalized. Callers wanting a convex
/// combination construct rescaled weights instead; the merge itself never
/// rescales.
///
/// # Invariants
/// - Every weight is > 0
/// - Weights are non-decreasing with order
#[derive(Clone, Debug)]
pub struct BackoffWeights {
	weights: BTreeMap<usize, f64>,
}

impl Default for BackoffWeights {
	/// Pre-tuned defaults for orders 2..=4.
	fn default() -> Self {
		Self {
			weights: BTreeMap::from([(2, 0.2), (3, 0.3), (4, 0.5)]),
		}
	}
}

impl BackoffWeights {
	/// Creates a weight set from per-order values.
	///
	/// # Errors
	/// - `InvalidOrder` if a weight names an order < 2
	/// - `InvalidWeights` if a weight is not positive or a longer context
	///   would weigh less than a shorter one
	pub fn new(weights: BTreeMap<usize, f64>) -> PredictResult<Self> {
		let mut previous = 0.0;
		for (&order, &weight) in &weights {
			if order < 2 {
				return Err(PredictError::InvalidOrder(order));
			}
			if !weight.is_finite() || weight <= 0.0 || weight < previous {
				return Err(PredictError::InvalidWeights);
			}
			previous = weight;
		}
		Ok(Self { weights })
	}

	/// Returns the weight for an order, if configured.
	pub fn weight(&self, order: usize) -> Option<f64> {
		self.weights.get(&order).copied()
	}
}

/// Query-time backoff predictor over an immutable index store.
///
/// # Responsibilities
/// - Derive the trailing lookup key for every indexed order
/// - Convert per-order counts into sample-relative probabilities
/// - Merge the orders with a fixed weighted sum
/// - Filter profane words before ranking and truncate to top-K
///
/// The predictor is stateless across calls: each `predict` is a pure
/// function of the store snapshot and its inputs, so concurrent calls
/// need no locking.
pub struct BackoffPredictor {
	store: Arc<IndexStore>,
	weights: BackoffWeights,
	profanity: Arc<dyn ProfanityFilter + Send + Sync>,
}

impl BackoffPredictor {
	/// Creates a predictor over a loaded store.
	///
	/// # Errors
	/// Returns `InvalidWeights` if any indexed order has no configured
	/// weight: a serving process fails at startup, never mid-query.
	pub fn new(
		store: Arc<IndexStore>,
		weights: BackoffWeights,
		profanity: Arc<dyn ProfanityFilter + Send + Sync>,
	) -> PredictResult<Self> {
		for order in store.orders() {
			if weights.weight(order).is_none() {
				return Err(PredictError::InvalidWeights);
			}
		}

		Ok(Self {
			store,
			weights,
			profanity,
		})
	}

	/// Predicts the most probable next words for a typed phrase.
	///
	/// The phrase is lowercased; the predictor does not otherwise
	/// retokenize it. For each indexed order `o`, the trailing `o-1`
	/// tokens form the lookup key (omitted when the phrase is too short).
	/// Each candidate's local probability is its count divided by the sum
	/// of counts in the returned pruned list, a sample-relative value that
	/// deliberately ignores unseen-word mass. A word found at several
	/// orders accumulates `weight * probability` across them.
	///
	/// Returns up to `top_k` candidates sorted by descending merged score,
	/// ties broken by ascending word. An empty vector means "no
	/// suggestion" and is a normal, common outcome.
	pub fn predict(&self, phrase: &[String], top_k: usize) -> Vec<Prediction> {
		let tokens: Vec<String> = phrase.iter().map(|token| token.to_lowercase()).collect();

		let mut merged: HashMap<String, f64> = HashMap::new();
		for order in self.store.orders() {
			let context = order - 1;
			if tokens.len() < context {
				continue;
			}

			let key = tokens[tokens.len() - context..].join(" ");
			let candidates = self.store.lookup(order, &key);
			if candidates.is_empty() {
				continue;
			}

			let total: u64 = candidates.iter().map(|(_, count)| u64::from(*count)).sum();
			// Should not panic, coverage is checked at construction
			let weight = self.weights.weight(order).unwrap_or(0.0);

			for (word, count) in candidates {
				let probability = f64::from(*count) / total as f64;
				*merged.entry(word.clone()).or_insert(0.0) += weight * probability;
			}
		}

		let mut ranked: Vec<Prediction> = merged
			.into_iter()
			.filter(|(word, score)| *score > 0.0 && !self.profanity.is_profane(word))
			.map(|(word, score)| Prediction { word, score })
			.collect();

		ranked.sort_by(|a, b| {
			b.score
				.total_cmp(&a.score)
				.then_with(|| a.word.cmp(&b.word))
		});
		ranked.truncate(top_k);
		ranked
	}
}
