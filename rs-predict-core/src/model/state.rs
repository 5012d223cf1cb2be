use std::collections::HashMap;

use super::error::{PredictError, PredictResult};

/// Represents the accumulated evidence for one lookup phrase.
///
/// A `State` corresponds to a fixed (n-1)-token lookup phrase (`key`) and
/// stores every prediction word observed after it, with occurrence counts.
///
/// ## Responsibilities:
/// - Accumulate occurrences during the batch pass
/// - Produce a deterministic ranked top-K of prediction words
/// - Merge with another state having the same key (parallel build support)
///
/// ## Invariants
/// - All transitions belong to the same `key`
/// - Each transition occurrence count is strictly positive
#[derive(Clone, Debug)]
pub(crate) struct State {
	/// Identifier of the state (the n-1 token lookup phrase).
	key: String,
	/// Observed prediction words indexed by word.
	/// The value represents how many times this word followed the phrase.
	/// Example: { "well" => 120, "on" => 80 }
	transitions: HashMap<String, u32>,
}

impl State {
	/// Creates a new empty state for the given lookup phrase.
	pub(crate) fn new(key: &str) -> Self {
		Self {
			key: key.to_owned(),
			transitions: HashMap::new(),
		}
	}

	/// Records an occurrence of `word` following this phrase.
	///
	/// - If the word was already seen, its occurrence count is increased.
	/// - Otherwise, a new transition is created with an initial count of 1.
	pub(crate) fn add_transition(&mut self, word: &str) {
		*self.transitions.entry(word.to_owned()).or_insert(0) += 1;
	}

	/// Ranks the observed prediction words deterministically.
	///
	/// Sorted by descending count, ties broken by lexicographically
	/// ascending word, truncated to `top_k`. The result does not depend on
	/// hash iteration order.
	pub(crate) fn ranked(&self, top_k: usize) -> Vec<(String, u32)> {
		let mut ranked: Vec<(String, u32)> = self
			.transitions
			.iter()
			.map(|(word, count)| (word.clone(), *count))
			.collect();

		ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		ranked.truncate(top_k);
		ranked
	}

	/// Merges another state into this one.
	///
	/// Both states must represent the same lookup phrase (`key`).
	/// Transition occurrence counts are summed, so the merge order of
	/// partial builds cannot affect the result.
	///
	/// # Errors
	/// Returns an error if the state keys do not match.
	pub(crate) fn merge(&mut self, other: &Self) -> PredictResult<()> {
		if self.key != other.key {
			return Err(PredictError::KeyMismatch(
				self.key.clone(),
				other.key.clone(),
			));
		}

		for (word, count) in &other.transitions {
			*self.transitions.entry(word.clone()).or_insert(0) += *count;
		}

		Ok(())
	}
}
