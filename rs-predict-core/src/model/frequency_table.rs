use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::error::{PredictError, PredictResult};
use super::extractor::NgramExtractor;
use super::filters::VocabularyFilter;
use super::state::State;

/// Default number of prediction words retained per lookup phrase.
pub const DEFAULT_TOP_K: usize = 5;

/// Streaming aggregation of one n-gram order across a corpus sample.
///
/// The `TableBuilder` counts (lookup phrase, prediction word) pairs as
/// sentences stream through it; pairs are discarded after counting, so the
/// raw token stream is never held alongside the partially built table.
///
/// # Responsibilities
/// - Consume tokenized sentences and accumulate transition counts
/// - Optionally skip windows containing non-dictionary tokens
/// - Merge with another builder of the same order (parallel build)
/// - Seal the accumulated counts into an immutable `FrequencyTable`
///
/// # Invariants
/// - `n` is always >= 2
/// - Each state corresponds to a unique lookup phrase of n-1 tokens
/// - All transition counts are >= 1
pub struct TableBuilder {
	extractor: NgramExtractor,

	/// Mapping from a lookup phrase to its accumulated evidence
	states: HashMap<String, State>,
}

impl TableBuilder {
	/// Creates a new builder of order `n`.
	///
	/// # Errors
	/// Returns `InvalidOrder` if `n < 2`.
	pub fn new(n: usize) -> PredictResult<Self> {
		Ok(Self {
			extractor: NgramExtractor::new(n)?,
			states: HashMap::new(),
		})
	}

	/// Returns the order of this builder.
	pub fn order(&self) -> usize {
		self.extractor.order()
	}

	/// Adds one tokenized sentence to the running counts.
	///
	/// Sentences shorter than `n` contribute nothing.
	///
	/// # Errors
	/// Returns `InvalidToken` if the sentence contains an empty token; the
	/// sentence contributes nothing, previously accumulated counts are
	/// unaffected.
	pub fn add_sentence(&mut self, tokens: &[String]) -> PredictResult<()> {
		for (phrase, word) in self.extractor.pairs(tokens)? {
			let state = self
				.states
				.entry(phrase.clone())
				.or_insert_with(|| State::new(&phrase));
			state.add_transition(word);
		}
		Ok(())
	}

	/// Adds one tokenized sentence, skipping every window that contains a
	/// token the vocabulary does not know.
	///
	/// Unknown tokens never enter the table, neither as part of a lookup
	/// phrase nor as a prediction word.
	pub fn add_sentence_filtered(
		&mut self,
		tokens: &[String],
		vocabulary: &dyn VocabularyFilter,
	) -> PredictResult<()> {
		for (phrase, word) in self.extractor.pairs(tokens)? {
			let known = phrase
				.split(' ')
				.chain(std::iter::once(word))
				.all(|token| vocabulary.is_known_word(token));
			if !known {
				continue;
			}

			let state = self
				.states
				.entry(phrase.clone())
				.or_insert_with(|| State::new(&phrase));
			state.add_transition(word);
		}
		Ok(())
	}

	/// Merges another builder into this one.
	///
	/// Counts for matching (phrase, word) pairs are summed. Addition is
	/// commutative, and ranking only happens at seal time, so the order in
	/// which partial builds are merged cannot affect the final table.
	///
	/// # Errors
	/// Returns an error if the builder orders do not match.
	pub fn merge(&mut self, other: Self) -> PredictResult<()> {
		if self.order() != other.order() {
			return Err(PredictError::OrderMismatch {
				expected: self.order(),
				found: other.order(),
			});
		}

		for (key, state) in other.states {
			match self.states.entry(key) {
				Entry::Occupied(mut existing) => existing.get_mut().merge(&state)?,
				Entry::Vacant(slot) => {
					slot.insert(state);
				}
			}
		}

		Ok(())
	}

	/// Seals the accumulated counts into an immutable `FrequencyTable`.
	///
	/// Each lookup phrase keeps its `top_k` best prediction words, sorted
	/// by descending count with ties broken by ascending word.
	///
	/// # Errors
	/// Returns `EmptyCorpusSample` if no pair was ever counted: persisting
	/// an empty table would mask an upstream pipeline failure.
	pub fn finish(self, top_k: usize) -> PredictResult<FrequencyTable> {
		let n = self.order();
		if self.states.is_empty() {
			return Err(PredictError::EmptyCorpusSample(n));
		}

		let entries: BTreeMap<String, Vec<(String, u32)>> = self
			.states
			.into_iter()
			.map(|(phrase, state)| (phrase, state.ranked(top_k)))
			.collect();

		Ok(FrequencyTable { n, top_k, entries })
	}
}

/// Immutable frequency table for one n-gram order.
///
/// Maps each lookup phrase (n-1 tokens joined by a single space) to its
/// ranked prediction words. For every phrase the candidate list is sorted
/// by descending count, ties broken by lexicographically ascending word,
/// and truncated to `top_k`. Once sealed, a table is never mutated.
///
/// Entries live in a `BTreeMap` so the serialized form does not depend on
/// hash iteration order: the same input stream and K reproduce the same
/// bytes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FrequencyTable {
	/// The order of the table (number of tokens in the n-gram)
	n: usize, // must be >= 2

	/// Pruning cap applied when the table was sealed
	top_k: usize,

	/// Mapping from a lookup phrase to its ranked (word, count) candidates
	entries: BTreeMap<String, Vec<(String, u32)>>,
}

impl FrequencyTable {
	/// Assembles a table from precomputed counts (merged shard output).
	///
	/// Counts for a repeated word under the same phrase are summed, then
	/// each phrase is ranked and pruned exactly as in `TableBuilder::finish`,
	/// so the table invariants hold regardless of the input shape.
	///
	/// # Errors
	/// - `InvalidOrder` if `n < 2`
	/// - `EmptyCorpusSample` if `entries` is empty
	pub fn from_entries<I>(n: usize, top_k: usize, entries: I) -> PredictResult<Self>
	where
		I: IntoIterator<Item = (String, Vec<(String, u32)>)>,
	{
		if n < 2 {
			return Err(PredictError::InvalidOrder(n));
		}

		let mut sealed = BTreeMap::new();
		for (phrase, candidates) in entries {
			let mut counts: BTreeMap<String, u32> = BTreeMap::new();
			for (word, count) in candidates {
				*counts.entry(word).or_insert(0) += count;
			}

			let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
			ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
			ranked.truncate(top_k);
			sealed.insert(phrase, ranked);
		}

		if sealed.is_empty() {
			return Err(PredictError::EmptyCorpusSample(n));
		}

		Ok(Self {
			n,
			top_k,
			entries: sealed,
		})
	}

	/// Returns the order of this table.
	pub fn order(&self) -> usize {
		self.n
	}

	/// Returns the pruning cap the table was sealed with.
	pub fn top_k(&self) -> usize {
		self.top_k
	}

	/// Returns the number of distinct lookup phrases.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Returns the ranked candidates for a lookup phrase.
	///
	/// An absent phrase returns an empty slice, never an error: absence is
	/// the normal "no evidence at this order" outcome the backoff relies
	/// on.
	pub fn lookup(&self, phrase: &str) -> &[(String, u32)] {
		self.entries
			.get(phrase)
			.map(Vec::as_slice)
			.unwrap_or(&[])
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;

	fn tokens(sentence: &str) -> Vec<String> {
		sentence.split_whitespace().map(str::to_owned).collect()
	}

	fn build(n: usize, corpus: &[&str]) -> TableBuilder {
		let mut builder = TableBuilder::new(n).unwrap();
		for sentence in corpus {
			builder.add_sentence(&tokens(sentence)).unwrap();
		}
		builder
	}

	#[test]
	fn test_aggregation_sums_repeated_pairs() {
		let builder = build(2, &["it goes", "it goes", "it was"]);
		let table = builder.finish(DEFAULT_TOP_K).unwrap();

		assert_eq!(
			table.lookup("it"),
			&[("goes".to_owned(), 2), ("was".to_owned(), 1)]
		);
	}

	#[test]
	fn test_counts_non_increasing_and_ties_alphabetical() {
		let builder = build(
			2,
			&["a x", "a x", "a x", "a m", "a m", "a b", "a z", "a b"],
		);
		let table = builder.finish(DEFAULT_TOP_K).unwrap();
		let ranked = table.lookup("a");

		let counts: Vec<u32> = ranked.iter().map(|(_, c)| *c).collect();
		assert_eq!(counts, vec![3, 2, 2, 1]);
		// "b" and "m" both have 2: alphabetical
		assert_eq!(ranked[1].0, "b");
		assert_eq!(ranked[2].0, "m");
	}

	#[test]
	fn test_pruning_keeps_top_k() {
		let builder = build(2, &["a v", "a w", "a x", "a y", "a z", "a z"]);
		let table = builder.finish(2).unwrap();

		assert_eq!(
			table.lookup("a"),
			&[("z".to_owned(), 2), ("v".to_owned(), 1)]
		);
		assert!(table.lookup("a").len() <= table.top_k());
	}

	#[test]
	fn test_empty_sample_aborts_seal() {
		let builder = build(3, &["too short", "me too"]);
		match builder.finish(DEFAULT_TOP_K) {
			Err(PredictError::EmptyCorpusSample(n)) => assert_eq!(n, 3),
			_ => panic!("expected EmptyCorpusSample"),
		}
	}

	#[test]
	fn test_merge_is_order_independent() {
		let corpus_a = ["it goes well", "it goes on"];
		let corpus_b = ["it goes well", "it was here"];

		let mut left = build(2, &corpus_a);
		left.merge(build(2, &corpus_b)).unwrap();

		let mut right = build(2, &corpus_b);
		right.merge(build(2, &corpus_a)).unwrap();

		assert_eq!(
			left.finish(DEFAULT_TOP_K).unwrap(),
			right.finish(DEFAULT_TOP_K).unwrap()
		);
	}

	#[test]
	fn test_merge_rejects_order_mismatch() {
		let mut bigrams = build(2, &["it goes"]);
		let trigrams = build(3, &["it goes well"]);
		assert!(bigrams.merge(trigrams).is_err());
	}

	#[test]
	fn test_vocabulary_filter_excludes_unknown_windows() {
		struct Dict(HashSet<String>);
		impl crate::model::filters::VocabularyFilter for Dict {
			fn is_known_word(&self, word: &str) -> bool {
				self.0.contains(word)
			}
		}

		let dict = Dict(
			["it", "goes", "well"]
				.iter()
				.map(|w| (*w).to_owned())
				.collect(),
		);

		let mut builder = TableBuilder::new(2).unwrap();
		builder
			.add_sentence_filtered(&tokens("it goes qwzx well"), &dict)
			.unwrap();
		let table = builder.finish(DEFAULT_TOP_K).unwrap();

		// "goes qwzx" and "qwzx well" are both dropped
		assert_eq!(table.lookup("it"), &[("goes".to_owned(), 1)]);
		assert!(table.lookup("goes").is_empty());
		assert!(table.lookup("qwzx").is_empty());
	}

	#[test]
	fn test_from_entries_ranks_and_dedups() {
		let table = FrequencyTable::from_entries(
			3,
			2,
			vec![(
				"it goes".to_owned(),
				vec![
					("on".to_owned(), 40),
					("well".to_owned(), 100),
					("on".to_owned(), 40),
					("with".to_owned(), 45),
				],
			)],
		)
		.unwrap();

		assert_eq!(
			table.lookup("it goes"),
			&[("well".to_owned(), 100), ("on".to_owned(), 80)]
		);
	}
}
