use super::error::{PredictError, PredictResult};

/// Splits sentences into (lookup phrase, prediction word) pairs for a
/// fixed n-gram order.
///
/// # Responsibilities
/// - Slide a window of `n` tokens over one sentence at a time
/// - Join the first `n-1` tokens of each window into the lookup phrase
/// - Surface upstream contract violations (empty tokens)
///
/// # Invariants
/// - `n` is always >= 2
/// - Windows never cross a sentence boundary; sentence segmentation is a
///   precondition, not an internal step
#[derive(Clone, Copy, Debug)]
pub struct NgramExtractor {
	/// The order of the extracted n-grams (number of tokens per window)
	n: usize, // must be >= 2
}

impl NgramExtractor {
	/// Creates a new extractor of order `n`.
	///
	/// # Errors
	/// Returns `InvalidOrder` if `n < 2`.
	pub fn new(n: usize) -> PredictResult<Self> {
		if n < 2 {
			return Err(PredictError::InvalidOrder(n));
		}
		Ok(Self { n })
	}

	/// Returns the order of this extractor.
	pub fn order(&self) -> usize {
		self.n
	}

	/// Yields one (lookup phrase, prediction word) pair per sliding window
	/// of length `n` within the sentence.
	///
	/// A sentence with fewer than `n` tokens yields an empty sequence; that
	/// is a normal outcome, not an error. The extractor performs no token
	/// cleanup of its own: punctuation and URL artifacts are assumed
	/// removed upstream.
	///
	/// # Errors
	/// Returns `InvalidToken` if the sentence contains an empty-string
	/// token, aborting extraction for this sentence only.
	pub fn pairs<'a>(
		&self,
		tokens: &'a [String],
	) -> PredictResult<impl Iterator<Item = (String, &'a str)>> {
		if let Some(position) = tokens.iter().position(|token| token.is_empty()) {
			return Err(PredictError::InvalidToken(position));
		}

		let n = self.n;
		Ok(tokens.windows(n).map(move |window| {
			let phrase = window[..n - 1].join(" ");
			(phrase, window[n - 1].as_str())
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tokens(sentence: &str) -> Vec<String> {
		sentence.split_whitespace().map(str::to_owned).collect()
	}

	#[test]
	fn test_rejects_order_below_two() {
		assert!(NgramExtractor::new(1).is_err());
		assert!(NgramExtractor::new(2).is_ok());
	}

	#[test]
	fn test_short_sentence_yields_no_pairs() {
		let extractor = NgramExtractor::new(3).unwrap();
		let short = tokens("too short");
		let pairs: Vec<_> = extractor.pairs(&short).unwrap().collect();
		assert!(pairs.is_empty());

		let pairs: Vec<_> = extractor.pairs(&[]).unwrap().collect();
		assert!(pairs.is_empty());
	}

	#[test]
	fn test_pairs_slide_within_the_sentence() {
		let extractor = NgramExtractor::new(3).unwrap();
		let sentence = tokens("it goes well with cheese");
		let pairs: Vec<_> = extractor
			.pairs(&sentence)
			.unwrap()
			.collect();

		assert_eq!(
			pairs,
			vec![
				("it goes".to_owned(), "well"),
				("goes well".to_owned(), "with"),
				("well with".to_owned(), "cheese"),
			]
		);
	}

	#[test]
	fn test_empty_token_is_rejected() {
		let extractor = NgramExtractor::new(2).unwrap();
		let bad = vec!["it".to_owned(), String::new(), "goes".to_owned()];

		match extractor.pairs(&bad) {
			Err(PredictError::InvalidToken(position)) => assert_eq!(position, 1),
			_ => panic!("expected InvalidToken"),
		}
	}
}
