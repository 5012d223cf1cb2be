use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use super::error::PredictResult;

/// Boundary contract with the profanity-list collaborator.
///
/// Consulted at query time: profane words are dropped before ranking so
/// they never occupy a slot an acceptable word could have taken.
pub trait ProfanityFilter {
	fn is_profane(&self, word: &str) -> bool;
}

/// Boundary contract with the dictionary collaborator.
///
/// Consulted at build time: windows containing unknown tokens never enter
/// the frequency tables.
pub trait VocabularyFilter {
	fn is_known_word(&self, word: &str) -> bool;
}

/// Word list loaded from a one-word-per-line source.
///
/// Words are lowercased and trimmed on load; lookups expect the normalized
/// tokens the rest of the pipeline carries. Doubles as a profanity list or
/// a dictionary depending on which trait the caller consumes.
#[derive(Clone, Debug, Default)]
pub struct WordList {
	words: HashSet<String>,
}

impl WordList {
	/// Builds a list from an in-memory word collection.
	pub fn from_words<I, S>(words: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		Self {
			words: words
				.into_iter()
				.map(|word| word.as_ref().trim().to_lowercase())
				.filter(|word| !word.is_empty())
				.collect(),
		}
	}

	/// Reads a list from any reader, one word per line.
	///
	/// Blank lines are skipped.
	pub fn from_reader<R: Read>(reader: R) -> PredictResult<Self> {
		let mut words = HashSet::new();
		for line in BufReader::new(reader).lines() {
			let line = line?;
			let word = line.trim();
			if !word.is_empty() {
				words.insert(word.to_lowercase());
			}
		}
		Ok(Self { words })
	}

	/// Reads a list from a file, one word per line.
	pub fn from_file<P: AsRef<Path>>(path: P) -> PredictResult<Self> {
		Self::from_reader(File::open(path)?)
	}

	/// Returns the number of words in the list.
	pub fn len(&self) -> usize {
		self.words.len()
	}

	pub fn is_empty(&self) -> bool {
		self.words.is_empty()
	}
}

impl ProfanityFilter for WordList {
	fn is_profane(&self, word: &str) -> bool {
		self.words.contains(word)
	}
}

impl VocabularyFilter for WordList {
	fn is_known_word(&self, word: &str) -> bool {
		self.words.contains(word)
	}
}

/// Pass-through profanity filter for callers without a word list.
pub struct PermitAll;

impl ProfanityFilter for PermitAll {
	fn is_profane(&self, _word: &str) -> bool {
		false
	}
}
