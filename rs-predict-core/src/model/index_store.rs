use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::error::{PredictError, PredictResult};
use super::filters::VocabularyFilter;
use super::frequency_table::{FrequencyTable, TableBuilder, DEFAULT_TOP_K};

/// Magic bytes identifying a persisted index store.
const MAGIC: [u8; 4] = *b"NWIX";

/// Version of the persisted layout. Bumped on any change to the on-disk
/// format; loading any other version fails with `CorruptIndex`.
pub const FORMAT_VERSION: u16 = 1;

/// Options for a batch index build.
pub struct BuildOptions {
	/// N-gram orders to index, each >= 2.
	pub orders: Vec<usize>,

	/// Prediction words retained per lookup phrase.
	pub top_k: usize,

	/// Optional build-time dictionary gate: windows containing a token the
	/// vocabulary does not know are skipped.
	pub vocabulary: Option<Arc<dyn VocabularyFilter + Send + Sync>>,
}

impl Default for BuildOptions {
	fn default() -> Self {
		Self {
			orders: vec![2, 3, 4],
			top_k: DEFAULT_TOP_K,
			vocabulary: None,
		}
	}
}

/// The set of per-order frequency tables built from one corpus sample.
///
/// # Responsibilities
/// - Own all frequency tables, keyed by integer order
/// - Build them in one batch pass over the sentence source
/// - Persist and reload the set as a unit, with format versioning
/// - Answer point lookups at serve time
///
/// # Invariants
/// - Tables are immutable once the store is built; there is no mutation
///   API, so concurrent readers need no locking
/// - Every key in `tables` equals its table's own order
///
/// A store is rebuilt wholesale when the corpus sample, order set or
/// pruning cap changes; n-gram counts are not amenable to cheap online
/// update without re-deriving denominators.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IndexStore {
	/// Mapping from n-gram order to its frequency table
	tables: BTreeMap<usize, FrequencyTable>,
}

impl IndexStore {
	/// Assembles a store from already-sealed tables.
	///
	/// # Errors
	/// Returns `DuplicateOrder` if two tables share an order.
	pub fn from_tables(tables: Vec<FrequencyTable>) -> PredictResult<Self> {
		let mut map = BTreeMap::new();
		for table in tables {
			let order = table.order();
			if map.insert(order, table).is_some() {
				return Err(PredictError::DuplicateOrder(order));
			}
		}
		Ok(Self { tables: map })
	}

	/// Builds a store from a tokenized sentence source in one batch pass.
	///
	/// Sentences are split into chunks, worker threads accumulate partial
	/// builders for every configured order, and the partials are merged
	/// into final builders before sealing. Counts are summed and ranking
	/// happens once at seal time, so the reduction order cannot change the
	/// result.
	///
	/// A sentence that fails token validation is logged and skipped; it
	/// aborts only that sentence, never the build.
	///
	/// # Errors
	/// - `InvalidOrder` if `options.orders` is empty or names an order < 2
	/// - `EmptyCorpusSample` if any order ends up with zero pairs
	pub fn build(sentences: &[Vec<String>], options: &BuildOptions) -> PredictResult<Self> {
		if options.orders.is_empty() {
			return Err(PredictError::InvalidOrder(0));
		}
		let mut orders = options.orders.clone();
		orders.sort_unstable();
		orders.dedup();
		for &order in &orders {
			if order < 2 {
				return Err(PredictError::InvalidOrder(order));
			}
		}

		let cpus = num_cpus::get();
		let factor = 8;
		let chunks = cpus * factor;
		let chunk_size = ((sentences.len() + chunks - 1) / chunks).max(1);

		let (tx, rx) = mpsc::channel();
		for chunk in sentences.chunks(chunk_size) {
			let tx = tx.clone();
			let chunk: Vec<Vec<String>> = chunk.to_vec();
			let orders = orders.clone();
			let vocabulary = options.vocabulary.clone();

			thread::spawn(move || {
				let partial = Self::build_partial(&chunk, &orders, vocabulary.as_deref());
				tx.send(partial).expect("Failed to send from thread");
			});
		}
		drop(tx);

		// Impossible to panic, orders are validated >= 2
		let mut merged: Vec<TableBuilder> = orders
			.iter()
			.map(|&order| TableBuilder::new(order).unwrap())
			.collect();
		for partial in rx.iter() {
			for (builder, partial_builder) in merged.iter_mut().zip(partial) {
				builder.merge(partial_builder)?;
			}
		}

		let mut tables = Vec::with_capacity(merged.len());
		for builder in merged {
			let order = builder.order();
			let table = builder.finish(options.top_k)?;
			info!(
				"sealed order-{} table: {} lookup phrases (top {} kept)",
				order,
				table.len(),
				options.top_k
			);
			tables.push(table);
		}

		Self::from_tables(tables)
	}

	/// Accumulates partial builders for one chunk of sentences.
	fn build_partial(
		chunk: &[Vec<String>],
		orders: &[usize],
		vocabulary: Option<&(dyn VocabularyFilter + Send + Sync)>,
	) -> Vec<TableBuilder> {
		// Impossible to panic, orders are validated >= 2
		let mut builders: Vec<TableBuilder> = orders
			.iter()
			.map(|&order| TableBuilder::new(order).unwrap())
			.collect();

		'sentences: for sentence in chunk {
			for builder in &mut builders {
				let added = match vocabulary {
					Some(filter) => builder.add_sentence_filtered(sentence, filter),
					None => builder.add_sentence(sentence),
				};
				if let Err(error) = added {
					warn!("skipping sentence: {error}");
					continue 'sentences;
				}
			}
		}

		builders
	}

	/// Returns the indexed orders, ascending.
	pub fn orders(&self) -> impl Iterator<Item = usize> + '_ {
		self.tables.keys().copied()
	}

	/// Returns the table for an order, if indexed.
	pub fn table(&self, order: usize) -> Option<&FrequencyTable> {
		self.tables.get(&order)
	}

	/// Returns the ranked candidates for a lookup phrase at an order.
	///
	/// An unknown order or an absent phrase returns an empty slice, never
	/// an error: "no evidence at this order" is the normal outcome the
	/// backoff merge consumes directly.
	pub fn lookup(&self, order: usize, phrase: &str) -> &[(String, u32)] {
		self.tables
			.get(&order)
			.map(|table| table.lookup(phrase))
			.unwrap_or(&[])
	}

	/// Serializes the store to `path`.
	///
	/// Layout: 4 magic bytes, a little-endian u16 format version, then the
	/// postcard body. The body is self-describing: per order, the number
	/// of distinct lookup phrases precedes the phrase records.
	pub fn save<P: AsRef<Path>>(&self, path: P) -> PredictResult<()> {
		let body = postcard::to_stdvec(self)?;

		let mut bytes = Vec::with_capacity(MAGIC.len() + 2 + body.len());
		bytes.extend_from_slice(&MAGIC);
		bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
		bytes.extend_from_slice(&body);

		std::fs::write(path, bytes)?;
		Ok(())
	}

	/// Loads a store previously written by `save`.
	///
	/// The store is validated fully before being returned, so a serving
	/// process either gets a usable store or nothing.
	///
	/// # Errors
	/// Returns `CorruptIndex` on a bad magic, a format version mismatch,
	/// an undecodable body, or a table stored under the wrong order key.
	pub fn load<P: AsRef<Path>>(path: P) -> PredictResult<Self> {
		let bytes = std::fs::read(&path)?;
		debug!(
			"loading index store from {} ({} bytes)",
			path.as_ref().display(),
			bytes.len()
		);
		Self::from_bytes(&bytes)
	}

	/// Decodes a store from raw bytes (see `save` for the layout).
	pub fn from_bytes(bytes: &[u8]) -> PredictResult<Self> {
		if bytes.len() < MAGIC.len() + 2 || bytes[..MAGIC.len()] != MAGIC {
			return Err(PredictError::CorruptIndex("bad magic".to_owned()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version != FORMAT_VERSION {
			return Err(PredictError::CorruptIndex(format!(
				"format version {version} is not supported (expected {FORMAT_VERSION})"
			)));
		}

		let store: IndexStore = postcard::from_bytes(&bytes[MAGIC.len() + 2..])
			.map_err(|error| PredictError::CorruptIndex(error.to_string()))?;

		for (&order, table) in &store.tables {
			if order != table.order() {
				return Err(PredictError::CorruptIndex(format!(
					"table of order {} stored under key {}",
					table.order(),
					order
				)));
			}
		}

		Ok(store)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tokens(sentence: &str) -> Vec<String> {
		sentence.split_whitespace().map(str::to_owned).collect()
	}

	fn corpus() -> Vec<Vec<String>> {
		[
			"it goes well with cheese",
			"it goes well with bread",
			"it goes on and on",
			"it was a long day",
			"so it goes",
		]
		.iter()
		.map(|s| tokens(s))
		.collect()
	}

	#[test]
	fn test_build_indexes_all_orders() {
		let store = IndexStore::build(&corpus(), &BuildOptions::default()).unwrap();

		assert_eq!(store.orders().collect::<Vec<_>>(), vec![2, 3, 4]);
		assert_eq!(
			store.lookup(3, "it goes"),
			&[
				("well".to_owned(), 2),
				("on".to_owned(), 1),
			]
		);
		assert_eq!(
			store.lookup(4, "goes well with"),
			&[("bread".to_owned(), 1), ("cheese".to_owned(), 1)]
		);
	}

	#[test]
	fn test_lookup_miss_is_empty_not_error() {
		let store = IndexStore::build(&corpus(), &BuildOptions::default()).unwrap();

		assert!(store.lookup(3, "never seen").is_empty());
		assert!(store.lookup(7, "it goes").is_empty());
	}

	#[test]
	fn test_build_is_deterministic() {
		let options = BuildOptions::default();
		let first = IndexStore::build(&corpus(), &options).unwrap();
		let second = IndexStore::build(&corpus(), &options).unwrap();
		assert_eq!(first, second);
	}

	#[test]
	fn test_invalid_sentence_is_skipped_not_fatal() {
		let mut polluted = corpus();
		polluted.insert(2, vec!["it".to_owned(), String::new(), "goes".to_owned()]);

		let clean = IndexStore::build(&corpus(), &BuildOptions::default()).unwrap();
		let skipped = IndexStore::build(&polluted, &BuildOptions::default()).unwrap();
		assert_eq!(clean, skipped);
	}

	#[test]
	fn test_empty_corpus_aborts_build() {
		let result = IndexStore::build(&[], &BuildOptions::default());
		assert!(matches!(result, Err(PredictError::EmptyCorpusSample(_))));

		// Sentences exist, but none long enough for order 4
		let short: Vec<Vec<String>> = vec![tokens("it goes well")];
		let result = IndexStore::build(&short, &BuildOptions::default());
		assert!(matches!(result, Err(PredictError::EmptyCorpusSample(4))));
	}

	#[test]
	fn test_from_tables_rejects_duplicate_order() {
		let options = BuildOptions {
			orders: vec![2],
			..BuildOptions::default()
		};
		let store = IndexStore::build(&corpus(), &options).unwrap();
		let table = store.table(2).unwrap().clone();

		let result = IndexStore::from_tables(vec![table.clone(), table]);
		assert!(matches!(result, Err(PredictError::DuplicateOrder(2))));
	}

	#[test]
	fn test_save_load_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.dat");

		let store = IndexStore::build(&corpus(), &BuildOptions::default()).unwrap();
		store.save(&path).unwrap();

		let reloaded = IndexStore::load(&path).unwrap();
		assert_eq!(store, reloaded);

		// Same content serializes to the same bytes
		let again = dir.path().join("again.dat");
		reloaded.save(&again).unwrap();
		assert_eq!(
			std::fs::read(&path).unwrap(),
			std::fs::read(&again).unwrap()
		);
	}

	#[test]
	fn test_load_rejects_garbage() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.dat");
		std::fs::write(&path, b"not a store at all").unwrap();

		assert!(matches!(
			IndexStore::load(&path),
			Err(PredictError::CorruptIndex(_))
		));
	}

	#[test]
	fn test_load_rejects_version_mismatch() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.dat");

		let store = IndexStore::build(&corpus(), &BuildOptions::default()).unwrap();
		store.save(&path).unwrap();

		let mut bytes = std::fs::read(&path).unwrap();
		bytes[4] = bytes[4].wrapping_add(1);
		std::fs::write(&path, &bytes).unwrap();

		assert!(matches!(
			IndexStore::load(&path),
			Err(PredictError::CorruptIndex(_))
		));
	}

	#[test]
	fn test_load_rejects_truncated_body() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.dat");

		let store = IndexStore::build(&corpus(), &BuildOptions::default()).unwrap();
		store.save(&path).unwrap();

		let bytes = std::fs::read(&path).unwrap();
		std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

		assert!(matches!(
			IndexStore::load(&path),
			Err(PredictError::CorruptIndex(_))
		));
	}
}
