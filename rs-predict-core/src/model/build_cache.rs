use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::error::{PredictError, PredictResult};
use super::index_store::{IndexStore, FORMAT_VERSION};

/// Identity of one batch build.
///
/// Two builds share a cache slot only if every field matches: the corpus
/// sample, the order set, the pruning cap and the persisted layout
/// version. `corpus_id` is supplied by the data-preparation step that
/// selected the sample; the cache never inspects corpus contents itself.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BuildManifest {
	/// Identity of the corpus sample
	pub corpus_id: String,

	/// N-gram orders indexed, ascending and deduplicated
	pub orders: Vec<usize>,

	/// Prediction words retained per lookup phrase
	pub top_k: usize,

	/// Persisted store layout version
	pub format_version: u16,
}

impl BuildManifest {
	pub fn new(corpus_id: impl Into<String>, mut orders: Vec<usize>, top_k: usize) -> Self {
		orders.sort_unstable();
		orders.dedup();
		Self {
			corpus_id: corpus_id.into(),
			orders,
			top_k,
			format_version: FORMAT_VERSION,
		}
	}

	/// File stem shared by the cached store and its manifest sidecar.
	///
	/// The corpus id is sanitized so a manifest can never escape the cache
	/// directory.
	fn stem(&self) -> String {
		let corpus_id: String = self
			.corpus_id
			.chars()
			.map(|c| {
				if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
					c
				} else {
					'-'
				}
			})
			.collect();
		let orders = self
			.orders
			.iter()
			.map(ToString::to_string)
			.collect::<Vec<_>>()
			.join("-");

		format!("{}_o{}_k{}", corpus_id, orders, self.top_k)
	}
}

/// Explicit, versioned cache of built index stores.
///
/// A cached store is reused only when its sidecar manifest equals the
/// requested one; any difference, including a layout version bump, is a
/// miss. Invalidation is an explicit operation, never an implicit
/// file-existence check.
pub struct BuildCache {
	root: PathBuf,
}

impl BuildCache {
	pub fn new<P: AsRef<Path>>(root: P) -> Self {
		Self {
			root: root.as_ref().to_path_buf(),
		}
	}

	/// Path the store for `manifest` is (or would be) cached at.
	pub fn store_path(&self, manifest: &BuildManifest) -> PathBuf {
		self.root.join(format!("{}.dat", manifest.stem()))
	}

	fn manifest_path(&self, manifest: &BuildManifest) -> PathBuf {
		self.root.join(format!("{}.manifest", manifest.stem()))
	}

	/// Returns the cached store for `manifest`, or `None` on a miss.
	///
	/// A missing sidecar or a sidecar that does not equal the requested
	/// manifest is a miss. A sidecar that matches but a store that fails
	/// validation is an error: the operator should notice and invalidate,
	/// not silently rebuild over a corrupt file.
	pub fn load(&self, manifest: &BuildManifest) -> PredictResult<Option<IndexStore>> {
		let manifest_path = self.manifest_path(manifest);
		let bytes = match fs::read(&manifest_path) {
			Ok(bytes) => bytes,
			Err(error) if error.kind() == ErrorKind::NotFound => {
				debug!("build cache miss for {}", manifest.stem());
				return Ok(None);
			}
			Err(error) => return Err(error.into()),
		};

		let cached: BuildManifest = postcard::from_bytes(&bytes)
			.map_err(|error| PredictError::CorruptIndex(error.to_string()))?;
		if cached != *manifest {
			info!(
				"build cache manifest mismatch for {}, ignoring cached store",
				manifest.stem()
			);
			return Ok(None);
		}

		let store = IndexStore::load(self.store_path(manifest))?;
		info!("build cache hit for {}", manifest.stem());
		Ok(Some(store))
	}

	/// Caches a built store together with its manifest sidecar.
	///
	/// Returns the path the store was written to.
	pub fn save(&self, manifest: &BuildManifest, store: &IndexStore) -> PredictResult<PathBuf> {
		fs::create_dir_all(&self.root)?;

		let path = self.store_path(manifest);
		store.save(&path)?;
		fs::write(self.manifest_path(manifest), postcard::to_stdvec(manifest)?)?;

		Ok(path)
	}

	/// Drops the cached store and sidecar for `manifest`, if present.
	pub fn invalidate(&self, manifest: &BuildManifest) -> PredictResult<()> {
		for path in [self.store_path(manifest), self.manifest_path(manifest)] {
			match fs::remove_file(&path) {
				Ok(()) => {}
				Err(error) if error.kind() == ErrorKind::NotFound => {}
				Err(error) => return Err(error.into()),
			}
		}
		Ok(())
	}

	/// Returns the cached store for `manifest`, building and caching it on
	/// a miss.
	pub fn load_or_build<F>(&self, manifest: &BuildManifest, build: F) -> PredictResult<IndexStore>
	where
		F: FnOnce() -> PredictResult<IndexStore>,
	{
		if let Some(store) = self.load(manifest)? {
			return Ok(store);
		}

		let store = build()?;
		self.save(manifest, &store)?;
		Ok(store)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::index_store::BuildOptions;

	fn corpus() -> Vec<Vec<String>> {
		["it goes well with cheese", "it goes on and on"]
			.iter()
			.map(|s| s.split_whitespace().map(str::to_owned).collect())
			.collect()
	}

	fn build() -> PredictResult<IndexStore> {
		IndexStore::build(&corpus(), &BuildOptions::default())
	}

	#[test]
	fn test_second_build_hits_cache() {
		let dir = tempfile::tempdir().unwrap();
		let cache = BuildCache::new(dir.path());
		let manifest = BuildManifest::new("sample", vec![2, 3, 4], 5);

		let built = cache.load_or_build(&manifest, build).unwrap();

		// A hit never invokes the build closure
		let cached = cache
			.load_or_build(&manifest, || panic!("should not rebuild"))
			.unwrap();
		assert_eq!(built, cached);
	}

	#[test]
	fn test_any_manifest_change_is_a_miss() {
		let dir = tempfile::tempdir().unwrap();
		let cache = BuildCache::new(dir.path());

		let manifest = BuildManifest::new("sample", vec![2, 3, 4], 5);
		cache.load_or_build(&manifest, build).unwrap();

		let other_k = BuildManifest::new("sample", vec![2, 3, 4], 3);
		assert!(cache.load(&other_k).unwrap().is_none());

		let other_orders = BuildManifest::new("sample", vec![2, 3], 5);
		assert!(cache.load(&other_orders).unwrap().is_none());

		let other_corpus = BuildManifest::new("sample2", vec![2, 3, 4], 5);
		assert!(cache.load(&other_corpus).unwrap().is_none());
	}

	#[test]
	fn test_version_bump_is_a_miss() {
		let dir = tempfile::tempdir().unwrap();
		let cache = BuildCache::new(dir.path());

		let mut stale = BuildManifest::new("sample", vec![2, 3, 4], 5);
		stale.format_version = FORMAT_VERSION.wrapping_add(1);
		cache.save(&stale, &build().unwrap()).unwrap();

		let manifest = BuildManifest::new("sample", vec![2, 3, 4], 5);
		assert!(cache.load(&manifest).unwrap().is_none());
	}

	#[test]
	fn test_invalidate_forces_rebuild() {
		let dir = tempfile::tempdir().unwrap();
		let cache = BuildCache::new(dir.path());
		let manifest = BuildManifest::new("sample", vec![2, 3, 4], 5);

		cache.load_or_build(&manifest, build).unwrap();
		cache.invalidate(&manifest).unwrap();
		assert!(cache.load(&manifest).unwrap().is_none());

		// Invalidating an absent entry is fine
		cache.invalidate(&manifest).unwrap();
	}
}
