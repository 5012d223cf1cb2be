//! Offline batch build of the n-gram index store.
//!
//! Reads a pre-tokenized corpus file (one lowercased sentence per line),
//! builds the per-order frequency tables, and persists the store through
//! the explicit build cache. Serving processes only ever load the result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use log::info;

use rs_predict_core::io;
use rs_predict_core::model::build_cache::{BuildCache, BuildManifest};
use rs_predict_core::model::filters::WordList;
use rs_predict_core::model::frequency_table::DEFAULT_TOP_K;
use rs_predict_core::model::index_store::{BuildOptions, IndexStore};

#[derive(Parser, Debug)]
#[command(name = "rs-predict-builder")]
#[command(about = "Offline batch build of the n-gram index store")]
#[command(version)]
struct Args {
	/// Pre-tokenized corpus file: one lowercased sentence per line
	corpus: PathBuf,

	/// Directory receiving the built store and its manifest
	#[arg(short, long, default_value = "./data")]
	out_dir: String,

	/// N-gram orders to index
	#[arg(long, value_delimiter = ',', default_values_t = vec![2usize, 3, 4])]
	orders: Vec<usize>,

	/// Prediction words retained per lookup phrase
	#[arg(long, default_value_t = DEFAULT_TOP_K)]
	top_k: usize,

	/// Dictionary file; tokens outside it never enter the tables
	#[arg(long)]
	vocabulary: Option<PathBuf>,

	/// Rebuild even if a cached store matches
	#[arg(long)]
	force: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();
	let args = Args::parse();

	let manifest = BuildManifest::new(
		corpus_identity(&args.corpus)?,
		args.orders.clone(),
		args.top_k,
	);
	let cache = BuildCache::new(io::normalize_folder(&args.out_dir));

	if args.force {
		cache.invalidate(&manifest)?;
	}

	let store = cache.load_or_build(&manifest, || {
		let sentences = io::read_sentences(&args.corpus)?;
		info!(
			"read {} sentences from {}",
			sentences.len(),
			args.corpus.display()
		);

		let mut options = BuildOptions {
			orders: args.orders.clone(),
			top_k: args.top_k,
			vocabulary: None,
		};
		if let Some(path) = &args.vocabulary {
			let dictionary = WordList::from_file(path)?;
			info!("vocabulary gate: {} known words", dictionary.len());
			options.vocabulary = Some(Arc::new(dictionary));
		}

		IndexStore::build(&sentences, &options)
	})?;

	for order in store.orders() {
		let phrases = store.table(order).map(|table| table.len()).unwrap_or(0);
		info!("order {}: {} lookup phrases", order, phrases);
	}
	println!("store ready at {}", cache.store_path(&manifest).display());

	Ok(())
}

/// Deterministic corpus identity: file stem plus byte length.
///
/// Sample selection happens upstream; two different samples must be given
/// distinct file names to get distinct cache slots.
fn corpus_identity(path: &Path) -> std::io::Result<String> {
	let stem = io::get_filename(path)?;
	let bytes = std::fs::metadata(path)?.len();
	Ok(format!("{stem}-{bytes}"))
}
