use std::sync::Arc;

use rs_predict_core::model::filters::WordList;
use rs_predict_core::model::index_store::{BuildOptions, IndexStore};
use rs_predict_core::model::predictor::{BackoffPredictor, BackoffWeights};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A tiny already-tokenized corpus: one sentence per entry, lowercased,
    // punctuation stripped by the upstream pipeline. Real builds read a
    // corpus file instead (see rs-predict-builder).
    let corpus = [
        "it goes well with cheese",
        "it goes well with bread",
        "it goes on and on",
        "it goes without saying",
        "it was a long day",
        "the day goes by so fast",
        "so it goes",
    ];
    let sentences: Vec<Vec<String>> = corpus
        .iter()
        .map(|sentence| sentence.split_whitespace().map(str::to_owned).collect())
        .collect();

    // Build the frequency tables for orders 2..=4, keeping the 5 best
    // candidates per lookup phrase (the defaults)
    let store = IndexStore::build(&sentences, &BuildOptions::default())?;

    // Persist the store and reload it, as a serving process would.
    // The serving side never builds; it only loads
    let dir = std::env::temp_dir().join("rs-predict-exemple");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("demo.dat");
    store.save(&path)?;
    let store = Arc::new(IndexStore::load(&path)?);

    // The profanity list is a collaborator concern; a word list stands in
    let profanity = Arc::new(WordList::from_words(["heck"]));

    // Default weights favour longer context: 0.2 / 0.3 / 0.5 for 2 / 3 / 4
    let predictor = BackoffPredictor::new(store, BackoffWeights::default(), profanity)?;

    let queries = [
        vec!["it".to_owned(), "goes".to_owned()],
        vec!["the".to_owned(), "day".to_owned(), "goes".to_owned()],
        vec!["it".to_owned()],
        vec!["unseen".to_owned(), "words".to_owned()],
    ];

    for phrase in &queries {
        // An empty result means "no suggestion", a normal outcome
        let predictions = predictor.predict(phrase, 3);
        if predictions.is_empty() {
            println!("{} -> no suggestion", phrase.join(" "));
        } else {
            for prediction in &predictions {
                println!(
                    "{} -> {} (score {:.4})",
                    phrase.join(" "),
                    prediction.word,
                    prediction.score
                );
            }
        }
    }

    Ok(())
}
