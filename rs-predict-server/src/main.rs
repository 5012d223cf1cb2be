use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use actix_cors::Cors;
use actix_web::{get, put, web, App, HttpResponse, HttpServer, Responder};

use log::warn;
use serde::Deserialize;

use rs_predict_core::io::list_files;
use rs_predict_core::model::filters::{PermitAll, ProfanityFilter, WordList};
use rs_predict_core::model::index_store::IndexStore;
use rs_predict_core::model::predictor::{BackoffPredictor, BackoffWeights};

/// Struct representing query parameters for the `/v1/predict` endpoint
#[derive(Deserialize)]
struct PredictParams {
	phrase: String,
	top_k: Option<usize>,
}

#[derive(Deserialize)]
struct StoreQuery {
	name: Option<String>,
}

struct SharedData {
	predictor: Option<Arc<BackoffPredictor>>,
	store_name: Option<String>,
	profanity: Arc<dyn ProfanityFilter + Send + Sync>,
}

/// HTTP GET endpoint `/v1/predict`
///
/// Predicts the most probable next words for a typed phrase against the
/// loaded store. Returns a JSON array of `{word, score}` candidates; an
/// empty array means "no suggestion" and is a normal outcome.
#[get("/v1/predict")]
async fn get_prediction(
	data: web::Data<RwLock<SharedData>>,
	query: web::Query<PredictParams>,
) -> impl Responder {
	let top_k = query.top_k.unwrap_or(3);
	let tokens: Vec<String> = query
		.phrase
		.split_whitespace()
		.map(str::to_owned)
		.collect();

	// Clone the predictor handle out of the lock: predict itself is
	// lock-free against the immutable store
	let predictor = {
		let shared_data = match data.read() {
			Ok(guard) => guard,
			Err(_) => return HttpResponse::InternalServerError().body("State lock failed"),
		};
		match &shared_data.predictor {
			Some(predictor) => predictor.clone(),
			None => return HttpResponse::ServiceUnavailable().body("No store loaded"),
		}
	};

	HttpResponse::Ok().json(predictor.predict(&tokens, top_k))
}

#[get("/v1/stores")]
async fn get_stores() -> impl Responder {
	match list_files(data_dir(), "dat") {
		Ok(files) => HttpResponse::Ok().body(files.join("\n").replace(".dat", "")),
		Err(_) => HttpResponse::InternalServerError().body("Failed to list stores"),
	}
}

#[get("/v1/loaded_store")]
async fn get_loaded_store(data: web::Data<RwLock<SharedData>>) -> impl Responder {
	let shared_data = match data.read() {
		Ok(guard) => guard,
		Err(_) => return HttpResponse::InternalServerError().body("State lock failed"),
	};
	HttpResponse::Ok().body(shared_data.store_name.clone().unwrap_or_default())
}

/// HTTP PUT endpoint `/v1/load_store`
///
/// Loads a store from the data directory and publishes it for lookups.
/// The store is fully validated before the swap: a corrupt file never
/// serves, and the previously loaded store stays in place on failure.
#[put("/v1/load_store")]
async fn put_store(
	data: web::Data<RwLock<SharedData>>,
	query: web::Query<StoreQuery>,
) -> impl Responder {
	let name = match &query.name {
		Some(name) if !name.trim().is_empty() => name.trim().to_owned(),
		_ => return HttpResponse::BadRequest().body("Missing or empty store name"),
	};

	let path = data_dir().join(format!("{name}.dat"));
	let store = match IndexStore::load(&path) {
		Ok(store) => Arc::new(store),
		Err(error) => {
			return HttpResponse::InternalServerError()
				.body(format!("Failed to load store: {error}"))
		}
	};

	let mut shared_data = match data.write() {
		Ok(guard) => guard,
		Err(_) => return HttpResponse::InternalServerError().body("State lock failed"),
	};

	let predictor = match BackoffPredictor::new(
		store,
		BackoffWeights::default(),
		shared_data.profanity.clone(),
	) {
		Ok(predictor) => predictor,
		Err(error) => {
			return HttpResponse::InternalServerError()
				.body(format!("Failed to prepare predictor: {error}"))
		}
	};

	shared_data.predictor = Some(Arc::new(predictor));
	shared_data.store_name = Some(name);
	HttpResponse::Ok().body("Store loaded successfully")
}

/// Directory holding `.dat` stores and the optional `profanity.txt`.
fn data_dir() -> PathBuf {
	std::env::var("RS_PREDICT_DATA")
		.map(PathBuf::from)
		.unwrap_or_else(|_| PathBuf::from("./data"))
}

fn bind_address() -> String {
	std::env::var("RS_PREDICT_BIND").unwrap_or_else(|_| "127.0.0.1:5000".to_owned())
}

/// Main entry point for the server.
///
/// Reads the optional profanity list, wraps the shared state in a
/// `RwLock` (reads dominate; the store only changes on `/v1/load_store`),
/// and starts an Actix-web HTTP server.
///
/// # Notes
/// - The bind address and data directory come from `RS_PREDICT_BIND` and
///   `RS_PREDICT_DATA`, with local defaults.
/// - No store is loaded at startup; PUT `/v1/load_store` publishes one.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
	env_logger::init();

	let profanity_path = data_dir().join("profanity.txt");
	let profanity: Arc<dyn ProfanityFilter + Send + Sync> = if profanity_path.exists() {
		match WordList::from_file(&profanity_path) {
			Ok(list) => Arc::new(list),
			Err(error) => {
				warn!(
					"failed to read {}: {error}; profanity filtering disabled",
					profanity_path.display()
				);
				Arc::new(PermitAll)
			}
		}
	} else {
		Arc::new(PermitAll)
	};

	let shared_data = web::Data::new(RwLock::new(SharedData {
		predictor: None,
		store_name: None,
		profanity,
	}));

	HttpServer::new(move || {
		App::new()
			.wrap(Cors::permissive())
			.app_data(shared_data.clone())
			.service(get_prediction)
			.service(get_stores)
			.service(get_loaded_store)
			.service(put_store)
	})
	.bind(bind_address())?
	.run()
	.await
}
