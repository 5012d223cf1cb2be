//! N-gram-based next-word prediction library.
//!
//! This crate provides a modular next-word prediction system including:
//! - Sliding-window n-gram extraction over tokenized sentences
//! - Per-order frequency tables with deterministic top-K pruning
//! - A persistent, versioned index store queried at serve time
//! - Weighted backoff prediction combining all indexed orders
//!
//! Only the high-level API is exposed publicly. The per-phrase aggregation
//! state is kept internal to ensure consistency and prevent misuse.

/// Core model types: extraction, frequency tables, index store, prediction.
///
/// This module exposes the batch-build and query interfaces while keeping
/// internal aggregation structures private.
pub mod model;

/// I/O utilities (corpus loading, path helpers).
pub mod io;
