//! Search backend integration for FRAG.
//!
//! Backends implement `SearchBackend::search(query, k)`; the retriever in
//! `frag-pipeline` fans out over several of them and merges the results.

pub mod client;
pub mod factory;
pub mod providers;

pub use client::{SearchBackend, SearchHit};
pub use factory::create_backend;
pub use providers::SerpApiBackend;
