//! Search provider implementations.

pub mod serpapi;

pub use serpapi::SerpApiBackend;
