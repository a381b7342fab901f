//! Pipeline tests against scripted generation and search backends.

mod cancellation;
mod retrieval;
mod support;
