//! In-memory query backend for lazyrow views.
//!
//! `MemoryBackend` implements `QueryPort` over a `Vec` of records using the
//! `Filter` language defined here. It backs tests and small data files.

mod backend;
pub mod filter;

pub use backend::MemoryBackend;
pub use filter::{Filter, compare_values, like_regex, sort_order};
