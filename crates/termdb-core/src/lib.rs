//! termdb-core
//!
//! Shared types, configuration, errors, the title normalizer and the
//! phonetic encoder used by both the index builder and the query engine.

pub mod config;
pub mod error;
pub mod options;
pub mod phonetic;
pub mod source;
pub mod text;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
