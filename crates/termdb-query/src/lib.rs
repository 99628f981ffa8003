//! termdb-query
//!
//! Fuzzy lookup over the shards written by `termdb-shard`: key derivation,
//! candidate retrieval with bounded fallback, prefiltering, heuristic scoring
//! and ranking. Caches are injected and never change results.
pub mod cache;
pub mod distance;
pub mod engine;
pub mod scorer;

pub use cache::{KvStore, KvTokenCache, MemoryShardCache, MemoryTokenCache, NoopShardCache, NoopTokenCache, ShardCache, TokenCache, TokenDistance};
pub use engine::{QueryEngine, QueryKind, QueryStats};
