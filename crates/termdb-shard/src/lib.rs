//! termdb-shard
//!
//! On-disk storage for term lookup: the hash-bucketed node store, phonetic and
//! numeric shards with their offset indexes, the offline [`IndexBuilder`] and
//! the readers the query engine uses to get back at the data.
pub mod builder;
pub mod layout;
pub mod line_reader;
pub mod node_store;
pub mod reader;
mod writer;

pub use builder::{BuildReport, IndexBuilder};
pub use layout::{KeyScheme, PartitionLayout, StorageLayout};
pub use line_reader::{open_line_reader, LineReader, MmapLineReader, SeekLineReader};
pub use node_store::{NodeResolver, NodeStoreWriter};
pub use reader::{LineStream, OffsetIndex, SequentialReader, ShardReader};
pub use writer::ShardWriter;
