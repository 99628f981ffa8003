use std::collections::BTreeSet;

use crate::options::SearchOptions;
use crate::types::{DomainId, Node, SearchOutput, ShardKey};

pub type Batches<'a> = Box<dyn Iterator<Item = anyhow::Result<Vec<Node>>> + 'a>;

/// Streaming provider of term rows. Implementations must not load the whole
/// corpus at once; each yielded batch holds at most `batch_size` nodes.
pub trait RecordSource: Send + Sync {
    fn batches(&self, domain: Option<DomainId>, batch_size: usize) -> anyhow::Result<Batches<'_>>;
}

pub trait TermIndexer: Send + Sync {
    /// Rebuilds the partition and returns the shard keys it wrote.
    fn build(&self, domain: Option<DomainId>) -> crate::error::Result<BTreeSet<ShardKey>>;
}

pub trait TermSearch: Send + Sync {
    fn search(&self, query: &str, domain: Option<DomainId>, options: &SearchOptions) -> crate::error::Result<SearchOutput>;
    fn autocomplete(&self, query: &str, domain: Option<DomainId>, options: &SearchOptions) -> crate::error::Result<SearchOutput>;
}
