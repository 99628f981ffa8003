//! Domain types shared by the index builder, the shard reader and the query engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub type NodeId = u64;
pub type DomainId = u64;
pub type CategoryId = u64;

/// A labeled record ("term") as stored in the node store.
///
/// - `id`: unique within its domain partition
/// - `title`: the short label that gets normalized, sharded and scored
/// - `kind`: optional free-form type column
/// - `domain_id`: owning partition, `None` for the global partition
/// - `category_ids`: categories used by the query-time category filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "t", alias = "title", default)]
    pub title: String,
    #[serde(rename = "y", alias = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "d", alias = "domain_id", default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<DomainId>,
    #[serde(rename = "c", alias = "category_ids", default)]
    pub category_ids: BTreeSet<CategoryId>,
}

impl Node {
    pub fn new(id: NodeId, title: impl Into<String>) -> Self {
        Self { id, title: title.into(), kind: None, domain_id: None, category_ids: BTreeSet::new() }
    }

    pub fn with_domain(mut self, domain_id: DomainId) -> Self {
        self.domain_id = Some(domain_id);
        self
    }

    pub fn with_categories(mut self, ids: impl IntoIterator<Item = CategoryId>) -> Self {
        self.category_ids.extend(ids);
        self
    }

    /// True when the node shares at least one category with `filter`, or the filter is empty.
    pub fn in_categories(&self, filter: &[CategoryId]) -> bool {
        filter.is_empty() || filter.iter().any(|c| self.category_ids.contains(c))
    }
}

/// Which family of keys a shard belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShardKind {
    Numeric,
    Text,
    Phrase,
}

impl ShardKind {
    pub const ALL: [ShardKind; 3] = [ShardKind::Numeric, ShardKind::Text, ShardKind::Phrase];

    /// Directory tag used in the on-disk layout.
    pub fn tag(self) -> &'static str {
        match self {
            ShardKind::Numeric => "N",
            ShardKind::Text => "T",
            ShardKind::Phrase => "P",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardKey {
    pub kind: ShardKind,
    pub bucket: String,
}

impl ShardKey {
    pub fn new(kind: ShardKind, bucket: impl Into<String>) -> Self {
        Self { kind, bucket: bucket.into() }
    }

    pub fn numeric(bucket: impl Into<String>) -> Self { Self::new(ShardKind::Numeric, bucket) }
    pub fn text(bucket: impl Into<String>) -> Self { Self::new(ShardKind::Text, bucket) }
    pub fn phrase(bucket: impl Into<String>) -> Self { Self::new(ShardKind::Phrase, bucket) }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.tag(), self.bucket)
    }
}

/// Pointer from a shard line into the node store. Never a copy of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardRef {
    /// Node store bucket code (`aa`..`zz`), packed as two ASCII bytes.
    #[serde(rename = "b", with = "bucket_code")]
    pub bucket: [u8; 2],
    #[serde(rename = "o")]
    pub offset: u64,
    /// Proximity tier of the two source words; phrase references only.
    #[serde(rename = "w", default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u8>,
}

mod bucket_code {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(code: &[u8; 2], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(std::str::from_utf8(code).map_err(serde::ser::Error::custom)?)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 2], D::Error> {
        let s = String::deserialize(d)?;
        match s.as_bytes() {
            [a, b] if a.is_ascii_lowercase() && b.is_ascii_lowercase() => Ok([*a, *b]),
            _ => Err(D::Error::custom(format!("invalid bucket code {s:?}"))),
        }
    }
}

/// A scored candidate, the unit that is sorted and truncated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: NodeId,
    pub score: f64,
    pub node: Node,
}

/// Result shape requested by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SearchOutput {
    Ids(Vec<NodeId>),
    Nodes(Vec<Node>),
}

impl SearchOutput {
    pub fn len(&self) -> usize {
        match self {
            SearchOutput::Ids(ids) => ids.len(),
            SearchOutput::Nodes(nodes) => nodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn ids(&self) -> Vec<NodeId> {
        match self {
            SearchOutput::Ids(ids) => ids.clone(),
            SearchOutput::Nodes(nodes) => nodes.iter().map(|n| n.id).collect(),
        }
    }
}
