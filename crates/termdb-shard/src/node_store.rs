//! Hash-bucketed, append-only storage of full node payloads.
//!
//! A node lives in exactly one of 676 bucket files chosen by a stable hash of
//! its title and is addressed by `(bucket, byte offset)`.
use std::collections::HashMap;

use termdb_core::error::Result;
use termdb_core::types::{Node, ShardRef};

use crate::layout::{node_bucket, PartitionLayout};
use crate::line_reader::{open_line_reader, LineReader};
use crate::writer::{encode_line, AppendPool};

pub struct NodeStoreWriter {
    layout: PartitionLayout,
    pool: AppendPool,
    written: u64,
}

impl NodeStoreWriter {
    pub fn new(layout: PartitionLayout, max_open_files: usize) -> Self {
        Self { layout, pool: AppendPool::new(max_open_files), written: 0 }
    }

    /// Appends the node and returns a reference to it (without a weight).
    pub fn append(&mut self, node: &Node) -> Result<ShardRef> {
        let bucket = node_bucket(&node.title);
        let path = self.layout.node_file(&bucket);
        let line = encode_line(node, &path)?;
        let offset = self.pool.append(&path, &line)?;
        self.written += 1;
        Ok(ShardRef { bucket, offset, weight: None })
    }

    pub fn nodes_written(&self) -> u64 { self.written }

    pub fn finish(mut self) -> Result<u64> {
        self.pool.flush_all(true)?;
        Ok(self.written)
    }
}

/// Resolves shard references to nodes, keeping one reader per bucket file
/// for its own lifetime (typically one query).
pub struct NodeResolver {
    layout: PartitionLayout,
    prefer_mmap: bool,
    readers: HashMap<[u8; 2], Option<Box<dyn LineReader>>>,
}

impl NodeResolver {
    pub fn new(layout: PartitionLayout, prefer_mmap: bool) -> Self {
        Self { layout, prefer_mmap, readers: HashMap::new() }
    }

    /// `None` when the bucket is missing or the line is unreadable or malformed.
    pub fn resolve(&mut self, reference: &ShardRef) -> Option<Node> {
        let layout = &self.layout;
        let prefer_mmap = self.prefer_mmap;
        let reader = self
            .readers
            .entry(reference.bucket)
            .or_insert_with(|| {
                let path = layout.node_file(&reference.bucket);
                match open_line_reader(&path, prefer_mmap) {
                    Ok(reader) => Some(reader),
                    Err(e) => {
                        tracing::debug!(path = %path.display(), error = %e, "node bucket unavailable");
                        None
                    }
                }
            })
            .as_ref()?;
        let line = match reader.read_line_at(reference.offset) {
            Ok(Some(line)) => line,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(path = %reader.path().display(), offset = reference.offset, error = %e, "node read failed");
                return None;
            }
        };
        match serde_json::from_slice(&line) {
            Ok(node) => Some(node),
            Err(e) => {
                tracing::debug!(path = %reader.path().display(), offset = reference.offset, error = %e, "skipping malformed node");
                None
            }
        }
    }
}
