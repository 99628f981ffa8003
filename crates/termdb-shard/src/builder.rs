//! Offline index build: record source → node store + Numeric/Text/Phrase shards.
//!
//! A build writes a complete partition into a staging directory, renames it
//! to a fresh version directory and atomically swaps the partition pointer.
//! A query pins the version it started on, so it never mixes two builds.
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use termdb_core::config::EngineConfig;
use termdb_core::error::{Error, Result};
use termdb_core::text::{content_words, tokenize};
use termdb_core::traits::{RecordSource, TermIndexer};
use termdb_core::types::{DomainId, Node, NodeId, ShardKey, ShardKind, ShardRef};

use crate::layout::{KeyScheme, PartitionLayout, StorageLayout};
use crate::node_store::NodeStoreWriter;
use crate::writer::ShardWriter;

/// Counters collected while building one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub records_seen: u64,
    pub nodes_written: u64,
    /// Records without usable title tokens plus duplicate ids.
    pub records_skipped: u64,
    pub numeric_refs: u64,
    pub text_refs: u64,
    pub phrase_refs: u64,
    pub shard_files: usize,
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn references(&self, kind: ShardKind) -> u64 {
        match kind {
            ShardKind::Numeric => self.numeric_refs,
            ShardKind::Text => self.text_refs,
            ShardKind::Phrase => self.phrase_refs,
        }
    }
}

/// Proximity tier of two words `distance` positions apart.
pub fn phrase_weight(distance: usize) -> u8 {
    match distance {
        0 | 1 => 3,
        2 | 3 => 2,
        _ => 1,
    }
}

type Progress = Box<dyn Fn(&BuildReport) + Send + Sync>;

pub struct IndexBuilder<S> {
    source: S,
    config: EngineConfig,
    storage: StorageLayout,
    scheme: KeyScheme,
    progress: Option<Progress>,
}

impl<S: RecordSource> IndexBuilder<S> {
    pub fn new(source: S, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let storage = StorageLayout::from_config(&config);
        let scheme = KeyScheme::from_config(&config);
        Ok(Self { source, config, storage, scheme, progress: None })
    }

    /// Called after every batch with the running counters.
    pub fn on_batch(mut self, progress: impl Fn(&BuildReport) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn storage(&self) -> &StorageLayout { &self.storage }

    pub fn build_with_report(&self, domain: Option<DomainId>) -> Result<(BTreeSet<ShardKey>, BuildReport)> {
        let started = Instant::now();
        let root = self.storage.root();
        fs::create_dir_all(root).map_err(|e| Error::build(root, e))?;

        let staging = self.storage.staging_dir(domain);
        fs::create_dir_all(&staging).map_err(|e| Error::build(&staging, e))?;

        let mut report = BuildReport::default();
        let written = self
            .write_partition(&staging, domain, &mut report)
            .and_then(|keys| self.publish(&staging, domain).map(|_| keys));
        let keys = match written {
            Ok(keys) => keys,
            Err(e) => {
                discard(&staging);
                return Err(e);
            }
        };

        report.shard_files = keys.len();
        report.elapsed = started.elapsed();
        tracing::info!(
            partition = %self.storage.partition_name(domain),
            records = report.records_seen,
            nodes = report.nodes_written,
            skipped = report.records_skipped,
            numeric_refs = report.numeric_refs,
            text_refs = report.text_refs,
            phrase_refs = report.phrase_refs,
            shards = report.shard_files,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "partition published"
        );
        Ok((keys, report))
    }

    fn write_partition(&self, staging: &Path, domain: Option<DomainId>, report: &mut BuildReport) -> Result<BTreeSet<ShardKey>> {
        let partition = PartitionLayout::new(staging);
        let handles = (self.config.max_open_files / 2).max(1);
        let mut nodes = NodeStoreWriter::new(partition.clone(), handles);
        let mut shards = ShardWriter::new(partition, handles);
        let mut seen: HashSet<NodeId> = HashSet::new();

        let filter = self.storage.effective_domain(domain);
        for batch in self.source.batches(filter, self.config.batch_size)? {
            for node in batch? {
                report.records_seen += 1;
                if !self.index_node(&node, &mut seen, &mut nodes, &mut shards)? {
                    report.records_skipped += 1;
                }
            }
            report.nodes_written = nodes.nodes_written();
            report.numeric_refs = shards.references_written(ShardKind::Numeric);
            report.text_refs = shards.references_written(ShardKind::Text);
            report.phrase_refs = shards.references_written(ShardKind::Phrase);
            if let Some(progress) = &self.progress {
                progress(report);
            }
        }

        report.nodes_written = nodes.finish()?;
        shards.finish()
    }

    /// Writes one node and its references. `false` when the record was skipped.
    fn index_node(&self, node: &Node, seen: &mut HashSet<NodeId>, nodes: &mut NodeStoreWriter, shards: &mut ShardWriter) -> Result<bool> {
        let words = tokenize(&node.title);
        if words.is_empty() {
            tracing::debug!(id = node.id, "skipping record without title tokens");
            return Ok(false);
        }
        if !seen.insert(node.id) {
            tracing::debug!(id = node.id, "skipping duplicate node id");
            return Ok(false);
        }

        let node_ref = nodes.append(node)?;

        let mut keys: HashSet<ShardKey> = HashSet::new();
        for word in &words {
            if let Some(key) = self.scheme.word_key(word) {
                if keys.insert(key.clone()) {
                    shards.append(&key, &node_ref)?;
                }
            }
        }

        for (key, weight) in self.phrase_keys(&words) {
            shards.append(&key, &ShardRef { weight: Some(weight), ..node_ref })?;
        }
        Ok(true)
    }

    /// One phrase key per bucket, keeping the strongest tier among the pairs that map to it.
    fn phrase_keys(&self, words: &[String]) -> BTreeMap<ShardKey, u8> {
        let content = content_words(words);
        let mut pairs: HashSet<(&str, &str)> = HashSet::new();
        let mut keys: BTreeMap<ShardKey, u8> = BTreeMap::new();
        for i in 0..content.len() {
            for j in i + 1..content.len() {
                let pair = if content[i] <= content[j] { (content[i], content[j]) } else { (content[j], content[i]) };
                if !pairs.insert(pair) {
                    continue;
                }
                let Some(key) = self.scheme.phrase_key(&[pair.0, pair.1]) else { continue };
                let weight = phrase_weight(j - i);
                let entry = keys.entry(key).or_insert(weight);
                *entry = (*entry).max(weight);
            }
        }
        keys
    }

    /// Moves staging to a new version directory and swaps the pointer to it.
    /// The version that was current stays on disk for queries still reading
    /// it; anything older is deleted.
    fn publish(&self, staging: &Path, domain: Option<DomainId>) -> Result<()> {
        let root = self.storage.root();
        let previous = self.storage.current_version(domain);
        let version = self.storage.new_version(domain);
        let target = root.join(&version);
        fs::rename(staging, &target).map_err(|e| Error::build(&target, e))?;

        let pointer = self.storage.pointer_file(domain);
        let scratch = self.storage.pointer_scratch(domain);
        let swapped = fs::write(&scratch, &version).and_then(|_| fs::rename(&scratch, &pointer));
        if let Err(e) = swapped {
            discard(&scratch);
            discard(&target);
            return Err(Error::build(&pointer, e));
        }
        tracing::debug!(version = %version, previous = ?previous, "partition pointer swapped");

        for stale in self.storage.versions(domain) {
            if stale == version || previous.as_deref() == Some(stale.as_str()) {
                continue;
            }
            discard(&root.join(&stale));
        }
        Ok(())
    }
}

fn discard(path: &Path) {
    let removed = if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        return;
    };
    if let Err(e) = removed {
        tracing::warn!(path = %path.display(), error = %e, "could not remove build artifact");
    }
}

impl<S: RecordSource> TermIndexer for IndexBuilder<S> {
    fn build(&self, domain: Option<DomainId>) -> Result<BTreeSet<ShardKey>> {
        self.build_with_report(domain).map(|(keys, _)| keys)
    }
}
