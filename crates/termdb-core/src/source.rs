//! Record sources: an in-memory vector and a directory of JSON-lines files.
use anyhow::Result;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use crate::traits::{Batches, RecordSource};
use crate::types::{DomainId, Node};

fn in_domain(node: &Node, domain: Option<DomainId>) -> bool {
    domain.map_or(true, |d| node.domain_id == Some(d))
}

/// Source over nodes already held in memory; mostly useful for tests and tooling.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    nodes: Vec<Node>,
}

impl MemorySource {
    pub fn new(nodes: Vec<Node>) -> Self { Self { nodes } }
}

impl RecordSource for MemorySource {
    fn batches(&self, domain: Option<DomainId>, batch_size: usize) -> Result<Batches<'_>> {
        let batch_size = batch_size.max(1);
        let mut filtered = self.nodes.iter().filter(move |n| in_domain(n, domain)).cloned();
        Ok(Box::new(std::iter::from_fn(move || {
            let batch: Vec<Node> = filtered.by_ref().take(batch_size).collect();
            if batch.is_empty() { None } else { Some(Ok(batch)) }
        })))
    }
}

/// Streams nodes from every `*.jsonl` file under a directory, one node per line.
///
/// Files are visited in sorted path order. Lines that fail to parse are
/// skipped with a warning; I/O errors end the stream with an error.
pub struct JsonlSource {
    root: PathBuf,
}

impl JsonlSource {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    fn list_jsonl_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path(); if path.extension().and_then(|s| s.to_str()) == Some("jsonl") { files.push(path.to_path_buf()); }
        }
        files.sort(); files
    }
}

impl RecordSource for JsonlSource {
    fn batches(&self, domain: Option<DomainId>, batch_size: usize) -> Result<Batches<'_>> {
        if !self.root.exists() {
            anyhow::bail!("record source directory {} does not exist", self.root.display());
        }
        let files = self.list_jsonl_files();
        tracing::debug!(root = %self.root.display(), files = files.len(), "streaming jsonl records");
        Ok(Box::new(JsonlBatches { files: files.into_iter(), current: None, domain, batch_size: batch_size.max(1) }))
    }
}

struct OpenFile {
    path: PathBuf,
    line_no: usize,
    lines: Lines<BufReader<File>>,
}

struct JsonlBatches {
    files: std::vec::IntoIter<PathBuf>,
    current: Option<OpenFile>,
    domain: Option<DomainId>,
    batch_size: usize,
}

impl JsonlBatches {
    fn open(path: &Path) -> Result<OpenFile> {
        let file = File::open(path).map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path.display(), e))?;
        Ok(OpenFile { path: path.to_path_buf(), line_no: 0, lines: BufReader::new(file).lines() })
    }

    fn next_node(&mut self) -> Option<Result<Node>> {
        loop {
            if self.current.is_none() {
                let path = self.files.next()?;
                match Self::open(&path) { Ok(f) => self.current = Some(f), Err(e) => return Some(Err(e)) }
            }
            let file = self.current.as_mut()?;
            match file.lines.next() {
                None => { self.current = None; }
                Some(Err(e)) => return Some(Err(anyhow::anyhow!("Failed to read {}: {}", file.path.display(), e))),
                Some(Ok(line)) => {
                    file.line_no += 1;
                    if line.trim().is_empty() { continue; }
                    match serde_json::from_str::<Node>(&line) {
                        Ok(node) if in_domain(&node, self.domain) => return Some(Ok(node)),
                        Ok(_) => {}
                        Err(e) => tracing::warn!(file = %file.path.display(), line = file.line_no, error = %e, "skipping malformed record"),
                    }
                }
            }
        }
    }
}

impl Iterator for JsonlBatches {
    type Item = Result<Vec<Node>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.next_node() {
                Some(Ok(node)) => batch.push(node),
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }
        if batch.is_empty() { None } else { Some(Ok(batch)) }
    }
}
