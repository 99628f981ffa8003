//! Append-only writers for shard files and their offset indexes.
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use termdb_core::error::{Error, Result};
use termdb_core::types::{ShardKey, ShardKind, ShardRef};

use crate::layout::PartitionLayout;

struct AppendHandle {
    writer: BufWriter<File>,
    len: u64,
}

/// Pool of append handles with an upper bound on open files. When the bound
/// is reached every handle is flushed and closed; files are reopened in
/// append mode on their next write.
pub(crate) struct AppendPool {
    open: HashMap<PathBuf, AppendHandle>,
    max_open: usize,
}

impl AppendPool {
    pub(crate) fn new(max_open: usize) -> Self {
        Self { open: HashMap::new(), max_open: max_open.max(1) }
    }

    /// Appends `bytes` to `path` and returns the offset they were written at.
    pub(crate) fn append(&mut self, path: &Path, bytes: &[u8]) -> Result<u64> {
        if !self.open.contains_key(path) {
            if self.open.len() >= self.max_open {
                self.flush_all(false)?;
            }
            let handle = Self::open_handle(path)?;
            self.open.insert(path.to_path_buf(), handle);
        }
        let handle = self.open.get_mut(path).ok_or_else(|| Error::MissingShard(path.to_path_buf()))?;
        let offset = handle.len;
        handle.writer.write_all(bytes).map_err(|e| Error::build(path, e))?;
        handle.len += bytes.len() as u64;
        Ok(offset)
    }

    fn open_handle(path: &Path) -> Result<AppendHandle> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::build(parent, e))?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path).map_err(|e| Error::build(path, e))?;
        let len = file.metadata().map_err(|e| Error::build(path, e))?.len();
        Ok(AppendHandle { writer: BufWriter::new(file), len })
    }

    /// Flushes and closes every open handle; `sync` also forces the data to disk.
    pub(crate) fn flush_all(&mut self, sync: bool) -> Result<()> {
        for (path, mut handle) in self.open.drain() {
            handle.writer.flush().map_err(|e| Error::build(&path, e))?;
            if sync {
                handle.writer.get_ref().sync_data().map_err(|e| Error::build(&path, e))?;
            }
        }
        Ok(())
    }
}

pub(crate) fn encode_line<T: serde::Serialize>(value: &T, path: &Path) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(value).map_err(|e| Error::build(path, std::io::Error::other(e)))?;
    line.push(b'\n');
    Ok(line)
}

/// Appends shard references and mirrors every line offset into the shard's
/// offset index (little-endian `u64` per line).
pub struct ShardWriter {
    layout: PartitionLayout,
    pool: AppendPool,
    touched: BTreeSet<ShardKey>,
    written: [u64; 3],
}

impl ShardWriter {
    pub fn new(layout: PartitionLayout, max_open_files: usize) -> Self {
        Self { layout, pool: AppendPool::new(max_open_files), touched: BTreeSet::new(), written: [0; 3] }
    }

    pub fn append(&mut self, key: &ShardKey, reference: &ShardRef) -> Result<()> {
        let data_path = self.layout.shard_file(key);
        let line = encode_line(reference, &data_path)?;
        let offset = self.pool.append(&data_path, &line)?;
        self.pool.append(&self.layout.offset_file(key), &offset.to_le_bytes())?;
        if !self.touched.contains(key) {
            self.touched.insert(key.clone());
        }
        self.written[key.kind as usize] += 1;
        Ok(())
    }

    pub fn references_written(&self, kind: ShardKind) -> u64 {
        self.written[kind as usize]
    }

    /// Flushes and returns the set of shard keys that received references.
    pub fn finish(mut self) -> Result<BTreeSet<ShardKey>> {
        self.pool.flush_all(true)?;
        Ok(self.touched)
    }
}
