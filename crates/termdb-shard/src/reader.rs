//! Reading shards back: sequential streams and offset-indexed random access.
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::de::DeserializeOwned;

use termdb_core::error::{Error, Result};
use termdb_core::types::{Node, ShardKey, ShardKind, ShardRef};

use crate::layout::{all_bucket_codes, PartitionLayout};
use crate::line_reader::{open_file, open_line_reader};

/// Lazily decodes one JSON value per line.
///
/// Malformed lines are skipped; a trailing line without a terminator (a write
/// still in flight) ends the stream. Memory use is one line at a time.
pub struct LineStream<T> {
    path: PathBuf,
    reader: BufReader<File>,
    offset: u64,
    buf: Vec<u8>,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> LineStream<T> {
    /// Opens `path` from its first byte. Calling it again restarts the sequence.
    pub fn open(path: &Path) -> Result<Self> {
        let file = open_file(path)?;
        Ok(Self { path: path.to_path_buf(), reader: BufReader::new(file), offset: 0, buf: Vec::new(), _marker: PhantomData })
    }
}

impl<T: DeserializeOwned> Iterator for LineStream<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            self.buf.clear();
            let n = match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), offset = self.offset, error = %e, "read failed, ending stream");
                    return None;
                }
            };
            let start = self.offset;
            self.offset += n as u64;
            if self.buf.last() != Some(&b'\n') {
                tracing::debug!(path = %self.path.display(), offset = start, "skipping unterminated trailing line");
                return None;
            }
            match serde_json::from_slice(&self.buf[..n - 1]) {
                Ok(value) => return Some(value),
                Err(source) => {
                    let err = Error::Decode { path: self.path.clone(), offset: start, source };
                    tracing::debug!(error = %err, "skipping line");
                }
            }
        }
    }
}

/// A JSON-lines file read front to back.
#[derive(Debug, Clone)]
pub struct SequentialReader {
    path: PathBuf,
}

impl SequentialReader {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    pub fn path(&self) -> &Path { &self.path }

    pub fn stream<T: DeserializeOwned>(&self) -> Result<LineStream<T>> {
        LineStream::open(&self.path)
    }
}

const OFFSET_WIDTH: u64 = 8;

/// Companion index of a shard file: one little-endian `u64` per line.
pub struct OffsetIndex {
    path: PathBuf,
    file: File,
    count: u64,
}

impl OffsetIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let file = open_file(path)?;
        // a partially written trailing entry is ignored
        let count = file.metadata()?.len() / OFFSET_WIDTH;
        Ok(Self { path: path.to_path_buf(), file, count })
    }

    pub fn len(&self) -> u64 { self.count }

    pub fn is_empty(&self) -> bool { self.count == 0 }

    /// Offsets to read, shuffled. When `cap` is below the entry count a
    /// uniform sample of `cap` entries is drawn, reading only those entries.
    pub fn offsets<R: Rng + ?Sized>(&self, cap: Option<usize>, rng: &mut R) -> Result<Vec<u64>> {
        let count = usize::try_from(self.count).unwrap_or(usize::MAX);
        let mut offsets = match cap {
            Some(cap) if count > cap => {
                let mut positions = rand::seq::index::sample(rng, count, cap).into_vec();
                positions.sort_unstable();
                let mut file = &self.file;
                let mut entry = [0u8; OFFSET_WIDTH as usize];
                let mut out = Vec::with_capacity(cap);
                for pos in positions {
                    file.seek(SeekFrom::Start(pos as u64 * OFFSET_WIDTH))?;
                    file.read_exact(&mut entry)?;
                    out.push(u64::from_le_bytes(entry));
                }
                out
            }
            _ => self.read_all(count)?,
        };
        offsets.shuffle(rng);
        Ok(offsets)
    }

    fn read_all(&self, count: usize) -> Result<Vec<u64>> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(file);
        let mut entry = [0u8; OFFSET_WIDTH as usize];
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            reader.read_exact(&mut entry).map_err(|e| {
                tracing::debug!(path = %self.path.display(), error = %e, "offset index shorter than expected");
                e
            })?;
            out.push(u64::from_le_bytes(entry));
        }
        Ok(out)
    }
}

/// Read side of one partition.
#[derive(Debug, Clone)]
pub struct ShardReader {
    layout: PartitionLayout,
    prefer_mmap: bool,
}

impl ShardReader {
    pub fn new(layout: PartitionLayout, prefer_mmap: bool) -> Self {
        Self { layout, prefer_mmap }
    }

    pub fn layout(&self) -> &PartitionLayout { &self.layout }

    pub fn prefers_mmap(&self) -> bool { self.prefer_mmap }

    /// Random-access read of a shard's references, sampled down to `cap`.
    ///
    /// Errors with [`Error::MissingShard`] when the shard or its offset index
    /// is absent; malformed lines are skipped.
    pub fn read_refs<R: Rng + ?Sized>(&self, key: &ShardKey, cap: Option<usize>, rng: &mut R) -> Result<Vec<ShardRef>> {
        let index = OffsetIndex::open(&self.layout.offset_file(key))?;
        let offsets = index.offsets(cap, rng)?;
        let data = open_line_reader(&self.layout.shard_file(key), self.prefer_mmap)?;
        let mut refs = Vec::with_capacity(offsets.len());
        for offset in offsets {
            match data.read_line_at(offset)? {
                Some(line) => match serde_json::from_slice::<ShardRef>(&line) {
                    Ok(r) => refs.push(r),
                    Err(source) => {
                        let err = Error::Decode { path: data.path().to_path_buf(), offset, source };
                        tracing::debug!(error = %err, "skipping reference");
                    }
                },
                None => tracing::debug!(path = %data.path().display(), offset, "offset points past readable data"),
            }
        }
        Ok(refs)
    }

    /// Sequential read of a whole shard file.
    pub fn stream_refs(&self, key: &ShardKey) -> Result<LineStream<ShardRef>> {
        SequentialReader::new(self.layout.shard_file(key)).stream()
    }

    /// Number of references in a shard according to its offset index.
    pub fn shard_len(&self, key: &ShardKey) -> Result<u64> {
        Ok(OffsetIndex::open(&self.layout.offset_file(key))?.len())
    }

    /// Every bucket that has a shard file for `kind`, sorted.
    pub fn list_buckets(&self, kind: ShardKind) -> Vec<String> {
        let mut buckets: Vec<String> = walkdir::WalkDir::new(self.layout.kind_dir(kind))
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.path().extension().and_then(|s| s.to_str()) == Some("jsonl"))
            .filter_map(|e| e.path().file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        buckets.sort();
        buckets.dedup();
        buckets
    }

    /// Streams every node in the partition, bucket by bucket. Missing buckets are skipped.
    pub fn scan_nodes(&self) -> impl Iterator<Item = Node> + '_ {
        all_bucket_codes().flat_map(move |code| SequentialReader::new(self.layout.node_file(&code)).stream::<Node>().ok().into_iter().flatten())
    }
}
