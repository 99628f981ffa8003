//! Random access to newline-terminated records by byte offset.
//!
//! Two implementations sit behind [`LineReader`]: a memory-mapped one and a
//! seek+read one. [`open_line_reader`] prefers the map and falls back to
//! seeking when mapping fails; callers cannot tell them apart.
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use parking_lot::Mutex;

use termdb_core::error::{Error, Result};

pub trait LineReader: Send + Sync {
    /// Bytes of the line starting at `offset`, without its terminator.
    ///
    /// Returns `None` past the end of the file and for a trailing line that
    /// has no terminator yet (a write still in flight).
    fn read_line_at(&self, offset: u64) -> io::Result<Option<Vec<u8>>>;

    fn path(&self) -> &Path;
}

pub struct MmapLineReader {
    path: PathBuf,
    mmap: Mmap,
}

impl MmapLineReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::from_file(path, &file)
    }

    fn from_file(path: &Path, file: &File) -> io::Result<Self> {
        // SAFETY: published partitions are never written to; builds go to a staging directory.
        let mmap = unsafe { Mmap::map(file)? };
        Ok(Self { path: path.to_path_buf(), mmap })
    }
}

impl LineReader for MmapLineReader {
    fn read_line_at(&self, offset: u64) -> io::Result<Option<Vec<u8>>> {
        let bytes: &[u8] = &self.mmap;
        let Ok(start) = usize::try_from(offset) else { return Ok(None) };
        if start >= bytes.len() {
            return Ok(None);
        }
        Ok(bytes[start..].iter().position(|b| *b == b'\n').map(|end| bytes[start..start + end].to_vec()))
    }

    fn path(&self) -> &Path { &self.path }
}

pub struct SeekLineReader {
    path: PathBuf,
    reader: Mutex<BufReader<File>>,
}

impl SeekLineReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::from_file(path, File::open(path)?))
    }

    fn from_file(path: &Path, file: File) -> Self {
        Self { path: path.to_path_buf(), reader: Mutex::new(BufReader::new(file)) }
    }
}

impl LineReader for SeekLineReader {
    fn read_line_at(&self, offset: u64) -> io::Result<Option<Vec<u8>>> {
        let mut reader = self.reader.lock();
        reader.seek(SeekFrom::Start(offset))?;
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line)?;
        if line.last() != Some(&b'\n') {
            return Ok(None);
        }
        line.pop();
        Ok(Some(line))
    }

    fn path(&self) -> &Path { &self.path }
}

pub(crate) fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound { Error::MissingShard(path.to_path_buf()) } else { Error::Io(e) }
    })
}

/// Opens `path` for random line access, memory-mapped when `prefer_mmap` is
/// set and the platform allows it.
pub fn open_line_reader(path: &Path, prefer_mmap: bool) -> Result<Box<dyn LineReader>> {
    let file = open_file(path)?;
    if prefer_mmap {
        // zero-length files cannot be mapped on every platform
        if file.metadata()?.len() > 0 {
            match MmapLineReader::from_file(path, &file) {
                Ok(reader) => return Ok(Box::new(reader)),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "mmap unavailable, using seek reads"),
            }
        }
    }
    Ok(Box::new(SeekLineReader::from_file(path, file)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(dir: &Path) -> PathBuf {
        let path = dir.join("lines.jsonl");
        std::fs::write(&path, b"{\"a\":1}\n{\"b\":22}\n\n{\"partial\":").unwrap();
        path
    }

    #[test]
    fn mmap_and_seek_agree() {
        let tmp = tempfile::tempdir().unwrap();
        let path = fixture(tmp.path());
        let mmap = MmapLineReader::open(&path).unwrap();
        let seek = SeekLineReader::open(&path).unwrap();
        for offset in [0u64, 8, 17, 18, 3, 1000] {
            assert_eq!(mmap.read_line_at(offset).unwrap(), seek.read_line_at(offset).unwrap(), "offset {offset}");
        }
        assert_eq!(seek.read_line_at(8).unwrap(), Some(b"{\"b\":22}".to_vec()));
        assert_eq!(seek.read_line_at(17).unwrap(), Some(Vec::new()));
        assert_eq!(seek.read_line_at(18).unwrap(), None);
    }

    #[test]
    fn missing_file_is_missing_shard() {
        let tmp = tempfile::tempdir().unwrap();
        let err = open_line_reader(&tmp.path().join("nope.jsonl"), true).err().expect("error");
        assert!(err.is_missing());
    }

    #[test]
    fn empty_file_falls_back_to_seek() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.jsonl");
        std::fs::write(&path, b"").unwrap();
        let reader = open_line_reader(&path, true).unwrap();
        assert_eq!(reader.read_line_at(0).unwrap(), None);
    }
}
