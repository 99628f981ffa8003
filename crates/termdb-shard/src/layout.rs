//! On-disk layout of a partition and the key scheme that maps words to shards.
//!
//! ```text
//! <root>/<partition>.current                      name of the published version
//! <root>/<partition>@<version>/nodes/<aa..zz>.jsonl
//! <root>/<partition>@<version>/shards/<N|T|P>/<hh>/<bucket>.jsonl
//! <root>/<partition>@<version>/shards/<N|T|P>/<hh>/<bucket>.idx
//! ```
//!
//! A query resolves the pointer once and reads a single version throughout.
use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use twox_hash::XxHash64;

use termdb_core::config::EngineConfig;
use termdb_core::phonetic::{metaphone, phrase_code};
use termdb_core::text::{is_numeric, prefix, strip_leading_zeros};
use termdb_core::types::{DomainId, ShardKey, ShardKind};

/// Fixed fan-out of the node store and of the per-kind hash directories.
pub const BUCKET_COUNT: u64 = 676;

pub const GLOBAL_PARTITION: &str = "global";

pub fn stable_hash(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

/// Maps a hash onto a two-letter code `aa`..`zz`.
pub fn bucket_code(hash: u64) -> [u8; 2] {
    let n = hash % BUCKET_COUNT;
    [b'a' + (n / 26) as u8, b'a' + (n % 26) as u8]
}

/// Node store bucket for a title.
pub fn node_bucket(title: &str) -> [u8; 2] {
    bucket_code(stable_hash(title.as_bytes()))
}

pub fn all_bucket_codes() -> impl Iterator<Item = [u8; 2]> {
    (0..BUCKET_COUNT).map(bucket_code)
}

fn code_str(code: &[u8; 2]) -> &str {
    std::str::from_utf8(code).unwrap_or("aa")
}

/// Paths of one domain partition.
#[derive(Debug, Clone)]
pub struct PartitionLayout {
    dir: PathBuf,
}

impl PartitionLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    pub fn dir(&self) -> &Path { &self.dir }

    pub fn nodes_dir(&self) -> PathBuf { self.dir.join("nodes") }

    pub fn node_file(&self, bucket: &[u8; 2]) -> PathBuf {
        self.nodes_dir().join(format!("{}.jsonl", code_str(bucket)))
    }

    pub fn kind_dir(&self, kind: ShardKind) -> PathBuf {
        self.dir.join("shards").join(kind.tag())
    }

    fn shard_stem(&self, key: &ShardKey) -> PathBuf {
        let hash_dir = bucket_code(stable_hash(key.bucket.as_bytes()));
        self.kind_dir(key.kind).join(code_str(&hash_dir)).join(&key.bucket)
    }

    pub fn shard_file(&self, key: &ShardKey) -> PathBuf {
        self.shard_stem(key).with_extension("jsonl")
    }

    pub fn offset_file(&self, key: &ShardKey) -> PathBuf {
        self.shard_stem(key).with_extension("idx")
    }
}

/// Root of all partitions; decides which partition a domain id maps to.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    domain_scoped: bool,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>, domain_scoped: bool) -> Self {
        Self { root: root.into(), domain_scoped }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.storage_path(), config.domain_scoped)
    }

    pub fn root(&self) -> &Path { &self.root }

    /// Domain filter actually applied; `None` when scoping is disabled.
    pub fn effective_domain(&self, domain: Option<DomainId>) -> Option<DomainId> {
        if self.domain_scoped { domain } else { None }
    }

    pub fn partition_name(&self, domain: Option<DomainId>) -> String {
        match self.effective_domain(domain) {
            Some(id) => id.to_string(),
            None => GLOBAL_PARTITION.to_string(),
        }
    }

    /// The published version of a partition, pinned at call time. Without a
    /// pointer the layout names a directory that does not exist, so every
    /// shard reads as missing.
    pub fn partition(&self, domain: Option<DomainId>) -> PartitionLayout {
        let name = self.partition_name(domain);
        match self.current_version(domain) {
            Some(version) => PartitionLayout::new(self.root.join(version)),
            None => PartitionLayout::new(self.root.join(name)),
        }
    }

    /// Directory name of the published version, read from the pointer file.
    pub fn current_version(&self, domain: Option<DomainId>) -> Option<String> {
        let pointer = self.pointer_file(domain);
        match fs::read_to_string(&pointer) {
            Ok(raw) => {
                let version = raw.trim();
                let valid = version.starts_with(&self.version_prefix(domain)) && !version.contains(['/', '\\']);
                if valid {
                    Some(version.to_string())
                } else {
                    tracing::warn!(pointer = %pointer.display(), "ignoring malformed partition pointer");
                    None
                }
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(pointer = %pointer.display(), error = %e, "partition pointer unreadable");
                }
                None
            }
        }
    }

    pub fn pointer_file(&self, domain: Option<DomainId>) -> PathBuf {
        self.root.join(format!("{}.current", self.partition_name(domain)))
    }

    /// Prefix shared by every version directory of a partition.
    pub fn version_prefix(&self, domain: Option<DomainId>) -> String {
        format!("{}@", self.partition_name(domain))
    }

    /// Name of a new version directory.
    pub fn new_version(&self, domain: Option<DomainId>) -> String {
        format!("{}{}", self.version_prefix(domain), nonce())
    }

    /// Version directories of a partition currently on disk.
    pub fn versions(&self, domain: Option<DomainId>) -> Vec<String> {
        let prefix = self.version_prefix(domain);
        let Ok(entries) = fs::read_dir(&self.root) else { return Vec::new() };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|n| n.starts_with(&prefix))
            .collect();
        names.sort();
        names
    }

    /// Fresh sibling directory a build writes into before it is published.
    pub fn staging_dir(&self, domain: Option<DomainId>) -> PathBuf {
        self.root.join(format!(".staging-{}-{}", self.partition_name(domain), nonce()))
    }

    /// Scratch file the pointer is written to before it is renamed into place.
    pub fn pointer_scratch(&self, domain: Option<DomainId>) -> PathBuf {
        self.root.join(format!(".{}.current-{}", self.partition_name(domain), nonce()))
    }
}

fn nonce() -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
    format!("{}-{}", std::process::id(), nanos)
}

/// Prefix lengths that turn words into shard buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyScheme {
    pub numeric_prefix_len: usize,
    pub text_prefix_len: usize,
    pub phrase_prefix_len: usize,
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl KeyScheme {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            numeric_prefix_len: config.numeric_prefix_len,
            text_prefix_len: config.text_prefix_len,
            phrase_prefix_len: config.phrase_prefix_len,
        }
    }

    /// Numeric key for all-digit words, Text key otherwise. `None` when the
    /// word has no phonetic code (e.g. only non-ASCII letters).
    pub fn word_key(&self, word: &str) -> Option<ShardKey> {
        if is_numeric(word) {
            let digits = strip_leading_zeros(word);
            return Some(ShardKey::numeric(prefix(digits, self.numeric_prefix_len)));
        }
        self.text_key(word)
    }

    pub fn text_key(&self, word: &str) -> Option<ShardKey> {
        let code = metaphone(word);
        if code.is_empty() { None } else { Some(ShardKey::text(prefix(&code, self.text_prefix_len))) }
    }

    pub fn phrase_key<S: AsRef<str>>(&self, words: &[S]) -> Option<ShardKey> {
        let code = phrase_code(words);
        if code.is_empty() { None } else { Some(ShardKey::phrase(prefix(&code, self.phrase_prefix_len))) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_codes_cover_aa_to_zz() {
        let codes: Vec<[u8; 2]> = all_bucket_codes().collect();
        assert_eq!(codes.len(), 676);
        assert_eq!(&codes[0], b"aa");
        assert_eq!(&codes[675], b"zz");
    }

    #[test]
    fn node_bucket_is_stable() {
        assert_eq!(node_bucket("Blue Widget"), node_bucket("Blue Widget"));
    }

    #[test]
    fn word_keys() {
        let scheme = KeyScheme::default();
        assert_eq!(scheme.word_key("00123456"), Some(ShardKey::numeric("123")));
        assert_eq!(scheme.word_key("000"), Some(ShardKey::numeric("0")));
        assert_eq!(scheme.word_key("widgets"), Some(ShardKey::text("WJT")));
        assert_eq!(scheme.word_key("ü"), None);
        assert_eq!(scheme.phrase_key(&["widget", "blue"]), Some(ShardKey::phrase("BLWJ")));
    }

    #[test]
    fn partition_naming() {
        let scoped = StorageLayout::new("/idx", true);
        assert_eq!(scoped.partition_name(Some(7)), "7");
        assert_eq!(scoped.partition_name(None), GLOBAL_PARTITION);
        let global = StorageLayout::new("/idx", false);
        assert_eq!(global.partition_name(Some(7)), GLOBAL_PARTITION);
    }

    #[test]
    fn pointer_selects_version() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = StorageLayout::new(tmp.path(), true);
        assert_eq!(storage.partition(Some(3)).dir(), tmp.path().join("3"));

        let version = storage.new_version(Some(3));
        assert!(version.starts_with("3@"));
        fs::create_dir_all(tmp.path().join(&version)).unwrap();
        fs::write(storage.pointer_file(Some(3)), format!("{version}\n")).unwrap();
        assert_eq!(storage.partition(Some(3)).dir(), tmp.path().join(&version));
        assert_eq!(storage.versions(Some(3)), vec![version]);
        assert!(storage.versions(Some(33)).is_empty());

        fs::write(storage.pointer_file(Some(3)), "../elsewhere").unwrap();
        assert_eq!(storage.current_version(Some(3)), None);
    }

    #[test]
    fn shard_paths_share_hash_dir() {
        let layout = PartitionLayout::new("/idx/global");
        let key = ShardKey::text("BL");
        assert_eq!(layout.shard_file(&key).parent(), layout.offset_file(&key).parent());
        assert!(layout.shard_file(&key).starts_with("/idx/global/shards/T"));
        assert_eq!(layout.shard_file(&key).extension().and_then(|e| e.to_str()), Some("jsonl"));
    }
}
