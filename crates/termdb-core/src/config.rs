//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! The `engine` table is extracted into a typed [`EngineConfig`]; paths in it
//! get `~` and `${VAR}` expansion.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::options::SearchOptions;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Builds a config from an inline TOML document, without touching the filesystem.
    pub fn from_toml_str(toml: &str) -> Self {
        Self { figment: Figment::new().merge(Toml::string(toml)) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[engine]` table layered over [`EngineConfig::default`], validated.
    pub fn engine(&self) -> anyhow::Result<EngineConfig> {
        let engine = match self.figment.find_value("engine") {
            Ok(_) => self.get::<EngineConfig>("engine")?,
            Err(_) => EngineConfig::default(),
        };
        engine.validate()?;
        Ok(engine)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        if matches!(env, "prod" | "production") {
            if let Ok(false) = self.get::<bool>("engine.use_mmap") {
                tracing::warn!("mmap disabled in production config; random access will use seek reads");
            }
        }
        Ok(())
    }
}

/// Backend that answers queries. Only the on-disk shard engine lives in this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Shard,
}

impl std::str::FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shard" | "json" => Ok(Backend::Shard),
            other => Err(Error::UnsupportedBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: String,
    pub storage_dir: String,
    /// When false every build and query uses the single global partition.
    pub domain_scoped: bool,
    pub batch_size: usize,
    pub numeric_prefix_len: usize,
    pub text_prefix_len: usize,
    pub phrase_prefix_len: usize,
    pub max_open_files: usize,
    pub use_mmap: bool,
    pub cache_ttl_secs: u64,
    pub search: SearchOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: "shard".to_string(),
            storage_dir: "./data/termdb".to_string(),
            domain_scoped: true,
            batch_size: 500,
            numeric_prefix_len: 3,
            text_prefix_len: 3,
            phrase_prefix_len: 4,
            max_open_files: 128,
            use_mmap: true,
            cache_ttl_secs: 300,
            search: SearchOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Engine config rooted at `dir`, everything else default.
    pub fn with_storage_dir(dir: impl AsRef<Path>) -> Self {
        Self { storage_dir: dir.as_ref().to_string_lossy().into_owned(), ..Self::default() }
    }

    pub fn backend(&self) -> crate::error::Result<Backend> {
        self.backend.parse()
    }

    pub fn storage_path(&self) -> PathBuf {
        expand_path(&self.storage_dir)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        self.backend()?;
        if !(2..=4).contains(&self.numeric_prefix_len) {
            return Err(Error::InvalidConfig(format!("numeric_prefix_len must be 2..=4, got {}", self.numeric_prefix_len)));
        }
        if self.text_prefix_len == 0 || self.phrase_prefix_len == 0 {
            return Err(Error::InvalidConfig("phonetic prefix lengths must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.max_open_files < 2 {
            return Err(Error::InvalidConfig("max_open_files must be at least 2".into()));
        }
        self.search.validate()
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
