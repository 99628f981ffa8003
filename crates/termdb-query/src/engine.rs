//! The query pipeline: tokens → shard keys → candidates → prefilter → score → rank.
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use termdb_core::config::EngineConfig;
use termdb_core::error::Result;
use termdb_core::options::{ReturnShape, SearchOptions, SortMode, DEFAULT_AUTOCOMPLETE_LIMIT, DEFAULT_SEARCH_LIMIT};
use termdb_core::text::content_words;
use termdb_core::traits::TermSearch;
use termdb_core::types::{DomainId, Match, Node, NodeId, SearchOutput, ShardKey, ShardKind, ShardRef};
use termdb_shard::{KeyScheme, NodeResolver, ShardReader, StorageLayout};

use crate::cache::{MemoryTokenCache, NoopShardCache, ShardCache, TokenCache};
use crate::distance::levenshtein;
use crate::scorer::{DistanceMemo, QueryTerms, Scorer, Title};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Search,
    Autocomplete,
}

impl QueryKind {
    fn default_limit(self) -> usize {
        match self {
            QueryKind::Search => DEFAULT_SEARCH_LIMIT,
            QueryKind::Autocomplete => DEFAULT_AUTOCOMPLETE_LIMIT,
        }
    }
}

/// Counters for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub keys_derived: usize,
    pub shard_candidates: usize,
    pub branch_candidates: usize,
    pub fallback_scanned: usize,
    pub fallback_distance_computations: usize,
    pub after_prefilter: usize,
    pub returned: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Shard,
    Branch,
    Scan,
}

struct Candidate {
    node: Node,
    title: Title,
    origin: Origin,
}

struct Ranked {
    exact: (bool, bool, bool),
    hit: Match,
}

pub struct QueryEngine {
    config: EngineConfig,
    storage: StorageLayout,
    scheme: KeyScheme,
    token_cache: Arc<dyn TokenCache>,
    shard_cache: Arc<dyn ShardCache>,
}

impl QueryEngine {
    /// Engine over `config.storage_dir` with an in-memory token cache and no shard cache.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let storage = StorageLayout::from_config(&config);
        let scheme = KeyScheme::from_config(&config);
        let token_cache = Arc::new(MemoryTokenCache::new(Duration::from_secs(config.cache_ttl_secs)));
        Ok(Self { config, storage, scheme, token_cache, shard_cache: Arc::new(NoopShardCache) })
    }

    pub fn with_token_cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.token_cache = cache;
        self
    }

    pub fn with_shard_cache(mut self, cache: Arc<dyn ShardCache>) -> Self {
        self.shard_cache = cache;
        self
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn token_cache(&self) -> &Arc<dyn TokenCache> { &self.token_cache }

    /// Forgets cached shard contents after a rebuild of `domain`'s partition.
    pub fn invalidate(&self, domain: Option<DomainId>, keys: &BTreeSet<ShardKey>) {
        self.shard_cache.invalidate(&self.storage.partition_name(domain), keys);
    }

    /// Shard keys for a query: one per token, plus a phrase key for multi-token queries.
    pub fn derive_keys(&self, terms: &QueryTerms) -> Vec<ShardKey> {
        let mut keys: Vec<ShardKey> = Vec::new();
        let mut push = |key: ShardKey| {
            if !keys.contains(&key) {
                keys.push(key);
            }
        };
        for token in &terms.tokens {
            if let Some(key) = self.scheme.word_key(token) {
                push(key);
            }
        }
        if terms.tokens.len() > 1 {
            let content = content_words(&terms.tokens);
            if content.len() > 1 {
                if let Some(key) = self.scheme.phrase_key(&content) {
                    push(key);
                }
            }
        }
        keys
    }

    pub fn search_matches(&self, query: &str, domain: Option<DomainId>, options: &SearchOptions, kind: QueryKind) -> Result<(Vec<Match>, QueryStats)> {
        options.validate()?;
        let mut stats = QueryStats::default();
        let terms = QueryTerms::new(query, &self.scheme);
        if terms.is_empty() {
            return Ok((Vec::new(), stats));
        }

        let keys = self.derive_keys(&terms);
        stats.keys_derived = keys.len();

        let partition = self.storage.partition_name(domain);
        let reader = ShardReader::new(self.storage.partition(domain), self.config.use_mmap);
        let mut resolver = NodeResolver::new(reader.layout().clone(), self.config.use_mmap);
        let mut rng = match options.sample_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut candidates: Vec<Candidate> = Vec::new();
        for key in &keys {
            for reference in self.fetch(&reader, &partition, key, options.max_nodes_per_shard, &mut rng).iter() {
                if self.admit(&mut resolver, reference, options, &mut seen, &mut candidates, Origin::Shard) {
                    stats.shard_candidates += 1;
                }
            }
        }

        if candidates.len() < options.min_candidates {
            if options.branch_distance > 0 {
                stats.branch_candidates = self.expand_branches(&reader, &partition, &keys, &mut resolver, options, &mut rng, &mut seen, &mut candidates);
            }
            if candidates.len() < options.min_candidates {
                tracing::debug!(partition = %partition, candidates = candidates.len(), "scanning partition");
                for node in reader.scan_nodes() {
                    if stats.fallback_scanned >= options.max_comparisons {
                        break;
                    }
                    stats.fallback_scanned += 1;
                    if seen.contains(&node.id) || !node.in_categories(&options.category_ids) {
                        continue;
                    }
                    let title = Title::new(&node.title);
                    // the prefilter is applied here so the scan never holds rejected nodes
                    if terms.prefilter(&title, &self.scheme, options.token_mode) {
                        seen.insert(node.id);
                        candidates.push(Candidate { node, title, origin: Origin::Scan });
                    }
                }
            }
        }

        let scheme = &self.scheme;
        candidates.retain(|c| c.origin == Origin::Scan || terms.prefilter(&c.title, scheme, options.token_mode));
        stats.after_prefilter = candidates.len();

        let scorer = Scorer::new(&terms, options, kind == QueryKind::Autocomplete);
        let mut memo = DistanceMemo::new(self.token_cache.as_ref(), options);
        // scan visits and distance computations are capped separately
        let mut budget = options.max_comparisons;
        let mut fallback_computed = 0u64;
        let mut ranked: Vec<Ranked> = Vec::with_capacity(candidates.len());
        for c in candidates {
            let score = if c.origin == Origin::Scan {
                let before = memo.computed();
                let s = scorer.score(&c.title, &mut memo, Some(&mut budget));
                fallback_computed += memo.computed() - before;
                s
            } else {
                scorer.score(&c.title, &mut memo, None)
            };
            let Some(score) = score else { continue };
            let exact = (
                c.title.normalized == terms.normalized,
                c.title.normalized.starts_with(&terms.normalized),
                c.title.normalized.contains(&terms.normalized),
            );
            ranked.push(Ranked { exact, hit: Match { id: c.node.id, score, node: c.node } });
        }
        stats.fallback_distance_computations = usize::try_from(fallback_computed).unwrap_or(usize::MAX);

        sort_ranked(&mut ranked, options.mode);
        ranked.truncate(options.limit_or(kind.default_limit()));
        stats.returned = ranked.len();
        tracing::debug!(query = %terms.normalized, partition = %partition, ?stats, "query finished");
        Ok((ranked.into_iter().map(|r| r.hit).collect(), stats))
    }

    fn run(&self, query: &str, domain: Option<DomainId>, options: &SearchOptions, kind: QueryKind) -> Result<SearchOutput> {
        let (matches, _) = self.search_matches(query, domain, options, kind)?;
        Ok(match options.return_shape {
            ReturnShape::Ids => SearchOutput::Ids(matches.into_iter().map(|m| m.id).collect()),
            ReturnShape::Nodes => SearchOutput::Nodes(matches.into_iter().map(|m| m.node).collect()),
        })
    }

    /// References of one shard; missing or unreadable shards are empty.
    fn fetch(&self, reader: &ShardReader, partition: &str, key: &ShardKey, cap: Option<usize>, rng: &mut StdRng) -> Arc<Vec<ShardRef>> {
        if cap.is_none() {
            if let Some(refs) = self.shard_cache.get(partition, key) {
                return refs;
            }
        }
        match reader.read_refs(key, cap, rng) {
            Ok(refs) => {
                let refs = Arc::new(refs);
                if cap.is_none() {
                    self.shard_cache.put(partition, key, Arc::clone(&refs));
                }
                refs
            }
            Err(e) if e.is_missing() => {
                tracing::debug!(shard = %key, "no shard for key");
                Arc::new(Vec::new())
            }
            Err(e) => {
                tracing::warn!(shard = %key, error = %e, "shard read failed");
                Arc::new(Vec::new())
            }
        }
    }

    /// Resolves a reference and keeps the node when it passes the category filter and is new.
    fn admit(&self, resolver: &mut NodeResolver, reference: &ShardRef, options: &SearchOptions, seen: &mut HashSet<NodeId>, out: &mut Vec<Candidate>, origin: Origin) -> bool {
        let Some(node) = resolver.resolve(reference) else { return false };
        if !node.in_categories(&options.category_ids) || !seen.insert(node.id) {
            return false;
        }
        let title = Title::new(&node.title);
        out.push(Candidate { node, title, origin });
        true
    }

    /// Reads shards whose bucket is within `branch_distance` edits of a derived key.
    #[allow(clippy::too_many_arguments)]
    fn expand_branches(
        &self,
        reader: &ShardReader,
        partition: &str,
        keys: &[ShardKey],
        resolver: &mut NodeResolver,
        options: &SearchOptions,
        rng: &mut StdRng,
        seen: &mut HashSet<NodeId>,
        out: &mut Vec<Candidate>,
    ) -> usize {
        let mut listed: HashMap<ShardKind, Vec<String>> = HashMap::new();
        let mut neighbors: Vec<ShardKey> = Vec::new();
        for key in keys {
            let buckets = listed.entry(key.kind).or_insert_with(|| reader.list_buckets(key.kind));
            for bucket in buckets.iter() {
                let candidate = ShardKey::new(key.kind, bucket.clone());
                if !keys.contains(&candidate) && !neighbors.contains(&candidate) && levenshtein(bucket, &key.bucket) <= options.branch_distance {
                    neighbors.push(candidate);
                }
            }
        }

        let mut added = 0;
        for key in &neighbors {
            for reference in self.fetch(reader, partition, key, options.max_nodes_per_shard, rng).iter() {
                if self.admit(resolver, reference, options, seen, out, Origin::Branch) {
                    added += 1;
                }
            }
        }
        tracing::debug!(neighbors = neighbors.len(), added, "expanded neighbor branches");
        added
    }
}

fn sort_ranked(ranked: &mut [Ranked], mode: SortMode) {
    ranked.sort_by(|a, b| {
        let by_exact = match mode {
            SortMode::Exact => b.exact.cmp(&a.exact),
            SortMode::Similarity => Ordering::Equal,
        };
        by_exact.then_with(|| b.hit.score.total_cmp(&a.hit.score)).then_with(|| a.hit.id.cmp(&b.hit.id))
    });
}

impl TermSearch for QueryEngine {
    fn search(&self, query: &str, domain: Option<DomainId>, options: &SearchOptions) -> Result<SearchOutput> {
        self.run(query, domain, options, QueryKind::Search)
    }

    fn autocomplete(&self, query: &str, domain: Option<DomainId>, options: &SearchOptions) -> Result<SearchOutput> {
        self.run(query, domain, options, QueryKind::Autocomplete)
    }
}
