//! Prefilter and scoring of candidate titles against the query tokens.
use std::collections::HashMap;

use termdb_core::options::{SearchOptions, TokenMode, SCORE_CEILING, SCORE_FLOOR};
use termdb_core::text::{is_numeric, strip_leading_zeros, tokenize};
use termdb_core::types::ShardKey;
use termdb_shard::KeyScheme;

use crate::cache::{TokenCache, TokenDistance};
use crate::distance::{distance, similarity};

/// A candidate title, normalized once.
#[derive(Debug, Clone)]
pub struct Title {
    pub normalized: String,
    pub words: Vec<String>,
}

impl Title {
    pub fn new(raw: &str) -> Self {
        let words = tokenize(raw);
        Self { normalized: words.join(" "), words }
    }
}

/// The normalized query with each token's shard key.
#[derive(Debug, Clone)]
pub struct QueryTerms {
    pub normalized: String,
    pub tokens: Vec<String>,
    keys: Vec<Option<ShardKey>>,
}

impl QueryTerms {
    pub fn new(query: &str, scheme: &KeyScheme) -> Self {
        let tokens = tokenize(query);
        let keys = tokens.iter().map(|t| scheme.word_key(t)).collect();
        Self { normalized: tokens.join(" "), tokens, keys }
    }

    pub fn is_empty(&self) -> bool { self.tokens.is_empty() }

    fn passes(&self, i: usize, title: &Title, scheme: &KeyScheme) -> bool {
        let token = &self.tokens[i];
        title.words.iter().any(|w| w == token)
            || title.normalized.contains(token.as_str())
            || self.keys[i].as_ref().is_some_and(|key| title.words.iter().any(|w| scheme.word_key(w).as_ref() == Some(key)))
    }

    /// Cheap gate before scoring: whole word, shared phonetic/numeric key, or raw substring.
    pub fn prefilter(&self, title: &Title, scheme: &KeyScheme, mode: TokenMode) -> bool {
        let mut passed = (0..self.tokens.len()).map(|i| self.passes(i, title, scheme));
        match mode {
            TokenMode::Any => passed.any(|p| p),
            TokenMode::All => passed.all(|p| p),
        }
    }
}

/// Distance lookups for one query: a local memo in front of the shared cache.
pub struct DistanceMemo<'a> {
    cache: &'a dyn TokenCache,
    profile: String,
    memo: HashMap<(usize, String), TokenDistance>,
    computed: u64,
}

impl<'a> DistanceMemo<'a> {
    pub fn new(cache: &'a dyn TokenCache, options: &SearchOptions) -> Self {
        let profile = format!("{:?}/{}", options.distance_algorithm, options.max_len_diff_for_distance);
        Self { cache, profile, memo: HashMap::new(), computed: 0 }
    }

    /// Number of `(token, title)` pairs looked up for the first time.
    pub fn computed(&self) -> u64 { self.computed }

    /// `budget` limits first-time lookups; when it is exhausted nothing is computed.
    fn lookup(&mut self, i: usize, token: &str, title: &Title, options: &SearchOptions, budget: Option<&mut usize>) -> TokenDistance {
        let key = (i, title.normalized.clone());
        if let Some(hit) = self.memo.get(&key) {
            return *hit;
        }
        if let Some(budget) = budget {
            if *budget == 0 {
                return TokenDistance { distance: None, similarity: 0.0 };
            }
            *budget -= 1;
        }
        self.computed += 1;
        let cache_token = format!("{token}#{}", self.profile);
        let value = self.cache.get(&cache_token, &title.normalized, &mut || closest_word(token, &title.words, options));
        self.memo.insert(key, value);
        value
    }
}

/// Distance to the closest title word of comparable length.
pub fn closest_word(token: &str, words: &[String], options: &SearchOptions) -> TokenDistance {
    let len = token.chars().count();
    words
        .iter()
        .filter(|w| w.chars().count().abs_diff(len) <= options.max_len_diff_for_distance)
        .map(|w| {
            let d = distance(options.distance_algorithm, token, w);
            (d, similarity(d, token, w))
        })
        .min_by(|a, b| a.0.cmp(&b.0).then(b.1.total_cmp(&a.1)))
        .map_or(TokenDistance { distance: None, similarity: 0.0 }, |(d, s)| TokenDistance { distance: Some(d), similarity: s })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenScore {
    pub score: f64,
    pub found: bool,
}

pub fn token_weight(token: &str) -> f64 {
    1.0 + 1.0 / (1.0 + token.chars().count() as f64)
}

pub struct Scorer<'q> {
    terms: &'q QueryTerms,
    options: &'q SearchOptions,
    autocomplete: bool,
}

impl<'q> Scorer<'q> {
    pub fn new(terms: &'q QueryTerms, options: &'q SearchOptions, autocomplete: bool) -> Self {
        Self { terms, options, autocomplete }
    }

    pub fn score_token(&self, i: usize, title: &Title, memo: &mut DistanceMemo<'_>, budget: Option<&mut usize>) -> TokenScore {
        let o = self.options;
        let token = self.terms.tokens[i].as_str();

        if title.words.iter().any(|w| w == token) {
            return TokenScore { score: 100.0 + o.word_boost, found: true };
        }
        if is_numeric(token) {
            let digits = strip_leading_zeros(token);
            if title.words.iter().any(|w| is_numeric(w) && strip_leading_zeros(w) == digits) {
                return TokenScore { score: 100.0 + o.word_boost / 2.0, found: true };
            }
        }
        let prefixed = title.words.iter().filter(|w| w.starts_with(token)).min_by_key(|w| w.chars().count());
        if let Some(word) = prefixed {
            // every algorithm agrees: only the missing suffix has to be inserted
            let d = word.chars().count() - token.chars().count();
            return TokenScore { score: similarity(d, token, word) + o.prefix_boost, found: true };
        }

        let td = memo.lookup(i, token, title, o, budget);
        let substring = token.chars().count() >= o.substring_min_len && title.normalized.contains(token);
        let position_boost = if !substring {
            0.0
        } else if title.normalized.starts_with(token) {
            o.prefix_boost
        } else {
            o.substring_boost
        };
        let similarity = if td.distance.is_some() { td.similarity } else { 0.0 };
        let found = substring || td.distance.is_some_and(|d| d <= o.distance_cutoff);
        TokenScore { score: similarity + position_boost, found }
    }

    /// Final clamped score, or `None` when `all` token mode rejects the title.
    pub fn score(&self, title: &Title, memo: &mut DistanceMemo<'_>, mut budget: Option<&mut usize>) -> Option<f64> {
        let o = self.options;
        let tokens = &self.terms.tokens;
        let n = tokens.len();
        if n == 0 {
            return None;
        }

        let mut weighted = 0.0;
        let mut weights = 0.0;
        let mut found = 0usize;
        for (i, token) in tokens.iter().enumerate() {
            let ts = self.score_token(i, title, memo, budget.as_deref_mut());
            let w = token_weight(token);
            weighted += ts.score * w;
            weights += w;
            found += usize::from(ts.found);
        }
        if o.token_mode == TokenMode::All && found < n {
            return None;
        }

        let mut score = weighted / weights;
        if self.contiguous(title) {
            score += o.phrase_boost;
        }
        let missing = n - found;
        score += o.all_tokens_boost * found as f64 / n as f64;
        score -= o.missing_token_penalty * missing as f64 / n as f64;
        if self.autocomplete && title.normalized.starts_with(&self.terms.normalized) {
            score += o.prefix_boost;
        }
        Some(score.clamp(SCORE_FLOOR, SCORE_CEILING))
    }

    /// Two consecutive query tokens match two consecutive title words.
    fn contiguous(&self, title: &Title) -> bool {
        let matches = |word: &String, token: &String| word == token || word.starts_with(token.as_str());
        self.terms.tokens.windows(2).any(|pair| title.words.windows(2).any(|ws| matches(&ws[0], &pair[0]) && matches(&ws[1], &pair[1])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoopTokenCache;

    fn score(query: &str, title: &str) -> Option<f64> {
        let scheme = KeyScheme::default();
        let options = SearchOptions::default();
        let terms = QueryTerms::new(query, &scheme);
        let mut memo = DistanceMemo::new(&NoopTokenCache, &options);
        Scorer::new(&terms, &options, false).score(&Title::new(title), &mut memo, None)
    }

    #[test]
    fn prefilter_gates() {
        let scheme = KeyScheme::default();
        let terms = QueryTerms::new("blu gizmo", &scheme);
        assert!(terms.prefilter(&Title::new("Blue Widget"), &scheme, TokenMode::Any));
        assert!(!terms.prefilter(&Title::new("Blue Widget"), &scheme, TokenMode::All));
        assert!(!terms.prefilter(&Title::new("Red Lamp"), &scheme, TokenMode::Any));
        let numeric = QueryTerms::new("0042", &scheme);
        assert!(numeric.prefilter(&Title::new("Model 42"), &scheme, TokenMode::Any));
    }

    #[test]
    fn exact_word_beats_prefix_and_typo() {
        let exact = score("widget", "Blue Widget").unwrap();
        let prefix = score("widget", "Blue Widgets").unwrap();
        let typo = score("widget", "Blue Wodget").unwrap();
        assert!(exact > prefix, "{exact} vs {prefix}");
        assert!(prefix > typo, "{prefix} vs {typo}");
    }

    #[test]
    fn numeric_tokens_ignore_leading_zeros() {
        let padded = score("007", "Agent 7").unwrap();
        let exact = score("7", "Agent 7").unwrap();
        assert!(exact > padded);
        assert!(padded > score("007", "Agent 8").unwrap());
    }

    #[test]
    fn contiguous_tokens_get_phrase_boost() {
        let together = score("blue widget", "blue widget case").unwrap();
        let apart = score("blue widget", "widget blue case").unwrap();
        assert!(together > apart);
    }

    #[test]
    fn all_mode_drops_partial_matches() {
        let scheme = KeyScheme::default();
        let options = SearchOptions::default().with_token_mode(TokenMode::All);
        let terms = QueryTerms::new("blue gizmo", &scheme);
        let mut memo = DistanceMemo::new(&NoopTokenCache, &options);
        assert_eq!(Scorer::new(&terms, &options, false).score(&Title::new("Blue Widget"), &mut memo, None), None);
    }

    #[test]
    fn exhausted_budget_skips_distance() {
        let scheme = KeyScheme::default();
        let options = SearchOptions::default();
        let terms = QueryTerms::new("wodget", &scheme);
        let mut memo = DistanceMemo::new(&NoopTokenCache, &options);
        let scorer = Scorer::new(&terms, &options, false);
        let mut budget = 0usize;
        let starved = scorer.score_token(0, &Title::new("widget"), &mut memo, Some(&mut budget));
        assert!(!starved.found);
        assert_eq!(memo.computed(), 0);
        let mut budget = 1usize;
        let funded = scorer.score_token(0, &Title::new("widget"), &mut memo, Some(&mut budget));
        assert!(funded.found);
        assert_eq!(budget, 0);
        assert_eq!(memo.computed(), 1);
    }

    #[test]
    fn prefix_rule_needs_no_distance_lookup() {
        let scheme = KeyScheme::default();
        let options = SearchOptions::default();
        let terms = QueryTerms::new("widget", &scheme);
        let mut memo = DistanceMemo::new(&NoopTokenCache, &options);
        let scorer = Scorer::new(&terms, &options, false);
        let mut budget = 0usize;
        let scored = scorer.score_token(0, &Title::new("Blue Widgets"), &mut memo, Some(&mut budget));
        assert!(scored.found);
        assert_eq!(memo.computed(), 0);
        let expected = similarity(distance(options.distance_algorithm, "widget", "widgets"), "widget", "widgets") + options.prefix_boost;
        assert!((scored.score - expected).abs() < 1e-9, "{} vs {expected}", scored.score);
    }
}
