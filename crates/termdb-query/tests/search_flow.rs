use std::sync::Arc;

use tempfile::TempDir;

use termdb_core::config::EngineConfig;
use termdb_core::options::{ReturnShape, SearchOptions, SortMode, TokenMode};
use termdb_core::source::MemorySource;
use termdb_core::traits::{TermIndexer, TermSearch};
use termdb_core::types::{DomainId, Node, SearchOutput};
use termdb_query::scorer::{DistanceMemo, QueryTerms, Scorer, Title};
use termdb_query::{MemoryShardCache, MemoryTokenCache, NoopTokenCache, QueryEngine, QueryKind, ShardCache};
use termdb_shard::{IndexBuilder, KeyScheme};

fn index(tmp: &TempDir, nodes: Vec<Node>, domain: Option<DomainId>) -> QueryEngine {
    let config = EngineConfig::with_storage_dir(tmp.path());
    let builder = IndexBuilder::new(MemorySource::new(nodes), config.clone()).expect("builder");
    builder.build(domain).expect("build");
    QueryEngine::new(config).expect("engine")
}

fn opts() -> SearchOptions {
    SearchOptions::default().with_seed(42)
}

fn widgets() -> Vec<Node> {
    vec![
        Node::new(1, "Blue Widget").with_categories([10]),
        Node::new(2, "Blue Widgets Pro").with_categories([20]),
        Node::new(3, "Red Lamp"),
        Node::new(4, "Shredder"),
        Node::new(5, "Green Gadget"),
    ]
}

#[test]
fn misspelled_query_finds_both_widgets() {
    let tmp = TempDir::new().unwrap();
    let engine = index(&tmp, widgets(), None);
    let ids = engine.search("blu widget", None, &opts()).expect("search").ids();
    assert!(ids.contains(&1), "{ids:?}");
    assert!(ids.contains(&2), "{ids:?}");
    assert!(!ids.contains(&3));
}

#[test]
fn numeric_query_without_numerals_is_empty() {
    let tmp = TempDir::new().unwrap();
    let engine = index(&tmp, widgets(), None);
    assert!(engine.search("999", None, &opts()).unwrap().is_empty());
}

#[test]
fn blank_queries_return_nothing() {
    let tmp = TempDir::new().unwrap();
    let engine = index(&tmp, widgets(), None);
    for q in ["", "   ", "?!,."] {
        let (matches, stats) = engine.search_matches(q, None, &opts(), QueryKind::Search).expect("no error");
        assert!(matches.is_empty());
        assert_eq!(stats.keys_derived, 0);
    }
}

#[test]
fn every_title_finds_itself_through_shards() {
    let tmp = TempDir::new().unwrap();
    let engine = index(&tmp, widgets(), None);
    let strict = opts().with_min_candidates(0);
    for node in widgets() {
        let (matches, stats) = engine.search_matches(&node.title, None, &strict, QueryKind::Search).unwrap();
        assert_eq!(matches.first().map(|m| m.id), Some(node.id), "query {:?}", node.title);
        assert_eq!(stats.fallback_scanned, 0);
    }
}

#[test]
fn exact_mode_orders_by_title_match() {
    let tmp = TempDir::new().unwrap();
    let nodes = vec![Node::new(13, "Wodget"), Node::new(12, "Blue Widget"), Node::new(11, "Widget Case"), Node::new(10, "Widget")];
    let engine = index(&tmp, nodes, None);
    let ids = engine.search("widget", None, &opts().with_mode(SortMode::Exact)).unwrap().ids();
    assert_eq!(ids, vec![10, 11, 12, 13]);
}

#[test]
fn nodes_shape_returns_payloads() {
    let tmp = TempDir::new().unwrap();
    let engine = index(&tmp, widgets(), None);
    let out = engine.search("green gadget", None, &opts().with_return(ReturnShape::Nodes)).unwrap();
    match out {
        SearchOutput::Nodes(nodes) => {
            assert_eq!(nodes[0].id, 5);
            assert_eq!(nodes[0].title, "Green Gadget");
        }
        other => panic!("expected nodes, got {other:?}"),
    }
}

#[test]
fn category_filter_limits_candidates() {
    let tmp = TempDir::new().unwrap();
    let engine = index(&tmp, widgets(), None);
    let ids = engine.search("blue widget", None, &opts().with_categories(vec![20])).unwrap().ids();
    assert_eq!(ids, vec![2]);
}

#[test]
fn all_token_mode_requires_every_token() {
    let tmp = TempDir::new().unwrap();
    let engine = index(&tmp, widgets(), None);
    let any = engine.search("blue pro", None, &opts()).unwrap().ids();
    assert!(any.contains(&1) && any.contains(&2));
    let all = engine.search("blue pro", None, &opts().with_token_mode(TokenMode::All)).unwrap().ids();
    assert_eq!(all, vec![2]);
}

#[test]
fn whole_word_outscores_substring() {
    let tmp = TempDir::new().unwrap();
    let engine = index(&tmp, widgets(), None);
    let (matches, _) = engine.search_matches("red", None, &opts(), QueryKind::Search).unwrap();
    let score = |id| matches.iter().find(|m| m.id == id).map(|m| m.score);
    let word = score(3).expect("Red Lamp");
    let substring = score(4).expect("Shredder");
    assert!(word >= substring, "{word} < {substring}");
}

#[test]
fn fallback_respects_comparison_budget() {
    let tmp = TempDir::new().unwrap();
    let nodes: Vec<Node> = (0..30).map(|i| Node::new(i, format!("item {i}"))).collect();
    let engine = index(&tmp, nodes, None);
    let options = opts().with_branch_distance(0).with_max_comparisons(40);
    let (matches, stats) = engine.search_matches("tem", None, &options, QueryKind::Search).unwrap();
    assert_eq!(stats.shard_candidates, 0);
    assert_eq!(stats.fallback_scanned, 30);
    assert_eq!(stats.fallback_distance_computations, 30);
    assert_eq!(matches.len(), 20);

    let tight = opts().with_branch_distance(0).with_max_comparisons(12);
    let (matches, stats) = engine.search_matches("tem", None, &tight, QueryKind::Search).unwrap();
    assert_eq!(stats.fallback_scanned, 12);
    assert!(stats.fallback_distance_computations <= 12);
    assert_eq!(matches.len(), 12);
}

#[test]
fn scan_candidates_score_like_shard_candidates() {
    let ranked = |extra: usize| {
        let tmp = TempDir::new().unwrap();
        let mut nodes = vec![Node::new(1, "widgit"), Node::new(2, "xwidgetx")];
        nodes.extend((0..extra as u64).map(|i| Node::new(100 + i, format!("lamp {i}"))));
        let engine = index(&tmp, nodes, None);
        let (matches, stats) = engine.search_matches("widget", None, &opts().with_max_comparisons(12), QueryKind::Search).unwrap();
        assert_eq!(stats.shard_candidates, 1);
        matches.into_iter().map(|m| (m.id, m.score)).collect::<Vec<_>>()
    };
    let small = ranked(0);
    assert_eq!(small.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![2, 1]);
    assert_eq!(ranked(10), small);

    let config = EngineConfig::default();
    let scheme = KeyScheme::from_config(&config);
    let options = opts();
    let terms = QueryTerms::new("widget", &scheme);
    let mut memo = DistanceMemo::new(&NoopTokenCache, &options);
    let direct = Scorer::new(&terms, &options, false).score(&Title::new("xwidgetx"), &mut memo, None).expect("scored");
    assert!((small[0].1 - direct).abs() < 1e-9, "{} vs {direct}", small[0].1);
}

#[test]
fn autocomplete_defaults_to_ten() {
    let tmp = TempDir::new().unwrap();
    let nodes: Vec<Node> = (0..15).map(|i| Node::new(i, format!("widget {i}"))).collect();
    let engine = index(&tmp, nodes, None);
    assert_eq!(engine.autocomplete("widg", None, &opts()).unwrap().len(), 10);
    assert_eq!(engine.search("widget", None, &opts()).unwrap().len(), 15);
    assert_eq!(engine.search("widget", None, &opts().with_limit(3)).unwrap().len(), 3);
}

#[test]
fn autocomplete_prefers_title_prefix() {
    let tmp = TempDir::new().unwrap();
    let nodes = vec![Node::new(1, "Lamp Blue"), Node::new(2, "Blue Lamp")];
    let engine = index(&tmp, nodes, None);
    let ids = engine.autocomplete("blue la", None, &opts()).unwrap().ids();
    assert_eq!(ids.first(), Some(&2));
}

#[test]
fn caches_do_not_change_results() {
    let tmp = TempDir::new().unwrap();
    let engine = index(&tmp, widgets(), None);
    let run = |engine: &QueryEngine| {
        let (matches, _) = engine.search_matches("blu wigdet", None, &opts(), QueryKind::Search).unwrap();
        matches.into_iter().map(|m| (m.id, m.score)).collect::<Vec<_>>()
    };

    let config = EngineConfig::with_storage_dir(tmp.path());
    let plain = QueryEngine::new(config.clone()).unwrap().with_token_cache(Arc::new(NoopTokenCache));
    let shard_cache = Arc::new(MemoryShardCache::default());
    let cached = QueryEngine::new(config).unwrap().with_token_cache(Arc::new(MemoryTokenCache::default())).with_shard_cache(shard_cache.clone());

    let expected = run(&plain);
    assert!(!expected.is_empty());
    assert_eq!(run(&cached), expected);
    assert!(!shard_cache.is_empty());
    assert_eq!(run(&cached), expected);
    assert_eq!(run(&engine), expected);
}

#[test]
fn rebuild_is_idempotent_and_invalidates_shard_cache() {
    let tmp = TempDir::new().unwrap();
    let config = EngineConfig::with_storage_dir(tmp.path());
    let shard_cache = Arc::new(MemoryShardCache::default());
    let engine = QueryEngine::new(config.clone()).unwrap().with_shard_cache(shard_cache.clone());
    let builder = IndexBuilder::new(MemorySource::new(widgets()), config).unwrap();

    let keys = builder.build(None).unwrap();
    let first = engine.search("blue widget", None, &opts()).unwrap();
    let rebuilt = builder.build(None).unwrap();
    assert_eq!(keys, rebuilt);
    engine.invalidate(None, &rebuilt);
    assert!(shard_cache.get("global", &termdb_core::types::ShardKey::text("BL")).is_none());
    assert_eq!(engine.search("blue widget", None, &opts()).unwrap(), first);
}

#[test]
fn neighbor_branches_are_read_when_enabled() {
    let tmp = TempDir::new().unwrap();
    let engine = index(&tmp, widgets(), None);
    let (_, stats) = engine.search_matches("plue", None, &opts(), QueryKind::Search).unwrap();
    assert_eq!(stats.shard_candidates, 0);
    assert_eq!(stats.branch_candidates, 2);
    let (_, stats) = engine.search_matches("plue", None, &opts().with_branch_distance(0), QueryKind::Search).unwrap();
    assert_eq!(stats.branch_candidates, 0);
}

#[test]
fn domains_are_isolated() {
    let tmp = TempDir::new().unwrap();
    let nodes = vec![Node::new(1, "Blue Widget").with_domain(1), Node::new(2, "Blue Widget").with_domain(2)];
    let config = EngineConfig::with_storage_dir(tmp.path());
    let builder = IndexBuilder::new(MemorySource::new(nodes), config.clone()).unwrap();
    builder.build(Some(1)).unwrap();
    builder.build(Some(2)).unwrap();
    let engine = QueryEngine::new(config).unwrap();

    assert_eq!(engine.search("blue widget", Some(1), &opts()).unwrap().ids(), vec![1]);
    assert_eq!(engine.search("blue widget", Some(2), &opts()).unwrap().ids(), vec![2]);
    assert!(engine.search("blue widget", Some(3), &opts()).unwrap().is_empty());
}

#[test]
fn invalid_options_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let engine = index(&tmp, widgets(), None);
    let bad = opts().with_limit(0);
    assert!(engine.search("blue", None, &bad).is_err());
}
