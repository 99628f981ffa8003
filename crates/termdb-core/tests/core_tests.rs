use std::fs;
use std::io::Write;
use tempfile::TempDir;

use proptest::prelude::*;
use termdb_core::config::{Backend, Config, EngineConfig};
use termdb_core::error::Error;
use termdb_core::source::{JsonlSource, MemorySource};
use termdb_core::text::{normalize, tokenize};
use termdb_core::traits::RecordSource;
use termdb_core::types::Node;

#[test]
fn jsonl_source_streams_in_batches() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let mut f = fs::File::create(dir.join("terms.jsonl")).unwrap();
    for i in 0..5 {
        writeln!(f, r#"{{"id":{},"title":"Widget {}","category_ids":[1]}}"#, i, i).unwrap();
    }

    let source = JsonlSource::new(dir);
    let batches: Vec<Vec<Node>> = source.batches(None, 2).expect("batches").map(|b| b.expect("batch")).collect();

    assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
    assert_eq!(batches[0][0].title, "Widget 0");
    assert!(batches[0][0].category_ids.contains(&1));
}

#[test]
fn jsonl_source_skips_malformed_lines_and_filters_domain() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(
        dir.join("a.jsonl"),
        "{\"id\":1,\"t\":\"alpha\",\"d\":7}\nnot json\n\n{\"id\":2,\"t\":\"bravo\",\"d\":8}\n{\"id\":3,\"t\":\"charlie\",\"d\":7}\n",
    )
    .unwrap();

    let source = JsonlSource::new(dir);
    let ids: Vec<u64> = source
        .batches(Some(7), 10)
        .expect("batches")
        .flat_map(|b| b.expect("batch"))
        .map(|n| n.id)
        .collect();

    assert_eq!(ids, vec![1, 3]);
}

#[test]
fn jsonl_source_missing_dir_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let source = JsonlSource::new(tmp.path().join("nope"));
    assert!(source.batches(None, 10).is_err());
}

#[test]
fn memory_source_respects_batch_size() {
    let nodes: Vec<Node> = (0..7).map(|i| Node::new(i, format!("term {i}"))).collect();
    let source = MemorySource::new(nodes);
    let sizes: Vec<usize> = source.batches(None, 3).unwrap().map(|b| b.unwrap().len()).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
}

#[test]
fn engine_config_from_toml_layers_defaults() {
    let config = Config::from_toml_str(
        r#"
        [engine]
        storage_dir = "/tmp/termdb-test"
        text_prefix_len = 2

        [engine.search]
        min_candidates = 5
        mode = "exact"
        "#,
    );
    let engine = config.engine().expect("engine config");

    assert_eq!(engine.storage_path(), std::path::PathBuf::from("/tmp/termdb-test"));
    assert_eq!(engine.text_prefix_len, 2);
    assert_eq!(engine.phrase_prefix_len, 4);
    assert_eq!(engine.search.min_candidates, 5);
    assert_eq!(engine.backend().unwrap(), Backend::Shard);
}

#[test]
fn engine_config_without_table_is_default() {
    let engine = Config::from_toml_str("").engine().expect("engine config");
    assert_eq!(engine, EngineConfig::default());
}

#[test]
fn unknown_backend_is_rejected() {
    let engine = EngineConfig { backend: "meilisearch".into(), ..EngineConfig::default() };
    assert!(matches!(engine.validate(), Err(Error::UnsupportedBackend(name)) if name == "meilisearch"));
}

#[test]
fn numeric_prefix_len_is_bounded() {
    let engine = EngineConfig { numeric_prefix_len: 6, ..EngineConfig::default() };
    assert!(matches!(engine.validate(), Err(Error::InvalidConfig(_))));
}

proptest! {
    #[test]
    fn tokens_are_lowercase_alphanumeric(s in "[a-zA-Z0-9 àéÉß,.!?'-]{0,40}") {
        for token in tokenize(&s) {
            prop_assert!(!token.is_empty());
            prop_assert!(token.chars().all(char::is_alphanumeric));
            prop_assert_eq!(token.clone(), token.to_lowercase());
        }
    }

    #[test]
    fn normalize_is_idempotent(s in "[a-zA-Z0-9 ,.'-]{0,40}") {
        let once = normalize(&s);
        prop_assert_eq!(normalize(&once), once);
    }
}
