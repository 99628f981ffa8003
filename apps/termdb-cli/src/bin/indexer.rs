use std::env;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use termdb_cli::{engine_config, flag_value, init_logging, parse_number};
use termdb_core::source::JsonlSource;
use termdb_core::types::{DomainId, ShardKind};
use termdb_shard::IndexBuilder;

fn main() -> anyhow::Result<()> {
    init_logging();
    let args: Vec<String> = env::args().skip(1).collect();
    let mut domain: Option<DomainId> = None; let mut index_dir = None; let mut data_dir = None;
    let mut i = 0; while i < args.len() { match args[i].as_str() {
        "--domain" | "-d" => { domain = Some(parse_number(flag_value(&args, i, "--domain"), "--domain")); i += 1; }
        "--index" | "-i" => { index_dir = Some(flag_value(&args, i, "--index").to_string()); i += 1; }
        _ if !args[i].starts_with('-') => data_dir = Some(PathBuf::from(&args[i])),
        other => { eprintln!("Unknown flag: {}", other); std::process::exit(1); } } i += 1; }
    let Some(data_dir) = data_dir else {
        eprintln!("Usage: termdb-indexer [--domain N] [--index DIR] <jsonl dir>");
        std::process::exit(1);
    };

    let config = engine_config(index_dir.as_deref())?;
    println!("termdb indexer\n==============");
    println!("Source: {}", data_dir.display()); println!("Index: {}", config.storage_path().display());
    if let Some(d) = domain { println!("Domain: {}", d); }

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    let progress = pb.clone();
    let builder = IndexBuilder::new(JsonlSource::new(&data_dir), config)?
        .on_batch(move |r| { progress.set_message(format!("{} records, {} nodes, {} skipped", r.records_seen, r.nodes_written, r.records_skipped)); progress.tick(); });
    let (keys, report) = builder.build_with_report(domain)?;
    pb.finish_with_message("indexing completed");

    println!("\n📊 {} nodes written ({} records read, {} skipped)", report.nodes_written, report.records_seen, report.records_skipped);
    for kind in ShardKind::ALL { println!("   {:?}: {} references", kind, report.references(kind)); }
    println!("   {} shards in {:.2?}", keys.len(), report.elapsed);
    println!("\n💡 To search, use: cargo run --bin termdb-search -- '<query>'");
    Ok(())
}
