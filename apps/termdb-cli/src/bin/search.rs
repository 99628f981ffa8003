use std::env;

use termdb_cli::{engine_config, flag_value, init_logging, parse_number};
use termdb_core::options::{ReturnShape, SortMode};
use termdb_core::types::DomainId;
use termdb_query::{QueryEngine, QueryKind};

fn main() -> anyhow::Result<()> {
    init_logging();
    let args: Vec<String> = env::args().skip(1).collect();
    let mut domain: Option<DomainId> = None; let mut index_dir = None; let mut limit = None;
    let mut kind = QueryKind::Search; let mut nodes = false; let mut exact = false; let mut words = Vec::new();
    let mut i = 0; while i < args.len() { match args[i].as_str() {
        "--domain" | "-d" => { domain = Some(parse_number(flag_value(&args, i, "--domain"), "--domain")); i += 1; }
        "--index" | "-i" => { index_dir = Some(flag_value(&args, i, "--index").to_string()); i += 1; }
        "--limit" | "-n" => { limit = Some(parse_number::<usize>(flag_value(&args, i, "--limit"), "--limit")); i += 1; }
        "--autocomplete" | "-a" => kind = QueryKind::Autocomplete,
        "--nodes" => nodes = true,
        "--exact" => exact = true,
        _ if !args[i].starts_with('-') => words.push(args[i].clone()),
        other => { eprintln!("Unknown flag: {}", other); std::process::exit(1); } } i += 1; }
    if words.is_empty() {
        eprintln!("Usage: termdb-search [--domain N] [--autocomplete] [--nodes] [--exact] [--limit N] [--index DIR] <query>");
        eprintln!("Example: termdb-search --limit 5 'blu widget'");
        std::process::exit(1);
    }
    let query = words.join(" ");

    let config = engine_config(index_dir.as_deref())?;
    let mut options = config.search.clone();
    if let Some(n) = limit { options.limit = Some(n); }
    if nodes { options.return_shape = ReturnShape::Nodes; }
    if exact { options.mode = SortMode::Exact; }

    let engine = QueryEngine::new(config)?;
    let (matches, stats) = engine.search_matches(&query, domain, &options, kind)?;
    println!("🔍 Found {} results for: \"{}\"", matches.len(), query);
    for (i, m) in matches.iter().enumerate() {
        if options.return_shape == ReturnShape::Nodes {
            println!("  {}. score={:.2}  {}", i + 1, m.score, serde_json::to_string(&m.node)?);
        } else {
            println!("  {}. score={:.2}  id={}  title={}", i + 1, m.score, m.id, m.node.title);
        }
    }
    tracing::debug!(?stats, "query stats");
    Ok(())
}

