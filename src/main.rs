use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;
use tracing_subscriber::EnvFilter;

use gocallgraph::config::{parse_ignore_paths, Algorithm, AnalysisConfig, FileConfig};
use gocallgraph::core::{CallGraphAnalyzer, ProgressPrinter, ProgressReporter};
use gocallgraph::formatters::JsonCompactFormatter;
use gocallgraph::storage::SqliteStore;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "gocallgraph",
    version = "0.1.0",
    author = "gocallgraph developers",
    about = "Build the call graph of a Go module and store it in SQLite"
)]
struct Cli {
    /// Directory to analyze; must be inside a Go module
    #[arg(short, long, value_name = "PATH")]
    dir: Option<PathBuf>,

    /// Call graph algorithm: static, cha, rta, vta
    #[arg(short, long, value_name = "ALGO")]
    algo: Option<String>,

    /// Comma-separated prefixes of qualified names to leave out
    #[arg(short, long, value_name = "PREFIXES")]
    ignore: Option<String>,

    /// SQLite database file
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Also write the filtered graph as JSON
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// TOML configuration file; flags take precedence
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Capacity of the node and edge channels; 0 means unbounded
    #[arg(long, value_name = "N")]
    capacity: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FileConfig::default(),
    };

    let root = cli
        .dir
        .or(file.root)
        .unwrap_or_else(|| PathBuf::from("."));
    let algorithm: Algorithm = cli
        .algo
        .or(file.algo)
        .unwrap_or_else(|| Algorithm::Vta.to_string())
        .parse()?;
    let ignore = parse_ignore_paths(&cli.ignore.or(file.ignore).unwrap_or_default());
    let capacity = cli
        .capacity
        .or(file.channel_capacity)
        .unwrap_or(gocallgraph::config::DEFAULT_CHANNEL_CAPACITY);
    let database = cli
        .db
        .or(file.database)
        .unwrap_or_else(|| PathBuf::from("callgraph.db"));
    let output = cli.output.or(file.output);

    println!("gocallgraph - Go call graph extraction");
    println!("Root: {}", root.display());
    println!("Algorithm: {algorithm}");
    println!("Database: {}", database.display());
    if !ignore.is_empty() {
        println!("Ignoring: {}", ignore.join(", "));
    }

    let start_time = Instant::now();

    let (tx, rx) = crossbeam_channel::unbounded::<Vec<u8>>();
    let printer = ProgressPrinter::spawn(rx, std::io::stdout());

    let config = AnalysisConfig::new(root, algorithm)
        .with_ignore_paths(ignore)
        .with_channel_capacity(Some(capacity));
    let store = Arc::new(
        SqliteStore::open(&database)
            .with_context(|| format!("opening database {}", database.display()))?,
    );
    let analyzer = CallGraphAnalyzer::new(config).with_reporter(ProgressReporter::new(tx));
    let result = analyzer.build_and_persist(store);

    drop(analyzer);
    if let Err(err) = printer.finish() {
        error!("{err:#}");
    }
    let summary = result?;

    if let Some(output) = output {
        JsonCompactFormatter::new().format_to_file(&summary.graph, &output)?;
        println!("JSON output: {}", output.display());
    }

    println!(
        "Saved {} nodes and {} edges in {:.2}s",
        summary.persisted.nodes_saved,
        summary.persisted.edges_saved,
        start_time.elapsed().as_secs_f64()
    );
    if summary.persisted.node_errors + summary.persisted.edge_errors > 0 {
        println!(
            "Skipped {} nodes and {} edges that could not be saved",
            summary.persisted.node_errors, summary.persisted.edge_errors
        );
    }
    Ok(())
}
