//! cs: search code across the configured backends
//!
//! This is the main entry point for the application.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use codesearch_rs::{
    config::{self, SearchSettings, Settings},
    engines::BackendLoader,
    index::TrigramIndex,
    network::HttpClient,
    Search, SearchOptions, SearchQuery, SearchResult,
};
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cs", author, version, about = "Search code across GitHub, GitLab and local indexes")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print debug messages
    #[arg(short, long, global = true, env = "CODESEARCH_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search code in the configured backends
    Search(SearchArgs),
    /// Build a local trigram index for the csearch backend
    Index(IndexArgs),
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Comma-separated backend names, "all" for every backend. Overrides
    /// `default_backends`.
    #[arg(short, long, value_delimiter = ',')]
    backends: Vec<String>,

    /// Print per-backend stats
    #[arg(short = 'S', long)]
    stats: bool,

    /// Search only in file names
    #[arg(short = 'F', long = "search-in-filenames")]
    filenames: bool,

    /// Show only results from files whose path contains PATTERN
    #[arg(short = 'f', long = "match-filename", value_name = "PATTERN")]
    match_filename: Option<String>,

    /// Lines of context after each match
    #[arg(short = 'A', long = "after-context", value_name = "N")]
    after: Option<usize>,

    /// Lines of context before each match
    #[arg(short = 'B', long = "before-context", value_name = "N")]
    before: Option<usize>,

    /// Lines of context before and after each match
    #[arg(short = 'C', long = "context", value_name = "N")]
    context: Option<usize>,

    /// Case-insensitive search, where the backend supports it
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Search terms, joined with spaces
    #[arg(required = true)]
    terms: Vec<String>,
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Index file to write
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Directories to index
    #[arg(required = true)]
    dirs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    debug!("cs v{}: {:?}", codesearch_rs::VERSION, cli.command);

    match cli.command {
        Command::Search(args) => {
            let settings = config::load(cli.config).context("failed to load configuration")?;
            run_search(&settings, &args).await
        }
        Command::Index(args) => run_index(&args),
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Command line flags win over the `search` section of the settings
fn search_options(defaults: &SearchSettings, args: &SearchArgs) -> SearchOptions {
    let before = args.before.or(args.context).unwrap_or(defaults.lines_before);
    let after = args.after.or(args.context).unwrap_or(defaults.lines_after);
    SearchOptions::new()
        .with_lines_before(before)
        .with_lines_after(after)
        .case_insensitive(args.ignore_case || defaults.case_insensitive)
        .filenames_only(args.filenames)
}

async fn run_search(settings: &Settings, args: &SearchArgs) -> Result<()> {
    let names = settings.resolve_backends(&args.backends)?;
    let client = HttpClient::with_settings(&settings.outgoing)?;
    let registry = BackendLoader::load(settings, &names, &client)?;

    let text = args.terms.join(" ");
    println!("Searching {:?} on {:?}", text, names);

    let query = SearchQuery::new(&text, names).with_options(search_options(&settings.search, args));
    let search = Search::new(Arc::new(registry));
    let container = search.execute(&query).await?;

    let path_filter = args.match_filename.as_deref().map(str::to_lowercase);
    let mut shown: HashMap<&str, usize> = HashMap::new();
    for result in container.results() {
        if !wanted(result, args.filenames, path_filter.as_deref()) {
            continue;
        }
        print_result(result);
        *shown.entry(result.backend.as_str()).or_default() += 1;
    }

    if args.stats {
        for timing in container.timings() {
            println!(
                "Got {} results on {:?} in {} ms",
                shown.get(timing.backend.as_str()).copied().unwrap_or(0),
                timing.backend,
                timing.time_ms()
            );
        }
    }
    println!(
        "Got {} total results in {:?}",
        shown.values().sum::<usize>(),
        container.total_duration()
    );
    Ok(())
}

fn wanted(result: &SearchResult, filenames: bool, path_filter: Option<&str>) -> bool {
    if filenames {
        return result.is_filename;
    }
    path_filter.map_or(true, |pattern| result.path.to_lowercase().contains(pattern))
}

fn print_result(result: &SearchResult) {
    let repo = if result.owner.is_empty() {
        result.repo_name.clone()
    } else {
        format!("{}/{}", result.owner, result.repo_name)
    };
    let mut header = format!(
        "{}:{}:{}",
        result.backend,
        link(&result.repo_url, &repo).as_str().bold(),
        link(&result.file_url, &result.path).as_str().bold()
    );
    if !result.branch.is_empty() {
        header.push_str(&format!(" ({})", result.branch.as_str().bold()));
    }
    println!("{}", header);

    if result.is_filename {
        println!();
        return;
    }

    let first = result.lineno.saturating_sub(result.context.before.len());
    for (i, line) in result.context.before.iter().enumerate() {
        println!("{}- {}", (first + i).to_string().green(), line.as_str().dimmed());
    }

    let line = &result.line;
    let (start, end) = (result.highlight.start, result.highlight.end);
    println!(
        "{}: {}{}{}",
        result.lineno.to_string().green().bold(),
        line.get(..start).unwrap_or_default(),
        line.get(start..end).unwrap_or_default().red().bold(),
        line.get(end..).unwrap_or_default()
    );

    for (i, line) in result.context.after.iter().enumerate() {
        println!(
            "{}- {}",
            (result.lineno + i + 1).to_string().green(),
            line.as_str().dimmed()
        );
    }
    println!();
}

/// Terminal hyperlink (OSC 8)
fn link(url: &str, text: &str) -> String {
    if url.is_empty() {
        return text.to_string();
    }
    format!("\x1b]8;;{}\x1b\\{}\x1b]8;;\x1b\\", url, text)
}

fn run_index(args: &IndexArgs) -> Result<()> {
    let index = TrigramIndex::build(&args.dirs).context("failed to build index")?;
    index
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!(
        "Indexed {} files under {} roots into {}",
        index.len(),
        args.dirs.len(),
        args.output.display()
    );
    Ok(())
}
