use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod catalog;
mod config;
mod crawl;
mod dedup;
mod error;
mod extract;
mod fetch;
mod merge;
mod normalize;
mod package;
mod session;
mod sink;
mod types;
mod utils;

use catalog::{menu_selection, Source, MENU};
use config::{Settings, DEFAULT_CONFIG_FILE};
use fetch::HttpFetcher;
use session::{Session, SourceOverrides, SourceReport};
use utils::osc8_file_link;

#[derive(Parser)]
#[command(name = "douban-movies")]
#[command(about = "Douban movie crawler: Top 250, high-rating and regional lists")]
struct Cli {
    /// Settings file (CONL)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,
    /// Quiet mode - only warnings and errors on stderr
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick sources from a numbered menu (the default)
    Menu,
    /// Crawl the given sources, deduplicating across them
    Crawl {
        #[arg(value_enum, required = true)]
        sources: Vec<SourceArg>,
        /// Maximum pages per source (overrides the settings file)
        #[arg(short, long)]
        pages: Option<u32>,
        /// Skip detail pages and keep list data only
        #[arg(long)]
        no_detail: bool,
    },
    /// Stage CSV files and dataset metadata for upload
    Package {
        /// Staging directory (recreated)
        #[arg(short, long, default_value = "kaggle-upload")]
        output: PathBuf,
    },
    /// Remove the data directory and the response cache
    Clean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    Top250,
    Classic,
    HighRating,
    Chinese,
    Western,
    Japanese,
    Hongkong,
    All,
}

impl SourceArg {
    fn sources(self) -> Vec<Source> {
        match self {
            SourceArg::Top250 => vec![Source::Top250],
            SourceArg::Classic => vec![Source::Classic],
            SourceArg::HighRating => vec![Source::HighRating],
            SourceArg::Chinese => vec![Source::Chinese],
            SourceArg::Western => vec![Source::Western],
            SourceArg::Japanese => vec![Source::Japanese],
            SourceArg::Hongkong => vec![Source::Hongkong],
            SourceArg::All => Source::ALL.to_vec(),
        }
    }
}

/// Expand arguments into sources, first mention wins.
fn resolve_sources(args: &[SourceArg]) -> Vec<Source> {
    let mut sources = Vec::new();
    for source in args.iter().flat_map(|arg| arg.sources()) {
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    sources
}

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn print_report(report: &SourceReport) {
    let spec = report.source.spec();
    let files: Vec<String> = [
        report.targets.jsonl.as_deref(),
        report.json.as_deref(),
        report.targets.csv.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|path| path.exists())
    .map(|path| {
        let ext = path.extension().map_or_else(String::new, |e| e.to_string_lossy().into_owned());
        osc8_file_link(path, &ext)
    })
    .collect();

    if files.is_empty() {
        println!("{}: {} records", spec.label, report.records);
    } else {
        println!("{}: {} records ({})", spec.label, report.records, files.join(" "));
    }
}

fn run_crawl(settings: Settings, sources: &[Source], overrides: SourceOverrides) -> Result<()> {
    let fetcher = HttpFetcher::from_settings(&settings).context("Failed to build HTTP client")?;
    let mut session = Session::new(settings, Box::new(fetcher));

    for &source in sources {
        let report = session
            .run_source(source, &overrides)
            .with_context(|| format!("Failed to save {}", source.spec().label))?;
        print_report(&report);
    }

    if sources.len() > 1 {
        println!("\nDone! {} distinct movies across {} sources", session.seen_count(), sources.len());
    } else {
        println!("\nDone!");
    }
    Ok(())
}

fn run_menu(settings: Settings) -> Result<()> {
    println!("豆瓣电影爬虫");
    for (key, label) in MENU {
        println!("  {}. {}", key, label);
    }
    print!("请选择 (1-7, 默认 1): ");
    io::stdout().flush()?;

    let mut choice = String::new();
    io::stdin().lock().read_line(&mut choice)?;
    let Some(sources) = menu_selection(&choice) else {
        bail!("Invalid choice: {:?}", choice.trim());
    };
    run_crawl(settings, &sources, SourceOverrides::default())
}

fn remove_dir(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path).with_context(|| format!("Failed to remove {}", path.display()))?;
        println!("  Removed {}", path.display());
    }
    Ok(())
}

fn run_clean(settings: &Settings) -> Result<()> {
    println!("Cleaning generated files...");
    remove_dir(&settings.data_dir)?;
    if let Some(cache_dir) = &settings.cache_dir {
        remove_dir(cache_dir)?;
    }
    println!("Clean complete!");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);
    let settings = Settings::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Menu) {
        Commands::Menu => run_menu(settings),
        Commands::Crawl {
            sources,
            pages,
            no_detail,
        } => {
            let overrides = SourceOverrides {
                max_pages: pages,
                fetch_detail: no_detail.then_some(false),
            };
            run_crawl(settings, &resolve_sources(&sources), overrides)
        }
        Commands::Package { output } => package::run_package(&settings.data_dir, &output),
        Commands::Clean => run_clean(&settings),
    }
}
