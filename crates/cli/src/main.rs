mod display;

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chessgraph_core::oracle::{ExplorerDatabase, ExplorerOptions, UciOptions};
use chessgraph_core::position::START_FEN;
use chessgraph_core::render::{self, OutputFormat};
use chessgraph_core::{
    CachedOracle, ExploreOptions, ExploreProgress, Explorer, GamePosition, KeyMode, OracleCache, OracleConfig, SearchWindow,
};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// chessdb.cn position database
    Chessdb,
    /// Lichess opening explorer
    Explorer,
    /// Local UCI engine
    Engine,
}

/// Draws the graph of strong moves around a chess position.
#[derive(Parser, Debug)]
#[command(name = "chessgraph", version)]
struct Cli {
    /// FEN of the starting position
    #[arg(long, default_value = START_FEN)]
    position: String,

    /// Maximum depth (in plies) of a followed variation
    #[arg(long, default_value_t = 6)]
    depth: i32,

    /// Lower bound on the score of variations to be followed
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    alpha: i32,

    /// Upper bound on the score of variations to be followed
    #[arg(long, default_value_t = 15, allow_negative_numbers = true)]
    beta: i32,

    /// Workers per depth level [default: number of CPUs]
    #[arg(long)]
    concurrency: Option<usize>,

    /// Concurrent oracle queries
    #[arg(long, default_value_t = 4)]
    oracle_concurrency: usize,

    #[arg(long, value_enum, default_value_t = Backend::Chessdb)]
    backend: Backend,

    /// Engine command line, for the engine backend
    #[arg(long, default_value = "stockfish")]
    engine: String,

    /// Search depth of the engine
    #[arg(long, default_value_t = 20)]
    engine_depth: u32,

    /// Number of principal variations requested from the engine
    #[arg(long, default_value_t = 5)]
    multipv: u32,

    /// Seconds allowed for one engine search
    #[arg(long, default_value_t = 120)]
    engine_timeout: u64,

    /// Explorer database (lichess or masters)
    #[arg(long, default_value = "lichess")]
    explorer_db: ExplorerDatabase,

    /// Minimum number of games for an explorer move
    #[arg(long, default_value_t = 10)]
    min_games: u64,

    /// Explorer speed filter, e.g. "blitz,rapid"
    #[arg(long)]
    explorer_speeds: Option<String>,

    /// Explorer rating filter, e.g. "2000,2200"
    #[arg(long)]
    explorer_ratings: Option<String>,

    /// Node identity: merged (graph) or path (tree)
    #[arg(long, default_value = "merged")]
    key_mode: KeyMode,

    /// Number of shown moves from which a node displays its board
    #[arg(long, default_value_t = 3)]
    board_threshold: usize,

    /// Persistent oracle cache
    #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    cache_file: Option<PathBuf>,

    /// Output file [default: stdout]
    #[arg(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Output format (dot, svg, png, pdf); anything but dot needs Graphviz
    #[arg(long, default_value = "dot")]
    format: OutputFormat,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Hide progress and summary
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn explore_options(&self) -> ExploreOptions {
        let defaults = ExploreOptions::default();
        ExploreOptions {
            max_depth: self.depth,
            window: SearchWindow::new(self.alpha, self.beta),
            key_mode: self.key_mode,
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            oracle_concurrency: self.oracle_concurrency,
            board_threshold: self.board_threshold,
        }
    }

    fn oracle_config(&self) -> OracleConfig {
        match self.backend {
            Backend::Chessdb => OracleConfig::ChessDb,
            Backend::Explorer => OracleConfig::Explorer(ExplorerOptions {
                database: self.explorer_db,
                min_games: self.min_games,
                speeds: self.explorer_speeds.clone(),
                ratings: self.explorer_ratings.clone(),
                ..ExplorerOptions::default()
            }),
            Backend::Engine => OracleConfig::Engine(UciOptions {
                command: self.engine.clone(),
                depth: self.engine_depth,
                multipv: self.multipv,
                search_timeout: Duration::from_secs(self.engine_timeout),
            }),
        }
    }
}

fn init_tracing(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let root = GamePosition::from_fen(&cli.position)?;
    let options = cli.explore_options();
    options.validate()?;

    let cache = match &cli.cache_file {
        Some(path) => OracleCache::load(path)?,
        None => OracleCache::new(),
    };
    let cache = Arc::new(cache);

    let oracle = cli.oracle_config().build()?;
    let oracle = CachedOracle::new(oracle, Arc::clone(&cache));

    let spinner = display::create_spinner(cli.quiet);
    let progress = spinner.clone();
    let explorer = Explorer::new(options, oracle)?
        .with_progress(Arc::new(move |p: ExploreProgress| display::update_spinner(&progress, p)));

    let exploration = explorer.explore(root);
    spinner.finish_and_clear();

    if let Some(path) = &cli.cache_file {
        cache.save(path)?;
    }

    match &cli.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            render::render(&exploration.graph, cli.format, &mut BufWriter::new(file))?;
            info!(path = %path.display(), format = %cli.format, "graph written");
        }
        None => render::render(&exploration.graph, cli.format, &mut io::stdout().lock())?,
    }

    if !cli.quiet {
        display::print_summary(&exploration.stats, explorer.oracle().name(), cache.len());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
