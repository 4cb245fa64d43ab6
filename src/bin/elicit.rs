#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use elicit_harness::config::{load_config_from_path, HarnessConfig};
use elicit_harness::evaluation::Evaluation;
use elicit_harness::ratings::{load_ratings, load_users};
use elicit_harness::scenario::{hide_random_pairs, hide_user_pairs};
use elicit_harness::strategy::StrategyKind;

#[derive(Parser)]
#[command(
    name = "elicit",
    version,
    about = "Evaluate pair-selection heuristics against a known rating matrix"
)]
struct Cli {
    /// Selection algorithm
    #[arg(value_enum)]
    algorithm: CliAlgorithm,

    /// JSON array of [user_a, user_b, rating] triples
    ratings: PathBuf,

    /// JSON array of user identifiers
    users: PathBuf,

    /// Number of runs (accepted; a single run is performed)
    #[arg(short = 'n', long, default_value_t = 25)]
    nruns: usize,

    /// Number of ratings to reveal before stopping
    #[arg(short, long)]
    drop: Option<usize>,

    /// Seed for hiding pairs and for the strategy
    #[arg(long)]
    seed: Option<u64>,

    /// Factorization rank (number of clusters)
    #[arg(long)]
    rank: Option<usize>,

    /// Factorization iteration cap
    #[arg(long)]
    max_iter: Option<usize>,

    /// Fraction of distinct pairs hidden at the start
    #[arg(long)]
    hide_fraction: Option<f64>,

    /// Hide pairs of this user only ("new user" scenario)
    #[arg(long, requires = "focus_drop")]
    focus_user: Option<String>,

    /// Number of partners of --focus-user to hide
    #[arg(long, requires = "focus_user")]
    focus_drop: Option<usize>,

    /// Pause between printed values
    #[arg(long, default_value_t = 1000)]
    pause_ms: u64,

    /// Harness config JSON (flags override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the evaluation report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

/// CLI-facing algorithm names (clap::ValueEnum).
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliAlgorithm {
    Rand,
    Clust,
    Est,
    Prob,
}

impl From<CliAlgorithm> for StrategyKind {
    fn from(a: CliAlgorithm) -> Self {
        match a {
            CliAlgorithm::Rand => StrategyKind::Random,
            CliAlgorithm::Clust => StrategyKind::Clustered,
            CliAlgorithm::Est => StrategyKind::MaxGuess,
            CliAlgorithm::Prob => StrategyKind::Probability,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ELICIT_LOG")
        .unwrap_or_else(|_| EnvFilter::new("elicit_harness=info,elicit=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn resolve_config(cli: &Cli) -> Result<HarnessConfig, Box<dyn std::error::Error>> {
    let mut cfg = match &cli.config {
        Some(path) => load_config_from_path(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(seed) = cli.seed {
        cfg.seed = seed;
    }
    if let Some(rank) = cli.rank {
        cfg.factorizer.rank = rank;
    }
    if let Some(max_iter) = cli.max_iter {
        cfg.factorizer.max_iter = max_iter;
    }
    if let Some(fraction) = cli.hide_fraction {
        cfg.hide_fraction = fraction;
    }
    if let Some(target) = cli.drop {
        cfg.evaluation.target = target;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let cfg = resolve_config(&cli)?;
    let kind = StrategyKind::from(cli.algorithm);

    let users = load_users(&cli.users)?;
    let truth = load_ratings(&cli.ratings)?;
    truth.check_users(&users)?;
    tracing::info!(
        algorithm = %kind,
        users = users.len(),
        ratings = truth.len(),
        target = cfg.evaluation.target,
        nruns = cli.nruns,
        seed = cfg.seed,
        "starting evaluation"
    );

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let working = match (&cli.focus_user, cli.focus_drop) {
        (Some(focus), Some(count)) => hide_user_pairs(&truth, &users, focus, count, &mut rng)?,
        _ => hide_random_pairs(&truth, cfg.hide_fraction, &mut rng)?,
    };

    let mut strategy = kind.build(&cfg.factorizer, cfg.seed.wrapping_add(1));
    let mut evaluation = Evaluation::new(
        &truth,
        working,
        &users,
        strategy.as_mut(),
        cfg.evaluation.clone(),
    );

    let pause = Duration::from_millis(cli.pause_ms);
    let stdout = io::stdout();
    for reveal in evaluation.by_ref() {
        let reveal = reveal?;
        let mut out = stdout.lock();
        writeln!(out, "{}", reveal.rating)?;
        out.flush()?;
        if !pause.is_zero() {
            thread::sleep(pause);
        }
    }

    let report = evaluation.into_report();
    match report.mean {
        Some(mean) => println!("Average: {mean:.6}"),
        None => println!("Average: nan"),
    }

    if let Some(path) = &cli.report {
        let mut file = File::create(path)?;
        serde_json::to_writer_pretty(&mut file, &report)?;
        writeln!(file)?;
    }

    Ok(())
}
