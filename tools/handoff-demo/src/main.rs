///
/// handoff CLI - runs the concurrency demonstrations
///
/// - handoff race: lost updates versus a monitor-guarded counter
/// - handoff reentrant: nested acquisition and refused releases
/// - handoff exchange: frame handoff through a single slot
/// - handoff visibility: publishing writes through a flag
/// - handoff stop: cooperative stop of a polling worker
/// - handoff tasks: pooled tasks versus platform threads
/// - handoff all: every demo in sequence
///
/// Exits 1 when a demo errors and 2 when a demonstrated property did not hold.
///

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::Level;

use handoff_demo::demos::{exchange, race, reentrant, stop, tasks, visibility};
use handoff_demo::{parse_config, render_json, render_text, run_all, DemoConfig, DemoError, Report};

#[derive(Parser)]
#[command(name = "handoff")]
#[command(author, version, about = "Shared-memory concurrency demonstrations", long_about = None)]
struct Cli {
    /// Read demo settings from a TOML file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    format: Format,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Increment an unguarded and a guarded counter from several threads
    Race {
        /// Number of incrementing threads
        #[arg(long)]
        workers: Option<usize>,

        /// Increments per thread
        #[arg(long)]
        increments: Option<u64>,
    },

    /// Acquire a monitor reentrantly and release it wrongly
    Reentrant,

    /// Hand numbered frames from a producer to a consumer
    Exchange {
        /// Number of frames to hand off
        #[arg(long)]
        frames: Option<u64>,
    },

    /// Publish multi-field values through a flag and a synchronized cell
    Visibility {
        /// Number of publish rounds
        #[arg(long)]
        rounds: Option<u64>,
    },

    /// Stop a polling worker cooperatively
    Stop {
        /// Worker poll period in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,

        /// How long the worker runs before the stop request, in milliseconds
        #[arg(long)]
        run_ms: Option<u64>,

        /// How long to wait for the worker to stop, in milliseconds
        #[arg(long)]
        await_ms: Option<u64>,
    },

    /// Run many small tasks on a pool and on platform threads
    Tasks {
        /// Tasks queued on the pool
        #[arg(long)]
        tasks: Option<u64>,

        /// Tasks run on their own OS thread
        #[arg(long)]
        threads: Option<u64>,

        /// Pool worker threads (defaults to CPU cores)
        #[arg(long)]
        pool_workers: Option<usize>,
    },

    /// Run every demo in sequence
    All,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(level)
        .init();
}

/// Returns whether every demonstrated property held.
fn run(cli: Cli) -> Result<bool, DemoError> {
    let mut config = match &cli.config {
        Some(path) => parse_config(path)?,
        None => DemoConfig::default(),
    };
    apply_overrides(&mut config, &cli.command);
    config.validate()?;

    let reports = run_command(&cli.command, &config)?;

    let output = match cli.format {
        Format::Text => render_text(&reports),
        Format::Json => render_json(&reports)?,
    };
    println!("{}", output.trim_end());

    Ok(reports.iter().all(|r| r.passed))
}

fn apply_overrides(config: &mut DemoConfig, command: &Commands) {
    match command {
        Commands::Race { workers, increments } => {
            override_with(&mut config.race.workers, *workers);
            override_with(&mut config.race.increments, *increments);
        }
        Commands::Exchange { frames } => {
            override_with(&mut config.exchange.frames, *frames);
        }
        Commands::Visibility { rounds } => {
            override_with(&mut config.visibility.rounds, *rounds);
        }
        Commands::Stop {
            poll_ms,
            run_ms,
            await_ms,
        } => {
            override_with(&mut config.stop.poll_ms, *poll_ms);
            override_with(&mut config.stop.run_ms, *run_ms);
            override_with(&mut config.stop.await_ms, *await_ms);
        }
        Commands::Tasks {
            tasks,
            threads,
            pool_workers,
        } => {
            override_with(&mut config.tasks.tasks, *tasks);
            override_with(&mut config.tasks.platform_threads, *threads);
            if pool_workers.is_some() {
                config.tasks.pool_workers = *pool_workers;
            }
        }
        Commands::Reentrant | Commands::All => {}
    }
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn run_command(command: &Commands, config: &DemoConfig) -> Result<Vec<Report>, DemoError> {
    let report = match command {
        Commands::Race { .. } => race::run(&config.race, config.wait)?,
        Commands::Reentrant => reentrant::run()?,
        Commands::Exchange { .. } => exchange::run(&config.exchange, config.wait)?,
        Commands::Visibility { .. } => visibility::run(&config.visibility, config.wait)?,
        Commands::Stop { .. } => stop::run(&config.stop, config.wait)?,
        Commands::Tasks { .. } => tasks::run(&config.tasks, config.wait)?,
        Commands::All => return run_all(config),
    };
    Ok(vec![report])
}
