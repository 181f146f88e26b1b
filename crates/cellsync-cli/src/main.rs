#![forbid(unsafe_code)]

mod cmd;
mod notebook;
mod output;

use std::env;
use std::io;
use std::process;

use cellsync_core::config::resolve_config;
use cellsync_core::{ErrorCode, SyncError};
use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "cellsync: notebook cells kept in sync with a shared document",
    long_about = None
)]
struct Cli {
    /// Output format (overrides FORMAT and the user config).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Notebooks",
        about = "Normalize every cell of a notebook",
        long_about = "Load every cell into the cell model and write it back out: line endings\n\
                      become \\n, the collapsed / jupyter.outputs_hidden pair is reconciled,\n\
                      foreign metadata keys are dropped and non-positive counts become null.",
        after_help = "EXAMPLES:\n    # Print the normalized notebook\n    cellsync normalize analysis.ipynb\n\n\
                      # Rewrite in place\n    cellsync normalize -i analysis.ipynb\n\n\
                      # Fail in CI when a notebook is not normalized\n    cellsync normalize --check analysis.ipynb"
    )]
    Normalize(cmd::normalize::NormalizeArgs),

    #[command(
        next_help_heading = "Notebooks",
        about = "Summarize the cells of a notebook",
        after_help = "EXAMPLES:\n    # One row per cell\n    cellsync inspect analysis.ipynb --format text\n\n\
                      # Only code cells, as JSON\n    cellsync inspect analysis.ipynb --kind code --json"
    )]
    Inspect(cmd::inspect::InspectArgs),

    #[command(next_help_heading = "Testing", about = "Deterministic sync simulation")]
    Sim(cmd::sim::SimArgs),

    #[command(next_help_heading = "Project", about = "Show the effective configuration")]
    Config(cmd::config::ConfigArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CELLSYNC_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "cellsync=debug,info"
        } else {
            "cellsync=info,warn"
        })
    });

    let format = env::var("CELLSYNC_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays parseable.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(io::stderr))
                .init();
        }
    }
}

fn fail(mode: OutputMode, error: &CliError) -> ! {
    let stderr = io::stderr();
    if render_error(&mut stderr.lock(), mode, error).is_err() {
        eprintln!("error: {}", error.message);
    }
    process::exit(1);
}

fn to_cli_error(err: &anyhow::Error) -> CliError {
    let message = format!("{err:#}");
    match err.chain().find_map(|cause| cause.downcast_ref::<SyncError>()) {
        Some(sync) => CliError {
            message,
            ..CliError::from(sync)
        },
        None => CliError::new(message),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let project_root = env::current_dir()?;

    let config = match resolve_config(&project_root, cli.json) {
        Ok(config) => config,
        Err(err) => {
            let mode = cli
                .format
                .unwrap_or(if cli.json { OutputMode::Json } else { OutputMode::Text });
            let code = ErrorCode::ConfigParseError;
            fail(
                mode,
                &CliError::with_details(format!("{err:#}"), code.hint(), code.code()),
            );
        }
    };
    let output = resolve_output_mode(cli.format, &config.resolved_output);
    debug!(?output, root = %project_root.display(), "resolved configuration");

    let result = match &cli.command {
        Commands::Normalize(args) => cmd::normalize::run_normalize(args, &config, output),
        Commands::Inspect(args) => cmd::inspect::run_inspect(args, &config, output),
        Commands::Sim(args) => match &args.command {
            cmd::sim::SimCommand::Run(run) => cmd::sim::run_sim_run(run, &config, output),
            cmd::sim::SimCommand::Replay(replay) => {
                cmd::sim::run_sim_replay(replay, &config, output)
            }
        },
        Commands::Config(args) => cmd::config::run_config(args, &config, output),
    };

    if let Err(err) = result {
        fail(output, &to_cli_error(&err));
    }
    Ok(())
}
