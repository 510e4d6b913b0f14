//! CLI for dishstat: poll a satellite dish and record its telemetry as CSV.

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dishstat_core::Mode;

use commands::control::Action;

#[derive(Parser)]
#[command(name = "dishstat")]
#[command(about = "dishstat: satellite dish status and history statistics collector")]
#[command(version = dishstat_core::VERSION)]
struct Cli {
    /// Dish address as host:port
    #[arg(long, short = 'g', global = true)]
    target: Option<String>,

    /// Serve dish replies from a recorded JSON capture
    #[arg(long, global = true)]
    replay: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the selected data groups and print them as CSV.
    /// Modes: status, obstruction_detail, alert_detail, location, ping_drop,
    /// ping_run_length, ping_latency, ping_loaded_latency, usage, bulk_history
    Poll {
        /// Data groups to record
        modes: Vec<Mode>,

        /// Seconds between polls; 0 polls once
        #[arg(long, short = 't')]
        loop_interval: Option<f64>,

        /// Polls merged into one history statistics record
        #[arg(long, short = 'o')]
        poll_loops: Option<u32>,

        /// Number of history samples to read when no resume counter is known
        #[arg(long, short = 's', conflicts_with = "all_samples")]
        samples: Option<u64>,

        /// Read every sample the dish holds when no resume counter is known
        #[arg(long, short = 'a')]
        all_samples: bool,

        /// Do not resume each history read at the previous sample counter
        #[arg(long, short = 'j')]
        no_counter: bool,

        /// Print booleans as 1 and 0
        #[arg(long, short = 'N')]
        numeric: bool,

        /// Print labelled text instead of CSV and log progress
        #[arg(long, short = 'v')]
        verbose: bool,

        /// Append to this file instead of stdout; also the resume counter source
        #[arg(long, short = 'O')]
        out_file: Option<PathBuf>,

        /// Do not read the resume counter from the output file
        #[arg(long, short = 'k')]
        skip_query: bool,

        /// JSON configuration file; command-line flags take precedence
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the CSV header for the selected modes
    Header {
        /// Data groups to include
        #[arg(required = true)]
        modes: Vec<Mode>,

        /// Append to this file instead of stdout
        #[arg(long, short = 'O')]
        out_file: Option<PathBuf>,
    },

    /// Print the obstruction SNR map as CSV, one line per row
    ObstructionMap {
        /// Write to this file instead of stdout
        #[arg(long, short = 'O')]
        out_file: Option<PathBuf>,
    },

    /// Reboot the dish
    Reboot,

    /// Stow the dish
    Stow,

    /// Unstow the dish
    Unstow,

    /// Set the daily power-save window
    Sleep {
        /// Window start, in minutes past midnight
        start: u32,

        /// Window length in minutes
        duration: u32,

        /// Disable power save instead
        #[arg(long)]
        disable: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(matches!(cli.command, Commands::Poll { verbose: true, .. }));

    let target = cli.target.as_deref();
    let replay = cli.replay.as_deref();

    match cli.command {
        Commands::Poll {
            modes,
            loop_interval,
            poll_loops,
            samples,
            all_samples,
            no_counter,
            numeric,
            verbose,
            out_file,
            skip_query,
            config,
        } => commands::poll::run(commands::poll::PollCommandConfig {
            modes,
            target,
            replay,
            config_path: config.as_deref(),
            loop_interval,
            poll_loops,
            samples,
            all_samples,
            no_counter,
            numeric,
            verbose,
            out_file,
            skip_query,
        }),
        Commands::Header { modes, out_file } => commands::header::run(&modes, out_file.as_deref()),
        Commands::ObstructionMap { out_file } => {
            commands::map::run(target, replay, out_file.as_deref())
        }
        Commands::Reboot => commands::control::run(Action::Reboot, target, replay),
        Commands::Stow => commands::control::run(Action::Stow, target, replay),
        Commands::Unstow => commands::control::run(Action::Unstow, target, replay),
        Commands::Sleep {
            start,
            duration,
            disable,
        } => commands::control::run(
            Action::Sleep {
                start_minutes: start,
                duration_minutes: duration,
                enable: !disable,
            },
            target,
            replay,
        ),
    }
}
