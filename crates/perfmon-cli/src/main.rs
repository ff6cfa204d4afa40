use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "perfmon",
    about = "perfmon — performance counter poller",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a monitor config and print the resolved measures
    Check {
        /// Path to perfmon.toml
        #[arg(short, long, default_value = "perfmon.toml")]
        config: String,
    },
    /// Run poll cycles against a replayed counter source.
    ///
    /// The replay file scripts raw values, warm-up periods, and failures
    /// per counter. Cycles run at the config's `interval`.
    Poll {
        /// Path to perfmon.toml
        #[arg(short, long, default_value = "perfmon.toml")]
        config: String,
        /// Path to the counter replay file
        #[arg(short, long)]
        replay: String,
        /// Number of cycles to run (0 = until Ctrl-C)
        #[arg(short = 'n', long, default_value = "1")]
        cycles: u64,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("perfmon=info,perfmon_query=info,perfmon_agent=info")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => commands::check::check(&config),
        Commands::Poll {
            config,
            replay,
            cycles,
            format,
        } => commands::poll::poll(&config, &replay, cycles, &format),
    }
}
