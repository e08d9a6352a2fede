use anyhow::Result;
use clap::{Parser, Subcommand};
use tpo_schemas::Decimal;

mod commands;

#[derive(Parser)]
#[command(name = "tpo")]
#[command(about = "Tokenized pool order tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the backend an order context for this pool would use.
    Route {
        pool_id: String,

        /// Wallet is connected to this EVM chain (omit for the native chain).
        #[arg(long)]
        evm_chain: Option<u64>,

        /// Layered config files (base -> overrides).
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Load layered config, print the config hash and any unused keys.
    Config {
        #[arg(required = true)]
        paths: Vec<String>,

        /// Treat unused keys as an error.
        #[arg(long)]
        fail_on_unused: bool,
    },

    /// Run an invest flow against a paper backend and log every transition.
    /// Needs a build with `--features testkit`.
    Simulate {
        #[arg(long, value_enum)]
        backend: commands::SimBackend,

        #[arg(long)]
        amount: Decimal,

        /// Sign a permit instead of approving (bridge backend only).
        #[arg(long)]
        permit: bool,

        /// Settle the epoch afterwards and collect the tranche tokens.
        #[arg(long)]
        settle: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience: load .env.local if present; ignore if missing.
    let _ = dotenvy::from_filename(".env.local");

    // Logs go to stderr so stdout stays `key=value`.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Route {
            pool_id,
            evm_chain,
            config_paths,
        } => commands::route(&pool_id, evm_chain, &config_paths)?,

        Commands::Config {
            paths,
            fail_on_unused,
        } => commands::config(&paths, fail_on_unused)?,

        Commands::Simulate {
            backend,
            amount,
            permit,
            settle,
        } => commands::simulate(backend, amount, permit, settle).await?,
    }

    Ok(())
}
