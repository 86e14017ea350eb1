use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(
    name = "slotwatch",
    version,
    about = "Watches the appointment portal and books earlier slots",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine settings file (TOML); environment variables are used otherwise
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the settings file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch one or more accounts until each books or stops
    Run {
        /// Account files
        #[arg(required = true)]
        accounts: Vec<PathBuf>,

        /// Ask on stdin when a schedule or facility is ambiguous
        #[arg(short, long)]
        interactive: bool,
    },

    /// Log in once and print the current appointment and available dates
    Check {
        /// Account file
        account: PathBuf,

        /// Ask on stdin when a schedule or facility is ambiguous
        #[arg(short, long)]
        interactive: bool,

        /// Number of dates to print
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Write an account file template
    Init {
        /// Output path
        #[arg(default_value = "account.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = commands::load_settings(cli.settings.as_deref())?;
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| settings.logging.format.clone());
    setup_tracing(&format, &settings.logging.level, cli.verbose)?;

    tracing::info!("slotwatch starting");

    match cli.command {
        Commands::Run {
            accounts,
            interactive,
        } => {
            tracing::info!(
                accounts = accounts.len(),
                interactive = %interactive,
                "Starting run command"
            );
            commands::run(settings, accounts, interactive).await?;
        }

        Commands::Check {
            account,
            interactive,
            limit,
        } => {
            tracing::info!(account = %account.display(), "Starting check command");
            commands::check(settings, account, interactive, limit).await?;
        }

        Commands::Init { output, force } => {
            commands::init(&output, force)?;
        }
    }

    tracing::info!("slotwatch finished");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("slotwatch=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("slotwatch={level},warn"))?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
