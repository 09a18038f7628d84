use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relayer_config::{Config, ConfigLoader};
use relayer_core::{ExitReason, RelayerBuilder};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gas-relayer")]
#[command(about = "Gas relayer for identity and token controller meta-transactions", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/relayer.toml")]
	config: PathBuf,

	#[arg(long, env = "RELAYER_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start relaying
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_relayer(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn load_config(cli: &Cli) -> Result<Config> {
	info!(path = %cli.config.display(), "Loading configuration");
	ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")
}

async fn start_relayer(cli: Cli) -> Result<()> {
	let config = load_config(&cli).await?;
	info!(name = %config.relayer.name, "Starting gas relayer");

	let engine = RelayerBuilder::new(config)
		.with_account_factory(relayer_account::create_account)
		.with_ledger_factory(relayer_ledger::create_ledger)
		.with_transport_factory(relayer_transport::create_transport)
		.build()
		.await
		.context("Failed to start relayer")?;

	let reason = engine
		.run(setup_shutdown_signal())
		.await
		.context("Relayer stopped with an error")?;

	match reason {
		ExitReason::Shutdown => info!("Gas relayer stopped"),
		ExitReason::BalanceExhausted => {
			error!(relayer = %engine.relayer_address(), "Gas relayer stopped: balance exhausted")
		}
	}
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	let config = load_config(&cli).await?;

	info!("Configuration is valid");
	info!(name = %config.relayer.name, min_balance = %config.relayer.min_balance, "Relayer settings");
	for (address, token) in &config.tokens {
		info!("  Token: {} ({})", token.symbol, address);
	}
	for (name, contract) in &config.contracts {
		info!(
			"  Contract: {} ({}, {} allowed functions)",
			name,
			contract.strategy,
			contract.allowed_functions.len()
		);
	}

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
		.context("Invalid log level")?;

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			warn!(error = %e, "Failed to listen for Ctrl+C");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			}
			Err(e) => {
				warn!(error = %e, "Failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
