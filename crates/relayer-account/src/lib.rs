//! The relayer's signing account.
//!
//! The relayer pays native gas for every transaction it submits, so exactly
//! one account is configured. Its wallet is handed to the ledger client,
//! which signs outgoing transactions with it.

use alloy::network::EthereumWallet;
use async_trait::async_trait;
use relayer_types::{Address, ConfigSchema};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Configuration error: {0}")]
	Config(String),
}

#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Schema for this implementation's `[account]` table.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Address the relayer submits transactions from.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Wallet the ledger client signs transactions with.
	fn wallet(&self) -> EthereumWallet;
}

pub struct AccountService {
	provider: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(provider: Box<dyn AccountInterface>) -> Self {
		Self { provider }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.provider.address().await
	}

	pub fn wallet(&self) -> EthereumWallet {
		self.provider.wallet()
	}
}

/// Creates an account from the `[account]` table, selected by `type`.
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	match config.get("type").and_then(|v| v.as_str()) {
		Some("local") => implementations::local::create_account(config),
		Some(other) => Err(AccountError::Config(format!("Unknown account type '{}'", other))),
		None => Err(AccountError::Config("Account type is required".to_string())),
	}
}
