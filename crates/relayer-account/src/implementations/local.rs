//! Local private key wallet.

use crate::{AccountError, AccountInterface};
use alloy::network::EthereumWallet;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use relayer_types::{Address, ConfigSchema, Field, FieldType, Schema, ValidationError};

/// Wallet holding the relayer's private key in memory.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Creates a wallet from a hex-encoded private key, with or without `0x`.
	pub fn new(private_key_hex: &str) -> Result<Self, AccountError> {
		let signer = private_key_hex
			.parse::<PrivateKeySigner>()
			.map_err(|e| AccountError::InvalidKey(format!("Invalid private key: {}", e)))?;

		Ok(Self { signer })
	}
}

pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("private_key", FieldType::String).with_validator(|value| {
				let key = value.as_str().unwrap_or_default();
				let key_without_prefix = key.strip_prefix("0x").unwrap_or(key);

				if key_without_prefix.len() != 64 {
					return Err("Private key must be 64 hex characters (32 bytes)".to_string());
				}

				if hex::decode(key_without_prefix).is_err() {
					return Err("Private key must be valid hexadecimal".to_string());
				}

				Ok(())
			})],
			vec![],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalWalletSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	fn wallet(&self) -> EthereumWallet {
		EthereumWallet::from(self.signer.clone())
	}
}

/// Creates a local wallet from an `[account]` table with a `private_key`.
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalWalletSchema
		.validate(config)
		.map_err(|e| AccountError::Config(e.to_string()))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::Config("private_key is required for local wallet".to_string()))?;

	Ok(Box::new(LocalWallet::new(private_key)?))
}
