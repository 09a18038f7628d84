//! Configuration loading for the gas relayer.
//!
//! A TOML file is read, `${VAR}` references are substituted from the
//! environment, `RELAYER_`-prefixed overrides are applied and the result is
//! checked for consistency before anything is built from it.

use regex::Regex;
use relayer_types::{Address, StrategyKind, Topic};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

mod serde_helpers;
mod types;

pub use serde_helpers::{deserialize_address_map, deserialize_u256};
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "RELAYER_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	/// Reads, substitutes, overrides and validates the configured file.
	pub async fn load(&self) -> Result<Config, ConfigError> {
		let file_path = self
			.file_path
			.as_ref()
			.ok_or_else(|| ConfigError::FileNotFound("No configuration file specified".to_string()))?;

		if !Path::new(file_path).exists() {
			return Err(ConfigError::FileNotFound(file_path.clone()));
		}

		let content = tokio::fs::read_to_string(file_path).await?;
		self.load_str(&content)
	}

	/// Same as [`ConfigLoader::load`] for in-memory TOML.
	pub fn load_str(&self, content: &str) -> Result<Config, ConfigError> {
		let substituted = substitute_env_vars(content)?;

		let mut config: Config =
			toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?;

		self.apply_env_overrides(&mut config);
		validate_config(&config)?;

		Ok(config)
	}

	fn apply_env_overrides(&self, config: &mut Config) {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			debug!("Overriding log level from environment");
			config.relayer.log_level = log_level;
		}

		if let Ok(rpc_url) = env::var(format!("{}RPC_URL", self.env_prefix)) {
			debug!("Overriding ledger RPC URL from environment");
			config
				.ledger
				.settings
				.insert("rpc_url".to_string(), toml::Value::String(rpc_url));
		}

		if let Ok(key) = env::var(format!("{}PRIVATE_KEY", self.env_prefix)) {
			debug!("Overriding private key from environment");
			config
				.account
				.settings
				.insert("private_key".to_string(), toml::Value::String(key));
		}
	}
}

/// Replaces every `${VAR_NAME}` with the variable's value.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;
	let mut result = content.to_string();

	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

		result = result.replace(full_match, &env_value);
	}

	Ok(result)
}

fn invalid(message: impl Into<String>) -> ConfigError {
	ConfigError::ValidationError(message.into())
}

/// Cross-field checks that serde cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
	if config.relayer.name.is_empty() {
		return Err(invalid("relayer.name cannot be empty"));
	}

	if config.relayer.dedup_purge_interval_secs == 0 {
		return Err(invalid("relayer.dedup_purge_interval_secs must be greater than zero"));
	}

	if config.tokens.is_empty() {
		return Err(invalid("At least one token must be configured"));
	}

	if config.contracts.is_empty() {
		return Err(invalid("At least one contract must be configured"));
	}

	for (address, token) in &config.tokens {
		let native = *address == Address::ZERO;
		match (&token.price_plugin, native) {
			(Some(_), true) => {
				return Err(invalid(format!(
					"Native token {} cannot have a price plugin",
					token.symbol
				)))
			}
			(None, false) => {
				return Err(invalid(format!(
					"Token {} ({}) requires a price plugin",
					token.symbol, address
				)))
			}
			(Some(plugin), false) if plugin.get("type").and_then(|t| t.as_str()).is_none() => {
				return Err(invalid(format!(
					"Price plugin of token {} is missing 'type'",
					token.symbol
				)))
			}
			_ => {}
		}
		if token.decimals > 77 {
			return Err(invalid(format!(
				"Token {} has {} decimals, more than a 256-bit amount can scale",
				token.symbol, token.decimals
			)));
		}
	}

	let mut topics: HashMap<Topic, &str> = HashMap::new();
	for (name, contract) in &config.contracts {
		let topic = Topic::from_name(name);
		if let Some(other) = topics.insert(topic, name) {
			return Err(invalid(format!(
				"Contracts '{}' and '{}' share topic {}",
				other, name, topic
			)));
		}

		if contract.allowed_functions.is_empty() {
			return Err(invalid(format!("Contract '{}' allows no functions", name)));
		}

		let identity = contract.identity_kind();
		if identity != (contract.strategy == StrategyKind::Identity) {
			return Err(invalid(format!(
				"Contract '{}' sets is_identity = {} with strategy '{}'",
				name, identity, contract.strategy
			)));
		}

		if identity {
			if contract.factory_address.is_none() {
				return Err(invalid(format!("Identity contract '{}' requires factory_address", name)));
			}
			if contract.kernel_verification.is_none() {
				return Err(invalid(format!(
					"Identity contract '{}' requires kernel_verification",
					name
				)));
			}
		} else if contract.address.is_none() {
			return Err(invalid(format!("Contract '{}' requires address", name)));
		}

		if contract.gas_margin() > 100 {
			return Err(invalid(format!(
				"Contract '{}' gas_margin_percent must be at most 100",
				name
			)));
		}
	}

	Ok(())
}
