//! Configuration structures for the relayer and its collaborators.

use crate::serde_helpers::{deserialize_address_map, deserialize_u256};
use relayer_types::{Address, StrategyKind, U256};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration object.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub relayer: RelayerSettings,
	/// Signing key configuration, handed to the account factory.
	pub account: ImplementationConfig,
	/// Ledger client configuration, handed to the ledger factory.
	pub ledger: ImplementationConfig,
	/// Pub/sub transport configuration, handed to the transport factory.
	pub transport: ImplementationConfig,
	#[serde(default)]
	pub gas_price: GasPriceConfig,
	/// Accepted fee tokens keyed by token address. The zero address is the
	/// native currency.
	#[serde(deserialize_with = "deserialize_address_map")]
	pub tokens: BTreeMap<Address, TokenConfig>,
	/// Relayable contracts keyed by name. The name determines the topic.
	pub contracts: BTreeMap<String, ContractConfig>,
}

/// Core relayer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayerSettings {
	pub name: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	/// Native balance floor below which the relayer stops serving requests.
	#[serde(deserialize_with = "deserialize_u256")]
	pub min_balance: U256,
	#[serde(default = "default_dedup_retention_secs")]
	pub dedup_retention_secs: u64,
	#[serde(default = "default_dedup_purge_interval_secs")]
	pub dedup_purge_interval_secs: u64,
	/// Upper bound on waiting for in-flight requests at shutdown.
	#[serde(default = "default_drain_timeout_secs")]
	pub drain_timeout_secs: u64,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_dedup_retention_secs() -> u64 {
	86_400
}

fn default_dedup_purge_interval_secs() -> u64 {
	600
}

fn default_drain_timeout_secs() -> u64 {
	10
}

/// A section selecting an implementation by `type`, with the remaining keys
/// passed through to that implementation's factory.
#[derive(Debug, Clone, Deserialize)]
pub struct ImplementationConfig {
	#[serde(rename = "type")]
	pub implementation: String,
	#[serde(flatten)]
	pub settings: toml::Table,
}

impl ImplementationConfig {
	/// The section as a TOML table value, `type` included.
	pub fn to_value(&self) -> toml::Value {
		let mut table = self.settings.clone();
		table.insert("type".to_string(), toml::Value::String(self.implementation.clone()));
		toml::Value::Table(table)
	}
}

/// Native gas price policy: `clamp(network + modifier, 0, max_price)`.
#[derive(Debug, Clone, Deserialize)]
pub struct GasPriceConfig {
	/// Signed adjustment in wei added to the network price.
	#[serde(default)]
	pub modifier: i64,
	#[serde(deserialize_with = "deserialize_u256")]
	pub max_price: U256,
}

impl Default for GasPriceConfig {
	fn default() -> Self {
		Self {
			modifier: 0,
			max_price: U256::from(20_000_000_000u64),
		}
	}
}

/// A fee token the relayer accepts.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
	pub name: String,
	pub symbol: String,
	#[serde(default = "default_decimals")]
	pub decimals: u8,
	/// Lowest accepted rate, in native smallest units per whole token.
	#[serde(default, deserialize_with = "deserialize_u256")]
	pub min_accepted_rate: U256,
	#[serde(default = "default_refresh_price_period_secs")]
	pub refresh_price_period_secs: u64,
	/// Price source table with a `type` key. Absent for the native token.
	pub price_plugin: Option<toml::Value>,
}

fn default_decimals() -> u8 {
	18
}

fn default_refresh_price_period_secs() -> u64 {
	60
}

/// A relayable contract.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractConfig {
	pub strategy: StrategyKind,
	/// Defaults to `strategy == identity`; must agree with it when set.
	pub is_identity: Option<bool>,
	/// Deployed address of a non-identity contract.
	pub address: Option<Address>,
	/// Factory that created the identity instances.
	pub factory_address: Option<Address>,
	/// Factory function checking an instance's code hash, e.g. `isKernel(bytes32)`.
	pub kernel_verification: Option<String>,
	/// JSON ABI used to name function parameters.
	pub abi_file: Option<PathBuf>,
	pub gas_margin_percent: Option<u64>,
	/// Fee token of a token controller; defaults to `SNT`.
	pub fee_token_symbol: Option<String>,
	#[serde(default)]
	pub allowed_functions: Vec<AllowedFunction>,
}

impl ContractConfig {
	pub fn identity_kind(&self) -> bool {
		self.is_identity
			.unwrap_or(self.strategy == StrategyKind::Identity)
	}

	pub fn gas_margin(&self) -> u64 {
		self.gas_margin_percent
			.unwrap_or_else(|| self.strategy.default_gas_margin_percent())
	}
}

/// An allow-listed function signature.
#[derive(Debug, Clone, Deserialize)]
pub struct AllowedFunction {
	/// Signature, optionally with parameter names:
	/// `transferSNT(address _to,uint256 _amount,uint256 _nonce,uint256 _gasPrice,bytes _signature)`.
	pub function: String,
	/// Whether the call moves a base token out of the identity.
	#[serde(default)]
	pub is_token: bool,
}
