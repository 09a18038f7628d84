//! Relayer core: wiring, per-message dispatch and the run loop.
//!
//! [`RelayerBuilder`] turns a validated [`Config`] into a [`RelayerEngine`].
//! Collaborators with more than one possible implementation (account, ledger,
//! transport, price sources, dedup storage) are created through factories so
//! the binary and the tests can plug in their own.

use alloy::network::EthereumWallet;
use relayer_account::{AccountError, AccountInterface, AccountService};
use relayer_config::Config;
use relayer_ledger::{LedgerError, LedgerInterface, LedgerService};
use relayer_pricing::{PriceInterface, PricingError};
use relayer_registry::{ContractRegistry, TokenRegistry};
use relayer_storage::implementations::memory::MemoryStorage;
use relayer_storage::{DedupCache, StorageInterface};
use relayer_strategy::{GasPricePolicy, StrategyEnv, StrategyService};
use relayer_transport::{TransportError, TransportInterface, TransportService};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod dispatcher;
pub mod engine;
mod error;
pub mod utils;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use engine::{ExitReason, RelayerEngine};
pub use error::CoreError;

type AccountFactory = Box<dyn Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> + Send>;
type LedgerFactory =
	Box<dyn Fn(&toml::Value, EthereumWallet) -> Result<Box<dyn LedgerInterface>, LedgerError> + Send>;
type TransportFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn TransportInterface>, TransportError> + Send>;
type PriceFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn PriceInterface>, PricingError> + Send + Sync>;
type StorageFactory = Box<dyn Fn() -> Box<dyn StorageInterface> + Send>;

pub struct RelayerBuilder {
	config: Config,
	account_factory: Option<AccountFactory>,
	ledger_factory: Option<LedgerFactory>,
	transport_factory: Option<TransportFactory>,
	price_factory: Option<PriceFactory>,
	storage_factory: Option<StorageFactory>,
}

impl RelayerBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			account_factory: None,
			ledger_factory: None,
			transport_factory: None,
			price_factory: None,
			storage_factory: None,
		}
	}

	pub fn with_account_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> + Send + 'static,
	{
		self.account_factory = Some(Box::new(factory));
		self
	}

	pub fn with_ledger_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value, EthereumWallet) -> Result<Box<dyn LedgerInterface>, LedgerError>
			+ Send
			+ 'static,
	{
		self.ledger_factory = Some(Box::new(factory));
		self
	}

	pub fn with_transport_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn TransportInterface>, TransportError> + Send + 'static,
	{
		self.transport_factory = Some(Box::new(factory));
		self
	}

	/// Price sources for non-native tokens. Defaults to
	/// [`relayer_pricing::create_price_source`].
	pub fn with_price_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn PriceInterface>, PricingError> + Send + Sync + 'static,
	{
		self.price_factory = Some(Box::new(factory));
		self
	}

	/// Backend of the dedup cache. Defaults to in-memory storage.
	pub fn with_storage_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn() -> Box<dyn StorageInterface> + Send + 'static,
	{
		self.storage_factory = Some(Box::new(factory));
		self
	}

	/// Creates every collaborator and initializes all contracts.
	///
	/// Returns only once every contract descriptor is built; any failure
	/// aborts startup.
	pub async fn build(self) -> Result<RelayerEngine, CoreError> {
		let config = self.config;

		let account_provider = self
			.account_factory
			.ok_or_else(|| CoreError::Configuration("Account factory not provided".into()))?(
			&config.account.to_value(),
		)?;
		let account = AccountService::new(account_provider);
		let relayer = account.get_address().await?;

		let ledger_client = self
			.ledger_factory
			.ok_or_else(|| CoreError::Configuration("Ledger factory not provided".into()))?(
			&config.ledger.to_value(),
			account.wallet(),
		)?;
		let ledger = Arc::new(LedgerService::new(ledger_client));

		let transport_impl = self
			.transport_factory
			.ok_or_else(|| CoreError::Configuration("Transport factory not provided".into()))?(
			&config.transport.to_value(),
		)?;
		let transport = Arc::new(TransportService::new(transport_impl));

		let price_factory: PriceFactory = self
			.price_factory
			.unwrap_or_else(|| Box::new(relayer_pricing::create_price_source));
		let tokens = Arc::new(TokenRegistry::from_config(&config.tokens, &*price_factory)?);

		let contracts = Arc::new(ContractRegistry::build(&config.contracts, &ledger).await?);
		info!(contracts = contracts.len(), tokens = tokens.len(), "Contracts initialized");

		let storage = match self.storage_factory {
			Some(factory) => factory(),
			None => Box::new(MemoryStorage::new()),
		};
		let dedup = Arc::new(DedupCache::new(
			storage,
			Duration::from_secs(config.relayer.dedup_retention_secs),
		));

		let strategies = Arc::new(StrategyService::new(StrategyEnv {
			ledger,
			tokens,
			gas_policy: GasPricePolicy::from(&config.gas_price),
			relayer,
		}));

		let dispatcher = Arc::new(Dispatcher::new(
			contracts.clone(),
			strategies,
			dedup.clone(),
			transport.clone(),
			config.relayer.min_balance,
		));

		Ok(RelayerEngine::new(
			dispatcher,
			transport,
			contracts,
			dedup,
			Duration::from_secs(config.relayer.dedup_purge_interval_secs),
			Duration::from_secs(config.relayer.drain_timeout_secs),
		))
	}
}
