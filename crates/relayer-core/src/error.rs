use relayer_account::AccountError;
use relayer_ledger::LedgerError;
use relayer_registry::RegistryError;
use relayer_storage::StorageError;
use relayer_strategy::StrategyError;
use relayer_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
	#[error("Configuration error: {0}")]
	Configuration(String),

	#[error("Account error: {0}")]
	Account(#[from] AccountError),

	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),

	#[error("Registry error: {0}")]
	Registry(#[from] RegistryError),

	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),

	#[error("Strategy error: {0}")]
	Strategy(#[from] StrategyError),

	#[error("Transport error: {0}")]
	Transport(#[from] TransportError),

	#[error("Dispatch error: {0}")]
	Dispatch(String),
}
