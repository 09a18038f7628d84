//! Static descriptors the relayer validates requests against.
//!
//! The contract registry maps topics to relayable contracts with their
//! allow-listed functions and bytecode fingerprints; the token registry holds
//! the accepted fee tokens and their price sources. Both are built once at
//! startup and never change afterwards.

use relayer_ledger::LedgerError;
use relayer_pricing::PricingError;
use relayer_types::{Address, Topic};
use thiserror::Error;

pub mod contracts;
pub mod functions;
pub mod tokens;

pub use contracts::{ContractDescriptor, ContractRegistry, DEFAULT_FEE_TOKEN_SYMBOL};
pub use functions::{DecodedCall, FunctionDescriptor};
pub use tokens::{PriceSourceFactory, TokenDescriptor, TokenRegistry};

#[derive(Debug, Error)]
pub enum RegistryError {
	#[error("No contract registered for topic {0}")]
	ContractNotFound(Topic),

	#[error("Contracts '{first}' and '{second}' share topic {topic}")]
	TopicCollision {
		topic: Topic,
		first: String,
		second: String,
	},

	#[error("Contract '{name}' has no code at {address}")]
	ContractNotDeployed { name: String, address: Address },

	#[error("Invalid function signature '{signature}': {reason}")]
	InvalidSignature { signature: String, reason: String },

	#[error("Failed to load ABI from {path}: {reason}")]
	Abi { path: String, reason: String },

	#[error("Failed to decode call: {0}")]
	Decode(String),

	#[error("Exchange rate for {symbol} unavailable: {reason}")]
	RateUnavailable { symbol: String, reason: String },

	#[error("Configuration error: {0}")]
	Config(String),

	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),

	#[error("Price source error: {0}")]
	Pricing(#[from] PricingError),
}
