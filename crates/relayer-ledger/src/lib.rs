//! Ledger client for the gas relayer.
//!
//! Everything the relayer needs from the chain goes through
//! [`LedgerInterface`]: code and balance reads, read-only calls, gas
//! estimation, the network gas price and transaction submission.
//! [`LedgerService`] layers the token balance and code verification helpers
//! used by the validation strategies on top of it.

use alloy::network::EthereumWallet;
use alloy::primitives::keccak256;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use relayer_types::{Address, Bytes, CallRequest, ConfigSchema, RelayTransaction, Selector, B256, U256};
use thiserror::Error;

pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
	pub mod memory;
}

sol! {
	interface IERC20 {
		function balanceOf(address account) external view returns (uint256);
	}
}

/// Errors returned by ledger operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
	/// Execution reverted.
	#[error("Execution reverted: {0}")]
	Reverted(String),
	/// The node answered with an error other than a revert.
	#[error("RPC error: {0}")]
	Rpc(String),
	/// The node could not be reached.
	#[error("Ledger unavailable: {0}")]
	Unavailable(String),
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	#[error("Configuration error: {0}")]
	Config(String),
}

impl LedgerError {
	/// Whether the node rejected the operation itself (as opposed to being
	/// unreachable or misconfigured).
	pub fn is_execution_failure(&self) -> bool {
		matches!(self, LedgerError::Reverted(_) | LedgerError::Rpc(_))
	}
}

#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Schema for this implementation's `[ledger]` table.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Deployed bytecode at `address`; empty when nothing is deployed.
	async fn get_code(&self, address: Address) -> Result<Bytes, LedgerError>;

	/// Executes a read-only call against the latest state.
	async fn call(&self, call: &CallRequest) -> Result<Bytes, LedgerError>;

	/// Simulates `call` and returns the gas it would consume.
	async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, LedgerError>;

	/// Native balance in wei.
	async fn get_balance(&self, address: Address) -> Result<U256, LedgerError>;

	/// Current network gas price in wei.
	async fn gas_price(&self) -> Result<u128, LedgerError>;

	async fn block_number(&self) -> Result<u64, LedgerError>;

	/// Signs and broadcasts `tx`, returning once the node accepted it.
	async fn send_transaction(&self, tx: RelayTransaction) -> Result<B256, LedgerError>;
}

/// Creates a ledger client from the `[ledger]` table, selected by `type`.
pub fn create_ledger(config: &toml::Value, wallet: EthereumWallet) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	match config.get("type").and_then(|v| v.as_str()) {
		Some("alloy") => implementations::evm::alloy::create_ledger(config, wallet),
		Some(other) => Err(LedgerError::Config(format!("Unknown ledger type '{}'", other))),
		None => Err(LedgerError::Config("Ledger type is required".to_string())),
	}
}

/// Ledger access shared by the registry, the strategies and the dispatcher.
pub struct LedgerService {
	implementation: Box<dyn LedgerInterface>,
}

impl LedgerService {
	pub fn new(implementation: Box<dyn LedgerInterface>) -> Self {
		Self { implementation }
	}

	pub async fn get_code(&self, address: Address) -> Result<Bytes, LedgerError> {
		self.implementation.get_code(address).await
	}

	pub async fn call(&self, call: &CallRequest) -> Result<Bytes, LedgerError> {
		self.implementation.call(call).await
	}

	pub async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, LedgerError> {
		self.implementation.estimate_gas(call).await
	}

	pub async fn get_balance(&self, address: Address) -> Result<U256, LedgerError> {
		self.implementation.get_balance(address).await
	}

	pub async fn gas_price(&self) -> Result<u128, LedgerError> {
		self.implementation.gas_price().await
	}

	pub async fn block_number(&self) -> Result<u64, LedgerError> {
		self.implementation.block_number().await
	}

	pub async fn send_transaction(&self, tx: RelayTransaction) -> Result<B256, LedgerError> {
		self.implementation.send_transaction(tx).await
	}

	/// ERC20 `balanceOf(owner)` on `token`.
	pub async fn erc20_balance_of(&self, token: Address, owner: Address) -> Result<U256, LedgerError> {
		let data = IERC20::balanceOfCall { account: owner }.abi_encode();
		let result = self.call(&CallRequest::new(token, data)).await?;
		decode_word(&result).map(U256::from_be_bytes)
	}

	/// Balance of `owner` in `token`, where the zero address is the native
	/// currency.
	pub async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, LedgerError> {
		if token == Address::ZERO {
			self.get_balance(owner).await
		} else {
			self.erc20_balance_of(token, owner).await
		}
	}

	/// keccak256 of the code deployed at `address`, `None` when there is none.
	pub async fn code_hash(&self, address: Address) -> Result<Option<B256>, LedgerError> {
		let code = self.get_code(address).await?;
		if code.is_empty() {
			Ok(None)
		} else {
			Ok(Some(keccak256(&code)))
		}
	}

	/// Asks `factory` whether `instance` runs a known kernel.
	///
	/// Calls `selector(bytes32 codeHash)` with the hash of the instance's
	/// deployed code and expects an ABI-encoded `true`. An address without
	/// code is never a valid instance.
	pub async fn verify_kernel(
		&self,
		factory: Address,
		selector: Selector,
		instance: Address,
	) -> Result<bool, LedgerError> {
		let Some(code_hash) = self.code_hash(instance).await? else {
			return Ok(false);
		};

		let mut data = Vec::with_capacity(36);
		data.extend_from_slice(selector.as_slice());
		data.extend_from_slice(code_hash.as_slice());

		let result = self.call(&CallRequest::new(factory, data)).await?;
		let word = decode_word(&result)?;
		Ok(word[31] == 1 && word[..31].iter().all(|b| *b == 0))
	}
}

/// First 32-byte word of an ABI-encoded return value.
fn decode_word(data: &[u8]) -> Result<[u8; 32], LedgerError> {
	data.get(..32)
		.and_then(|w| <[u8; 32]>::try_from(w).ok())
		.ok_or_else(|| {
			LedgerError::InvalidResponse(format!("expected a 32-byte word, got {} bytes", data.len()))
		})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::InMemoryLedger;
	use alloy::primitives::address;

	const TOKEN: Address = address!("0x744d70fdbe2ba4cf95131626614a1763df805b9e");
	const OWNER: Address = address!("0x00000000000000000000000000000000000000bb");
	const FACTORY: Address = address!("0x00000000000000000000000000000000000000f1");
	const INSTANCE: Address = address!("0x00000000000000000000000000000000000000aa");

	#[tokio::test]
	async fn test_token_balance_native_and_erc20() {
		let ledger = InMemoryLedger::new()
			.with_balance(OWNER, U256::from(7))
			.with_token_balance(TOKEN, OWNER, U256::from(1_000));
		let service = LedgerService::new(Box::new(ledger));

		assert_eq!(service.token_balance(Address::ZERO, OWNER).await.unwrap(), U256::from(7));
		assert_eq!(service.token_balance(TOKEN, OWNER).await.unwrap(), U256::from(1_000));
		assert_eq!(service.token_balance(TOKEN, INSTANCE).await.unwrap(), U256::ZERO);
	}

	#[tokio::test]
	async fn test_code_hash() {
		let code = Bytes::from(vec![0x60, 0x80, 0x60, 0x40]);
		let service = LedgerService::new(Box::new(InMemoryLedger::new().with_code(INSTANCE, code.clone())));

		assert_eq!(service.code_hash(INSTANCE).await.unwrap(), Some(keccak256(&code)));
		assert_eq!(service.code_hash(OWNER).await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_verify_kernel() {
		let code = Bytes::from(vec![0x60, 0x80]);
		let selector = Selector::from([0x12, 0x34, 0x56, 0x78]);
		let ledger = InMemoryLedger::new()
			.with_code(INSTANCE, code.clone())
			.with_kernel(FACTORY, selector, keccak256(&code));
		let service = LedgerService::new(Box::new(ledger));

		assert!(service.verify_kernel(FACTORY, selector, INSTANCE).await.unwrap());
		// No code at the address
		assert!(!service.verify_kernel(FACTORY, selector, OWNER).await.unwrap());
	}

	#[tokio::test]
	async fn test_verify_kernel_rejects_unknown_code() {
		let selector = Selector::from([0x12, 0x34, 0x56, 0x78]);
		let ledger = InMemoryLedger::new()
			.with_code(INSTANCE, Bytes::from(vec![0x60, 0x80]))
			.with_kernel(FACTORY, selector, B256::repeat_byte(0x99));
		let service = LedgerService::new(Box::new(ledger));

		assert!(!service.verify_kernel(FACTORY, selector, INSTANCE).await.unwrap());
	}

	#[test]
	fn test_decode_word() {
		assert!(decode_word(&[0u8; 31]).is_err());
		assert_eq!(decode_word(&[1u8; 40]).unwrap(), [1u8; 32]);
	}

	#[test]
	fn test_create_ledger_by_type() {
		let wallet = || EthereumWallet::from(alloy::signers::local::PrivateKeySigner::random());

		let alloy: toml::Value = toml::from_str("type = \"alloy\"\nrpc_url = \"http://localhost:8545\"").unwrap();
		assert!(create_ledger(&alloy, wallet()).is_ok());

		let unknown: toml::Value = toml::from_str("type = \"carrier\"").unwrap();
		assert!(matches!(create_ledger(&unknown, wallet()), Err(LedgerError::Config(_))));

		let untyped: toml::Value = toml::from_str("rpc_url = \"http://localhost:8545\"").unwrap();
		assert!(matches!(create_ledger(&untyped, wallet()), Err(LedgerError::Config(_))));
	}
}
