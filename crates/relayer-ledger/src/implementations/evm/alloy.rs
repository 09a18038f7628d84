//! JSON-RPC ledger client built on Alloy.
//!
//! Reads and simulations go straight to the node. Submissions are signed by
//! the relayer's wallet; the provider's fillers supply the nonce and chain id,
//! while gas limit and gas price are always set by the caller.

use crate::{LedgerError, LedgerInterface};
use alloy::network::{Ethereum, EthereumWallet};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use relayer_types::{
	Address, Bytes, CallRequest, ConfigSchema, Field, FieldType, RelayTransaction, Schema, ValidationError,
	B256, U256,
};
use tracing::{debug, info};

fn truncate_hash(hash: &B256) -> String {
	let hash_str = hash.to_string();
	format!("{}..", &hash_str[..10])
}

/// Sorts an RPC failure into the ledger error taxonomy.
///
/// A node error response mentioning a revert is a [`LedgerError::Reverted`];
/// any other error response is [`LedgerError::Rpc`]. Failures without a
/// response (connection, timeout, decoding) mean the ledger is unavailable.
fn classify(error: RpcError<TransportErrorKind>) -> LedgerError {
	match error.as_error_resp() {
		Some(payload) if payload.code == 3 || payload.message.to_lowercase().contains("revert") => {
			LedgerError::Reverted(payload.message.to_string())
		}
		Some(payload) => LedgerError::Rpc(format!("{} (code {})", payload.message, payload.code)),
		None => match error {
			RpcError::DeserError { err, .. } => LedgerError::InvalidResponse(err.to_string()),
			other => LedgerError::Unavailable(other.to_string()),
		},
	}
}

/// Alloy-backed ledger client.
pub struct AlloyLedger {
	provider: DynProvider<Ethereum>,
	chain_id: Option<u64>,
}

impl AlloyLedger {
	pub fn new(rpc_url: &str, chain_id: Option<u64>, wallet: EthereumWallet) -> Result<Self, LedgerError> {
		let url = rpc_url
			.parse()
			.map_err(|e| LedgerError::Config(format!("Invalid RPC URL: {}", e)))?;

		let provider = ProviderBuilder::new().wallet(wallet).connect_http(url).erased();

		Ok(Self { provider, chain_id })
	}
}

/// Configuration schema for the Alloy ledger client.
pub struct AlloyLedgerSchema;

impl ConfigSchema for AlloyLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("rpc_url", FieldType::String).with_validator(|value| {
				let url = value.as_str().unwrap_or_default();
				if url.starts_with("http://") || url.starts_with("https://") {
					Ok(())
				} else {
					Err("RPC URL must start with http:// or https://".to_string())
				}
			})],
			vec![Field::new(
				"chain_id",
				FieldType::Integer {
					min: Some(1),
					max: None,
				},
			)],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl LedgerInterface for AlloyLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AlloyLedgerSchema)
	}

	async fn get_code(&self, address: Address) -> Result<Bytes, LedgerError> {
		self.provider.get_code_at(address).await.map_err(classify)
	}

	async fn call(&self, call: &CallRequest) -> Result<Bytes, LedgerError> {
		let request: TransactionRequest = call.into();
		self.provider.call(request).await.map_err(classify)
	}

	async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, LedgerError> {
		let request: TransactionRequest = call.into();
		let estimate = self.provider.estimate_gas(request).await.map_err(classify)?;
		debug!(to = %call.to, estimate, "Estimated gas");
		Ok(estimate)
	}

	async fn get_balance(&self, address: Address) -> Result<U256, LedgerError> {
		self.provider.get_balance(address).await.map_err(classify)
	}

	async fn gas_price(&self) -> Result<u128, LedgerError> {
		self.provider.get_gas_price().await.map_err(classify)
	}

	async fn block_number(&self) -> Result<u64, LedgerError> {
		self.provider.get_block_number().await.map_err(classify)
	}

	async fn send_transaction(&self, mut tx: RelayTransaction) -> Result<B256, LedgerError> {
		if tx.chain_id.is_none() {
			tx.chain_id = self.chain_id;
		}
		let to = tx.to;
		let request: TransactionRequest = tx.into();

		let pending = self.provider.send_transaction(request).await.map_err(classify)?;
		let tx_hash = *pending.tx_hash();

		info!(tx_hash = %truncate_hash(&tx_hash), to = %to, "Submitted transaction");
		Ok(tx_hash)
	}
}

/// Creates the Alloy ledger client from a `[ledger]` table.
///
/// Configuration parameters:
/// - `rpc_url`: HTTP(S) JSON-RPC endpoint
/// - `chain_id`: optional, pinned on every submitted transaction
pub fn create_ledger(config: &toml::Value, wallet: EthereumWallet) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	AlloyLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::Config(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| LedgerError::Config("rpc_url is required".to_string()))?;

	let chain_id = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.map(|id| id as u64);

	Ok(Box::new(AlloyLedger::new(rpc_url, chain_id, wallet)?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::signers::local::PrivateKeySigner;

	fn error_response(code: i64, message: &str) -> RpcError<TransportErrorKind> {
		let payload = serde_json::json!({ "code": code, "message": message });
		RpcError::ErrorResp(serde_json::from_value(payload).unwrap())
	}

	#[test]
	fn test_classify_error_responses() {
		let revert = error_response(3, "execution reverted");
		assert!(matches!(classify(revert), LedgerError::Reverted(_)));

		let reverted_message = error_response(-32000, "VM Exception while processing transaction: revert");
		assert!(matches!(classify(reverted_message), LedgerError::Reverted(_)));

		let out_of_gas = error_response(-32000, "gas required exceeds allowance");
		assert!(matches!(classify(out_of_gas), LedgerError::Rpc(_)));

		let unreachable = RpcError::<TransportErrorKind>::Transport(TransportErrorKind::BackendGone);
		assert!(matches!(classify(unreachable), LedgerError::Unavailable(_)));
	}

	#[test]
	fn test_schema_and_factory() {
		let wallet = EthereumWallet::from(PrivateKeySigner::random());

		let bad: toml::Value = toml::from_str("rpc_url = \"ws://localhost:8546\"").unwrap();
		assert!(matches!(
			create_ledger(&bad, wallet.clone()),
			Err(LedgerError::Config(_))
		));

		let good: toml::Value =
			toml::from_str("rpc_url = \"http://localhost:8545\"\nchain_id = 1").unwrap();
		assert!(create_ledger(&good, wallet).is_ok());
	}
}
