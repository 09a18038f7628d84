//! Transaction types handed to the ledger client.
//!
//! [`CallRequest`] describes a read-only execution (simulation, `balanceOf`,
//! kernel verification) and [`RelayTransaction`] a transaction the relayer
//! signs and broadcasts after a request has been accepted.

use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::rpc::types::{TransactionInput, TransactionRequest};

/// Read-only call executed against current chain state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
	/// Sender used for the simulation (the relayer for relayed calls).
	pub from: Option<Address>,
	/// Target contract.
	pub to: Address,
	/// Full calldata including the selector.
	pub data: Bytes,
	/// Native value attached to the call.
	pub value: U256,
}

impl CallRequest {
	pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
		Self {
			from: None,
			to,
			data: data.into(),
			value: U256::ZERO,
		}
	}

	pub fn from(mut self, from: Address) -> Self {
		self.from = Some(from);
		self
	}
}

impl From<&CallRequest> for TransactionRequest {
	fn from(call: &CallRequest) -> Self {
		TransactionRequest {
			from: call.from,
			to: Some(TxKind::Call(call.to)),
			value: Some(call.value),
			input: TransactionInput::new(call.data.clone()),
			..Default::default()
		}
	}
}

/// Transaction the relayer submits on behalf of a requester.
///
/// Gas limit and gas price are always explicit: the limit comes from the
/// strategy's estimate plus the contract's margin, the price from the
/// relayer's gas price policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTransaction {
	/// Recipient contract (the identity instance or the token controller).
	pub to: Address,
	/// The requester's encoded function call, forwarded verbatim.
	pub data: Bytes,
	/// Native value, always zero for relayed calls.
	pub value: U256,
	/// Gas limit for transaction execution.
	pub gas_limit: u64,
	/// Legacy gas price in wei.
	pub gas_price: u128,
	/// Chain ID for replay protection, filled by the provider when absent.
	pub chain_id: Option<u64>,
}

impl From<RelayTransaction> for TransactionRequest {
	fn from(tx: RelayTransaction) -> Self {
		TransactionRequest {
			chain_id: tx.chain_id,
			value: Some(tx.value),
			to: Some(TxKind::Call(tx.to)),
			gas: Some(tx.gas_limit),
			gas_price: Some(tx.gas_price),
			input: TransactionInput::new(tx.data),
			..Default::default()
		}
	}
}
