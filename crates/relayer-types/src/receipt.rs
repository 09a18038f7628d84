//! Submission receipt returned to the requester.
//!
//! Submission is fire-and-forget: a receipt means the node accepted the
//! broadcast, not that the transaction was mined.

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Details of a transaction the relayer broadcast for a requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
	/// The hash of the broadcast transaction.
	pub transaction_hash: B256,
	/// The relayer account that paid the native fee.
	pub from: Address,
	/// The contract the transaction was sent to.
	pub to: Address,
	/// Gas limit the transaction was submitted with.
	pub gas_limit: u64,
	/// Native gas price the transaction was submitted with.
	pub gas_price: u128,
}
