//! Outbound reply envelopes: `{message: string|object, receipt?}`.

use crate::receipt::SubmissionReceipt;
use crate::utils::decimal_u256;
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Message sent back to a requester on the topic it published to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
	pub message: ReplyMessage,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub receipt: Option<SubmissionReceipt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyMessage {
	Text(String),
	Availability(AvailabilityAdvert),
}

/// Answer to an availability probe the relayer accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityAdvert {
	pub message: String,
	/// The relayer account that would submit the transaction.
	pub address: Address,
	/// Lowest token gas price the relayer accepts right now.
	#[serde(with = "decimal_u256")]
	pub min_price: U256,
}

impl ReplyEnvelope {
	pub fn text(message: impl Into<String>) -> Self {
		Self {
			message: ReplyMessage::Text(message.into()),
			receipt: None,
		}
	}

	pub fn submitted(receipt: SubmissionReceipt) -> Self {
		Self {
			message: ReplyMessage::Text("Transaction submitted".to_string()),
			receipt: Some(receipt),
		}
	}

	pub fn available(address: Address, min_price: U256) -> Self {
		Self {
			message: ReplyMessage::Availability(AvailabilityAdvert {
				message: "Available".to_string(),
				address,
				min_price,
			}),
			receipt: None,
		}
	}

	/// The textual message, or the advert's `message` field.
	pub fn message_text(&self) -> &str {
		match &self.message {
			ReplyMessage::Text(text) => text,
			ReplyMessage::Availability(advert) => &advert.message,
		}
	}

	pub fn to_json(&self) -> Vec<u8> {
		serde_json::to_vec(self).unwrap_or_default()
	}
}
