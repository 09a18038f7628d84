//! Inbound relay requests.
//!
//! A pub/sub message arrives on a [`Topic`] with a JSON payload of the form
//! `{contract, address, action, encodedFunctionCall?}`. For availability
//! probes `gasToken` and `gasPrice` replace `encodedFunctionCall`. The payload
//! is parsed into a [`RelayRequest`] that lives for the duration of one
//! message's processing.

use crate::errors::ParseError;
use alloy::primitives::{keccak256, Address, Bytes, Selector, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Four-byte routing identifier on the pub/sub transport.
///
/// A contract's topic is the first four bytes of its configured name,
/// right-padded with zeros when the name is shorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic(pub [u8; 4]);

impl Topic {
	/// Derives the topic for a configured contract name.
	pub fn from_name(name: &str) -> Self {
		let mut bytes = [0u8; 4];
		for (slot, byte) in bytes.iter_mut().zip(name.as_bytes()) {
			*slot = *byte;
		}
		Topic(bytes)
	}
}

impl fmt::Display for Topic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl FromStr for Topic {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let raw = hex::decode(s.trim_start_matches("0x")).map_err(|_| ParseError::InvalidHex("topic"))?;
		let bytes: [u8; 4] = raw.try_into().map_err(|_| ParseError::InvalidHex("topic"))?;
		Ok(Topic(bytes))
	}
}

/// A message delivered by the pub/sub transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
	/// Topic the message was published on.
	pub topic: Topic,
	/// Raw payload bytes (UTF-8 JSON).
	pub payload: Vec<u8>,
	/// Transport-specific handle used to reply to the requester.
	pub sender: Option<String>,
}

impl InboundMessage {
	pub fn new(topic: Topic, payload: impl Into<Vec<u8>>) -> Self {
		Self {
			topic,
			payload: payload.into(),
			sender: None,
		}
	}

	pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
		self.sender = Some(sender.into());
		self
	}
}

/// An encoded contract call the requester wants relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
	/// First four bytes of the calldata.
	pub selector: Selector,
	/// Full calldata, selector included.
	pub call_data: Bytes,
}

/// Terms of an availability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityQuery {
	/// Token the requester intends to pay fees in.
	pub gas_token: Address,
	/// Gas price the requester is offering, in token base units.
	pub gas_price: U256,
}

/// What the requester asks the relayer to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
	Transaction(FunctionCall),
	Availability(AvailabilityQuery),
}

impl RelayAction {
	pub fn name(&self) -> &'static str {
		match self {
			RelayAction::Transaction(_) => "transaction",
			RelayAction::Availability(_) => "availability",
		}
	}
}

/// A parsed relay request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
	/// Target contract (identity instance or controller address).
	pub contract: Address,
	/// Account acting through the contract, when the envelope carries one.
	pub actor: Option<Address>,
	pub action: RelayAction,
	/// The payload the request was parsed from.
	pub raw_payload: Bytes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
	contract: Option<String>,
	address: Option<String>,
	action: Option<String>,
	encoded_function_call: Option<String>,
	gas_token: Option<String>,
	gas_price: Option<serde_json::Value>,
}

impl RelayRequest {
	/// Parses a JSON envelope.
	pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
		let envelope: Envelope =
			serde_json::from_slice(payload).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

		let contract = parse_address(
			"contract",
			envelope
				.contract
				.as_deref()
				.ok_or(ParseError::MissingField("contract"))?,
		)?;

		let actor = match envelope.address.as_deref() {
			Some(raw) if !raw.is_empty() => Some(parse_address("address", raw)?),
			_ => None,
		};

		let action = match envelope.action.as_deref() {
			Some("transaction") => {
				let encoded = envelope
					.encoded_function_call
					.as_deref()
					.ok_or(ParseError::MissingField("encodedFunctionCall"))?;
				let call_data = hex::decode(encoded.trim_start_matches("0x"))
					.map_err(|_| ParseError::InvalidHex("encodedFunctionCall"))?;
				if call_data.len() < 4 {
					return Err(ParseError::CallTooShort);
				}
				RelayAction::Transaction(FunctionCall {
					selector: Selector::from_slice(&call_data[..4]),
					call_data: Bytes::from(call_data),
				})
			}
			Some("availability") => {
				let gas_token = parse_address(
					"gasToken",
					envelope
						.gas_token
						.as_deref()
						.ok_or(ParseError::MissingField("gasToken"))?,
				)?;
				let gas_price = parse_amount(
					"gasPrice",
					envelope
						.gas_price
						.as_ref()
						.ok_or(ParseError::MissingField("gasPrice"))?,
				)?;
				RelayAction::Availability(AvailabilityQuery {
					gas_token,
					gas_price,
				})
			}
			Some(other) => return Err(ParseError::UnknownAction(other.to_string())),
			None => return Err(ParseError::MissingField("action")),
		};

		Ok(RelayRequest {
			contract,
			actor,
			action,
			raw_payload: Bytes::copy_from_slice(payload),
		})
	}

	/// Content hash used for deduplication.
	///
	/// Two requests that parse to the same contract, actor and action share a
	/// fingerprint regardless of JSON formatting differences in the payload.
	pub fn fingerprint(&self) -> B256 {
		let mut buf = Vec::with_capacity(128);
		buf.extend_from_slice(self.contract.as_slice());
		match self.actor {
			Some(actor) => {
				buf.push(1);
				buf.extend_from_slice(actor.as_slice());
			}
			None => buf.push(0),
		}
		match &self.action {
			RelayAction::Transaction(call) => {
				buf.push(1);
				buf.extend_from_slice(&call.call_data);
			}
			RelayAction::Availability(query) => {
				buf.push(2);
				buf.extend_from_slice(query.gas_token.as_slice());
				buf.extend_from_slice(&query.gas_price.to_be_bytes::<32>());
			}
		}
		keccak256(&buf)
	}
}

fn parse_address(field: &'static str, raw: &str) -> Result<Address, ParseError> {
	Address::from_str(raw).map_err(|_| ParseError::InvalidAddress {
		field,
		value: raw.to_string(),
	})
}

fn parse_amount(field: &'static str, raw: &serde_json::Value) -> Result<U256, ParseError> {
	let invalid = || ParseError::InvalidNumber {
		field,
		value: raw.to_string(),
	};
	match raw {
		serde_json::Value::Number(n) => n.as_u64().map(U256::from).ok_or_else(invalid),
		serde_json::Value::String(s) => U256::from_str(s).map_err(|_| invalid()),
		_ => Err(invalid()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::address;

	#[test]
	fn test_topic_from_name() {
		assert_eq!(Topic::from_name("IdentityGasRelay").to_string(), "0x4964656e");
		assert_eq!(Topic::from_name("SNTController").to_string(), "0x534e5443");
		// Short names are zero padded
		assert_eq!(Topic::from_name("ab").0, [b'a', b'b', 0, 0]);
		assert_eq!("0x534e5443".parse::<Topic>().unwrap(), Topic::from_name("SNTController"));
	}

	#[test]
	fn test_parse_transaction() {
		let payload = br#"{
			"contract": "0x00000000000000000000000000000000000000aa",
			"address": "0x00000000000000000000000000000000000000bb",
			"action": "transaction",
			"encodedFunctionCall": "0xdeadbeef0000000000000000000000000000000000000000000000000000000000000001"
		}"#;

		let request = RelayRequest::parse(payload).unwrap();
		assert_eq!(request.contract, address!("0x00000000000000000000000000000000000000aa"));
		assert_eq!(request.actor, Some(address!("0x00000000000000000000000000000000000000bb")));
		match request.action {
			RelayAction::Transaction(call) => {
				assert_eq!(call.selector, Selector::from([0xde, 0xad, 0xbe, 0xef]));
				assert_eq!(call.call_data.len(), 36);
			}
			_ => panic!("expected transaction"),
		}
	}

	#[test]
	fn test_parse_availability_accepts_number_and_string_prices() {
		let numeric = br#"{"contract":"0x00000000000000000000000000000000000000aa","action":"availability","gasToken":"0x0000000000000000000000000000000000000000","gasPrice":1000}"#;
		let hexed = br#"{"contract":"0x00000000000000000000000000000000000000aa","action":"availability","gasToken":"0x0000000000000000000000000000000000000000","gasPrice":"0x3e8"}"#;

		let a = RelayRequest::parse(numeric).unwrap();
		let b = RelayRequest::parse(hexed).unwrap();
		assert_eq!(a.action, b.action);
		assert_eq!(a.actor, None);
		// Same parsed request, different formatting: same fingerprint
		assert_eq!(a.fingerprint(), b.fingerprint());
	}

	#[test]
	fn test_parse_rejects_malformed_envelopes() {
		assert!(matches!(
			RelayRequest::parse(b"not json"),
			Err(ParseError::InvalidJson(_))
		));
		assert_eq!(
			RelayRequest::parse(br#"{"action":"transaction"}"#),
			Err(ParseError::MissingField("contract"))
		);
		assert_eq!(
			RelayRequest::parse(
				br#"{"contract":"0x00000000000000000000000000000000000000aa","action":"transaction","encodedFunctionCall":"0x1234"}"#
			),
			Err(ParseError::CallTooShort)
		);
		assert_eq!(
			RelayRequest::parse(
				br#"{"contract":"0x00000000000000000000000000000000000000aa","action":"deploy"}"#
			),
			Err(ParseError::UnknownAction("deploy".to_string()))
		);
	}

	#[test]
	fn test_fingerprint_distinguishes_calls() {
		let one = br#"{"contract":"0x00000000000000000000000000000000000000aa","action":"transaction","encodedFunctionCall":"0xdeadbeef01"}"#;
		let two = br#"{"contract":"0x00000000000000000000000000000000000000aa","action":"transaction","encodedFunctionCall":"0xdeadbeef02"}"#;

		let a = RelayRequest::parse(one).unwrap();
		let b = RelayRequest::parse(two).unwrap();
		assert_ne!(a.fingerprint(), b.fingerprint());
		assert_eq!(a.fingerprint(), RelayRequest::parse(one).unwrap().fingerprint());
	}
}
