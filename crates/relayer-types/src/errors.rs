//! Error types shared across the relayer crates.

use thiserror::Error;

/// Errors raised while turning an inbound payload into a [`crate::RelayRequest`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
	#[error("Invalid JSON payload: {0}")]
	InvalidJson(String),

	#[error("Missing field: {0}")]
	MissingField(&'static str),

	#[error("Invalid address in field '{field}': {value}")]
	InvalidAddress { field: &'static str, value: String },

	#[error("Invalid hex in field '{0}'")]
	InvalidHex(&'static str),

	#[error("Invalid number in field '{field}': {value}")]
	InvalidNumber { field: &'static str, value: String },

	#[error("Unknown action: {0}")]
	UnknownAction(String),

	#[error("Encoded function call is shorter than a selector")]
	CallTooShort,
}
