//! Strategy outcomes.
//!
//! A rejection is an ordinary value carrying the reason sent back to the
//! requester. Infrastructure failures are errors and never end up here.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason a request was turned down, replied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection(pub String);

impl Rejection {
	pub fn new(reason: impl Into<String>) -> Self {
		Rejection(reason.into())
	}

	pub fn reason(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Rejection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Data attached to an accepted request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acceptance {
	/// Gas the simulation consumed; absent for availability probes.
	pub estimated_gas: Option<u64>,
	/// Native gas price the transaction should be submitted with.
	pub native_gas_price: Option<u128>,
	/// Minimum token gas price advertised by availability probes.
	pub min_price: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
	Accept(Acceptance),
	Reject(Rejection),
}

impl Decision {
	pub fn reject(reason: impl Into<String>) -> Self {
		Decision::Reject(Rejection::new(reason))
	}

	pub fn is_accepted(&self) -> bool {
		matches!(self, Decision::Accept(_))
	}

	/// The rejection reason, if any.
	pub fn reason(&self) -> Option<&str> {
		match self {
			Decision::Reject(r) => Some(r.reason()),
			Decision::Accept(_) => None,
		}
	}
}

impl From<Rejection> for Decision {
	fn from(rejection: Rejection) -> Self {
		Decision::Reject(rejection)
	}
}

/// Validation rule set a contract is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
	/// Identity instances created by a factory, verified through the kernel.
	Identity,
	/// A single token controller with a fixed fee token.
	TokenController,
}

impl StrategyKind {
	/// Gas margin applied on submission when a contract does not set one.
	pub fn default_gas_margin_percent(&self) -> u64 {
		match self {
			StrategyKind::Identity => 5,
			StrategyKind::TokenController => 10,
		}
	}
}

impl fmt::Display for StrategyKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StrategyKind::Identity => f.write_str("identity"),
			StrategyKind::TokenController => f.write_str("token_controller"),
		}
	}
}
