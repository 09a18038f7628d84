//! Validation strategies for relay requests.
//!
//! A strategy decides whether a request is well-formed, authorized and
//! economically sound before anything is broadcast. Each contract family has
//! its own rule set ([`StrategyKind`]); availability probes are answered by a
//! separate strategy selected by the request's action rather than by the
//! contract. Strategies keep no state between requests.
//!
//! Rejections are data ([`Decision::Reject`]). Only infrastructure failures,
//! such as an unreachable node, surface as [`StrategyError`].

use async_trait::async_trait;
use relayer_config::GasPriceConfig;
use relayer_ledger::{LedgerError, LedgerService};
use relayer_registry::{ContractDescriptor, TokenRegistry};
use relayer_types::{Address, Decision, FunctionCall, RelayAction, RelayRequest, StrategyKind, U256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

mod pipeline;

pub mod implementations {
	pub mod availability;
	pub mod identity;
	pub mod token_controller;
}

#[cfg(test)]
mod testing;

use implementations::availability::AvailabilityStrategy;
use implementations::identity::IdentityStrategy;
use implementations::token_controller::TokenControllerStrategy;

/// Reasons replied to requesters.
pub mod reasons {
	pub const MALFORMED_PARAMETERS: &str = "malformed parameters";
	pub const FUNCTION_NOT_ALLOWED: &str = "Function not allowed";
	pub const TOKEN_NOT_ALLOWED: &str = "Token not allowed";
	pub const INSUFFICIENT_FEE_BALANCE: &str = "not enough tokens for gasPrice*gasLimit";
	pub const WILL_REVERT: &str = "Transaction will revert";
	pub const WILL_FAIL: &str = "Transaction will fail";
	pub const GAS_LIMIT_TOO_LOW: &str = "Gas limit below estimated gas";
	pub const PRICE_UNAVAILABLE: &str = "Token price unavailable";
	pub const GAS_PRICE_TOO_LOW: &str = "Gas price is less than required amount";
	pub const INVALID_IDENTITY: &str = "Invalid identity instance";
	pub const INSUFFICIENT_BASE_TOKEN: &str =
		"Identity has not enough balance of base token to transfer value";
	pub const INVALID_ACTOR: &str = "Invalid actor address";
	pub const INVALID_CONTRACT_CODE: &str = "Invalid contract code";

	pub fn rate_not_accepted(symbol: &str) -> String {
		format!("Not accepting {} at current rate", symbol)
	}

	pub fn insufficient_transfer_balance(required_gas: impl std::fmt::Display) -> String {
		format!(
			"Address has not enough balance to transfer specified value + fees ({})",
			required_gas
		)
	}

	pub fn insufficient_minimal_gas(required: impl std::fmt::Display) -> String {
		format!("Address has not enough balance to pay minimal gas ({})", required)
	}
}

#[derive(Debug, Error)]
pub enum StrategyError {
	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),
	#[error("Configuration error: {0}")]
	Config(String),
}

/// How the relayer derives the native gas price it pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPricePolicy {
	/// Signed wei added to the network price.
	pub modifier: i64,
	/// Upper bound in wei.
	pub max_price: U256,
}

impl GasPricePolicy {
	/// `clamp(network + modifier, 0, max_price)`.
	pub fn apply(&self, network: u128) -> u128 {
		let adjusted = if self.modifier >= 0 {
			network.saturating_add(self.modifier as u128)
		} else {
			network.saturating_sub(self.modifier.unsigned_abs() as u128)
		};
		let cap = u128::try_from(self.max_price).unwrap_or(u128::MAX);
		adjusted.min(cap)
	}
}

impl From<&GasPriceConfig> for GasPricePolicy {
	fn from(config: &GasPriceConfig) -> Self {
		Self {
			modifier: config.modifier,
			max_price: config.max_price,
		}
	}
}

/// Chain access and static data every strategy works against.
#[derive(Clone)]
pub struct StrategyEnv {
	pub ledger: Arc<LedgerService>,
	pub tokens: Arc<TokenRegistry>,
	pub gas_policy: GasPricePolicy,
	/// Sender used when simulating relayed calls.
	pub relayer: Address,
}

/// Rule set for one contract family.
#[async_trait]
pub trait ValidationStrategy: Send + Sync {
	fn kind(&self) -> StrategyKind;

	/// Validates a transaction request against `contract`.
	async fn validate(
		&self,
		contract: &ContractDescriptor,
		request: &RelayRequest,
		call: &FunctionCall,
		env: &StrategyEnv,
	) -> Result<Decision, StrategyError>;
}

/// Maps a strategy kind to its implementation.
pub fn create_strategy(kind: StrategyKind) -> Box<dyn ValidationStrategy> {
	match kind {
		StrategyKind::Identity => Box::new(IdentityStrategy),
		StrategyKind::TokenController => Box::new(TokenControllerStrategy),
	}
}

/// Routes requests to the strategy their contract and action call for.
pub struct StrategyService {
	env: StrategyEnv,
	strategies: HashMap<StrategyKind, Box<dyn ValidationStrategy>>,
	availability: AvailabilityStrategy,
}

impl StrategyService {
	pub fn new(env: StrategyEnv) -> Self {
		let strategies = [StrategyKind::Identity, StrategyKind::TokenController]
			.into_iter()
			.map(|kind| (kind, create_strategy(kind)))
			.collect();

		Self {
			env,
			strategies,
			availability: AvailabilityStrategy,
		}
	}

	pub fn env(&self) -> &StrategyEnv {
		&self.env
	}

	/// Evaluates `request` addressed to `contract`.
	pub async fn evaluate(
		&self,
		contract: &ContractDescriptor,
		request: &RelayRequest,
	) -> Result<Decision, StrategyError> {
		let decision = match &request.action {
			RelayAction::Transaction(call) => {
				let strategy = self.strategies.get(&contract.strategy).ok_or_else(|| {
					StrategyError::Config(format!("No strategy for kind {}", contract.strategy))
				})?;
				strategy.validate(contract, request, call, &self.env).await?
			}
			RelayAction::Availability(query) => self.availability.quote(query, &self.env).await?,
		};

		if let Some(reason) = decision.reason() {
			debug!(
				contract = %contract.name,
				action = request.action.name(),
				reason,
				"Request rejected"
			);
		}

		Ok(decision)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_gas_price_policy() {
		let policy = GasPricePolicy {
			modifier: 2,
			max_price: U256::from(100),
		};
		assert_eq!(policy.apply(10), 12);
		assert_eq!(policy.apply(99), 100);

		let discount = GasPricePolicy {
			modifier: -5,
			max_price: U256::from(100),
		};
		assert_eq!(discount.apply(10), 5);
		assert_eq!(discount.apply(3), 0);

		let uncapped = GasPricePolicy {
			modifier: 0,
			max_price: U256::MAX,
		};
		assert_eq!(uncapped.apply(u128::MAX), u128::MAX);
	}

	#[tokio::test]
	async fn test_routes_by_action_and_kind() {
		use relayer_types::{AvailabilityQuery, Bytes};
		use crate::testing::*;

		let ledger = controller_ledger(U256::MAX);
		let service = StrategyService::new(env(&ledger, SNT_RATE));
		let contract = controller_contract();

		let probe = RelayRequest {
			contract: CONTROLLER,
			actor: None,
			action: RelayAction::Availability(AvailabilityQuery {
				gas_token: SNT,
				gas_price: U256::ZERO,
			}),
			raw_payload: Bytes::new(),
		};
		let decision = service.evaluate(&contract, &probe).await.unwrap();
		assert!(matches!(
			decision,
			Decision::Accept(relayer_types::Acceptance { min_price: Some(_), estimated_gas: None, .. })
		));

		let transfer = request(
			CONTROLLER,
			Some(ACTOR),
			transfer_snt(U256::ZERO, amount(MIN_SNT_GAS_PRICE)),
		);
		let decision = service.evaluate(&contract, &transfer).await.unwrap();
		assert!(decision.is_accepted());
		assert_eq!(ledger.call_count("estimate_gas"), 1);
	}

	#[test]
	fn test_every_kind_has_a_strategy() {
		for kind in [StrategyKind::Identity, StrategyKind::TokenController] {
			assert_eq!(create_strategy(kind).kind(), kind);
		}
	}
}
