//! Checks shared by the strategies.
//!
//! Every step returns a [`Step`], so a strategy reads as a straight sequence
//! of `?`-chained checks that stops at the first rejection or failure.

use crate::reasons;
use crate::{StrategyEnv, StrategyError};
use relayer_ledger::LedgerError;
use relayer_registry::{ContractDescriptor, DecodedCall, FunctionDescriptor, TokenDescriptor};
use relayer_types::utils::div_ceil;
use relayer_types::{Acceptance, Address, CallRequest, Decision, FunctionCall, Rejection, U256};
use tracing::{debug, warn};

/// Why a strategy stopped early.
pub(crate) enum Halt {
	Reject(Rejection),
	Fail(StrategyError),
}

impl From<Rejection> for Halt {
	fn from(rejection: Rejection) -> Self {
		Halt::Reject(rejection)
	}
}

impl From<StrategyError> for Halt {
	fn from(error: StrategyError) -> Self {
		Halt::Fail(error)
	}
}

impl From<LedgerError> for Halt {
	fn from(error: LedgerError) -> Self {
		Halt::Fail(StrategyError::Ledger(error))
	}
}

pub(crate) type Step<T> = Result<T, Halt>;

pub(crate) fn reject<T>(reason: impl Into<String>) -> Step<T> {
	Err(Halt::Reject(Rejection::new(reason)))
}

/// Turns the outcome of a chain of steps into a decision.
pub(crate) fn conclude(outcome: Step<Acceptance>) -> Result<Decision, StrategyError> {
	match outcome {
		Ok(acceptance) => Ok(Decision::Accept(acceptance)),
		Err(Halt::Reject(rejection)) => Ok(Decision::Reject(rejection)),
		Err(Halt::Fail(error)) => Err(error),
	}
}

/// Native gas price and the matching minimum token gas price.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Quote {
	pub native_gas_price: u128,
	pub min_token_price: U256,
}

/// Looks up the allow-listed function and decodes the call.
pub(crate) fn decode<'a>(
	contract: &'a ContractDescriptor,
	call: &FunctionCall,
) -> Step<(&'a FunctionDescriptor, DecodedCall)> {
	let function = contract
		.function(&call.selector)
		.ok_or_else(|| Rejection::new(reasons::FUNCTION_NOT_ALLOWED))?;
	let decoded = function.decode(&call.call_data).map_err(|e| {
		debug!(function = %function.name, error = %e, "Failed to decode call");
		Rejection::new(reasons::MALFORMED_PARAMETERS)
	})?;
	Ok((function, decoded))
}

pub(crate) fn address_param(decoded: &DecodedCall, name: &str) -> Step<Address> {
	decoded
		.address(name)
		.ok_or_else(|| Halt::Reject(Rejection::new(reasons::MALFORMED_PARAMETERS)))
}

pub(crate) fn uint_param(decoded: &DecodedCall, name: &str) -> Step<U256> {
	decoded
		.uint(name)
		.ok_or_else(|| Halt::Reject(Rejection::new(reasons::MALFORMED_PARAMETERS)))
}

pub(crate) fn token_by_address(env: &StrategyEnv, address: Address) -> Step<&TokenDescriptor> {
	env.tokens
		.get_by_address(&address)
		.ok_or_else(|| Halt::Reject(Rejection::new(reasons::TOKEN_NOT_ALLOWED)))
}

/// `gas_price * gas`. A fee that overflows cannot be covered by any balance.
pub(crate) fn fee(gas_price: U256, gas: U256) -> Step<U256> {
	match gas_price.checked_mul(gas) {
		Some(fee) => Ok(fee),
		None => reject(reasons::INSUFFICIENT_FEE_BALANCE),
	}
}

/// Balance must cover the fee; equal is enough.
pub(crate) fn ensure_covers_fee(balance: U256, required: U256) -> Step<()> {
	if balance < required {
		return reject(reasons::INSUFFICIENT_FEE_BALANCE);
	}
	Ok(())
}

/// Simulates `call` against `to` from the relayer's account.
pub(crate) async fn simulate(env: &StrategyEnv, to: Address, call: &FunctionCall) -> Step<u64> {
	let request = CallRequest::new(to, call.call_data.clone()).from(env.relayer);

	match env.ledger.estimate_gas(&request).await {
		Ok(gas) => Ok(gas),
		Err(LedgerError::Reverted(reason)) => {
			debug!(to = %to, reason = %reason, "Simulation reverted");
			reject(reasons::WILL_REVERT)
		}
		Err(e) if e.is_execution_failure() => {
			debug!(to = %to, error = %e, "Simulation failed");
			reject(reasons::WILL_FAIL)
		}
		Err(e) => Err(e.into()),
	}
}

/// Explicit gas limits must leave room for the estimate.
pub(crate) fn ensure_gas_limit(gas_limit: U256, estimated: u64) -> Step<()> {
	if U256::from(estimated) > gas_limit {
		return reject(reasons::GAS_LIMIT_TOO_LOW);
	}
	Ok(())
}

/// Rate, rate floor and the minimum gas price in token units.
pub(crate) async fn quote(env: &StrategyEnv, token: &TokenDescriptor) -> Step<Quote> {
	let rate = exchange_rate(env, token).await?;
	if rate < token.min_accepted_rate {
		return reject(reasons::rate_not_accepted(&token.symbol));
	}
	price_at(env, token, rate).await
}

/// Minimum gas price in token units, without the rate floor.
pub(crate) async fn advertised_quote(env: &StrategyEnv, token: &TokenDescriptor) -> Step<Quote> {
	let rate = exchange_rate(env, token).await?;
	price_at(env, token, rate).await
}

async fn exchange_rate(env: &StrategyEnv, token: &TokenDescriptor) -> Step<U256> {
	match env.tokens.get_exchange_rate(token).await {
		Ok(rate) => Ok(rate),
		Err(e) => {
			warn!(symbol = %token.symbol, error = %e, "Exchange rate unavailable");
			reject(reasons::PRICE_UNAVAILABLE)
		}
	}
}

/// `ceil(native * 10^decimals / rate)`, with the native price taken fresh
/// from the node and adjusted by the relayer's policy.
async fn price_at(env: &StrategyEnv, token: &TokenDescriptor, rate: U256) -> Step<Quote> {
	let native_gas_price = env.gas_policy.apply(env.ledger.gas_price().await?);

	let min_token_price = U256::from(native_gas_price)
		.checked_mul(token.unit())
		.and_then(|scaled| div_ceil(scaled, rate));
	let Some(min_token_price) = min_token_price else {
		warn!(symbol = %token.symbol, rate = %rate, "Cannot convert gas price at this rate");
		return reject(reasons::PRICE_UNAVAILABLE);
	};

	Ok(Quote {
		native_gas_price,
		min_token_price,
	})
}

pub(crate) fn ensure_gas_price(offered: U256, quote: &Quote) -> Step<()> {
	if offered < quote.min_token_price {
		return reject(reasons::GAS_PRICE_TOO_LOW);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fee_boundaries() {
		assert_eq!(fee(U256::from(3), U256::from(7)).ok(), Some(U256::from(21)));
		assert!(matches!(fee(U256::MAX, U256::from(2)), Err(Halt::Reject(_))));

		assert!(ensure_covers_fee(U256::from(21), U256::from(21)).is_ok());
		assert!(ensure_covers_fee(U256::from(20), U256::from(21)).is_err());
	}

	#[test]
	fn test_gas_limit_boundary() {
		assert!(ensure_gas_limit(U256::from(100), 100).is_ok());
		assert!(ensure_gas_limit(U256::from(99), 100).is_err());
	}
}
