//! Identity contract strategy.
//!
//! Identity instances are created by a factory, so there is no fixed address
//! to fingerprint. Instead each request's target must run a kernel the
//! factory vouches for. Identities pay fees from their own balance in the
//! token named by `_gasToken`, up to the explicit `_gasLimit` they sign.

use crate::pipeline::{self, conclude, reject, Step};
use crate::{reasons, StrategyEnv, StrategyError, ValidationStrategy};
use async_trait::async_trait;
use relayer_registry::ContractDescriptor;
use relayer_types::{Acceptance, Decision, FunctionCall, RelayRequest, StrategyKind};
use tracing::debug;

pub struct IdentityStrategy;

impl IdentityStrategy {
	async fn run(
		&self,
		contract: &ContractDescriptor,
		request: &RelayRequest,
		call: &FunctionCall,
		env: &StrategyEnv,
	) -> Step<Acceptance> {
		let identity = request.contract;
		let (factory, kernel) = match (contract.factory_address, contract.kernel_verification) {
			(Some(factory), Some(kernel)) => (factory, kernel),
			_ => {
				return Err(StrategyError::Config(format!(
					"Identity contract {} has no kernel verification",
					contract.name
				))
				.into())
			}
		};

		if !env.ledger.verify_kernel(factory, kernel, identity).await? {
			return reject(reasons::INVALID_IDENTITY);
		}

		let (function, params) = pipeline::decode(contract, call)?;
		let gas_price = pipeline::uint_param(&params, "_gasPrice")?;
		let gas_limit = pipeline::uint_param(&params, "_gasLimit")?;
		let gas_token = pipeline::address_param(&params, "_gasToken")?;

		let token = pipeline::token_by_address(env, gas_token)?;
		let balance = env.ledger.token_balance(token.address, identity).await?;
		let required = pipeline::fee(gas_price, gas_limit)?;
		pipeline::ensure_covers_fee(balance, required)?;

		let estimated_gas = pipeline::simulate(env, identity, call).await?;
		pipeline::ensure_gas_limit(gas_limit, estimated_gas)?;

		let quote = pipeline::quote(env, token).await?;
		pipeline::ensure_gas_price(gas_price, &quote)?;

		if function.is_token {
			let base_token = pipeline::address_param(&params, "_baseToken")?;
			let value = pipeline::uint_param(&params, "_value")?;
			let base_balance = env.ledger.token_balance(base_token, identity).await?;
			if base_balance < value {
				return reject(reasons::INSUFFICIENT_BASE_TOKEN);
			}
		}

		debug!(
			identity = %identity,
			function = %function.name,
			estimated_gas,
			"Identity call accepted"
		);

		Ok(Acceptance {
			estimated_gas: Some(estimated_gas),
			native_gas_price: Some(quote.native_gas_price),
			min_price: None,
		})
	}
}

#[async_trait]
impl ValidationStrategy for IdentityStrategy {
	fn kind(&self) -> StrategyKind {
		StrategyKind::Identity
	}

	async fn validate(
		&self,
		contract: &ContractDescriptor,
		request: &RelayRequest,
		call: &FunctionCall,
		env: &StrategyEnv,
	) -> Result<Decision, StrategyError> {
		conclude(self.run(contract, request, call, env).await)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::*;
	use alloy::dyn_abi::DynSolValue;
	use relayer_ledger::LedgerError;
	use relayer_types::{Address, Bytes, U256};

	const GAS_LIMIT: u64 = 150_000;

	/// Balance needed for a call paying `gas_price` up to `gas_limit`.
	fn required(gas_price: u64, gas_limit: u64) -> U256 {
		U256::from(gas_price) * U256::from(gas_limit)
	}

	async fn evaluate(
		ledger: &relayer_ledger::implementations::memory::InMemoryLedger,
		snt_min_rate: u64,
		call: FunctionCall,
	) -> Result<Decision, StrategyError> {
		let env = env(ledger, snt_min_rate);
		let request = request(IDENTITY, None, call.clone());
		IdentityStrategy
			.validate(&identity_contract(), &request, &call, &env)
			.await
	}

	fn snt_call(gas_price: u64, gas_limit: u64) -> FunctionCall {
		call_gas_relayed(amount(gas_price), amount(gas_limit), SNT)
	}

	#[tokio::test]
	async fn test_accepts_with_exact_balance() {
		let ledger = identity_ledger(required(MIN_SNT_GAS_PRICE, GAS_LIMIT));

		let decision = evaluate(&ledger, SNT_RATE, snt_call(MIN_SNT_GAS_PRICE, GAS_LIMIT))
			.await
			.unwrap();

		assert_eq!(
			decision,
			Decision::Accept(Acceptance {
				estimated_gas: Some(ESTIMATE),
				native_gas_price: Some(NATIVE_GAS_PRICE),
				min_price: None,
			})
		);
	}

	#[tokio::test]
	async fn test_rejects_one_unit_short_of_fee() {
		let ledger = identity_ledger(required(MIN_SNT_GAS_PRICE, GAS_LIMIT) - U256::from(1));

		let decision = evaluate(&ledger, SNT_RATE, snt_call(MIN_SNT_GAS_PRICE, GAS_LIMIT))
			.await
			.unwrap();

		assert_eq!(decision.reason(), Some(reasons::INSUFFICIENT_FEE_BALANCE));
		assert_eq!(ledger.call_count("estimate_gas"), 0);
	}

	#[tokio::test]
	async fn test_unknown_kernel_skips_simulation() {
		let ledger = identity_ledger(U256::MAX).with_code(IDENTITY, vec![0xfeu8]);

		let decision = evaluate(&ledger, SNT_RATE, snt_call(MIN_SNT_GAS_PRICE, GAS_LIMIT))
			.await
			.unwrap();

		assert_eq!(decision.reason(), Some(reasons::INVALID_IDENTITY));
		assert_eq!(ledger.call_count("estimate_gas"), 0);
	}

	#[tokio::test]
	async fn test_gas_token_must_be_configured() {
		let ledger = identity_ledger(U256::MAX);
		let call = call_gas_relayed(
			amount(MIN_SNT_GAS_PRICE),
			amount(GAS_LIMIT),
			Address::repeat_byte(0x42),
		);

		let decision = evaluate(&ledger, SNT_RATE, call).await.unwrap();
		assert_eq!(decision.reason(), Some(reasons::TOKEN_NOT_ALLOWED));
	}

	#[tokio::test]
	async fn test_gas_limit_below_estimate() {
		let ledger = identity_ledger(U256::MAX);

		let decision = evaluate(&ledger, SNT_RATE, snt_call(MIN_SNT_GAS_PRICE, ESTIMATE - 1))
			.await
			.unwrap();
		assert_eq!(decision.reason(), Some(reasons::GAS_LIMIT_TOO_LOW));
	}

	#[tokio::test]
	async fn test_simulation_outcomes() {
		let reverting = identity_ledger(U256::MAX)
			.with_gas_estimate(IDENTITY, Err(LedgerError::Reverted("nonce".to_string())));
		let decision = evaluate(&reverting, SNT_RATE, snt_call(MIN_SNT_GAS_PRICE, GAS_LIMIT))
			.await
			.unwrap();
		assert_eq!(decision.reason(), Some(reasons::WILL_REVERT));

		let failing = identity_ledger(U256::MAX)
			.with_gas_estimate(IDENTITY, Err(LedgerError::Rpc("out of gas".to_string())));
		let decision = evaluate(&failing, SNT_RATE, snt_call(MIN_SNT_GAS_PRICE, GAS_LIMIT))
			.await
			.unwrap();
		assert_eq!(decision.reason(), Some(reasons::WILL_FAIL));
	}

	#[tokio::test]
	async fn test_rate_floor_is_inclusive() {
		let ledger = identity_ledger(U256::MAX);

		let at_floor = evaluate(&ledger, SNT_RATE, snt_call(MIN_SNT_GAS_PRICE, GAS_LIMIT))
			.await
			.unwrap();
		assert!(at_floor.is_accepted());

		let below_floor = evaluate(&ledger, SNT_RATE + 1, snt_call(MIN_SNT_GAS_PRICE, GAS_LIMIT))
			.await
			.unwrap();
		assert_eq!(below_floor.reason(), Some("Not accepting SNT at current rate"));
	}

	#[tokio::test]
	async fn test_offered_gas_price_below_minimum() {
		let ledger = identity_ledger(U256::MAX);

		let decision = evaluate(&ledger, SNT_RATE, snt_call(MIN_SNT_GAS_PRICE - 1, GAS_LIMIT))
			.await
			.unwrap();
		assert_eq!(decision.reason(), Some(reasons::GAS_PRICE_TOO_LOW));
	}

	#[tokio::test]
	async fn test_native_gas_token() {
		let fee = U256::from(NATIVE_GAS_PRICE) * amount(GAS_LIMIT);
		let ledger = identity_ledger(U256::ZERO).with_balance(IDENTITY, fee);
		let call = call_gas_relayed(U256::from(NATIVE_GAS_PRICE), amount(GAS_LIMIT), Address::ZERO);

		let decision = evaluate(&ledger, SNT_RATE, call).await.unwrap();
		assert!(decision.is_accepted());
	}

	#[tokio::test]
	async fn test_price_feed_down() {
		let ledger = identity_ledger(U256::ZERO).with_token_balance(DOWN_TOKEN, IDENTITY, U256::MAX);
		let call = call_gas_relayed(amount(MIN_SNT_GAS_PRICE), amount(GAS_LIMIT), DOWN_TOKEN);

		let decision = evaluate(&ledger, SNT_RATE, call).await.unwrap();
		assert_eq!(decision.reason(), Some(reasons::PRICE_UNAVAILABLE));
	}

	#[tokio::test]
	async fn test_base_token_balance_checked_for_token_calls() {
		let base_token = Address::repeat_byte(0x77);
		let value = amount(1_000);
		let call = encode(
			&identity_contract(),
			APPROVE_AND_CALL,
			vec![
				DynSolValue::Address(base_token),
				DynSolValue::Address(ACTOR),
				uint(value),
				DynSolValue::Bytes(vec![]),
				uint(U256::from(1)),
				uint(amount(MIN_SNT_GAS_PRICE)),
				uint(amount(GAS_LIMIT)),
				DynSolValue::Address(SNT),
				DynSolValue::Bytes(vec![0xaa; 65]),
			],
		);

		let short = identity_ledger(U256::MAX).with_token_balance(base_token, IDENTITY, value - U256::from(1));
		let decision = evaluate(&short, SNT_RATE, call.clone()).await.unwrap();
		assert_eq!(decision.reason(), Some(reasons::INSUFFICIENT_BASE_TOKEN));

		let funded = identity_ledger(U256::MAX).with_token_balance(base_token, IDENTITY, value);
		let decision = evaluate(&funded, SNT_RATE, call).await.unwrap();
		assert!(decision.is_accepted());
	}

	#[tokio::test]
	async fn test_malformed_call_data() {
		let ledger = identity_ledger(U256::MAX);
		let mut call = snt_call(MIN_SNT_GAS_PRICE, GAS_LIMIT);
		call.call_data = Bytes::copy_from_slice(&call.call_data[..40]);

		let decision = evaluate(&ledger, SNT_RATE, call).await.unwrap();
		assert_eq!(decision.reason(), Some(reasons::MALFORMED_PARAMETERS));
	}

	#[tokio::test]
	async fn test_unreachable_ledger_is_an_error() {
		let ledger = identity_ledger(U256::MAX);
		ledger.set_unavailable(true);

		let result = evaluate(&ledger, SNT_RATE, snt_call(MIN_SNT_GAS_PRICE, GAS_LIMIT)).await;
		assert!(matches!(result, Err(StrategyError::Ledger(LedgerError::Unavailable(_)))));
	}
}
