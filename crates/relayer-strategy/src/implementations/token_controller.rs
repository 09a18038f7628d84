//! Token controller strategy.
//!
//! A controller lives at a fixed address whose code was fingerprinted at
//! startup; the code is compared again on every request. Fees are paid by
//! the actor in the controller's configured token and are bounded by the
//! simulated gas rather than by a signed limit.

use crate::pipeline::{self, conclude, reject, Step};
use crate::{reasons, StrategyEnv, StrategyError, ValidationStrategy};
use async_trait::async_trait;
use relayer_registry::ContractDescriptor;
use relayer_types::{Acceptance, Decision, FunctionCall, RelayRequest, Rejection, StrategyKind, U256};
use tracing::{debug, warn};

pub struct TokenControllerStrategy;

impl TokenControllerStrategy {
	async fn run(
		&self,
		contract: &ContractDescriptor,
		request: &RelayRequest,
		call: &FunctionCall,
		env: &StrategyEnv,
	) -> Step<Acceptance> {
		let controller = contract.address.ok_or_else(|| {
			StrategyError::Config(format!("Token controller {} has no address", contract.name))
		})?;

		let code_hash = env.ledger.code_hash(controller).await?;
		if code_hash.is_none() || code_hash != contract.bytecode_fingerprint {
			warn!(contract = %contract.name, address = %controller, "Deployed code changed");
			return reject(reasons::INVALID_CONTRACT_CODE);
		}

		let (function, params) = pipeline::decode(contract, call)?;
		let gas_price = pipeline::uint_param(&params, "_gasPrice")?;

		let token = env
			.tokens
			.get_by_symbol(&contract.fee_token_symbol)
			.ok_or_else(|| Rejection::new(reasons::TOKEN_NOT_ALLOWED))?;
		let actor = request
			.actor
			.ok_or_else(|| Rejection::new(reasons::INVALID_ACTOR))?;

		let estimated_gas = pipeline::simulate(env, controller, call).await?;

		let balance = env.ledger.token_balance(token.address, actor).await?;
		let required_gas = pipeline::fee(gas_price, U256::from(estimated_gas))?;
		pipeline::ensure_covers_fee(balance, required_gas)?;

		let quote = pipeline::quote(env, token).await?;
		pipeline::ensure_gas_price(gas_price, &quote)?;

		match function.name.as_str() {
			"transferSNT" => {
				let amount = pipeline::uint_param(&params, "_amount")?;
				match amount.checked_add(required_gas) {
					Some(needed) if balance >= needed => {}
					_ => return reject(reasons::insufficient_transfer_balance(required_gas)),
				}
			}
			"executeGasRelayed" => {
				let gas_minimal = pipeline::uint_param(&params, "_gasMinimal")?;
				let minimal = gas_price.checked_mul(gas_minimal).unwrap_or(U256::MAX);
				let required = minimal.max(required_gas);
				if balance < required {
					return reject(reasons::insufficient_minimal_gas(required));
				}
			}
			_ => {}
		}

		debug!(
			controller = %controller,
			actor = %actor,
			function = %function.name,
			estimated_gas,
			"Controller call accepted"
		);

		Ok(Acceptance {
			estimated_gas: Some(estimated_gas),
			native_gas_price: Some(quote.native_gas_price),
			min_price: None,
		})
	}
}

#[async_trait]
impl ValidationStrategy for TokenControllerStrategy {
	fn kind(&self) -> StrategyKind {
		StrategyKind::TokenController
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
	use relayer_ledger::implementations::memory::InMemoryLedger;
	use relayer_ledger::LedgerError;
	use relayer_types::Address;

	/// `MIN_SNT_GAS_PRICE * ESTIMATE`.
	fn required_gas() -> U256 {
		amount(MIN_SNT_GAS_PRICE) * amount(ESTIMATE)
	}

	async fn evaluate(
		ledger: &InMemoryLedger,
		actor: Option<Address>,
		call: FunctionCall,
	) -> Result<Decision, StrategyError> {
		let env = env(ledger, SNT_RATE);
		let request = request(CONTROLLER, actor, call.clone());
		TokenControllerStrategy
			.validate(&controller_contract(), &request, &call, &env)
			.await
	}

	#[tokio::test]
	async fn test_transfer_with_exact_balance() {
		let value = amount(5_000_000);
		let ledger = controller_ledger(value + required_gas());

		let decision = evaluate(&ledger, Some(ACTOR), transfer_snt(value, amount(MIN_SNT_GAS_PRICE)))
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
	async fn test_transfer_one_unit_short() {
		let value = amount(5_000_000);
		let ledger = controller_ledger(value + required_gas() - U256::from(1));

		let decision = evaluate(&ledger, Some(ACTOR), transfer_snt(value, amount(MIN_SNT_GAS_PRICE)))
			.await
			.unwrap();

		assert_eq!(
			decision.reason(),
			Some("Address has not enough balance to transfer specified value + fees (100000000000000000)")
		);
	}

	#[tokio::test]
	async fn test_fee_checked_against_estimate() {
		let ledger = controller_ledger(required_gas() - U256::from(1));

		let decision = evaluate(&ledger, Some(ACTOR), transfer_snt(U256::ZERO, amount(MIN_SNT_GAS_PRICE)))
			.await
			.unwrap();

		assert_eq!(decision.reason(), Some(reasons::INSUFFICIENT_FEE_BALANCE));
		assert_eq!(ledger.call_count("estimate_gas"), 1);
	}

	#[tokio::test]
	async fn test_minimal_gas_must_be_covered() {
		let gas_minimal = amount(2 * ESTIMATE);
		let minimal_fee = amount(MIN_SNT_GAS_PRICE) * gas_minimal;

		let short = controller_ledger(minimal_fee - U256::from(1));
		let decision = evaluate(
			&short,
			Some(ACTOR),
			execute_gas_relayed(amount(MIN_SNT_GAS_PRICE), gas_minimal),
		)
		.await
		.unwrap();
		assert_eq!(
			decision.reason(),
			Some("Address has not enough balance to pay minimal gas (200000000000000000)")
		);

		let funded = controller_ledger(minimal_fee);
		let decision = evaluate(
			&funded,
			Some(ACTOR),
			execute_gas_relayed(amount(MIN_SNT_GAS_PRICE), gas_minimal),
		)
		.await
		.unwrap();
		assert!(decision.is_accepted());
	}

	#[tokio::test]
	async fn test_actor_required() {
		let ledger = controller_ledger(U256::MAX);

		let decision = evaluate(&ledger, None, transfer_snt(U256::ZERO, amount(MIN_SNT_GAS_PRICE)))
			.await
			.unwrap();

		assert_eq!(decision.reason(), Some(reasons::INVALID_ACTOR));
		assert_eq!(ledger.call_count("estimate_gas"), 0);
	}

	#[tokio::test]
	async fn test_changed_code_is_rejected() {
		let ledger = controller_ledger(U256::MAX).with_code(CONTROLLER, vec![0x00u8]);

		let decision = evaluate(&ledger, Some(ACTOR), transfer_snt(U256::ZERO, amount(MIN_SNT_GAS_PRICE)))
			.await
			.unwrap();
		assert_eq!(decision.reason(), Some(reasons::INVALID_CONTRACT_CODE));

		let removed = controller_ledger(U256::MAX).with_code(CONTROLLER, Vec::<u8>::new());
		let decision = evaluate(&removed, Some(ACTOR), transfer_snt(U256::ZERO, amount(MIN_SNT_GAS_PRICE)))
			.await
			.unwrap();
		assert_eq!(decision.reason(), Some(reasons::INVALID_CONTRACT_CODE));
	}

	#[tokio::test]
	async fn test_failed_simulation() {
		let ledger = controller_ledger(U256::MAX)
			.with_gas_estimate(CONTROLLER, Err(LedgerError::Rpc("insufficient funds".to_string())));

		let decision = evaluate(&ledger, Some(ACTOR), transfer_snt(U256::ZERO, amount(MIN_SNT_GAS_PRICE)))
			.await
			.unwrap();
		assert_eq!(decision.reason(), Some(reasons::WILL_FAIL));
	}
}
