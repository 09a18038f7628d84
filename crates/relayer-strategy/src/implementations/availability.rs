//! Availability probes.
//!
//! A probe asks whether the relayer accepts fees in a token and at what
//! minimum gas price. Nothing is simulated. Any configured token is
//! advertised; the rate floor only applies to actual transactions.

use crate::pipeline::{self, conclude, Step};
use crate::{StrategyEnv, StrategyError};
use relayer_types::{Acceptance, AvailabilityQuery, Decision};
use tracing::debug;

pub struct AvailabilityStrategy;

impl AvailabilityStrategy {
	/// Advertises the minimum token gas price for `query.gas_token`.
	pub async fn quote(&self, query: &AvailabilityQuery, env: &StrategyEnv) -> Result<Decision, StrategyError> {
		conclude(self.run(query, env).await)
	}

	async fn run(&self, query: &AvailabilityQuery, env: &StrategyEnv) -> Step<Acceptance> {
		let token = pipeline::token_by_address(env, query.gas_token)?;
		let quote = pipeline::advertised_quote(env, token).await?;

		debug!(
			symbol = %token.symbol,
			offered = %query.gas_price,
			min_price = %quote.min_token_price,
			"Availability quoted"
		);

		Ok(Acceptance {
			estimated_gas: None,
			native_gas_price: Some(quote.native_gas_price),
			min_price: Some(quote.min_token_price),
		})
	}
}
