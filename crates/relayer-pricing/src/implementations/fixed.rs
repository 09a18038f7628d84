//! Constant exchange rate.

use crate::{PriceInterface, PricingError};
use async_trait::async_trait;
use relayer_types::{parse_amount, ConfigSchema, Field, FieldType, Schema, ValidationError, U256};

/// Always answers with the configured rate.
pub struct FixedPrice {
	rate: U256,
}

impl FixedPrice {
	pub fn new(rate: U256) -> Self {
		Self { rate }
	}
}

pub struct FixedPriceSchema;

impl ConfigSchema for FixedPriceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![Field::new("rate", FieldType::Amount)], vec![]).validate(config)
	}
}

#[async_trait]
impl PriceInterface for FixedPrice {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FixedPriceSchema)
	}

	async fn fetch_rate(&self, _symbol: &str) -> Result<U256, PricingError> {
		Ok(self.rate)
	}
}

/// Configuration parameters:
/// - `rate`: native smallest units per whole token, integer or string
pub fn create_fixed_price(config: &toml::Value) -> Result<Box<dyn PriceInterface>, PricingError> {
	FixedPriceSchema
		.validate(config)
		.map_err(|e| PricingError::Config(e.to_string()))?;

	let rate = config
		.get("rate")
		.ok_or_else(|| PricingError::Config("rate is required".to_string()))
		.and_then(|v| parse_amount(v).map_err(PricingError::Config))?;

	Ok(Box::new(FixedPrice::new(rate)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_fixed_rate() {
		let config: toml::Value = toml::from_str("type = \"fixed\"\nrate = \"200000000000000\"").unwrap();
		let source = create_fixed_price(&config).unwrap();

		assert_eq!(
			source.fetch_rate("SNT").await.unwrap(),
			U256::from(200_000_000_000_000u64)
		);
	}

	#[test]
	fn test_rejects_negative_rate() {
		let config: toml::Value = toml::from_str("rate = -1").unwrap();
		assert!(matches!(create_fixed_price(&config), Err(PricingError::Config(_))));
	}
}
