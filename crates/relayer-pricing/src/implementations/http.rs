//! JSON price feed over HTTP.
//!
//! The feed is queried with a GET request to a URL template in which
//! `{symbol}` is replaced by the token symbol, for example
//! `https://min-api.cryptocompare.com/data/price?fsym={symbol}&tsyms=ETH`.
//! The price is read from a dotted path in the response (`ETH` in the example
//! above), expressed in whole native units per whole token, and converted to
//! native smallest units with exact decimal arithmetic.

use crate::{PriceInterface, PricingError};
use async_trait::async_trait;
use relayer_types::{ConfigSchema, Field, FieldType, Schema, ValidationError, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub struct HttpPriceFeed {
	client: reqwest::Client,
	url_template: String,
	path: Vec<String>,
	native_decimals: u32,
}

impl HttpPriceFeed {
	pub fn new(
		url_template: impl Into<String>,
		path: &str,
		native_decimals: u32,
		timeout: Duration,
	) -> Result<Self, PricingError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| PricingError::Config(format!("Failed to build HTTP client: {}", e)))?;

		Ok(Self {
			client,
			url_template: url_template.into(),
			path: path.split('.').map(str::to_string).collect(),
			native_decimals,
		})
	}

	fn url_for(&self, symbol: &str) -> String {
		self.url_template.replace("{symbol}", symbol)
	}

	/// Walks the configured path and scales the number found there.
	fn extract_rate(&self, body: &serde_json::Value) -> Result<U256, PricingError> {
		let mut node = body;
		for key in &self.path {
			node = node
				.get(key.as_str())
				.ok_or_else(|| PricingError::InvalidValue(format!("missing '{}' in response", key)))?;
		}

		let raw = match node {
			serde_json::Value::Number(n) => n.to_string(),
			serde_json::Value::String(s) => s.clone(),
			other => return Err(PricingError::InvalidValue(format!("not a number: {}", other))),
		};

		let price = Decimal::from_str(&raw)
			.or_else(|_| Decimal::from_scientific(&raw))
			.map_err(|_| PricingError::InvalidValue(format!("not a number: {}", raw)))?;

		to_smallest_units(price, self.native_decimals)
	}
}

/// `price * 10^decimals`, truncated toward zero.
fn to_smallest_units(price: Decimal, decimals: u32) -> Result<U256, PricingError> {
	if price.is_sign_negative() {
		return Err(PricingError::InvalidValue(format!("negative price {}", price)));
	}

	let scale = 10u64
		.checked_pow(decimals)
		.map(Decimal::from)
		.ok_or_else(|| PricingError::Config(format!("{} native decimals is too many", decimals)))?;

	price
		.checked_mul(scale)
		.and_then(|v| v.trunc().to_u128())
		.map(U256::from)
		.ok_or_else(|| PricingError::InvalidValue(format!("price {} out of range", price)))
}

pub struct HttpPriceFeedSchema;

impl ConfigSchema for HttpPriceFeedSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(|value| {
				let url = value.as_str().unwrap_or_default();
				if url.starts_with("http://") || url.starts_with("https://") {
					Ok(())
				} else {
					Err("URL must start with http:// or https://".to_string())
				}
			})],
			vec![
				Field::new("path", FieldType::String),
				Field::new(
					"native_decimals",
					FieldType::Integer {
						min: Some(0),
						max: Some(19),
					},
				),
				Field::new(
					"timeout_ms",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl PriceInterface for HttpPriceFeed {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpPriceFeedSchema)
	}

	async fn fetch_rate(&self, symbol: &str) -> Result<U256, PricingError> {
		let url = self.url_for(symbol);

		let response = self
			.client
			.get(&url)
			.send()
			.await
			.map_err(|e| PricingError::Unavailable(e.to_string()))?;

		if !response.status().is_success() {
			warn!(symbol, status = %response.status(), "Price feed returned an error status");
			return Err(PricingError::Unavailable(format!(
				"price feed returned {}",
				response.status()
			)));
		}

		let body: serde_json::Value = response
			.json()
			.await
			.map_err(|e| PricingError::InvalidValue(format!("invalid JSON: {}", e)))?;

		self.extract_rate(&body)
	}
}

/// Configuration parameters:
/// - `url`: URL template, `{symbol}` is substituted
/// - `path`: dotted path to the price in the response (default `ETH`)
/// - `native_decimals`: decimals of the native currency (default 18)
/// - `timeout_ms`: request timeout (default 5000)
pub fn create_http_price_feed(config: &toml::Value) -> Result<Box<dyn PriceInterface>, PricingError> {
	HttpPriceFeedSchema
		.validate(config)
		.map_err(|e| PricingError::Config(e.to_string()))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| PricingError::Config("url is required".to_string()))?;
	let path = config.get("path").and_then(|v| v.as_str()).unwrap_or("ETH");
	let native_decimals = config
		.get("native_decimals")
		.and_then(|v| v.as_integer())
		.unwrap_or(18) as u32;
	let timeout_ms = config
		.get("timeout_ms")
		.and_then(|v| v.as_integer())
		.unwrap_or(5000) as u64;

	Ok(Box::new(HttpPriceFeed::new(
		url,
		path,
		native_decimals,
		Duration::from_millis(timeout_ms),
	)?))
}
