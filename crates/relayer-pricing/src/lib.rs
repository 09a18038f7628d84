//! Exchange rates for fee tokens.
//!
//! A rate is the amount of native currency, in its smallest unit, that one
//! whole token is worth. Each non-native fee token is configured with a price
//! source; [`PriceService`] caches the source's answer for the token's
//! refresh period.

use async_trait::async_trait;
use relayer_types::{ConfigSchema, U256};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

pub mod implementations {
	pub mod fixed;
	pub mod http;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
	/// The source could not be reached or answered with an error status.
	#[error("Price source unavailable: {0}")]
	Unavailable(String),
	/// The source answered, but not with a usable number.
	#[error("Invalid price value: {0}")]
	InvalidValue(String),
	#[error("Configuration error: {0}")]
	Config(String),
}

#[async_trait]
pub trait PriceInterface: Send + Sync {
	/// Schema for this implementation's `price_plugin` table.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Current rate for the token with the given symbol.
	async fn fetch_rate(&self, symbol: &str) -> Result<U256, PricingError>;
}

struct CachedRate {
	rate: U256,
	fetched_at: Instant,
}

/// A price source with a refresh-period cache.
///
/// Failures are not cached; the next lookup asks the source again.
pub struct PriceService {
	source: Box<dyn PriceInterface>,
	refresh_period: Duration,
	cached: RwLock<Option<CachedRate>>,
}

impl PriceService {
	pub fn new(source: Box<dyn PriceInterface>, refresh_period: Duration) -> Self {
		Self {
			source,
			refresh_period,
			cached: RwLock::new(None),
		}
	}

	pub async fn get_rate(&self, symbol: &str) -> Result<U256, PricingError> {
		if let Some(cached) = self.cached.read().await.as_ref() {
			if cached.fetched_at.elapsed() < self.refresh_period {
				return Ok(cached.rate);
			}
		}

		let rate = self.source.fetch_rate(symbol).await?;
		debug!(symbol, %rate, "Refreshed exchange rate");

		*self.cached.write().await = Some(CachedRate {
			rate,
			fetched_at: Instant::now(),
		});
		Ok(rate)
	}
}

/// Creates a price source from a `price_plugin` table, selected by `type`.
pub fn create_price_source(config: &toml::Value) -> Result<Box<dyn PriceInterface>, PricingError> {
	let kind = config
		.get("type")
		.and_then(|v| v.as_str())
		.ok_or_else(|| PricingError::Config("price_plugin requires a 'type'".to_string()))?;

	match kind {
		"fixed" => implementations::fixed::create_fixed_price(config),
		"http" => implementations::http::create_http_price_feed(config),
		other => Err(PricingError::Config(format!("Unknown price source type: {}", other))),
	}
}
