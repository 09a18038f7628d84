//! Fee token registry.

use crate::RegistryError;
use relayer_config::TokenConfig;
use relayer_pricing::{PriceInterface, PriceService, PricingError};
use relayer_types::{Address, U256};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// A configured fee token.
pub struct TokenDescriptor {
	pub address: Address,
	pub name: String,
	pub symbol: String,
	pub decimals: u8,
	/// Lowest accepted rate, in native smallest units per whole token.
	pub min_accepted_rate: U256,
	pub refresh_period: Duration,
	/// Absent for the native token.
	price: Option<PriceService>,
}

impl fmt::Debug for TokenDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TokenDescriptor")
			.field("address", &self.address)
			.field("symbol", &self.symbol)
			.field("decimals", &self.decimals)
			.field("min_accepted_rate", &self.min_accepted_rate)
			.field("has_price_source", &self.price.is_some())
			.finish()
	}
}

impl TokenDescriptor {
	pub fn is_native(&self) -> bool {
		self.address == Address::ZERO
	}

	/// `10^decimals`, the number of base units in one whole token.
	pub fn unit(&self) -> U256 {
		U256::from(10).pow(U256::from(self.decimals))
	}
}

/// Factory turning a `price_plugin` table into a price source.
pub type PriceSourceFactory<'a> = &'a dyn Fn(&toml::Value) -> Result<Box<dyn PriceInterface>, PricingError>;

/// Configured fee tokens. Immutable once built.
#[derive(Debug)]
pub struct TokenRegistry {
	tokens: Vec<TokenDescriptor>,
}

impl TokenRegistry {
	pub fn from_config(
		config: &BTreeMap<Address, TokenConfig>,
		price_factory: PriceSourceFactory<'_>,
	) -> Result<Self, RegistryError> {
		let mut tokens = Vec::with_capacity(config.len());

		for (address, token) in config {
			let refresh_period = Duration::from_secs(token.refresh_price_period_secs);
			let price = match (&token.price_plugin, *address == Address::ZERO) {
				(_, true) => None,
				(Some(plugin), false) => Some(PriceService::new(price_factory(plugin)?, refresh_period)),
				(None, false) => {
					return Err(RegistryError::Config(format!(
						"Token {} has no price source",
						token.symbol
					)))
				}
			};

			debug!(symbol = %token.symbol, address = %address, "Registered fee token");
			tokens.push(TokenDescriptor {
				address: *address,
				name: token.name.clone(),
				symbol: token.symbol.clone(),
				decimals: token.decimals,
				min_accepted_rate: token.min_accepted_rate,
				refresh_period,
				price,
			});
		}

		Ok(Self { tokens })
	}

	pub fn get_by_address(&self, address: &Address) -> Option<&TokenDescriptor> {
		self.tokens.iter().find(|t| t.address == *address)
	}

	/// Case-insensitive symbol lookup.
	pub fn get_by_symbol(&self, symbol: &str) -> Option<&TokenDescriptor> {
		self.tokens.iter().find(|t| t.symbol.eq_ignore_ascii_case(symbol))
	}

	/// Native smallest units per whole token.
	///
	/// The native token's rate is fixed at `10^decimals`; other tokens ask
	/// their price source.
	pub async fn get_exchange_rate(&self, token: &TokenDescriptor) -> Result<U256, RegistryError> {
		match &token.price {
			None => Ok(token.unit()),
			Some(price) => price
				.get_rate(&token.symbol)
				.await
				.map_err(|e| RegistryError::RateUnavailable {
					symbol: token.symbol.clone(),
					reason: e.to_string(),
				}),
		}
	}

	pub fn len(&self) -> usize {
		self.tokens.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tokens.is_empty()
	}
}
