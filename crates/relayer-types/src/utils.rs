//! Serde helpers for amounts that cross the wire as decimal strings.

use alloy::primitives::U256;
use serde::{Deserialize, Deserializer, Serializer};
use std::str::FromStr;

/// Serializes a `U256` as a base-10 string, `"1000"` rather than `"0x3e8"`.
pub mod decimal_u256 {
	use super::*;

	pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&value.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;
		U256::from_str(&raw).map_err(serde::de::Error::custom)
	}
}

/// `ceil(numerator / denominator)`; `None` when the denominator is zero.
pub fn div_ceil(numerator: U256, denominator: U256) -> Option<U256> {
	if denominator.is_zero() {
		return None;
	}
	let (quotient, remainder) = numerator.div_rem(denominator);
	Some(if remainder.is_zero() {
		quotient
	} else {
		quotient + U256::from(1)
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_div_ceil() {
		assert_eq!(div_ceil(U256::from(10), U256::from(5)), Some(U256::from(2)));
		assert_eq!(div_ceil(U256::from(11), U256::from(5)), Some(U256::from(3)));
		assert_eq!(div_ceil(U256::ZERO, U256::from(5)), Some(U256::ZERO));
		assert_eq!(div_ceil(U256::from(1), U256::ZERO), None);
	}
}
