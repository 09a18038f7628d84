//! Serde helpers for configuration deserialization

use relayer_types::{Address, U256};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Deserializes a table keyed by hex addresses, e.g. `[tokens."0x.."]`.
pub fn deserialize_address_map<'de, D, T>(deserializer: D) -> Result<BTreeMap<Address, T>, D::Error>
where
	D: Deserializer<'de>,
	T: Deserialize<'de>,
{
	let map = BTreeMap::<String, T>::deserialize(deserializer)?;

	map.into_iter()
		.map(|(k, v)| {
			Address::from_str(&k)
				.map(|address| (address, v))
				.map_err(|_| serde::de::Error::custom(format!("Invalid address key: {}", k)))
		})
		.collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
	Int(u64),
	Str(String),
}

/// Deserializes a wei amount written as an integer or as a decimal / `0x` string.
///
/// TOML integers stop at `i64::MAX`, so large values must be quoted.
pub fn deserialize_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
	D: Deserializer<'de>,
{
	match RawAmount::deserialize(deserializer)? {
		RawAmount::Int(value) => Ok(U256::from(value)),
		RawAmount::Str(value) => U256::from_str(value.trim())
			.map_err(|_| serde::de::Error::custom(format!("Invalid amount: {}", value))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug, Deserialize)]
	struct TestStruct {
		#[serde(deserialize_with = "deserialize_address_map")]
		balances: BTreeMap<Address, Entry>,
	}

	#[derive(Debug, Deserialize)]
	struct Entry {
		#[serde(deserialize_with = "deserialize_u256")]
		amount: U256,
	}

	#[test]
	fn test_deserialize_address_map_and_amounts() {
		let toml = r#"
            [balances."0x0000000000000000000000000000000000000000"]
            amount = 42

            [balances."0x744d70FDBE2Ba4CF95131626614a1763DF805B9E"]
            amount = "1000000000000000000000"
        "#;

		let result: TestStruct = toml::from_str(toml).unwrap();
		assert_eq!(result.balances[&Address::ZERO].amount, U256::from(42));

		let snt = Address::from_str("0x744d70fdbe2ba4cf95131626614a1763df805b9e").unwrap();
		assert_eq!(
			result.balances[&snt].amount,
			U256::from_str("1000000000000000000000").unwrap()
		);
	}

	#[test]
	fn test_rejects_invalid_keys() {
		let toml = r#"
            [balances.not-an-address]
            amount = 1
        "#;

		let result: Result<TestStruct, _> = toml::from_str(toml);
		assert!(result.is_err());
	}
}
