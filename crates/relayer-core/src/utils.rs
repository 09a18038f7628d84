//! Small helpers shared by the dispatcher and the engine.

/// Shortens a hash for log output: `0xa096...a0b4`.
pub fn truncate_hash(hash: &str) -> String {
	if hash.len() <= 12 {
		hash.to_string()
	} else {
		format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
	}
}

/// `ceil(estimated * (100 + margin_percent) / 100)`, saturating at `u64::MAX`.
pub fn gas_limit_with_margin(estimated: u64, margin_percent: u64) -> u64 {
	let scaled = u128::from(estimated) * (100 + u128::from(margin_percent));
	u64::try_from(scaled.div_ceil(100)).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_hash() {
		let hash = "0xa096c418fd1192ba7f5b506beea682a633f9ab82911fa3d7a249b8d80889a0b4";
		assert_eq!(truncate_hash(hash), "0xa096...a0b4");
		assert_eq!(truncate_hash("0x12345"), "0x12345");
		assert_eq!(truncate_hash("0x1234567890"), "0x1234567890");
	}

	#[test]
	fn test_gas_limit_with_margin() {
		assert_eq!(gas_limit_with_margin(100_000, 5), 105_000);
		assert_eq!(gas_limit_with_margin(100_000, 10), 110_000);
		// Rounds up
		assert_eq!(gas_limit_with_margin(21_001, 5), 22_052);
		assert_eq!(gas_limit_with_margin(0, 10), 0);
		assert_eq!(gas_limit_with_margin(u64::MAX, 10), u64::MAX);
	}
}
