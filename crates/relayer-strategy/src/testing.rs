//! Fixtures shared by the strategy tests.

use crate::{GasPricePolicy, StrategyEnv};
use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{address, keccak256};
use async_trait::async_trait;
use relayer_config::TokenConfig;
use relayer_ledger::implementations::memory::InMemoryLedger;
use relayer_ledger::LedgerService;
use relayer_pricing::{create_price_source, PriceInterface, PricingError};
use relayer_registry::{ContractDescriptor, FunctionDescriptor, TokenRegistry};
use relayer_types::{
	Address, Bytes, ConfigSchema, FunctionCall, RelayAction, RelayRequest, Selector, StrategyKind,
	Topic, U256,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SNT: Address = address!("0x744d70fdbe2ba4cf95131626614a1763df805b9e");
pub const DOWN_TOKEN: Address = address!("0x00000000000000000000000000000000000000d0");
pub const IDENTITY: Address = address!("0x00000000000000000000000000000000000000aa");
pub const FACTORY: Address = address!("0x00000000000000000000000000000000000000f1");
pub const CONTROLLER: Address = address!("0x00000000000000000000000000000000000000c1");
pub const ACTOR: Address = address!("0x00000000000000000000000000000000000000bb");
pub const RELAYER: Address = address!("0x00000000000000000000000000000000000000ee");

pub const IDENTITY_CODE: [u8; 4] = [0x60, 0x80, 0x60, 0x40];
pub const CONTROLLER_CODE: [u8; 4] = [0x60, 0x80, 0x60, 0x01];

/// 1 SNT = 0.001 ETH.
pub const SNT_RATE: u64 = 1_000_000_000_000_000;
/// Network gas price of the in-memory ledger, 1 gwei.
pub const NATIVE_GAS_PRICE: u128 = 1_000_000_000;
/// `ceil(1 gwei * 10^18 / SNT_RATE)`.
pub const MIN_SNT_GAS_PRICE: u64 = 1_000_000_000_000;
/// Default estimate of the in-memory ledger.
pub const ESTIMATE: u64 = 100_000;

pub const CALL_GAS_RELAYED: &str = "callGasRelayed(address _to,uint256 _value,bytes _data,uint256 _nonce,uint256 _gasPrice,uint256 _gasLimit,address _gasToken,bytes _messageSignature)";
pub const APPROVE_AND_CALL: &str = "approveAndCallGasRelayed(address _baseToken,address _to,uint256 _value,bytes _data,uint256 _nonce,uint256 _gasPrice,uint256 _gasLimit,address _gasToken,bytes _messageSignature)";
pub const TRANSFER_SNT: &str =
	"transferSNT(address _to,uint256 _amount,uint256 _nonce,uint256 _gasPrice,bytes _signature)";
pub const EXECUTE_GAS_RELAYED: &str = "executeGasRelayed(address _to,uint256 _value,bytes _data,uint256 _nonce,uint256 _gasPrice,uint256 _gasMinimal,bytes _signature)";

pub fn kernel_selector() -> Selector {
	Selector::from_slice(&keccak256("isKernel(bytes32)")[..4])
}

pub fn amount(value: u64) -> U256 {
	U256::from(value)
}

fn token(symbol: &str, min_accepted_rate: U256, plugin: Option<&str>) -> TokenConfig {
	TokenConfig {
		name: symbol.to_string(),
		symbol: symbol.to_string(),
		decimals: 18,
		min_accepted_rate,
		refresh_price_period_secs: 60,
		price_plugin: plugin.map(|p| toml::from_str(p).unwrap()),
	}
}

/// ETH, SNT at [`SNT_RATE`] and a token whose price feed is down.
pub fn tokens(snt_min_rate: u64) -> TokenRegistry {
	let snt_plugin = format!("type = \"fixed\"\nrate = {}", SNT_RATE);
	let config: BTreeMap<Address, TokenConfig> = [
		(Address::ZERO, token("ETH", U256::from(1), None)),
		(SNT, token("SNT", amount(snt_min_rate), Some(&snt_plugin))),
		(DOWN_TOKEN, token("DWN", U256::ZERO, Some("type = \"down\""))),
	]
	.into_iter()
	.collect();

	let factory = |plugin: &toml::Value| -> Result<Box<dyn PriceInterface>, PricingError> {
		match plugin.get("type").and_then(|t| t.as_str()) {
			Some("down") => Ok(Box::new(DownFeed)),
			_ => create_price_source(plugin),
		}
	};
	TokenRegistry::from_config(&config, &factory).unwrap()
}

/// Identity instance with a known kernel, SNT and ETH held by the identity.
pub fn identity_ledger(snt_balance: U256) -> InMemoryLedger {
	InMemoryLedger::new()
		.with_code(IDENTITY, IDENTITY_CODE.to_vec())
		.with_kernel(FACTORY, kernel_selector(), keccak256(IDENTITY_CODE))
		.with_token_balance(SNT, IDENTITY, snt_balance)
}

/// Controller deployed with [`CONTROLLER_CODE`], SNT held by the actor.
pub fn controller_ledger(snt_balance: U256) -> InMemoryLedger {
	InMemoryLedger::new()
		.with_code(CONTROLLER, CONTROLLER_CODE.to_vec())
		.with_token_balance(SNT, ACTOR, snt_balance)
}

pub fn env(ledger: &InMemoryLedger, snt_min_rate: u64) -> StrategyEnv {
	StrategyEnv {
		ledger: Arc::new(LedgerService::new(Box::new(ledger.clone()))),
		tokens: Arc::new(tokens(snt_min_rate)),
		gas_policy: GasPricePolicy {
			modifier: 0,
			max_price: U256::from(20_000_000_000u64),
		},
		relayer: RELAYER,
	}
}

pub fn identity_contract() -> ContractDescriptor {
	ContractDescriptor {
		name: "IdentityGasRelay".to_string(),
		topic: Topic::from_name("IdentityGasRelay"),
		strategy: StrategyKind::Identity,
		is_identity: true,
		address: None,
		factory_address: Some(FACTORY),
		bytecode_fingerprint: None,
		kernel_verification: Some(kernel_selector()),
		allowed_functions: functions(&[(CALL_GAS_RELAYED, false), (APPROVE_AND_CALL, true)]),
		gas_margin_percent: 5,
		fee_token_symbol: "SNT".to_string(),
	}
}

pub fn controller_contract() -> ContractDescriptor {
	ContractDescriptor {
		name: "SNTController".to_string(),
		topic: Topic::from_name("SNTController"),
		strategy: StrategyKind::TokenController,
		is_identity: false,
		address: Some(CONTROLLER),
		factory_address: None,
		bytecode_fingerprint: Some(keccak256(CONTROLLER_CODE)),
		kernel_verification: None,
		allowed_functions: functions(&[(TRANSFER_SNT, false), (EXECUTE_GAS_RELAYED, false)]),
		gas_margin_percent: 10,
		fee_token_symbol: "SNT".to_string(),
	}
}

fn functions(signatures: &[(&str, bool)]) -> std::collections::HashMap<Selector, FunctionDescriptor> {
	signatures
		.iter()
		.map(|(signature, is_token)| {
			let function = FunctionDescriptor::parse(signature, *is_token, None).unwrap();
			(function.selector, function)
		})
		.collect()
}

pub fn encode(contract: &ContractDescriptor, signature: &str, values: Vec<DynSolValue>) -> FunctionCall {
	let function = contract
		.allowed_functions
		.values()
		.find(|f| signature.starts_with(&format!("{}(", f.name)))
		.unwrap();
	let mut data = function.selector.to_vec();
	data.extend(DynSolValue::Tuple(values).abi_encode_params());
	FunctionCall {
		selector: function.selector,
		call_data: Bytes::from(data),
	}
}

pub fn uint(value: U256) -> DynSolValue {
	DynSolValue::Uint(value, 256)
}

/// `callGasRelayed` paying `gas_price * gas_limit` in `gas_token`.
pub fn call_gas_relayed(gas_price: U256, gas_limit: U256, gas_token: Address) -> FunctionCall {
	encode(
		&identity_contract(),
		CALL_GAS_RELAYED,
		vec![
			DynSolValue::Address(ACTOR),
			uint(U256::ZERO),
			DynSolValue::Bytes(vec![]),
			uint(U256::from(1)),
			uint(gas_price),
			uint(gas_limit),
			DynSolValue::Address(gas_token),
			DynSolValue::Bytes(vec![0xaa; 65]),
		],
	)
}

pub fn transfer_snt(amount: U256, gas_price: U256) -> FunctionCall {
	encode(
		&controller_contract(),
		TRANSFER_SNT,
		vec![
			DynSolValue::Address(IDENTITY),
			uint(amount),
			uint(U256::from(1)),
			uint(gas_price),
			DynSolValue::Bytes(vec![0xaa; 65]),
		],
	)
}

pub fn execute_gas_relayed(gas_price: U256, gas_minimal: U256) -> FunctionCall {
	encode(
		&controller_contract(),
		EXECUTE_GAS_RELAYED,
		vec![
			DynSolValue::Address(IDENTITY),
			uint(U256::ZERO),
			DynSolValue::Bytes(vec![0x01, 0x02]),
			uint(U256::from(1)),
			uint(gas_price),
			uint(gas_minimal),
			DynSolValue::Bytes(vec![0xaa; 65]),
		],
	)
}

pub fn request(contract: Address, actor: Option<Address>, call: FunctionCall) -> RelayRequest {
	RelayRequest {
		contract,
		actor,
		action: RelayAction::Transaction(call),
		raw_payload: Bytes::new(),
	}
}

/// Price feed that is always offline.
pub struct DownFeed;

#[async_trait]
impl PriceInterface for DownFeed {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(relayer_pricing::implementations::fixed::FixedPriceSchema)
	}

	async fn fetch_rate(&self, _symbol: &str) -> Result<U256, PricingError> {
		Err(PricingError::Unavailable("feed offline".to_string()))
	}
}
