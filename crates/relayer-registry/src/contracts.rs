//! Contract registry.
//!
//! Built once at startup from the `[contracts]` configuration. Each contract
//! is initialized concurrently: its ABI is loaded, allow-listed signatures are
//! parsed and, for contracts at a fixed address, the deployed bytecode is
//! fetched and fingerprinted. The registry is returned only after every
//! contract initialized successfully.

use crate::functions::FunctionDescriptor;
use crate::RegistryError;
use alloy::json_abi::{Function, JsonAbi};
use futures::future::try_join_all;
use relayer_config::ContractConfig;
use relayer_ledger::LedgerService;
use relayer_types::{Address, Selector, StrategyKind, Topic, B256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Default fee token of token controllers.
pub const DEFAULT_FEE_TOKEN_SYMBOL: &str = "SNT";

#[derive(Debug, Clone)]
pub struct ContractDescriptor {
	pub name: String,
	pub topic: Topic,
	pub strategy: StrategyKind,
	pub is_identity: bool,
	/// Fixed address of a non-identity contract.
	pub address: Option<Address>,
	/// Factory of identity instances.
	pub factory_address: Option<Address>,
	/// keccak256 of the code deployed at `address`, taken at startup.
	pub bytecode_fingerprint: Option<B256>,
	pub kernel_verification: Option<Selector>,
	pub allowed_functions: HashMap<Selector, FunctionDescriptor>,
	pub gas_margin_percent: u64,
	pub fee_token_symbol: String,
}

impl ContractDescriptor {
	pub fn function(&self, selector: &Selector) -> Option<&FunctionDescriptor> {
		self.allowed_functions.get(selector)
	}
}

/// Immutable topic-to-contract map.
#[derive(Debug)]
pub struct ContractRegistry {
	by_topic: HashMap<Topic, ContractDescriptor>,
}

impl ContractRegistry {
	/// Initializes every configured contract and waits for all of them.
	///
	/// Any failure, including a contract with no deployed code, aborts the
	/// build.
	pub async fn build(
		config: &BTreeMap<String, ContractConfig>,
		ledger: &LedgerService,
	) -> Result<Self, RegistryError> {
		let descriptors = try_join_all(
			config
				.iter()
				.map(|(name, contract)| init_contract(name, contract, ledger)),
		)
		.await?;

		Self::from_descriptors(descriptors)
	}

	/// Indexes descriptors by topic, rejecting collisions.
	pub fn from_descriptors(descriptors: Vec<ContractDescriptor>) -> Result<Self, RegistryError> {
		let mut by_topic: HashMap<Topic, ContractDescriptor> = HashMap::new();
		for descriptor in descriptors {
			if let Some(existing) = by_topic.get(&descriptor.topic) {
				return Err(RegistryError::TopicCollision {
					topic: descriptor.topic,
					first: existing.name.clone(),
					second: descriptor.name,
				});
			}
			by_topic.insert(descriptor.topic, descriptor);
		}
		Ok(Self { by_topic })
	}

	pub fn resolve_by_topic(&self, topic: &Topic) -> Result<&ContractDescriptor, RegistryError> {
		self.by_topic
			.get(topic)
			.ok_or(RegistryError::ContractNotFound(*topic))
	}

	pub fn is_function_allowed(&self, descriptor: &ContractDescriptor, selector: &Selector) -> bool {
		descriptor.allowed_functions.contains_key(selector)
	}

	/// Topics to subscribe to, in a stable order.
	pub fn topics(&self) -> Vec<Topic> {
		let mut topics: Vec<Topic> = self.by_topic.keys().copied().collect();
		topics.sort();
		topics
	}

	pub fn contracts(&self) -> impl Iterator<Item = &ContractDescriptor> {
		self.by_topic.values()
	}

	pub fn len(&self) -> usize {
		self.by_topic.len()
	}

	pub fn is_empty(&self) -> bool {
		self.by_topic.is_empty()
	}
}

async fn load_abi(path: &Path) -> Result<JsonAbi, RegistryError> {
	let abi_error = |reason: String| RegistryError::Abi {
		path: path.display().to_string(),
		reason,
	};

	let content = tokio::fs::read_to_string(path)
		.await
		.map_err(|e| abi_error(e.to_string()))?;
	let json: serde_json::Value = serde_json::from_str(&content).map_err(|e| abi_error(e.to_string()))?;

	// Either a bare ABI array or a build artifact with an `abi` field
	let abi = match json {
		serde_json::Value::Object(mut artifact) => artifact
			.remove("abi")
			.ok_or_else(|| abi_error("no 'abi' field in artifact".to_string()))?,
		other => other,
	};
	serde_json::from_value(abi).map_err(|e| abi_error(e.to_string()))
}

async fn init_contract(
	name: &str,
	config: &ContractConfig,
	ledger: &LedgerService,
) -> Result<ContractDescriptor, RegistryError> {
	let abi = match &config.abi_file {
		Some(path) => Some(load_abi(path).await?),
		None => None,
	};

	let mut allowed_functions = HashMap::new();
	for allowed in &config.allowed_functions {
		let descriptor = FunctionDescriptor::parse(&allowed.function, allowed.is_token, abi.as_ref())?;
		debug!(contract = name, function = %descriptor.signature, "Allow-listed function");
		allowed_functions.insert(descriptor.selector, descriptor);
	}

	let kernel_verification = match &config.kernel_verification {
		Some(signature) => Some(
			Function::parse(signature)
				.map_err(|e| RegistryError::InvalidSignature {
					signature: signature.clone(),
					reason: e.to_string(),
				})?
				.selector(),
		),
		None => None,
	};

	let is_identity = config.identity_kind();
	let bytecode_fingerprint = match (is_identity, config.address) {
		(false, Some(address)) => {
			let fingerprint = ledger
				.code_hash(address)
				.await?
				.ok_or_else(|| RegistryError::ContractNotDeployed {
					name: name.to_string(),
					address,
				})?;
			info!(contract = name, address = %address, "Fingerprinted contract bytecode");
			Some(fingerprint)
		}
		(false, None) => {
			return Err(RegistryError::Config(format!("Contract '{}' has no address", name)));
		}
		(true, _) => None,
	};

	Ok(ContractDescriptor {
		name: name.to_string(),
		topic: Topic::from_name(name),
		strategy: config.strategy,
		is_identity,
		address: config.address,
		factory_address: config.factory_address,
		bytecode_fingerprint,
		kernel_verification,
		allowed_functions,
		gas_margin_percent: config.gas_margin(),
		fee_token_symbol: config
			.fee_token_symbol
			.clone()
			.unwrap_or_else(|| DEFAULT_FEE_TOKEN_SYMBOL.to_string()),
	})
}
