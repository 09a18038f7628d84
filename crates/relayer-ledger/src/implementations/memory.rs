//! Scripted in-memory ledger.
//!
//! Holds code, balances, token balances, kernel registrations and gas
//! estimates set up front, records every submitted transaction and counts
//! calls per method. Used by tests across the workspace and for dry runs.

use crate::{IERC20, LedgerError, LedgerInterface};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use relayer_types::{
	Address, Bytes, CallRequest, ConfigSchema, RelayTransaction, Schema, Selector, ValidationError, B256,
	U256,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct LedgerState {
	code: HashMap<Address, Bytes>,
	balances: HashMap<Address, U256>,
	token_balances: HashMap<(Address, Address), U256>,
	/// Factory and verification selector mapped to the accepted code hashes.
	kernels: HashMap<(Address, Selector), Vec<B256>>,
	call_results: HashMap<(Address, Selector), Result<Bytes, LedgerError>>,
	gas_estimates: HashMap<Address, Result<u64, LedgerError>>,
	default_gas_estimate: u64,
	gas_price: u128,
	block_number: u64,
	send_error: Option<LedgerError>,
	unavailable: bool,
	sent: Vec<RelayTransaction>,
	calls: HashMap<&'static str, usize>,
}

/// In-memory ledger. Clones share state, so a test can keep a handle after
/// giving one to the relayer.
#[derive(Clone)]
pub struct InMemoryLedger {
	state: Arc<Mutex<LedgerState>>,
}

impl Default for InMemoryLedger {
	fn default() -> Self {
		Self::new()
	}
}

fn word(value: U256) -> Bytes {
	Bytes::from(value.to_be_bytes::<32>().to_vec())
}

impl InMemoryLedger {
	pub fn new() -> Self {
		let state = LedgerState {
			default_gas_estimate: 100_000,
			gas_price: 1_000_000_000,
			block_number: 1,
			..Default::default()
		};
		Self {
			state: Arc::new(Mutex::new(state)),
		}
	}

	fn state(&self) -> MutexGuard<'_, LedgerState> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	pub fn with_code(self, address: Address, code: impl Into<Bytes>) -> Self {
		self.state().code.insert(address, code.into());
		self
	}

	pub fn with_balance(self, address: Address, balance: U256) -> Self {
		self.set_balance(address, balance);
		self
	}

	pub fn with_token_balance(self, token: Address, owner: Address, balance: U256) -> Self {
		self.state().token_balances.insert((token, owner), balance);
		self
	}

	/// Makes `factory.selector(bytes32)` return true for `code_hash`.
	pub fn with_kernel(self, factory: Address, selector: Selector, code_hash: B256) -> Self {
		self.state()
			.kernels
			.entry((factory, selector))
			.or_default()
			.push(code_hash);
		self
	}

	/// Scripts the result of any call to `to` starting with `selector`.
	pub fn with_call_result(self, to: Address, selector: Selector, result: Result<Bytes, LedgerError>) -> Self {
		self.state().call_results.insert((to, selector), result);
		self
	}

	pub fn with_gas_estimate(self, to: Address, estimate: Result<u64, LedgerError>) -> Self {
		self.state().gas_estimates.insert(to, estimate);
		self
	}

	pub fn with_gas_price(self, gas_price: u128) -> Self {
		self.state().gas_price = gas_price;
		self
	}

	/// Every submission fails with `error`.
	pub fn with_send_error(self, error: LedgerError) -> Self {
		self.state().send_error = Some(error);
		self
	}

	pub fn set_balance(&self, address: Address, balance: U256) {
		self.state().balances.insert(address, balance);
	}

	/// Every operation fails with [`LedgerError::Unavailable`] while set.
	pub fn set_unavailable(&self, unavailable: bool) {
		self.state().unavailable = unavailable;
	}

	/// Transactions submitted so far, in order.
	pub fn sent_transactions(&self) -> Vec<RelayTransaction> {
		self.state().sent.clone()
	}

	/// Number of times `method` was invoked.
	pub fn call_count(&self, method: &str) -> usize {
		self.state().calls.get(method).copied().unwrap_or(0)
	}

	/// Invocations of methods that touch contract state: code reads, calls,
	/// estimates and submissions.
	pub fn contract_interactions(&self) -> usize {
		["get_code", "call", "estimate_gas", "send_transaction"]
			.iter()
			.map(|m| self.call_count(m))
			.sum()
	}

	fn enter(&self, method: &'static str) -> Result<MutexGuard<'_, LedgerState>, LedgerError> {
		let mut state = self.state();
		*state.calls.entry(method).or_default() += 1;
		if state.unavailable {
			return Err(LedgerError::Unavailable("connection refused".to_string()));
		}
		Ok(state)
	}
}

struct InMemoryLedgerSchema;

impl ConfigSchema for InMemoryLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

#[async_trait]
impl LedgerInterface for InMemoryLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(InMemoryLedgerSchema)
	}

	async fn get_code(&self, address: Address) -> Result<Bytes, LedgerError> {
		let state = self.enter("get_code")?;
		Ok(state.code.get(&address).cloned().unwrap_or_default())
	}

	async fn call(&self, call: &CallRequest) -> Result<Bytes, LedgerError> {
		let state = self.enter("call")?;
		if call.data.len() < 4 {
			return Ok(Bytes::new());
		}
		let selector = Selector::from_slice(&call.data[..4]);

		if selector == Selector::from(IERC20::balanceOfCall::SELECTOR) {
			let owner = IERC20::balanceOfCall::abi_decode(&call.data)
				.map_err(|e| LedgerError::Reverted(e.to_string()))?
				.account;
			let balance = state
				.token_balances
				.get(&(call.to, owner))
				.copied()
				.unwrap_or_default();
			return Ok(word(balance));
		}

		if let Some(accepted) = state.kernels.get(&(call.to, selector)) {
			let hash = call
				.data
				.get(4..36)
				.map(B256::from_slice)
				.ok_or_else(|| LedgerError::Reverted("missing code hash".to_string()))?;
			let known = accepted.contains(&hash);
			return Ok(word(U256::from(known as u8)));
		}

		match state.call_results.get(&(call.to, selector)) {
			Some(result) => result.clone(),
			None => Ok(Bytes::new()),
		}
	}

	async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, LedgerError> {
		let state = self.enter("estimate_gas")?;
		match state.gas_estimates.get(&call.to) {
			Some(result) => result.clone(),
			None => Ok(state.default_gas_estimate),
		}
	}

	async fn get_balance(&self, address: Address) -> Result<U256, LedgerError> {
		let state = self.enter("get_balance")?;
		Ok(state.balances.get(&address).copied().unwrap_or_default())
	}

	async fn gas_price(&self) -> Result<u128, LedgerError> {
		Ok(self.enter("gas_price")?.gas_price)
	}

	async fn block_number(&self) -> Result<u64, LedgerError> {
		Ok(self.enter("block_number")?.block_number)
	}

	async fn send_transaction(&self, tx: RelayTransaction) -> Result<B256, LedgerError> {
		let mut state = self.enter("send_transaction")?;
		if let Some(error) = &state.send_error {
			return Err(error.clone());
		}
		state.sent.push(tx);
		let nonce = state.sent.len() as u64;
		state.block_number += 1;
		Ok(B256::from(U256::from(nonce)))
	}
}
