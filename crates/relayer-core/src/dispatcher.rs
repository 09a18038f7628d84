//! Per-message request handling.
//!
//! [`Dispatcher::handle`] takes one inbound message from parse to reply. It
//! sends at most one reply and submits at most one transaction. Rejections
//! are replied; infrastructure failures abort the message without a reply and
//! surface as [`CoreError`] for the engine to log.

use crate::utils::{gas_limit_with_margin, truncate_hash};
use crate::CoreError;
use relayer_ledger::LedgerService;
use relayer_registry::{ContractDescriptor, ContractRegistry};
use relayer_storage::DedupCache;
use relayer_strategy::{reasons, StrategyService};
use relayer_transport::TransportService;
use relayer_types::{
	Acceptance, Address, Decision, FunctionCall, InboundMessage, RelayAction, RelayRequest,
	RelayTransaction, ReplyEnvelope, SubmissionReceipt, U256,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const INVALID_MESSAGE: &str = "Invalid message";
pub const DUPLICATED_MESSAGE: &str = "Duplicated message received";
pub const INVALID_CONTRACT: &str = "Invalid contract";

/// What became of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
	/// Answered without submitting anything.
	Replied(ReplyEnvelope),
	/// A transaction was broadcast and the receipt replied.
	Submitted(SubmissionReceipt),
	/// The relayer balance is below the floor; nothing was processed.
	Halted,
}

pub struct Dispatcher {
	contracts: Arc<ContractRegistry>,
	strategies: Arc<StrategyService>,
	dedup: Arc<DedupCache>,
	transport: Arc<TransportService>,
	ledger: Arc<LedgerService>,
	relayer: Address,
	min_balance: U256,
	halted: AtomicBool,
}

impl Dispatcher {
	pub fn new(
		contracts: Arc<ContractRegistry>,
		strategies: Arc<StrategyService>,
		dedup: Arc<DedupCache>,
		transport: Arc<TransportService>,
		min_balance: U256,
	) -> Self {
		let env = strategies.env();
		Self {
			ledger: env.ledger.clone(),
			relayer: env.relayer,
			contracts,
			strategies,
			dedup,
			transport,
			min_balance,
			halted: AtomicBool::new(false),
		}
	}

	pub fn relayer(&self) -> Address {
		self.relayer
	}

	/// Whether the balance floor has been hit. Once set it stays set.
	pub fn is_halted(&self) -> bool {
		self.halted.load(Ordering::SeqCst)
	}

	/// Processes one inbound message.
	pub async fn handle(&self, message: InboundMessage) -> Result<DispatchOutcome, CoreError> {
		if self.is_halted() || !self.check_balance().await? {
			return Ok(DispatchOutcome::Halted);
		}

		let request = match RelayRequest::parse(&message.payload) {
			Ok(request) => request,
			Err(e) => {
				debug!(topic = %message.topic, error = %e, "Unparseable message");
				return self.reply_text(&message, INVALID_MESSAGE).await;
			}
		};

		let contract = match self.contracts.resolve_by_topic(&message.topic) {
			Ok(contract) => contract,
			Err(_) => return self.reply_text(&message, INVALID_CONTRACT).await,
		};

		if let RelayAction::Transaction(call) = &request.action {
			if let Some(reason) = self.structural_rejection(contract, &request, call) {
				return self.reply_text(&message, reason).await;
			}
		}

		// Only requests that can reach the chain are remembered.
		let fingerprint = request.fingerprint();
		if !self.dedup.check_and_record(&fingerprint).await? {
			info!(
				topic = %message.topic,
				fingerprint = %truncate_hash(&fingerprint.to_string()),
				"Duplicate request"
			);
			return self.reply_text(&message, DUPLICATED_MESSAGE).await;
		}

		match &request.action {
			RelayAction::Transaction(call) => self.relay(&message, contract, &request, call).await,
			RelayAction::Availability(_) => self.probe(&message, contract, &request).await,
		}
	}

	/// Checks that need no chain access: the target address, the allow-list
	/// and the calldata layout.
	fn structural_rejection(
		&self,
		contract: &ContractDescriptor,
		request: &RelayRequest,
		call: &FunctionCall,
	) -> Option<&'static str> {
		if !contract.is_identity && contract.address != Some(request.contract) {
			debug!(contract = %contract.name, requested = %request.contract, "Contract address mismatch");
			return Some(INVALID_CONTRACT);
		}

		if !self.contracts.is_function_allowed(contract, &call.selector) {
			debug!(contract = %contract.name, selector = %call.selector, "Function not allow-listed");
			return Some(reasons::FUNCTION_NOT_ALLOWED);
		}

		let function = contract.function(&call.selector)?;
		if let Err(e) = function.decode(&call.call_data) {
			debug!(function = %function.name, error = %e, "Undecodable call");
			return Some(reasons::MALFORMED_PARAMETERS);
		}
		None
	}

	/// Returns `false` and halts when the relayer balance is under the floor.
	async fn check_balance(&self) -> Result<bool, CoreError> {
		let balance = self.ledger.get_balance(self.relayer).await?;
		if balance >= self.min_balance {
			return Ok(true);
		}

		if !self.halted.swap(true, Ordering::SeqCst) {
			error!(
				relayer = %self.relayer,
				balance = %balance,
				min_balance = %self.min_balance,
				"Relayer balance below minimum, stopping"
			);
		}
		Ok(false)
	}

	async fn relay(
		&self,
		message: &InboundMessage,
		contract: &ContractDescriptor,
		request: &RelayRequest,
		call: &FunctionCall,
	) -> Result<DispatchOutcome, CoreError> {
		let acceptance = match self.strategies.evaluate(contract, request).await? {
			Decision::Accept(acceptance) => acceptance,
			Decision::Reject(rejection) => return self.reply_text(message, rejection.reason()).await,
		};

		let (estimated_gas, gas_price) = match acceptance {
			Acceptance {
				estimated_gas: Some(estimated_gas),
				native_gas_price: Some(gas_price),
				..
			} => (estimated_gas, gas_price),
			_ => {
				return Err(CoreError::Dispatch(format!(
					"{} strategy accepted without a gas estimate",
					contract.strategy
				)))
			}
		};

		let tx = RelayTransaction {
			to: request.contract,
			data: call.call_data.clone(),
			value: U256::ZERO,
			gas_limit: gas_limit_with_margin(estimated_gas, contract.gas_margin_percent),
			gas_price,
			chain_id: None,
		};
		let (gas_limit, to) = (tx.gas_limit, tx.to);

		match self.ledger.send_transaction(tx).await {
			Ok(transaction_hash) => {
				info!(
					contract = %contract.name,
					tx_hash = %truncate_hash(&transaction_hash.to_string()),
					gas_limit,
					gas_price,
					"Transaction submitted"
				);
				let receipt = SubmissionReceipt {
					transaction_hash,
					from: self.relayer,
					to,
					gas_limit,
					gas_price,
				};
				self.send_reply(message, &ReplyEnvelope::submitted(receipt.clone())).await;
				Ok(DispatchOutcome::Submitted(receipt))
			}
			Err(e) => {
				warn!(contract = %contract.name, error = %e, "Submission failed");
				self.reply_text(message, e.to_string()).await
			}
		}
	}

	async fn probe(
		&self,
		message: &InboundMessage,
		contract: &ContractDescriptor,
		request: &RelayRequest,
	) -> Result<DispatchOutcome, CoreError> {
		let reply = match self.strategies.evaluate(contract, request).await? {
			Decision::Accept(Acceptance {
				min_price: Some(min_price),
				..
			}) => ReplyEnvelope::available(self.relayer, min_price),
			Decision::Accept(_) => {
				return Err(CoreError::Dispatch("Availability accepted without a price".to_string()))
			}
			Decision::Reject(rejection) => ReplyEnvelope::text(rejection.reason()),
		};

		self.send_reply(message, &reply).await;
		Ok(DispatchOutcome::Replied(reply))
	}

	async fn reply_text(
		&self,
		message: &InboundMessage,
		text: impl Into<String>,
	) -> Result<DispatchOutcome, CoreError> {
		let reply = ReplyEnvelope::text(text);
		self.send_reply(message, &reply).await;
		Ok(DispatchOutcome::Replied(reply))
	}

	/// Replies are best effort; a lost reply does not undo a submission.
	async fn send_reply(&self, message: &InboundMessage, reply: &ReplyEnvelope) {
		if let Err(e) = self.transport.reply(message, reply).await {
			warn!(topic = %message.topic, error = %e, "Failed to send reply");
		}
	}
}
