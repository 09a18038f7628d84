//! Whisper transport over the node's `shh_*` JSON-RPC API.
//!
//! Requests are encrypted with a symmetric key shared with requesters. The
//! relayer installs one message filter for all of its topics and polls it;
//! replies are encrypted to the sender's public key and signed with a key
//! pair generated at subscription time.

use crate::{TransportError, TransportInterface};
use async_trait::async_trait;
use relayer_types::{
	ConfigSchema, Field, FieldType, InboundMessage, ReplyEnvelope, Schema, Topic, ValidationError,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

/// Minimal JSON-RPC client for the `shh` namespace.
struct ShhClient {
	http: reqwest::Client,
	url: String,
	next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
	result: Option<T>,
	error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
	code: i64,
	message: String,
}

impl ShhClient {
	async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, TransportError> {
		let body = json!({
			"jsonrpc": "2.0",
			"id": self.next_id.fetch_add(1, Ordering::Relaxed),
			"method": method,
			"params": params,
		});

		let response = self
			.http
			.post(&self.url)
			.json(&body)
			.send()
			.await
			.map_err(|e| TransportError::Connection(e.to_string()))?;

		let response: RpcResponse<T> = response
			.json()
			.await
			.map_err(|e| TransportError::InvalidResponse(format!("{}: {}", method, e)))?;

		if let Some(error) = response.error {
			return Err(TransportError::Rpc(format!(
				"{} failed ({}): {}",
				method, error.code, error.message
			)));
		}
		response
			.result
			.ok_or_else(|| TransportError::InvalidResponse(format!("{} returned no result", method)))
	}
}

/// A message as returned by `shh_getFilterMessages`.
#[derive(Debug, Deserialize)]
struct WhisperMessage {
	topic: String,
	payload: String,
	/// Sender's public key; absent for anonymous messages.
	#[serde(default)]
	sig: Option<String>,
}

impl WhisperMessage {
	fn into_inbound(self) -> Result<InboundMessage, TransportError> {
		let topic: Topic = self
			.topic
			.parse()
			.map_err(|_| TransportError::InvalidResponse(format!("bad topic {}", self.topic)))?;
		let payload = hex::decode(self.payload.trim_start_matches("0x"))
			.map_err(|_| TransportError::InvalidResponse("payload is not hex".to_string()))?;

		let message = InboundMessage::new(topic, payload);
		Ok(match self.sig {
			Some(sig) if !sig.is_empty() => message.with_sender(sig),
			_ => message,
		})
	}
}

#[derive(Default)]
struct Subscription {
	filter_id: Option<String>,
	key_pair_id: Option<String>,
	stop_signal: Option<mpsc::Sender<()>>,
}

pub struct WhisperTransport {
	client: Arc<ShhClient>,
	sym_key: String,
	poll_interval: Duration,
	ttl: u64,
	pow_target: f64,
	pow_time: u64,
	subscription: Mutex<Subscription>,
	is_subscribed: Arc<AtomicBool>,
}

impl WhisperTransport {
	pub fn new(rpc_url: impl Into<String>, sym_key: impl Into<String>, poll_interval: Duration) -> Self {
		Self {
			client: Arc::new(ShhClient {
				http: reqwest::Client::new(),
				url: rpc_url.into(),
				next_id: AtomicU64::new(1),
			}),
			sym_key: sym_key.into(),
			poll_interval,
			ttl: 10,
			pow_target: 0.002,
			pow_time: 1,
			subscription: Mutex::new(Subscription::default()),
			is_subscribed: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Envelope parameters for replies.
	pub fn with_envelope(mut self, ttl: u64, pow_target: f64, pow_time: u64) -> Self {
		self.ttl = ttl;
		self.pow_target = pow_target;
		self.pow_time = pow_time;
		self
	}

	/// Polls the filter until stopped or until the receiving side goes away.
	async fn polling_loop(
		client: Arc<ShhClient>,
		filter_id: String,
		poll_interval: Duration,
		sender: mpsc::UnboundedSender<InboundMessage>,
		mut stop_rx: mpsc::Receiver<()>,
	) {
		let mut interval = tokio::time::interval(poll_interval);

		loop {
			tokio::select! {
				_ = interval.tick() => {
					let messages: Vec<WhisperMessage> = match client
						.call("shh_getFilterMessages", json!([filter_id]))
						.await
					{
						Ok(messages) => messages,
						Err(e) => {
							warn!(error = %e, "Failed to poll whisper filter");
							continue;
						}
					};

					for message in messages {
						match message.into_inbound() {
							Ok(inbound) => {
								if sender.send(inbound).is_err() {
									debug!("Receiver dropped, stopping whisper polling");
									return;
								}
							}
							Err(e) => warn!(error = %e, "Dropping undecodable whisper message"),
						}
					}
				}
				_ = stop_rx.recv() => {
					break;
				}
			}
		}
	}
}

pub struct WhisperTransportSchema;

impl ConfigSchema for WhisperTransportSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(|value| {
					let url = value.as_str().unwrap_or_default();
					if url.starts_with("http://") || url.starts_with("https://") {
						Ok(())
					} else {
						Err("RPC URL must start with http:// or https://".to_string())
					}
				}),
				Field::new("sym_key", FieldType::String).with_validator(|value| {
					let key = value.as_str().unwrap_or_default().trim_start_matches("0x");
					if key.len() == 64 && hex::decode(key).is_ok() {
						Ok(())
					} else {
						Err("sym_key must be 32 hex-encoded bytes".to_string())
					}
				}),
			],
			vec![
				Field::new(
					"poll_interval_ms",
					FieldType::Integer {
						min: Some(10),
						max: None,
					},
				),
				Field::new(
					"ttl",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new(
					"pow_time",
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
impl TransportInterface for WhisperTransport {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(WhisperTransportSchema)
	}

	async fn subscribe(
		&self,
		topics: &[Topic],
		sender: mpsc::UnboundedSender<InboundMessage>,
	) -> Result<(), TransportError> {
		if self.is_subscribed.load(Ordering::SeqCst) {
			return Err(TransportError::AlreadySubscribed);
		}

		let sym_key_id: String = self
			.client
			.call("shh_addSymKey", json!([format!("0x{}", self.sym_key.trim_start_matches("0x"))]))
			.await?;
		let key_pair_id: String = self.client.call("shh_newKeyPair", json!([])).await?;

		let topics: Vec<String> = topics.iter().map(Topic::to_string).collect();
		let filter_id: String = self
			.client
			.call(
				"shh_newMessageFilter",
				json!([{ "symKeyID": sym_key_id, "topics": topics }]),
			)
			.await?;

		let (stop_tx, stop_rx) = mpsc::channel(1);
		{
			let mut subscription = self.subscription.lock().await;
			subscription.filter_id = Some(filter_id.clone());
			subscription.key_pair_id = Some(key_pair_id);
			subscription.stop_signal = Some(stop_tx);
		}

		let client = self.client.clone();
		let poll_interval = self.poll_interval;
		tokio::spawn(async move {
			Self::polling_loop(client, filter_id, poll_interval, sender, stop_rx).await;
		});

		self.is_subscribed.store(true, Ordering::SeqCst);
		Ok(())
	}

	async fn reply(&self, message: &InboundMessage, reply: &ReplyEnvelope) -> Result<(), TransportError> {
		let recipient = message.sender.as_deref().ok_or(TransportError::NoReplyAddress)?;
		let key_pair_id = self
			.subscription
			.lock()
			.await
			.key_pair_id
			.clone()
			.ok_or_else(|| TransportError::Config("Reply sent before subscribing".to_string()))?;

		let envelope = json!({
			"pubKey": recipient,
			"sig": key_pair_id,
			"ttl": self.ttl,
			"topic": message.topic.to_string(),
			"payload": format!("0x{}", hex::encode(reply.to_json())),
			"powTarget": self.pow_target,
			"powTime": self.pow_time,
		});

		let posted: bool = self.client.call("shh_post", json!([envelope])).await?;
		if !posted {
			error!(topic = %message.topic, "Node refused to post whisper reply");
			return Err(TransportError::Rpc("shh_post returned false".to_string()));
		}
		Ok(())
	}

	async fn unsubscribe_all(&self) -> Result<(), TransportError> {
		if !self.is_subscribed.load(Ordering::SeqCst) {
			return Ok(());
		}

		let (stop_signal, filter_id) = {
			let mut subscription = self.subscription.lock().await;
			(subscription.stop_signal.take(), subscription.filter_id.take())
		};

		if let Some(stop_tx) = stop_signal {
			let _ = stop_tx.send(()).await;
		}
		self.is_subscribed.store(false, Ordering::SeqCst);

		if let Some(filter_id) = filter_id {
			let _: bool = self
				.client
				.call("shh_deleteMessageFilter", json!([filter_id]))
				.await?;
		}
		Ok(())
	}
}

/// Configuration parameters:
/// - `rpc_url`: HTTP endpoint of a node with the `shh` API enabled
/// - `sym_key`: hex-encoded 32-byte symmetric key shared with requesters
/// - `poll_interval_ms`: filter polling interval (default 500)
/// - `ttl`, `pow_time`: reply envelope parameters (defaults 10 and 1)
pub fn create_whisper_transport(config: &toml::Value) -> Result<Box<dyn TransportInterface>, TransportError> {
	WhisperTransportSchema
		.validate(config)
		.map_err(|e| TransportError::Config(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| TransportError::Config("rpc_url is required".to_string()))?;
	let sym_key = config
		.get("sym_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| TransportError::Config("sym_key is required".to_string()))?;
	let poll_interval_ms = config
		.get("poll_interval_ms")
		.and_then(|v| v.as_integer())
		.unwrap_or(500) as u64;
	let ttl = config.get("ttl").and_then(|v| v.as_integer()).unwrap_or(10) as u64;
	let pow_time = config.get("pow_time").and_then(|v| v.as_integer()).unwrap_or(1) as u64;
	let pow_target = config
		.get("pow_target")
		.and_then(|v| v.as_float())
		.unwrap_or(0.002);

	Ok(Box::new(
		WhisperTransport::new(rpc_url, sym_key, Duration::from_millis(poll_interval_ms))
			.with_envelope(ttl, pow_target, pow_time),
	))
}
