//! Pub/sub transport for relay requests.
//!
//! Requesters publish JSON envelopes on the topic of the contract they want
//! to reach and receive a reply addressed to them. This crate only moves
//! bytes: it delivers [`InboundMessage`]s to the engine and posts
//! [`ReplyEnvelope`]s back to whoever sent a message.

use async_trait::async_trait;
use relayer_types::{ConfigSchema, InboundMessage, ReplyEnvelope, Topic};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub mod implementations {
	pub mod memory;
	pub mod whisper;
}

#[derive(Debug, Error)]
pub enum TransportError {
	#[error("Already subscribed")]
	AlreadySubscribed,
	#[error("Connection error: {0}")]
	Connection(String),
	/// The node answered with a JSON-RPC error.
	#[error("RPC error: {0}")]
	Rpc(String),
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	#[error("Message has no reply address")]
	NoReplyAddress,
	#[error("Configuration error: {0}")]
	Config(String),
}

#[async_trait]
pub trait TransportInterface: Send + Sync {
	/// Schema for this implementation's `[transport]` table.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Starts delivering messages published on `topics` to `sender`.
	async fn subscribe(
		&self,
		topics: &[Topic],
		sender: mpsc::UnboundedSender<InboundMessage>,
	) -> Result<(), TransportError>;

	/// Sends `reply` to the requester of `message`.
	async fn reply(&self, message: &InboundMessage, reply: &ReplyEnvelope) -> Result<(), TransportError>;

	/// Stops every subscription. Calling it when nothing is subscribed is a
	/// no-op.
	async fn unsubscribe_all(&self) -> Result<(), TransportError>;
}

pub struct TransportService {
	implementation: Box<dyn TransportInterface>,
}

impl TransportService {
	pub fn new(implementation: Box<dyn TransportInterface>) -> Self {
		Self { implementation }
	}

	pub async fn subscribe(
		&self,
		topics: &[Topic],
		sender: mpsc::UnboundedSender<InboundMessage>,
	) -> Result<(), TransportError> {
		self.implementation.subscribe(topics, sender).await?;
		info!(topics = topics.len(), "Subscribed to relay topics");
		Ok(())
	}

	pub async fn reply(&self, message: &InboundMessage, reply: &ReplyEnvelope) -> Result<(), TransportError> {
		debug!(topic = %message.topic, reply = reply.message_text(), "Sending reply");
		self.implementation.reply(message, reply).await
	}

	pub async fn unsubscribe_all(&self) -> Result<(), TransportError> {
		self.implementation.unsubscribe_all().await?;
		info!("Unsubscribed from relay topics");
		Ok(())
	}
}

/// Creates a transport from the `[transport]` table, selected by `type`.
pub fn create_transport(config: &toml::Value) -> Result<Box<dyn TransportInterface>, TransportError> {
	match config.get("type").and_then(|v| v.as_str()) {
		Some("whisper") => implementations::whisper::create_whisper_transport(config),
		Some("memory") => implementations::memory::create_memory_transport(config),
		Some(other) => Err(TransportError::Config(format!("Unknown transport type '{}'", other))),
		None => Err(TransportError::Config("Transport type is required".to_string())),
	}
}
