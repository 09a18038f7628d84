//! In-process transport.
//!
//! Messages are injected with [`MemoryTransport::publish`] and replies are
//! recorded instead of sent, which makes it the transport of choice for
//! tests and local runs.

use crate::{TransportError, TransportInterface};
use async_trait::async_trait;
use relayer_types::{ConfigSchema, InboundMessage, ReplyEnvelope, Schema, Topic, ValidationError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

#[derive(Default)]
struct MemoryState {
	sender: Option<mpsc::UnboundedSender<InboundMessage>>,
	topics: HashSet<Topic>,
	replies: Vec<(InboundMessage, ReplyEnvelope)>,
}

/// Transport backed by a channel. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryTransport {
	state: Arc<Mutex<MemoryState>>,
	replied: Arc<Notify>,
}

impl MemoryTransport {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, MemoryState> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// Delivers `message` if its topic is subscribed. Returns whether it was
	/// delivered.
	pub fn publish(&self, message: InboundMessage) -> bool {
		let state = self.state();
		match &state.sender {
			Some(sender) if state.topics.contains(&message.topic) => sender.send(message).is_ok(),
			_ => false,
		}
	}

	pub fn is_subscribed(&self) -> bool {
		self.state().sender.is_some()
	}

	/// Replies sent so far, with the message each one answered.
	pub fn replies(&self) -> Vec<(InboundMessage, ReplyEnvelope)> {
		self.state().replies.clone()
	}

	/// Waits until at least `count` replies were sent. Returns `false` on
	/// timeout.
	pub async fn wait_for_replies(&self, count: usize, timeout: Duration) -> bool {
		let wait = async {
			loop {
				let notified = self.replied.notified();
				if self.state().replies.len() >= count {
					return;
				}
				notified.await;
			}
		};
		tokio::time::timeout(timeout, wait).await.is_ok()
	}
}

struct MemoryTransportSchema;

impl ConfigSchema for MemoryTransportSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

#[async_trait]
impl TransportInterface for MemoryTransport {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryTransportSchema)
	}

	async fn subscribe(
		&self,
		topics: &[Topic],
		sender: mpsc::UnboundedSender<InboundMessage>,
	) -> Result<(), TransportError> {
		let mut state = self.state();
		if state.sender.is_some() {
			return Err(TransportError::AlreadySubscribed);
		}
		state.sender = Some(sender);
		state.topics = topics.iter().copied().collect();
		Ok(())
	}

	async fn reply(&self, message: &InboundMessage, reply: &ReplyEnvelope) -> Result<(), TransportError> {
		self.state().replies.push((message.clone(), reply.clone()));
		self.replied.notify_waiters();
		Ok(())
	}

	async fn unsubscribe_all(&self) -> Result<(), TransportError> {
		let mut state = self.state();
		state.sender = None;
		state.topics.clear();
		Ok(())
	}
}

pub fn create_memory_transport(config: &toml::Value) -> Result<Box<dyn TransportInterface>, TransportError> {
	MemoryTransportSchema
		.validate(config)
		.map_err(|e| TransportError::Config(e.to_string()))?;
	Ok(Box::new(MemoryTransport::new()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_publish_only_to_subscribed_topics() {
		let transport = MemoryTransport::new();
		let subscribed = Topic::from_name("SNTController");
		let other = Topic::from_name("IdentityGasRelay");

		assert!(!transport.publish(InboundMessage::new(subscribed, b"{}".to_vec())));

		let (tx, mut rx) = mpsc::unbounded_channel();
		transport.subscribe(&[subscribed], tx).await.unwrap();
		assert!(matches!(
			transport.subscribe(&[subscribed], mpsc::unbounded_channel().0).await,
			Err(TransportError::AlreadySubscribed)
		));

		assert!(transport.publish(InboundMessage::new(subscribed, b"{}".to_vec())));
		assert!(!transport.publish(InboundMessage::new(other, b"{}".to_vec())));
		assert_eq!(rx.recv().await.unwrap().topic, subscribed);

		transport.unsubscribe_all().await.unwrap();
		assert!(!transport.is_subscribed());
		assert!(!transport.publish(InboundMessage::new(subscribed, b"{}".to_vec())));
	}

	#[tokio::test]
	async fn test_replies_are_recorded() {
		let transport = MemoryTransport::new();
		let message = InboundMessage::new(Topic::from_name("SNTC"), b"{}".to_vec());

		let waiter = transport.clone();
		let handle = tokio::spawn(async move { waiter.wait_for_replies(1, Duration::from_secs(1)).await });

		transport
			.reply(&message, &ReplyEnvelope::text("Invalid message"))
			.await
			.unwrap();

		assert!(handle.await.unwrap());
		let replies = transport.replies();
		assert_eq!(replies.len(), 1);
		assert_eq!(replies[0].1.message_text(), "Invalid message");
		assert!(!transport.wait_for_replies(2, Duration::from_millis(20)).await);
	}
}
