//! In-memory storage backend.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct StoredValue {
	bytes: Vec<u8>,
	expires_at: Option<Instant>,
}

impl StoredValue {
	fn new(bytes: Vec<u8>, ttl: Option<Duration>) -> Self {
		Self {
			bytes,
			expires_at: ttl.map(|ttl| Instant::now() + ttl),
		}
	}

	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

/// DashMap-backed storage. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStorage {
	data: Arc<DashMap<String, StoredValue>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of entries held, expired ones included.
	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match self.data.get(key) {
			Some(value) if !value.is_expired(Instant::now()) => Ok(value.bytes.clone()),
			_ => Err(StorageError::NotFound),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StorageError> {
		self.data.insert(key.to_string(), StoredValue::new(value, ttl));
		Ok(())
	}

	async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool, StorageError> {
		// The entry guard holds the shard lock until the match completes.
		match self.data.entry(key.to_string()) {
			Entry::Occupied(mut occupied) => {
				if occupied.get().is_expired(Instant::now()) {
					occupied.insert(StoredValue::new(value, ttl));
					Ok(true)
				} else {
					Ok(false)
				}
			}
			Entry::Vacant(vacant) => {
				vacant.insert(StoredValue::new(value, ttl));
				Ok(true)
			}
		}
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.data.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self
			.data
			.get(key)
			.is_some_and(|value| !value.is_expired(Instant::now())))
	}

	async fn purge_expired(&self) -> Result<usize, StorageError> {
		let now = Instant::now();
		let before = self.data.len();
		self.data.retain(|_, value| !value.is_expired(now));
		Ok(before.saturating_sub(self.data.len()))
	}
}
