//! Request deduplication cache.

use crate::{StorageError, StorageInterface, StorageService};
use relayer_types::B256;
use std::time::Duration;
use tracing::debug;

const NAMESPACE: &str = "dedup";

/// Records request fingerprints for a retention window.
///
/// A fingerprint seen inside the window is a duplicate; once the window has
/// passed the same request may be relayed again.
pub struct DedupCache {
	storage: StorageService,
	retention: Duration,
}

impl DedupCache {
	pub fn new(backend: Box<dyn StorageInterface>, retention: Duration) -> Self {
		Self {
			storage: StorageService::new(backend),
			retention,
		}
	}

	pub fn retention(&self) -> Duration {
		self.retention
	}

	/// Records `fingerprint` unless it is already present.
	///
	/// Returns `true` for a first sighting and `false` for a duplicate.
	/// Concurrent callers racing on the same fingerprint see exactly one
	/// `true`.
	pub async fn check_and_record(&self, fingerprint: &B256) -> Result<bool, StorageError> {
		let first_seen = chrono::Utc::now().timestamp();
		self.storage
			.store_if_absent(NAMESPACE, &fingerprint.to_string(), &first_seen, Some(self.retention))
			.await
	}

	/// Unix timestamp at which a live fingerprint was first recorded.
	pub async fn first_seen(&self, fingerprint: &B256) -> Result<Option<i64>, StorageError> {
		match self.storage.retrieve(NAMESPACE, &fingerprint.to_string()).await {
			Ok(ts) => Ok(Some(ts)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Drops fingerprints older than the retention window.
	pub async fn purge_expired(&self) -> Result<usize, StorageError> {
		let purged = self.storage.purge_expired().await?;
		if purged > 0 {
			debug!(purged, "Purged expired dedup entries");
		}
		Ok(purged)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;

	#[tokio::test]
	async fn test_second_sighting_is_duplicate() {
		let cache = DedupCache::new(Box::new(MemoryStorage::new()), Duration::from_secs(86_400));
		let fingerprint = B256::repeat_byte(0xab);

		assert!(cache.check_and_record(&fingerprint).await.unwrap());
		assert!(!cache.check_and_record(&fingerprint).await.unwrap());
		assert!(cache.first_seen(&fingerprint).await.unwrap().is_some());

		assert!(cache.check_and_record(&B256::repeat_byte(0xcd)).await.unwrap());
	}

	#[tokio::test]
	async fn test_fingerprint_is_accepted_again_after_retention() {
		let storage = MemoryStorage::new();
		let cache = DedupCache::new(Box::new(storage.clone()), Duration::from_millis(20));
		let fingerprint = B256::repeat_byte(0x01);

		assert!(cache.check_and_record(&fingerprint).await.unwrap());
		tokio::time::sleep(Duration::from_millis(40)).await;

		assert_eq!(cache.first_seen(&fingerprint).await.unwrap(), None);
		assert_eq!(cache.purge_expired().await.unwrap(), 1);
		assert!(storage.is_empty());
		assert!(cache.check_and_record(&fingerprint).await.unwrap());
	}
}
