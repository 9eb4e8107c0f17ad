//! Partition-aware routing.
//!
//! A routing key is hashed with MurmurHash3 (x86, 32-bit); the absolute
//! value of the hash modulo the partition count gives the partition, whose
//! current owner serves the request.
//!
//! The partition count is learned from the first authentication response
//! and never changes for the session. The table contents change wholesale
//! on every partition-table event.

use std::sync::{Arc, OnceLock};

use gridlink_core::MemberId;
use parking_lot::RwLock;

use crate::error::RoutingError;

/// Seed used when hashing routing keys.
pub const PARTITION_HASH_SEED: u32 = 0x0100_0193;

/// MurmurHash3 x86 32-bit.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, byte) in tail.iter().enumerate() {
            k |= (*byte as u32) << (8 * i);
        }
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Partition of `key` for a cluster with `count` partitions.
pub fn partition_id(key: &[u8], count: u32) -> u32 {
    let hash = murmur3_32(key, PARTITION_HASH_SEED) as i32;
    hash.unsigned_abs() % count
}

/// Owner per partition index plus the table version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionTable {
    /// Monotonic version.
    pub version: u64,
    /// Owner of each partition, `None` while being migrated.
    pub owners: Vec<Option<MemberId>>,
}

/// Maps routing keys to the members owning their partition.
#[derive(Debug, Default)]
pub struct PartitionRouter {
    count: OnceLock<u32>,
    table: RwLock<Arc<PartitionTable>>,
}

impl PartitionRouter {
    /// Create a router with no partition count and an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the partition count reported by a member.
    ///
    /// The first value wins; a different count from a later member is
    /// logged and ignored.
    pub fn set_partition_count(&self, count: u32) {
        if count == 0 {
            tracing::warn!("ignoring zero partition count");
            return;
        }
        let current = *self.count.get_or_init(|| count);
        if current != count {
            tracing::warn!(
                "member reported {} partitions, session uses {}",
                count,
                current
            );
        }
    }

    /// Partition count, once known.
    pub fn partition_count(&self) -> Option<u32> {
        self.count.get().copied()
    }

    /// Current table.
    pub fn table(&self) -> Arc<PartitionTable> {
        self.table.read().clone()
    }

    /// Install a new table.
    ///
    /// Returns false (and keeps the current table) if the version is not
    /// newer or the size differs from the partition count.
    pub fn apply(&self, version: u64, owners: Vec<Option<MemberId>>) -> bool {
        let Some(count) = self.partition_count() else {
            tracing::warn!("partition table {} received before partition count", version);
            return false;
        };
        if owners.len() != count as usize {
            tracing::warn!(
                "ignoring partition table {} with {} entries (expected {})",
                version,
                owners.len(),
                count
            );
            return false;
        }

        let mut guard = self.table.write();
        if version <= guard.version {
            tracing::debug!(
                "ignoring stale partition table {} (current {})",
                version,
                guard.version
            );
            return false;
        }
        *guard = Arc::new(PartitionTable { version, owners });
        tracing::info!(version, "partition table updated");
        true
    }

    /// Owner of the partition of `key`.
    ///
    /// # Errors
    ///
    /// Returns `NoOwnerYet` if the partition count is unknown or the
    /// partition has no owner in the current table.
    pub fn route(&self, key: &[u8]) -> Result<MemberId, RoutingError> {
        let count = self
            .partition_count()
            .ok_or(RoutingError::NoOwnerYet { partition: None })?;
        let partition = partition_id(key, count);
        self.owner(partition)
            .ok_or(RoutingError::NoOwnerYet {
                partition: Some(partition),
            })
    }

    /// Partition of `key`, once the partition count is known.
    pub fn partition_of(&self, key: &[u8]) -> Option<u32> {
        self.partition_count().map(|count| partition_id(key, count))
    }

    /// Owner of a partition in the current table.
    pub fn owner(&self, partition: u32) -> Option<MemberId> {
        self.table
            .read()
            .owners
            .get(partition as usize)
            .copied()
            .flatten()
    }
}
