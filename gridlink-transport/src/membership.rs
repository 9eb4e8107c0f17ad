//! Member directory: the client's view of the cluster members.
//!
//! The directory is written only by the connection read loop when a
//! member-list event arrives, and read by every routing decision. Each
//! update installs a whole new [`MembershipSnapshot`], so readers never see
//! a half-applied list.
//!
//! Member lists carry a monotonic [`MembershipVersion`]; a list whose
//! version is not newer than the current one is ignored.

use std::sync::Arc;
use std::time::Duration;

use gridlink_core::{MemberId, NetworkAddress};
use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};

use crate::protocol::MemberInfo;

/// Capacity of the membership event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Monotonically increasing member-list version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MembershipVersion(pub u64);

impl std::fmt::Display for MembershipVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A single member of the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Member id.
    pub id: MemberId,
    /// Address to connect to.
    pub address: NetworkAddress,
    /// Partition-table version the member last acknowledged.
    pub partition_version: u64,
}

impl From<MemberInfo> for Member {
    fn from(info: MemberInfo) -> Self {
        Self {
            id: info.id,
            address: info.address,
            partition_version: info.partition_version,
        }
    }
}

/// Immutable view of the member list at a specific version.
#[derive(Debug, Clone, Default)]
pub struct MembershipSnapshot {
    /// Members in join order; the first one is the oldest.
    pub members: Vec<Member>,
    /// Version of this snapshot.
    pub version: MembershipVersion,
}

impl MembershipSnapshot {
    /// Look up a member by id.
    pub fn get(&self, id: MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Whether `id` is listed.
    pub fn contains(&self, id: MemberId) -> bool {
        self.get(id).is_some()
    }

    /// Oldest member, used as coordinator for cluster-wide operations.
    pub fn oldest(&self) -> Option<&Member> {
        self.members.first()
    }
}

/// A change between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    /// Member appeared in the list.
    MemberAdded(Member),
    /// Member is absent from a newer list.
    MemberRemoved(Member),
}

/// Members added and removed by one member-list update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDelta {
    /// Newly listed members.
    pub added: Vec<Member>,
    /// Members no longer listed.
    pub removed: Vec<Member>,
}

impl MembershipDelta {
    fn events(&self) -> impl Iterator<Item = MembershipEvent> + '_ {
        self.removed
            .iter()
            .cloned()
            .map(MembershipEvent::MemberRemoved)
            .chain(self.added.iter().cloned().map(MembershipEvent::MemberAdded))
    }
}

/// Tracks known members and publishes changes.
#[derive(Debug)]
pub struct MemberDirectory {
    snapshot: RwLock<Arc<MembershipSnapshot>>,
    events: broadcast::Sender<MembershipEvent>,
    initialized: watch::Sender<bool>,
}

impl Default for MemberDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (initialized, _) = watch::channel(false);
        Self {
            snapshot: RwLock::new(Arc::new(MembershipSnapshot::default())),
            events,
            initialized,
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<MembershipSnapshot> {
        self.snapshot.read().clone()
    }

    /// Look up a member by id.
    pub fn member(&self, id: MemberId) -> Option<Member> {
        self.snapshot.read().get(id).cloned()
    }

    /// Oldest listed member.
    pub fn oldest(&self) -> Option<Member> {
        self.snapshot.read().oldest().cloned()
    }

    /// Subscribe to membership events.
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }

    /// Install a member list.
    ///
    /// Returns `None` if `version` is not newer than the current one (the
    /// very first list is always accepted). Events are not published here;
    /// call [`MemberDirectory::publish`] once dependent state is updated.
    pub fn apply_member_list(
        &self,
        version: u64,
        members: Vec<MemberInfo>,
    ) -> Option<MembershipDelta> {
        let version = MembershipVersion(version);
        let mut members: Vec<Member> = members.into_iter().map(Member::from).collect();

        let mut guard = self.snapshot.write();
        let first = !*self.initialized.borrow();
        if !first && version <= guard.version {
            tracing::debug!(
                "ignoring stale member list {} (current {})",
                version,
                guard.version
            );
            return None;
        }

        let delta = MembershipDelta {
            added: members
                .iter()
                .filter(|m| !guard.contains(m.id))
                .cloned()
                .collect(),
            removed: guard
                .members
                .iter()
                .filter(|old| !members.iter().any(|m| m.id == old.id))
                .cloned()
                .collect(),
        };

        // An acknowledgement never goes backwards for a member still listed.
        for member in members.iter_mut() {
            if let Some(old) = guard.get(member.id) {
                member.partition_version = member.partition_version.max(old.partition_version);
            }
        }

        tracing::info!(
            version = %version,
            members = members.len(),
            added = delta.added.len(),
            removed = delta.removed.len(),
            "member list updated"
        );
        *guard = Arc::new(MembershipSnapshot { members, version });
        drop(guard);

        self.initialized.send_replace(true);
        Some(delta)
    }

    /// Record that `member` acknowledged partition table `version`.
    ///
    /// Returns false if the member is not listed or already acknowledged
    /// a version at least as new. The member-list version is unchanged and
    /// no event is published.
    pub fn acknowledge_partitions(&self, member: MemberId, version: u64) -> bool {
        let mut guard = self.snapshot.write();
        match guard.get(member) {
            Some(current) if current.partition_version < version => {}
            _ => return false,
        }
        let mut next = MembershipSnapshot::clone(&guard);
        for listed in next.members.iter_mut().filter(|m| m.id == member) {
            listed.partition_version = version;
        }
        *guard = Arc::new(next);
        true
    }

    /// Publish the events of a delta returned by
    /// [`MemberDirectory::apply_member_list`].
    pub fn publish(&self, delta: &MembershipDelta) {
        for event in delta.events() {
            // No subscriber is fine.
            let _ = self.events.send(event);
        }
    }

    /// Wait until the first member list has been applied.
    ///
    /// Returns false if it did not arrive within `timeout`.
    pub async fn wait_initialized(&self, timeout: Duration) -> bool {
        let mut rx = self.initialized.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|ready| *ready))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }
}
