//! Pending-invocation table.
//!
//! # Architecture
//!
//! ```text
//! Request Flow:
//!   1. Allocate a correlation id
//!   2. Insert PendingInvocation (oneshot::Sender inside)
//!   3. Write the request frame on the connection
//!   4. Wait on the oneshot::Receiver, bounded by the deadline
//!
//! Response Flow (reader task):
//!   5. Response frame arrives
//!   6. Remove the record by correlation id
//!   7. Run the response hook, if any
//!   8. oneshot::Sender fires
//!
//! Failure Flow:
//!   - connection closed   -> every record on that connection fails
//!   - member left         -> every record targeting the member fails
//!   - deadline / cancel   -> the caller's guard removes its record;
//!                            a late response finds nothing and is dropped
//! ```
//!
//! Each record is removed exactly once, by whichever of these paths gets
//! to it first, so every invocation resolves at most once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use gridlink_core::{CorrelationId, MemberId};
use tokio::sync::oneshot;

use crate::connection::ConnectionId;
use crate::error::InvocationError;
use crate::wire::Frame;

/// Callback run by the reader task on a successful response, before the
/// caller is resolved. Receives the response frame and the member that
/// sent it.
pub type ResponseHook = Arc<dyn Fn(&Frame, MemberId) + Send + Sync>;

/// Outcome delivered to the waiting caller.
pub type InvocationOutcome = Result<Frame, InvocationError>;

/// A request waiting for its response.
pub struct PendingInvocation {
    /// Member the request was sent to.
    pub member: MemberId,
    /// Connection the request was written on.
    pub connection: ConnectionId,
    /// Operation invoked (for logging).
    pub op_code: u16,
    /// Resolves the caller.
    pub sender: oneshot::Sender<InvocationOutcome>,
    /// Optional hook run before resolution.
    pub hook: Option<ResponseHook>,
}

impl std::fmt::Debug for PendingInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingInvocation")
            .field("member", &self.member)
            .field("connection", &self.connection)
            .field("op_code", &self.op_code)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

/// Concurrent map of pending invocations keyed by correlation id.
#[derive(Debug)]
pub struct InvocationTable {
    next_id: AtomicU64,
    pending: DashMap<CorrelationId, PendingInvocation>,
}

impl Default for InvocationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InvocationTable {
    /// Create an empty table. Ids start at 1; 0 is the handshake id.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
        }
    }

    /// Allocate a fresh correlation id.
    pub fn next_correlation_id(&self) -> CorrelationId {
        CorrelationId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Store a pending invocation.
    pub fn insert(&self, id: CorrelationId, invocation: PendingInvocation) {
        self.pending.insert(id, invocation);
    }

    /// Drop a record without resolving it. Returns whether it was present.
    pub fn remove(&self, id: CorrelationId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Number of pending invocations.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Resolve the record matching a response frame.
    ///
    /// Returns false if no record exists (timed out, failed or unknown);
    /// the frame is discarded.
    pub fn complete(&self, member: MemberId, frame: Frame) -> bool {
        let Some((id, invocation)) = self.pending.remove(&frame.correlation_id) else {
            tracing::debug!(
                "discarding response for unknown correlation id {} from {}",
                frame.correlation_id,
                member
            );
            return false;
        };

        if !frame.is_error() {
            if let Some(hook) = &invocation.hook {
                hook(&frame, member);
            }
        }

        tracing::debug!(
            "invocation {} op={:#06x} resolved by {}",
            id,
            invocation.op_code,
            member
        );
        // The caller may have given up already.
        let _ = invocation.sender.send(Ok(frame));
        true
    }

    /// Fail every record written on `connection`.
    pub fn fail_connection(&self, connection: ConnectionId, member: MemberId) -> usize {
        self.fail_where(
            |invocation| invocation.connection == connection,
            || InvocationError::TargetDisconnected { member },
        )
    }

    /// Fail every record targeting `member` with `MemberLeft`.
    pub fn fail_member(&self, member: MemberId) -> usize {
        self.fail_where(
            |invocation| invocation.member == member,
            || InvocationError::MemberLeft { member },
        )
    }

    /// Fail every record with `ClientShutdown`.
    pub fn fail_all(&self) -> usize {
        self.fail_where(|_| true, || InvocationError::ClientShutdown)
    }

    fn fail_where(
        &self,
        matches: impl Fn(&PendingInvocation) -> bool,
        error: impl Fn() -> InvocationError,
    ) -> usize {
        let ids: Vec<CorrelationId> = self
            .pending
            .iter()
            .filter(|entry| matches(entry.value()))
            .map(|entry| *entry.key())
            .collect();

        let mut failed = 0;
        for id in ids {
            // Re-check: the record may have been resolved in between.
            if let Some((_, invocation)) = self.pending.remove_if(&id, |_, inv| matches(inv)) {
                let _ = invocation.sender.send(Err(error()));
                failed += 1;
            }
        }
        if failed > 0 {
            tracing::debug!("failed {} pending invocations with {}", failed, error());
        }
        failed
    }
}

/// Removes a pending record when dropped.
///
/// Held by the invoking task for the lifetime of one attempt, so a timed
/// out or cancelled attempt never leaves a record behind.
pub(crate) struct PendingGuard<'a> {
    table: &'a InvocationTable,
    id: CorrelationId,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(table: &'a InvocationTable, id: CorrelationId) -> Self {
        Self { table, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}
