//! Routes what connection readers observe to the session's tables.
//!
//! | frame tag         | destination                                  |
//! |-------------------|----------------------------------------------|
//! | response          | [`InvocationTable::complete`]                |
//! | event             | [`ListenerRegistry::dispatch`]               |
//! | membership-update | [`MemberDirectory`] / [`PartitionRouter`]    |
//! | request           | logged and dropped                           |

use std::sync::Arc;

use gridlink_core::MemberId;

use crate::connection::{ConnectionId, FrameHandler};
use crate::invocation::InvocationTable;
use crate::listener::ListenerRegistry;
use crate::membership::MemberDirectory;
use crate::partition::PartitionRouter;
use crate::protocol::{self, AuthResponse, ClusterEvent, EventMessage};
use crate::wire::{Frame, FrameTag};

/// [`FrameHandler`] shared by every connection of a session.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    invocations: Arc<InvocationTable>,
    listeners: Arc<ListenerRegistry>,
    directory: Arc<MemberDirectory>,
    router: Arc<PartitionRouter>,
}

impl Dispatcher {
    /// Create a dispatcher over the session's tables.
    pub fn new(
        invocations: Arc<InvocationTable>,
        listeners: Arc<ListenerRegistry>,
        directory: Arc<MemberDirectory>,
        router: Arc<PartitionRouter>,
    ) -> Self {
        Self {
            invocations,
            listeners,
            directory,
            router,
        }
    }

    fn on_cluster_event(&self, source: MemberId, event: ClusterEvent) {
        match event {
            ClusterEvent::MemberList { version, members } => {
                let Some(delta) = self.directory.apply_member_list(version, members) else {
                    return;
                };
                // Fail and mark before the connection manager closes the
                // departed member's connection, so callers see MemberLeft.
                for member in &delta.removed {
                    self.invocations.fail_member(member.id);
                    self.listeners.mark_stale(member.id);
                }
                self.directory.publish(&delta);
            }
            ClusterEvent::PartitionTable { version, owners } => {
                self.router.apply(version, owners);
                // The member pushing a table has acknowledged it, even a stale one.
                self.directory.acknowledge_partitions(source, version);
            }
        }
    }
}

impl FrameHandler for Dispatcher {
    fn on_authenticated(&self, _member: MemberId, response: &AuthResponse) {
        self.router.set_partition_count(response.partition_count);
    }

    fn on_frame(&self, member: MemberId, connection: ConnectionId, frame: Frame) {
        match frame.tag {
            FrameTag::Response => {
                self.invocations.complete(member, frame);
            }
            FrameTag::Event => match protocol::decode_body::<EventMessage>(&frame.payload) {
                Ok(event) => {
                    self.listeners.dispatch(event);
                }
                Err(e) => tracing::warn!("connection {}: undecodable event: {}", connection, e),
            },
            FrameTag::MembershipUpdate => {
                match protocol::decode_body::<ClusterEvent>(&frame.payload) {
                    Ok(event) => self.on_cluster_event(member, event),
                    Err(e) => {
                        tracing::warn!("connection {}: undecodable cluster event: {}", connection, e)
                    }
                }
            }
            FrameTag::Request => {
                tracing::warn!(
                    "connection {}: dropping request frame op={:#06x} from {}",
                    connection,
                    frame.op_code,
                    member
                );
            }
        }
    }

    fn on_closed(&self, member: MemberId, connection: ConnectionId) {
        self.invocations.fail_connection(connection, member);
    }
}
