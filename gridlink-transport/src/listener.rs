//! Listener registrations and event delivery.
//!
//! A registration maps a server-assigned id to a set of callbacks. Events
//! arrive on the connection reader, which only enqueues them; each
//! registration owns a delivery task that runs the callbacks in the order
//! the events were read. Slow callbacks therefore never stall response
//! processing on the same connection.
//!
//! ```text
//! reader task ──dispatch──► Registration.queue ──► delivery task ──► callback
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use gridlink_core::{Data, MemberId};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::InvocationError;
use crate::invocation::{InvocationRequest, InvocationService, ResponseHook, Target};
use crate::protocol::{self, op, EventKind, EventMessage, RemoveListenerRequest};
use crate::wire::Frame;

/// Event handed to a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemEvent {
    /// Object the registration listens to.
    pub object_name: String,
    /// Event kind.
    pub kind: EventKind,
    /// Serialized item, if the listener asked for values.
    pub item: Option<Data>,
    /// Member where the change happened.
    pub member: MemberId,
}

/// Callback invoked with an event.
pub type EventCallback = Box<dyn Fn(ItemEvent) + Send + Sync>;

/// Named handlers of one registration. Kinds without a handler are ignored.
#[derive(Default)]
pub struct EventHandlers {
    item_added: Option<EventCallback>,
    item_removed: Option<EventCallback>,
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("item_added", &self.item_added.is_some())
            .field("item_removed", &self.item_removed.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// No handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the handler for `kind`.
    pub fn on(mut self, kind: EventKind, callback: impl Fn(ItemEvent) + Send + Sync + 'static) -> Self {
        let slot = match kind {
            EventKind::ItemAdded => &mut self.item_added,
            EventKind::ItemRemoved => &mut self.item_removed,
        };
        *slot = Some(Box::new(callback));
        self
    }

    /// Whether a handler exists for `kind`.
    pub fn handles(&self, kind: EventKind) -> bool {
        self.handler(kind).is_some()
    }

    fn handler(&self, kind: EventKind) -> Option<&EventCallback> {
        match kind {
            EventKind::ItemAdded => self.item_added.as_ref(),
            EventKind::ItemRemoved => self.item_removed.as_ref(),
        }
    }
}

/// A live listener registration.
#[derive(Debug)]
pub struct Registration {
    id: String,
    object_name: String,
    owner: MemberId,
    stale: AtomicBool,
    queue: mpsc::UnboundedSender<ItemEvent>,
}

impl Registration {
    /// Server-assigned id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Object the registration listens to.
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// Member that accepted the registration.
    pub fn owner(&self) -> MemberId {
        self.owner
    }

    /// Whether the owner left the cluster.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }
}

/// Registrations of one client session.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    registrations: DashMap<String, Arc<Registration>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a registration and spawn its delivery task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn install(
        &self,
        id: String,
        object_name: String,
        owner: MemberId,
        handlers: EventHandlers,
    ) -> Arc<Registration> {
        let (queue, mut events) = mpsc::unbounded_channel::<ItemEvent>();
        let registration = Arc::new(Registration {
            id: id.clone(),
            object_name,
            owner,
            stale: AtomicBool::new(false),
            queue,
        });

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Some(handler) = handlers.handler(event.kind) {
                    handler(event);
                }
            }
        });

        tracing::debug!("listener {} registered on {}", id, owner);
        self.registrations.insert(id, registration.clone());
        registration
    }

    /// Route an event to its registration.
    ///
    /// Returns false if the registration is unknown (already removed or
    /// never installed); the event is dropped.
    pub fn dispatch(&self, event: EventMessage) -> bool {
        let Some(registration) = self
            .registrations
            .get(&event.registration_id)
            .map(|entry| entry.value().clone())
        else {
            tracing::debug!("dropping event for unknown registration {}", event.registration_id);
            return false;
        };

        let item_event = ItemEvent {
            object_name: registration.object_name.clone(),
            kind: event.kind,
            item: event.item,
            member: event.member,
        };
        registration.queue.send(item_event).is_ok()
    }

    /// Look up a registration.
    pub fn get(&self, id: &str) -> Option<Arc<Registration>> {
        self.registrations.get(id).map(|entry| entry.value().clone())
    }

    /// Remove a registration. Queued events are still delivered.
    pub fn remove(&self, id: &str) -> Option<Arc<Registration>> {
        self.registrations.remove(id).map(|(_, registration)| registration)
    }

    /// Mark every registration owned by `member` stale.
    pub fn mark_stale(&self, member: MemberId) -> usize {
        let mut marked = 0;
        for entry in self.registrations.iter() {
            if entry.owner == member && !entry.stale.swap(true, Ordering::SeqCst) {
                marked += 1;
            }
        }
        if marked > 0 {
            tracing::info!(member = %member, registrations = marked, "registrations marked stale");
        }
        marked
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether there are no registrations.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

/// Progress of a registration installed from a response hook.
#[derive(Debug)]
enum InstallSlot {
    /// No response yet.
    Waiting,
    /// Installed locally under this id.
    Installed(String),
    /// The caller owns the registration.
    Committed,
    /// The caller is gone; nothing may be installed any more.
    Abandoned,
}

/// Removes a registration installed by a response hook unless the caller
/// saw its id.
///
/// The hook runs in the reader before the caller is resolved, so the caller
/// can time out (or be dropped) after the record was installed.
#[derive(Debug)]
struct InstallGuard {
    registry: Arc<ListenerRegistry>,
    slot: Arc<Mutex<InstallSlot>>,
}

impl InstallGuard {
    fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self {
            registry,
            slot: Arc::new(Mutex::new(InstallSlot::Waiting)),
        }
    }

    fn commit(self) {
        *self.slot.lock() = InstallSlot::Committed;
    }
}

impl Drop for InstallGuard {
    fn drop(&mut self) {
        let previous = std::mem::replace(&mut *self.slot.lock(), InstallSlot::Abandoned);
        if let InstallSlot::Installed(id) = previous {
            tracing::debug!("caller never saw listener {}, removing it", id);
            self.registry.remove(&id);
        }
    }
}

/// Registers and unregisters listeners through invocations.
#[derive(Debug, Clone)]
pub struct ListenerService {
    registry: Arc<ListenerRegistry>,
    invocations: InvocationService,
}

impl ListenerService {
    /// Create a service over the session's registry and invocation service.
    pub fn new(registry: Arc<ListenerRegistry>, invocations: InvocationService) -> Self {
        Self {
            registry,
            invocations,
        }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Register a listener.
    ///
    /// `request` must answer with the registration id as a JSON string. The
    /// registration is installed by the connection reader before this call
    /// returns, so no event that follows the response is missed.
    ///
    /// # Errors
    ///
    /// Any invocation error, or `Codec` if the response is not a string.
    pub async fn register(
        &self,
        object_name: &str,
        request: InvocationRequest,
        handlers: EventHandlers,
    ) -> Result<String, InvocationError> {
        let registry = self.registry.clone();
        let object = object_name.to_string();
        let handlers = Mutex::new(Some(handlers));
        let guard = InstallGuard::new(self.registry.clone());
        let slot = guard.slot.clone();

        let hook: ResponseHook = Arc::new(move |frame: &Frame, member: MemberId| {
            let id: String = match protocol::decode_body(&frame.payload) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!("listener registration response undecodable: {}", e);
                    return;
                }
            };
            let mut slot = slot.lock();
            if !matches!(*slot, InstallSlot::Waiting) {
                return;
            }
            if let Some(handlers) = handlers.lock().take() {
                registry.install(id.clone(), object.clone(), member, handlers);
                *slot = InstallSlot::Installed(id);
            }
        });

        let response = self.invocations.invoke(request.on_response(hook)).await?;
        let id = response.decode::<String>()?;
        guard.commit();
        Ok(id)
    }

    /// Cancel a registration.
    ///
    /// Returns false for an unknown id without contacting the cluster.
    /// Otherwise asks the owning member to drop the registration (unless
    /// the owner already left) and removes it locally; returns whether the
    /// local record was still present.
    ///
    /// # Errors
    ///
    /// The `REMOVE_LISTENER` invocation failed; the registration is kept.
    pub async fn unregister(&self, registration_id: &str) -> Result<bool, InvocationError> {
        let Some(registration) = self.registry.get(registration_id) else {
            return Ok(false);
        };

        if !registration.is_stale() {
            let body = protocol::encode_body(&RemoveListenerRequest {
                object_name: registration.object_name.clone(),
                registration_id: registration.id.clone(),
            })?;
            let request = InvocationRequest::new(
                Target::Member(registration.owner),
                op::REMOVE_LISTENER,
                body,
            )
            .retryable(true);

            match self.invocations.invoke(request).await {
                Ok(response) => {
                    let removed: bool = response.decode()?;
                    tracing::debug!(
                        "listener {} removed on {}: {}",
                        registration.id,
                        registration.owner,
                        removed
                    );
                }
                Err(InvocationError::MemberLeft { .. } | InvocationError::MemberUnreachable { .. }) => {
                    tracing::debug!("owner of listener {} is gone", registration.id);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(self.registry.remove(registration_id).is_some())
    }
}
