//! Typed item listeners.

use std::sync::Arc;

use gridlink_core::{MemberId, Serializer};
use gridlink_transport::{EventHandlers, EventKind, ItemEvent};
use serde::de::DeserializeOwned;

/// An item event with the item decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemNotification<T> {
    /// Collection the event belongs to.
    pub name: String,
    /// The item, `None` when the listener was registered without values.
    pub item: Option<T>,
    /// Member where the change happened.
    pub member: MemberId,
}

type Callback<T> = Arc<dyn Fn(ItemNotification<T>) + Send + Sync>;

/// Callbacks for item events of a set or queue.
///
/// ```rust
/// use gridlink::ItemListener;
///
/// let listener = ItemListener::<i64>::new()
///     .on_item_added(|event| println!("added {:?}", event.item))
///     .include_value(true);
/// # let _ = listener;
/// ```
pub struct ItemListener<T> {
    include_value: bool,
    added: Option<Callback<T>>,
    removed: Option<Callback<T>>,
}

impl<T> std::fmt::Debug for ItemListener<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemListener")
            .field("include_value", &self.include_value)
            .field("item_added", &self.added.is_some())
            .field("item_removed", &self.removed.is_some())
            .finish()
    }
}

impl<T> Default for ItemListener<T> {
    fn default() -> Self {
        Self {
            include_value: true,
            added: None,
            removed: None,
        }
    }
}

impl<T: DeserializeOwned + Send + 'static> ItemListener<T> {
    /// A listener without callbacks that asks for item values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether events should carry the item.
    pub fn include_value(mut self, include: bool) -> Self {
        self.include_value = include;
        self
    }

    /// Called for every added item.
    pub fn on_item_added(
        mut self,
        callback: impl Fn(ItemNotification<T>) + Send + Sync + 'static,
    ) -> Self {
        self.added = Some(Arc::new(callback));
        self
    }

    /// Called for every removed item.
    pub fn on_item_removed(
        mut self,
        callback: impl Fn(ItemNotification<T>) + Send + Sync + 'static,
    ) -> Self {
        self.removed = Some(Arc::new(callback));
        self
    }

    pub(crate) fn wants_values(&self) -> bool {
        self.include_value
    }

    pub(crate) fn into_handlers(self, serializer: Serializer) -> EventHandlers {
        let mut handlers = EventHandlers::new();
        if let Some(callback) = self.added {
            handlers = handlers.on(EventKind::ItemAdded, decoding(callback, serializer.clone()));
        }
        if let Some(callback) = self.removed {
            handlers = handlers.on(EventKind::ItemRemoved, decoding(callback, serializer));
        }
        handlers
    }
}

fn decoding<T: DeserializeOwned + 'static>(
    callback: Callback<T>,
    serializer: Serializer,
) -> impl Fn(ItemEvent) + Send + Sync + 'static {
    move |event: ItemEvent| {
        let item = match event.item.as_ref().map(|data| serializer.to_object(data)) {
            None => None,
            Some(Ok(item)) => Some(item),
            Some(Err(e)) => {
                tracing::warn!("dropping {:?} event on {}: {}", event.kind, event.object_name, e);
                return;
            }
        };
        callback(ItemNotification {
            name: event.object_name,
            item,
            member: event.member,
        });
    }
}
