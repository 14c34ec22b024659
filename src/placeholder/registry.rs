use crate::dispatcher::DispatcherMessage;
use crate::foundation::core::{PlaceholderId, ResourceId};
use crate::placeholder::placeholder::Placeholder;
use crate::resource::ResourceRef;
use crate::task::{Inbox, Port};
use std::collections::HashMap;

/// Messages dispatchers send to the main thread.
#[derive(Debug)]
pub enum PlaceholderMessage {
    /// A dispatcher was created for the placeholder's canvas.
    AttachDispatcher {
        placeholder: PlaceholderId,
        dispatcher: Port<DispatcherMessage>,
    },
    /// A new frame for the placeholder. It goes back through `dispatcher` when replaced.
    SetResource {
        placeholder: PlaceholderId,
        resource_id: ResourceId,
        resource: ResourceRef,
        dispatcher: Port<DispatcherMessage>,
    },
}

/// What a dispatcher on another thread needs to reach its placeholder.
#[derive(Clone, Debug)]
pub struct PlaceholderHandle {
    id: PlaceholderId,
    port: Port<PlaceholderMessage>,
}

impl PlaceholderHandle {
    pub fn id(&self) -> PlaceholderId {
        self.id
    }

    /// Returns `false` if the registry is gone.
    pub fn post(&self, message: PlaceholderMessage) -> bool {
        self.port.post(message)
    }
}

/// Main-thread table of placeholders.
///
/// Every id is registered once and unregistered once; pairing mistakes are programming
/// errors and panic.
#[derive(Debug, Default)]
pub struct PlaceholderRegistry {
    placeholders: HashMap<PlaceholderId, Placeholder>,
    inbox: Inbox<PlaceholderMessage>,
}

impl PlaceholderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: PlaceholderId) -> &mut Placeholder {
        assert!(
            !self.placeholders.contains_key(&id),
            "placeholder {id:?} registered twice"
        );
        tracing::debug!(placeholder = id.0, "placeholder registered");
        self.placeholders.entry(id).or_insert_with(|| Placeholder::new(id))
    }

    /// Remove a placeholder. Its frame goes back to the dispatcher.
    pub fn unregister(&mut self, id: PlaceholderId) {
        let removed = self.placeholders.remove(&id);
        assert!(removed.is_some(), "placeholder {id:?} was not registered");
        tracing::debug!(placeholder = id.0, "placeholder unregistered");
    }

    pub fn contains(&self, id: PlaceholderId) -> bool {
        self.placeholders.contains_key(&id)
    }

    pub fn get(&self, id: PlaceholderId) -> Option<&Placeholder> {
        self.placeholders.get(&id)
    }

    pub fn get_mut(&mut self, id: PlaceholderId) -> Option<&mut Placeholder> {
        self.placeholders.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.placeholders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placeholders.is_empty()
    }

    /// Handle to pass to the dispatcher of placeholder `id`'s canvas.
    pub fn handle(&self, id: PlaceholderId) -> PlaceholderHandle {
        PlaceholderHandle {
            id,
            port: self.inbox.port(),
        }
    }

    /// Route pending messages to their placeholders. Returns how many were handled.
    ///
    /// Frames for placeholders that no longer exist go straight back to their dispatcher.
    pub fn process_messages(&mut self) -> usize {
        let placeholders = &mut self.placeholders;
        self.inbox.drain(|message| match message {
            PlaceholderMessage::AttachDispatcher {
                placeholder,
                dispatcher,
            } => match placeholders.get_mut(&placeholder) {
                Some(p) => p.set_dispatcher(dispatcher),
                None => tracing::trace!(
                    placeholder = placeholder.0,
                    "dispatcher for unknown placeholder"
                ),
            },
            PlaceholderMessage::SetResource {
                placeholder,
                resource_id,
                resource,
                dispatcher,
            } => match placeholders.get_mut(&placeholder) {
                Some(p) => p.set_resource(resource, resource_id, dispatcher),
                None => {
                    tracing::trace!(
                        placeholder = placeholder.0,
                        id = resource_id.0,
                        "frame for unknown placeholder; returning it"
                    );
                    dispatcher.post(DispatcherMessage::ReclaimResource {
                        id: resource_id,
                        resource: Some(resource),
                    });
                }
            },
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/placeholder/registry.rs"]
mod tests;
