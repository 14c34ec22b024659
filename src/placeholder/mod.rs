//! Main-thread stand-ins for canvases drawn on another thread.
//!
//! A [`ResourceDispatcher`](crate::dispatcher::ResourceDispatcher) posts each frame to its
//! placeholder through a [`PlaceholderHandle`]. The [`PlaceholderRegistry`] receives those
//! messages on the main thread and routes them by [`PlaceholderId`](crate::PlaceholderId).

mod placeholder;
mod registry;

pub use placeholder::{AnimationState, Placeholder};
pub use registry::{PlaceholderHandle, PlaceholderMessage, PlaceholderRegistry};
