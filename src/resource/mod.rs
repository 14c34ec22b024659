//! Reference-counted drawable buffers.
//!
//! A [`CanvasResource`] is written only on the thread that created it but may be held and
//! released anywhere. [`ResourceRef`] is the counted handle; when the last handle drops, an
//! attached last-unref callback gets the resource back instead of letting it be destroyed.
//! Destruction on the owning thread tears the backing down, destruction anywhere else abandons
//! it.

mod pool;
mod release;
#[allow(clippy::module_inception)]
mod resource;

pub use pool::{MAX_RECYCLED_CANVAS_RESOURCES, ResourcePool, ResourcePoolOpts, ResourcePoolStats};
pub(crate) use release::ProviderLink;
pub use release::ReleaseCallback;
pub use resource::{CanvasResource, LastUnrefCallback, ResourceKind, ResourceRef};
