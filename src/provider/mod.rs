//! Resource providers: the writable surface behind a canvas.

mod resource_provider;

pub use resource_provider::{ProviderKind, ProviderOpts, ProviderStats, ResourceProvider};
