//! Canvas resource lifecycle and compositor hand-off.
//!
//! A canvas draws into pooled CPU or GPU buffers and hands finished frames to a compositor
//! without copying:
//!
//! - A [`ResourceProvider`] owns the drawing surface and recycles released buffers
//! - A [`ResourceDispatcher`] submits frames from an offscreen canvas and mirrors them to a
//!   main-thread [`Placeholder`]
//! - A [`LayerBridge`] feeds a main-thread canvas to its compositor layer and hibernates it while
//!   the page is hidden
//!
//! GPU work goes through the [`gpu::GpuContext`] trait; [`gpu::SoftwareGpu`] implements it on
//! the CPU for tests and headless use.
#![forbid(unsafe_code)]

pub mod bridge;
pub mod compositor;
pub mod config;
pub mod dispatcher;
pub mod foundation;
pub mod gpu;
pub mod placeholder;
pub mod provider;
pub mod raster;
pub mod resource;
pub mod task;

pub use crate::foundation::core::{
    ContentId, FilterQuality, FlushReason, IntRect, PixelFormat, PlaceholderId, Point, Rect,
    ResourceId, Rgba8Premul, Size,
};
pub use crate::foundation::error::{HandoffError, HandoffResult};

pub use crate::bridge::{BridgeOpts, HibernationEvent, HibernationState, LayerBridge};
pub use crate::compositor::{CompositorFrame, CompositorFrameSink, RecordingFrameSink};
pub use crate::config::HandoffConfig;
pub use crate::dispatcher::{DispatcherOpts, ResourceDispatcher};
pub use crate::placeholder::{Placeholder, PlaceholderRegistry};
pub use crate::provider::{ProviderKind, ProviderOpts, ResourceProvider};
pub use crate::resource::{CanvasResource, ReleaseCallback, ResourceRef};
pub use crate::task::{TaskQueue, WeakTaskQueue};
