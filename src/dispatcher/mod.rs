//! Per-canvas frame submission to the compositor.

mod frame_dispatcher;

pub use frame_dispatcher::{
    DispatcherMessage, DispatcherOpts, DispatcherStats, MAX_PENDING_COMPOSITOR_FRAMES,
    MAX_UNRECLAIMED_PLACEHOLDER_FRAMES, ResourceDispatcher,
};
