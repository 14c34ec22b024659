//! Compositor-facing frame types and the frame sink contract.

mod frame;
mod sink;

pub use frame::{
    BeginFrameAck, BeginFrameArgs, CompositorFrame, LocalSurfaceId, ReturnedResource,
    TextureQuad, TransferableResource,
};
pub use sink::{CompositorFrameSink, RecordingFrameSink, SinkEvent};
