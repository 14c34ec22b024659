use crate::foundation::core::{FilterQuality, IntRect, PixelFormat, ResourceId, Size};
use crate::gpu::{Mailbox, SyncToken};
use smallvec::SmallVec;
use std::time::Duration;

/// A resource as described to the compositor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransferableResource {
    pub id: ResourceId,
    pub mailbox: Mailbox,
    pub size: Size,
    pub format: PixelFormat,
    /// The compositor waits on this before reading.
    pub sync_token: SyncToken,
    /// CPU shared bitmap rather than a GPU image.
    pub is_software: bool,
    pub filter_quality: FilterQuality,
}

/// Acknowledgement for a resource the compositor no longer uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReturnedResource {
    pub id: ResourceId,
    /// Last GPU use of the resource by the compositor.
    pub sync_token: SyncToken,
    pub count: u32,
    /// Content is unreliable and must not be reused.
    pub lost: bool,
}

impl ReturnedResource {
    pub fn new(id: ResourceId, sync_token: SyncToken, lost: bool) -> Self {
        Self {
            id,
            sync_token,
            count: 1,
            lost,
        }
    }
}

/// Identifies the surface a frame is embedded in. Both sequences only grow.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct LocalSurfaceId {
    pub parent_sequence: u32,
    pub child_sequence: u32,
}

impl Default for LocalSurfaceId {
    fn default() -> Self {
        Self {
            parent_sequence: 1,
            child_sequence: 1,
        }
    }
}

impl LocalSurfaceId {
    /// Next id after a resize.
    pub fn next_child(self) -> Self {
        Self {
            parent_sequence: self.parent_sequence,
            child_sequence: self.child_sequence.saturating_add(1),
        }
    }
}

/// Pull-based vsync signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BeginFrameArgs {
    pub source_id: u64,
    pub sequence_number: u64,
    pub frame_time: Duration,
    pub deadline: Duration,
    pub interval: Duration,
    /// Delivered late to catch up with a frame that was missed.
    pub missed: bool,
}

impl BeginFrameArgs {
    /// A regular (not missed) begin frame for `sequence_number` at a 60Hz cadence.
    pub fn normal(source_id: u64, sequence_number: u64, frame_time: Duration) -> Self {
        let interval = Duration::from_micros(16_667);
        Self {
            source_id,
            sequence_number,
            frame_time,
            deadline: frame_time + interval,
            interval,
            missed: false,
        }
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct BeginFrameAck {
    pub source_id: u64,
    pub sequence_number: u64,
    pub has_damage: bool,
}

impl BeginFrameAck {
    pub fn new(args: &BeginFrameArgs, has_damage: bool) -> Self {
        Self {
            source_id: args.source_id,
            sequence_number: args.sequence_number,
            has_damage,
        }
    }
}

/// Full-surface textured quad.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextureQuad {
    pub resource_id: ResourceId,
    pub rect: IntRect,
    pub y_flipped: bool,
    pub is_opaque: bool,
    pub premultiplied_alpha: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct CompositorFrame {
    pub local_surface_id: LocalSurfaceId,
    pub size: Size,
    pub damage_rect: IntRect,
    /// Presentation timestamp supplied by the producer.
    pub timestamp: Duration,
    pub begin_frame_ack: BeginFrameAck,
    pub quads: SmallVec<[TextureQuad; 1]>,
    pub resources: SmallVec<[TransferableResource; 1]>,
}
