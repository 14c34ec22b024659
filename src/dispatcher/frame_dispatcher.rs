use crate::compositor::{
    BeginFrameAck, BeginFrameArgs, CompositorFrame, CompositorFrameSink, LocalSurfaceId,
    ReturnedResource, TextureQuad,
};
use crate::foundation::core::{FilterQuality, IntRect, ResourceId, Size};
use crate::foundation::error::HandoffResult;
use crate::gpu::SyncToken;
use crate::placeholder::{PlaceholderHandle, PlaceholderMessage};
use crate::resource::{ReleaseCallback, ResourceRef};
use crate::task::{Inbox, Port};
use smallvec::smallvec;
use std::collections::HashMap;
use std::time::Duration;

/// Unacknowledged compositor frames allowed at once.
pub const MAX_PENDING_COMPOSITOR_FRAMES: usize = 2;

/// Frames posted to the placeholder and not yet handed back.
pub const MAX_UNRECLAIMED_PLACEHOLDER_FRAMES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DispatcherOpts {
    pub max_pending_compositor_frames: usize,
    pub max_unreclaimed_placeholder_frames: usize,
    pub filter_quality: FilterQuality,
}

impl Default for DispatcherOpts {
    fn default() -> Self {
        Self {
            max_pending_compositor_frames: MAX_PENDING_COMPOSITOR_FRAMES,
            max_unreclaimed_placeholder_frames: MAX_UNRECLAIMED_PLACEHOLDER_FRAMES,
            filter_quality: FilterQuality::default(),
        }
    }
}

/// Messages other threads send to a dispatcher.
#[derive(Debug)]
pub enum DispatcherMessage {
    /// The placeholder is done with a frame.
    ReclaimResource {
        id: ResourceId,
        resource: Option<ResourceRef>,
    },
    SetSuspendAnimation(bool),
    SetFilterQuality(FilterQuality),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct DispatcherStats {
    pub frames_dispatched: u64,
    pub frames_refused: u64,
    pub posted_to_placeholder: u64,
    /// Unposted frames superseded by a newer one before the placeholder could take them.
    pub dropped_unposted: u64,
    pub released: u64,
    pub did_not_produce: u64,
}

/// A resource the compositor (and maybe the placeholder) still holds.
///
/// Dropping it runs the release callback with the last known sync token and lost flag.
struct FrameResource {
    release: Option<ReleaseCallback>,
    sync_token: SyncToken,
    is_lost: bool,
    /// Survives the first reclaim, so two reclaims are needed before release.
    spare_lock: bool,
}

impl FrameResource {
    fn new(release: ReleaseCallback) -> Self {
        Self {
            release: Some(release),
            sync_token: SyncToken::EMPTY,
            is_lost: false,
            spare_lock: true,
        }
    }
}

impl Drop for FrameResource {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release.run(self.sync_token, self.is_lost);
        }
    }
}

/// Submits a canvas's frames to the compositor and tracks the resources in flight.
///
/// Lives on the producing thread. Other threads reach it through [`DispatcherMessage`]s that
/// are handled by [`ResourceDispatcher::process_messages`].
pub struct ResourceDispatcher {
    // Frame resources drop first, releasing into a provider that may still be listening.
    resources: HashMap<ResourceId, FrameResource>,
    latest_unposted: Option<(ResourceId, ResourceRef)>,
    sink: Box<dyn CompositorFrameSink>,
    placeholder: Option<PlaceholderHandle>,
    inbox: Inbox<DispatcherMessage>,

    opts: DispatcherOpts,
    size: Size,
    next_resource_id: u32,
    pending_compositor_frames: usize,
    posted_to_placeholder: usize,
    local_surface_id: LocalSurfaceId,
    change_size_for_next_commit: bool,
    needs_begin_frame: bool,
    suspend_animation: bool,
    current_begin_frame_ack: BeginFrameAck,
    filter_quality: FilterQuality,
    stats: DispatcherStats,
}

impl std::fmt::Debug for ResourceDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDispatcher")
            .field("size", &self.size)
            .field("exported", &self.resources.len())
            .field("pending_compositor_frames", &self.pending_compositor_frames)
            .field("posted_to_placeholder", &self.posted_to_placeholder)
            .finish()
    }
}

impl ResourceDispatcher {
    /// Create a dispatcher on the producing thread. With a placeholder, the dispatcher announces
    /// itself to it right away.
    pub fn new(
        size: Size,
        sink: Box<dyn CompositorFrameSink>,
        opts: DispatcherOpts,
        placeholder: Option<PlaceholderHandle>,
    ) -> HandoffResult<Self> {
        let size = size.validate()?;
        let inbox = Inbox::new();
        if let Some(handle) = &placeholder
            && !handle.post(PlaceholderMessage::AttachDispatcher {
                placeholder: handle.id(),
                dispatcher: inbox.port(),
            })
        {
            tracing::debug!(placeholder = ?handle.id(), "placeholder registry already gone");
        }
        Ok(Self {
            resources: HashMap::new(),
            latest_unposted: None,
            sink,
            placeholder,
            inbox,
            opts,
            size,
            next_resource_id: 0,
            pending_compositor_frames: 0,
            posted_to_placeholder: 0,
            local_surface_id: LocalSurfaceId::default(),
            change_size_for_next_commit: false,
            needs_begin_frame: false,
            suspend_animation: false,
            current_begin_frame_ack: BeginFrameAck::default(),
            filter_quality: opts.filter_quality,
            stats: DispatcherStats::default(),
        })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Sender other threads use to reach this dispatcher.
    pub fn port(&self) -> Port<DispatcherMessage> {
        self.inbox.port()
    }

    pub fn has_too_many_pending_frames(&self) -> bool {
        self.pending_compositor_frames >= self.opts.max_pending_compositor_frames
    }

    pub fn pending_compositor_frames(&self) -> usize {
        self.pending_compositor_frames
    }

    pub fn posted_to_placeholder(&self) -> usize {
        self.posted_to_placeholder
    }

    pub fn latest_unposted_resource_id(&self) -> Option<ResourceId> {
        self.latest_unposted.as_ref().map(|(id, _)| *id)
    }

    /// Ids of resources not yet released.
    pub fn exported_resource_ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self.resources.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Whether `id` still waits for its first reclaim. `None` once released.
    pub fn has_spare_lock(&self, id: ResourceId) -> Option<bool> {
        self.resources.get(&id).map(|r| r.spare_lock)
    }

    pub fn local_surface_id(&self) -> LocalSurfaceId {
        self.local_surface_id
    }

    pub fn filter_quality(&self) -> FilterQuality {
        self.filter_quality
    }

    pub fn is_animation_suspended(&self) -> bool {
        self.suspend_animation
    }

    pub fn needs_begin_frame(&self) -> bool {
        self.needs_begin_frame && !self.suspend_animation
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats.clone()
    }

    /// Submit `resource` as the next frame.
    ///
    /// Refused (returning `false`) when the pending-frame window is full, the resource does not
    /// match the canvas size, or it cannot be prepared for the compositor.
    #[tracing::instrument(
        level = "debug",
        skip(self, resource),
        fields(serial = resource.serial())
    )]
    pub fn dispatch_frame(
        &mut self,
        resource: ResourceRef,
        timestamp: Duration,
        damage_rect: IntRect,
        needs_vertical_flip: bool,
        is_opaque: bool,
    ) -> bool {
        if self.has_too_many_pending_frames() {
            tracing::warn!(
                pending = self.pending_compositor_frames,
                "frame dispatched with a full compositor window; refusing"
            );
            self.stats.frames_refused += 1;
            return false;
        }
        let Some(frame) = self.prepare_frame(
            resource,
            timestamp,
            damage_rect,
            needs_vertical_flip,
            is_opaque,
        ) else {
            return false;
        };
        self.pending_compositor_frames += 1;
        self.sink.submit_compositor_frame(frame);
        true
    }

    /// Like [`ResourceDispatcher::dispatch_frame`], but waits for the compositor and reclaims
    /// what it returned before returning.
    #[tracing::instrument(
        level = "debug",
        skip(self, resource),
        fields(serial = resource.serial())
    )]
    pub fn dispatch_frame_sync(
        &mut self,
        resource: ResourceRef,
        timestamp: Duration,
        damage_rect: IntRect,
        needs_vertical_flip: bool,
        is_opaque: bool,
    ) -> bool {
        let Some(frame) = self.prepare_frame(
            resource,
            timestamp,
            damage_rect,
            needs_vertical_flip,
            is_opaque,
        ) else {
            return false;
        };
        self.pending_compositor_frames += 1;
        let returned = self.sink.submit_compositor_frame_sync(frame);
        self.did_receive_compositor_frame_ack(&returned);
        true
    }

    fn prepare_frame(
        &mut self,
        resource: ResourceRef,
        timestamp: Duration,
        damage_rect: IntRect,
        needs_vertical_flip: bool,
        is_opaque: bool,
    ) -> Option<CompositorFrame> {
        if resource.size() != self.size {
            tracing::debug!(
                resource = ?resource.size(),
                canvas = ?self.size,
                "frame size does not match the canvas"
            );
            self.stats.frames_refused += 1;
            return None;
        }
        let Some((mut transferable, release)) = resource.prepare_transferable_resource() else {
            tracing::debug!("resource cannot be presented");
            self.stats.frames_refused += 1;
            return None;
        };

        self.next_resource_id = self.next_resource_id.wrapping_add(1).max(1);
        let id = ResourceId(self.next_resource_id);
        transferable.id = id;
        transferable.filter_quality = self.filter_quality;
        self.resources.insert(id, FrameResource::new(release));

        let y_flipped = needs_vertical_flip && resource.supports_gpu_compositing();
        resource.transfer();
        self.post_image_to_placeholder_if_not_blocked(resource, id);

        let full = IntRect::from_size(self.size);
        let damage_rect = if self.change_size_for_next_commit {
            self.local_surface_id = self.local_surface_id.next_child();
            self.change_size_for_next_commit = false;
            full
        } else {
            damage_rect.intersect(full)
        };

        let mut begin_frame_ack = self.current_begin_frame_ack;
        begin_frame_ack.has_damage = true;
        self.stats.frames_dispatched += 1;
        Some(CompositorFrame {
            local_surface_id: self.local_surface_id,
            size: self.size,
            damage_rect,
            timestamp,
            begin_frame_ack,
            quads: smallvec![TextureQuad {
                resource_id: id,
                rect: full,
                y_flipped,
                is_opaque,
                premultiplied_alpha: true,
            }],
            resources: smallvec![transferable],
        })
    }

    fn post_image_to_placeholder_if_not_blocked(&mut self, resource: ResourceRef, id: ResourceId) {
        if self.placeholder.is_none() {
            drop(resource);
            self.reclaim_resource_internal(id);
            return;
        }
        if self.posted_to_placeholder < self.opts.max_unreclaimed_placeholder_frames {
            self.post_image_to_placeholder(resource, id);
            return;
        }
        if let Some((old_id, old)) = self.latest_unposted.take() {
            drop(old);
            self.reclaim_resource_internal(old_id);
            self.stats.dropped_unposted += 1;
        }
        self.latest_unposted = Some((id, resource));
    }

    fn post_image_to_placeholder(&mut self, resource: ResourceRef, id: ResourceId) {
        let Some(handle) = &self.placeholder else {
            drop(resource);
            self.reclaim_resource_internal(id);
            return;
        };
        let posted = handle.post(PlaceholderMessage::SetResource {
            placeholder: handle.id(),
            resource_id: id,
            resource,
            dispatcher: self.inbox.port(),
        });
        if posted {
            self.posted_to_placeholder += 1;
            self.stats.posted_to_placeholder += 1;
        } else {
            tracing::debug!("placeholder registry gone; frames are no longer posted");
            self.placeholder = None;
            self.reclaim_resource_internal(id);
        }
    }

    /// First reclaim lifts the spare lock; the second releases the resource.
    fn reclaim_resource_internal(&mut self, id: ResourceId) {
        let Some(entry) = self.resources.get_mut(&id) else {
            return;
        };
        if entry.spare_lock {
            entry.spare_lock = false;
            return;
        }
        if let Some(frame_resource) = self.resources.remove(&id) {
            self.stats.released += 1;
            drop(frame_resource);
        }
    }

    /// The placeholder is done with frame `id`. Posts the latest unposted frame, if any.
    pub fn reclaim_resource(&mut self, id: ResourceId, resource: Option<ResourceRef>) {
        // The placeholder's reference goes first so the release can recycle.
        drop(resource);
        self.reclaim_resource_internal(id);
        self.posted_to_placeholder = self.posted_to_placeholder.saturating_sub(1);
        if let Some((latest_id, latest)) = self.latest_unposted.take() {
            self.post_image_to_placeholder(latest, latest_id);
        }
    }

    /// Resources the compositor returned, in any order.
    pub fn reclaim_resources(&mut self, returned: &[ReturnedResource]) {
        for r in returned {
            let Some(entry) = self.resources.get_mut(&r.id) else {
                tracing::trace!(id = r.id.0, "unknown resource returned");
                continue;
            };
            entry.sync_token = r.sync_token;
            entry.is_lost = r.lost;
            self.reclaim_resource_internal(r.id);
        }
    }

    pub fn did_receive_compositor_frame_ack(&mut self, returned: &[ReturnedResource]) {
        self.reclaim_resources(returned);
        self.pending_compositor_frames = self.pending_compositor_frames.saturating_sub(1);
    }

    pub fn set_needs_begin_frame(&mut self, needs_begin_frame: bool) {
        if self.needs_begin_frame == needs_begin_frame {
            return;
        }
        self.needs_begin_frame = needs_begin_frame;
        if !self.suspend_animation {
            self.sink.set_needs_begin_frame(self.needs_begin_frame());
        }
    }

    pub fn set_suspend_animation(&mut self, suspend_animation: bool) {
        if self.suspend_animation == suspend_animation {
            return;
        }
        self.suspend_animation = suspend_animation;
        if self.needs_begin_frame {
            self.sink.set_needs_begin_frame(self.needs_begin_frame());
        }
    }

    /// Handle a begin frame. `produce` may dispatch a frame and reports whether it did.
    ///
    /// With too many pending frames, or a missed frame already past its deadline, the
    /// compositor is told no frame is coming and `produce` is not called.
    pub fn on_begin_frame(
        &mut self,
        args: BeginFrameArgs,
        now: Duration,
        produce: impl FnOnce(&mut Self) -> bool,
    ) -> bool {
        self.current_begin_frame_ack = BeginFrameAck::new(&args, false);
        if self.has_too_many_pending_frames() || (args.missed && now > args.deadline) {
            self.did_not_produce_frame();
            return false;
        }
        let submitted = produce(self);
        if !submitted {
            self.did_not_produce_frame();
        }
        submitted
    }

    pub fn did_not_produce_frame(&mut self) {
        tracing::trace!(
            sequence = self.current_begin_frame_ack.sequence_number,
            "did not produce frame"
        );
        self.stats.did_not_produce += 1;
        self.sink.did_not_produce_frame(self.current_begin_frame_ack);
    }

    /// Resize. The next frame gets a new local surface id and full damage.
    pub fn reshape(&mut self, size: Size) -> HandoffResult<()> {
        let size = size.validate()?;
        if self.size != size {
            self.size = size;
            self.change_size_for_next_commit = true;
        }
        Ok(())
    }

    pub fn set_filter_quality(&mut self, quality: FilterQuality) {
        self.filter_quality = quality;
    }

    /// Handle messages posted from other threads. Returns how many were handled.
    pub fn process_messages(&mut self) -> usize {
        let mut messages = Vec::new();
        self.inbox.drain(|m| messages.push(m));
        let n = messages.len();
        for m in messages {
            match m {
                DispatcherMessage::ReclaimResource { id, resource } => {
                    self.reclaim_resource(id, resource)
                }
                DispatcherMessage::SetSuspendAnimation(suspend) => {
                    self.set_suspend_animation(suspend)
                }
                DispatcherMessage::SetFilterQuality(q) => self.set_filter_quality(q),
            }
        }
        n
    }
}

#[cfg(test)]
#[path = "../../tests/unit/dispatcher/frame_dispatcher.rs"]
mod tests;
