use crate::compositor::frame::{BeginFrameAck, CompositorFrame, ReturnedResource};
use crate::foundation::core::ResourceId;
use crate::gpu::SyncToken;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Sink contract of the external compositor.
///
/// Resources listed in a submitted frame stay with the compositor until they come back as
/// [`ReturnedResource`]s, in any order.
pub trait CompositorFrameSink: Send {
    /// Submit without waiting. Returns arrive later through the frame ack.
    fn submit_compositor_frame(&mut self, frame: CompositorFrame);

    /// Submit and wait for the compositor to take the frame. Returns the resources it released
    /// meanwhile.
    fn submit_compositor_frame_sync(&mut self, frame: CompositorFrame) -> Vec<ReturnedResource>;

    /// Answer a begin frame without a new frame.
    fn did_not_produce_frame(&mut self, ack: BeginFrameAck);

    fn set_needs_begin_frame(&mut self, needs_begin_frame: bool);
}

/// Everything a [`RecordingFrameSink`] saw, in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    Submitted { frame_index: usize, sync: bool },
    DidNotProduceFrame(BeginFrameAck),
    SetNeedsBeginFrame(bool),
}

#[derive(Debug, Default)]
struct Log {
    events: Vec<SinkEvent>,
    frames: Vec<CompositorFrame>,
    /// Resources held by the compositor, oldest first.
    held: Vec<(ResourceId, SyncToken)>,
    next_sync_token: u64,
    return_as_lost: bool,
}

impl Log {
    fn record(&mut self, frame: CompositorFrame, sync: bool) {
        for r in &frame.resources {
            self.held.push((r.id, r.sync_token));
        }
        self.events.push(SinkEvent::Submitted {
            frame_index: self.frames.len(),
            sync,
        });
        self.frames.push(frame);
    }

    fn release(&mut self, keep_latest: usize) -> Vec<ReturnedResource> {
        let n = self.held.len().saturating_sub(keep_latest);
        let lost = self.return_as_lost;
        let released: Vec<(ResourceId, SyncToken)> = self.held.drain(..n).collect();
        released
            .into_iter()
            .map(|(id, _)| {
                self.next_sync_token += 1;
                // Compositor-side token, distinct from the producer's.
                ReturnedResource::new(id, SyncToken((1 << 32) | self.next_sync_token), lost)
            })
            .collect()
    }
}

/// In-memory compositor for tests, the CLI and debugging.
///
/// Clones share one log, so a test can keep a handle while the dispatcher owns another.
#[derive(Clone, Debug, Default)]
pub struct RecordingFrameSink {
    log: Arc<Mutex<Log>>,
}

impl RecordingFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.log().events.clone()
    }

    pub fn frames(&self) -> Vec<CompositorFrame> {
        self.log().frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.log().frames.len()
    }

    pub fn did_not_produce_count(&self) -> usize {
        self.log()
            .events
            .iter()
            .filter(|e| matches!(e, SinkEvent::DidNotProduceFrame(_)))
            .count()
    }

    /// Last value passed to `set_needs_begin_frame`.
    pub fn needs_begin_frame(&self) -> Option<bool> {
        self.log().events.iter().rev().find_map(|e| match e {
            SinkEvent::SetNeedsBeginFrame(v) => Some(*v),
            _ => None,
        })
    }

    /// Ids currently held by the compositor.
    pub fn held_resources(&self) -> Vec<ResourceId> {
        self.log().held.iter().map(|(id, _)| *id).collect()
    }

    /// Mark every later return as lost.
    pub fn set_return_as_lost(&self, lost: bool) {
        self.log().return_as_lost = lost;
    }

    /// Release every held resource, as a compositor does once it displayed newer content.
    pub fn take_returns(&self) -> Vec<ReturnedResource> {
        self.log().release(0)
    }
}

impl CompositorFrameSink for RecordingFrameSink {
    fn submit_compositor_frame(&mut self, frame: CompositorFrame) {
        self.log().record(frame, false);
    }

    fn submit_compositor_frame_sync(&mut self, frame: CompositorFrame) -> Vec<ReturnedResource> {
        let keep = frame.resources.len();
        let mut log = self.log();
        log.record(frame, true);
        // The frame just drawn stays on screen; older ones are done.
        log.release(keep)
    }

    fn did_not_produce_frame(&mut self, ack: BeginFrameAck) {
        self.log().events.push(SinkEvent::DidNotProduceFrame(ack));
    }

    fn set_needs_begin_frame(&mut self, needs_begin_frame: bool) {
        self.log()
            .events
            .push(SinkEvent::SetNeedsBeginFrame(needs_begin_frame));
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/sink.rs"]
mod tests;
