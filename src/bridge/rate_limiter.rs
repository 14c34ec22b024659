use crate::gpu::{GpuContext, SyncToken};
use std::collections::VecDeque;
use std::sync::Arc;

/// Frames of GPU work a displayed canvas may queue ahead of the GPU.
pub const MAX_CANVAS_ANIMATION_BACKLOG: usize = 2;

/// Keeps a canvas animation from running ahead of the GPU.
///
/// Each tick marks the end of a frame's work; once more than `max_pending` frames are
/// outstanding the oldest one is waited for.
#[derive(Debug)]
pub struct RateLimiter {
    gpu: Option<Arc<dyn GpuContext>>,
    max_pending: usize,
    pending: VecDeque<SyncToken>,
    waits: u64,
}

impl RateLimiter {
    pub fn new(gpu: Option<Arc<dyn GpuContext>>, max_pending: usize) -> Self {
        Self {
            gpu,
            max_pending: max_pending.max(1),
            pending: VecDeque::new(),
            waits: 0,
        }
    }

    pub fn tick(&mut self) {
        let Some(gpu) = &self.gpu else {
            return;
        };
        self.pending.push_back(gpu.gen_sync_token());
        while self.pending.len() > self.max_pending {
            if let Some(oldest) = self.pending.pop_front() {
                gpu.wait_sync_token(oldest);
                self.waits += 1;
            }
        }
    }

    /// Forget outstanding frames, e.g. once the compositor took a frame.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn waits(&self) -> u64 {
        self.waits
    }
}
