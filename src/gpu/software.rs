use crate::foundation::core::IntRect;
use crate::foundation::error::{HandoffError, HandoffResult};
use crate::gpu::context::{GpuContext, Mailbox, SharedImageDesc, SyncToken};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Counters exposed by [`SoftwareGpu`].
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SoftwareGpuStats {
    pub live_shared_images: usize,
    pub created_shared_images: u64,
    pub destroyed_shared_images: u64,
    pub failed_allocations: u64,
    pub generated_sync_tokens: u64,
}

#[derive(Debug)]
struct SharedImage {
    desc: SharedImageDesc,
    pixels: Vec<u8>,
}

#[derive(Debug)]
struct State {
    images: HashMap<Mailbox, SharedImage>,
    next_mailbox: u64,
    next_sync_token: u64,
    lost: bool,
    gpu_compositing: bool,
    fail_allocations: u32,
    waited: Vec<SyncToken>,
    stats: SoftwareGpuStats,
}

/// In-process [`GpuContext`] backed by plain byte buffers.
///
/// Besides serving the CLI it is the main test double: context loss and allocation failures can
/// be injected at any time and every shared image is accounted for.
#[derive(Debug)]
pub struct SoftwareGpu {
    state: Mutex<State>,
}

impl Default for SoftwareGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareGpu {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                images: HashMap::new(),
                next_mailbox: 1,
                next_sync_token: 1,
                lost: false,
                gpu_compositing: true,
                fail_allocations: 0,
                waited: Vec::new(),
                stats: SoftwareGpuStats::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate a device reset.
    pub fn lose_context(&self) {
        let mut st = self.state();
        if !st.lost {
            tracing::debug!("software gpu context lost");
        }
        st.lost = true;
    }

    /// Make the next `n` shared-image allocations fail.
    pub fn fail_next_allocations(&self, n: u32) {
        self.state().fail_allocations = n;
    }

    pub fn set_gpu_compositing(&self, enabled: bool) {
        self.state().gpu_compositing = enabled;
    }

    pub fn num_shared_images(&self) -> usize {
        self.state().images.len()
    }

    /// Sync tokens waited on so far, in call order.
    pub fn waited_sync_tokens(&self) -> Vec<SyncToken> {
        self.state().waited.clone()
    }

    pub fn stats(&self) -> SoftwareGpuStats {
        let st = self.state();
        let mut out = st.stats.clone();
        out.live_shared_images = st.images.len();
        out
    }
}

fn lost_error(what: &str) -> HandoffError {
    HandoffError::context_lost(format!("{what} on a lost context"))
}

impl GpuContext for SoftwareGpu {
    fn is_context_lost(&self) -> bool {
        self.state().lost
    }

    fn supports_gpu_compositing(&self) -> bool {
        let st = self.state();
        st.gpu_compositing && !st.lost
    }

    fn create_shared_image(&self, desc: SharedImageDesc) -> HandoffResult<Mailbox> {
        let mut st = self.state();
        if st.lost {
            return Err(lost_error("create_shared_image"));
        }
        if st.fail_allocations > 0 {
            st.fail_allocations -= 1;
            st.stats.failed_allocations = st.stats.failed_allocations.saturating_add(1);
            return Err(HandoffError::allocation(format!(
                "shared image allocation of {}x{} failed",
                desc.size.width, desc.size.height
            )));
        }
        let desc_size = desc.size.validate()?;
        let mailbox = Mailbox(st.next_mailbox);
        st.next_mailbox += 1;
        st.images.insert(
            mailbox,
            SharedImage {
                desc,
                pixels: vec![0; desc_size.byte_len(desc.format)],
            },
        );
        st.stats.created_shared_images = st.stats.created_shared_images.saturating_add(1);
        Ok(mailbox)
    }

    fn destroy_shared_image(&self, mailbox: Mailbox, sync_token: SyncToken) {
        let mut st = self.state();
        if sync_token.has_data() {
            st.waited.push(sync_token);
        }
        if st.images.remove(&mailbox).is_some() {
            st.stats.destroyed_shared_images = st.stats.destroyed_shared_images.saturating_add(1);
        }
    }

    fn write_pixels(&self, mailbox: Mailbox, rect: IntRect, pixels: &[u8]) -> HandoffResult<()> {
        let mut st = self.state();
        if st.lost {
            return Err(lost_error("write_pixels"));
        }
        let image = st
            .images
            .get_mut(&mailbox)
            .ok_or_else(|| HandoffError::contract(format!("unknown mailbox {}", mailbox.0)))?;
        let bpp = image.desc.format.bytes_per_pixel();
        let size = image.desc.size;
        let clipped = rect.intersect(IntRect::from_size(size));
        if rect.is_empty() || clipped != rect {
            return Err(HandoffError::validation(format!(
                "write rect {rect:?} is not inside the {}x{} image",
                size.width, size.height
            )));
        }
        let row_len = rect.width as usize * bpp;
        if pixels.len() != row_len * rect.height as usize {
            return Err(HandoffError::validation(format!(
                "write of {} bytes does not match a {}x{} rect",
                pixels.len(),
                rect.width,
                rect.height
            )));
        }
        let stride = size.width as usize * bpp;
        for (row, src) in pixels.chunks_exact(row_len).enumerate() {
            let start = (rect.y as usize + row) * stride + rect.x as usize * bpp;
            image.pixels[start..start + row_len].copy_from_slice(src);
        }
        Ok(())
    }

    fn read_pixels(&self, mailbox: Mailbox) -> HandoffResult<Vec<u8>> {
        let st = self.state();
        if st.lost {
            return Err(lost_error("read_pixels"));
        }
        st.images
            .get(&mailbox)
            .map(|image| image.pixels.clone())
            .ok_or_else(|| HandoffError::contract(format!("unknown mailbox {}", mailbox.0)))
    }

    fn copy_shared_image(&self, src: Mailbox, dst: Mailbox) -> HandoffResult<()> {
        let mut st = self.state();
        if st.lost {
            return Err(lost_error("copy_shared_image"));
        }
        let pixels = st
            .images
            .get(&src)
            .map(|image| image.pixels.clone())
            .ok_or_else(|| HandoffError::contract(format!("unknown mailbox {}", src.0)))?;
        let target = st
            .images
            .get_mut(&dst)
            .ok_or_else(|| HandoffError::contract(format!("unknown mailbox {}", dst.0)))?;
        if target.pixels.len() != pixels.len() {
            return Err(HandoffError::validation("copy between differently sized images"));
        }
        target.pixels = pixels;
        Ok(())
    }

    fn gen_sync_token(&self) -> SyncToken {
        let mut st = self.state();
        if st.lost {
            return SyncToken::EMPTY;
        }
        let token = SyncToken(st.next_sync_token);
        st.next_sync_token += 1;
        st.stats.generated_sync_tokens = st.stats.generated_sync_tokens.saturating_add(1);
        token
    }

    fn wait_sync_token(&self, sync_token: SyncToken) {
        if sync_token.has_data() {
            self.state().waited.push(sync_token);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/gpu/software.rs"]
mod tests;
