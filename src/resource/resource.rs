use crate::compositor::TransferableResource;
use crate::foundation::core::{FilterQuality, IntRect, PixelFormat, ResourceId, Size};
use crate::foundation::error::{HandoffError, HandoffResult};
use crate::gpu::{GpuContext, Mailbox, SharedImageDesc, SyncToken};
use crate::resource::release::{ProviderLink, ReleaseCallback};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::thread::ThreadId;

/// Storage flavor of a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// CPU pixels shared with the compositor as a bitmap.
    SharedBitmap,
    /// GPU shared image.
    SharedImage,
    /// GPU front/back pair; presenting copies back to front.
    SwapChain,
    /// GPU image imported from outside; never destroyed or written here.
    External,
}

/// Receives the final reference of a resource in place of its destruction. One-shot.
pub type LastUnrefCallback = Box<dyn FnOnce(ResourceRef) + Send>;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

enum Backing {
    Bitmap(RwLock<Vec<u8>>),
    SharedImage {
        mailbox: Mailbox,
        gpu: Arc<dyn GpuContext>,
    },
    SwapChain {
        front: Mailbox,
        back: Mailbox,
        gpu: Arc<dyn GpuContext>,
    },
    External {
        mailbox: Mailbox,
        gpu: Arc<dyn GpuContext>,
    },
}

impl Backing {
    fn gpu(&self) -> Option<&Arc<dyn GpuContext>> {
        match self {
            Backing::Bitmap(_) => None,
            Backing::SharedImage { gpu, .. }
            | Backing::SwapChain { gpu, .. }
            | Backing::External { gpu, .. } => Some(gpu),
        }
    }
}

/// A single drawable buffer. Always handled through [`ResourceRef`].
pub struct CanvasResource {
    serial: u64,
    kind: ResourceKind,
    size: Size,
    format: PixelFormat,
    filter_quality: AtomicU8,
    backing: Backing,
    owning_thread: ThreadId,
    provider: Weak<ProviderLink>,
    lost: AtomicBool,
    transferred: AtomicBool,
    sync_token: AtomicU64,
    last_unref: Mutex<Option<LastUnrefCallback>>,
    /// Live [`ResourceRef`] handles. Decremented atomically so exactly one drop sees the last.
    handles: AtomicUsize,
}

impl std::fmt::Debug for CanvasResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasResource")
            .field("serial", &self.serial)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("lost", &self.is_lost())
            .field("transferred", &self.is_transferred())
            .finish()
    }
}

impl CanvasResource {
    fn new(
        kind: ResourceKind,
        size: Size,
        format: PixelFormat,
        backing: Backing,
        provider: Weak<ProviderLink>,
    ) -> ResourceRef {
        if let Some(link) = provider.upgrade() {
            link.on_resource_created();
        }
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(serial, ?kind, "resource created");
        ResourceRef {
            inner: Arc::new(CanvasResource {
                serial,
                kind,
                size,
                format,
                filter_quality: AtomicU8::new(FilterQuality::default().to_u8()),
                backing,
                owning_thread: std::thread::current().id(),
                provider,
                lost: AtomicBool::new(false),
                transferred: AtomicBool::new(false),
                sync_token: AtomicU64::new(0),
                last_unref: Mutex::new(None),
                handles: AtomicUsize::new(1),
            }),
        }
    }

    pub(crate) fn create_bitmap(
        size: Size,
        format: PixelFormat,
        provider: Weak<ProviderLink>,
    ) -> HandoffResult<ResourceRef> {
        let size = size.validate()?;
        let pixels = vec![0; size.byte_len(format)];
        Ok(Self::new(
            ResourceKind::SharedBitmap,
            size,
            format,
            Backing::Bitmap(RwLock::new(pixels)),
            provider,
        ))
    }

    pub(crate) fn create_shared_image(
        size: Size,
        format: PixelFormat,
        gpu: Arc<dyn GpuContext>,
        provider: Weak<ProviderLink>,
    ) -> HandoffResult<ResourceRef> {
        let mailbox = gpu.create_shared_image(SharedImageDesc { size, format })?;
        Ok(Self::new(
            ResourceKind::SharedImage,
            size,
            format,
            Backing::SharedImage { mailbox, gpu },
            provider,
        ))
    }

    pub(crate) fn create_swap_chain(
        size: Size,
        format: PixelFormat,
        gpu: Arc<dyn GpuContext>,
        provider: Weak<ProviderLink>,
    ) -> HandoffResult<ResourceRef> {
        let desc = SharedImageDesc { size, format };
        let front = gpu.create_shared_image(desc)?;
        let back = match gpu.create_shared_image(desc) {
            Ok(back) => back,
            Err(e) => {
                gpu.destroy_shared_image(front, SyncToken::EMPTY);
                return Err(e);
            }
        };
        Ok(Self::new(
            ResourceKind::SwapChain,
            size,
            format,
            Backing::SwapChain { front, back, gpu },
            provider,
        ))
    }

    /// Wrap an image owned by someone else. The mailbox is not destroyed with the resource.
    pub fn import_external(
        mailbox: Mailbox,
        size: Size,
        gpu: Arc<dyn GpuContext>,
    ) -> HandoffResult<ResourceRef> {
        let size = size.validate()?;
        if mailbox.is_zero() {
            return Err(HandoffError::validation("cannot import the zero mailbox"));
        }
        Ok(Self::new(
            ResourceKind::External,
            size,
            PixelFormat::Rgba8Premul,
            Backing::External { mailbox, gpu },
            Weak::new(),
        ))
    }

    /// Process-unique serial, stable for the lifetime of the resource.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn is_accelerated(&self) -> bool {
        self.kind != ResourceKind::SharedBitmap
    }

    /// GPU-backed and composited on the GPU. Only these frames honor a vertical flip.
    pub fn supports_gpu_compositing(&self) -> bool {
        self.is_accelerated()
            && self
                .backing
                .gpu()
                .is_some_and(|gpu| gpu.supports_gpu_compositing())
    }

    /// Swap chains and imported images are never put back into a pool.
    pub fn is_recycleable(&self) -> bool {
        matches!(
            self.kind,
            ResourceKind::SharedBitmap | ResourceKind::SharedImage
        )
    }

    /// Handle shown to the compositor. Shared bitmaps use their serial as the bitmap id.
    pub fn mailbox(&self) -> Mailbox {
        match &self.backing {
            Backing::Bitmap(_) => Mailbox(self.serial),
            Backing::SharedImage { mailbox, .. } | Backing::External { mailbox, .. } => *mailbox,
            Backing::SwapChain { front, .. } => *front,
        }
    }

    pub fn owning_thread(&self) -> ThreadId {
        self.owning_thread
    }

    pub fn is_cross_thread(&self) -> bool {
        std::thread::current().id() != self.owning_thread
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Usable for drawing and presentation: not lost, and its GPU context is alive.
    pub fn is_valid(&self) -> bool {
        !self.is_lost() && self.backing.gpu().is_none_or(|gpu| !gpu.is_context_lost())
    }

    pub fn notify_resource_lost(&self) {
        if !self.lost.swap(true, Ordering::AcqRel) {
            tracing::debug!(serial = self.serial, "resource marked lost");
        }
    }

    pub fn is_transferred(&self) -> bool {
        self.transferred.load(Ordering::Acquire)
    }

    /// Freeze the resource for use on other threads.
    pub fn transfer(&self) {
        self.transferred.store(true, Ordering::Release);
    }

    pub(crate) fn reset_for_reuse(&self) {
        self.transferred.store(false, Ordering::Release);
    }

    pub fn filter_quality(&self) -> FilterQuality {
        FilterQuality::from_u8(self.filter_quality.load(Ordering::Relaxed))
    }

    pub fn set_filter_quality(&self, quality: FilterQuality) {
        self.filter_quality.store(quality.to_u8(), Ordering::Relaxed);
    }

    /// Sync token generated when the resource was last prepared for the compositor.
    pub fn sync_token(&self) -> SyncToken {
        SyncToken(self.sync_token.load(Ordering::Acquire))
    }

    pub fn wait_sync_token(&self, sync_token: SyncToken) {
        if !sync_token.has_data() {
            return;
        }
        if let Some(gpu) = self.backing.gpu() {
            gpu.wait_sync_token(sync_token);
        }
    }

    pub fn has_last_unref_callback(&self) -> bool {
        self.last_unref
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Replace any previously attached callback.
    pub fn set_last_unref_callback(&self, callback: LastUnrefCallback) {
        *self.last_unref.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub fn clear_last_unref_callback(&self) -> bool {
        self.take_last_unref_callback().is_some()
    }

    fn take_last_unref_callback(&self) -> Option<LastUnrefCallback> {
        self.last_unref
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn read_pixels(&self) -> HandoffResult<Vec<u8>> {
        match &self.backing {
            Backing::Bitmap(px) => Ok(px.read().unwrap_or_else(PoisonError::into_inner).clone()),
            Backing::SharedImage { mailbox, gpu } | Backing::External { mailbox, gpu } => {
                gpu.read_pixels(*mailbox)
            }
            Backing::SwapChain { back, gpu, .. } => gpu.read_pixels(*back),
        }
    }

    fn check_writable(&self) -> HandoffResult<()> {
        if self.is_cross_thread() {
            return Err(HandoffError::contract(format!(
                "resource {} written off its owning thread",
                self.serial
            )));
        }
        if self.kind == ResourceKind::External {
            return Err(HandoffError::contract("imported resources are read-only"));
        }
        if self.is_lost() {
            return Err(HandoffError::context_lost(format!(
                "resource {} is lost",
                self.serial
            )));
        }
        Ok(())
    }

    /// Upload tightly packed pixels into `rect`.
    pub fn write_pixels(&self, rect: IntRect, pixels: &[u8]) -> HandoffResult<()> {
        self.check_writable()?;
        match &self.backing {
            Backing::Bitmap(px) => {
                let mut px = px.write().unwrap_or_else(PoisonError::into_inner);
                write_rect(&mut px, self.size, self.format, rect, pixels)
            }
            Backing::SharedImage { mailbox, gpu } => gpu.write_pixels(*mailbox, rect, pixels),
            Backing::SwapChain { back, gpu, .. } => gpu.write_pixels(*back, rect, pixels),
            Backing::External { .. } => Ok(()),
        }
    }

    /// Edit the whole surface in place.
    pub(crate) fn update_pixels(
        &self,
        f: impl FnOnce(&mut [u8]) -> HandoffResult<()>,
    ) -> HandoffResult<()> {
        self.check_writable()?;
        match &self.backing {
            Backing::Bitmap(px) => f(&mut px.write().unwrap_or_else(PoisonError::into_inner)),
            _ => {
                let mut px = self.read_pixels()?;
                f(&mut px)?;
                self.write_pixels(IntRect::from_size(self.size), &px)
            }
        }
    }

    /// Copy all pixels of `src` into this resource.
    pub(crate) fn copy_pixels_from(&self, src: &CanvasResource) -> HandoffResult<()> {
        if src.size != self.size || src.format != self.format {
            return Err(HandoffError::validation(
                "copy between differently shaped resources",
            ));
        }
        if let (
            Backing::SharedImage {
                mailbox: dst,
                gpu: dst_gpu,
            },
            Backing::SharedImage {
                mailbox: from,
                gpu: src_gpu,
            },
        ) = (&self.backing, &src.backing)
            && Arc::ptr_eq(dst_gpu, src_gpu)
        {
            self.check_writable()?;
            return dst_gpu.copy_shared_image(*from, *dst);
        }
        let px = src.read_pixels()?;
        self.write_pixels(IntRect::from_size(self.size), &px)
    }

    /// Make the drawn content visible to the compositor. Returns the sync token to wait on, or
    /// `None` when the GPU can no longer produce one.
    fn present(&self) -> Option<SyncToken> {
        match &self.backing {
            Backing::Bitmap(_) => Some(SyncToken::EMPTY),
            Backing::SharedImage { gpu, .. } | Backing::External { gpu, .. } => {
                Some(gpu.gen_sync_token()).filter(|t| t.has_data())
            }
            Backing::SwapChain { front, back, gpu } => {
                if let Err(e) = gpu.copy_shared_image(*back, *front) {
                    tracing::warn!(serial = self.serial, error = %e, "swap chain present failed");
                    return None;
                }
                Some(gpu.gen_sync_token()).filter(|t| t.has_data())
            }
        }
    }

    fn tear_down(&self) {
        let sync_token = self.sync_token();
        match &self.backing {
            Backing::Bitmap(_) | Backing::External { .. } => {}
            Backing::SharedImage { mailbox, gpu } => gpu.destroy_shared_image(*mailbox, sync_token),
            Backing::SwapChain { front, back, gpu } => {
                gpu.destroy_shared_image(*front, sync_token);
                gpu.destroy_shared_image(*back, sync_token);
            }
        }
    }
}

impl Drop for CanvasResource {
    fn drop(&mut self) {
        if self.is_cross_thread() {
            // The owning thread may be gone together with its GPU context.
            tracing::trace!(serial = self.serial, "abandoning resource");
            return;
        }
        if let Some(link) = self.provider.upgrade() {
            link.on_resource_destroyed();
        }
        self.tear_down();
    }
}

fn write_rect(
    dst: &mut [u8],
    size: Size,
    format: PixelFormat,
    rect: IntRect,
    pixels: &[u8],
) -> HandoffResult<()> {
    if rect.is_empty() || rect.intersect(IntRect::from_size(size)) != rect {
        return Err(HandoffError::validation(format!(
            "write rect {rect:?} is not inside the {}x{} surface",
            size.width, size.height
        )));
    }
    let bpp = format.bytes_per_pixel();
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
        dst[start..start + row_len].copy_from_slice(src);
    }
    Ok(())
}

/// Counted handle to a [`CanvasResource`].
pub struct ResourceRef {
    inner: Arc<CanvasResource>,
}

impl Clone for ResourceRef {
    fn clone(&self) -> Self {
        self.inner.handles.fetch_add(1, Ordering::AcqRel);
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

impl std::ops::Deref for ResourceRef {
    type Target = CanvasResource;

    fn deref(&self) -> &CanvasResource {
        &self.inner
    }
}

impl ResourceRef {
    pub fn ptr_eq(&self, other: &ResourceRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn has_one_ref(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Describe the resource for a compositor frame and take a reference for the compositor.
    ///
    /// The returned callback must run once the compositor gives the resource back. The
    /// transferable's id is left unassigned.
    pub fn prepare_transferable_resource(
        &self,
    ) -> Option<(TransferableResource, ReleaseCallback)> {
        if !self.is_valid() {
            return None;
        }
        let sync_token = self.present()?;
        self.sync_token.store(sync_token.0, Ordering::Release);
        let transferable = TransferableResource {
            id: ResourceId::INVALID,
            mailbox: self.mailbox(),
            size: self.size,
            format: self.format,
            sync_token,
            is_software: !self.is_accelerated(),
            filter_quality: self.filter_quality(),
        };
        Some((
            transferable,
            ReleaseCallback::new(self.clone(), self.provider.clone()),
        ))
    }
}

impl Drop for ResourceRef {
    fn drop(&mut self) {
        // Handles dropping concurrently on two threads still elect exactly one last owner.
        if self.inner.handles.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        if let Some(callback) = self.inner.take_last_unref_callback() {
            self.inner.handles.fetch_add(1, Ordering::AcqRel);
            callback(ResourceRef {
                inner: Arc::clone(&self.inner),
            });
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/resource/resource.rs"]
mod tests;
