use crate::foundation::core::{
    ContentId, FilterQuality, FlushReason, IntRect, PixelFormat, Rgba8Premul, Size,
};
use crate::foundation::error::{HandoffError, HandoffResult};
use crate::gpu::GpuContext;
use crate::raster::{PaintCanvas, Rasterizer, StaticImage};
use crate::resource::{
    CanvasResource, ProviderLink, ResourceKind, ResourcePool, ResourcePoolOpts, ResourceRef,
};
use crate::task::Inbox;
use std::sync::{Arc, Weak};

/// Backing used for the resources a provider allocates.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// CPU pixels.
    #[default]
    SharedBitmap,
    /// GPU shared images.
    SharedImage,
    /// One GPU front/back pair, drawn in place.
    SwapChain,
    /// Presents resources imported from elsewhere; never draws.
    PassThrough,
}

impl ProviderKind {
    pub fn needs_gpu(self) -> bool {
        matches!(self, ProviderKind::SharedImage | ProviderKind::SwapChain)
    }

    fn resource_kind(self) -> ResourceKind {
        match self {
            ProviderKind::SharedBitmap => ResourceKind::SharedBitmap,
            ProviderKind::SharedImage => ResourceKind::SharedImage,
            ProviderKind::SwapChain => ResourceKind::SwapChain,
            ProviderKind::PassThrough => ResourceKind::External,
        }
    }
}

/// Provider configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProviderOpts {
    pub kind: ProviderKind,
    pub format: PixelFormat,
    pub filter_quality: FilterQuality,
    /// Keep released resources for reuse. Turned off while the canvas is hidden.
    pub recycling_enabled: bool,
    pub pool: ResourcePoolOpts,
}

impl Default for ProviderOpts {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            format: PixelFormat::Rgba8Premul,
            filter_quality: FilterQuality::default(),
            recycling_enabled: true,
            pool: ResourcePoolOpts::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProviderStats {
    pub created: u64,
    pub reused: u64,
    pub copies_on_write: u64,
    /// Resources allocated by this provider that are still alive anywhere.
    pub in_flight: usize,
    pub max_in_flight: usize,
    pub recycled: usize,
}

/// Owns the writable surface of a canvas and vends its content as resources.
///
/// All methods run on the thread that created the provider. Released resources come back
/// through an inbox that is drained whenever a new resource is needed.
pub struct ResourceProvider {
    // Resources are declared before the link and inbox so that returns posted while they drop
    // still find a live channel.
    current: Option<ResourceRef>,
    imported: Option<ResourceRef>,
    snapshot: Option<StaticImage>,
    pool: ResourcePool,
    canvas: PaintCanvas,
    rasterizer: Rasterizer,
    returns: Inbox<ResourceRef>,
    link: Arc<ProviderLink>,

    kind: ProviderKind,
    size: Size,
    format: PixelFormat,
    gpu: Option<Arc<dyn GpuContext>>,
    filter_quality: FilterQuality,
    single_buffered: bool,
    content_generation: u64,
    content_id: ContentId,
    created: u64,
    reused: u64,
    copies_on_write: u64,
}

impl std::fmt::Debug for ResourceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceProvider")
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("current", &self.current)
            .field("recycled", &self.pool.len())
            .field("single_buffered", &self.single_buffered)
            .finish()
    }
}

impl ResourceProvider {
    /// Create a provider and allocate its first resource.
    ///
    /// GPU kinds fail with [`HandoffError::ContextLost`] or [`HandoffError::Allocation`] when
    /// the context cannot back them, which callers answer by falling back to a CPU provider.
    pub fn new(
        size: Size,
        opts: ProviderOpts,
        gpu: Option<Arc<dyn GpuContext>>,
    ) -> HandoffResult<Self> {
        let size = size.validate()?;
        if opts.kind.needs_gpu() {
            let Some(g) = &gpu else {
                return Err(HandoffError::validation(format!(
                    "{:?} provider needs a gpu context",
                    opts.kind
                )));
            };
            if g.is_context_lost() {
                return Err(HandoffError::context_lost("cannot create an accelerated provider"));
            }
        }

        let returns = Inbox::new();
        let link = Arc::new(ProviderLink::new(returns.port(), opts.recycling_enabled));
        let mut provider = Self {
            current: None,
            imported: None,
            snapshot: None,
            pool: ResourcePool::new(opts.pool),
            canvas: PaintCanvas::new(size),
            rasterizer: Rasterizer::new(),
            returns,
            link,
            kind: opts.kind,
            size,
            format: opts.format,
            gpu,
            filter_quality: opts.filter_quality,
            single_buffered: opts.kind == ProviderKind::SwapChain,
            content_generation: 0,
            content_id: ContentId::INVALID,
            created: 0,
            reused: 0,
            copies_on_write: 0,
        };
        if opts.kind != ProviderKind::PassThrough {
            let first = provider.new_or_recycled_resource()?;
            provider.current = Some(first);
        }
        tracing::debug!(
            kind = ?opts.kind,
            width = size.width,
            height = size.height,
            "provider created"
        );
        Ok(provider)
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn gpu(&self) -> Option<&Arc<dyn GpuContext>> {
        self.gpu.as_ref()
    }

    pub fn is_accelerated(&self) -> bool {
        match self.kind {
            ProviderKind::SharedBitmap => false,
            ProviderKind::SharedImage | ProviderKind::SwapChain => true,
            ProviderKind::PassThrough => self
                .imported
                .as_ref()
                .is_some_and(|r| r.is_accelerated()),
        }
    }

    /// False once the GPU context backing the provider is lost.
    pub fn is_valid(&self) -> bool {
        match self.kind {
            ProviderKind::SharedBitmap => true,
            ProviderKind::SharedImage | ProviderKind::SwapChain => {
                self.gpu.as_ref().is_some_and(|g| !g.is_context_lost())
            }
            ProviderKind::PassThrough => self.imported.as_ref().is_none_or(|r| r.is_valid()),
        }
    }

    /// Paint target bound to the current surface. `None` if the provider is invalid or never
    /// draws.
    pub fn canvas(&mut self) -> Option<&mut PaintCanvas> {
        if !self.is_valid() || self.kind == ProviderKind::PassThrough {
            return None;
        }
        if self.current.is_none() {
            match self.new_or_recycled_resource() {
                Ok(r) => self.current = Some(r),
                Err(e) => {
                    tracing::warn!(error = %e, "cannot allocate a paint target");
                    return None;
                }
            }
        }
        Some(&mut self.canvas)
    }

    pub fn has_recorded_ops(&self) -> bool {
        self.canvas.has_recorded_ops()
    }

    /// Replay recorded ops into the current resource. Returns whether content changed.
    #[tracing::instrument(
        level = "debug",
        skip(self),
        fields(ops = self.canvas.recorded_ops().len())
    )]
    pub fn flush(&mut self, reason: FlushReason) -> bool {
        if !self.canvas.has_recorded_ops() {
            return false;
        }
        let ops = self.canvas.take_ops();
        if !self.is_valid() {
            tracing::debug!(dropped = ops.len(), "dropping draws on an invalid provider");
            return false;
        }
        let size = self.size;
        let out = self.write_content(|rasterizer, target| {
            target.update_pixels(|px| rasterizer.replay(px, size, &ops))
        });
        match out {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "flush failed");
                false
            }
        }
    }

    /// The current content as a resource, flushing recorded draws first.
    ///
    /// Without draws in between, repeated calls return the same resource.
    pub fn produce_resource(&mut self, reason: FlushReason) -> Option<ResourceRef> {
        if !self.is_valid() {
            return None;
        }
        self.flush(reason);
        if self.kind == ProviderKind::PassThrough {
            return self.imported.clone();
        }
        if self.current.is_none() {
            match self.new_or_recycled_resource() {
                Ok(r) => self.current = Some(r),
                Err(e) => {
                    tracing::warn!(error = %e, "cannot produce a resource");
                    return None;
                }
            }
        }
        let resource = self.current.clone()?;
        resource.set_filter_quality(self.filter_quality);
        Some(resource)
    }

    /// Immutable image of the current content, cached until the next draw.
    pub fn snapshot(&mut self, reason: FlushReason) -> Option<StaticImage> {
        if !self.is_valid() {
            return None;
        }
        self.flush(reason);
        if let Some(image) = &self.snapshot {
            return Some(image.clone());
        }
        let resource = self.produce_resource(reason)?;
        if !self.content_id.is_valid() {
            self.content_id = ContentId::next();
        }
        if resource.is_recycleable() && !resource.has_last_unref_callback() {
            // Once the image outlives the provider's interest in the resource, the resource
            // comes back here instead of being destroyed.
            let link = Arc::downgrade(&self.link);
            resource.set_last_unref_callback(Box::new(move |last| return_to(&link, last)));
        }
        let image = StaticImage::from_resource(resource, self.content_id);
        self.snapshot = Some(image.clone());
        Some(image)
    }

    /// Put a released resource into the pool if it can be reused; destroy it otherwise.
    pub fn recycle_resource(&mut self, resource: ResourceRef) {
        let reusable = self.link.recycling_enabled()
            && !self.single_buffered
            && !resource.is_lost()
            && resource.is_recycleable()
            && resource.has_one_ref()
            && resource.kind() == self.kind.resource_kind()
            && resource.size() == self.size
            && resource.format() == self.format;
        if !reusable {
            tracing::trace!(serial = resource.serial(), "released resource not recycled");
            return;
        }
        if let Err(resource) = self.pool.put(resource) {
            tracing::trace!(serial = resource.serial(), "recycle pool full");
        }
    }

    fn drain_returns(&mut self) {
        let mut returned = Vec::new();
        self.returns.drain(|r| returned.push(r));
        for r in returned {
            self.recycle_resource(r);
        }
    }

    fn new_or_recycled_resource(&mut self) -> HandoffResult<ResourceRef> {
        self.drain_returns();
        let kind = self.kind.resource_kind();
        if let Some(r) = self.pool.take(self.size, self.format, kind) {
            r.reset_for_reuse();
            self.reused += 1;
            tracing::trace!(serial = r.serial(), "reusing recycled resource");
            return Ok(r);
        }
        let link = Arc::downgrade(&self.link);
        let r = match (self.kind, &self.gpu) {
            (ProviderKind::SharedBitmap, _) => {
                CanvasResource::create_bitmap(self.size, self.format, link)?
            }
            (ProviderKind::SharedImage, Some(gpu)) => {
                CanvasResource::create_shared_image(self.size, self.format, gpu.clone(), link)?
            }
            (ProviderKind::SwapChain, Some(gpu)) => {
                CanvasResource::create_swap_chain(self.size, self.format, gpu.clone(), link)?
            }
            (ProviderKind::PassThrough, _) => {
                return Err(HandoffError::contract(
                    "pass-through providers only present imported resources",
                ));
            }
            (kind, None) => {
                return Err(HandoffError::validation(format!(
                    "{kind:?} provider needs a gpu context"
                )));
            }
        };
        self.created += 1;
        r.set_filter_quality(self.filter_quality);
        Ok(r)
    }

    /// Resource that may be written now, copying the current one if anyone else holds it.
    fn writable_resource(&mut self) -> HandoffResult<ResourceRef> {
        let current = match self.current.take() {
            Some(c) if c.is_lost() => {
                // Lost pixels are gone; start over on a clean buffer.
                tracing::debug!(serial = c.serial(), "replacing lost resource");
                drop(c);
                self.new_or_recycled_resource()?
            }
            Some(c) => c,
            None => self.new_or_recycled_resource()?,
        };
        if current.has_one_ref() || self.single_buffered {
            self.current = Some(current.clone());
            return Ok(current);
        }
        let fresh = match self.new_or_recycled_resource() {
            Ok(r) => r,
            Err(e) => {
                self.current = Some(current);
                return Err(e);
            }
        };
        if let Err(e) = fresh.copy_pixels_from(&current) {
            self.current = Some(current);
            return Err(e);
        }
        self.copies_on_write += 1;
        tracing::debug!(
            from = current.serial(),
            to = fresh.serial(),
            "copy on write"
        );
        self.current = Some(fresh.clone());
        Ok(fresh)
    }

    fn write_content(
        &mut self,
        f: impl FnOnce(&mut Rasterizer, &ResourceRef) -> HandoffResult<()>,
    ) -> HandoffResult<()> {
        // The cached image must not count as an outside reference.
        self.snapshot = None;
        let target = self.writable_resource()?;
        f(&mut self.rasterizer, &target)?;
        self.content_generation += 1;
        self.content_id = ContentId::INVALID;
        Ok(())
    }

    /// Stop or resume keeping released resources. Disabling drops the pool.
    pub fn set_resource_recycling_enabled(&mut self, enabled: bool) {
        self.link.set_recycling_enabled(enabled);
        if !enabled {
            self.clear_recycled_resources();
        }
    }

    pub fn is_resource_recycling_enabled(&self) -> bool {
        self.link.recycling_enabled()
    }

    pub fn clear_recycled_resources(&mut self) {
        self.drain_returns();
        self.pool.clear();
    }

    pub fn recycled_resource_count(&mut self) -> usize {
        self.drain_returns();
        self.pool.len()
    }

    /// Draw directly into the presented resource from now on. Only shared-image providers can.
    pub fn try_enable_single_buffering(&mut self) -> bool {
        if self.kind != ProviderKind::SharedImage {
            return false;
        }
        if !self.single_buffered {
            self.single_buffered = true;
            self.pool.clear();
            tracing::debug!("single buffering enabled");
        }
        true
    }

    pub fn is_single_buffered(&self) -> bool {
        self.single_buffered
    }

    /// Present an externally produced resource. Pass-through providers only.
    pub fn import_resource(&mut self, resource: ResourceRef) -> HandoffResult<()> {
        if self.kind != ProviderKind::PassThrough {
            return Err(HandoffError::contract(
                "only pass-through providers import resources",
            ));
        }
        if resource.size() != self.size {
            return Err(HandoffError::validation(format!(
                "imported {}x{} resource into a {}x{} provider",
                resource.size().width,
                resource.size().height,
                self.size.width,
                self.size.height
            )));
        }
        self.imported = Some(resource);
        self.snapshot = None;
        self.content_generation += 1;
        self.content_id = ContentId::INVALID;
        Ok(())
    }

    pub fn imported_resource(&self) -> Option<&ResourceRef> {
        self.imported.as_ref()
    }

    /// Upload pixels into `rect`, after any recorded draws.
    pub fn write_pixels(&mut self, rect: IntRect, pixels: &[u8]) -> HandoffResult<()> {
        if !self.is_valid() {
            return Err(HandoffError::context_lost("write_pixels on an invalid provider"));
        }
        self.flush(FlushReason::WritePixels);
        self.write_content(|_, target| target.write_pixels(rect, pixels))
    }

    /// Reset the surface to transparent black.
    pub fn clear(&mut self) {
        if let Some(canvas) = self.canvas() {
            canvas.clear(Rgba8Premul::transparent());
        }
        self.flush(FlushReason::Clear);
    }

    /// Forget recorded but unflushed draws. The canvas transform is kept.
    pub fn skip_queued_draw_commands(&mut self) -> usize {
        let skipped = self.canvas.take_ops().len();
        if skipped > 0 {
            tracing::trace!(skipped, "skipped queued draw commands");
        }
        skipped
    }

    /// Overwrite the surface with `image`, e.g. content kept while hibernating.
    pub fn restore_back_buffer(&mut self, image: &StaticImage) -> HandoffResult<()> {
        if image.size() != self.size {
            return Err(HandoffError::validation(
                "back buffer image does not match the provider size",
            ));
        }
        let pixels = image.read_pixels()?;
        let full = IntRect::from_size(self.size);
        self.write_content(|_, target| target.write_pixels(full, &pixels))
    }

    /// Generation of the drawn content; changes on every flush that wrote pixels.
    pub fn content_unique_id(&self) -> u64 {
        self.content_generation
    }

    pub fn filter_quality(&self) -> FilterQuality {
        self.filter_quality
    }

    pub fn set_filter_quality(&mut self, quality: FilterQuality) {
        self.filter_quality = quality;
        if let Some(r) = &self.current {
            r.set_filter_quality(quality);
        }
    }

    pub fn stats(&self) -> ProviderStats {
        ProviderStats {
            created: self.created,
            reused: self.reused,
            copies_on_write: self.copies_on_write,
            in_flight: self.link.in_flight(),
            max_in_flight: self.link.max_in_flight(),
            recycled: self.pool.len(),
        }
    }
}

fn return_to(link: &Weak<ProviderLink>, resource: ResourceRef) {
    if let Some(link) = link.upgrade() {
        link.return_resource(resource);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/provider/resource_provider.rs"]
mod tests;
