use crate::bridge::hibernation::{
    HibernationEvent, HibernationLogger, HibernationState, TracingHibernationLogger,
};
use crate::bridge::layer::TextureLayer;
use crate::bridge::rate_limiter::{MAX_CANVAS_ANIMATION_BACKLOG, RateLimiter};
use crate::compositor::TransferableResource;
use crate::foundation::core::{FlushReason, IntRect, Size};
use crate::foundation::error::{HandoffError, HandoffResult};
use crate::gpu::GpuContext;
use crate::provider::{ProviderKind, ProviderOpts, ResourceProvider};
use crate::raster::{PaintCanvas, StaticImage};
use crate::resource::ReleaseCallback;
use crate::task::{TaskQueue, WeakTaskQueue};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterModeHint {
    #[default]
    PreferGpu,
    PreferCpu,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterMode {
    Gpu,
    Cpu,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BridgeOpts {
    pub raster_mode_hint: RasterModeHint,
    pub hibernation_enabled: bool,
    pub is_opaque: bool,
    pub max_animation_backlog: usize,
    /// Pool, format and filter settings of the providers the bridge creates. The kind is chosen
    /// by the bridge.
    pub provider: ProviderOpts,
}

impl Default for BridgeOpts {
    fn default() -> Self {
        Self {
            raster_mode_hint: RasterModeHint::PreferGpu,
            hibernation_enabled: true,
            is_opaque: false,
            max_animation_backlog: MAX_CANVAS_ANIMATION_BACKLOG,
            provider: ProviderOpts::default(),
        }
    }
}

struct BridgeInner {
    // Dropped before the layer and the hibernation image.
    provider: Option<ResourceProvider>,
    layer: TextureLayer,
    hibernation_image: Option<StaticImage>,
    rate_limiter: Option<RateLimiter>,

    size: Size,
    opts: BridgeOpts,
    gpu: Option<Arc<dyn GpuContext>>,
    tasks: TaskQueue,
    logger: Rc<dyn HibernationLogger>,

    raster_mode: RasterMode,
    context_lost: bool,
    hidden: bool,
    displayed: bool,
    software_rendering_while_hidden: bool,
    state: HibernationState,
    hibernation_generation: u64,
    frames_since_last_commit: u32,
}

/// Drives a main-thread canvas: lazily creates its provider, feeds its compositor layer and
/// releases GPU memory while the page is hidden.
///
/// Hibernation runs from an idle task on the bridge's [`TaskQueue`]. The task holds only a weak
/// handle and the generation it was scheduled for, so it is harmless after teardown or after
/// the page became visible again.
pub struct LayerBridge {
    inner: Rc<RefCell<BridgeInner>>,
}

impl std::fmt::Debug for LayerBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("LayerBridge")
            .field("size", &inner.size)
            .field("raster_mode", &inner.effective_raster_mode())
            .field("state", &inner.state)
            .field("hidden", &inner.hidden)
            .field("context_lost", &inner.context_lost)
            .finish()
    }
}

impl LayerBridge {
    /// Create a bridge. No surface is allocated until something draws or asks for one.
    pub fn new(
        size: Size,
        opts: BridgeOpts,
        gpu: Option<Arc<dyn GpuContext>>,
        tasks: TaskQueue,
    ) -> HandoffResult<Self> {
        let size = size.validate()?;
        let gpu_usable = gpu.as_ref().is_some_and(|g| !g.is_context_lost());
        let raster_mode = match opts.raster_mode_hint {
            RasterModeHint::PreferGpu if gpu_usable => RasterMode::Gpu,
            _ => RasterMode::Cpu,
        };
        tracing::debug!(?raster_mode, width = size.width, height = size.height, "bridge created");
        Ok(Self {
            inner: Rc::new(RefCell::new(BridgeInner {
                provider: None,
                layer: TextureLayer::new(opts.is_opaque),
                hibernation_image: None,
                rate_limiter: None,
                size,
                opts,
                gpu,
                tasks,
                logger: Rc::new(TracingHibernationLogger),
                raster_mode,
                context_lost: false,
                hidden: false,
                displayed: false,
                software_rendering_while_hidden: false,
                state: HibernationState::Active,
                hibernation_generation: 0,
                frames_since_last_commit: 0,
            })),
        })
    }

    pub fn set_hibernation_logger(&mut self, logger: Rc<dyn HibernationLogger>) {
        self.inner.borrow_mut().logger = logger;
    }

    pub fn size(&self) -> Size {
        self.inner.borrow().size
    }

    pub fn raster_mode(&self) -> RasterMode {
        self.inner.borrow().effective_raster_mode()
    }

    pub fn is_accelerated(&self) -> bool {
        self.raster_mode() == RasterMode::Gpu
    }

    pub fn hibernation_state(&self) -> HibernationState {
        self.inner.borrow().state
    }

    pub fn is_hibernating(&self) -> bool {
        self.hibernation_state() == HibernationState::Hibernating
    }

    pub fn is_hidden(&self) -> bool {
        self.inner.borrow().hidden
    }

    pub fn is_context_lost(&self) -> bool {
        self.inner.borrow().context_lost
    }

    pub fn frames_since_last_commit(&self) -> u32 {
        self.inner.borrow().frames_since_last_commit
    }

    pub fn is_rate_limited(&self) -> bool {
        self.inner.borrow().rate_limiter.is_some()
    }

    pub fn layer(&self) -> Ref<'_, TextureLayer> {
        Ref::map(self.inner.borrow(), |i| &i.layer)
    }

    pub fn has_resource_provider(&self) -> bool {
        self.inner.borrow().provider.is_some()
    }

    /// The current provider, without creating one.
    pub fn resource_provider(&self) -> Option<Ref<'_, ResourceProvider>> {
        Ref::filter_map(self.inner.borrow(), |i| i.provider.as_ref()).ok()
    }

    /// The provider, created on demand. `None` while the GPU context is lost.
    pub fn get_or_create_resource_provider(&mut self) -> Option<RefMut<'_, ResourceProvider>> {
        self.inner.borrow_mut().get_or_create_resource_provider()?;
        RefMut::filter_map(self.inner.borrow_mut(), |i| i.provider.as_mut()).ok()
    }

    /// Paint target. `None` while the GPU context is lost; draws are then dropped.
    pub fn canvas(&mut self) -> Option<RefMut<'_, PaintCanvas>> {
        self.inner.borrow_mut().get_or_create_resource_provider()?;
        RefMut::filter_map(self.inner.borrow_mut(), |i| {
            i.provider.as_mut().and_then(|p| p.canvas())
        })
        .ok()
    }

    /// Whether the canvas can currently be drawn and presented.
    pub fn is_valid(&mut self) -> bool {
        self.inner.borrow_mut().is_valid()
    }

    pub fn set_is_displayed(&mut self, displayed: bool) {
        let mut inner = self.inner.borrow_mut();
        inner.displayed = displayed;
        if !displayed {
            inner.rate_limiter = None;
        }
    }

    /// React to page visibility.
    ///
    /// Hiding an accelerated canvas schedules hibernation on the next idle period. Showing it
    /// cancels a pending hibernation, wakes a hibernating canvas and moves a canvas that was
    /// drawn in software while hidden back to the GPU.
    pub fn set_is_in_hidden_page(&mut self, hidden: bool) {
        let mut inner = self.inner.borrow_mut();
        if inner.hidden == hidden {
            return;
        }
        inner.hidden = hidden;
        let recycling = inner.opts.provider.recycling_enabled && !hidden;
        if let Some(p) = inner.provider.as_mut() {
            p.set_resource_recycling_enabled(recycling);
        }

        if hidden {
            let accelerated = inner.provider.as_ref().is_some_and(|p| p.is_accelerated());
            if inner.opts.hibernation_enabled
                && accelerated
                && inner.state == HibernationState::Active
            {
                inner.layer.clear_texture();
                inner.hibernation_generation += 1;
                inner.state = HibernationState::Scheduled;
                inner.logger.report_hibernation_event(HibernationEvent::Scheduled);
                let generation = inner.hibernation_generation;
                let logger = Rc::clone(&inner.logger);
                let weak = Rc::downgrade(&self.inner);
                let tasks = inner.tasks.downgrade();
                inner.tasks.post_idle_task(move || {
                    hibernate_or_log_failure(weak, tasks, generation, logger)
                });
            }
            return;
        }

        match inner.state {
            HibernationState::Scheduled => {
                // The pending task sees a newer generation and reports the abort.
                inner.hibernation_generation += 1;
                inner.state = HibernationState::Active;
            }
            HibernationState::Hibernating => {
                inner.get_or_create_resource_provider();
            }
            HibernationState::Active | HibernationState::TornDown => {}
        }
        if inner.software_rendering_while_hidden {
            inner.switch_to_accelerated();
        }
    }

    /// End of a drawing frame. After two frames without a commit the recording is flushed, and a
    /// displayed canvas starts being rate limited.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn finalize_frame(&mut self, reason: FlushReason) {
        let mut inner = self.inner.borrow_mut();
        if inner.get_or_create_resource_provider().is_none() {
            return;
        }
        inner.frames_since_last_commit += 1;
        if inner.frames_since_last_commit >= 2 {
            let gpu = inner.provider.as_mut().and_then(|p| {
                p.flush(reason);
                p.gpu().cloned()
            });
            if inner.displayed && inner.rate_limiter.is_none() {
                tracing::debug!("displayed canvas is now rate limited");
                inner.rate_limiter = Some(RateLimiter::new(gpu, inner.opts.max_animation_backlog));
            }
        }
        if let Some(limiter) = inner.rate_limiter.as_mut() {
            limiter.tick();
        }
    }

    /// Hand the current content to the compositor.
    ///
    /// `None` while hibernating, without a usable surface, or when the layer already shows this
    /// content.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn prepare_transferable_resource(
        &mut self,
    ) -> Option<(TransferableResource, ReleaseCallback)> {
        let mut inner = self.inner.borrow_mut();
        inner.frames_since_last_commit = 0;
        if let Some(limiter) = inner.rate_limiter.as_mut() {
            limiter.reset();
        }
        if inner.state == HibernationState::Hibernating || !inner.is_valid() {
            return None;
        }
        let provider = inner.get_or_create_resource_provider()?;
        let resource = provider.produce_resource(FlushReason::CanvasPushFrame)?;
        let generation = provider.content_unique_id();
        if inner.layer.shows(&resource, generation) {
            tracing::trace!("canvas unchanged since the last frame");
            return None;
        }
        let prepared = resource.prepare_transferable_resource()?;
        inner.layer.set_texture(resource, generation);
        Some(prepared)
    }

    /// Immutable copy of the content. While hibernating this is the kept software image.
    pub fn new_image_snapshot(&mut self, reason: FlushReason) -> Option<StaticImage> {
        let mut inner = self.inner.borrow_mut();
        if inner.state == HibernationState::Hibernating {
            return inner.hibernation_image.clone();
        }
        if !inner.is_valid() {
            return None;
        }
        inner.get_or_create_resource_provider()?.snapshot(reason)
    }

    /// Upload pixels. Covering the whole canvas discards queued draws instead of flushing them.
    pub fn write_pixels(&mut self, rect: IntRect, pixels: &[u8]) -> HandoffResult<()> {
        let mut inner = self.inner.borrow_mut();
        let full = IntRect::from_size(inner.size);
        let provider = inner
            .get_or_create_resource_provider()
            .ok_or_else(|| HandoffError::context_lost("canvas has no usable surface"))?;
        if rect.intersect(full) == full {
            provider.skip_queued_draw_commands();
        } else {
            provider.flush(FlushReason::WritePixels);
        }
        provider.write_pixels(rect, pixels)
    }

    /// Recover after a context loss, optionally with a fresh context. Returns whether the canvas
    /// has a surface again.
    pub fn restore(&mut self, gpu: Option<Arc<dyn GpuContext>>) -> bool {
        let mut inner = self.inner.borrow_mut();
        if !inner.context_lost {
            return inner.get_or_create_resource_provider().is_some();
        }
        if gpu.is_some() {
            inner.gpu = gpu;
        }
        if !inner.gpu.as_ref().is_some_and(|g| !g.is_context_lost()) {
            tracing::debug!("restore failed: gpu context still lost");
            return false;
        }
        inner.context_lost = false;
        inner.layer.clear_texture();
        let restored = inner.get_or_create_resource_provider().is_some();
        tracing::debug!(restored, "bridge restored after context loss");
        restored
    }
}

fn hibernate_or_log_failure(
    bridge: Weak<RefCell<BridgeInner>>,
    tasks: WeakTaskQueue,
    generation: u64,
    logger: Rc<dyn HibernationLogger>,
) {
    let Some(inner) = bridge.upgrade() else {
        logger.report_hibernation_event(
            HibernationEvent::AbortedDueToDestructionWhileHibernatePending,
        );
        return;
    };
    let Ok(mut guard) = inner.try_borrow_mut() else {
        // Someone still holds a borrow of the bridge; try again next idle period.
        tracing::trace!(generation, "bridge busy; hibernation deferred");
        if let Some(queue) = tasks.upgrade() {
            let weak = Rc::downgrade(&inner);
            let retry = tasks.clone();
            queue.post_idle_task(move || {
                hibernate_or_log_failure(weak, retry, generation, logger)
            });
        }
        return;
    };
    guard.hibernate(generation);
}

impl BridgeInner {
    fn effective_raster_mode(&self) -> RasterMode {
        if self.state == HibernationState::Hibernating || self.software_rendering_while_hidden {
            return RasterMode::Cpu;
        }
        match &self.provider {
            Some(p) if p.is_accelerated() => RasterMode::Gpu,
            Some(_) => RasterMode::Cpu,
            None => self.raster_mode,
        }
    }

    fn provider_opts(&self, kind: ProviderKind) -> ProviderOpts {
        ProviderOpts {
            kind,
            recycling_enabled: self.opts.provider.recycling_enabled && !self.hidden,
            ..self.opts.provider
        }
    }

    fn is_valid(&mut self) -> bool {
        if self.state == HibernationState::Hibernating {
            return true;
        }
        if self.effective_raster_mode() == RasterMode::Cpu && self.provider.is_some() {
            return true;
        }
        if self.context_lost {
            return false;
        }
        self.get_or_create_resource_provider().is_some()
    }

    fn get_or_create_resource_provider(&mut self) -> Option<&mut ResourceProvider> {
        if self.context_lost {
            return None;
        }
        let lost = self
            .provider
            .as_ref()
            .is_some_and(|p| p.is_accelerated() && !p.is_valid());
        if lost {
            tracing::warn!("gpu context lost; dropping the canvas surface");
            self.provider = None;
            self.layer.clear_texture();
            self.rate_limiter = None;
            self.context_lost = true;
            return None;
        }
        if self.provider.is_none() {
            let provider = self.create_provider()?;
            self.provider = Some(provider);
        }
        self.provider.as_mut()
    }

    fn create_provider(&mut self) -> Option<ResourceProvider> {
        let hibernating = self.state == HibernationState::Hibernating;
        let want_gpu = self.raster_mode == RasterMode::Gpu && !(hibernating && self.hidden);

        let mut accelerated = None;
        if want_gpu {
            let opts = self.provider_opts(ProviderKind::SharedImage);
            match ResourceProvider::new(self.size, opts, self.gpu.clone()) {
                Ok(p) => accelerated = Some(p),
                Err(e) if e.is_gpu_failure() => {
                    tracing::warn!(error = %e, "accelerated surface unavailable; using software");
                    self.raster_mode = RasterMode::Cpu;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accelerated provider creation failed");
                    return None;
                }
            }
        }
        let mut provider = match accelerated {
            Some(p) => p,
            None => {
                let opts = self.provider_opts(ProviderKind::SharedBitmap);
                match ResourceProvider::new(self.size, opts, None) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(error = %e, "software provider creation failed");
                        return None;
                    }
                }
            }
        };

        if hibernating {
            let event = if self.hidden {
                self.software_rendering_while_hidden = true;
                HibernationEvent::EndedWithSwitchToBackgroundRendering
            } else {
                HibernationEvent::EndedNormally
            };
            self.logger.report_hibernation_event(event);
            self.state = HibernationState::Active;
            if let Some(image) = self.hibernation_image.take()
                && let Err(e) = provider.restore_back_buffer(&image)
            {
                tracing::warn!(error = %e, "could not restore hibernated content");
            }
        }
        Some(provider)
    }

    /// Replace the software surface used while hidden with an accelerated one, keeping content.
    fn switch_to_accelerated(&mut self) {
        let image = self
            .provider
            .as_mut()
            .and_then(|p| p.snapshot(FlushReason::Hibernating))
            .and_then(|img| img.to_software().ok());
        self.software_rendering_while_hidden = false;
        self.provider = None;
        self.layer.clear_texture();
        let Some(provider) = self.get_or_create_resource_provider() else {
            return;
        };
        if let Some(image) = image
            && let Err(e) = provider.restore_back_buffer(&image)
        {
            tracing::warn!(error = %e, "could not carry content over to the gpu surface");
        }
    }

    fn hibernate(&mut self, generation: u64) {
        if self.state != HibernationState::Scheduled
            || self.hibernation_generation != generation
            || !self.hidden
        {
            self.logger
                .report_hibernation_event(HibernationEvent::AbortedDueToVisibilityChange);
            return;
        }
        self.state = HibernationState::Active;

        let usable = self.gpu.as_ref().is_some_and(|g| !g.is_context_lost())
            && self.provider.as_ref().is_some_and(|p| p.is_valid());
        if !usable {
            self.logger
                .report_hibernation_event(HibernationEvent::AbortedDueGpuContextLoss);
            return;
        }

        let image = self
            .provider
            .as_mut()
            .and_then(|p| p.snapshot(FlushReason::Hibernating))
            .and_then(|img| img.to_software().ok());
        let Some(image) = image else {
            self.logger
                .report_hibernation_event(HibernationEvent::AbortedDueToSnapshotFailure);
            return;
        };

        self.hibernation_image = Some(image);
        self.provider = None;
        self.layer.clear_texture();
        self.rate_limiter = None;
        self.state = HibernationState::Hibernating;
        self.logger.did_start_hibernating();
        tracing::debug!("canvas hibernating");
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        if self.state == HibernationState::Hibernating {
            self.logger
                .report_hibernation_event(HibernationEvent::EndedWithTeardown);
        }
        self.state = HibernationState::TornDown;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bridge/layer_bridge.rs"]
mod tests;
