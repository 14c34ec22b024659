use crate::gpu::SyncToken;
use crate::resource::resource::ResourceRef;
use crate::task::Port;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Provider state reachable from resources and release callbacks on any thread.
///
/// Resources hold it weakly: once the provider is gone, returns go nowhere and the resource is
/// simply destroyed.
#[derive(Debug)]
pub(crate) struct ProviderLink {
    returns: Port<ResourceRef>,
    recycling_enabled: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ProviderLink {
    pub(crate) fn new(returns: Port<ResourceRef>, recycling_enabled: bool) -> Self {
        Self {
            returns,
            recycling_enabled: AtomicBool::new(recycling_enabled),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn recycling_enabled(&self) -> bool {
        self.recycling_enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_recycling_enabled(&self, enabled: bool) {
        self.recycling_enabled.store(enabled, Ordering::Release);
    }

    /// Hand a resource back to the provider's return inbox.
    pub(crate) fn return_resource(&self, resource: ResourceRef) {
        if !self.recycling_enabled() {
            tracing::trace!(serial = resource.serial(), "recycling disabled, dropping resource");
            return;
        }
        if !self.returns.post(resource) {
            tracing::trace!("provider inbox closed, dropping returned resource");
        }
    }

    pub(crate) fn on_resource_created(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(now, Ordering::AcqRel);
    }

    pub(crate) fn on_resource_destroyed(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::Acquire)
    }
}

/// Compositor-side reference to a prepared resource.
///
/// Run it with the sync token and lost flag the compositor returned. Dropping it without
/// running only releases the reference.
#[derive(Debug)]
pub struct ReleaseCallback {
    resource: ResourceRef,
    provider: Weak<ProviderLink>,
}

impl ReleaseCallback {
    pub(crate) fn new(resource: ResourceRef, provider: Weak<ProviderLink>) -> Self {
        Self { resource, provider }
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    #[tracing::instrument(level = "trace", skip(self), fields(serial = self.resource.serial()))]
    pub fn run(self, sync_token: SyncToken, is_lost: bool) {
        let Self { resource, provider } = self;
        resource.wait_sync_token(sync_token);
        if is_lost {
            resource.notify_resource_lost();
        }
        // An attached last-unref callback decides where the resource goes.
        if resource.has_last_unref_callback() {
            return;
        }
        let Some(link) = provider.upgrade() else {
            return;
        };
        if !is_lost && resource.is_recycleable() && resource.has_one_ref() {
            link.return_resource(resource);
        }
    }
}
