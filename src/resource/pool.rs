use crate::foundation::core::{PixelFormat, Size};
use crate::resource::resource::{ResourceKind, ResourceRef};
use std::collections::HashMap;

/// Most released resources a provider keeps for reuse.
pub const MAX_RECYCLED_CANVAS_RESOURCES: usize = 2;

/// Bounds of a [`ResourcePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ResourcePoolOpts {
    /// Maximum bytes retained across all buckets.
    pub max_pool_bytes: usize,
    /// Maximum number of retained resources across all buckets.
    pub max_resources: usize,
}

impl Default for ResourcePoolOpts {
    fn default() -> Self {
        Self {
            max_pool_bytes: 64 * 1024 * 1024,
            max_resources: MAX_RECYCLED_CANVAS_RESOURCES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PoolKey {
    size: Size,
    format: PixelFormat,
    kind: ResourceKind,
}

impl PoolKey {
    fn of(resource: &ResourceRef) -> Self {
        Self {
            size: resource.size(),
            format: resource.format(),
            kind: resource.kind(),
        }
    }

    fn byte_len(self) -> usize {
        self.size.byte_len(self.format)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResourcePoolStats {
    pub retained_resources: usize,
    pub retained_bytes: usize,
    pub reused: u64,
    pub dropped_on_release: u64,
}

/// Bounded set of released resources, keyed by `(size, format, kind)`.
///
/// Only touched from the owning provider's thread.
#[derive(Debug)]
pub struct ResourcePool {
    opts: ResourcePoolOpts,
    stats: ResourcePoolStats,
    buckets: HashMap<PoolKey, Vec<ResourceRef>>,
}

impl ResourcePool {
    pub fn new(opts: ResourcePoolOpts) -> Self {
        Self {
            opts,
            stats: ResourcePoolStats::default(),
            buckets: HashMap::new(),
        }
    }

    pub fn opts(&self) -> ResourcePoolOpts {
        self.opts
    }

    pub fn stats(&self) -> ResourcePoolStats {
        self.stats.clone()
    }

    pub fn len(&self) -> usize {
        self.stats.retained_resources
    }

    pub fn is_empty(&self) -> bool {
        self.stats.retained_resources == 0
    }

    /// Pop a retained resource matching the given shape.
    pub fn take(
        &mut self,
        size: Size,
        format: PixelFormat,
        kind: ResourceKind,
    ) -> Option<ResourceRef> {
        let key = PoolKey { size, format, kind };
        let resource = self.buckets.get_mut(&key)?.pop()?;
        self.stats.retained_resources = self.stats.retained_resources.saturating_sub(1);
        self.stats.retained_bytes = self.stats.retained_bytes.saturating_sub(key.byte_len());
        self.stats.reused = self.stats.reused.saturating_add(1);
        Some(resource)
    }

    /// Retain a resource, or hand it back when the pool is full.
    pub fn put(&mut self, resource: ResourceRef) -> Result<(), ResourceRef> {
        let key = PoolKey::of(&resource);
        let bytes = key.byte_len();
        if self.stats.retained_resources >= self.opts.max_resources
            || self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes
        {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return Err(resource);
        }
        self.buckets.entry(key).or_default().push(resource);
        self.stats.retained_resources = self.stats.retained_resources.saturating_add(1);
        self.stats.retained_bytes = self.stats.retained_bytes.saturating_add(bytes);
        Ok(())
    }

    /// Drop every retained resource.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.stats.retained_resources = 0;
        self.stats.retained_bytes = 0;
    }

    pub fn contains(&self, resource: &ResourceRef) -> bool {
        self.buckets
            .values()
            .flatten()
            .any(|r| r.ptr_eq(resource))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/resource/pool.rs"]
mod tests;
