//! Upload lifecycle shared by GPU-resident resources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity for buffers, textures and render targets.
pub(crate) fn next_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Upload state of a resource.
///
/// `Dirty -> Uploading -> Clean`, and back to `Dirty` whenever the CPU-side
/// data changes or the context is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// CPU data has not reached the GPU yet.
    Dirty,
    /// Upload in progress.
    Uploading,
    /// GPU copy matches the CPU data.
    Clean,
}

/// GPU handle plus upload state.
#[derive(Debug)]
pub(crate) struct GpuSlot<H> {
    pub handle: Option<H>,
    pub state: ResourceState,
}

impl<H: Copy> GpuSlot<H> {
    pub fn new() -> Self {
        Self {
            handle: None,
            state: ResourceState::Dirty,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.state = ResourceState::Dirty;
    }

    /// Move `Dirty -> Uploading`. Returns false if there is nothing to upload.
    pub fn begin_upload(&mut self) -> bool {
        if self.state != ResourceState::Dirty {
            return false;
        }
        self.state = ResourceState::Uploading;
        true
    }

    /// Finish an upload started with [`GpuSlot::begin_upload`].
    pub fn finish_upload(&mut self, succeeded: bool) {
        debug_assert_eq!(self.state, ResourceState::Uploading);
        self.state = if succeeded {
            ResourceState::Clean
        } else {
            ResourceState::Dirty
        };
    }

    /// Forget the GPU handle; the next use recreates and re-uploads.
    pub fn invalidate(&mut self) {
        self.handle = None;
        self.state = ResourceState::Dirty;
    }
}

/// Something owning a [`GpuSlot`] that must be reset on context loss.
pub(crate) trait GpuResource: Send + Sync {
    fn invalidate(&self);
}

/// Weak list of every resource created by one device.
#[derive(Default)]
pub(crate) struct ResourceRegistry {
    entries: Vec<Weak<dyn GpuResource>>,
    prune_at: usize,
}

impl ResourceRegistry {
    pub fn register<T: GpuResource + 'static>(&mut self, resource: &Arc<T>) {
        let weak: Weak<dyn GpuResource> = Arc::downgrade(resource) as Weak<T>;
        self.entries.push(weak);
        if self.entries.len() > self.prune_at {
            self.entries.retain(|entry| entry.strong_count() > 0);
            self.prune_at = (self.entries.len() * 2).max(64);
        }
    }

    /// Invalidate every live resource. Returns how many were reset.
    pub fn invalidate_all(&mut self) -> usize {
        self.entries.retain(|entry| entry.strong_count() > 0);
        let mut count = 0;
        for entry in &self.entries {
            if let Some(resource) = entry.upgrade() {
                resource.invalidate();
                count += 1;
            }
        }
        count
    }

    pub fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Probe(Mutex<GpuSlot<u32>>);

    impl GpuResource for Probe {
        fn invalidate(&self) {
            self.0.lock().invalidate();
        }
    }

    #[test]
    fn test_slot_lifecycle() {
        let mut slot = GpuSlot::<u32>::new();
        assert_eq!(slot.state, ResourceState::Dirty);
        assert!(slot.begin_upload());
        assert_eq!(slot.state, ResourceState::Uploading);
        slot.finish_upload(true);
        assert_eq!(slot.state, ResourceState::Clean);
        assert!(!slot.begin_upload());
        slot.mark_dirty();
        assert!(slot.begin_upload());
        slot.finish_upload(false);
        assert_eq!(slot.state, ResourceState::Dirty);
    }

    #[test]
    fn test_registry_invalidates_live_resources() {
        let mut registry = ResourceRegistry::default();
        let live = Arc::new(Probe(Mutex::new(GpuSlot {
            handle: Some(3),
            state: ResourceState::Clean,
        })));
        registry.register(&live);
        {
            let dropped = Arc::new(Probe(Mutex::new(GpuSlot::new())));
            registry.register(&dropped);
        }
        assert_eq!(registry.live_count(), 1);
        assert_eq!(registry.invalidate_all(), 1);
        let slot = live.0.lock();
        assert_eq!(slot.state, ResourceState::Dirty);
        assert!(slot.handle.is_none());
    }
}
