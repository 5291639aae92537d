//! Off-screen render targets.

use std::sync::Arc;

use parking_lot::Mutex;

use super::context::FramebufferHandle;
use super::resource::{GpuResource, GpuSlot, next_resource_id};
use super::texture::Texture;

pub(crate) struct RenderTargetInner {
    pub id: u64,
    pub color: Option<Texture>,
    pub face: Option<u32>,
    pub depth: bool,
    pub width: u32,
    pub height: u32,
    pub gpu: Mutex<GpuSlot<FramebufferHandle>>,
}

impl GpuResource for RenderTargetInner {
    fn invalidate(&self) {
        self.gpu.lock().invalidate();
    }
}

/// A colour texture (or one cubemap face) plus an optional depth buffer.
#[derive(Clone)]
pub struct RenderTarget {
    inner: Arc<RenderTargetInner>,
}

impl RenderTarget {
    pub(crate) fn new(color: Option<Texture>, face: Option<u32>, depth: bool) -> Self {
        let (width, height) = color
            .as_ref()
            .map(|t| (t.width(), t.height()))
            .unwrap_or((0, 0));
        Self {
            inner: Arc::new(RenderTargetInner {
                id: next_resource_id(),
                color,
                face,
                depth,
                width,
                height,
                gpu: Mutex::new(GpuSlot::new()),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<RenderTargetInner> {
        &self.inner
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn color_buffer(&self) -> Option<&Texture> {
        self.inner.color.as_ref()
    }

    /// Cubemap face this target renders into.
    pub fn face(&self) -> Option<u32> {
        self.inner.face
    }

    pub fn has_depth(&self) -> bool {
        self.inner.depth
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("id", &self.inner.id)
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("face", &self.inner.face)
            .field("depth", &self.inner.depth)
            .finish()
    }
}

static_assertions::assert_impl_all!(RenderTarget: Send, Sync);
