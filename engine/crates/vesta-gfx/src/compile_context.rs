use std::sync::Arc;

use crate::foundation::{GfxAllocationCallbacks, GfxDevice};

/// compile 时使用的上下文：当前 device 与当前 allocator
#[derive(Debug, Clone)]
pub struct CompileContext {
    device: Arc<GfxDevice>,
    allocator: Option<Arc<GfxAllocationCallbacks>>,
}

impl CompileContext {
    pub fn new(device: Arc<GfxDevice>) -> Self {
        Self { device, allocator: None }
    }

    pub fn with_allocator(mut self, allocator: Arc<GfxAllocationCallbacks>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    #[inline]
    pub fn device(&self) -> &Arc<GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn device_id(&self) -> u32 {
        self.device.device_id()
    }

    #[inline]
    pub fn allocator(&self) -> Option<&Arc<GfxAllocationCallbacks>> {
        self.allocator.as_ref()
    }
}
