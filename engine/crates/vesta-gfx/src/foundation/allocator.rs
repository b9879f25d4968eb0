use ash::vk;

/// 创建 / 销毁 Vulkan 对象时使用的 host 内存分配回调
///
/// 同一个 allocator 会被多个编译结果共享，创建时使用的 allocator 也必须用于销毁。
#[derive(Debug)]
pub struct GfxAllocationCallbacks {
    callbacks: vk::AllocationCallbacks<'static>,
}

// SAFETY: Vulkan 要求分配回调可以在任意线程上被调用，`p_user_data` 指向的数据由 `new` 的调用者保证线程安全
unsafe impl Send for GfxAllocationCallbacks {}
unsafe impl Sync for GfxAllocationCallbacks {}

impl GfxAllocationCallbacks {
    /// # Safety
    ///
    /// `callbacks` 中的函数与 `p_user_data` 必须在整个生命周期内有效，并且可以从多个线程同时调用。
    pub unsafe fn new(callbacks: vk::AllocationCallbacks<'static>) -> Self {
        Self { callbacks }
    }

    #[inline]
    pub fn callbacks(&self) -> &vk::AllocationCallbacks<'static> {
        &self.callbacks
    }
}
