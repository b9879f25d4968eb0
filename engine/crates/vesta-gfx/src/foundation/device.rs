use std::fmt;
use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;

/// 场景图资源用到的 Vulkan 设备函数
///
/// 真实设备由 [`AshDevice`] 实现；compile / release 的逻辑只依赖这个 trait。
pub trait DeviceFunctions: Send + Sync {
    fn create_descriptor_set_layout(
        &self,
        create_info: &vk::DescriptorSetLayoutCreateInfo<'_>,
        allocator: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::DescriptorSetLayout>;

    fn destroy_descriptor_set_layout(
        &self,
        layout: vk::DescriptorSetLayout,
        allocator: Option<&vk::AllocationCallbacks<'_>>,
    );

    fn create_sampler(
        &self,
        create_info: &vk::SamplerCreateInfo<'_>,
        allocator: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::Sampler>;

    fn destroy_sampler(&self, sampler: vk::Sampler, allocator: Option<&vk::AllocationCallbacks<'_>>);
}

/// 基于 ash 的 Vulkan 逻辑设备
///
/// 拥有 `VkDevice`，drop 时销毁。所有在它上面创建的对象都持有 [`GfxDevice`] 的强引用，
/// 因此设备总是最后被销毁。
pub struct AshDevice {
    device: ash::Device,
}

impl AshDevice {
    pub fn new(device: ash::Device) -> Self {
        Self { device }
    }

    #[inline]
    pub fn handle(&self) -> vk::Device {
        self.device.handle()
    }

    #[inline]
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }
}

impl Drop for AshDevice {
    fn drop(&mut self) {
        log::info!("destroying device");
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

impl DeviceFunctions for AshDevice {
    fn create_descriptor_set_layout(
        &self,
        create_info: &vk::DescriptorSetLayoutCreateInfo<'_>,
        allocator: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        unsafe { self.device.create_descriptor_set_layout(create_info, allocator) }
    }

    fn destroy_descriptor_set_layout(
        &self,
        layout: vk::DescriptorSetLayout,
        allocator: Option<&vk::AllocationCallbacks<'_>>,
    ) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, allocator) }
    }

    fn create_sampler(
        &self,
        create_info: &vk::SamplerCreateInfo<'_>,
        allocator: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::Sampler> {
        unsafe { self.device.create_sampler(create_info, allocator) }
    }

    fn destroy_sampler(&self, sampler: vk::Sampler, allocator: Option<&vk::AllocationCallbacks<'_>>) {
        unsafe { self.device.destroy_sampler(sampler, allocator) }
    }
}

/// 一个活跃的逻辑设备及其 device id
///
/// device id 是一个较小的非负整数，由上层（通常是 viewer / window 的创建者）分配，
/// 用作各个资源 [`crate::DeviceSlot`] 的下标。
pub struct GfxDevice {
    device_id: u32,
    functions: Arc<dyn DeviceFunctions>,
}

impl GfxDevice {
    pub fn new(device_id: u32, functions: Arc<dyn DeviceFunctions>) -> Self {
        Self { device_id, functions }
    }

    pub fn from_ash(device_id: u32, device: ash::Device) -> Self {
        Self::new(device_id, Arc::new(AshDevice::new(device)))
    }

    #[inline]
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    #[inline]
    pub fn functions(&self) -> &dyn DeviceFunctions {
        self.functions.as_ref()
    }
}

impl fmt::Debug for GfxDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GfxDevice").field("device_id", &self.device_id).finish_non_exhaustive()
    }
}
