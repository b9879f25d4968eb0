//! vesta 的 GFX 层
//!
//! 场景图中的一个逻辑对象（例如 [`GfxDescriptorSetLayout`]）只保存不可变的描述，
//! 在每个 device 上第一次 `compile` 时才创建对应的 Vulkan 对象，
//! 创建结果按 device id 保存在 [`DeviceSlot`] 中。

pub mod compile_context;
pub mod descriptors;
pub mod device_slot;
pub mod error;
pub mod foundation;

#[cfg(test)]
pub(crate) mod test_utils;

pub use compile_context::CompileContext;
pub use descriptors::{GfxDescriptorBinding, GfxDescriptorSetLayout, GfxSampler, GfxSamplerDesc};
pub use device_slot::DeviceSlot;
pub use error::{GfxError, GfxResult};
pub use foundation::{AshDevice, DeviceFunctions, GfxAllocationCallbacks, GfxDevice};

use vesta_core::{RegistryError, TypeRegistry};

/// 注册本 crate 中所有可持久化的类型
pub fn register_types(registry: &mut TypeRegistry) -> Result<(), RegistryError> {
    registry.register_type::<GfxDescriptorSetLayout>()?;
    registry.register_type::<GfxSampler>()?;
    Ok(())
}
