use ash::vk;

#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    /// 驱动创建 Vulkan 对象失败
    #[error("failed to create {resource} on device {device_id}: {result}")]
    ResourceCreation {
        resource: &'static str,
        device_id: u32,
        result: vk::Result,
    },
}

pub type GfxResult<T> = Result<T, GfxError>;
