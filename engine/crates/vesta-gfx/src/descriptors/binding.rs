use std::sync::Arc;

use ash::vk;
use vesta_core::io::{Input, IoError, IoResult, Output};

use crate::descriptors::sampler::GfxSampler;

/// descriptor set layout 中的一个 binding
///
/// 与 `VkDescriptorSetLayoutBinding` 一一对应，immutable sampler 以 [`GfxSampler`] 的形式持有。
#[derive(Clone, PartialEq, Debug)]
pub struct GfxDescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub descriptor_count: u32,
    pub stage_flags: vk::ShaderStageFlags,
    pub immutable_samplers: Vec<Arc<GfxSampler>>,
}

impl GfxDescriptorBinding {
    pub fn new(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        descriptor_count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        Self {
            binding,
            descriptor_type,
            descriptor_count,
            stage_flags,
            immutable_samplers: Vec::new(),
        }
    }

    /// descriptor_count 等于 sampler 的数量
    ///
    /// # Panics
    ///
    /// sampler 的数量超过 `u32::MAX`
    pub fn with_immutable_samplers(mut self, samplers: Vec<Arc<GfxSampler>>) -> Self {
        self.descriptor_count = sampler_count(samplers.len());
        self.immutable_samplers = samplers;
        self
    }

    pub(crate) fn write(&self, output: &mut dyn Output) -> IoResult<()> {
        output.write("binding", self.binding)?;
        output.write("descriptor_type", self.descriptor_type.as_raw())?;
        output.write("descriptor_count", self.descriptor_count)?;
        output.write("stage_flags", self.stage_flags.as_raw())?;
        output.write_count("num_immutable_samplers", self.immutable_samplers.len())?;
        for sampler in &self.immutable_samplers {
            output.write_object_as("immutable_sampler", Some(sampler))?;
        }
        Ok(())
    }

    pub(crate) fn read_from(input: &mut dyn Input) -> IoResult<Self> {
        let binding: u32 = input.read("binding")?;
        let descriptor_type = vk::DescriptorType::from_raw(input.read("descriptor_type")?);
        let descriptor_count = input.read("descriptor_count")?;
        let stage_flags = vk::ShaderStageFlags::from_raw(input.read("stage_flags")?);

        let num_samplers = input.read_count("num_immutable_samplers")?;
        let mut immutable_samplers = Vec::with_capacity(num_samplers);
        for _ in 0..num_samplers {
            let sampler = input.read_object_as::<GfxSampler>("immutable_sampler")?.ok_or_else(|| {
                IoError::InvalidData(format!("binding {binding} has a null immutable sampler"))
            })?;
            immutable_samplers.push(sampler);
        }

        Ok(Self {
            binding,
            descriptor_type,
            descriptor_count,
            stage_flags,
            immutable_samplers,
        })
    }
}

/// Vulkan 中的 descriptor 数量是 u32
fn sampler_count(len: usize) -> u32 {
    match u32::try_from(len) {
        Ok(count) => count,
        Err(_) => panic!("{len} immutable samplers exceed the Vulkan descriptor count limit"),
    }
}
