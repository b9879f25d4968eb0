mod binding;
mod descriptor_set_layout;
mod sampler;

pub use binding::GfxDescriptorBinding;
pub use descriptor_set_layout::{DescriptorSetLayoutImpl, GfxDescriptorSetLayout};
pub use sampler::{GfxSampler, GfxSamplerDesc, SamplerImpl};
