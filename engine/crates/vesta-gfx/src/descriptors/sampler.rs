use std::sync::Arc;

use ash::vk;
use vesta_core::io::{Input, IoResult, Output};
use vesta_core::{Object, ObjectType};

use crate::compile_context::CompileContext;
use crate::device_slot::DeviceSlot;
use crate::error::{GfxError, GfxResult};
use crate::foundation::{GfxAllocationCallbacks, GfxDevice};

// Sampler descriptor
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct GfxSamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    pub mip_lod_bias: f32,
    /// 0 表示不开启各向异性过滤
    pub max_anisotropy: u32,
    pub compare_op: Option<vk::CompareOp>,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: vk::BorderColor,
    pub unnormalized_coordinates: bool,
}
impl Default for GfxSamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            mip_lod_bias: 0.0,
            max_anisotropy: 0,
            compare_op: None,
            min_lod: 0.0,
            max_lod: vk::LOD_CLAMP_NONE,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            unnormalized_coordinates: false,
        }
    }
}

impl GfxSamplerDesc {
    fn create_info(&self) -> vk::SamplerCreateInfo<'static> {
        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(self.mag_filter)
            .min_filter(self.min_filter)
            .mipmap_mode(self.mipmap_mode)
            .address_mode_u(self.address_mode_u)
            .address_mode_v(self.address_mode_v)
            .address_mode_w(self.address_mode_w)
            .mip_lod_bias(self.mip_lod_bias)
            .min_lod(self.min_lod)
            .max_lod(self.max_lod)
            .border_color(self.border_color)
            .unnormalized_coordinates(self.unnormalized_coordinates);

        if self.max_anisotropy > 0 {
            create_info = create_info.anisotropy_enable(true).max_anisotropy(self.max_anisotropy as f32);
        } else {
            create_info = create_info.anisotropy_enable(false);
        }

        if let Some(compare_op) = self.compare_op {
            create_info = create_info.compare_enable(true).compare_op(compare_op);
        } else {
            create_info = create_info.compare_enable(false);
        }

        create_info
    }

    fn read(input: &mut dyn Input) -> IoResult<Self> {
        let mag_filter = vk::Filter::from_raw(input.read("mag_filter")?);
        let min_filter = vk::Filter::from_raw(input.read("min_filter")?);
        let mipmap_mode = vk::SamplerMipmapMode::from_raw(input.read("mipmap_mode")?);
        let address_mode_u = vk::SamplerAddressMode::from_raw(input.read("address_mode_u")?);
        let address_mode_v = vk::SamplerAddressMode::from_raw(input.read("address_mode_v")?);
        let address_mode_w = vk::SamplerAddressMode::from_raw(input.read("address_mode_w")?);
        let mip_lod_bias = input.read("mip_lod_bias")?;
        let max_anisotropy = input.read("max_anisotropy")?;
        let compare_enable: bool = input.read("compare_enable")?;
        let compare_op = vk::CompareOp::from_raw(input.read("compare_op")?);
        let min_lod = input.read("min_lod")?;
        let max_lod = input.read("max_lod")?;
        let border_color = vk::BorderColor::from_raw(input.read("border_color")?);
        let unnormalized_coordinates = input.read("unnormalized_coordinates")?;

        Ok(Self {
            mag_filter,
            min_filter,
            mipmap_mode,
            address_mode_u,
            address_mode_v,
            address_mode_w,
            mip_lod_bias,
            max_anisotropy,
            compare_op: compare_enable.then_some(compare_op),
            min_lod,
            max_lod,
            border_color,
            unnormalized_coordinates,
        })
    }

    fn write(&self, output: &mut dyn Output) -> IoResult<()> {
        output.write("mag_filter", self.mag_filter.as_raw())?;
        output.write("min_filter", self.min_filter.as_raw())?;
        output.write("mipmap_mode", self.mipmap_mode.as_raw())?;
        output.write("address_mode_u", self.address_mode_u.as_raw())?;
        output.write("address_mode_v", self.address_mode_v.as_raw())?;
        output.write("address_mode_w", self.address_mode_w.as_raw())?;
        output.write("mip_lod_bias", self.mip_lod_bias)?;
        output.write("max_anisotropy", self.max_anisotropy)?;
        output.write("compare_enable", self.compare_op.is_some())?;
        output.write("compare_op", self.compare_op.unwrap_or(vk::CompareOp::NEVER).as_raw())?;
        output.write("min_lod", self.min_lod)?;
        output.write("max_lod", self.max_lod)?;
        output.write("border_color", self.border_color.as_raw())?;
        output.write("unnormalized_coordinates", self.unnormalized_coordinates)?;
        Ok(())
    }
}

/// 某个 device 上编译出的 `VkSampler`
#[derive(Debug)]
pub struct SamplerImpl {
    handle: vk::Sampler,
    device: Arc<GfxDevice>,
    allocator: Option<Arc<GfxAllocationCallbacks>>,
}

impl SamplerImpl {
    fn new(context: &CompileContext, desc: &GfxSamplerDesc) -> GfxResult<Self> {
        let device = context.device().clone();
        let allocator = context.allocator().cloned();

        let handle = device
            .functions()
            .create_sampler(&desc.create_info(), allocator.as_deref().map(GfxAllocationCallbacks::callbacks))
            .map_err(|result| GfxError::ResourceCreation {
                resource: "sampler",
                device_id: device.device_id(),
                result,
            })?;
        log::debug!("sampler created on device {}: {:?}", device.device_id(), handle);

        Ok(Self {
            handle,
            device,
            allocator,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }
}

impl Drop for SamplerImpl {
    fn drop(&mut self) {
        log::debug!("destroying sampler on device {}: {:?}", self.device.device_id(), self.handle);
        self.device
            .functions()
            .destroy_sampler(self.handle, self.allocator.as_deref().map(GfxAllocationCallbacks::callbacks));
    }
}

/// 采样器：不可变的 [`GfxSamplerDesc`] + 每个 device 上延迟创建的 `VkSampler`
///
/// 可以作为 descriptor set layout 的 immutable sampler 被引用。
#[derive(Debug, Default)]
pub struct GfxSampler {
    desc: GfxSamplerDesc,
    implementation: DeviceSlot<SamplerImpl>,
}

impl PartialEq for GfxSampler {
    /// 只比较描述，编译状态不参与比较
    fn eq(&self, other: &Self) -> bool {
        self.desc == other.desc
    }
}

// new & init
impl GfxSampler {
    pub fn new(desc: GfxSamplerDesc) -> Self {
        Self {
            desc,
            implementation: DeviceSlot::new(),
        }
    }

    #[inline]
    pub fn desc(&self) -> &GfxSamplerDesc {
        &self.desc
    }
}

// compile & release
impl GfxSampler {
    pub fn compile(&self, context: &CompileContext) -> GfxResult<()> {
        self.compiled(context).map(|_| ())
    }

    /// 编译（如果需要）并返回该 device 上的编译结果
    pub(crate) fn compiled(&self, context: &CompileContext) -> GfxResult<Arc<SamplerImpl>> {
        self.implementation.get_or_try_init(context.device_id(), || SamplerImpl::new(context, &self.desc))
    }

    pub fn release(&self, device_id: u32) {
        self.implementation.clear(device_id);
    }

    pub fn release_all(&self) {
        self.implementation.clear_all();
    }

    #[inline]
    pub fn is_compiled(&self, device_id: u32) -> bool {
        self.implementation.contains(device_id)
    }

    #[inline]
    pub fn try_vk(&self, device_id: u32) -> Option<vk::Sampler> {
        self.implementation.get(device_id).map(|imp| imp.handle())
    }

    /// # Panics
    ///
    /// 该 device 上尚未 compile（或已经 release）
    pub fn vk(&self, device_id: u32) -> vk::Sampler {
        match self.try_vk(device_id) {
            Some(handle) => handle,
            None => panic!("GfxSampler is not compiled for device {device_id}"),
        }
    }
}

impl ObjectType for GfxSampler {
    const TYPE_NAME: &'static str = "vesta::Sampler";
}

impl Object for GfxSampler {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn read(&mut self, input: &mut dyn Input) -> IoResult<()> {
        if self.implementation.occupied() > 0 {
            log::warn!("reading into a compiled sampler, discarding compiled state");
        }
        self.implementation.reset();
        self.desc = GfxSamplerDesc::read(input)?;
        Ok(())
    }

    fn write(&self, output: &mut dyn Output) -> IoResult<()> {
        self.desc.write(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_context;
    use vesta_core::TypeRegistry;
    use vesta_core::io::{binary, json};

    fn shadow_desc() -> GfxSamplerDesc {
        GfxSamplerDesc {
            mag_filter: vk::Filter::NEAREST,
            address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_v: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            mip_lod_bias: -0.5,
            max_anisotropy: 8,
            compare_op: Some(vk::CompareOp::LESS_OR_EQUAL),
            max_lod: 4.0,
            border_color: vk::BorderColor::FLOAT_OPAQUE_WHITE,
            ..Default::default()
        }
    }

    #[test]
    fn test_compile_and_release() {
        vesta_crate_tools::init_test_log();
        let (mock, context) = mock_context(0);
        let sampler = GfxSampler::new(shadow_desc());

        sampler.compile(&context).unwrap();
        let handle = sampler.vk(0);
        sampler.compile(&context).unwrap();
        assert_eq!(sampler.vk(0), handle);
        assert_eq!(mock.created_count(), 1);
        assert_eq!(mock.live_count(), 1);

        sampler.release(0);
        assert!(!sampler.is_compiled(0));
        assert_eq!(mock.live_count(), 0);
    }

    #[test]
    fn test_create_info() {
        let create_info = shadow_desc().create_info();
        assert_eq!(create_info.mag_filter, vk::Filter::NEAREST);
        assert_eq!(create_info.min_filter, vk::Filter::LINEAR);
        assert_eq!(create_info.anisotropy_enable, vk::TRUE);
        assert_eq!(create_info.max_anisotropy, 8.0);
        assert_eq!(create_info.compare_enable, vk::TRUE);
        assert_eq!(create_info.compare_op, vk::CompareOp::LESS_OR_EQUAL);

        let create_info = GfxSamplerDesc::default().create_info();
        assert_eq!(create_info.anisotropy_enable, vk::FALSE);
        assert_eq!(create_info.compare_enable, vk::FALSE);
    }

    #[test]
    fn test_desc_roundtrip() {
        let mut registry = TypeRegistry::new();
        crate::register_types(&mut registry).unwrap();
        let (_mock, context) = mock_context(0);

        let sampler = GfxSampler::new(shadow_desc());
        sampler.compile(&context).unwrap();

        let bytes = binary::to_bytes(&sampler).unwrap();
        let read = binary::from_bytes(&bytes, &registry).unwrap().unwrap();
        let read = read.downcast_ref::<GfxSampler>().unwrap();
        assert_eq!(read, &sampler);
        assert!(!read.is_compiled(0));

        let default = GfxSampler::default();
        let document = json::to_json_value(&default).unwrap();
        let read = json::from_json_value(document, &registry).unwrap().unwrap();
        assert_eq!(read.downcast_ref::<GfxSampler>().unwrap().desc(), &GfxSamplerDesc::default());
    }
}
