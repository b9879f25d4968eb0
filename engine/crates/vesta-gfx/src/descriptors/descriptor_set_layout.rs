use std::sync::Arc;

use ash::vk;
use vesta_core::io::{Input, IoResult, Output};
use vesta_core::{Object, ObjectType};

use crate::compile_context::CompileContext;
use crate::descriptors::binding::GfxDescriptorBinding;
use crate::descriptors::sampler::SamplerImpl;
use crate::device_slot::DeviceSlot;
use crate::error::{GfxError, GfxResult};
use crate::foundation::{GfxAllocationCallbacks, GfxDevice};

/// 某个 device 上编译出的 `VkDescriptorSetLayout`
///
/// 持有 immutable sampler 的编译结果，保证 layout 存活期间 sampler 不会被销毁。
#[derive(Debug)]
pub struct DescriptorSetLayoutImpl {
    handle: vk::DescriptorSetLayout,
    device: Arc<GfxDevice>,
    allocator: Option<Arc<GfxAllocationCallbacks>>,

    _immutable_samplers: Vec<Arc<SamplerImpl>>,
}

impl DescriptorSetLayoutImpl {
    fn new(context: &CompileContext, bindings: &[GfxDescriptorBinding]) -> GfxResult<Self> {
        let device = context.device().clone();
        let allocator = context.allocator().cloned();

        // 先在同一个 device 上编译 immutable sampler
        let binding_samplers = bindings
            .iter()
            .map(|binding| {
                binding.immutable_samplers.iter().map(|sampler| sampler.compiled(context)).collect::<GfxResult<Vec<_>>>()
            })
            .collect::<GfxResult<Vec<_>>>()?;
        let sampler_handles = binding_samplers
            .iter()
            .map(|samplers| samplers.iter().map(|sampler| sampler.handle()).collect::<Vec<_>>())
            .collect::<Vec<_>>();

        let vk_bindings = bindings
            .iter()
            .zip(&sampler_handles)
            .map(|(binding, samplers)| {
                let vk_binding = vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(binding.descriptor_type)
                    .descriptor_count(binding.descriptor_count)
                    .stage_flags(binding.stage_flags);
                if samplers.is_empty() {
                    return vk_binding;
                }
                if samplers.len() != binding.descriptor_count as usize {
                    log::warn!(
                        "binding {}: descriptor_count {} does not match {} immutable samplers, using sampler count",
                        binding.binding,
                        binding.descriptor_count,
                        samplers.len()
                    );
                }
                // 会把 descriptor_count 设为 sampler 的数量
                vk_binding.immutable_samplers(samplers)
            })
            .collect::<Vec<_>>();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let handle = device
            .functions()
            .create_descriptor_set_layout(&create_info, allocator.as_deref().map(GfxAllocationCallbacks::callbacks))
            .map_err(|result| GfxError::ResourceCreation {
                resource: "descriptor set layout",
                device_id: device.device_id(),
                result,
            })?;
        log::debug!(
            "descriptor set layout created on device {}: {:?}, {} bindings",
            device.device_id(),
            handle,
            vk_bindings.len()
        );

        Ok(Self {
            handle,
            device,
            allocator,
            _immutable_samplers: binding_samplers.into_iter().flatten().collect(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }
}

impl Drop for DescriptorSetLayoutImpl {
    fn drop(&mut self) {
        log::debug!("destroying descriptor set layout on device {}: {:?}", self.device.device_id(), self.handle);
        self.device
            .functions()
            .destroy_descriptor_set_layout(self.handle, self.allocator.as_deref().map(GfxAllocationCallbacks::callbacks));
    }
}

/// descriptor set layout 的逻辑对象
///
/// 只保存 binding 列表；`VkDescriptorSetLayout` 在每个 device 上第一次 [`Self::compile`] 时创建，
/// [`Self::release`] 或者自身 drop 时销毁。
/// 不同 device 上的 compile / release 可以在不同线程上同时进行。
#[derive(Debug, Default)]
pub struct GfxDescriptorSetLayout {
    bindings: Vec<GfxDescriptorBinding>,
    implementation: DeviceSlot<DescriptorSetLayoutImpl>,
}

// new & init
impl GfxDescriptorSetLayout {
    pub fn new(bindings: Vec<GfxDescriptorBinding>) -> Self {
        Self {
            bindings,
            implementation: DeviceSlot::new(),
        }
    }

    #[inline]
    pub fn bindings(&self) -> &[GfxDescriptorBinding] {
        &self.bindings
    }
}

// compile & release
impl GfxDescriptorSetLayout {
    /// 确保 `context` 所在的 device 上存在编译结果，已存在时不做任何事
    pub fn compile(&self, context: &CompileContext) -> GfxResult<()> {
        self.implementation
            .get_or_try_init(context.device_id(), || DescriptorSetLayoutImpl::new(context, &self.bindings))
            .map(|_| ())
    }

    /// 销毁该 device 上的编译结果；不存在时什么也不做
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
    pub fn try_vk(&self, device_id: u32) -> Option<vk::DescriptorSetLayout> {
        self.implementation.get(device_id).map(|imp| imp.handle())
    }

    /// # Panics
    ///
    /// 该 device 上尚未 compile（或已经 release）
    pub fn vk(&self, device_id: u32) -> vk::DescriptorSetLayout {
        match self.try_vk(device_id) {
            Some(handle) => handle,
            None => panic!("GfxDescriptorSetLayout is not compiled for device {device_id}"),
        }
    }
}

impl ObjectType for GfxDescriptorSetLayout {
    const TYPE_NAME: &'static str = "vesta::DescriptorSetLayout";
}

impl Object for GfxDescriptorSetLayout {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn read(&mut self, input: &mut dyn Input) -> IoResult<()> {
        if self.implementation.occupied() > 0 {
            log::warn!("reading into a compiled descriptor set layout, discarding compiled state");
        }
        self.implementation.reset();

        let num_bindings = input.read_count("num_bindings")?;
        self.bindings = (0..num_bindings)
            .map(|_| GfxDescriptorBinding::read_from(input))
            .collect::<IoResult<Vec<_>>>()?;
        Ok(())
    }

    fn write(&self, output: &mut dyn Output) -> IoResult<()> {
        output.write_count("num_bindings", self.bindings.len())?;
        for binding in &self.bindings {
            binding.write(output)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::sampler::{GfxSampler, GfxSamplerDesc};
    use crate::test_utils::mock_context;
    use ash::vk::Handle;
    use vesta_core::TypeRegistry;
    use vesta_core::io::{IoError, binary, json};

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_core_types();
        crate::register_types(&mut registry).unwrap();
        registry
    }

    /// binding 0: fragment 中的 sampler；binding 1: vertex + fragment 中的 uniform buffer
    fn material_layout() -> GfxDescriptorSetLayout {
        GfxDescriptorSetLayout::new(vec![
            GfxDescriptorBinding::new(0, vk::DescriptorType::SAMPLER, 1, vk::ShaderStageFlags::FRAGMENT),
            GfxDescriptorBinding::new(
                1,
                vk::DescriptorType::UNIFORM_BUFFER,
                1,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            ),
        ])
    }

    fn shadow_sampler() -> Arc<GfxSampler> {
        Arc::new(GfxSampler::new(GfxSamplerDesc {
            compare_op: Some(vk::CompareOp::LESS),
            ..Default::default()
        }))
    }

    #[test]
    fn test_compile_on_two_devices() {
        vesta_crate_tools::init_test_log();
        let (mock0, context0) = mock_context(0);
        let (mock1, context1) = mock_context(1);
        let layout = material_layout();

        layout.compile(&context0).unwrap();
        layout.compile(&context1).unwrap();

        let handle0 = layout.vk(0);
        let handle1 = layout.vk(1);
        assert_ne!(handle0, vk::DescriptorSetLayout::null());
        assert_ne!(handle1, vk::DescriptorSetLayout::null());
        assert!(mock0.is_live(handle0.as_raw()));
        assert!(mock1.is_live(handle1.as_raw()));
        assert_eq!(mock0.last_binding_count(), 2);

        layout.release(0);
        assert!(!layout.is_compiled(0));
        assert_eq!(layout.try_vk(0), None);
        assert_eq!(mock0.live_count(), 0);
        assert_eq!(layout.vk(1), handle1);
        assert!(mock1.is_live(handle1.as_raw()));
    }

    #[test]
    #[should_panic(expected = "not compiled for device 0")]
    fn test_vk_after_release_panics() {
        let (_mock, context) = mock_context(0);
        let layout = material_layout();
        layout.compile(&context).unwrap();
        layout.release(0);
        layout.vk(0);
    }

    #[test]
    fn test_compile_is_idempotent() -> anyhow::Result<()> {
        let (mock, context) = mock_context(0);
        let layout = material_layout();

        layout.compile(&context)?;
        let handle = layout.vk(0);
        layout.compile(&context)?;
        layout.compile(&context)?;

        assert_eq!(layout.vk(0), handle);
        assert_eq!(mock.created_count(), 1);
        Ok(())
    }

    #[test]
    fn test_release_is_safe_to_repeat() {
        let (mock, context) = mock_context(3);
        let layout = material_layout();

        // 从未编译过的 device
        layout.release(3);
        layout.release(100);

        layout.compile(&context).unwrap();
        layout.release(3);
        layout.release(3);
        layout.release_all();
        assert_eq!(mock.live_count(), 0);

        // release 之后可以重新编译
        layout.compile(&context).unwrap();
        assert!(layout.is_compiled(3));
        assert_eq!(mock.created_count(), 2);
    }

    #[test]
    fn test_creation_failure_stores_nothing() {
        let (mock, context) = mock_context(0);
        let layout = material_layout();
        mock.set_fail(true);

        let err = layout.compile(&context).unwrap_err();
        assert!(matches!(
            err,
            GfxError::ResourceCreation {
                resource: "descriptor set layout",
                device_id: 0,
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            }
        ));
        assert!(!layout.is_compiled(0));

        mock.set_fail(false);
        layout.compile(&context).unwrap();
        assert!(layout.is_compiled(0));
    }

    #[test]
    fn test_drop_destroys_every_device() {
        let (mock0, context0) = mock_context(0);
        let (mock2, context2) = mock_context(2);
        {
            let layout = material_layout();
            layout.compile(&context0).unwrap();
            layout.compile(&context2).unwrap();
            assert_eq!(mock0.live_count() + mock2.live_count(), 2);
        }
        assert_eq!(mock0.live_count(), 0);
        assert_eq!(mock2.live_count(), 0);
    }

    #[test]
    fn test_immutable_samplers_outlive_release() {
        let (mock, context) = mock_context(0);
        let sampler = shadow_sampler();
        let layout = GfxDescriptorSetLayout::new(vec![
            GfxDescriptorBinding::new(0, vk::DescriptorType::SAMPLER, 0, vk::ShaderStageFlags::FRAGMENT)
                .with_immutable_samplers(vec![sampler.clone(), sampler.clone()]),
        ]);
        assert_eq!(layout.bindings()[0].descriptor_count, 2);

        layout.compile(&context).unwrap();
        let sampler_handle = sampler.vk(0);
        assert_eq!(mock.last_immutable_samplers(), vec![sampler_handle.as_raw(); 2]);
        // 一个 sampler + 一个 layout
        assert_eq!(mock.live_count(), 2);

        // layout 仍然引用着 sampler 的编译结果
        sampler.release(0);
        assert!(mock.is_live(sampler_handle.as_raw()));

        layout.release(0);
        assert_eq!(mock.live_count(), 0);
    }

    #[test]
    fn test_allocator_is_forwarded() {
        let (mock, context) = mock_context(0);
        let allocator = Arc::new(unsafe { GfxAllocationCallbacks::new(vk::AllocationCallbacks::default()) });
        let context = context.with_allocator(allocator);

        let layout = material_layout();
        layout.compile(&context).unwrap();
        assert!(mock.allocator_seen());
    }

    #[test]
    fn test_concurrent_compile_on_different_devices() {
        let contexts = (0..4).map(mock_context).collect::<Vec<_>>();
        let layout = material_layout();

        std::thread::scope(|s| {
            for (_, context) in &contexts {
                let layout = &layout;
                s.spawn(move || layout.compile(context).unwrap());
            }
        });

        for (device_id, (mock, _)) in contexts.iter().enumerate() {
            assert!(mock.is_live(layout.vk(device_id as u32).as_raw()));
        }

        layout.release_all();
        assert!(contexts.iter().all(|(mock, _)| mock.live_count() == 0));
    }

    #[test]
    fn test_roundtrip_drops_compiled_state() {
        let registry = registry();
        let (_mock, context) = mock_context(0);
        let layout = material_layout();
        layout.compile(&context).unwrap();

        let bytes = binary::to_bytes(&layout).unwrap();
        let read = binary::from_bytes(&bytes, &registry).unwrap().unwrap();
        let read = read.downcast_ref::<GfxDescriptorSetLayout>().unwrap();
        assert_eq!(read.bindings(), layout.bindings());
        assert!(!read.is_compiled(0));

        let text = json::to_json_string(&layout, true).unwrap();
        let read = json::from_json_str(&text, &registry).unwrap().unwrap();
        assert_eq!(read.downcast_ref::<GfxDescriptorSetLayout>().unwrap().bindings(), layout.bindings());
    }

    #[test]
    fn test_roundtrip_shares_immutable_samplers() {
        let registry = registry();
        let sampler = shadow_sampler();
        let layout = GfxDescriptorSetLayout::new(vec![
            GfxDescriptorBinding::new(0, vk::DescriptorType::SAMPLER, 0, vk::ShaderStageFlags::FRAGMENT)
                .with_immutable_samplers(vec![sampler.clone()]),
            GfxDescriptorBinding::new(4, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 0, vk::ShaderStageFlags::COMPUTE)
                .with_immutable_samplers(vec![sampler.clone()]),
        ]);

        let bytes = binary::to_bytes(&layout).unwrap();
        let read = binary::from_bytes(&bytes, &registry).unwrap().unwrap();
        let read = read.downcast_ref::<GfxDescriptorSetLayout>().unwrap();
        assert_eq!(read.bindings(), layout.bindings());
        assert!(Arc::ptr_eq(
            &read.bindings()[0].immutable_samplers[0],
            &read.bindings()[1].immutable_samplers[0]
        ));

        let document = json::to_json_value(&layout).unwrap();
        let read = json::from_json_value(document, &registry).unwrap().unwrap();
        let read = read.downcast_ref::<GfxDescriptorSetLayout>().unwrap();
        assert!(Arc::ptr_eq(
            &read.bindings()[0].immutable_samplers[0],
            &read.bindings()[1].immutable_samplers[0]
        ));
    }

    #[test]
    fn test_unregistered_sampler_type() {
        let mut registry = TypeRegistry::with_core_types();
        registry.register_type::<GfxDescriptorSetLayout>().unwrap();

        let layout = GfxDescriptorSetLayout::new(vec![
            GfxDescriptorBinding::new(0, vk::DescriptorType::SAMPLER, 0, vk::ShaderStageFlags::FRAGMENT)
                .with_immutable_samplers(vec![shadow_sampler()]),
        ]);

        let bytes = binary::to_bytes(&layout).unwrap();
        let err = binary::from_bytes(&bytes, &registry).unwrap_err();
        assert!(matches!(err, IoError::UnknownType { type_name } if type_name == GfxSampler::TYPE_NAME));
    }

    #[test]
    fn test_field_order() {
        let layout = GfxDescriptorSetLayout::new(vec![
            GfxDescriptorBinding::new(2, vk::DescriptorType::STORAGE_BUFFER, 3, vk::ShaderStageFlags::COMPUTE),
        ]);
        let document = json::to_json_value(&layout).unwrap();

        let names = document["fields"][0]["value"]["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|field| field["name"].as_str().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "num_bindings",
                "binding",
                "descriptor_type",
                "descriptor_count",
                "stage_flags",
                "num_immutable_samplers"
            ]
        );
    }
}
