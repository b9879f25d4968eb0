use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ash::prelude::VkResult;
use ash::vk;
use ash::vk::Handle;

use crate::compile_context::CompileContext;
use crate::foundation::{DeviceFunctions, GfxDevice};

/// 不依赖驱动的 [`DeviceFunctions`]：分配递增的假句柄，并记录哪些句柄仍然存活
#[derive(Default)]
pub struct MockDeviceFunctions {
    next_handle: AtomicU64,
    live: Mutex<HashSet<u64>>,
    created: AtomicUsize,
    fail: AtomicBool,
    allocator_seen: AtomicBool,
    /// 最近一次创建 layout 时的 binding 数量
    last_binding_count: AtomicUsize,
    /// 最近一次创建 layout 时引用的 immutable sampler 句柄
    last_immutable_samplers: Mutex<Vec<u64>>,
}

impl MockDeviceFunctions {
    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn is_live(&self, raw: u64) -> bool {
        self.live.lock().unwrap().contains(&raw)
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn allocator_seen(&self) -> bool {
        self.allocator_seen.load(Ordering::SeqCst)
    }

    pub fn last_binding_count(&self) -> usize {
        self.last_binding_count.load(Ordering::SeqCst)
    }

    pub fn last_immutable_samplers(&self) -> Vec<u64> {
        self.last_immutable_samplers.lock().unwrap().clone()
    }

    fn create(&self, allocator: Option<&vk::AllocationCallbacks<'_>>) -> VkResult<u64> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        if allocator.is_some() {
            self.allocator_seen.store(true, Ordering::SeqCst);
        }
        let raw = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.live.lock().unwrap().insert(raw);
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(raw)
    }

    fn destroy(&self, raw: u64) {
        assert!(self.live.lock().unwrap().remove(&raw), "handle {raw:#x} destroyed twice or never created");
    }
}

impl DeviceFunctions for MockDeviceFunctions {
    fn create_descriptor_set_layout(
        &self,
        create_info: &vk::DescriptorSetLayoutCreateInfo<'_>,
        allocator: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        let bindings = if create_info.p_bindings.is_null() || create_info.binding_count == 0 {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(create_info.p_bindings, create_info.binding_count as usize) }
        };

        let mut samplers = Vec::new();
        for binding in bindings {
            if binding.p_immutable_samplers.is_null() {
                continue;
            }
            let handles =
                unsafe { std::slice::from_raw_parts(binding.p_immutable_samplers, binding.descriptor_count as usize) };
            for handle in handles {
                assert!(self.is_live(handle.as_raw()), "immutable sampler {handle:?} is not alive");
                samplers.push(handle.as_raw());
            }
        }

        let raw = self.create(allocator)?;
        self.last_binding_count.store(bindings.len(), Ordering::SeqCst);
        *self.last_immutable_samplers.lock().unwrap() = samplers;
        Ok(vk::DescriptorSetLayout::from_raw(raw))
    }

    fn destroy_descriptor_set_layout(
        &self,
        layout: vk::DescriptorSetLayout,
        _allocator: Option<&vk::AllocationCallbacks<'_>>,
    ) {
        self.destroy(layout.as_raw());
    }

    fn create_sampler(
        &self,
        _create_info: &vk::SamplerCreateInfo<'_>,
        allocator: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::Sampler> {
        self.create(allocator).map(vk::Sampler::from_raw)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler, _allocator: Option<&vk::AllocationCallbacks<'_>>) {
        self.destroy(sampler.as_raw());
    }
}

pub fn mock_context(device_id: u32) -> (Arc<MockDeviceFunctions>, CompileContext) {
    let mock = Arc::new(MockDeviceFunctions::default());
    let device = Arc::new(GfxDevice::new(device_id, mock.clone()));
    (mock, CompileContext::new(device))
}
