use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// 以 device id 为下标的稀疏数组，每个 device 最多保存一个编译结果
///
/// - 下标超出当前长度时自动扩容，扩容不影响已有的元素
/// - 创建编译结果时不持有锁，不同 device 可以在不同线程上同时编译
/// - 同一个 device 被并发编译时，先写入的结果生效，后完成的结果被直接丢弃
pub struct DeviceSlot<T> {
    entries: RwLock<Vec<Option<Arc<T>>>>,
}

impl<T> Default for DeviceSlot<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

// 锁
impl<T> DeviceSlot<T> {
    #[inline]
    fn read_entries(&self) -> RwLockReadGuard<'_, Vec<Option<Arc<T>>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write_entries(&self) -> RwLockWriteGuard<'_, Vec<Option<Arc<T>>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> DeviceSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, device_id: u32) -> Option<Arc<T>> {
        self.read_entries().get(device_id as usize).and_then(Clone::clone)
    }

    #[inline]
    pub fn contains(&self, device_id: u32) -> bool {
        self.read_entries().get(device_id as usize).is_some_and(Option::is_some)
    }

    /// 返回 `device_id` 上已有的编译结果；不存在时调用 `create` 创建并保存
    ///
    /// `create` 失败时不保存任何东西，错误原样返回。
    pub fn get_or_try_init<E>(&self, device_id: u32, create: impl FnOnce() -> Result<T, E>) -> Result<Arc<T>, E> {
        if let Some(existing) = self.get(device_id) {
            return Ok(existing);
        }

        let created = Arc::new(create()?);

        let index = device_id as usize;
        let mut entries = self.write_entries();
        if entries.len() <= index {
            entries.resize_with(index + 1, || None);
        }
        match &entries[index] {
            Some(existing) => {
                // 另一个线程先完成了同一个 device 的编译
                let existing = existing.clone();
                drop(entries);
                log::debug!("device {} compiled concurrently, discarding duplicate", device_id);
                Ok(existing)
            }
            None => {
                entries[index] = Some(created.clone());
                Ok(created)
            }
        }
    }

    /// 移除 `device_id` 上的编译结果；不存在时什么也不做
    pub fn clear(&self, device_id: u32) -> Option<Arc<T>> {
        // 在锁外 drop，销毁 Vulkan 对象时不阻塞其他 device
        self.write_entries().get_mut(device_id as usize).and_then(Option::take)
    }

    /// 移除所有编译结果
    pub fn clear_all(&self) {
        let entries = std::mem::take(&mut *self.write_entries());
        drop(entries);
    }

    /// 独占访问时清空，不需要加锁
    pub fn reset(&mut self) {
        self.entries.get_mut().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// 当前持有编译结果的 device 数量
    pub fn occupied(&self) -> usize {
        self.read_entries().iter().filter(|entry| entry.is_some()).count()
    }

    /// 当前数组长度，即最大的已编译 device id + 1
    pub fn capacity(&self) -> usize {
        self.read_entries().len()
    }

    /// 所有持有编译结果的 device id
    pub fn device_ids(&self) -> Vec<u32> {
        self.read_entries()
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_some())
            .map(|(index, _)| index as u32)
            .collect()
    }
}

impl<T> fmt::Debug for DeviceSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSlot").field("device_ids", &self.device_ids()).finish()
    }
}
