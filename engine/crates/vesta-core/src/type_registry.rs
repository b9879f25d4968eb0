use std::collections::HashMap;

use crate::nodes::{Group, MaskGroup};
use crate::object::{Object, ObjectType};

/// 创建某个类型的默认实例
pub type ObjectFactory = fn() -> Box<dyn Object>;

fn create_default<T: ObjectType>() -> Box<dyn Object> {
    Box::new(T::default())
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("type `{type_name}` is already registered")]
    DuplicateType { type_name: String },
}

/// 类型名 -> 工厂函数
///
/// 反序列化多态引用时，流中只记录类型名，由注册表负责构造对应的具体类型。
/// 每个类型只能注册一次，并且需要在任何可能引用它的 `read` 之前完成注册。
#[derive(Default)]
pub struct TypeRegistry {
    factories: HashMap<String, ObjectFactory>,
}

// 构造
impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预先注册 vesta-core 中的所有节点类型
    pub fn with_core_types() -> Self {
        let mut registry = Self::new();
        registry.register_core_types().unwrap_or_else(|_| unreachable!("empty registry has no duplicates"));
        registry
    }

    pub fn register_core_types(&mut self) -> Result<(), RegistryError> {
        self.register_type::<Group>()?;
        self.register_type::<MaskGroup>()?;
        Ok(())
    }
}

// 注册与查询
impl TypeRegistry {
    pub fn register(&mut self, type_name: impl Into<String>, factory: ObjectFactory) -> Result<(), RegistryError> {
        let type_name = type_name.into();
        if self.factories.contains_key(&type_name) {
            return Err(RegistryError::DuplicateType { type_name });
        }
        log::debug!("register object type: {}", type_name);
        self.factories.insert(type_name, factory);
        Ok(())
    }

    pub fn register_type<T: ObjectType>(&mut self) -> Result<(), RegistryError> {
        self.register(T::TYPE_NAME, create_default::<T>)
    }

    #[inline]
    pub fn lookup(&self, type_name: &str) -> Option<ObjectFactory> {
        self.factories.get(type_name).copied()
    }

    /// 构造 `type_name` 对应类型的默认实例
    #[inline]
    pub fn create(&self, type_name: &str) -> Option<Box<dyn Object>> {
        self.lookup(type_name).map(|factory| factory())
    }

    #[inline]
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.type_names().collect::<Vec<_>>();
        names.sort_unstable();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}
