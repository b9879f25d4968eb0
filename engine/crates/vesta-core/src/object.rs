use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use crate::io::{Input, IoResult, Output};
use crate::nodes::Node;

/// 为所有 `'static` 类型提供到 [`Any`] 的转换，用于 downcast
///
/// 注意：不要在 `Arc<dyn Object>` 上直接调用 `as_any`，`Arc` 本身也实现了本 trait，
/// 需要先解引用（`(*arc).as_any()`），或使用 `dyn Object::downcast_ref`。
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}
impl<T: Any + Send + Sync> AsAny for T {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// 可持久化对象
///
/// # 读写顺序约定
///
/// `write` 先调用"基类"部分的 `write`，再按声明顺序写出自己新增的字段；
/// `read` 必须以完全相同的顺序、相同的操作序列读回。
/// 流格式依赖这个顺序：新版本可以在末尾追加字段，但不能重排或删除字段。
pub trait Object: AsAny + Debug {
    /// 注册到 [`crate::TypeRegistry`] 中的类型名
    fn type_name(&self) -> &'static str;

    fn read(&mut self, input: &mut dyn Input) -> IoResult<()>;

    fn write(&self, output: &mut dyn Output) -> IoResult<()>;

    /// 如果该对象是场景节点，转换为 `Arc<dyn Node>`
    fn into_node(self: Arc<Self>) -> Option<Arc<dyn Node>> {
        None
    }
}

/// 具有静态类型名、可以被默认构造的对象，可以直接注册到 [`crate::TypeRegistry`]
pub trait ObjectType: Object + Default {
    const TYPE_NAME: &'static str;
}

impl dyn Object {
    #[inline]
    pub fn is<T: Object>(&self) -> bool {
        self.as_any().is::<T>()
    }

    #[inline]
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// 将 `Arc<dyn Object>` 转换为具体类型；失败时原样返回
pub fn downcast_arc<T: Object>(object: Arc<dyn Object>) -> Result<Arc<T>, Arc<dyn Object>> {
    if object.is::<T>() {
        object.into_any_arc().downcast::<T>().map_err(|_| unreachable!("type checked above"))
    } else {
        Err(object)
    }
}
