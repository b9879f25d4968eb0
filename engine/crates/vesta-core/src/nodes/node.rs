use std::sync::Arc;

use crate::io::{Input, IoResult, Output};
use crate::object::Object;

/// 所有节点共有的字段
///
/// 每个节点类型在自己的 `read` / `write` 中最先调用 [`NodeBase::read`] / [`NodeBase::write`]。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NodeBase {
    pub name: String,
}

impl NodeBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn read(&mut self, input: &mut dyn Input) -> IoResult<()> {
        input.read_into("name", &mut self.name)
    }

    pub fn write(&self, output: &mut dyn Output) -> IoResult<()> {
        output.write("name", self.name.clone())
    }
}

/// 场景节点
pub trait Node: Object {
    fn base(&self) -> &NodeBase;

    fn base_mut(&mut self) -> &mut NodeBase;

    #[inline]
    fn name(&self) -> &str {
        &self.base().name
    }

    /// 按顺序访问直接子节点
    fn for_each_child(&self, _f: &mut dyn FnMut(&Arc<dyn Node>)) {}
}

impl dyn Node {
    #[inline]
    pub fn downcast_ref<T: Node>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn child_count(&self) -> usize {
        let mut count = 0;
        self.for_each_child(&mut |_| count += 1);
        count
    }
}
