use std::sync::Arc;

use super::{Node, NodeBase};
use crate::io::{Input, IoResult, Output};
use crate::object::{Object, ObjectType};

/// MaskGroup 的一个子节点
///
/// `mask` 由外部的遍历算法解释，这里只负责保存；任何值（包括 0）都是合法的。
#[derive(Debug, Default, Clone)]
pub struct MaskGroupChild {
    pub mask: u32,
    pub node: Option<Arc<dyn Node>>,
}

/// 每个子节点都带有独立可见性 mask 的组节点
#[derive(Debug, Default)]
pub struct MaskGroup {
    pub base: NodeBase,
    children: Vec<MaskGroupChild>,
}

impl MaskGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(name),
            children: Vec::new(),
        }
    }

    /// 追加一个子节点，不检查 mask
    pub fn add_child(&mut self, mask: u32, node: Arc<dyn Node>) {
        self.children.push(MaskGroupChild { mask, node: Some(node) });
    }

    #[inline]
    pub fn children(&self) -> &[MaskGroupChild] {
        &self.children
    }

    #[inline]
    pub fn children_mut(&mut self) -> &mut [MaskGroupChild] {
        &mut self.children
    }
}

impl ObjectType for MaskGroup {
    const TYPE_NAME: &'static str = "vesta::MaskGroup";
}

impl Object for MaskGroup {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn read(&mut self, input: &mut dyn Input) -> IoResult<()> {
        self.base.read(input)?;

        let count = input.read_count("num_children")?;
        self.children.resize_with(count, MaskGroupChild::default);
        for child in &mut self.children {
            input.read_into("mask", &mut child.mask)?;
            child.node = input.read_node("node")?;
        }
        Ok(())
    }

    fn write(&self, output: &mut dyn Output) -> IoResult<()> {
        self.base.write(output)?;

        output.write_count("num_children", self.children.len())?;
        for child in &self.children {
            output.write("mask", child.mask)?;
            output.write_node("node", child.node.as_ref())?;
        }
        Ok(())
    }

    fn into_node(self: Arc<Self>) -> Option<Arc<dyn Node>> {
        Some(self)
    }
}

impl Node for MaskGroup {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&Arc<dyn Node>)) {
        for node in self.children.iter().filter_map(|child| child.node.as_ref()) {
            f(node);
        }
    }
}
