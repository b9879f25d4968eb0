use std::sync::Arc;

use super::{Node, NodeBase};
use crate::io::{Input, IoError, IoResult, Output};
use crate::object::{Object, ObjectType};

/// 普通的组节点：有序的子节点列表
#[derive(Debug, Default)]
pub struct Group {
    pub base: NodeBase,
    children: Vec<Arc<dyn Node>>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(name),
            children: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: Arc<dyn Node>) {
        self.children.push(child);
    }

    #[inline]
    pub fn children(&self) -> &[Arc<dyn Node>] {
        &self.children
    }
}

impl ObjectType for Group {
    const TYPE_NAME: &'static str = "vesta::Group";
}

impl Object for Group {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn read(&mut self, input: &mut dyn Input) -> IoResult<()> {
        self.base.read(input)?;

        let count = input.read_count("num_children")?;
        self.children.clear();
        self.children.reserve(count);
        for _ in 0..count {
            let child = input
                .read_node("child")?
                .ok_or_else(|| IoError::InvalidData("null child in vesta::Group".to_string()))?;
            self.children.push(child);
        }
        Ok(())
    }

    fn write(&self, output: &mut dyn Output) -> IoResult<()> {
        self.base.write(output)?;

        output.write_count("num_children", self.children.len())?;
        for child in &self.children {
            output.write_node("child", Some(child))?;
        }
        Ok(())
    }

    fn into_node(self: Arc<Self>) -> Option<Arc<dyn Node>> {
        Some(self)
    }
}

impl Node for Group {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&Arc<dyn Node>)) {
        for child in &self.children {
            f(child);
        }
    }
}
