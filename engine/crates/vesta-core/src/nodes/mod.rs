mod group;
mod mask_group;
mod node;

pub use group::Group;
pub use mask_group::{MaskGroup, MaskGroupChild};
pub use node::{Node, NodeBase};
