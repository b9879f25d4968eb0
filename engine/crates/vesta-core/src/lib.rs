//! vesta 的核心对象模型
//!
//! - [`Object`]：所有可持久化类型的根 trait，成对实现 `read` / `write`
//! - [`TypeRegistry`]：类型名到工厂函数的映射，反序列化时用它重建多态对象
//! - [`io`]：序列化协议（[`io::Input`] / [`io::Output`]）以及二进制、JSON 两种流
//! - [`nodes`]：场景节点，[`nodes::MaskGroup`] 是协议的代表实现

pub mod io;
pub mod nodes;
pub mod object;
pub mod type_registry;

pub use object::{AsAny, Object, ObjectType};
pub use type_registry::{ObjectFactory, RegistryError, TypeRegistry};
