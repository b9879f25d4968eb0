//! 序列化协议
//!
//! [`Output`] 与 [`Input`] 是一对对偶的接口，每个可持久化类型通过成对的
//! [`Object::write`] / [`Object::read`] 使用它们：
//!
//! - 基础字段按名字读写（[`Output::write_value`] / [`Input::read_value`]）
//! - 嵌套的多态对象按名字读写（[`Output::write_object`] / [`Input::read_object`]），
//!   流中记录具体类型的注册名，读取时由 [`crate::TypeRegistry`] 重建
//!
//! 具体的流实现见 [`binary`] 和 [`json`]。

pub mod binary;
pub mod json;
mod value;

use std::sync::Arc;

pub use value::{IoValue, Value, ValueKind};

use crate::nodes::Node;
use crate::object::{Object, ObjectType, downcast_arc};

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("unknown object type `{type_name}`")]
    UnknownType { type_name: String },

    #[error("field `{name}`: expected {expected}, found {found}")]
    TypeMismatch { name: String, expected: ValueKind, found: ValueKind },

    #[error("expected field `{expected}`, found `{found}`")]
    FieldMismatch { expected: String, found: String },

    #[error("unexpected end of data while reading field `{name}`")]
    UnexpectedEnd { name: String },

    #[error("field `{name}`: expected object of type `{expected}`, found `{found}`")]
    UnexpectedObjectType { name: String, expected: &'static str, found: &'static str },

    #[error("reference to unknown object id {0}")]
    DanglingReference(u32),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type IoResult<T> = Result<T, IoError>;

/// 序列化的写入端
pub trait Output {
    fn write_value(&mut self, name: &str, value: Value) -> IoResult<()>;

    /// 写入一个多态引用：具体类型的注册名 + 对象自身的字段，或者一个空引用标记
    ///
    /// 同一个对象（按 `Arc` 指向的地址）在一个流中第二次出现时，只写入对它的引用。
    /// 流会持有写入过的对象直到自身被销毁，因此地址在流的生命周期内不会被复用。
    fn write_object(&mut self, name: &str, object: Option<&Arc<dyn Object>>) -> IoResult<()>;
}

/// 序列化的读取端
pub trait Input {
    /// 读取名为 `name` 的字段，其编码种类必须是 `kind`
    fn read_value(&mut self, name: &str, kind: ValueKind) -> IoResult<Value>;

    /// 读取一个多态引用
    ///
    /// 通过注册表构造具体类型的默认实例，再调用它的 [`Object::read`]。
    /// 空引用直接返回 `None`，不会查询注册表。
    fn read_object(&mut self, name: &str) -> IoResult<Option<Arc<dyn Object>>>;

    /// 当前对象中尚未读取部分的上界，单位由流决定（二进制流为字节，JSON 流为字段）
    ///
    /// 一个字段至少占一个单位，用来在分配内存之前检查从流中读到的长度。
    fn remaining(&self) -> usize;
}

impl dyn Output + '_ {
    #[inline]
    pub fn write<T: IoValue>(&mut self, name: &str, value: T) -> IoResult<()> {
        self.write_value(name, value.into_value())
    }

    /// 序列长度前缀
    pub fn write_count(&mut self, name: &str, count: usize) -> IoResult<()> {
        let count =
            u32::try_from(count).map_err(|_| IoError::InvalidData(format!("`{name}`: {count} exceeds u32")))?;
        self.write(name, count)
    }

    /// 写入一个具体类型的共享对象
    pub fn write_object_as<T: Object>(&mut self, name: &str, object: Option<&Arc<T>>) -> IoResult<()> {
        let object = object.map(|object| object.clone() as Arc<dyn Object>);
        self.write_object(name, object.as_ref())
    }

    /// 写入一个场景节点
    pub fn write_node(&mut self, name: &str, node: Option<&Arc<dyn Node>>) -> IoResult<()> {
        let object = node.map(|node| node.clone() as Arc<dyn Object>);
        self.write_object(name, object.as_ref())
    }
}

impl dyn Input + '_ {
    pub fn read<T: IoValue>(&mut self, name: &str) -> IoResult<T> {
        let value = self.read_value(name, T::KIND)?;
        let found = value.kind();
        T::from_value(value).ok_or_else(|| IoError::TypeMismatch {
            name: name.to_string(),
            expected: T::KIND,
            found,
        })
    }

    #[inline]
    pub fn read_into<T: IoValue>(&mut self, name: &str, target: &mut T) -> IoResult<()> {
        *target = self.read(name)?;
        Ok(())
    }

    /// 读取序列长度前缀
    ///
    /// 序列中的每个元素至少包含一个字段，超过 [`Input::remaining`] 的长度一定来自损坏的数据。
    pub fn read_count(&mut self, name: &str) -> IoResult<usize> {
        let count: u32 = self.read(name)?;
        let count = count as usize;
        let remaining = self.remaining();
        if count > remaining {
            return Err(IoError::InvalidData(format!(
                "`{name}`: count {count} exceeds the {remaining} remaining units of the object"
            )));
        }
        Ok(count)
    }

    /// 读取一个多态引用，并要求它是具体类型 `T`
    pub fn read_object_as<T: ObjectType>(&mut self, name: &str) -> IoResult<Option<Arc<T>>> {
        let Some(object) = self.read_object(name)? else {
            return Ok(None);
        };
        downcast_arc::<T>(object).map(Some).map_err(|object| IoError::UnexpectedObjectType {
            name: name.to_string(),
            expected: T::TYPE_NAME,
            found: object.type_name(),
        })
    }

    /// 读取一个多态引用，并要求它是场景节点
    pub fn read_node(&mut self, name: &str) -> IoResult<Option<Arc<dyn Node>>> {
        let Some(object) = self.read_object(name)? else {
            return Ok(None);
        };
        let type_name = object.type_name();
        object.into_node().map(Some).ok_or_else(|| IoError::UnexpectedObjectType {
            name: name.to_string(),
            expected: "node",
            found: type_name,
        })
    }
}
