//! 二进制流
//!
//! # 格式
//!
//! ```text
//! header  := b"VSTB" version:u32
//! field   := name:str16 kind:u8 payload
//! payload := 小端序的定长值 | str32（String）| object（Object）
//! object  := 0x00                                      空引用
//!          | 0x01 id:u32 type:str16 len:u32 body[len]  新对象，body 是它的字段序列
//!          | 0x02 id:u32                              对已写入对象的引用
//! ```
//!
//! 读取对象时，读取范围被限制在它的 body 内；body 中没有被读到的尾部字段会被跳过，
//! 所以较新版本在末尾追加的字段不会影响旧版本读取。

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{Input, IoError, IoResult, Output, Value, ValueKind};
use crate::object::Object;
use crate::type_registry::TypeRegistry;

pub const MAGIC: [u8; 4] = *b"VSTB";
pub const VERSION: u32 = 1;

const OBJECT_NULL: u8 = 0x00;
const OBJECT_NEW: u8 = 0x01;
const OBJECT_REF: u8 = 0x02;

/// 把 `object` 序列化为完整的二进制文档（包含文件头）
pub fn to_bytes(object: &dyn Object) -> IoResult<Vec<u8>> {
    let mut output = BinaryOutput::new();
    output.write_root("root", object)?;
    Ok(output.finish())
}

pub fn to_writer(mut writer: impl std::io::Write, object: &dyn Object) -> IoResult<()> {
    writer.write_all(&to_bytes(object)?)?;
    Ok(())
}

/// 从完整的二进制文档中读出根对象
pub fn from_bytes(data: &[u8], registry: &TypeRegistry) -> IoResult<Option<Arc<dyn Object>>> {
    let mut input = BinaryInput::new(data, registry)?;
    input.read_object("root")
}

pub fn from_reader(mut reader: impl std::io::Read, registry: &TypeRegistry) -> IoResult<Option<Arc<dyn Object>>> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    from_bytes(&data, registry)
}

pub struct BinaryOutput {
    root: Vec<u8>,
    /// 正在写入的对象 body，写完后带上长度前缀拼接到上一层
    nested: Vec<Vec<u8>>,

    /// `Arc` 地址 -> 对象 id
    object_ids: HashMap<usize, u32>,
    /// 持有所有登记过地址的对象，保证地址在输出结束前不会被复用
    retained: Vec<Arc<dyn Object>>,
    next_id: u32,
}

impl Default for BinaryOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryOutput {
    pub fn new() -> Self {
        let mut root = Vec::with_capacity(256);
        root.extend_from_slice(&MAGIC);
        root.extend_from_slice(&VERSION.to_le_bytes());
        Self {
            root,
            nested: Vec::new(),
            object_ids: HashMap::new(),
            retained: Vec::new(),
            next_id: 1,
        }
    }

    pub fn finish(self) -> Vec<u8> {
        debug_assert!(self.nested.is_empty(), "unfinished object body");
        self.root
    }

    /// 写入一个借用的顶层对象
    ///
    /// 借用的对象无法被流持有，所以它不参与引用共享：每次调用都写出完整的对象。
    pub fn write_root(&mut self, name: &str, object: &dyn Object) -> IoResult<()> {
        self.write_field_header(name, ValueKind::Object)?;
        let id = self.allocate_id();
        self.write_new_object(id, object)
    }

    #[inline]
    fn buffer(&mut self) -> &mut Vec<u8> {
        match self.nested.last_mut() {
            Some(body) => body,
            None => &mut self.root,
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn write_str16(&mut self, s: &str) -> IoResult<()> {
        let len = u16::try_from(s.len()).map_err(|_| IoError::InvalidData(format!("name too long: {s:?}")))?;
        let buffer = self.buffer();
        buffer.write_u16::<LittleEndian>(len)?;
        buffer.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn write_field_header(&mut self, name: &str, kind: ValueKind) -> IoResult<()> {
        self.write_str16(name)?;
        self.buffer().write_u8(kind.tag())?;
        Ok(())
    }

    fn write_new_object(&mut self, id: u32, object: &dyn Object) -> IoResult<()> {
        let buffer = self.buffer();
        buffer.write_u8(OBJECT_NEW)?;
        buffer.write_u32::<LittleEndian>(id)?;
        self.write_str16(object.type_name())?;

        self.nested.push(Vec::new());
        let result = object.write(self);
        let body = self.nested.pop().unwrap_or_default();
        result?;

        let len = u32::try_from(body.len())
            .map_err(|_| IoError::InvalidData(format!("`{}`: object body too large", object.type_name())))?;
        let buffer = self.buffer();
        buffer.write_u32::<LittleEndian>(len)?;
        buffer.extend_from_slice(&body);
        Ok(())
    }
}

impl Output for BinaryOutput {
    fn write_value(&mut self, name: &str, value: Value) -> IoResult<()> {
        self.write_field_header(name, value.kind())?;
        let buffer = self.buffer();
        match value {
            Value::Bool(v) => buffer.write_u8(v as u8)?,
            Value::U8(v) => buffer.write_u8(v)?,
            Value::U16(v) => buffer.write_u16::<LittleEndian>(v)?,
            Value::U32(v) => buffer.write_u32::<LittleEndian>(v)?,
            Value::U64(v) => buffer.write_u64::<LittleEndian>(v)?,
            Value::I32(v) => buffer.write_i32::<LittleEndian>(v)?,
            Value::I64(v) => buffer.write_i64::<LittleEndian>(v)?,
            Value::F32(v) => buffer.write_f32::<LittleEndian>(v)?,
            Value::F64(v) => buffer.write_f64::<LittleEndian>(v)?,
            Value::String(v) => {
                let len = u32::try_from(v.len())
                    .map_err(|_| IoError::InvalidData(format!("`{name}`: string too long")))?;
                buffer.write_u32::<LittleEndian>(len)?;
                buffer.extend_from_slice(v.as_bytes());
            }
        }
        Ok(())
    }

    fn write_object(&mut self, name: &str, object: Option<&Arc<dyn Object>>) -> IoResult<()> {
        self.write_field_header(name, ValueKind::Object)?;

        let Some(object) = object else {
            self.buffer().write_u8(OBJECT_NULL)?;
            return Ok(());
        };

        let address = Arc::as_ptr(object) as *const () as usize;
        if let Some(&id) = self.object_ids.get(&address) {
            let buffer = self.buffer();
            buffer.write_u8(OBJECT_REF)?;
            buffer.write_u32::<LittleEndian>(id)?;
            return Ok(());
        }

        let id = self.allocate_id();
        self.object_ids.insert(address, id);
        self.retained.push(object.clone());
        self.write_new_object(id, &**object)
    }
}

pub struct BinaryInput<'a> {
    cursor: Cursor<&'a [u8]>,
    /// 当前对象 body 的结束位置
    limits: Vec<usize>,

    registry: &'a TypeRegistry,
    objects: HashMap<u32, Arc<dyn Object>>,
}

impl<'a> BinaryInput<'a> {
    /// 校验文件头并定位到第一个字段
    pub fn new(data: &'a [u8], registry: &'a TypeRegistry) -> IoResult<Self> {
        if data.len() < 8 || data[..4] != MAGIC {
            return Err(IoError::InvalidData("missing vesta binary header".to_string()));
        }
        let mut cursor = Cursor::new(data);
        cursor.set_position(MAGIC.len() as u64);

        let mut input = Self {
            cursor,
            limits: Vec::new(),
            registry,
            objects: HashMap::new(),
        };
        let version = input.read_u32("version")?;
        if version != VERSION {
            return Err(IoError::InvalidData(format!("unsupported binary version {version}")));
        }
        Ok(input)
    }

    #[inline]
    fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    #[inline]
    fn limit(&self) -> usize {
        self.limits.last().copied().unwrap_or(self.cursor.get_ref().len())
    }

    /// 当前对象中至少还剩 `len` 个字节
    fn ensure(&self, len: usize, name: &str) -> IoResult<()> {
        match self.position().checked_add(len) {
            Some(end) if end <= self.limit() => Ok(()),
            _ => Err(IoError::UnexpectedEnd { name: name.to_string() }),
        }
    }

    /// 在长度检查之后读取一个定长值
    fn read_fixed<T>(
        &mut self,
        name: &str,
        read: impl FnOnce(&mut Cursor<&'a [u8]>) -> std::io::Result<T>,
    ) -> IoResult<T> {
        self.ensure(size_of::<T>(), name)?;
        Ok(read(&mut self.cursor)?)
    }

    #[inline]
    fn read_u8(&mut self, name: &str) -> IoResult<u8> {
        self.read_fixed(name, |cursor| cursor.read_u8())
    }

    #[inline]
    fn read_u16(&mut self, name: &str) -> IoResult<u16> {
        self.read_fixed(name, |cursor| cursor.read_u16::<LittleEndian>())
    }

    #[inline]
    fn read_u32(&mut self, name: &str) -> IoResult<u32> {
        self.read_fixed(name, |cursor| cursor.read_u32::<LittleEndian>())
    }

    fn read_utf8(&mut self, len: usize, name: &str) -> IoResult<String> {
        self.ensure(len, name)?;
        let mut bytes = vec![0u8; len];
        std::io::Read::read_exact(&mut self.cursor, &mut bytes)?;
        String::from_utf8(bytes).map_err(|e| IoError::InvalidData(format!("`{name}`: {e}")))
    }

    fn read_str16(&mut self, name: &str) -> IoResult<String> {
        let len = self.read_u16(name)? as usize;
        self.read_utf8(len, name)
    }

    /// 读取字段名与编码种类，字段名必须与 `name` 一致
    fn read_field_header(&mut self, name: &str) -> IoResult<ValueKind> {
        let stored = self.read_str16(name)?;
        if stored != name {
            return Err(IoError::FieldMismatch {
                expected: name.to_string(),
                found: stored,
            });
        }
        let tag = self.read_u8(name)?;
        ValueKind::from_tag(tag).ok_or_else(|| IoError::InvalidData(format!("`{name}`: unknown kind tag {tag:#x}")))
    }
}

impl Input for BinaryInput<'_> {
    fn read_value(&mut self, name: &str, kind: ValueKind) -> IoResult<Value> {
        let found = self.read_field_header(name)?;
        if found != kind {
            return Err(IoError::TypeMismatch {
                name: name.to_string(),
                expected: kind,
                found,
            });
        }

        let value = match kind {
            ValueKind::Bool => match self.read_u8(name)? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                v => return Err(IoError::InvalidData(format!("`{name}`: invalid bool {v}"))),
            },
            ValueKind::U8 => Value::U8(self.read_u8(name)?),
            ValueKind::U16 => Value::U16(self.read_u16(name)?),
            ValueKind::U32 => Value::U32(self.read_u32(name)?),
            ValueKind::U64 => Value::U64(self.read_fixed(name, |cursor| cursor.read_u64::<LittleEndian>())?),
            ValueKind::I32 => Value::I32(self.read_fixed(name, |cursor| cursor.read_i32::<LittleEndian>())?),
            ValueKind::I64 => Value::I64(self.read_fixed(name, |cursor| cursor.read_i64::<LittleEndian>())?),
            ValueKind::F32 => Value::F32(self.read_fixed(name, |cursor| cursor.read_f32::<LittleEndian>())?),
            ValueKind::F64 => Value::F64(self.read_fixed(name, |cursor| cursor.read_f64::<LittleEndian>())?),
            ValueKind::String => {
                let len = self.read_u32(name)? as usize;
                Value::String(self.read_utf8(len, name)?)
            }
            ValueKind::Object => {
                return Err(IoError::TypeMismatch {
                    name: name.to_string(),
                    expected: kind,
                    found,
                });
            }
        };
        Ok(value)
    }

    fn read_object(&mut self, name: &str) -> IoResult<Option<Arc<dyn Object>>> {
        let found = self.read_field_header(name)?;
        if found != ValueKind::Object {
            return Err(IoError::TypeMismatch {
                name: name.to_string(),
                expected: ValueKind::Object,
                found,
            });
        }

        match self.read_u8(name)? {
            OBJECT_NULL => Ok(None),
            OBJECT_REF => {
                let id = self.read_u32(name)?;
                self.objects.get(&id).cloned().map(Some).ok_or(IoError::DanglingReference(id))
            }
            OBJECT_NEW => {
                let id = self.read_u32(name)?;
                let type_name = self.read_str16(name)?;
                let body_len = self.read_u32(name)? as usize;
                self.ensure(body_len, name)?;
                let end = self.position() + body_len;

                let mut object = self.registry.create(&type_name).ok_or(IoError::UnknownType { type_name })?;

                self.limits.push(end);
                let result = object.read(self);
                self.limits.pop();
                result?;
                // 跳过当前版本不认识的尾部字段
                self.cursor.set_position(end as u64);

                let object: Arc<dyn Object> = Arc::from(object);
                self.objects.insert(id, object.clone());
                Ok(Some(object))
            }
            marker => Err(IoError::InvalidData(format!("`{name}`: unknown object marker {marker:#x}"))),
        }
    }

    fn remaining(&self) -> usize {
        self.limit().saturating_sub(self.position())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{Group, MaskGroup};

    fn write_temporary(output: &mut BinaryOutput, field: &str, name: &str) {
        let group: Arc<dyn Object> = Arc::new(Group::new(name));
        output.write_object(field, Some(&group)).unwrap();
    }

    fn write_borrowed(output: &mut BinaryOutput, field: &str, name: &str) {
        let group = Group::new(name);
        output.write_root(field, &group).unwrap();
    }

    fn read_names(bytes: &[u8], fields: &[&str]) -> Vec<String> {
        let registry = TypeRegistry::with_core_types();
        let mut input = BinaryInput::new(bytes, &registry).unwrap();
        let input: &mut dyn Input = &mut input;
        fields.iter().map(|field| input.read_node(field).unwrap().unwrap().name().to_string()).collect()
    }

    #[test]
    fn test_dropped_objects_are_not_aliased() {
        let mut output = BinaryOutput::new();
        write_temporary(&mut output, "x", "first");
        write_temporary(&mut output, "y", "second");
        write_borrowed(&mut output, "z", "third");
        write_borrowed(&mut output, "w", "fourth");
        let bytes = output.finish();

        assert_eq!(read_names(&bytes, &["x", "y", "z", "w"]), ["first", "second", "third", "fourth"]);
    }

    #[test]
    fn test_writer_reader_roundtrip() {
        let registry = TypeRegistry::with_core_types();
        let mut group = MaskGroup::new("root");
        group.add_child(0x3, Arc::new(Group::new("a")));

        let mut file = Cursor::new(Vec::new());
        to_writer(&mut file, &group).unwrap();
        assert_eq!(&file.get_ref()[..4], &MAGIC);

        file.set_position(0);
        let read = from_reader(&mut file, &registry).unwrap().unwrap();
        let read = read.downcast_ref::<MaskGroup>().unwrap();
        assert_eq!(read.base.name, "root");
        assert_eq!(read.children()[0].mask, 0x3);
    }

    #[test]
    fn test_invalid_header() {
        let registry = TypeRegistry::with_core_types();
        assert!(matches!(from_bytes(b"VST", &registry), Err(IoError::InvalidData(_))));
        assert!(matches!(from_bytes(b"ABCD\x01\x00\x00\x00", &registry), Err(IoError::InvalidData(_))));
        assert!(matches!(from_bytes(b"VSTB\x02\x00\x00\x00", &registry), Err(IoError::InvalidData(_))));
    }

    #[test]
    fn test_body_length_past_end() {
        let registry = TypeRegistry::with_core_types();
        let mut bytes = to_bytes(&Group::new("root")).unwrap();
        // 截掉最后一个字节，body 长度超出了文档
        bytes.pop();
        let err = from_bytes(&bytes, &registry).unwrap_err();
        assert!(matches!(err, IoError::UnexpectedEnd { ref name } if name == "root"));
    }
}
