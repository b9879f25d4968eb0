//! JSON 流
//!
//! 文档结构：
//!
//! ```json
//! {
//!   "format": "vesta", "version": 1,
//!   "fields": [
//!     { "name": "root", "kind": "object",
//!       "value": { "type": "vesta::MaskGroup", "id": 1, "fields": [ ... ] } }
//!   ]
//! }
//! ```
//!
//! 字段保存在数组中以保持顺序。空引用的 `value` 为 `null`，
//! 重复出现的对象写成 `{ "ref": id }`。

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, json};

use super::{Input, IoError, IoResult, Output, Value, ValueKind};
use crate::object::Object;
use crate::type_registry::TypeRegistry;

pub const FORMAT: &str = "vesta";
pub const VERSION: u64 = 1;

pub fn to_json_value(object: &dyn Object) -> IoResult<serde_json::Value> {
    let mut output = JsonOutput::new();
    output.write_root("root", object)?;
    Ok(output.finish())
}

pub fn to_json_string(object: &dyn Object, pretty: bool) -> IoResult<String> {
    let document = to_json_value(object)?;
    let text = if pretty { serde_json::to_string_pretty(&document)? } else { serde_json::to_string(&document)? };
    Ok(text)
}

pub fn from_json_value(document: serde_json::Value, registry: &TypeRegistry) -> IoResult<Option<Arc<dyn Object>>> {
    let mut input = JsonInput::new(document, registry)?;
    input.read_object("root")
}

pub fn from_json_str(text: &str, registry: &TypeRegistry) -> IoResult<Option<Arc<dyn Object>>> {
    from_json_value(serde_json::from_str(text)?, registry)
}

/// 非有限的浮点数在 JSON 中没有表示，写入时直接拒绝
fn float_to_json(name: &str, value: f64) -> IoResult<serde_json::Value> {
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .ok_or_else(|| IoError::InvalidData(format!("`{name}`: {value} cannot be represented in JSON")))
}

fn value_to_json(name: &str, value: Value) -> IoResult<serde_json::Value> {
    let json = match value {
        Value::Bool(v) => json!(v),
        Value::U8(v) => json!(v),
        Value::U16(v) => json!(v),
        Value::U32(v) => json!(v),
        Value::U64(v) => json!(v),
        Value::I32(v) => json!(v),
        Value::I64(v) => json!(v),
        Value::F32(v) => float_to_json(name, v as f64)?,
        Value::F64(v) => float_to_json(name, v)?,
        Value::String(v) => json!(v),
    };
    Ok(json)
}

fn value_from_json(name: &str, kind: ValueKind, json: &serde_json::Value) -> IoResult<Value> {
    fn unsigned<T: TryFrom<u64>>(json: &serde_json::Value) -> Option<T> {
        json.as_u64().and_then(|v| T::try_from(v).ok())
    }
    fn signed<T: TryFrom<i64>>(json: &serde_json::Value) -> Option<T> {
        json.as_i64().and_then(|v| T::try_from(v).ok())
    }

    let value = match kind {
        ValueKind::Bool => json.as_bool().map(Value::Bool),
        ValueKind::U8 => unsigned(json).map(Value::U8),
        ValueKind::U16 => unsigned(json).map(Value::U16),
        ValueKind::U32 => unsigned(json).map(Value::U32),
        ValueKind::U64 => unsigned(json).map(Value::U64),
        ValueKind::I32 => signed(json).map(Value::I32),
        ValueKind::I64 => signed(json).map(Value::I64),
        ValueKind::F32 => json.as_f64().map(|v| Value::F32(v as f32)),
        ValueKind::F64 => json.as_f64().map(Value::F64),
        ValueKind::String => json.as_str().map(|v| Value::String(v.to_string())),
        ValueKind::Object => None,
    };
    value.ok_or_else(|| IoError::InvalidData(format!("`{name}`: {json} is not a valid {kind}")))
}

pub struct JsonOutput {
    /// 每一层对象的字段数组，`frames[0]` 是文档根
    frames: Vec<Vec<serde_json::Value>>,

    /// `Arc` 地址 -> 对象 id
    object_ids: HashMap<usize, u32>,
    /// 持有所有登记过地址的对象，保证地址在输出结束前不会被复用
    retained: Vec<Arc<dyn Object>>,
    next_id: u32,
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonOutput {
    pub fn new() -> Self {
        Self {
            frames: vec![Vec::new()],
            object_ids: HashMap::new(),
            retained: Vec::new(),
            next_id: 1,
        }
    }

    /// 写入一个借用的顶层对象
    ///
    /// 借用的对象无法被流持有，所以它不参与引用共享：每次调用都写出完整的对象。
    pub fn write_root(&mut self, name: &str, object: &dyn Object) -> IoResult<()> {
        let id = self.allocate_id();
        self.write_new_object(name, id, object)
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn write_new_object(&mut self, name: &str, id: u32, object: &dyn Object) -> IoResult<()> {
        self.frames.push(Vec::new());
        let result = object.write(self);
        let fields = self.frames.pop().unwrap_or_default();
        result?;

        self.push_field(
            name,
            ValueKind::Object,
            json!({ "type": object.type_name(), "id": id, "fields": fields }),
        );
        Ok(())
    }

    pub fn finish(mut self) -> serde_json::Value {
        debug_assert!(self.frames.len() == 1, "unfinished object");
        let fields = self.frames.swap_remove(0);
        json!({ "format": FORMAT, "version": VERSION, "fields": fields })
    }

    fn push_field(&mut self, name: &str, kind: ValueKind, value: serde_json::Value) {
        let field = json!({ "name": name, "kind": kind.name(), "value": value });
        match self.frames.last_mut() {
            Some(frame) => frame.push(field),
            None => self.frames.push(vec![field]),
        }
    }
}

impl Output for JsonOutput {
    fn write_value(&mut self, name: &str, value: Value) -> IoResult<()> {
        let kind = value.kind();
        let json = value_to_json(name, value)?;
        self.push_field(name, kind, json);
        Ok(())
    }

    fn write_object(&mut self, name: &str, object: Option<&Arc<dyn Object>>) -> IoResult<()> {
        let Some(object) = object else {
            self.push_field(name, ValueKind::Object, serde_json::Value::Null);
            return Ok(());
        };

        let address = Arc::as_ptr(object) as *const () as usize;
        if let Some(&id) = self.object_ids.get(&address) {
            self.push_field(name, ValueKind::Object, json!({ "ref": id }));
            return Ok(());
        }

        let id = self.allocate_id();
        self.object_ids.insert(address, id);
        self.retained.push(object.clone());
        self.write_new_object(name, id, &**object)
    }
}

struct Frame {
    fields: Vec<serde_json::Value>,
    cursor: usize,
}

pub struct JsonInput<'a> {
    frames: Vec<Frame>,

    registry: &'a TypeRegistry,
    objects: HashMap<u32, Arc<dyn Object>>,
}

fn take_fields(map: &mut Map<String, serde_json::Value>, what: &str) -> IoResult<Vec<serde_json::Value>> {
    match map.remove("fields") {
        Some(serde_json::Value::Array(fields)) => Ok(fields),
        _ => Err(IoError::InvalidData(format!("{what}: missing `fields` array"))),
    }
}

impl<'a> JsonInput<'a> {
    pub fn new(document: serde_json::Value, registry: &'a TypeRegistry) -> IoResult<Self> {
        let serde_json::Value::Object(mut document) = document else {
            return Err(IoError::InvalidData("document is not a JSON object".to_string()));
        };
        if document.get("format").and_then(|v| v.as_str()) != Some(FORMAT) {
            return Err(IoError::InvalidData("missing vesta format tag".to_string()));
        }
        match document.get("version").and_then(|v| v.as_u64()) {
            Some(VERSION) => {}
            version => return Err(IoError::InvalidData(format!("unsupported json version {version:?}"))),
        }
        let fields = take_fields(&mut document, "document")?;

        Ok(Self {
            frames: vec![Frame { fields, cursor: 0 }],
            registry,
            objects: HashMap::new(),
        })
    }

    /// 取出当前对象的下一个字段，返回它的编码种类与值
    fn next_field(&mut self, name: &str) -> IoResult<(ValueKind, serde_json::Value)> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| IoError::UnexpectedEnd { name: name.to_string() })?;
        let field = frame
            .fields
            .get_mut(frame.cursor)
            .ok_or_else(|| IoError::UnexpectedEnd { name: name.to_string() })?
            .take();
        frame.cursor += 1;

        let serde_json::Value::Object(mut field) = field else {
            return Err(IoError::InvalidData(format!("`{name}`: field is not a JSON object")));
        };

        let stored = field.get("name").and_then(|v| v.as_str()).unwrap_or_default();
        if stored != name {
            return Err(IoError::FieldMismatch {
                expected: name.to_string(),
                found: stored.to_string(),
            });
        }
        let kind = field
            .get("kind")
            .and_then(|v| v.as_str())
            .and_then(ValueKind::from_name)
            .ok_or_else(|| IoError::InvalidData(format!("`{name}`: missing or unknown kind")))?;
        let value = field.remove("value").unwrap_or_default();

        Ok((kind, value))
    }
}

impl Input for JsonInput<'_> {
    fn read_value(&mut self, name: &str, kind: ValueKind) -> IoResult<Value> {
        let (found, value) = self.next_field(name)?;
        if found != kind || kind == ValueKind::Object {
            return Err(IoError::TypeMismatch {
                name: name.to_string(),
                expected: kind,
                found,
            });
        }
        value_from_json(name, kind, &value)
    }

    fn read_object(&mut self, name: &str) -> IoResult<Option<Arc<dyn Object>>> {
        let (found, value) = self.next_field(name)?;
        if found != ValueKind::Object {
            return Err(IoError::TypeMismatch {
                name: name.to_string(),
                expected: ValueKind::Object,
                found,
            });
        }

        let mut value = match value {
            serde_json::Value::Null => return Ok(None),
            serde_json::Value::Object(value) => value,
            _ => return Err(IoError::InvalidData(format!("`{name}`: object value is not a JSON object"))),
        };

        let invalid_id = || IoError::InvalidData(format!("`{name}`: invalid object id"));
        if let Some(id) = value.get("ref") {
            let id = id.as_u64().and_then(|id| u32::try_from(id).ok()).ok_or_else(invalid_id)?;
            return self.objects.get(&id).cloned().map(Some).ok_or(IoError::DanglingReference(id));
        }

        let id = value
            .get("id")
            .and_then(|id| id.as_u64())
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(invalid_id)?;
        let type_name = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| IoError::InvalidData(format!("`{name}`: missing object type")))?;

        let mut object = self.registry.create(type_name).ok_or_else(|| IoError::UnknownType {
            type_name: type_name.to_string(),
        })?;
        let fields = take_fields(&mut value, name)?;

        self.frames.push(Frame { fields, cursor: 0 });
        let result = object.read(self);
        // 没有被读到的尾部字段随 frame 一起丢弃
        self.frames.pop();
        result?;

        let object: Arc<dyn Object> = Arc::from(object);
        self.objects.insert(id, object.clone());
        Ok(Some(object))
    }

    fn remaining(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.fields.len().saturating_sub(frame.cursor))
    }
}
