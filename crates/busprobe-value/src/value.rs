use std::fmt;
use std::io;

use bytes::{Bytes, BytesMut};

use crate::codec::{read_string, read_value, write_string, write_value, ZeroSizeBudget};
use crate::error::{DecodeError, Result, ValueError};
use crate::name::is_valid_name;
use crate::object::ObjectReference;
use crate::signature::Signature;

/// Signature carried by dynamic values.
pub const DYNAMIC_SIGNATURE: &str = "m";

/// A runtime value of the bus type system.
///
/// Every variant except [`Value::Opaque`] derives its signature from its
/// structure; an opaque value carries its signature explicitly.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Uint8(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float32(f32),
    String(String),
    Void,
    List(ListValue),
    Struct(StructValue),
    Object(ObjectReference),
    Opaque(OpaqueValue),
}

/// Homogeneous list. The element signature is kept so that empty lists
/// still have a signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ListValue {
    element: Signature,
    items: Vec<Value>,
}

/// Named struct with ordered, named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    name: String,
    fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

/// A dynamic value kept in encoded form: the inner signature string
/// followed by the inner value.
///
/// Only [`Value::dynamic`] and the decoder build one, so the bytes always
/// match the signature and the value survives an encode/decode round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueValue {
    signature: String,
    bytes: Bytes,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (Int8(a), Int8(b)) => a == b,
            (Uint8(a), Uint8(b)) => a == b,
            (Int16(a), Int16(b)) => a == b,
            (Uint16(a), Uint16(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Uint32(a), Uint32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Uint64(a), Uint64(b)) => a == b,
            // Bitwise, so that NaN payloads compare equal after a round trip.
            (Float32(a), Float32(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) => a == b,
            (Void, Void) => true,
            (List(a), List(b)) => a == b,
            (Struct(a), Struct(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (Opaque(a), Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Derive the signature string of this value.
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.write_signature(&mut out);
        out
    }

    fn write_signature(&self, out: &mut String) {
        let code = match self {
            Value::Bool(_) => 'b',
            Value::Int8(_) => 'c',
            Value::Uint8(_) => 'C',
            Value::Int16(_) => 'w',
            Value::Uint16(_) => 'W',
            Value::Int32(_) => 'i',
            Value::Uint32(_) => 'I',
            Value::Int64(_) => 'l',
            Value::Uint64(_) => 'L',
            Value::Float32(_) => 'f',
            Value::String(_) => 's',
            Value::Void => 'v',
            Value::Object(_) => 'o',
            Value::List(list) => {
                out.push('[');
                out.push_str(&list.element.to_string());
                out.push(']');
                return;
            }
            Value::Struct(s) => {
                out.push('(');
                for field in &s.fields {
                    field.value.write_signature(out);
                }
                out.push_str(")<");
                out.push_str(&s.name);
                for field in &s.fields {
                    out.push(',');
                    out.push_str(&field.name);
                }
                out.push('>');
                return;
            }
            Value::Opaque(opaque) => {
                out.push_str(&opaque.signature);
                return;
            }
        };
        out.push(code);
    }

    /// Encode into a standalone buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Append the encoding to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        write_value(self, dst);
    }

    /// Encode into an arbitrary sink. Sink errors propagate unchanged.
    pub fn write<W: io::Write>(&self, sink: &mut W) -> io::Result<()> {
        sink.write_all(&self.encode())
    }

    /// Decode a complete buffer as one value of shape `signature`.
    ///
    /// Fails when the buffer is shorter than the signature requires or
    /// when bytes remain after the value.
    pub fn decode(signature: &str, bytes: &[u8]) -> Result<Self> {
        Self::decode_with(&Signature::parse(signature)?, bytes)
    }

    /// Like [`Value::decode`] with an already parsed signature.
    pub fn decode_with(signature: &Signature, bytes: &[u8]) -> Result<Self> {
        let mut src = bytes;
        let value = read_value(signature, &mut src, 0, &mut ZeroSizeBudget::new())?;
        if !src.is_empty() {
            return Err(DecodeError::TrailingBytes(src.len()));
        }
        Ok(value)
    }

    /// Wrap a value into its dynamic form: signature string plus encoding.
    pub fn dynamic(inner: &Value) -> Self {
        let mut buf = BytesMut::new();
        write_string(&mut buf, &inner.signature());
        inner.write_to(&mut buf);
        Value::Opaque(OpaqueValue::dynamic(buf.freeze()))
    }

    /// Decode the value wrapped by a dynamic value. Any other value is
    /// returned as is.
    pub fn resolve_dynamic(&self) -> Result<Value> {
        let Value::Opaque(opaque) = self else {
            return Ok(self.clone());
        };
        let mut src: &[u8] = &opaque.bytes;
        let signature = Signature::parse(&read_string(&mut src)?)?;
        Value::decode_with(&signature, src)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer content as an unsigned number.
    ///
    /// Signed integers are reinterpreted as the unsigned integer of the
    /// same width, so `Int32(3)` and `Uint32(3)` both give 3 and `Int8(-1)`
    /// gives 255.
    pub fn as_unsigned(&self) -> Option<u64> {
        match *self {
            Value::Int8(v) => Some(u64::from(v as u8)),
            Value::Uint8(v) => Some(u64::from(v)),
            Value::Int16(v) => Some(u64::from(v as u16)),
            Value::Uint16(v) => Some(u64::from(v)),
            Value::Int32(v) => Some(u64::from(v as u32)),
            Value::Uint32(v) => Some(u64::from(v)),
            Value::Int64(v) => Some(v as u64),
            Value::Uint64(v) => Some(v),
            _ => None,
        }
    }
}

impl ListValue {
    /// Build a list, checking every item against the element signature.
    pub fn new(element: Signature, items: Vec<Value>) -> std::result::Result<Self, ValueError> {
        let expected = element.to_string();
        for (index, item) in items.iter().enumerate() {
            let found = item.signature();
            if found != expected {
                return Err(ValueError::ElementMismatch {
                    index,
                    expected,
                    found,
                });
            }
        }
        Ok(Self { element, items })
    }

    pub fn empty(element: Signature) -> Self {
        Self {
            element,
            items: Vec::new(),
        }
    }

    pub(crate) fn from_parts(element: Signature, items: Vec<Value>) -> Self {
        Self { element, items }
    }

    pub fn element(&self) -> &Signature {
        &self.element
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }
}

impl StructValue {
    /// Build a struct, checking the type name and every field name.
    pub fn new(
        name: impl Into<String>,
        fields: Vec<Field>,
    ) -> std::result::Result<Self, ValueError> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(ValueError::InvalidName(name));
        }
        if let Some(field) = fields.iter().find(|f| !is_valid_name(&f.name)) {
            return Err(ValueError::InvalidName(field.name.clone()));
        }
        Ok(Self { name, fields })
    }

    pub(crate) fn from_parts(name: String, fields: Vec<Field>) -> Self {
        Self { name, fields }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// First field named `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl OpaqueValue {
    pub(crate) fn dynamic(bytes: Bytes) -> Self {
        Self {
            signature: DYNAMIC_SIGNATURE.to_string(),
            bytes,
        }
    }

    /// Signature of the opaque value itself, always `m`.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Complete encoding, inner signature string included.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f32 => Float32,
    String => String,
    ListValue => List,
    StructValue => Struct,
    ObjectReference => Object,
    OpaqueValue => Opaque,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Uint8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Uint16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Uint32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Uint64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Void => f.write_str("void"),
            Value::List(list) => {
                f.write_str("[")?;
                for (i, item) in list.items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Struct(s) => {
                write!(f, "{} {{", s.name)?;
                for (i, field) in s.fields.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{sep}{}: {}", field.name, field.value)?;
                }
                f.write_str(" }")
            }
            Value::Object(object) => {
                write!(f, "object({}, {})", object.service_id, object.object_id)
            }
            Value::Opaque(opaque) => match self.resolve_dynamic() {
                Ok(inner) => write!(f, "dynamic<{}>({inner})", inner.signature()),
                Err(_) => write!(f, "dynamic({} bytes)", opaque.bytes.len()),
            },
        }
    }
}
