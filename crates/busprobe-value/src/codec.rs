//! Binary encoding of values.
//!
//! All integers are little-endian. Strings and lists carry a `u32` length
//! prefix; structs are the plain concatenation of their fields; a dynamic
//! value is a signature string followed by a value of that signature.

use bytes::{Buf, BufMut, Bytes};

use crate::error::{DecodeError, Result};
use crate::object::ObjectReference;
use crate::signature::{Signature, MAX_DEPTH};
use crate::value::{Field, ListValue, OpaqueValue, StructValue, Value};

/// Read position within an encoded buffer.
pub(crate) type Cursor<'a> = &'a [u8];

/// Upper bound on the number of list elements that encode to no bytes at all
/// (`[v]`, `[()<E>]`), which the remaining length cannot bound. The bound
/// holds across one whole decode, nested lists included.
pub const MAX_ZERO_SIZE_ELEMENTS: usize = 65_536;

/// Decode-wide allowance of zero-size list elements.
#[derive(Debug)]
pub(crate) struct ZeroSizeBudget {
    left: usize,
}

impl ZeroSizeBudget {
    pub(crate) fn new() -> Self {
        Self {
            left: MAX_ZERO_SIZE_ELEMENTS,
        }
    }

    fn spend(&mut self, count: usize) -> Result<()> {
        if count > self.left {
            return Err(DecodeError::LengthOverflow {
                declared: count,
                remaining: self.left,
            });
        }
        self.left -= count;
        Ok(())
    }
}

fn ensure(src: &Cursor<'_>, needed: usize) -> Result<()> {
    if src.len() < needed {
        return Err(DecodeError::Truncated {
            needed,
            available: src.len(),
        });
    }
    Ok(())
}

pub(crate) fn read_u8(src: &mut Cursor<'_>) -> Result<u8> {
    ensure(src, 1)?;
    Ok(src.get_u8())
}

pub(crate) fn read_bool(src: &mut Cursor<'_>) -> Result<bool> {
    Ok(read_u8(src)? != 0)
}

pub(crate) fn read_u32(src: &mut Cursor<'_>) -> Result<u32> {
    ensure(src, 4)?;
    Ok(src.get_u32_le())
}

pub(crate) fn read_string(src: &mut Cursor<'_>) -> Result<String> {
    let len = read_u32(src)? as usize;
    if len > src.len() {
        return Err(DecodeError::LengthOverflow {
            declared: len,
            remaining: src.len(),
        });
    }
    let text = std::str::from_utf8(&src[..len])
        .map_err(|_| DecodeError::InvalidUtf8)?
        .to_string();
    src.advance(len);
    Ok(text)
}

/// Length prefix of a string, list or map.
///
/// Lengths above `u32::MAX` have no encoding. They are written as
/// `u32::MAX`, which no decoder accepts, so an oversized value fails to
/// decode instead of misframing whatever follows it.
pub(crate) fn put_len<B: BufMut>(dst: &mut B, len: usize) {
    dst.put_u32_le(u32::try_from(len).unwrap_or(u32::MAX));
}

pub(crate) fn write_string<B: BufMut>(dst: &mut B, text: &str) {
    put_len(dst, text.len());
    dst.put_slice(text.as_bytes());
}

/// Reject element counts the remaining bytes cannot possibly hold.
///
/// `min_size` must be non-zero; zero-size elements go through
/// [`ZeroSizeBudget`].
pub(crate) fn check_count(count: usize, min_size: usize, remaining: usize) -> Result<()> {
    if count.saturating_mul(min_size.max(1)) <= remaining {
        Ok(())
    } else {
        Err(DecodeError::LengthOverflow {
            declared: count,
            remaining,
        })
    }
}

/// Decode one value of shape `signature`, advancing `src` past it.
pub(crate) fn read_value(
    signature: &Signature,
    src: &mut Cursor<'_>,
    depth: usize,
    budget: &mut ZeroSizeBudget,
) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::DepthExceeded(MAX_DEPTH));
    }
    let value = match signature {
        Signature::Bool => Value::Bool(read_bool(src)?),
        Signature::Int8 => Value::Int8(read_u8(src)? as i8),
        Signature::Uint8 => Value::Uint8(read_u8(src)?),
        Signature::Int16 => {
            ensure(src, 2)?;
            Value::Int16(src.get_i16_le())
        }
        Signature::Uint16 => {
            ensure(src, 2)?;
            Value::Uint16(src.get_u16_le())
        }
        Signature::Int32 => {
            ensure(src, 4)?;
            Value::Int32(src.get_i32_le())
        }
        Signature::Uint32 => Value::Uint32(read_u32(src)?),
        Signature::Int64 => {
            ensure(src, 8)?;
            Value::Int64(src.get_i64_le())
        }
        Signature::Uint64 => {
            ensure(src, 8)?;
            Value::Uint64(src.get_u64_le())
        }
        Signature::Float32 => {
            ensure(src, 4)?;
            Value::Float32(f32::from_bits(src.get_u32_le()))
        }
        Signature::String => Value::String(read_string(src)?),
        Signature::Void => Value::Void,
        Signature::Object => Value::Object(ObjectReference::read_from(src)?),
        Signature::Dynamic => {
            let start: &[u8] = *src;
            let text = read_string(src)?;
            let inner = Signature::parse(&text)?;
            read_value(&inner, src, depth + 1, budget)?;
            let consumed = start.len() - src.len();
            Value::Opaque(OpaqueValue::dynamic(Bytes::copy_from_slice(
                &start[..consumed],
            )))
        }
        Signature::List(element) => {
            let count = read_u32(src)? as usize;
            match element.min_encoded_size() {
                0 => budget.spend(count)?,
                min_size => check_count(count, min_size, src.len())?,
            }
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_value(element, src, depth + 1, budget)?);
            }
            Value::List(ListValue::from_parts((**element).clone(), items))
        }
        Signature::Struct(shape) => {
            let mut fields = Vec::with_capacity(shape.fields.len());
            for (name, field) in &shape.fields {
                fields.push(Field {
                    name: name.clone(),
                    value: read_value(field, src, depth + 1, budget)?,
                });
            }
            Value::Struct(StructValue::from_parts(shape.name.clone(), fields))
        }
    };
    Ok(value)
}

/// Append the encoding of `value` to `dst`.
pub(crate) fn write_value<B: BufMut>(value: &Value, dst: &mut B) {
    match value {
        Value::Bool(v) => dst.put_u8(u8::from(*v)),
        Value::Int8(v) => dst.put_i8(*v),
        Value::Uint8(v) => dst.put_u8(*v),
        Value::Int16(v) => dst.put_i16_le(*v),
        Value::Uint16(v) => dst.put_u16_le(*v),
        Value::Int32(v) => dst.put_i32_le(*v),
        Value::Uint32(v) => dst.put_u32_le(*v),
        Value::Int64(v) => dst.put_i64_le(*v),
        Value::Uint64(v) => dst.put_u64_le(*v),
        Value::Float32(v) => dst.put_u32_le(v.to_bits()),
        Value::String(v) => write_string(dst, v),
        Value::Void => {}
        Value::List(list) => {
            put_len(dst, list.items().len());
            for item in list.items() {
                write_value(item, dst);
            }
        }
        Value::Struct(s) => {
            for field in s.fields() {
                write_value(&field.value, dst);
            }
        }
        Value::Object(object) => object.write_to(dst),
        Value::Opaque(opaque) => dst.put_slice(opaque.bytes()),
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    fn decode(signature: &str, bytes: &[u8]) -> Result<Value> {
        let signature = Signature::parse(signature)?;
        let mut src = bytes;
        read_value(&signature, &mut src, 0, &mut ZeroSizeBudget::new())
    }

    #[test]
    fn scalar_layouts() {
        let cases: [(Value, &[u8]); 8] = [
            (Value::Bool(true), &[1]),
            (Value::Int8(-1), &[0xff]),
            (Value::Int16(-2), &[0xfe, 0xff]),
            (Value::Uint32(888), &[0x78, 0x03, 0, 0]),
            (Value::Int64(1), &[1, 0, 0, 0, 0, 0, 0, 0]),
            (Value::Float32(1.0), &[0, 0, 0x80, 0x3f]),
            (Value::String("nao".into()), &[3, 0, 0, 0, b'n', b'a', b'o']),
            (Value::Void, &[]),
        ];
        for (value, expected) in cases {
            let mut buf = BytesMut::new();
            write_value(&value, &mut buf);
            assert_eq!(buf.as_ref(), expected, "{value:?}");
        }
    }

    #[test]
    fn any_nonzero_byte_is_true() {
        assert_eq!(decode("b", &[0x7f]).unwrap(), Value::Bool(true));
        assert_eq!(decode("b", &[0]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn string_length_past_end_overflows() {
        let err = decode("s", &[10, 0, 0, 0, b'a']).unwrap_err();
        assert_eq!(
            err,
            DecodeError::LengthOverflow {
                declared: 10,
                remaining: 1
            }
        );
    }

    #[test]
    fn oversized_length_prefix_saturates_and_never_decodes() {
        let mut buf = BytesMut::new();
        put_len(&mut buf, usize::MAX);
        assert_eq!(buf.as_ref(), &u32::MAX.to_le_bytes());
        buf.put_slice(b"abc");
        assert!(matches!(
            decode("s", &buf),
            Err(DecodeError::LengthOverflow { .. })
        ));
        assert!(matches!(
            decode("[b]", &buf),
            Err(DecodeError::LengthOverflow { .. })
        ));

        let mut buf = BytesMut::new();
        put_len(&mut buf, 3);
        assert_eq!(buf.as_ref(), &[3, 0, 0, 0]);
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        assert_eq!(
            decode("s", &[2, 0, 0, 0, 0xc3, 0x28]).unwrap_err(),
            DecodeError::InvalidUtf8
        );
    }

    #[test]
    fn list_count_is_bounded_by_remaining_bytes() {
        let err = decode("[I]", &[3, 0, 0, 0, 1, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, DecodeError::LengthOverflow { declared: 3, .. }));
    }

    #[test]
    fn zero_size_lists_are_capped() {
        let ok = decode("[v]", &[3, 0, 0, 0]).unwrap();
        assert_eq!(ok.signature(), "[v]");
        let err = decode("[v]", &u32::MAX.to_le_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::LengthOverflow { .. }));
    }

    fn nested_zero_size_lists(outer: u32, inner: u32) -> Vec<u8> {
        let mut bytes = outer.to_le_bytes().to_vec();
        for _ in 0..outer {
            bytes.extend_from_slice(&inner.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn zero_size_cap_spans_nested_lists() {
        let within = nested_zero_size_lists(2, (MAX_ZERO_SIZE_ELEMENTS / 2) as u32);
        assert!(decode("[[v]]", &within).is_ok());

        let bytes = nested_zero_size_lists(64, MAX_ZERO_SIZE_ELEMENTS as u32);
        let err = decode("[[v]]", &bytes).unwrap_err();
        assert_eq!(
            err,
            DecodeError::LengthOverflow {
                declared: MAX_ZERO_SIZE_ELEMENTS,
                remaining: 0
            }
        );
        let err = decode("[[()<Empty>]]", &bytes).unwrap_err();
        assert!(matches!(err, DecodeError::LengthOverflow { .. }));
    }

    #[test]
    fn dynamic_keeps_signature_and_payload_bytes() {
        let bytes = [1, 0, 0, 0, b'I', 0x78, 0x03, 0, 0];
        let value = decode("m", &bytes).unwrap();
        let Value::Opaque(opaque) = &value else {
            panic!("expected opaque, got {value:?}");
        };
        assert_eq!(opaque.signature(), "m");
        assert_eq!(opaque.bytes().as_ref(), &bytes);
        assert_eq!(value.resolve_dynamic().unwrap(), Value::Uint32(888));
    }

    #[test]
    fn dynamic_with_bad_inner_signature_fails() {
        let err = decode("m", &[1, 0, 0, 0, b'x']).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidSignature { .. }));
    }

    #[test]
    fn nested_dynamic_depth_is_limited() {
        let mut bytes = Vec::new();
        for _ in 0..=MAX_DEPTH + 1 {
            bytes.extend_from_slice(&[1, 0, 0, 0, b'm']);
        }
        let err = decode("m", &bytes).unwrap_err();
        assert_eq!(err, DecodeError::DepthExceeded(MAX_DEPTH));
    }
}
