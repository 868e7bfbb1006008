use bytes::BufMut;

use crate::codec::{put_len, read_bool, read_string, read_u32, write_string, Cursor};
use crate::error::Result;

/// Reference to a remote object, optionally with its interface description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectReference {
    /// Present when the sender chose to describe the object inline.
    pub meta_object: Option<MetaObject>,
    pub service_id: u32,
    pub object_id: u32,
}

/// Interface description of a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetaObject {
    pub methods: Vec<MetaMethod>,
    pub signals: Vec<MetaMember>,
    pub properties: Vec<MetaMember>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetaMethod {
    pub uid: u32,
    pub return_signature: String,
    pub name: String,
    pub parameters_signature: String,
    pub description: String,
}

/// A signal or property: both are described by uid, name and signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetaMember {
    pub uid: u32,
    pub name: String,
    pub signature: String,
}

impl ObjectReference {
    pub fn new(service_id: u32, object_id: u32) -> Self {
        Self {
            meta_object: None,
            service_id,
            object_id,
        }
    }

    pub(crate) fn write_to<B: BufMut>(&self, dst: &mut B) {
        match &self.meta_object {
            Some(meta) => {
                dst.put_u8(1);
                meta.write_to(dst);
            }
            None => dst.put_u8(0),
        }
        dst.put_u32_le(self.service_id);
        dst.put_u32_le(self.object_id);
    }

    pub(crate) fn read_from(src: &mut Cursor<'_>) -> Result<Self> {
        let meta_object = if read_bool(src)? {
            Some(MetaObject::read_from(src)?)
        } else {
            None
        };
        Ok(Self {
            meta_object,
            service_id: read_u32(src)?,
            object_id: read_u32(src)?,
        })
    }
}

impl MetaObject {
    fn write_to<B: BufMut>(&self, dst: &mut B) {
        put_len(dst, self.methods.len());
        for method in &self.methods {
            dst.put_u32_le(method.uid);
            write_string(dst, &method.return_signature);
            write_string(dst, &method.name);
            write_string(dst, &method.parameters_signature);
            write_string(dst, &method.description);
        }
        for members in [&self.signals, &self.properties] {
            put_len(dst, members.len());
            for member in members {
                dst.put_u32_le(member.uid);
                write_string(dst, &member.name);
                write_string(dst, &member.signature);
            }
        }
        write_string(dst, &self.description);
    }

    fn read_from(src: &mut Cursor<'_>) -> Result<Self> {
        // uid + four empty strings
        let count = read_count(src, 20)?;
        let mut methods = Vec::with_capacity(count);
        for _ in 0..count {
            methods.push(MetaMethod {
                uid: read_u32(src)?,
                return_signature: read_string(src)?,
                name: read_string(src)?,
                parameters_signature: read_string(src)?,
                description: read_string(src)?,
            });
        }
        let signals = read_members(src)?;
        let properties = read_members(src)?;
        Ok(Self {
            methods,
            signals,
            properties,
            description: read_string(src)?,
        })
    }
}

fn read_members(src: &mut Cursor<'_>) -> Result<Vec<MetaMember>> {
    // uid + two empty strings
    let count = read_count(src, 12)?;
    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        members.push(MetaMember {
            uid: read_u32(src)?,
            name: read_string(src)?,
            signature: read_string(src)?,
        });
    }
    Ok(members)
}

fn read_count(src: &mut Cursor<'_>, min_entry_size: usize) -> Result<usize> {
    let count = read_u32(src)? as usize;
    crate::codec::check_count(count, min_entry_size, src.len())?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::error::DecodeError;

    fn described() -> ObjectReference {
        ObjectReference {
            meta_object: Some(MetaObject {
                methods: vec![MetaMethod {
                    uid: 100,
                    return_signature: "b".into(),
                    name: "authenticate".into(),
                    parameters_signature: "({sm})".into(),
                    description: "check credentials".into(),
                }],
                signals: vec![MetaMember {
                    uid: 101,
                    name: "serviceAdded".into(),
                    signature: "(Is)".into(),
                }],
                properties: vec![],
                description: "directory".into(),
            }),
            service_id: 1,
            object_id: 1,
        }
    }

    #[test]
    fn bare_reference_layout() {
        let mut buf = BytesMut::new();
        ObjectReference::new(7, 9).write_to(&mut buf);
        assert_eq!(buf.as_ref(), &[0, 7, 0, 0, 0, 9, 0, 0, 0]);
    }

    #[test]
    fn described_reference_roundtrip() {
        let object = described();
        let mut buf = BytesMut::new();
        object.write_to(&mut buf);
        let mut src: &[u8] = &buf;
        assert_eq!(ObjectReference::read_from(&mut src).unwrap(), object);
        assert!(src.is_empty());
    }

    #[test]
    fn absurd_method_count_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_u32_le(u32::MAX);
        let mut src: &[u8] = &buf;
        assert!(matches!(
            ObjectReference::read_from(&mut src),
            Err(DecodeError::LengthOverflow { .. })
        ));
    }
}
