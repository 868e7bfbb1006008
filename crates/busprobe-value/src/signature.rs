//! Textual type signatures.
//!
//! | Code | Type |
//! |------|------|
//! | `b` | bool |
//! | `c` / `C` | int8 / uint8 |
//! | `w` / `W` | int16 / uint16 |
//! | `i` / `I` | int32 / uint32 |
//! | `l` / `L` | int64 / uint64 |
//! | `f` | float32 |
//! | `s` | string |
//! | `v` | void |
//! | `m` | dynamic: a signature string followed by a value of that signature |
//! | `o` | object reference |
//! | `[X]` | list of `X` |
//! | `(XY…)<Name,x,y,…>` | struct named `Name` with fields `x: X`, `y: Y`, … |

use std::fmt;
use std::str::FromStr;

use crate::error::{DecodeError, Result};
use crate::name::is_valid_name;

/// Maximum nesting of lists, structs and dynamic values.
pub const MAX_DEPTH: usize = 64;

/// Parsed signature tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Signature {
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    String,
    Void,
    Dynamic,
    Object,
    List(Box<Signature>),
    Struct(StructSignature),
}

/// Signature of a named struct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructSignature {
    pub name: String,
    pub fields: Vec<(String, Signature)>,
}

impl Signature {
    /// All fixed-shape codes, in code order. Used by generators and tests.
    pub const SCALARS: [Signature; 12] = [
        Signature::Bool,
        Signature::Int8,
        Signature::Uint8,
        Signature::Int16,
        Signature::Uint16,
        Signature::Int32,
        Signature::Uint32,
        Signature::Int64,
        Signature::Uint64,
        Signature::Float32,
        Signature::String,
        Signature::Void,
    ];

    /// Parse a complete signature string.
    pub fn parse(text: &str) -> Result<Self> {
        let mut parser = Parser {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        };
        let signature = parser.parse_one(0)?;
        if parser.pos != parser.bytes.len() {
            return Err(parser.error(format!(
                "unexpected '{}' at offset {}",
                parser.bytes[parser.pos] as char, parser.pos
            )));
        }
        Ok(signature)
    }

    /// Single-character code of a scalar signature.
    fn code(&self) -> Option<char> {
        Some(match self {
            Self::Bool => 'b',
            Self::Int8 => 'c',
            Self::Uint8 => 'C',
            Self::Int16 => 'w',
            Self::Uint16 => 'W',
            Self::Int32 => 'i',
            Self::Uint32 => 'I',
            Self::Int64 => 'l',
            Self::Uint64 => 'L',
            Self::Float32 => 'f',
            Self::String => 's',
            Self::Void => 'v',
            Self::Dynamic => 'm',
            Self::Object => 'o',
            Self::List(_) | Self::Struct(_) => return None,
        })
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            b'b' => Self::Bool,
            b'c' => Self::Int8,
            b'C' => Self::Uint8,
            b'w' => Self::Int16,
            b'W' => Self::Uint16,
            b'i' => Self::Int32,
            b'I' => Self::Uint32,
            b'l' => Self::Int64,
            b'L' => Self::Uint64,
            b'f' => Self::Float32,
            b's' => Self::String,
            b'v' => Self::Void,
            b'm' => Self::Dynamic,
            b'o' => Self::Object,
            _ => return None,
        })
    }

    /// Lower bound on the encoded size of any value with this signature.
    pub fn min_encoded_size(&self) -> usize {
        match self {
            Self::Void => 0,
            Self::Bool | Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Int64 | Self::Uint64 => 8,
            Self::String | Self::List(_) => 4,
            // Length prefix plus at least one signature code.
            Self::Dynamic => 5,
            // Meta-object flag, service id, object id.
            Self::Object => 9,
            Self::Struct(s) => s.fields.iter().map(|(_, f)| f.min_encoded_size()).sum(),
        }
    }

    /// Returns true for signatures with no nested signature.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::List(_) | Self::Struct(_))
    }
}

impl FromStr for Signature {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(element) => write!(f, "[{element}]"),
            Self::Struct(s) => write!(f, "{s}"),
            scalar => match scalar.code() {
                Some(code) => write!(f, "{code}"),
                None => Ok(()),
            },
        }
    }
}

impl fmt::Display for StructSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (_, field) in &self.fields {
            write!(f, "{field}")?;
        }
        write!(f, ")<{}", self.name)?;
        for (name, _) in &self.fields {
            write!(f, ",{name}")?;
        }
        f.write_str(">")
    }
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::InvalidSignature {
            signature: self.text.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        match self.peek() {
            Some(b) if b == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(self.error(format!(
                "expected '{}' at offset {}, found '{}'",
                byte as char, self.pos, b as char
            ))),
            None => Err(self.error(format!("expected '{}' at end", byte as char))),
        }
    }

    fn parse_one(&mut self, depth: usize) -> Result<Signature> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::DepthExceeded(MAX_DEPTH));
        }
        let code = self.peek().ok_or_else(|| self.error("empty signature"))?;
        match code {
            b'[' => {
                self.pos += 1;
                let element = self.parse_one(depth + 1)?;
                self.expect(b']')?;
                Ok(Signature::List(Box::new(element)))
            }
            b'(' => {
                self.pos += 1;
                let mut types = Vec::new();
                while self.peek() != Some(b')') {
                    if self.peek().is_none() {
                        return Err(self.error("unterminated struct"));
                    }
                    types.push(self.parse_one(depth + 1)?);
                }
                self.pos += 1;
                self.expect(b'<')?;
                let names = self.parse_names()?;
                if names.len() != types.len() + 1 {
                    return Err(self.error(format!(
                        "struct has {} fields but {} names",
                        types.len(),
                        names.len().saturating_sub(1)
                    )));
                }
                let mut names = names.into_iter();
                let name = names.next().unwrap_or_default();
                Ok(Signature::Struct(StructSignature {
                    name,
                    fields: names.zip(types).collect(),
                }))
            }
            other => {
                let signature = Signature::from_code(other).ok_or_else(|| {
                    self.error(format!(
                        "unknown code '{}' at offset {}",
                        other as char, self.pos
                    ))
                })?;
                self.pos += 1;
                Ok(signature)
            }
        }
    }

    /// Parse `Name,field,…>` (the opening `<` already consumed).
    fn parse_names(&mut self) -> Result<Vec<String>> {
        let start = self.pos;
        let end = self.bytes[start..]
            .iter()
            .position(|&b| b == b'>')
            .map(|offset| start + offset)
            .ok_or_else(|| self.error("unterminated struct annotation"))?;
        let annotation = self
            .text
            .get(start..end)
            .ok_or_else(|| self.error("struct annotation is not valid text"))?;
        let names: Vec<String> = annotation.split(',').map(str::to_string).collect();
        if let Some(bad) = names.iter().find(|name| !is_valid_name(name)) {
            return Err(self.error(format!("invalid identifier '{bad}'")));
        }
        self.pos = end + 1;
        Ok(names)
    }
}
