//! Self-describing typed values for the bus wire format.
//!
//! - [`Value`]: closed set of runtime values with a binary codec and a
//!   derived [`Signature`].
//! - [`Signature`]: textual type grammar, e.g. `[s]` or `(is)<Pair,count,label>`.
//! - [`CapabilityMap`]: ordered string-to-value map exchanged during the
//!   authentication handshake.
//! - [`ValueGenerator`]: seedable producer of arbitrary conforming values for
//!   fuzzing.
//! - [`samples`]: reference capability maps.
//!
//! ```
//! use busprobe_value::{CapabilityMap, Value};
//!
//! let mut map = CapabilityMap::with_credentials("nao", "nao");
//! map.insert("MessageFlags", true);
//!
//! let decoded = CapabilityMap::decode(&map.encode()).unwrap();
//! assert_eq!(decoded.get("MessageFlags"), Some(&Value::Bool(true)));
//! ```

pub mod capability;
mod codec;
pub mod error;
pub mod generator;
pub mod name;
pub mod object;
pub mod samples;
pub mod signature;
pub mod value;

pub use capability::CapabilityMap;
pub use codec::MAX_ZERO_SIZE_ELEMENTS;
pub use error::{DecodeError, Result, ValueError};
pub use generator::{GeneratorConfig, ValueGenerator};
pub use name::{is_valid_name, sanitize_name};
pub use object::{MetaMember, MetaMethod, MetaObject, ObjectReference};
pub use signature::{Signature, StructSignature, MAX_DEPTH};
pub use value::{Field, ListValue, OpaqueValue, StructValue, Value, DYNAMIC_SIGNATURE};
