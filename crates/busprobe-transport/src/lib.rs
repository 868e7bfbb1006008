//! Async stream transport for busprobe.
//!
//! Provides dial/listen over the address schemes a bus peer exposes:
//! - `tcp://host:port`
//! - `unix:///path/to/socket` (Unix only)
//!
//! This is the lowest layer of busprobe. Everything else builds on top of
//! the [`Connection`] type provided here. Encrypted schemes (`tcps://`) are
//! recognized and rejected.

pub mod address;
pub mod connection;
pub mod error;
pub mod listener;

pub use address::Address;
pub use connection::{connect, BoxedReader, BoxedWriter, Connection};
pub use error::{Result, TransportError};
pub use listener::Listener;
