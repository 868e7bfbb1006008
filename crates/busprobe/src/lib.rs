//! Audit toolkit for the authentication handshake of RPC bus peers.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP and Unix socket dial/listen
//! - [`frame`]: message header and streaming codec
//! - [`value`]: typed values, signatures, capability maps and the random
//!   value generator
//! - [`peer`]: reply correlation, handshake, test peer and probes

/// Re-export transport types.
pub mod transport {
    pub use busprobe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use busprobe_frame::*;
}

/// Re-export value types.
pub mod value {
    pub use busprobe_value::*;
}

/// Re-export peer types.
pub mod peer {
    pub use busprobe_peer::*;
}
