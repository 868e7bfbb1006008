//! Talking to bus peers.
//!
//! [`Endpoint`] correlates replies with requests over one connection. On top
//! of it sit the authentication handshake, connectors, a credential-checking
//! test peer and the probes used to audit a peer's access control.

pub mod bulk;
pub mod connector;
pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod probe;

pub use bulk::{test_credentials, BulkConfig, BulkReport};
pub use connector::{connect, connect_authenticated};
pub use endpoint::{
    error_description, error_payload, request_within, CloseReason, Endpoint, EndpointConfig,
    EndpointState, HandlerHandle, Verdict,
};
pub use error::{PeerError, Result};
pub use handshake::{
    authenticate_user, handshake, interpret_reply, send_auth_payload, AuthState, Credentials,
    FeatureFlags, HandshakeConfig, HandshakeOutcome,
};
pub use listener::{serve, AuthListener, ListenerConfig, StatusEncoding};
pub use probe::{
    await_reply, crafted_call, crafted_post, inject, probe, replay, run_scenario, InjectConfig,
    ProbeOutcome, ReplayOutcome, Scenario, ScenarioReport,
};
