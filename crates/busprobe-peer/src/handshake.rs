//! Authentication handshake.
//!
//! The client sends a Call to service 0, object 0, action 8 whose payload is
//! a capability map with the credentials and any feature flags. The peer
//! answers with a capability map carrying `__qi_auth_state`:
//!
//! | Status | State      | Meaning                                  |
//! |--------|------------|------------------------------------------|
//! | 1      | `Error`    | credentials rejected                     |
//! | 2      | `Continue` | another round expected (token renewal)   |
//! | 3      | `Done`     | authenticated                            |
//!
//! Peers disagree on whether the status is signed or unsigned, so both are
//! accepted and compared as the same-width unsigned bit pattern.

use std::fmt;
use std::time::Duration;

use busprobe_frame::{Header, Message, MessageKind};
use busprobe_value::capability::{
    CLIENT_SERVER_SOCKET_KEY, ERROR_REASON_KEY, MESSAGE_FLAGS_KEY, META_OBJECT_CACHE_KEY,
    NEW_TOKEN_KEY, REMOTE_CANCELABLE_CALLS_KEY, STATE_KEY,
};
use busprobe_value::CapabilityMap;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use crate::endpoint::{request_within, Endpoint};
use crate::error::{PeerError, Result};

pub const AUTH_SERVICE: u32 = 0;
pub const AUTH_OBJECT: u32 = 0;
pub const AUTH_ACTION: u32 = 8;

/// User name and token presented to the peer.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    /// Never logged; redacted in debug output.
    pub token: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field(
                "token",
                &format_args!("<redacted:{} bytes>", self.token.len()),
            )
            .finish()
    }
}

/// Optional feature flags announced during the handshake.
///
/// Only enabled flags are sent. Their effect is up to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    pub client_server_socket: bool,
    pub message_flags: bool,
    pub meta_object_cache: bool,
    pub remote_cancelable_calls: bool,
}

impl FeatureFlags {
    pub fn all() -> Self {
        Self {
            client_server_socket: true,
            message_flags: true,
            meta_object_cache: true,
            remote_cancelable_calls: true,
        }
    }

    /// Insert every enabled flag into `map` as `true`.
    pub fn apply(&self, map: &mut CapabilityMap) {
        let flags = [
            (CLIENT_SERVER_SOCKET_KEY, self.client_server_socket),
            (MESSAGE_FLAGS_KEY, self.message_flags),
            (META_OBJECT_CACHE_KEY, self.meta_object_cache),
            (REMOTE_CANCELABLE_CALLS_KEY, self.remote_cancelable_calls),
        ];
        for (key, enabled) in flags {
            if enabled {
                map.insert(key, true);
            }
        }
    }
}

/// Configuration for the handshake.
#[derive(Clone)]
pub struct HandshakeConfig {
    /// How long to wait for each reply. On expiry the endpoint is closed.
    pub timeout: Duration,
    pub features: FeatureFlags,
    /// Extra entries sent after the credentials and flags.
    pub extra: CapabilityMap,
    /// Rounds allowed by [`authenticate_user`] when the peer renews the token.
    pub max_rounds: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            features: FeatureFlags::default(),
            extra: CapabilityMap::new(),
            max_rounds: 2,
        }
    }
}

impl fmt::Debug for HandshakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeConfig")
            .field("timeout", &self.timeout)
            .field("features", &self.features)
            .field("extra", &format_args!("<{} entries>", self.extra.len()))
            .field("max_rounds", &self.max_rounds)
            .finish()
    }
}

/// Authentication state reported by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthState {
    Error = 1,
    Continue = 2,
    Done = 3,
}

impl AuthState {
    pub fn from_status(status: u64) -> Option<Self> {
        match status {
            1 => Some(AuthState::Error),
            2 => Some(AuthState::Continue),
            3 => Some(AuthState::Done),
            _ => None,
        }
    }

    pub fn status(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            AuthState::Error => "error",
            AuthState::Continue => "continue",
            AuthState::Done => "done",
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One handshake round: the interpreted state and the full reply map.
#[derive(Clone, PartialEq)]
pub struct HandshakeOutcome {
    pub state: AuthState,
    pub capabilities: CapabilityMap,
}

impl HandshakeOutcome {
    /// Rejection reason sent along with an `Error` state.
    pub fn reason(&self) -> Option<&str> {
        self.capabilities.get_str(ERROR_REASON_KEY)
    }

    /// Replacement token sent along with a `Continue` state.
    pub fn new_token(&self) -> Option<&str> {
        self.capabilities.get_str(NEW_TOKEN_KEY)
    }

    pub fn is_done(&self) -> bool {
        self.state == AuthState::Done
    }
}

impl fmt::Debug for HandshakeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeOutcome")
            .field("state", &self.state)
            .field("keys", &self.capabilities.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Capability map sent for `credentials` under `config`.
pub fn auth_capabilities(credentials: &Credentials, config: &HandshakeConfig) -> CapabilityMap {
    let mut map = CapabilityMap::with_credentials(&credentials.user, &credentials.token);
    config.features.apply(&mut map);
    map.extend(
        config
            .extra
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone())),
    );
    map
}

/// Run one handshake round.
///
/// An `Error` state is a normal outcome, not an `Err`. Errors are reserved
/// for connectivity loss, timeouts and replies that violate the protocol.
pub async fn handshake(
    endpoint: &Endpoint,
    credentials: &Credentials,
    config: &HandshakeConfig,
) -> Result<HandshakeOutcome> {
    let payload = auth_capabilities(credentials, config).encode();
    let reply = send_auth_payload(endpoint, payload, config.timeout).await?;
    let capabilities = CapabilityMap::decode(&reply.payload)?;
    let state = interpret_reply(&capabilities)?;
    debug!(peer = %endpoint.peer(), user = %credentials.user, %state, "handshake round complete");
    Ok(HandshakeOutcome {
        state,
        capabilities,
    })
}

/// Send `payload` as a handshake Call and wait for the reply.
///
/// The payload is sent as is, which lets probes submit arbitrary bytes.
pub async fn send_auth_payload(
    endpoint: &Endpoint,
    payload: Bytes,
    timeout: Duration,
) -> Result<Message> {
    let header = Header::new(
        MessageKind::Call,
        AUTH_SERVICE,
        AUTH_OBJECT,
        AUTH_ACTION,
        endpoint.next_message_id(),
    );
    request_within(endpoint, Message::new(header, payload), timeout).await
}

/// Read the authentication state from a reply map.
pub fn interpret_reply(capabilities: &CapabilityMap) -> Result<AuthState> {
    let value = capabilities
        .get(STATE_KEY)
        .ok_or_else(|| PeerError::Protocol(format!("reply has no {STATE_KEY} entry")))?;
    let status = value.resolve_dynamic()?.as_unsigned().ok_or_else(|| {
        PeerError::Protocol(format!(
            "{STATE_KEY} is not an integer (signature {})",
            value.signature()
        ))
    })?;
    AuthState::from_status(status)
        .ok_or_else(|| PeerError::Protocol(format!("unknown authentication state {status}")))
}

/// Authenticate, following token renewals up to `config.max_rounds`.
///
/// Returns the final `Done` outcome. A rejection becomes
/// [`PeerError::AuthenticationFailed`].
pub async fn authenticate_user(
    endpoint: &Endpoint,
    credentials: &Credentials,
    config: &HandshakeConfig,
) -> Result<HandshakeOutcome> {
    let mut current = credentials.clone();
    let rounds = config.max_rounds.max(1);
    for round in 1..=rounds {
        let outcome = handshake(endpoint, &current, config).await?;
        match outcome.state {
            AuthState::Done => {
                info!(peer = %endpoint.peer(), user = %current.user, round, "authenticated");
                return Ok(outcome);
            }
            AuthState::Error => {
                let reason = outcome.reason().unwrap_or("rejected").to_string();
                info!(peer = %endpoint.peer(), user = %current.user, %reason, "authentication rejected");
                return Err(PeerError::AuthenticationFailed(reason));
            }
            AuthState::Continue => match outcome.new_token() {
                Some(token) => {
                    debug!(peer = %endpoint.peer(), round, "peer issued a new token");
                    current = Credentials::new(current.user.clone(), token);
                }
                None => {
                    return Err(PeerError::Protocol(
                        "peer asked to continue without a new token".to_string(),
                    ))
                }
            },
        }
    }
    Err(PeerError::Protocol(format!(
        "authentication still pending after {rounds} rounds"
    )))
}

#[cfg(test)]
mod tests {
    use busprobe_frame::MessageCodec;
    use busprobe_transport::Connection;
    use busprobe_value::capability::{TOKEN_KEY, USER_KEY};
    use busprobe_value::Value;
    use futures_util::{SinkExt, StreamExt};
    use tokio::task::JoinHandle;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    /// Answers every handshake Call with the map built by `answer`.
    fn fake_peer<F>(answer: F) -> (Endpoint, JoinHandle<Vec<CapabilityMap>>)
    where
        F: Fn(&CapabilityMap) -> CapabilityMap + Send + 'static,
    {
        let (client, server) = Connection::pair();
        let task = tokio::spawn(async move {
            let (reader, writer) = server.into_split();
            let mut stream = FramedRead::new(reader, MessageCodec::new());
            let mut sink = FramedWrite::new(writer, MessageCodec::new());
            let mut seen = Vec::new();
            while let Some(Ok(call)) = stream.next().await {
                assert_eq!(
                    (call.header.service, call.header.object, call.header.action),
                    (AUTH_SERVICE, AUTH_OBJECT, AUTH_ACTION)
                );
                let request = CapabilityMap::decode(&call.payload).unwrap();
                let reply = answer(&request);
                seen.push(request);
                if sink
                    .send(Message::new(call.header.reply(), reply.encode()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            seen
        });
        (Endpoint::new(client), task)
    }

    fn state_map(status: Value) -> CapabilityMap {
        let mut map = CapabilityMap::new();
        map.insert(STATE_KEY, status);
        map
    }

    #[test]
    fn credentials_debug_redacts_token() {
        let rendered = format!("{:?}", Credentials::new("nao", "secret-token"));
        assert!(rendered.contains("nao"));
        assert!(rendered.contains("<redacted:12 bytes>"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn capabilities_carry_credentials_flags_and_extras() {
        let mut extra = CapabilityMap::new();
        extra.insert("Probe", 7u32);
        let config = HandshakeConfig {
            features: FeatureFlags {
                message_flags: true,
                ..FeatureFlags::default()
            },
            extra,
            ..HandshakeConfig::default()
        };
        let map = auth_capabilities(&Credentials::new("u", "t"), &config);
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec![USER_KEY, TOKEN_KEY, MESSAGE_FLAGS_KEY, "Probe"]);
    }

    #[test]
    fn signed_and_unsigned_status_agree() {
        for status in [
            Value::Uint32(3),
            Value::Int32(3),
            Value::Int8(3),
            Value::Uint64(3),
            Value::dynamic(&Value::Int32(3)),
        ] {
            assert_eq!(interpret_reply(&state_map(status)).unwrap(), AuthState::Done);
        }
        assert_eq!(
            interpret_reply(&state_map(Value::Int32(1))).unwrap(),
            AuthState::Error
        );
    }

    #[test]
    fn bad_status_is_a_protocol_violation() {
        for map in [
            CapabilityMap::new(),
            state_map(Value::Uint32(7)),
            state_map(Value::Int32(-3)),
            state_map(Value::from("done")),
        ] {
            assert!(matches!(
                interpret_reply(&map),
                Err(PeerError::Protocol(_))
            ));
        }
    }

    #[tokio::test]
    async fn handshake_reports_done() {
        let (endpoint, peer) = fake_peer(|_| state_map(Value::Int32(3)));
        let outcome = handshake(
            &endpoint,
            &Credentials::new("nao", "nao"),
            &HandshakeConfig::default(),
        )
        .await
        .unwrap();
        assert!(outcome.is_done());

        endpoint.close().await;
        let seen = peer.await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].user(), Some("nao"));
        assert_eq!(seen[0].token(), Some("nao"));
    }

    #[tokio::test]
    async fn rejection_is_an_outcome_not_an_error() {
        let (endpoint, _peer) = fake_peer(|_| {
            let mut map = state_map(Value::Uint32(1));
            map.insert(ERROR_REASON_KEY, "bad token");
            map
        });
        let creds = Credentials::new("nao", "wrong");
        let config = HandshakeConfig::default();

        let outcome = handshake(&endpoint, &creds, &config).await.unwrap();
        assert_eq!(outcome.state, AuthState::Error);
        assert_eq!(outcome.reason(), Some("bad token"));

        let err = authenticate_user(&endpoint, &creds, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::AuthenticationFailed(ref r) if r == "bad token"));
    }

    #[tokio::test]
    async fn token_renewal_runs_a_second_round() {
        let (endpoint, peer) = fake_peer(|request| {
            if request.token() == Some("renewed") {
                state_map(Value::Uint32(3))
            } else {
                let mut map = state_map(Value::Uint32(2));
                map.insert(NEW_TOKEN_KEY, "renewed");
                map
            }
        });
        let outcome = authenticate_user(
            &endpoint,
            &Credentials::new("nao", "first"),
            &HandshakeConfig::default(),
        )
        .await
        .unwrap();
        assert!(outcome.is_done());

        endpoint.close().await;
        let tokens: Vec<String> = peer
            .await
            .unwrap()
            .iter()
            .filter_map(|map| map.token().map(str::to_string))
            .collect();
        assert_eq!(tokens, vec!["first", "renewed"]);
    }

    #[tokio::test]
    async fn endless_continue_is_bounded() {
        let (endpoint, _peer) = fake_peer(|_| {
            let mut map = state_map(Value::Uint32(2));
            map.insert(NEW_TOKEN_KEY, "again");
            map
        });
        let err = authenticate_user(
            &endpoint,
            &Credentials::new("nao", "nao"),
            &HandshakeConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PeerError::Protocol(_)));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (client, _server) = Connection::pair();
        let endpoint = Endpoint::new(client);
        let config = HandshakeConfig {
            timeout: Duration::from_millis(50),
            ..HandshakeConfig::default()
        };
        let err = handshake(&endpoint, &Credentials::new("nao", "nao"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::Timeout(_)));
        assert!(!err.is_connectivity());
    }

    #[tokio::test]
    async fn vanished_peer_is_a_connectivity_error() {
        let (client, server) = Connection::pair();
        drop(server);
        let endpoint = Endpoint::new(client);
        let err = handshake(
            &endpoint,
            &Credentials::new("nao", "nao"),
            &HandshakeConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(err.is_connectivity(), "{err:?}");
    }
}
