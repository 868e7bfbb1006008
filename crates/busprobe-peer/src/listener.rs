use std::sync::Arc;
use std::time::Duration;

use busprobe_frame::{Message, MessageCodec, MessageKind};
use busprobe_transport::{Address, Connection, Listener};
use busprobe_value::capability::{ERROR_REASON_KEY, NEW_TOKEN_KEY, STATE_KEY};
use busprobe_value::samples::{DEFAULT_TOKEN, DEFAULT_USER};
use busprobe_value::{CapabilityMap, Value};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::endpoint::error_payload;
use crate::error::{PeerError, Result};
use crate::handshake::{AuthState, Credentials, AUTH_ACTION, AUTH_OBJECT, AUTH_SERVICE};

/// Pause after a failed accept, so a persistent error (EMFILE) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Integer type used for the status in handshake replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusEncoding {
    /// `Uint32`
    #[default]
    Unsigned,
    /// `Int32`
    Signed,
}

impl StatusEncoding {
    pub fn encode(self, state: AuthState) -> Value {
        match self {
            StatusEncoding::Unsigned => Value::Uint32(state.status()),
            StatusEncoding::Signed => Value::Int32(state.status() as i32),
        }
    }
}

/// Behaviour of an [`AuthListener`].
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub status_encoding: StatusEncoding,
    /// Accepted credentials.
    pub credentials: Vec<Credentials>,
    /// Credentials answered with `Continue` and the given replacement token.
    pub renewals: Vec<(Credentials, String)>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            status_encoding: StatusEncoding::default(),
            credentials: vec![Credentials::new(DEFAULT_USER, DEFAULT_TOKEN)],
            renewals: Vec::new(),
        }
    }
}

/// Test peer that only understands the authentication handshake.
///
/// Handshake Calls are checked against the configured credentials. Any
/// other Call is answered with an Error message: "not authenticated" before
/// a successful handshake and "unknown object" after. Posts and events are
/// dropped.
#[derive(Debug)]
pub struct AuthListener {
    listener: Listener,
    config: Arc<ListenerConfig>,
}

impl AuthListener {
    pub async fn bind(address: &Address, config: ListenerConfig) -> Result<Self> {
        let listener = Listener::bind(address).await?;
        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    /// Bound address, with an ephemeral TCP port resolved.
    pub fn local_address(&self) -> &Address {
        self.listener.local_address()
    }

    /// Accept and serve connections until `shutdown` fires.
    ///
    /// Each connection is served on its own task. Tasks still running at
    /// shutdown are aborted.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => {
                    let connection = match accepted {
                        Ok(connection) => connection,
                        Err(err) => {
                            warn!(error = %err, backoff = ?ACCEPT_BACKOFF, "accept failed");
                            if backoff(&shutdown, ACCEPT_BACKOFF).await {
                                continue;
                            }
                            break;
                        }
                    };
                    let config = Arc::clone(&self.config);
                    sessions.spawn(async move {
                        let peer = connection.peer().to_string();
                        if let Err(err) = serve(connection, config).await {
                            debug!(%peer, error = %err, "session ended with error");
                        }
                    });
                }
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(err) = finished {
                        warn!(error = %err, "session task failed");
                    }
                }
            }
        }
        info!(address = %self.listener.local_address(), "listener shutting down");
        sessions.shutdown().await;
        Ok(())
    }
}

/// Wait `delay` unless `shutdown` fires first. Returns false on shutdown.
async fn backoff(shutdown: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[derive(Default)]
struct Session {
    authenticated: bool,
    issued: Vec<Credentials>,
}

impl Session {
    fn answer(&mut self, config: &ListenerConfig, request: &CapabilityMap) -> CapabilityMap {
        let presented = Credentials::new(
            request.user().unwrap_or_default(),
            request.token().unwrap_or_default(),
        );
        let mut reply = CapabilityMap::new();

        if let Some((_, token)) = config
            .renewals
            .iter()
            .find(|(credentials, _)| *credentials == presented)
        {
            self.issued
                .push(Credentials::new(presented.user.clone(), token.clone()));
            reply.insert(STATE_KEY, config.status_encoding.encode(AuthState::Continue));
            reply.insert(NEW_TOKEN_KEY, token.as_str());
            return reply;
        }

        if config.credentials.contains(&presented) || self.issued.contains(&presented) {
            self.authenticated = true;
            info!(user = %presented.user, "handshake accepted");
            reply.insert(STATE_KEY, config.status_encoding.encode(AuthState::Done));
        } else {
            info!(user = %presented.user, "handshake rejected");
            reply.insert(STATE_KEY, config.status_encoding.encode(AuthState::Error));
            reply.insert(ERROR_REASON_KEY, "invalid credentials");
        }
        reply
    }
}

/// Serve one connection until the client disconnects.
pub async fn serve(connection: Connection, config: Arc<ListenerConfig>) -> Result<()> {
    let peer = connection.peer().to_string();
    let (reader, writer) = connection.into_split();
    let mut inbound = FramedRead::new(reader, MessageCodec::new());
    let mut outbound = FramedWrite::new(writer, MessageCodec::new());
    let mut session = Session::default();

    while let Some(next) = inbound.next().await {
        let message = next?;
        let header = message.header;
        if header.kind != MessageKind::Call {
            trace!(%peer, kind = %header.kind, id = header.id, "ignoring message");
            continue;
        }

        let answer = if (header.service, header.object, header.action)
            == (AUTH_SERVICE, AUTH_OBJECT, AUTH_ACTION)
        {
            match CapabilityMap::decode(&message.payload) {
                Ok(request) => {
                    Message::new(header.reply(), session.answer(&config, &request).encode())
                }
                Err(err) => {
                    debug!(%peer, error = %err, "malformed capability map");
                    Message::new(
                        header.error(),
                        error_payload(&format!("invalid capability map: {err}")),
                    )
                }
            }
        } else {
            let description = if session.authenticated {
                "unknown object"
            } else {
                "not authenticated"
            };
            Message::new(header.error(), error_payload(description))
        };

        outbound.send(answer).await.map_err(|err| match err {
            busprobe_frame::FrameError::Io(io) => PeerError::Disconnected(io.to_string()),
            other => PeerError::Frame(other),
        })?;
    }
    debug!(%peer, "client disconnected");
    Ok(())
}
