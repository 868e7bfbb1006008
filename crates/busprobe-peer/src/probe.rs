//! Probes for peer access control and robustness.
//!
//! Injection probes send crafted messages to a service the client has no
//! business reaching before it authenticates, and report what came back.
//! The replay probe submits arbitrary bytes as a handshake payload and then
//! checks that the peer still accepts good credentials.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use busprobe_frame::{Header, Message, MessageKind};
use busprobe_transport::Address;
use busprobe_value::Value;
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::connector::{connect, connect_authenticated};
use crate::endpoint::{error_description, Endpoint, HandlerHandle, Verdict};
use crate::error::{PeerError, Result};
use crate::handshake::{
    authenticate_user, send_auth_payload, Credentials, HandshakeConfig,
};

pub const INJECT_SERVICE: u32 = 1;
pub const INJECT_OBJECT: u32 = 1;
/// `machineId` method of the directory object.
pub const CALL_ACTION: u32 = 108;
/// `serviceAdded` signal of the directory object.
pub const POST_ACTION: u32 = 106;
pub const CALL_ID: u32 = 55555;
pub const POST_ID: u32 = 44444;
/// First value of the crafted post payload.
pub const POST_MARKER: u32 = 888;

pub const REASON_TIMEOUT: &str = "gateway timeout";
pub const REASON_CRASHED: &str = "gateway has crashed";
pub const REASON_BROKEN: &str = "gateway is broken";

/// Call to the directory's `machineId` method with an empty payload.
pub fn crafted_call() -> Message {
    Message::new(
        Header::new(
            MessageKind::Call,
            INJECT_SERVICE,
            INJECT_OBJECT,
            CALL_ACTION,
            CALL_ID,
        ),
        Bytes::new(),
    )
}

/// Forged `serviceAdded` post: `888` followed by `tag`.
pub fn crafted_post(tag: &str) -> Message {
    let mut payload = BytesMut::new();
    Value::Uint32(POST_MARKER).write_to(&mut payload);
    Value::from(tag).write_to(&mut payload);
    Message::new(
        Header::new(
            MessageKind::Post,
            INJECT_SERVICE,
            INJECT_OBJECT,
            POST_ACTION,
            POST_ID,
        ),
        payload.freeze(),
    )
}

/// Send `messages` in order. Returns how many were written.
pub async fn inject(
    endpoint: &Endpoint,
    messages: impl IntoIterator<Item = Message>,
) -> Result<usize> {
    let mut sent = 0;
    for message in messages {
        debug!(
            kind = %message.header.kind,
            action = message.header.action,
            id = message.header.id,
            "injecting"
        );
        endpoint.send(message).await?;
        sent += 1;
    }
    Ok(sent)
}

/// What a probed peer did with a crafted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// A message with the probed id came back.
    Replied { kind: String, detail: String },
    /// Nothing came back within the timeout.
    TimedOut,
    /// The connection ended first.
    Disconnected { reason: String },
}

impl ProbeOutcome {
    fn from_message(message: &Message) -> Self {
        let detail = match message.header.kind {
            MessageKind::Error => error_description(&message.payload),
            _ => format!("{} byte payload", message.payload.len()),
        };
        ProbeOutcome::Replied {
            kind: message.header.kind.name().to_string(),
            detail,
        }
    }

    /// True when the peer answered with a reply rather than an error.
    pub fn is_reply(&self) -> bool {
        matches!(self, ProbeOutcome::Replied { kind, .. } if kind == MessageKind::Reply.name())
    }
}

fn watch(endpoint: &Endpoint, id: u32) -> Result<(HandlerHandle, oneshot::Receiver<ProbeOutcome>)> {
    let (tx, rx) = oneshot::channel();
    let on_message = Arc::new(Mutex::new(Some(tx)));
    let on_close = Arc::clone(&on_message);
    let handle = endpoint.add_handler(
        move |header: &Header| {
            if header.id == id && header.kind != MessageKind::Call {
                Verdict::TAKE
            } else {
                Verdict::IGNORE
            }
        },
        move |message: Message| {
            settle(&on_message, ProbeOutcome::from_message(&message));
            Ok(())
        },
        move |reason| {
            settle(
                &on_close,
                ProbeOutcome::Disconnected {
                    reason: reason.to_string(),
                },
            )
        },
    )?;
    Ok((handle, rx))
}

fn settle(slot: &Mutex<Option<oneshot::Sender<ProbeOutcome>>>, outcome: ProbeOutcome) {
    let sender = slot
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take();
    if let Some(tx) = sender {
        let _ = tx.send(outcome);
    }
}

async fn wait(
    handle: HandlerHandle,
    outcome: oneshot::Receiver<ProbeOutcome>,
    timeout: Duration,
) -> ProbeOutcome {
    match tokio::time::timeout(timeout, outcome).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => ProbeOutcome::Disconnected {
            reason: "endpoint dropped".to_string(),
        },
        Err(_) => {
            handle.cancel();
            ProbeOutcome::TimedOut
        }
    }
}

/// Wait up to `timeout` for any non-call message carrying `id`.
pub async fn await_reply(endpoint: &Endpoint, id: u32, timeout: Duration) -> ProbeOutcome {
    match watch(endpoint, id) {
        Ok((handle, outcome)) => wait(handle, outcome, timeout).await,
        Err(err) => ProbeOutcome::Disconnected {
            reason: err.to_string(),
        },
    }
}

/// Send `message` and report the answer to its id.
///
/// The watch is registered before sending so a fast answer is not missed.
pub async fn probe(endpoint: &Endpoint, message: Message, timeout: Duration) -> Result<ProbeOutcome> {
    let (handle, outcome) = match watch(endpoint, message.header.id) {
        Ok(watch) => watch,
        Err(err) if err.is_connectivity() => {
            return Ok(ProbeOutcome::Disconnected {
                reason: err.to_string(),
            })
        }
        Err(err) => return Err(err),
    };
    if let Err(err) = endpoint.send(message).await {
        handle.cancel();
        return match err {
            err if err.is_connectivity() => Ok(ProbeOutcome::Disconnected {
                reason: err.to_string(),
            }),
            err => Err(err),
        };
    }
    Ok(wait(handle, outcome, timeout).await)
}

/// Injection scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Crafted call to the target peer.
    Call,
    /// Crafted call to a second ("victim") peer.
    CallRemote,
    /// Forged signal post to the target peer.
    Post,
}

impl Scenario {
    pub fn name(self) -> &'static str {
        match self {
            Scenario::Call => "call",
            Scenario::CallRemote => "call-remote",
            Scenario::Post => "post",
        }
    }
}

/// Parameters of an injection run.
#[derive(Debug, Clone)]
pub struct InjectConfig {
    /// Authenticate before injecting. `None` injects on a bare connection.
    pub credentials: Option<Credentials>,
    pub handshake: HandshakeConfig,
    /// How long to watch for an answer.
    pub timeout: Duration,
    /// Tag carried by the forged post.
    pub tag: String,
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            handshake: HandshakeConfig::default(),
            timeout: Duration::from_secs(5),
            tag: "busprobe".to_string(),
        }
    }
}

/// Result of one injection scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub target: String,
    pub authenticated: bool,
    pub outcome: ProbeOutcome,
}

impl ScenarioReport {
    /// A peer that answers an unauthenticated client with a reply has an
    /// access control hole.
    pub fn finding(&self) -> bool {
        !self.authenticated && self.outcome.is_reply()
    }
}

/// Run `scenario` against `target`, or `victim` for [`Scenario::CallRemote`].
pub async fn run_scenario(
    scenario: Scenario,
    target: &Address,
    victim: Option<&Address>,
    config: &InjectConfig,
) -> Result<ScenarioReport> {
    let address = match (scenario, victim) {
        (Scenario::CallRemote, Some(victim)) => victim,
        (Scenario::CallRemote, None) => {
            return Err(PeerError::Protocol(
                "call-remote scenario needs a victim address".to_string(),
            ))
        }
        _ => target,
    };

    let endpoint = match &config.credentials {
        Some(credentials) => {
            connect_authenticated(address, credentials, &config.handshake)
                .await?
                .0
        }
        None => connect(address).await?,
    };

    let message = match scenario {
        Scenario::Call | Scenario::CallRemote => crafted_call(),
        Scenario::Post => crafted_post(&config.tag),
    };
    let outcome = probe(&endpoint, message, config.timeout).await?;
    endpoint.close().await;

    let report = ScenarioReport {
        scenario,
        target: address.to_string(),
        authenticated: config.credentials.is_some(),
        outcome,
    };
    if report.finding() {
        warn!(scenario = scenario.name(), target = %report.target, "unauthenticated message answered");
    } else {
        info!(scenario = scenario.name(), target = %report.target, outcome = ?report.outcome, "scenario complete");
    }
    Ok(report)
}

/// Health of a peer after a replayed handshake payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplayOutcome {
    /// The peer still authenticates good credentials. `replied` tells
    /// whether the replayed payload got a reply rather than an error.
    Healthy { replied: bool },
    Finding { reason: String },
}

impl ReplayOutcome {
    pub fn is_finding(&self) -> bool {
        matches!(self, ReplayOutcome::Finding { .. })
    }

    fn finding(reason: &str) -> Self {
        ReplayOutcome::Finding {
            reason: reason.to_string(),
        }
    }
}

/// Submit `payload` as a handshake Call, then check the peer is healthy.
///
/// The first dial failing is an error: the peer was never reachable. After
/// the payload is sent, failing to dial again means the peer crashed, and
/// failing to authenticate `credentials` means it is broken. Either step
/// exceeding `config.timeout` is a timeout finding.
pub async fn replay(
    address: &Address,
    payload: Bytes,
    credentials: &Credentials,
    config: &HandshakeConfig,
) -> Result<ReplayOutcome> {
    let endpoint = connect(address).await?;
    let replied = match send_auth_payload(&endpoint, payload, config.timeout).await {
        Ok(_) => true,
        Err(PeerError::Timeout(_)) => return Ok(ReplayOutcome::finding(REASON_TIMEOUT)),
        Err(err) => {
            debug!(error = %err, "replayed payload was not accepted");
            false
        }
    };
    endpoint.close().await;

    let check = async {
        let endpoint = match connect(address).await {
            Ok(endpoint) => endpoint,
            Err(err) => {
                debug!(error = %err, "redial failed");
                return ReplayOutcome::finding(REASON_CRASHED);
            }
        };
        let outcome = match authenticate_user(&endpoint, credentials, config).await {
            Ok(_) => ReplayOutcome::Healthy { replied },
            Err(PeerError::Timeout(_)) => ReplayOutcome::finding(REASON_TIMEOUT),
            Err(err) => {
                debug!(error = %err, "health check authentication failed");
                ReplayOutcome::finding(REASON_BROKEN)
            }
        };
        endpoint.close().await;
        outcome
    };
    let outcome = tokio::time::timeout(config.timeout, check)
        .await
        .unwrap_or_else(|_| ReplayOutcome::finding(REASON_TIMEOUT));
    if let ReplayOutcome::Finding { reason } = &outcome {
        warn!(peer = %address, %reason, "peer unhealthy after replay");
    }
    Ok(outcome)
}
