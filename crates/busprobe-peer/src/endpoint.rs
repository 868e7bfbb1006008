//! Reply correlation over one connection.
//!
//! An [`Endpoint`] owns a background read task that offers every inbound
//! message to the registered handlers in registration order. Each handler is
//! a filter over the header, a consumer of matched messages and a closer
//! called once if the connection ends while the handler is still registered.
//!
//! Consumers and closers run on a per-handler task, so a slow consumer never
//! stalls the read loop or other handlers. The endpoint has no timeouts of
//! its own: callers race their completion signal against a timer and close
//! the endpoint when it fires (see [`request_within`]).

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use busprobe_frame::{
    FrameConfig, FrameError, Header, Message, MessageCodec, MessageKind, DEFAULT_MAX_PAYLOAD,
};
use busprobe_transport::{connect, Address, BoxedReader, BoxedWriter, Connection};
use busprobe_value::Value;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{PeerError, Result};

/// Lifecycle of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointState {
    #[default]
    Open,
    /// Remaining handlers are being notified.
    Closing,
    Closed,
}

/// Answer of a handler filter for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Deliver the message to the handler's consumer.
    pub matched: bool,
    /// Keep the handler registered after this message.
    pub keep: bool,
}

impl Verdict {
    /// Not for this handler; stay registered.
    pub const IGNORE: Verdict = Verdict::new(false, true);
    /// Deliver, then unregister.
    pub const TAKE: Verdict = Verdict::new(true, false);
    /// Deliver and stay registered.
    pub const OBSERVE: Verdict = Verdict::new(true, true);

    pub const fn new(matched: bool, keep: bool) -> Self {
        Self { matched, keep }
    }
}

/// Why an endpoint stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// [`Endpoint::close`] was called or the endpoint was dropped.
    Local,
    /// The peer closed the connection.
    RemoteClosed,
    /// Reading or decoding the stream failed.
    ReadFailed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Local => f.write_str("closed locally"),
            CloseReason::RemoteClosed => f.write_str("connection closed by peer"),
            CloseReason::ReadFailed(err) => write!(f, "read failed: {err}"),
        }
    }
}

impl From<CloseReason> for PeerError {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::Local => PeerError::Closed,
            other => PeerError::Disconnected(other.to_string()),
        }
    }
}

/// Endpoint configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Maximum inbound and outbound payload size. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

type Filter = Box<dyn FnMut(&Header) -> Verdict + Send>;

enum Delivery {
    Message(Message),
    Closed(CloseReason),
}

struct Entry {
    id: u64,
    filter: Filter,
    deliveries: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct Registry {
    state: EndpointState,
    reason: Option<CloseReason>,
    next_handler: u64,
    handlers: Vec<Entry>,
}

/// Handlers hold plain data, so a panic in a filter leaves nothing to repair.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Withdraws a registered handler.
#[derive(Debug, Clone)]
pub struct HandlerHandle {
    registry: Weak<Mutex<Registry>>,
    id: u64,
}

impl HandlerHandle {
    /// Remove the handler. No-op if it already matched, was cancelled, or
    /// the endpoint is gone. The closer is not called.
    pub fn cancel(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = lock(&registry);
        let before = registry.handlers.len();
        registry.handlers.retain(|entry| entry.id != self.id);
        if registry.handlers.len() != before {
            trace!(handler = self.id, "handler cancelled");
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// One connection to a bus peer with its reply correlation state.
///
/// Must be created inside a Tokio runtime.
pub struct Endpoint {
    registry: Arc<Mutex<Registry>>,
    writer: tokio::sync::Mutex<FramedWrite<BoxedWriter, MessageCodec>>,
    next_id: AtomicU32,
    shutdown: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
    peer: String,
}

impl Endpoint {
    /// Take ownership of a connection and start reading from it.
    pub fn new(connection: Connection) -> Self {
        Self::with_config(connection, EndpointConfig::default())
    }

    pub fn with_config(connection: Connection, config: EndpointConfig) -> Self {
        let peer = connection.peer().to_string();
        let (reader, writer) = connection.into_split();
        let frame_config = FrameConfig {
            max_payload_size: config.max_payload_size,
        };
        let frames = FramedRead::new(reader, MessageCodec::with_config(frame_config.clone()));
        let writer = FramedWrite::new(writer, MessageCodec::with_config(frame_config));

        let registry = Arc::new(Mutex::new(Registry::default()));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(read_loop(
            Arc::clone(&registry),
            frames,
            shutdown.clone(),
            peer.clone(),
        ));

        Self {
            registry,
            writer: tokio::sync::Mutex::new(writer),
            next_id: AtomicU32::new(1),
            shutdown,
            reader: Mutex::new(Some(task)),
            peer,
        }
    }

    /// Dial `address` and wrap the connection.
    pub async fn dial(address: &Address) -> Result<Self> {
        Ok(Self::new(connect(address).await?))
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> EndpointState {
        lock(&self.registry).state
    }

    /// Why the endpoint stopped, once it has.
    pub fn close_reason(&self) -> Option<CloseReason> {
        lock(&self.registry).reason.clone()
    }

    /// Fresh message id for an outbound call.
    pub fn next_message_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a handler. Fails once the endpoint is no longer open.
    pub fn add_handler<F, C, X>(&self, filter: F, consumer: C, closer: X) -> Result<HandlerHandle>
    where
        F: FnMut(&Header) -> Verdict + Send + 'static,
        C: FnMut(Message) -> Result<()> + Send + 'static,
        X: FnOnce(CloseReason) + Send + 'static,
    {
        let (deliveries, inbox) = mpsc::unbounded_channel();
        let id = {
            let mut registry = lock(&self.registry);
            if registry.state != EndpointState::Open {
                return Err(registry.reason.clone().map_or(PeerError::Closed, Into::into));
            }
            let id = registry.next_handler;
            registry.next_handler += 1;
            registry.handlers.push(Entry {
                id,
                filter: Box::new(filter),
                deliveries,
            });
            id
        };
        tokio::spawn(run_handler(id, inbox, consumer, closer));
        trace!(handler = id, "handler registered");
        Ok(HandlerHandle {
            registry: Arc::downgrade(&self.registry),
            id,
        })
    }

    /// Write one message.
    pub async fn send(&self, message: Message) -> Result<()> {
        {
            let registry = lock(&self.registry);
            if registry.state != EndpointState::Open {
                return Err(registry.reason.clone().map_or(PeerError::Closed, Into::into));
            }
        }
        trace!(
            kind = %message.header.kind,
            id = message.header.id,
            len = message.payload.len(),
            "sending"
        );
        let mut writer = self.writer.lock().await;
        writer.send(message).await.map_err(write_error)
    }

    /// Register interest in the reply or error answering message `id`.
    ///
    /// The receiver resolves with the reply, with [`PeerError::Remote`] for an
    /// error message, or with the close reason if the endpoint stops first.
    pub fn expect_answer(
        &self,
        id: u32,
    ) -> Result<(HandlerHandle, oneshot::Receiver<Result<Message>>)> {
        let (tx, rx) = oneshot::channel();
        let on_answer = Arc::new(Mutex::new(Some(tx)));
        let on_close = Arc::clone(&on_answer);
        let handle = self.add_handler(
            move |header: &Header| {
                if header.id == id && header.kind.is_response() {
                    Verdict::TAKE
                } else {
                    Verdict::IGNORE
                }
            },
            move |message: Message| {
                let answer = match message.header.kind {
                    MessageKind::Error => Err(PeerError::Remote(error_description(&message.payload))),
                    _ => Ok(message),
                };
                complete(&on_answer, answer);
                Ok(())
            },
            move |reason| complete(&on_close, Err(reason.into())),
        )?;
        Ok((handle, rx))
    }

    /// Send `message` and wait for the answer carrying its id.
    pub async fn request(&self, message: Message) -> Result<Message> {
        let (handle, answer) = self.expect_answer(message.header.id)?;
        if let Err(err) = self.send(message).await {
            handle.cancel();
            return Err(err);
        }
        answer.await.unwrap_or(Err(PeerError::Closed))
    }

    /// Send a call and wait for its answer.
    pub async fn call(
        &self,
        service: u32,
        object: u32,
        action: u32,
        payload: impl Into<Bytes>,
    ) -> Result<Message> {
        let header = Header::new(
            MessageKind::Call,
            service,
            object,
            action,
            self.next_message_id(),
        );
        self.request(Message::new(header, payload)).await
    }

    /// Stop reading, notify remaining handlers and shut the write half.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let task = lock(&self.reader).take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(peer = %self.peer, error = %err, "read task ended abnormally");
            }
        }
        let mut writer = self.writer.lock().await;
        if let Err(err) = writer.close().await {
            debug!(peer = %self.peer, error = %err, "closing write half failed");
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Send `message` and wait at most `timeout` for its answer.
///
/// On timeout the endpoint is closed, which releases every handler still
/// waiting on it, and [`PeerError::Timeout`] is returned.
pub async fn request_within(
    endpoint: &Endpoint,
    message: Message,
    timeout: Duration,
) -> Result<Message> {
    match tokio::time::timeout(timeout, endpoint.request(message)).await {
        Ok(answer) => answer,
        Err(_) => {
            debug!(peer = %endpoint.peer(), ?timeout, "request timed out");
            endpoint.close().await;
            Err(PeerError::Timeout(timeout))
        }
    }
}

/// Payload of an error message: a dynamic value holding a description.
pub fn error_payload(description: &str) -> Bytes {
    Value::dynamic(&Value::from(description)).encode()
}

/// Best-effort description carried by an error message payload.
pub fn error_description(payload: &[u8]) -> String {
    Value::decode("m", payload)
        .and_then(|value| value.resolve_dynamic())
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("undecodable error payload ({} bytes)", payload.len()))
}

fn write_error(err: FrameError) -> PeerError {
    match err {
        FrameError::Io(io) => PeerError::Disconnected(io.to_string()),
        other => PeerError::Frame(other),
    }
}

fn complete(slot: &Mutex<Option<oneshot::Sender<Result<Message>>>>, answer: Result<Message>) {
    if let Some(tx) = lock(slot).take() {
        let _ = tx.send(answer);
    }
}

async fn read_loop(
    registry: Arc<Mutex<Registry>>,
    mut frames: FramedRead<BoxedReader, MessageCodec>,
    shutdown: CancellationToken,
    peer: String,
) {
    let reason = loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break CloseReason::Local,
            next = frames.next() => match next {
                Some(Ok(message)) => dispatch(&registry, message),
                Some(Err(err)) => {
                    warn!(%peer, error = %err, "read failed");
                    break CloseReason::ReadFailed(err.to_string());
                }
                None => break CloseReason::RemoteClosed,
            },
        }
    };
    debug!(%peer, %reason, "endpoint stopping");
    terminate(&registry, reason);
}

fn dispatch(registry: &Mutex<Registry>, message: Message) {
    let mut registry = lock(registry);
    if registry.state != EndpointState::Open {
        return;
    }
    let mut matched = 0usize;
    registry.handlers.retain_mut(|entry| {
        let verdict = (entry.filter)(&message.header);
        if verdict.matched {
            matched += 1;
            if entry
                .deliveries
                .send(Delivery::Message(message.clone()))
                .is_err()
            {
                debug!(handler = entry.id, "handler task is gone");
            }
        }
        verdict.keep
    });
    if matched == 0 {
        debug!(
            kind = %message.header.kind,
            id = message.header.id,
            "no handler for message"
        );
    }
}

fn terminate(registry: &Mutex<Registry>, reason: CloseReason) {
    let handlers = {
        let mut registry = lock(registry);
        if registry.state != EndpointState::Open {
            return;
        }
        registry.state = EndpointState::Closing;
        registry.reason = Some(reason.clone());
        std::mem::take(&mut registry.handlers)
    };
    for entry in handlers {
        let _ = entry.deliveries.send(Delivery::Closed(reason.clone()));
    }
    lock(registry).state = EndpointState::Closed;
}

async fn run_handler<C, X>(
    id: u64,
    mut inbox: mpsc::UnboundedReceiver<Delivery>,
    mut consumer: C,
    closer: X,
) where
    C: FnMut(Message) -> Result<()>,
    X: FnOnce(CloseReason),
{
    while let Some(delivery) = inbox.recv().await {
        match delivery {
            Delivery::Message(message) => {
                if let Err(err) = consumer(message) {
                    warn!(handler = id, error = %err, "consumer failed");
                }
            }
            Delivery::Closed(reason) => {
                closer(reason);
                return;
            }
        }
    }
    trace!(handler = id, "handler released");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use busprobe_frame::MessageCodec;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;

    type ServerSink = FramedWrite<BoxedWriter, MessageCodec>;
    type ServerStream = FramedRead<BoxedReader, MessageCodec>;

    fn setup() -> (Endpoint, ServerStream, ServerSink) {
        let (client, server) = Connection::pair();
        let (reader, writer) = server.into_split();
        (
            Endpoint::new(client),
            FramedRead::new(reader, MessageCodec::new()),
            FramedWrite::new(writer, MessageCodec::new()),
        )
    }

    fn message(kind: MessageKind, id: u32) -> Message {
        Message::new(Header::new(kind, 0, 0, 8, id), Bytes::new())
    }

    async fn recv<T>(rx: &mut UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn offers_messages_in_registration_order() {
        let (endpoint, _stream, mut sink) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for index in 0..3usize {
            let seen = Arc::clone(&seen);
            endpoint
                .add_handler(
                    move |header: &Header| {
                        lock(&seen).push((header.id, index));
                        Verdict::IGNORE
                    },
                    |_| Ok(()),
                    |_| {},
                )
                .unwrap();
        }
        let (tx, mut done) = mpsc::unbounded_channel();
        endpoint
            .add_handler(
                |_: &Header| Verdict::OBSERVE,
                move |message: Message| {
                    let _ = tx.send(message.header.id);
                    Ok(())
                },
                |_| {},
            )
            .unwrap();

        for id in [10, 11] {
            sink.send(message(MessageKind::Event, id)).await.unwrap();
        }
        assert_eq!(recv(&mut done).await, 10);
        assert_eq!(recv(&mut done).await, 11);

        assert_eq!(
            *lock(&seen),
            vec![(10, 0), (10, 1), (10, 2), (11, 0), (11, 1), (11, 2)]
        );
    }

    #[tokio::test]
    async fn take_handler_fires_at_most_once() {
        let (endpoint, _stream, mut sink) = setup();
        let (take_tx, mut taken) = mpsc::unbounded_channel();
        let (tx, mut done) = mpsc::unbounded_channel();

        endpoint
            .add_handler(
                |_: &Header| Verdict::TAKE,
                move |message: Message| {
                    let _ = take_tx.send(message.header.id);
                    Ok(())
                },
                |_| {},
            )
            .unwrap();
        endpoint
            .add_handler(
                |_: &Header| Verdict::OBSERVE,
                move |message: Message| {
                    let _ = tx.send(message.header.id);
                    Ok(())
                },
                |_| {},
            )
            .unwrap();

        for id in 1..=3 {
            sink.send(message(MessageKind::Event, id)).await.unwrap();
        }
        for id in 1..=3 {
            assert_eq!(recv(&mut done).await, id);
        }
        assert_eq!(recv(&mut taken).await, 1);
        // The handler task ends once unregistered, dropping the sender.
        assert!(taken.recv().await.is_none());
        assert_eq!(lock(&endpoint.registry).handlers.len(), 1);
    }

    #[tokio::test]
    async fn unmatched_handler_with_keep_false_is_dropped() {
        let (endpoint, _stream, mut sink) = setup();
        let (tx, mut done) = mpsc::unbounded_channel();
        let consumed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&consumed);
        endpoint
            .add_handler(
                |_: &Header| Verdict::new(false, false),
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                |_| {},
            )
            .unwrap();
        endpoint
            .add_handler(
                |_: &Header| Verdict::OBSERVE,
                move |message: Message| {
                    let _ = tx.send(message.header.id);
                    Ok(())
                },
                |_| {},
            )
            .unwrap();

        sink.send(message(MessageKind::Event, 1)).await.unwrap();
        recv(&mut done).await;
        assert_eq!(consumed.load(Ordering::SeqCst), 0);
        assert_eq!(lock(&endpoint.registry).handlers.len(), 1);
    }

    #[tokio::test]
    async fn close_calls_every_remaining_closer_once() {
        let (endpoint, _stream, _sink) = setup();
        let (tx, mut closed) = mpsc::unbounded_channel();

        let mut handles = Vec::new();
        for index in 0..4usize {
            let tx = tx.clone();
            handles.push(
                endpoint
                    .add_handler(
                        |_: &Header| Verdict::IGNORE,
                        |_| Ok(()),
                        move |reason| {
                            let _ = tx.send((index, reason));
                        },
                    )
                    .unwrap(),
            );
        }
        drop(tx);
        handles[1].cancel();
        handles[1].cancel();

        endpoint.close().await;
        let mut indices = Vec::new();
        while let Some((index, reason)) = closed.recv().await {
            assert_eq!(reason, CloseReason::Local);
            indices.push(index);
        }
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 2, 3]);
        assert_eq!(endpoint.state(), EndpointState::Closed);

        // Cancelling after close is still a no-op.
        handles[0].cancel();
    }

    #[tokio::test]
    async fn remote_close_drives_closers() {
        let (endpoint, stream, sink) = setup();
        let (tx, mut closed) = mpsc::unbounded_channel();
        endpoint
            .add_handler(
                |_: &Header| Verdict::IGNORE,
                |_| Ok(()),
                move |reason| {
                    let _ = tx.send(reason);
                },
            )
            .unwrap();

        drop(stream);
        drop(sink);
        assert_eq!(recv(&mut closed).await, CloseReason::RemoteClosed);
        assert!(matches!(
            endpoint.add_handler(|_: &Header| Verdict::IGNORE, |_| Ok(()), |_| {}),
            Err(PeerError::Disconnected(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn slow_consumer_does_not_block_others() {
        let (endpoint, _stream, mut sink) = setup();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let gate_rx = Mutex::new(gate_rx);
        endpoint
            .add_handler(
                |_: &Header| Verdict::OBSERVE,
                move |_| {
                    // Blocks this handler's task until the test releases it.
                    let _ = lock(&gate_rx).recv_timeout(Duration::from_secs(5));
                    Ok(())
                },
                |_| {},
            )
            .unwrap();
        let (tx, mut done) = mpsc::unbounded_channel();
        endpoint
            .add_handler(
                |_: &Header| Verdict::OBSERVE,
                move |message: Message| {
                    let _ = tx.send(message.header.id);
                    Ok(())
                },
                |_| {},
            )
            .unwrap();

        for id in 1..=2 {
            sink.send(message(MessageKind::Event, id)).await.unwrap();
        }
        assert_eq!(recv(&mut done).await, 1);
        assert_eq!(recv(&mut done).await, 2);
        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();
    }

    #[tokio::test]
    async fn request_matches_reply_by_id() {
        let (endpoint, mut stream, mut sink) = setup();
        let server = tokio::spawn(async move {
            let call = stream.next().await.unwrap().unwrap();
            assert_eq!(call.header.kind, MessageKind::Call);
            // An unrelated reply first, then the real one.
            sink.send(message(MessageKind::Reply, call.header.id + 100))
                .await
                .unwrap();
            sink.send(Message::new(call.header.reply(), Bytes::from_static(b"ok")))
                .await
                .unwrap();
            (stream, sink)
        });

        let reply = endpoint.call(0, 0, 8, Bytes::new()).await.unwrap();
        assert_eq!(reply.header.kind, MessageKind::Reply);
        assert_eq!(reply.payload.as_ref(), b"ok");
        let _keep_open = server.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_get_their_own_replies() {
        const CALLERS: usize = 16;
        let (endpoint, mut stream, mut sink) = setup();
        let endpoint = Arc::new(endpoint);

        // Answer only once every call is in, newest first.
        let server = tokio::spawn(async move {
            let mut calls = Vec::with_capacity(CALLERS);
            while calls.len() < CALLERS {
                calls.push(stream.next().await.unwrap().unwrap());
            }
            for call in calls.iter().rev() {
                sink.send(Message::new(call.header.reply(), call.payload.clone()))
                    .await
                    .unwrap();
            }
            (stream, sink)
        });

        let mut callers = tokio::task::JoinSet::new();
        for _ in 0..CALLERS {
            let endpoint = Arc::clone(&endpoint);
            callers.spawn(async move {
                let id = endpoint.next_message_id();
                let payload = Bytes::copy_from_slice(&id.to_le_bytes());
                let call = Message::new(Header::new(MessageKind::Call, 0, 0, 8, id), payload.clone());
                let reply = endpoint.request(call).await.unwrap();
                assert_eq!(reply.header.id, id);
                assert_eq!(reply.header.kind, MessageKind::Reply);
                assert_eq!(reply.payload, payload);
                id
            });
        }

        let mut ids = Vec::with_capacity(CALLERS);
        while let Some(done) = callers.join_next().await {
            ids.push(done.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), CALLERS);
        let _keep_open = server.await.unwrap();
    }

    #[tokio::test]
    async fn error_message_becomes_remote_error() {
        let (endpoint, mut stream, mut sink) = setup();
        let server = tokio::spawn(async move {
            let call = stream.next().await.unwrap().unwrap();
            sink.send(Message::new(call.header.error(), error_payload("not authenticated")))
                .await
                .unwrap();
            (stream, sink)
        });

        let err = endpoint.call(1, 1, 108, Bytes::new()).await.unwrap_err();
        assert!(matches!(err, PeerError::Remote(ref text) if text == "not authenticated"));
        let _keep_open = server.await.unwrap();
    }

    #[tokio::test]
    async fn request_within_times_out_and_closes() {
        let (endpoint, _stream, _sink) = setup();
        let call = Message::new(
            Header::new(MessageKind::Call, 0, 0, 8, endpoint.next_message_id()),
            Bytes::new(),
        );
        let err = request_within(&endpoint, call, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::Timeout(_)));
        assert_eq!(endpoint.state(), EndpointState::Closed);
        assert!(matches!(
            endpoint.send(message(MessageKind::Post, 1)).await,
            Err(PeerError::Closed)
        ));
    }

    #[test]
    fn error_description_falls_back() {
        assert_eq!(error_description(&error_payload("boom")), "boom");
        assert_eq!(
            error_description(b"\x01"),
            "undecodable error payload (1 bytes)"
        );
    }

    #[test]
    fn close_reason_maps_to_error_kinds() {
        assert!(matches!(
            PeerError::from(CloseReason::Local),
            PeerError::Closed
        ));
        assert!(matches!(
            PeerError::from(CloseReason::RemoteClosed),
            PeerError::Disconnected(_)
        ));
    }
}
