//! Request/response correlation over a connected UDP socket.
//!
//! UDP gives no delivery, ordering or reply matching, so the transport builds
//! those itself. Every request gets a correlation id and a slot in the
//! pending table; one dispatcher task reads every inbound datagram, decodes
//! it once and hands it to the slot whose id it carries. A request resends
//! its datagram, byte for byte, whenever an attempt window passes without a
//! reply, until the configured number of attempts is used up.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;
use futures::future::{self, Either};
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::errors::Error;
use crate::history::{MessageHistory, MessageType};
use crate::protocol::{self, Command, Response};
use crate::runtime::{self, AsyncUdpSocket, TimedOut, UdpSocket};

type Result<T> = std::result::Result<T, Error>;

/// Correlation ids cycle through `1..=MAX_REQUEST_ID`.
pub const MAX_REQUEST_ID: u32 = 1000;

const RECV_BUFFER_SIZE: usize = 4096;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One outstanding request. The slot reserves its id until the request
/// returns, even after the reply has been delivered.
struct PendingSlot {
    reply: Option<oneshot::Sender<Value>>,
}

#[derive(Default)]
struct PendingTable {
    last_id: u32,
    slots: HashMap<u32, PendingSlot>,
    closed: bool,
}

impl PendingTable {
    /// Reserve the next free id after the last one handed out.
    fn allocate(&mut self) -> Result<(u32, oneshot::Receiver<Value>)> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.slots.len() >= MAX_REQUEST_ID as usize {
            return Err(Error::Busy(MAX_REQUEST_ID));
        }

        let mut id = self.last_id;
        loop {
            id = id % MAX_REQUEST_ID + 1;
            if !self.slots.contains_key(&id) {
                break;
            }
        }
        self.last_id = id;

        let (tx, rx) = oneshot::channel();
        self.slots.insert(id, PendingSlot { reply: Some(tx) });
        Ok((id, rx))
    }

    /// Deliver a reply. Returns false when nobody is waiting for `id`.
    fn fulfil(&mut self, id: u32, reply: Value) -> bool {
        match self.slots.get_mut(&id).and_then(|slot| slot.reply.take()) {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    fn release(&mut self, id: u32) {
        self.slots.remove(&id);
    }

    /// Mark closed and drop every waiting sender; receivers observe
    /// cancellation on their next poll.
    fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        for slot in self.slots.values_mut() {
            slot.reply.take();
        }
        true
    }
}

/// State shared between request futures and the dispatcher task.
struct Shared {
    pending: Mutex<PendingTable>,
    history: Mutex<MessageHistory>,
}

impl Shared {
    fn new() -> Self {
        Shared {
            pending: Mutex::new(PendingTable::default()),
            history: Mutex::new(MessageHistory::new()),
        }
    }

    fn record(&self, msg_type: MessageType, id: Option<u32>, method: Option<&str>) {
        lock(&self.history).record(msg_type, id, method);
    }

    fn record_error(&self, err: &Error) {
        lock(&self.history).record_error(&err.to_string());
    }

    /// Route one inbound datagram to the request waiting for its id.
    fn dispatch(&self, datagram: &[u8]) {
        let reply: Value = match serde_json::from_slice(datagram) {
            Ok(v) => v,
            Err(e) => {
                debug!("dropping undecodable datagram ({} bytes): {e}", datagram.len());
                self.record(MessageType::Dropped, None, None);
                return;
            }
        };

        let method = reply.get("method").and_then(Value::as_str).map(String::from);
        let Some(id) = protocol::reply_id(&reply) else {
            debug!("dropping datagram without a correlation id: {reply}");
            self.record(MessageType::Dropped, None, method.as_deref());
            return;
        };

        if lock(&self.pending).fulfil(id, reply) {
            debug!("matched reply for request {id}");
            self.record(MessageType::Receive, Some(id), method.as_deref());
        } else {
            debug!("no pending request for id {id}, dropping reply");
            self.record(MessageType::Dropped, Some(id), method.as_deref());
        }
    }
}

/// Frees a pending slot when the request future finishes or is dropped.
struct SlotGuard<'a> {
    shared: &'a Shared,
    id: u32,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        lock(&self.shared.pending).release(self.id);
    }
}

/// Reliable-enough request/response over UDP to a single peer.
///
/// Requests may be issued concurrently from many tasks; ids of outstanding
/// requests never collide. Closing the transport settles every outstanding
/// request with [`Error::Closed`].
///
/// # Example
///
/// ```no_run
/// use std::net::SocketAddr;
/// use wiz_light::{ClientConfig, Command, Transport};
///
/// # async fn run() -> Result<(), wiz_light::Error> {
/// let peer: SocketAddr = "192.168.1.100:38899".parse().unwrap();
/// let transport = Transport::connect(peer, ClientConfig::default()).await?;
/// let reply = transport.request(&Command::get_pilot()).await?;
/// println!("{reply}");
/// transport.close();
/// # Ok(())
/// # }
/// ```
pub struct Transport<S: AsyncUdpSocket = UdpSocket> {
    peer: SocketAddr,
    config: ClientConfig,
    socket: Mutex<Option<Arc<S>>>,
    shared: Arc<Shared>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl Transport {
    /// Bind an ephemeral local port, connect it to `peer` and start the
    /// dispatcher.
    pub async fn connect(peer: SocketAddr, config: ClientConfig) -> Result<Self> {
        let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| Error::socket("bind", e))?;
        socket
            .connect(peer)
            .await
            .map_err(|e| Error::socket("connect", e))?;
        if let Ok(addr) = socket.local_addr() {
            debug!("transport {addr} -> {peer} ready");
        }
        Ok(Transport::with_socket(socket, peer, config))
    }
}

impl<S: AsyncUdpSocket> Transport<S> {
    /// Wrap an already connected socket and start the dispatcher on it.
    pub(crate) fn with_socket(socket: S, peer: SocketAddr, config: ClientConfig) -> Self
    where
        S: 'static,
    {
        let socket = Arc::new(socket);
        let shared = Arc::new(Shared::new());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        runtime::spawn(dispatch_loop(
            Arc::clone(&socket),
            Arc::clone(&shared),
            shutdown_rx,
        ));

        Transport {
            peer,
            config,
            socket: Mutex::new(Some(socket)),
            shared,
            shutdown: Mutex::new(Some(shutdown_tx)),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.shared.pending).closed
    }

    /// Number of requests currently holding an id.
    pub fn pending(&self) -> usize {
        lock(&self.shared.pending).slots.len()
    }

    pub fn history(&self) -> MessageHistory {
        lock(&self.shared.history).clone()
    }

    /// Send `command` and wait for the reply carrying its id.
    ///
    /// Returns the decoded reply as-is, whether it holds a `result` or an
    /// `error`. Fails with [`Error::Timeout`] when no attempt got a reply,
    /// [`Error::SendFailure`] when the last attempt could not even be sent,
    /// and [`Error::Closed`] if the transport is closed meanwhile.
    pub async fn request(&self, command: &Command) -> Result<Value> {
        let socket = lock(&self.socket).clone().ok_or(Error::Closed)?;
        let (id, mut reply) = lock(&self.shared.pending).allocate()?;
        let _slot = SlotGuard {
            shared: &self.shared,
            id,
        };

        let datagram = command.to_datagram(id)?;
        let method = command.method.as_ref();
        let attempts = self.config.attempts.max(1);
        let mut last_error = Error::Timeout { id, attempts };

        for attempt in 1..=attempts {
            if self.is_closed() {
                return Err(Error::Closed);
            }
            let msg_type = if attempt == 1 {
                MessageType::Send
            } else {
                MessageType::Retry
            };
            self.shared.record(msg_type, Some(id), Some(method));

            if let Err(e) = socket.send(&datagram).await {
                warn!(
                    "request {id}: sending {method} to {} failed (attempt {attempt}/{attempts}): {e}",
                    self.peer
                );
                last_error = Error::SendFailure(e);
                continue;
            }
            debug!("request {id}: sent {method} (attempt {attempt}/{attempts})");

            match runtime::timeout(self.config.timeout, &mut reply).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(oneshot::Canceled)) => return Err(Error::Closed),
                Err(TimedOut) => {
                    if attempt < attempts {
                        warn!(
                            "request {id}: no reply within {:?}, retrying",
                            self.config.timeout
                        );
                    }
                    last_error = Error::Timeout { id, attempts };
                }
            }
        }

        // A reply may have landed between the last timer firing and now.
        if let Ok(Some(value)) = reply.try_recv() {
            return Ok(value);
        }

        self.shared.record_error(&last_error);
        Err(last_error)
    }

    /// [`Transport::request`] followed by decoding into a typed [`Response`].
    ///
    /// A reply carrying an `error` member fails with [`Error::Device`].
    pub async fn call<R: DeserializeOwned>(&self, command: &Command) -> Result<Response<R>> {
        let reply = self.request(command).await?;
        Response::from_value(reply).inspect_err(|e| self.shared.record_error(e))
    }

    /// Release the socket and settle every outstanding request with
    /// [`Error::Closed`]. Calling it again does nothing.
    pub fn close(&self) {
        // The dispatcher may already have closed the table after a socket
        // failure; the socket and shutdown signal are still ours to drop.
        let first = lock(&self.shared.pending).close();
        if let Some(tx) = lock(&self.shutdown).take() {
            let _ = tx.send(());
        }
        lock(&self.socket).take();
        if first {
            debug!("transport to {} closed", self.peer);
        }
    }
}

impl<S: AsyncUdpSocket> Drop for Transport<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: AsyncUdpSocket> std::fmt::Debug for Transport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer", &self.peer)
            .field("config", &self.config)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn dispatch_loop<S: AsyncUdpSocket>(
    socket: Arc<S>,
    shared: Arc<Shared>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut buffer = [0u8; RECV_BUFFER_SIZE];

    loop {
        let received = {
            let recv = socket.recv(&mut buffer);
            futures::pin_mut!(recv);
            match future::select(recv, &mut shutdown).await {
                Either::Left((res, _)) => res,
                Either::Right(_) => break,
            }
        };

        match received {
            Ok(len) => shared.dispatch(&buffer[..len]),
            // ICMP port unreachable from an earlier send surfaces here.
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::ConnectionReset
                ) =>
            {
                debug!("peer unreachable: {e}");
            }
            Err(e) => {
                error!("receive failed, closing transport: {e}");
                lock(&shared.history).record_error(&e.to_string());
                lock(&shared.pending).close();
                break;
            }
        }
    }
    debug!("dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_cycle_and_wrap() {
        let mut table = PendingTable::default();
        for expected in 1..=MAX_REQUEST_ID {
            let (id, _rx) = table.allocate().unwrap();
            assert_eq!(id, expected);
            table.release(id);
        }
        let (id, _rx) = table.allocate().unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_outstanding_ids_are_skipped() {
        let mut table = PendingTable::default();
        let (first, _rx1) = table.allocate().unwrap();
        assert_eq!(first, 1);
        for _ in 2..=MAX_REQUEST_ID {
            let (id, _rx) = table.allocate().unwrap();
            table.release(id);
        }
        // Counter wrapped; id 1 is still outstanding.
        let (id, _rx) = table.allocate().unwrap();
        assert_eq!(id, 2);
    }

    #[test]
    fn test_busy_when_every_id_is_taken() {
        let mut table = PendingTable::default();
        let receivers: Vec<_> = (0..MAX_REQUEST_ID)
            .map(|_| table.allocate().unwrap())
            .collect();
        assert_eq!(receivers.len(), MAX_REQUEST_ID as usize);
        assert!(matches!(table.allocate(), Err(Error::Busy(MAX_REQUEST_ID))));
    }

    #[test]
    fn test_fulfil_only_matching_id() {
        let mut table = PendingTable::default();
        let (id, mut rx) = table.allocate().unwrap();

        assert!(!table.fulfil(id + 1, json!({"id": id + 1})));
        assert_eq!(rx.try_recv(), Ok(None));

        assert!(table.fulfil(id, json!({"id": id})));
        assert_eq!(rx.try_recv(), Ok(Some(json!({"id": id}))));

        // Delivered once; a duplicate reply finds no sender.
        assert!(!table.fulfil(id, json!({"id": id})));
        // The id stays reserved until released.
        assert!(table.slots.contains_key(&id));
    }

    #[test]
    fn test_close_cancels_waiters() {
        let mut table = PendingTable::default();
        let (_, mut rx) = table.allocate().unwrap();
        assert!(table.close());
        assert!(rx.try_recv().is_err());
        assert!(!table.close());
        assert!(matches!(table.allocate(), Err(Error::Closed)));
    }

    #[test]
    fn test_dispatch_counts_dropped() {
        let shared = Shared::new();
        let (id, mut rx) = lock(&shared.pending).allocate().unwrap();

        shared.dispatch(b"not json");
        shared.dispatch(br#"{"method":"syncPilot","params":{}}"#);
        shared.dispatch(format!(r#"{{"id":{},"result":{{}}}}"#, id + 7).as_bytes());
        assert_eq!(rx.try_recv(), Ok(None));

        shared.dispatch(format!(r#"{{"id":{id},"method":"getPilot","result":{{}}}}"#).as_bytes());
        assert!(matches!(rx.try_recv(), Ok(Some(_))));

        let summary = lock(&shared.history).summary();
        assert_eq!(summary.dropped_count, 3);
        assert_eq!(summary.receive_count, 1);
    }
}

#[cfg(all(test, feature = "runtime-tokio"))]
mod socket_tests {
    use super::*;
    use serde_json::json;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc;

    /// In-memory socket: the first `failing_sends` sends error out, later
    /// ones are acknowledged through the inbox.
    struct FlakySocket {
        failing_sends: usize,
        sends: Arc<AtomicUsize>,
        broken_recv: bool,
        outbox: mpsc::UnboundedSender<Vec<u8>>,
        inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    }

    impl FlakySocket {
        fn new(failing_sends: usize, broken_recv: bool) -> (Self, Arc<AtomicUsize>) {
            let (outbox, inbox) = mpsc::unbounded_channel();
            let sends = Arc::new(AtomicUsize::new(0));
            let socket = FlakySocket {
                failing_sends,
                sends: Arc::clone(&sends),
                broken_recv,
                outbox,
                inbox: tokio::sync::Mutex::new(inbox),
            };
            (socket, sends)
        }
    }

    impl AsyncUdpSocket for FlakySocket {
        async fn bind(_addr: &str) -> io::Result<Self> {
            Ok(FlakySocket::new(0, false).0)
        }

        async fn connect(&self, _peer: SocketAddr) -> io::Result<()> {
            Ok(())
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 40000)))
        }

        async fn send(&self, buf: &[u8]) -> io::Result<usize> {
            let n = self.sends.fetch_add(1, Ordering::SeqCst);
            if n < self.failing_sends {
                return Err(io::Error::new(
                    io::ErrorKind::NetworkUnreachable,
                    "network is unreachable",
                ));
            }
            let request: Value = serde_json::from_slice(buf)?;
            let reply = json!({
                "id": request["id"],
                "method": request["method"],
                "env": "pro",
                "result": {"success": true}
            });
            let _ = self.outbox.send(serde_json::to_vec(&reply)?);
            Ok(buf.len())
        }

        async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            if self.broken_recv {
                return Err(io::Error::other("socket torn down"));
            }
            let datagram = self
                .inbox
                .lock()
                .await
                .recv()
                .await
                .ok_or_else(|| io::Error::other("inbox closed"))?;
            buf[..datagram.len()].copy_from_slice(&datagram);
            Ok(datagram.len())
        }
    }

    fn transport(socket: FlakySocket, attempts: u32) -> Transport<FlakySocket> {
        let config = ClientConfig::default()
            .with_attempts(attempts)
            .with_timeout(Duration::from_secs(5));
        Transport::with_socket(socket, SocketAddr::from(([127, 0, 0, 1], 38899)), config)
    }

    #[tokio::test]
    async fn test_send_failures_use_up_attempts_without_waiting() {
        let (socket, sends) = FlakySocket::new(usize::MAX, false);
        let transport = transport(socket, 3);

        let started = Instant::now();
        let err = transport.request(&Command::get_pilot()).await.unwrap_err();

        match err {
            Error::SendFailure(e) => assert_eq!(e.kind(), io::ErrorKind::NetworkUnreachable),
            other => panic!("expected a send failure, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(sends.load(Ordering::SeqCst), 3);

        let summary = transport.history().summary();
        assert_eq!(summary.send_count, 1);
        assert_eq!(summary.retry_count, 2);
        assert!(summary.last_error.is_some());
        assert_eq!(transport.pending(), 0);
    }

    #[tokio::test]
    async fn test_resend_after_send_failure_gets_reply() {
        let (socket, sends) = FlakySocket::new(2, false);
        let transport = transport(socket, 3);

        let started = Instant::now();
        let reply = transport.request(&Command::get_pilot()).await.unwrap();

        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["success"], true);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(sends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_receive_failure_closes_transport() {
        let (socket, _sends) = FlakySocket::new(0, true);
        let transport = transport(socket, 3);

        let settled = tokio::time::timeout(
            Duration::from_secs(1),
            transport.request(&Command::get_pilot()),
        )
        .await
        .expect("request settles once the dispatcher is gone");
        assert!(matches!(settled, Err(Error::Closed)));
        assert!(transport.is_closed());
        assert!(transport.history().last_error().is_some());

        // Explicit close afterwards still releases everything.
        transport.close();
        assert!(matches!(
            transport.request(&Command::get_pilot()).await,
            Err(Error::Closed)
        ));
    }
}
