/*!
Byte transports polled by the clients.

A client never touches a socket directly. It asks its [`Transport`] for
events that are already available and queues outgoing bytes; both calls
return immediately.

[`SocketTransport`] follows the two-stage layout of a capture pipeline:
1. An I/O thread owning a small tokio runtime connects, reads and writes
2. Inbound data is handed over through a bounded crossbeam channel
3. The polling side drains that channel once per tick

[`MemoryTransport`] is an in-process pair used to script a device in tests.
*/

use crate::error::TransportError;
use bytes::Bytes;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Upper bound on transport events a client handles in one tick
pub const MAX_EVENTS_PER_TICK: usize = 64;

/// Default capacity of the I/O thread → client channel
pub const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// How long the I/O thread waits for room to report why it stopped
const CLOSE_NOTICE_TIMEOUT: Duration = Duration::from_secs(1);

/// Size of a single socket read
const READ_CHUNK_BYTES: usize = 4096;

/// Something that happened on the link since the last poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link is usable; bytes can be sent
    Opened,
    Data(Bytes),
    /// The link is gone; carries a human-readable reason
    Closed(String),
}

/// Non-blocking byte transport
pub trait Transport: Send {
    /// Next event that is already available, never blocks
    fn try_next(&mut self) -> Option<TransportEvent>;

    /// Queue bytes for transmission
    fn send(&mut self, data: Bytes) -> Result<(), TransportError>;

    /// Drop the current link, if any, and start a new connection attempt
    fn reopen(&mut self) -> Result<(), TransportError>;

    /// Drop the current link without reconnecting
    fn close(&mut self);

    /// Short label for log messages
    fn describe(&self) -> String;
}

/// Socket flavour used by [`SocketTransport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketKind {
    #[default]
    Tcp,
    Udp,
}

/// Socket transport parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketSettings {
    pub kind: SocketKind,
    /// Remote `host:port`
    pub remote: String,
    /// Local bind address for UDP
    pub bind: String,
    pub connect_timeout: Duration,
    pub recv_buffer_bytes: usize,
    /// Events buffered for the client; the session ends when it overflows
    pub inbound_capacity: usize,
}

impl SocketSettings {
    pub fn new(kind: SocketKind, remote: impl Into<String>) -> Self {
        Self {
            kind,
            remote: remote.into(),
            bind: "0.0.0.0:0".to_string(),
            connect_timeout: Duration::from_secs(5),
            recv_buffer_bytes: 256 * 1024,
            inbound_capacity: INBOUND_CHANNEL_CAPACITY,
        }
    }
}

/// TCP or connected-UDP transport backed by a background I/O thread
pub struct SocketTransport {
    settings: SocketSettings,
    inbound: Option<Receiver<TransportEvent>>,
    outbound: Option<UnboundedSender<Bytes>>,
    open: bool,
}

impl SocketTransport {
    /// Create an idle transport; nothing happens until [`Transport::reopen`]
    pub fn new(settings: SocketSettings) -> Self {
        Self {
            settings,
            inbound: None,
            outbound: None,
            open: false,
        }
    }

    pub fn settings(&self) -> &SocketSettings {
        &self.settings
    }

    fn shutdown(&mut self) {
        // Dropping the outbound sender ends the worker's session loop
        self.inbound = None;
        self.outbound = None;
        self.open = false;
    }
}

impl Transport for SocketTransport {
    fn try_next(&mut self) -> Option<TransportEvent> {
        let inbound = self.inbound.as_ref()?;
        match inbound.try_recv() {
            Ok(TransportEvent::Opened) => {
                self.open = true;
                Some(TransportEvent::Opened)
            }
            Ok(TransportEvent::Closed(reason)) => {
                self.shutdown();
                Some(TransportEvent::Closed(reason))
            }
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.shutdown();
                Some(TransportEvent::Closed("I/O worker exited".to_string()))
            }
        }
    }

    fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound.send(data).map_err(|_| TransportError::Closed)
    }

    fn reopen(&mut self) -> Result<(), TransportError> {
        self.shutdown();

        let (inbound_tx, inbound_rx) = bounded::<TransportEvent>(self.settings.inbound_capacity.max(1));
        let (outbound_tx, outbound_rx) = unbounded_channel::<Bytes>();
        spawn_worker(self.settings.clone(), inbound_tx, outbound_rx)?;

        self.inbound = Some(inbound_rx);
        self.outbound = Some(outbound_tx);
        Ok(())
    }

    fn close(&mut self) {
        self.shutdown();
    }

    fn describe(&self) -> String {
        let kind = match self.settings.kind {
            SocketKind::Tcp => "tcp",
            SocketKind::Udp => "udp",
        };
        format!("{}://{}", kind, self.settings.remote)
    }
}

/// Start the I/O thread for one connection attempt
fn spawn_worker(
    settings: SocketSettings,
    inbound_tx: Sender<TransportEvent>,
    outbound_rx: UnboundedReceiver<Bytes>,
) -> Result<(), TransportError> {
    let thread_name = format!("telescope-io-{}", settings.remote);
    thread::Builder::new()
        .name(thread_name)
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = inbound_tx.try_send(TransportEvent::Closed(format!(
                        "failed to start I/O runtime: {}",
                        e
                    )));
                    return;
                }
            };

            let result = runtime.block_on(async {
                match settings.kind {
                    SocketKind::Tcp => tcp_session(&settings, &inbound_tx, outbound_rx).await,
                    SocketKind::Udp => udp_session(&settings, &inbound_tx, outbound_rx).await,
                }
            });

            let reason = match result {
                Ok(()) => "connection closed".to_string(),
                Err(e) => e.to_string(),
            };
            debug!("I/O worker for {} finished: {}", settings.remote, reason);
            // If the client never makes room it sees the disconnect instead
            let _ = inbound_tx.send_timeout(TransportEvent::Closed(reason), CLOSE_NOTICE_TIMEOUT);
        })
        .map_err(|e| TransportError::Worker(e.to_string()))?;

    Ok(())
}

/// Hand a received chunk to the polling side; false once nobody is listening.
///
/// A full channel ends the session: dropping the chunk would leave a gap in
/// the byte stream the client's decoder cannot detect.
fn forward(inbound_tx: &Sender<TransportEvent>, chunk: &[u8]) -> io::Result<bool> {
    match inbound_tx.try_send(TransportEvent::Data(Bytes::copy_from_slice(chunk))) {
        Ok(()) => Ok(true),
        Err(TrySendError::Full(_)) => {
            warn!("⚠️ Inbound channel full with {} bytes pending, closing link", chunk.len());
            Err(io::Error::new(io::ErrorKind::Other, "inbound channel full"))
        }
        Err(TrySendError::Disconnected(_)) => Ok(false),
    }
}

async fn tcp_session(
    settings: &SocketSettings,
    inbound_tx: &Sender<TransportEvent>,
    mut outbound_rx: UnboundedReceiver<Bytes>,
) -> io::Result<()> {
    info!("🔌 Connecting to tcp://{}", settings.remote);
    let stream = tokio::time::timeout(settings.connect_timeout, TcpStream::connect(settings.remote.as_str()))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;

    stream.set_nodelay(true)?;
    let sock_ref = socket2::SockRef::from(&stream);
    sock_ref.set_keepalive(true)?;
    sock_ref.set_recv_buffer_size(settings.recv_buffer_bytes)?;
    info!("✅ Connected to tcp://{}", settings.remote);

    if inbound_tx.try_send(TransportEvent::Opened).is_err() {
        return Ok(());
    }

    let (mut reader, mut writer) = stream.into_split();
    let mut buffer = vec![0u8; READ_CHUNK_BYTES];

    loop {
        tokio::select! {
            read = reader.read(&mut buffer) => {
                let bytes_received = read?;
                if bytes_received == 0 {
                    return Ok(());
                }
                if !forward(inbound_tx, &buffer[..bytes_received])? {
                    return Ok(());
                }
            }
            outgoing = outbound_rx.recv() => match outgoing {
                Some(bytes) => writer.write_all(&bytes).await?,
                None => return Ok(()),
            },
        }
    }
}

async fn udp_session(
    settings: &SocketSettings,
    inbound_tx: &Sender<TransportEvent>,
    mut outbound_rx: UnboundedReceiver<Bytes>,
) -> io::Result<()> {
    info!("🔌 Binding UDP socket to {} for udp://{}", settings.bind, settings.remote);
    let socket = UdpSocket::bind(settings.bind.as_str()).await?;
    socket.connect(settings.remote.as_str()).await?;

    let sock_ref = socket2::SockRef::from(&socket);
    sock_ref.set_recv_buffer_size(settings.recv_buffer_bytes)?;
    info!("✅ UDP socket ready for udp://{}", settings.remote);

    if inbound_tx.try_send(TransportEvent::Opened).is_err() {
        return Ok(());
    }

    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        tokio::select! {
            received = socket.recv(&mut buffer) => {
                let bytes_received = received?;
                if !forward(inbound_tx, &buffer[..bytes_received])? {
                    return Ok(());
                }
            }
            outgoing = outbound_rx.recv() => match outgoing {
                Some(bytes) => {
                    socket.send(&bytes).await?;
                }
                None => return Ok(()),
            },
        }
    }
}

/// In-process transport driven by a [`MemoryPeer`]
pub struct MemoryTransport {
    events: Receiver<TransportEvent>,
    sent: Sender<Bytes>,
    open: bool,
    reopen_count: Arc<AtomicUsize>,
}

/// Device side of a [`MemoryTransport`]
pub struct MemoryPeer {
    events: Sender<TransportEvent>,
    sent: Receiver<Bytes>,
    reopen_count: Arc<AtomicUsize>,
}

/// Create a connected transport/peer pair
pub fn memory_pair() -> (MemoryTransport, MemoryPeer) {
    let (events_tx, events_rx) = unbounded();
    let (sent_tx, sent_rx) = unbounded();
    let reopen_count = Arc::new(AtomicUsize::new(0));

    let transport = MemoryTransport {
        events: events_rx,
        sent: sent_tx,
        open: false,
        reopen_count: Arc::clone(&reopen_count),
    };
    let peer = MemoryPeer {
        events: events_tx,
        sent: sent_rx,
        reopen_count,
    };
    (transport, peer)
}

impl Transport for MemoryTransport {
    fn try_next(&mut self) -> Option<TransportEvent> {
        let event = self.events.try_recv().ok()?;
        match event {
            TransportEvent::Opened => self.open = true,
            TransportEvent::Closed(_) => self.open = false,
            TransportEvent::Data(_) => {}
        }
        Some(event)
    }

    fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.sent.send(data).map_err(|_| TransportError::Closed)
    }

    fn reopen(&mut self) -> Result<(), TransportError> {
        self.open = false;
        self.reopen_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl MemoryPeer {
    /// Report the link as usable
    pub fn open(&self) {
        let _ = self.events.send(TransportEvent::Opened);
    }

    /// Deliver bytes to the client
    pub fn push(&self, data: &[u8]) {
        let _ = self.events.send(TransportEvent::Data(Bytes::copy_from_slice(data)));
    }

    pub fn close(&self, reason: &str) {
        let _ = self.events.send(TransportEvent::Closed(reason.to_string()));
    }

    /// Everything the client sent since the last call, one entry per send
    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.try_iter().collect()
    }

    /// Everything the client sent since the last call, concatenated
    pub fn sent_bytes(&self) -> Vec<u8> {
        self.sent().iter().flat_map(|b| b.iter().copied()).collect()
    }

    /// Number of times the client asked for a new connection
    pub fn reopen_count(&self) -> usize {
        self.reopen_count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Instant;

    /// Poll until `pred` accepts an event or the deadline passes
    fn wait_for<T: Transport>(
        transport: &mut T,
        mut pred: impl FnMut(&TransportEvent) -> bool,
    ) -> Option<TransportEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(event) = transport.try_next() {
                if pred(&event) {
                    return Some(event);
                }
            } else {
                thread::sleep(Duration::from_millis(5));
            }
        }
        None
    }

    #[test]
    fn test_memory_pair_send_requires_open() {
        let (mut transport, peer) = memory_pair();
        assert!(transport.send(Bytes::from_static(b"x")).is_err());

        peer.open();
        assert_eq!(transport.try_next(), Some(TransportEvent::Opened));
        transport.send(Bytes::from_static(b"ab")).unwrap();
        transport.send(Bytes::from_static(b"c")).unwrap();
        assert_eq!(peer.sent_bytes(), b"abc");

        peer.close("bye");
        assert_eq!(transport.try_next(), Some(TransportEvent::Closed("bye".to_string())));
        assert!(transport.send(Bytes::from_static(b"x")).is_err());
        assert_eq!(transport.try_next(), None);
    }

    #[test]
    fn test_memory_reopen_is_counted() {
        let (mut transport, peer) = memory_pair();
        transport.reopen().unwrap();
        transport.reopen().unwrap();
        assert_eq!(peer.reopen_count(), 2);
    }

    #[test]
    fn test_tcp_transport_exchanges_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 4];
            stream.read_exact(&mut request).unwrap();
            stream.write_all(b"pong").unwrap();
            request
        });

        let mut transport = SocketTransport::new(SocketSettings::new(SocketKind::Tcp, address));
        assert_eq!(transport.try_next(), None);
        transport.reopen().unwrap();

        assert_eq!(
            wait_for(&mut transport, |e| *e == TransportEvent::Opened),
            Some(TransportEvent::Opened)
        );
        transport.send(Bytes::from_static(b"ping")).unwrap();

        let mut received = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while received.len() < 4 && Instant::now() < deadline {
            match transport.try_next() {
                Some(TransportEvent::Data(bytes)) => received.extend_from_slice(&bytes),
                Some(other) => panic!("unexpected event {:?}", other),
                None => thread::sleep(Duration::from_millis(5)),
            }
        }
        assert_eq!(received, b"pong");
        assert_eq!(&server.join().unwrap(), b"ping");

        // The server dropped its end of the stream
        assert!(matches!(
            wait_for(&mut transport, |e| matches!(e, TransportEvent::Closed(_))),
            Some(TransportEvent::Closed(_))
        ));
        assert_eq!(transport.try_next(), None);
        assert!(transport.send(Bytes::from_static(b"late")).is_err());
    }

    #[test]
    fn test_tcp_overflow_closes_link_instead_of_dropping_data() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let _ = stream.write_all(&[0x18; 4096]);
            thread::sleep(Duration::from_millis(50));
            let _ = stream.write_all(&[0x18; 4096]);
            // Hold the connection until the client side goes away
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest);
        });

        let mut settings = SocketSettings::new(SocketKind::Tcp, address);
        settings.inbound_capacity = 1;
        let mut transport = SocketTransport::new(settings);
        transport.reopen().unwrap();

        // Leave Opened unread so the first chunk finds the channel full
        thread::sleep(Duration::from_millis(300));

        let mut events = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            match transport.try_next() {
                Some(TransportEvent::Closed(reason)) => {
                    events.push(TransportEvent::Closed(reason));
                    break;
                }
                Some(event) => events.push(event),
                None => thread::sleep(Duration::from_millis(5)),
            }
        }

        assert_eq!(events.first(), Some(&TransportEvent::Opened));
        match events.last() {
            Some(TransportEvent::Closed(reason)) => assert!(reason.contains("full"), "reason: {}", reason),
            other => panic!("expected Closed, got {:?}", other),
        }
        assert!(transport.send(Bytes::from_static(b"x")).is_err());
        server.join().unwrap();
    }

    #[test]
    fn test_tcp_connect_failure_reports_closed() {
        // Bind then drop to get a port nobody listens on
        let address = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let mut transport = SocketTransport::new(SocketSettings::new(SocketKind::Tcp, address));
        transport.reopen().unwrap();

        let event = wait_for(&mut transport, |_| true);
        assert!(matches!(event, Some(TransportEvent::Closed(_))));
    }
}
