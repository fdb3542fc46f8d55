//! Persistent duplex connection to the host's event feed.
//!
//! One TCP connection, newline-framed text in both directions. The run
//! loop lives on its own task: it dials, pumps inbound lines to the
//! caller's callback, drains an outbound queue, and on unexpected close
//! sleeps a fixed delay and dials again - for the lifetime of the process,
//! with no backoff growth and no retry cap. `disconnect()` cancels the
//! loop and disables reconnection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifecycle and traffic notifications from the run loop.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection (re)opened.
    Open,
    /// One inbound line, without its trailing newline.
    Message(String),
    /// The connection closed. The loop will redial unless disconnected.
    Closed,
}

/// Callback invoked from the run loop task for every [`TransportEvent`].
pub type TransportCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Tunables for the feed connection.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Delay between redial attempts.
    pub reconnect_delay: Duration,
    /// Redial after an unexpected close.
    pub auto_reconnect: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(2),
            auto_reconnect: true,
        }
    }
}

/// Cheap cloneable handle for sending on the feed.
#[derive(Clone)]
pub struct TransportHandle {
    connected: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<String>,
}

impl TransportHandle {
    /// Queue a line for sending. Returns `false` when the connection is
    /// down - the message is dropped, not an error.
    pub fn send(&self, message: impl Into<String>) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        self.outbound.send(message.into()).is_ok()
    }

    /// Whether the feed connection is currently up.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// The feed connection itself.
pub struct Transport {
    addr: String,
    options: TransportOptions,
    connected: Arc<AtomicBool>,
    outbound_tx: mpsc::UnboundedSender<String>,
    // Taken by the run loop on the first connect().
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    shutdown: CancellationToken,
}

impl Transport {
    pub fn new(addr: impl Into<String>, options: TransportOptions) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            addr: addr.into(),
            options,
            connected: Arc::new(AtomicBool::new(false)),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Handle for sending and connectivity checks, valid before and after
    /// `connect()`.
    pub fn handle(&self) -> TransportHandle {
        TransportHandle {
            connected: Arc::clone(&self.connected),
            outbound: self.outbound_tx.clone(),
        }
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Spawn the run loop. A second call is a no-op.
    pub fn connect(&self, callback: TransportCallback) {
        let Some(outbound_rx) = self.outbound_rx.lock().expect("transport lock").take() else {
            return;
        };

        let addr = self.addr.clone();
        let options = self.options.clone();
        let connected = Arc::clone(&self.connected);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            run_loop(addr, options, connected, outbound_rx, shutdown, callback).await;
        });
    }

    /// Close the connection and disable reconnection.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
    }
}

async fn run_loop(
    addr: String,
    options: TransportOptions,
    connected: Arc<AtomicBool>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    shutdown: CancellationToken,
    callback: TransportCallback,
) {
    loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                tracing::info!(addr = %addr, "feed connected");
                connected.store(true, Ordering::SeqCst);
                callback(TransportEvent::Open);

                pump(stream, &mut outbound_rx, &shutdown, &callback).await;

                connected.store(false, Ordering::SeqCst);
                callback(TransportEvent::Closed);
            }
            Err(e) => {
                tracing::warn!(addr = %addr, error = %e, "feed dial failed");
            }
        }

        if shutdown.is_cancelled() || !options.auto_reconnect {
            return;
        }

        tracing::debug!(
            delay_ms = options.reconnect_delay.as_millis() as u64,
            "feed reconnecting"
        );
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(options.reconnect_delay) => {}
        }
    }
}

/// Pump one live connection until it drops or we shut down.
async fn pump(
    stream: TcpStream,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &CancellationToken,
    callback: &TransportCallback,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,

            line = lines.next_line() => match line {
                Ok(Some(line)) => callback(TransportEvent::Message(line)),
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(error = %e, "feed read failed");
                    return;
                }
            },

            outbound = outbound_rx.recv() => {
                // The sender half lives in the Transport, so recv() cannot
                // return None while the transport exists.
                let Some(message) = outbound else { return };
                tracing::trace!(message = %message, "feed send");
                if write_half.write_all(message.as_bytes()).await.is_err()
                    || write_half.write_all(b"\n").await.is_err()
                {
                    tracing::warn!("feed write failed");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_before_connect_is_dropped() {
        let transport = Transport::new("127.0.0.1:1", TransportOptions::default());
        let handle = transport.handle();
        assert!(!handle.connected());
        assert!(!handle.send("param_set /graph/a/Gain 1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn feeds_lines_and_sends_replies() {
        use tokio::io::AsyncReadExt;
        use tokio::sync::mpsc::unbounded_channel;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"ping\nstats 1.0 0\n").await.unwrap();
            let mut buf = [0u8; 64];
            let n = sock.read(&mut buf).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        let (tx, mut rx) = unbounded_channel();
        let transport = Transport::new(addr.to_string(), TransportOptions::default());
        let handle = transport.handle();
        transport.connect(Arc::new(move |ev| {
            let _ = tx.send(ev);
        }));

        assert!(matches!(rx.recv().await, Some(TransportEvent::Open)));
        match rx.recv().await {
            Some(TransportEvent::Message(line)) => assert_eq!(line, "ping"),
            other => panic!("expected ping line, got {other:?}"),
        }
        assert!(handle.send("pong"));
        match rx.recv().await {
            Some(TransportEvent::Message(line)) => assert_eq!(line, "stats 1.0 0"),
            other => panic!("expected stats line, got {other:?}"),
        }

        let echoed = server.await.unwrap();
        assert_eq!(echoed, "pong\n");
        transport.disconnect();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disconnect_stops_reconnection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            // Accept once, then hang up immediately.
            let _ = listener.accept().await;
        });

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = Transport::new(
            addr.to_string(),
            TransportOptions {
                reconnect_delay: Duration::from_millis(20),
                auto_reconnect: true,
            },
        );
        transport.connect(Arc::new(move |ev| {
            let _ = tx.send(ev);
        }));

        assert!(matches!(rx.recv().await, Some(TransportEvent::Open)));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Closed)));

        transport.disconnect();
        tokio::time::sleep(Duration::from_millis(80)).await;
        // No further opens after disconnect.
        assert!(rx.try_recv().is_err());
    }
}
