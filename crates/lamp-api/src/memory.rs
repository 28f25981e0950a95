//! In-memory gateway for tests.
//!
//! [`MemoryConnector`] hands out transports backed by unbounded channels.
//! Each successful connect yields a [`GatewayPeer`] that plays the gateway
//! side: it sees every frame the bridge sends (including the login and
//! monitor handshake) and can push frames or read errors back.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::channel::mpsc as fmpsc;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};

use crate::error::Error;
use crate::transport::{Connector, Credentials, FrameSink, Transport, login_and_monitor};

/// Connector whose links terminate in [`GatewayPeer`]s.
pub struct MemoryConnector {
    peer_tx: mpsc::UnboundedSender<GatewayPeer>,
    peer_rx: Mutex<mpsc::UnboundedReceiver<GatewayPeer>>,
    refuse_next: AtomicBool,
    connects: AtomicUsize,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    pub fn new() -> Self {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        Self {
            peer_tx,
            peer_rx: Mutex::new(peer_rx),
            refuse_next: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        }
    }

    /// Make the next connect attempt fail as if the gateway were down.
    pub fn refuse_next(&self) {
        self.refuse_next.store(true, Ordering::SeqCst);
    }

    /// Number of transports handed out so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Wait for the gateway side of the next transport.
    pub async fn accept(&self) -> GatewayPeer {
        self.peer_rx
            .lock()
            .await
            .recv()
            .await
            .unwrap_or_else(|| unreachable!("connector owns the peer sender"))
    }

    async fn open(&self, credentials: &Credentials) -> Result<Transport, Error> {
        if self.refuse_next.swap(false, Ordering::SeqCst) {
            return Err(Error::WebSocketConnect(format!(
                "connection to {} refused",
                credentials.host
            )));
        }

        let (out_tx, out_rx) = fmpsc::unbounded::<String>();
        let (in_tx, in_rx) = fmpsc::unbounded::<Result<String, Error>>();

        let mut sink: FrameSink = Box::pin(out_tx.sink_map_err(|_| Error::Closed));
        login_and_monitor(&mut sink, credentials).await?;

        self.connects.fetch_add(1, Ordering::SeqCst);
        let _ = self.peer_tx.send(GatewayPeer {
            outbound: out_rx,
            inbound: in_tx,
        });

        Ok(Transport::new(sink, in_rx))
    }
}

impl Connector for MemoryConnector {
    fn connect<'a>(&'a self, credentials: &'a Credentials) -> BoxFuture<'a, Result<Transport, Error>> {
        Box::pin(self.open(credentials))
    }
}

/// Gateway end of an in-memory transport.
pub struct GatewayPeer {
    outbound: fmpsc::UnboundedReceiver<String>,
    inbound: fmpsc::UnboundedSender<Result<String, Error>>,
}

impl GatewayPeer {
    /// Next frame the bridge sent, decoded. `None` once the bridge has
    /// closed its writer.
    pub async fn next_frame(&mut self) -> Option<serde_json::Value> {
        let text = self.outbound.next().await?;
        Some(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
    }

    /// Push a text frame to the bridge. Returns `false` if the bridge's
    /// reader is gone.
    pub fn push(&self, frame: impl Into<String>) -> bool {
        self.inbound.unbounded_send(Ok(frame.into())).is_ok()
    }

    /// Make the bridge's next read fail.
    pub fn fail_read(&self, reason: &str) -> bool {
        self.inbound
            .unbounded_send(Err(Error::WebSocketRead(reason.into())))
            .is_ok()
    }

    /// `true` once the bridge has dropped its read half.
    pub fn reader_gone(&self) -> bool {
        self.inbound.is_closed()
    }

    /// End the read side as if the gateway hung up.
    pub fn hang_up(&self) {
        self.inbound.close_channel();
    }
}
