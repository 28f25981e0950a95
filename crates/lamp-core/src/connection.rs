// ── Gateway connection lifecycle ──
//
// One `Connection` owns at most one live link (outbound sink + running
// listener) at a time. All lifecycle transitions and all outbound frames
// go through the `link` lock, so a reconnect can never interleave with a
// send and two listeners never run on the same connection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::SinkExt;
use lamp_api::protocol::{TransmitParams, transmit};
use lamp_api::{Connector, FrameSink};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::correlator::Correlator;
use crate::error::{CoreError, Operation};
use crate::listener::{ListenerContext, ListenerExit, ListenerHandle};
use crate::notify::Notifier;
use crate::quirk::QuirkFlag;

/// Highest accepted channel level, in percent.
pub const MAX_LEVEL_PERCENT: i64 = 100;

struct Link {
    sink: FrameSink,
    listener: ListenerHandle,
}

/// A managed connection to one gateway.
pub struct Connection {
    config: BridgeConfig,
    connector: Arc<dyn Connector>,
    notifier: Arc<dyn Notifier>,
    correlator: Arc<Correlator>,
    quirk: Arc<QuirkFlag>,
    levels: Mutex<Vec<i64>>,
    link: tokio::sync::Mutex<Option<Link>>,
}

impl Connection {
    /// Create a disconnected connection. Call [`connect`](Self::connect)
    /// to open the link.
    pub fn new(
        config: BridgeConfig,
        connector: Arc<dyn Connector>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let levels = vec![0; config.channel_count];
        Self {
            config,
            connector,
            notifier,
            correlator: Arc::new(Correlator::new()),
            quirk: Arc::new(QuirkFlag::new()),
            levels: Mutex::new(levels),
            link: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open a link and start its listener. An existing link is shut down
    /// first.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let mut link = self.link.lock().await;
        self.connect_locked(&mut link).await
    }

    /// Stop the listener and close the link. Fails if there is no link
    /// or the transport refuses to close.
    pub async fn disconnect(&self) -> Result<(), CoreError> {
        let mut link = self.link.lock().await;
        Self::disconnect_locked(&mut link).await
    }

    /// Disconnect then connect under one lock. A failed disconnect aborts
    /// before any connect attempt.
    pub async fn reconnect(&self) -> Result<(), CoreError> {
        let mut link = self.link.lock().await;
        Self::disconnect_locked(&mut link).await?;
        self.connect_locked(&mut link).await?;
        info!(host = %self.config.credentials.host, "gateway connection refreshed");
        Ok(())
    }

    /// Reconnect if a link exists, otherwise connect. Used by the daily
    /// schedule so a link lost earlier is recovered too.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let mut link = self.link.lock().await;
        if link.is_some() {
            Self::disconnect_locked(&mut link).await?;
        }
        self.connect_locked(&mut link).await?;
        info!(host = %self.config.credentials.host, "gateway connection refreshed");
        Ok(())
    }

    /// `true` while a link exists and its listener is still reading.
    pub async fn is_connected(&self) -> bool {
        self.link
            .lock()
            .await
            .as_ref()
            .is_some_and(|link| link.listener.is_running())
    }

    async fn connect_locked(&self, link: &mut Option<Link>) -> Result<(), CoreError> {
        if let Some(old) = link.take() {
            debug!("replacing existing gateway link");
            if let Err(e) = shutdown(old).await {
                warn!(error = %e, "closing previous link failed");
            }
        }

        let host = &self.config.credentials.host;
        let transport = self
            .connector
            .connect(&self.config.credentials)
            .await
            .map_err(|e| CoreError::connect(host, &e))?;

        let (sink, stream) = transport.into_split();
        let listener = ListenerHandle::spawn(stream, self.listener_context());
        *link = Some(Link { sink, listener });

        info!(host = %host, "connected to gateway");
        Ok(())
    }

    async fn disconnect_locked(link: &mut Option<Link>) -> Result<(), CoreError> {
        let Some(old) = link.take() else {
            return Err(CoreError::Disconnect {
                reason: "not connected".into(),
            });
        };
        shutdown(old).await
    }

    fn listener_context(&self) -> ListenerContext {
        ListenerContext {
            correlator: Arc::clone(&self.correlator),
            quirk: Arc::clone(&self.quirk),
            notifier: Arc::clone(&self.notifier),
            settle_interval: self.config.timing.settle_interval,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Activate a scene. Scene 0 means "all off" and arms the off
    /// correction for level answers.
    pub async fn set_scene(&self, scene: i64, transition_ticks: i64) -> Result<(), CoreError> {
        self.send(
            TransmitParams::set_scene(scene, transition_ticks),
            Operation::SetScene,
        )
        .await?;
        if scene == 0 {
            self.quirk.set();
        }
        debug!(scene, transition_ticks, "scene set");
        Ok(())
    }

    /// Set one channel (1-based) to `percent` (0-100).
    pub async fn set_channel_level(&self, channel: i64, percent: i64) -> Result<(), CoreError> {
        if channel < 1 {
            return Err(CoreError::InvalidParams {
                field: "channel".into(),
                reason: format!("channels start at 1, got {channel}"),
            });
        }
        if !(0..=MAX_LEVEL_PERCENT).contains(&percent) {
            return Err(CoreError::InvalidParams {
                field: "percent".into(),
                reason: format!("expected 0-{MAX_LEVEL_PERCENT}, got {percent}"),
            });
        }

        self.send(
            TransmitParams::set_channel_level(channel, percent),
            Operation::SetChannelLevel,
        )
        .await?;
        debug!(channel, percent, "channel level set");
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Ask every configured channel for its level, one at a time, and
    /// return the refreshed levels. Only one cycle may run at a time.
    pub async fn query_channel_levels(&self) -> Result<Vec<i64>, CoreError> {
        let count = self.config.channel_count;
        if count == 0 {
            return Err(CoreError::NoChannelsConfigured);
        }

        let lease = self.correlator.begin()?;
        let timeout = self.config.timing.query_timeout;

        for index in 0..count {
            let channel = i64::try_from(index + 1).unwrap_or(i64::MAX);
            let pending = lease.arm();
            self.send(
                TransmitParams::query_channel_level(channel),
                Operation::QueryChannelLevels,
            )
            .await?;
            let level = pending.wait(timeout, channel).await?;
            debug!(channel, level, "channel level answered");
            self.levels_mut()[index] = level;
        }
        drop(lease);

        if self.quirk.clear() {
            debug!("off correction cleared after full query");
        }
        Ok(self.channel_levels())
    }

    /// Levels from the most recent query, indexed by channel - 1.
    pub fn channel_levels(&self) -> Vec<i64> {
        self.levels_mut().clone()
    }

    fn levels_mut(&self) -> MutexGuard<'_, Vec<i64>> {
        self.levels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encode and write one Transmit frame on the live link.
    async fn send(&self, params: TransmitParams, operation: Operation) -> Result<(), CoreError> {
        let frame = transmit(params)
            .encode()
            .map_err(|e| CoreError::send(operation, &e))?;

        let mut guard = self.link.lock().await;
        let link = guard
            .as_mut()
            .filter(|link| link.listener.is_running())
            .ok_or(CoreError::NotConnected)?;
        link.sink
            .send(frame)
            .await
            .map_err(|e| CoreError::send(operation, &e))
    }
}

/// Stop the listener, then close the write half. The read error the
/// listener sees on a dead link is expected here and only logged; a
/// close failure counts only if the link was still alive.
async fn shutdown(link: Link) -> Result<(), CoreError> {
    let Link { mut sink, listener } = link;
    let exit = listener.stop().await;
    if exit != ListenerExit::Stopped {
        debug!(exit = ?exit, "listener had already ended");
    }

    match sink.close().await {
        Ok(()) => {}
        Err(e) if exit == ListenerExit::Stopped => {
            return Err(CoreError::Disconnect {
                reason: e.to_string(),
            });
        }
        Err(e) => debug!(error = %e, "close on dead link failed"),
    }
    info!("gateway link closed");
    Ok(())
}
