//! The bridge session: at most one configured gateway connection per
//! process, plus its daily reconnect schedule.
//!
//! Setup always replaces the previous session. The new session is kept
//! even when its first connect fails, so a later `Connect` call or the
//! daily schedule can retry with the stored settings.

use std::sync::Arc;

use lamp_api::Connector;
use lamp_core::{
    BridgeConfig, Connection, CoreError, Credentials, DailyReconnect, Timing, TlsMode,
    WebhookNotifier,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct Session {
    connection: Arc<Connection>,
    schedule: Option<DailyReconnect>,
}

impl Session {
    async fn close(self) {
        if let Some(schedule) = self.schedule {
            if !schedule.shutdown().await {
                debug!("previous schedule had already failed");
            }
        }
        if self.connection.is_connected().await {
            if let Err(e) = self.connection.disconnect().await {
                warn!(error = %e, "closing previous session failed");
            }
        }
    }
}

/// Shared state behind the JSON-RPC endpoint.
pub struct Bridge {
    connector: Arc<dyn Connector>,
    http: reqwest::Client,
    tls: TlsMode,
    timing: Timing,
    session: Mutex<Option<Session>>,
}

impl Bridge {
    pub fn new(
        connector: Arc<dyn Connector>,
        http: reqwest::Client,
        tls: TlsMode,
        timing: Timing,
    ) -> Self {
        Self {
            connector,
            http,
            tls,
            timing,
            session: Mutex::new(None),
        }
    }

    /// Apply process-wide TLS and timing settings to a Setup request.
    pub fn with_defaults(&self, mut config: BridgeConfig) -> BridgeConfig {
        config.tls = self.tls.clone();
        config.timing = self.timing.clone();
        config
    }

    /// Replace the session with one built from `config` and connect it.
    pub async fn setup(&self, config: BridgeConfig) -> Result<(), CoreError> {
        let notifier =
            WebhookNotifier::new(self.http.clone(), &config.notify).map_err(|e| {
                CoreError::InvalidParams {
                    field: "notifyHost".into(),
                    reason: e.to_string(),
                }
            })?;

        let reset_hour = config.daily_reset_hour;
        let channels = config.channel_count;
        let connection = Arc::new(Connection::new(
            config,
            Arc::clone(&self.connector),
            Arc::new(notifier),
        ));
        let schedule = reset_hour.map(|hour| DailyReconnect::spawn(Arc::clone(&connection), hour));

        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            info!("replacing existing bridge session");
            previous.close().await;
        }
        *session = Some(Session {
            connection: Arc::clone(&connection),
            schedule,
        });
        drop(session);

        connection.connect().await?;
        info!(channels, reset_hour = ?reset_hour, "bridge set up");
        Ok(())
    }

    /// The current session's connection.
    pub async fn connection(&self) -> Result<Arc<Connection>, CoreError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| Arc::clone(&session.connection))
            .ok_or(CoreError::NotSetUp)
    }

    /// Connect the current session, optionally with new gateway
    /// credentials. New credentials rebuild the session around them.
    pub async fn connect(&self, credentials: Option<Credentials>) -> Result<(), CoreError> {
        let connection = self.connection().await?;
        match credentials {
            None => connection.connect().await,
            Some(credentials) => {
                let mut config = connection.config().clone();
                config.credentials = credentials;
                self.setup(config).await
            }
        }
    }

    /// Stop the schedule and close the link, if any.
    pub async fn shutdown(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.close().await;
            info!("bridge session closed");
        }
    }
}
