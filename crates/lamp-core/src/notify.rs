// ── Outbound state-change notifications ──
//
// A bare POST to the home-automation webhook tells it to poll the bridge
// again. Delivery is fire-and-forget: failures are logged, never retried,
// and never reach the listener.

use futures_util::future::BoxFuture;
use secrecy::ExposeSecret;
use tracing::{debug, warn};
use url::Url;

use crate::config::NotifyTarget;

/// Receiver of "something changed" signals from the listener.
pub trait Notifier: Send + Sync {
    /// Deliver one notification. Implementations swallow their own errors.
    fn notify(&self) -> BoxFuture<'_, ()>;
}

/// Build the webhook URL for a notify target.
pub fn webhook_url(target: &NotifyTarget) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "https://{}/api/webhook/{}",
        target.host,
        target.token.expose_secret()
    ))
}

/// Posts to a home-automation webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(http: reqwest::Client, target: &NotifyTarget) -> Result<Self, url::ParseError> {
        Ok(Self::with_url(http, webhook_url(target)?))
    }

    /// Post to an explicit URL instead of the derived `https://` one.
    pub fn with_url(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }

    async fn post(&self) {
        match self.http.post(self.url.clone()).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(status = %resp.status(), "state change notified");
            }
            Ok(resp) => warn!(status = %resp.status(), "webhook rejected notification"),
            // Error text may echo the URL, which embeds the token.
            Err(e) => warn!(error = %e.without_url(), "webhook notification failed"),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.post())
    }
}
