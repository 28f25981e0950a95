// lamp-core: Connection multiplexer and lifecycle management between
// lamp-api transports and the bridge's control surface.

pub mod classify;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod listener;
pub mod notify;
pub mod quirk;
pub mod schedule;

// ── Primary re-exports ──────────────────────────────────────────────
pub use classify::{Answer, Frame, classify};
pub use config::{BridgeConfig, NotifyTarget, Timing};
pub use connection::Connection;
pub use correlator::Correlator;
pub use error::{CoreError, Operation};
pub use listener::{ListenerExit, ListenerHandle};
pub use notify::{Notifier, WebhookNotifier};
pub use quirk::QuirkFlag;
pub use schedule::DailyReconnect;

pub use lamp_api::{Credentials, TlsMode};
