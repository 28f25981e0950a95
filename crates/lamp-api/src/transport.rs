// Transport abstraction shared by the WebSocket connector and the
// in-memory gateway used in tests.
//
// A `Transport` is an already-authenticated duplex link, split into a
// frame sink (single writer) and a frame stream (single reader). Nothing
// here correlates frames; that lives in lamp-core.

use std::fmt;
use std::pin::Pin;

use futures_util::future::BoxFuture;
use futures_util::{Sink, SinkExt, Stream};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;
use crate::protocol::{
    LoginParams, METHOD_LOGIN, METHOD_MONITOR, MonitorParams, Request,
};

/// Write half: text frames out to the gateway.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Read half: text frames pushed by the gateway.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, Error>> + Send>>;

/// TLS verification mode for the gateway socket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Use the bundled webpki root store.
    System,
    /// Accept any certificate (the gateway ships a self-signed one).
    #[default]
    DangerAcceptInvalid,
}

/// What a connector needs to open and authenticate a link.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Host name or IP of the gateway, without scheme.
    pub host: String,
    pub username: String,
    pub password: SecretString,
}

/// An open, authenticated, subscribed gateway link.
pub struct Transport {
    sink: FrameSink,
    stream: FrameStream,
}

impl Transport {
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<String, Error = Error> + Send + 'static,
        R: Stream<Item = Result<String, Error>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    /// Separate the writer from the reader so each can have one owner.
    pub fn into_split(self) -> (FrameSink, FrameStream) {
        (self.sink, self.stream)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Opens transports. Implemented by [`WsConnector`](crate::WsConnector)
/// for real gateways.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, credentials: &'a Credentials) -> BoxFuture<'a, Result<Transport, Error>>;
}

/// Send the `LogIn` and `Monitor` frames that make a fresh socket usable.
///
/// The gateway answers invalid-method to everything until it has seen a
/// login, and only pushes `AttributeChangeAlert` after a monitor request.
pub async fn login_and_monitor(sink: &mut FrameSink, credentials: &Credentials) -> Result<(), Error> {
    let login = Request::new(
        METHOD_LOGIN,
        LoginParams {
            username: credentials.username.clone(),
            password: credentials.password.expose_secret().to_owned(),
        },
    );
    sink.send(login.encode()?).await?;
    tracing::debug!(username = %credentials.username, "login frame sent");

    let monitor = Request::new(METHOD_MONITOR, MonitorParams::all());
    sink.send(monitor.encode()?).await?;
    tracing::debug!("monitor frame sent");

    Ok(())
}
