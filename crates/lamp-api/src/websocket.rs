//! WebSocket connector for EG2-S gateways.
//!
//! Opens `wss://{host}/eg`, performs the login + monitor handshake, and
//! hands back a [`Transport`] whose stream yields every text frame the
//! gateway pushes. Reconnection is *not* handled here: the lifecycle
//! manager in `lamp-core` decides when to tear down and rebuild a link.
//!
//! # Example
//!
//! ```rust,ignore
//! use lamp_api::{Connector, Credentials, TlsMode, WsConnector};
//!
//! let connector = WsConnector::new(TlsMode::DangerAcceptInvalid, Duration::from_secs(10));
//! let transport = connector.connect(&credentials).await?;
//! let (sink, stream) = transport.into_split();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{self, BoxFuture};
use futures_util::{SinkExt, StreamExt};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use url::Url;

use crate::error::Error;
use crate::transport::{Connector, Credentials, FrameSink, TlsMode, Transport, login_and_monitor};

/// Path of the JSON-RPC endpoint on the gateway.
const GATEWAY_PATH: &str = "/eg";

/// Origin header the gateway expects on the upgrade request.
const ORIGIN: &str = "http://localhost";

// ── WsConnector ──────────────────────────────────────────────────────

/// Connects to a gateway over secure WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    tls: TlsMode,
    timeout: Duration,
}

impl WsConnector {
    pub fn new(tls: TlsMode, timeout: Duration) -> Self {
        Self { tls, timeout }
    }

    async fn open(&self, credentials: &Credentials) -> Result<Transport, Error> {
        let url = gateway_url(&credentials.host)?;
        tracing::info!(url = %url, "Connecting to gateway");

        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;
        let request = ClientRequestBuilder::new(uri).with_header("Origin", ORIGIN);

        let connector = match self.tls {
            TlsMode::System => None,
            TlsMode::DangerAcceptInvalid => Some(tokio_tungstenite::Connector::Rustls(Arc::new(
                insecure_client_config()?,
            ))),
        };

        let (ws_stream, _response) = tokio::time::timeout(
            self.timeout,
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector),
        )
        .await
        .map_err(|_| Error::Timeout {
            timeout_secs: self.timeout.as_secs(),
        })?
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::info!("WebSocket connected");

        let (write, read) = ws_stream.split();

        let mut sink: FrameSink = Box::pin(
            write
                .sink_map_err(|e| Error::WebSocketSend(e.to_string()))
                .with(|frame: String| future::ready(Ok::<_, Error>(Message::text(frame)))),
        );
        let stream = read.filter_map(|message| future::ready(text_frame(message)));

        login_and_monitor(&mut sink, credentials).await?;
        tracing::info!("Gateway login and monitor requests sent");

        Ok(Transport::new(sink, stream))
    }
}

impl Connector for WsConnector {
    fn connect<'a>(&'a self, credentials: &'a Credentials) -> BoxFuture<'a, Result<Transport, Error>> {
        Box::pin(self.open(credentials))
    }
}

/// Build the gateway endpoint URL from a bare host.
pub fn gateway_url(host: &str) -> Result<Url, Error> {
    Ok(Url::parse(&format!("wss://{host}{GATEWAY_PATH}"))?)
}

/// Map one WebSocket message to a frame, dropping control traffic.
fn text_frame(message: Result<Message, tungstenite::Error>) -> Option<Result<String, Error>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Close(frame)) => {
            let (code, reason) = frame.map_or((1005, String::new()), |cf| {
                (u16::from(cf.code), cf.reason.to_string())
            });
            tracing::info!(code, reason = %reason, "WebSocket close frame received");
            Some(Err(Error::WebSocketClosed { code, reason }))
        }
        Ok(Message::Ping(_)) => {
            // tungstenite handles pong replies automatically
            tracing::trace!("WebSocket ping");
            None
        }
        // Binary, Pong, Frame -- ignore
        Ok(_) => None,
        Err(e) => Some(Err(Error::WebSocketRead(e.to_string()))),
    }
}

// ── TLS ──────────────────────────────────────────────────────────────

/// Client config that accepts the gateway's self-signed certificate while
/// still checking handshake signatures.
fn insecure_client_config() -> Result<ClientConfig, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    Ok(config)
}

#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use super::*;

    #[test]
    fn gateway_url_uses_wss_and_eg_path() {
        let url = gateway_url("192.168.1.20").unwrap();
        assert_eq!(url.as_str(), "wss://192.168.1.20/eg");
    }

    #[test]
    fn gateway_url_rejects_garbage_host() {
        assert!(matches!(gateway_url("bad host name"), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn text_messages_become_frames() {
        let frame = text_frame(Ok(Message::text("{\"method\":\"MessageAlert\"}")));
        assert_eq!(frame.unwrap().unwrap(), "{\"method\":\"MessageAlert\"}");
    }

    #[test]
    fn control_messages_are_dropped() {
        assert!(text_frame(Ok(Message::Ping(Vec::new().into()))).is_none());
        assert!(text_frame(Ok(Message::Pong(Vec::new().into()))).is_none());
        assert!(text_frame(Ok(Message::Binary(vec![1, 2, 3].into()))).is_none());
    }

    #[test]
    fn close_frame_ends_the_stream_with_its_code() {
        let frame = text_frame(Ok(Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "bye".into(),
        }))));
        match frame {
            Some(Err(Error::WebSocketClosed { code, reason })) => {
                assert_eq!(code, 1001);
                assert_eq!(reason, "bye");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn insecure_config_builds() {
        assert!(insecure_client_config().is_ok());
    }
}
