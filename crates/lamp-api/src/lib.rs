// lamp-api: Async client plumbing for EG2-S lighting gateways

pub mod error;
pub mod protocol;
pub mod transport;
pub mod websocket;

#[cfg(feature = "test-util")]
pub mod memory;

pub use error::Error;
pub use transport::{Connector, Credentials, FrameSink, FrameStream, TlsMode, Transport};
pub use websocket::WsConnector;
