// rosweb-api: transport and wire codec for a rosbridge control bus

pub mod error;
pub mod memory;
pub mod protocol;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use memory::{MemoryConnector, MemoryTransport};
pub use protocol::{DecodedFrame, FrameCodec, RosbridgeCodec};
pub use transport::{ConnectionState, Connector, Transport, TransportListener};
pub use websocket::{WsConnector, WsTransport};
