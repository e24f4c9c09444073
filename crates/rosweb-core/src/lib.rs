// rosweb-core: session layer between rosweb-api transports and consumers (CLI, apps).

pub mod config;
pub mod encoder;
pub mod error;
pub mod registry;
pub mod session;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{OfflinePublishPolicy, SessionConfig, DEFAULT_ROSBRIDGE_PORT};
pub use encoder::{
    encode_slider_command, MotionCommand, MotionSettings, OutboundCommand, SliderEncoder,
    DEFAULT_SLIDER_RANGE,
};
pub use error::CoreError;
pub use registry::{
    InboundMessage, LinkInfo, Publisher, Sink, SubscriptionHandle, TopicRegistry,
};
pub use session::{Session, SessionState, SliderControl, TopicList, TOPICS_SERVICE};
pub use stream::{ConnectionStream, TopicStream};

// Consumers match on connection state without depending on rosweb-api.
pub use rosweb_api::ConnectionState;
