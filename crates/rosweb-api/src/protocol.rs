//! Wire framing for the rosbridge v2 JSON protocol.
//!
//! The session layer never builds frames itself: it goes through a
//! [`FrameCodec`], so a broker speaking a different dialect only needs a
//! different codec. [`RosbridgeCodec`] is the implementation for
//! `rosbridge_server`.
//!
//! Outbound operations used here:
//!
//! | op            | fields                       |
//! |---------------|------------------------------|
//! | `subscribe`   | `topic`, `type`              |
//! | `unsubscribe` | `topic`                      |
//! | `advertise`   | `topic`, `type`              |
//! | `unadvertise` | `topic`                      |
//! | `publish`     | `topic`, `msg`               |
//! | `call_service`| `id`, `service`, `args`      |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

// ── Codec contract ───────────────────────────────────────────────────

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// A message published on a topic.
    Message { topic: String, payload: Value },

    /// Reply to an earlier `call_service`.
    ServiceResponse {
        id: Option<String>,
        service: String,
        values: Value,
        result: bool,
    },

    /// Diagnostic status emitted by the broker.
    Status { level: String, message: String },
}

/// Encodes outbound requests and decodes inbound frames.
pub trait FrameCodec: Send + Sync {
    fn encode_subscribe(&self, topic: &str, message_type: &str) -> Result<String, Error>;

    fn encode_unsubscribe(&self, topic: &str) -> Result<String, Error>;

    fn encode_advertise(&self, topic: &str, message_type: &str) -> Result<String, Error>;

    fn encode_unadvertise(&self, topic: &str) -> Result<String, Error>;

    fn encode_publish(
        &self,
        topic: &str,
        message_type: &str,
        payload: &Value,
    ) -> Result<String, Error>;

    fn encode_call_service(&self, id: &str, service: &str, args: &Value)
    -> Result<String, Error>;

    fn decode(&self, frame: &str) -> Result<DecodedFrame, Error>;
}

// ── Wire structs ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Outbound<'a> {
    Subscribe {
        topic: &'a str,
        #[serde(rename = "type")]
        message_type: &'a str,
    },
    Unsubscribe {
        topic: &'a str,
    },
    Advertise {
        topic: &'a str,
        #[serde(rename = "type")]
        message_type: &'a str,
    },
    Unadvertise {
        topic: &'a str,
    },
    Publish {
        topic: &'a str,
        msg: &'a Value,
    },
    CallService {
        id: &'a str,
        service: &'a str,
        args: &'a Value,
    },
}

#[derive(Debug, Deserialize)]
struct PublishFrame {
    topic: String,
    #[serde(default)]
    msg: Value,
}

#[derive(Debug, Deserialize)]
struct ServiceResponseFrame {
    #[serde(default)]
    id: Option<String>,
    service: String,
    #[serde(default)]
    values: Value,
    #[serde(default = "default_result")]
    result: bool,
}

#[derive(Debug, Deserialize)]
struct StatusFrame {
    #[serde(default)]
    level: String,
    #[serde(default)]
    msg: String,
}

fn default_result() -> bool {
    true
}

// ── RosbridgeCodec ───────────────────────────────────────────────────

/// JSON codec for rosbridge protocol v2.
#[derive(Debug, Clone, Copy, Default)]
pub struct RosbridgeCodec;

impl RosbridgeCodec {
    fn encode(frame: &Outbound<'_>) -> Result<String, Error> {
        Ok(serde_json::to_string(frame)?)
    }
}

impl FrameCodec for RosbridgeCodec {
    fn encode_subscribe(&self, topic: &str, message_type: &str) -> Result<String, Error> {
        Self::encode(&Outbound::Subscribe {
            topic,
            message_type,
        })
    }

    fn encode_unsubscribe(&self, topic: &str) -> Result<String, Error> {
        Self::encode(&Outbound::Unsubscribe { topic })
    }

    fn encode_advertise(&self, topic: &str, message_type: &str) -> Result<String, Error> {
        Self::encode(&Outbound::Advertise {
            topic,
            message_type,
        })
    }

    fn encode_unadvertise(&self, topic: &str) -> Result<String, Error> {
        Self::encode(&Outbound::Unadvertise { topic })
    }

    // rosbridge infers the type from the advertisement, so `publish`
    // frames carry only the topic and the message.
    fn encode_publish(
        &self,
        topic: &str,
        _message_type: &str,
        payload: &Value,
    ) -> Result<String, Error> {
        Self::encode(&Outbound::Publish {
            topic,
            msg: payload,
        })
    }

    fn encode_call_service(
        &self,
        id: &str,
        service: &str,
        args: &Value,
    ) -> Result<String, Error> {
        Self::encode(&Outbound::CallService { id, service, args })
    }

    fn decode(&self, frame: &str) -> Result<DecodedFrame, Error> {
        let value: Value = serde_json::from_str(frame).map_err(|e| deser_error(&e, frame))?;

        let op = value
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Deserialization {
                message: "frame has no `op` field".into(),
                body: frame.to_owned(),
            })?
            .to_owned();

        match op.as_str() {
            "publish" => {
                let f: PublishFrame =
                    serde_json::from_value(value).map_err(|e| deser_error(&e, frame))?;
                Ok(DecodedFrame::Message {
                    topic: f.topic,
                    payload: f.msg,
                })
            }
            "service_response" => {
                let f: ServiceResponseFrame =
                    serde_json::from_value(value).map_err(|e| deser_error(&e, frame))?;
                Ok(DecodedFrame::ServiceResponse {
                    id: f.id,
                    service: f.service,
                    values: f.values,
                    result: f.result,
                })
            }
            "status" => {
                let f: StatusFrame =
                    serde_json::from_value(value).map_err(|e| deser_error(&e, frame))?;
                Ok(DecodedFrame::Status {
                    level: f.level,
                    message: f.msg,
                })
            }
            _ => Err(Error::UnsupportedFrame(op)),
        }
    }
}

fn deser_error(err: &serde_json::Error, frame: &str) -> Error {
    Error::Deserialization {
        message: err.to_string(),
        body: frame.to_owned(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
