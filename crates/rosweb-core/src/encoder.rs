//! Translation of UI-level control values into motion commands.
//!
//! Everything here is pure: no I/O, no session. Callers validate and
//! encode first, then hand the resulting message to a [`Publisher`].
//!
//! [`Publisher`]: crate::Publisher

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Range a slider reports unless told otherwise.
pub const DEFAULT_SLIDER_RANGE: RangeInclusive<f64> = 0.0..=100.0;

// ── OutboundCommand ──────────────────────────────────────────────────

/// One actuator move: target position and how long to take getting there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct OutboundCommand {
    pub actuator_id: u16,
    pub position: i32,
    pub duration_ms: u32,
}

impl OutboundCommand {
    /// The broker message carrying this command.
    pub fn to_motion_command(&self) -> MotionCommand {
        MotionCommand {
            servo_id: vec![self.actuator_id],
            position: vec![self.position],
            duration: vec![self.duration_ms],
        }
    }

    pub fn to_payload(&self) -> Result<Value, CoreError> {
        Ok(serde_json::to_value(self.to_motion_command())?)
    }
}

/// Batched servo move as the motion controller node expects it.
///
/// The three arrays are parallel: entry `i` of each describes one servo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionCommand {
    pub servo_id: Vec<u16>,
    pub position: Vec<i32>,
    pub duration: Vec<u32>,
}

impl MotionCommand {
    pub const MESSAGE_TYPE: &'static str = "ainex_interfaces/MotionCommand";
}

// ── SliderEncoder ────────────────────────────────────────────────────

/// Validates a continuous input against an inclusive range and scales it
/// to an integer position.
#[derive(Debug, Clone, PartialEq)]
pub struct SliderEncoder {
    min: f64,
    max: f64,
}

impl Default for SliderEncoder {
    fn default() -> Self {
        Self {
            min: *DEFAULT_SLIDER_RANGE.start(),
            max: *DEFAULT_SLIDER_RANGE.end(),
        }
    }
}

impl SliderEncoder {
    pub fn new(range: RangeInclusive<f64>) -> Result<Self, CoreError> {
        let (min, max) = range.into_inner();
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(CoreError::Config {
                message: format!("invalid slider range {min}..={max}"),
            });
        }
        Ok(Self { min, max })
    }

    pub fn range(&self) -> RangeInclusive<f64> {
        self.min..=self.max
    }

    /// Position is `round(raw_value * scale_factor)`, half away from zero.
    pub fn encode(
        &self,
        actuator_id: u16,
        raw_value: f64,
        scale_factor: f64,
        duration_ms: u32,
    ) -> Result<OutboundCommand, CoreError> {
        // NaN fails both comparisons, so it lands here too.
        if !(raw_value >= self.min && raw_value <= self.max) {
            return Err(self.out_of_range(raw_value));
        }

        let scaled = (raw_value * scale_factor).round();
        if !scaled.is_finite() || scaled < f64::from(i32::MIN) || scaled > f64::from(i32::MAX) {
            return Err(self.out_of_range(raw_value));
        }

        #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
        let position = scaled as i32;

        Ok(OutboundCommand {
            actuator_id,
            position,
            duration_ms,
        })
    }

    fn out_of_range(&self, value: f64) -> CoreError {
        CoreError::OutOfRange {
            value,
            min: self.min,
            max: self.max,
        }
    }
}

/// Encode a slider position against the default 0..=100 range.
pub fn encode_slider_command(
    actuator_id: u16,
    raw_value: f64,
    scale_factor: f64,
    duration_ms: u32,
) -> Result<OutboundCommand, CoreError> {
    SliderEncoder::default().encode(actuator_id, raw_value, scale_factor, duration_ms)
}

// ── MotionSettings ───────────────────────────────────────────────────

/// How one slider drives one actuator.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSettings {
    pub topic: String,
    pub message_type: String,
    pub actuator_id: u16,
    pub scale_factor: f64,
    pub duration_ms: u32,
    pub range: RangeInclusive<f64>,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            topic: "motion/command".into(),
            message_type: MotionCommand::MESSAGE_TYPE.into(),
            actuator_id: 13,
            scale_factor: 10.0,
            duration_ms: 1000,
            range: DEFAULT_SLIDER_RANGE,
        }
    }
}

impl MotionSettings {
    pub fn encoder(&self) -> Result<SliderEncoder, CoreError> {
        SliderEncoder::new(self.range.clone())
    }

    pub fn encode(&self, raw_value: f64) -> Result<OutboundCommand, CoreError> {
        self.encoder()?
            .encode(self.actuator_id, raw_value, self.scale_factor, self.duration_ms)
    }
}
