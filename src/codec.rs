//! JSON-over-UDP wire format.
//!
//! One JSON object per datagram. Positions travel as integer millionths of a degree
//! under the keys `lat` and `long`:
//!
//! ```text
//! {"type":"posupdate","callsign":"K6ABC","lat":37765730,"long":-122419420,"isaccurate":true}
//! {"type":"getall"}
//! ```
pub mod error;

pub use error::DecodeError;

use crate::types::{Fix, LocalIdentity, MicroDegrees};

#[derive(Debug, PartialEq, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    PosUpdate {
        callsign: String,
        lat: MicroDegrees,
        #[serde(rename = "long")]
        lon: MicroDegrees,
        #[serde(rename = "isaccurate")]
        is_accurate: bool,
    },
    GetAll,
}

impl OutboundMessage {
    /// `isaccurate` has no accuracy signal behind it and is always sent as `true`.
    #[must_use]
    pub fn pos_update(identity: &LocalIdentity, fix: &Fix) -> Self {
        OutboundMessage::PosUpdate {
            callsign: identity.callsign.clone(),
            lat: MicroDegrees::from_degrees(fix.latitude),
            lon: MicroDegrees::from_degrees(fix.longitude),
            is_accurate: true,
        }
    }
}

#[derive(Debug, PartialEq, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    PosUpdate {
        callsign: String,
        lat: MicroDegrees,
        #[serde(rename = "long")]
        lon: MicroDegrees,
        #[serde(default, deserialize_with = "deserialize_age_seconds")]
        age: u32,
    },
    GetAll,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum DecodeMode {
    /// `type` is required.
    #[default]
    Strict,
    /// Objects without `type` are read as `posupdate`. The LAN base station answers
    /// `getall` with such records.
    AllowUntyped,
}

#[must_use]
pub fn encode(message: &OutboundMessage) -> Vec<u8> {
    // Plain structs of strings, integers and bools always serialize.
    serde_json::to_vec(message).unwrap_or_default()
}

pub fn decode(bytes: &[u8]) -> Result<InboundMessage, DecodeError> {
    decode_with_mode(bytes, DecodeMode::Strict)
}

/// Decodes the first JSON value in `bytes`. Anything after a complete object is ignored,
/// so a receive buffer with stale trailing bytes still decodes.
pub fn decode_with_mode(bytes: &[u8], mode: DecodeMode) -> Result<InboundMessage, DecodeError> {
    let mut values = serde_json::Deserializer::from_slice(bytes).into_iter::<serde_json::Value>();
    let mut value = match values.next() {
        Some(Ok(value)) => value,
        Some(Err(err)) => return Err(DecodeError::from_parse(&err)),
        None => return Err(DecodeError::Malformed(String::from("empty payload"))),
    };

    if mode == DecodeMode::AllowUntyped {
        if let Some(object) = value.as_object_mut() {
            object
                .entry("type")
                .or_insert_with(|| serde_json::Value::from("posupdate"));
        }
    }

    serde_json::from_value(value).map_err(|err| DecodeError::from_shape(&err))
}

/// Peers may report `age` as a fractional number of seconds. Whole seconds are kept and
/// negative values clamp to zero.
fn deserialize_age_seconds<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let seconds = <f64 as serde::Deserialize>::deserialize(deserializer)?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(seconds.max(0.0) as u32)
}
