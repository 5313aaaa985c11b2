//! Correlation codec.
//!
//! `extract_id` reads only the `id` field of a JSON envelope. Every other field
//! is skipped with `IgnoredAny`, so the bridge neither needs nor builds the
//! full schema of a payload, and new fields added by the script are harmless.
//!
//! Full typed decoding (`decode_response`) is for callers that want the
//! records; the bridge itself returns raw bytes.

use std::fmt;

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, Visitor};

use super::protocol::{Command, RESPONSE_KINDS, Response};

#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    #[error("payload is not a JSON object envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("payload has no `id` field")]
    MissingId,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed response: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("response has no `command` field")]
    MissingKind,

    #[error("unknown response kind '{0}'")]
    UnknownKind(String),
}

/// Seed that walks a JSON object and keeps a single string field.
struct SingleField<'f> {
    field: &'f str,
}

impl<'de> DeserializeSeed<'de> for SingleField<'_> {
    type Value = Option<String>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for SingleField<'_> {
    type Value = Option<String>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a JSON object with a string `{}` field", self.field)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut found: Option<String> = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == self.field {
                if found.is_some() {
                    return Err(de::Error::custom(format!(
                        "duplicate field `{}`",
                        self.field
                    )));
                }
                found = Some(map.next_value()?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(found)
    }
}

fn extract_field(bytes: &[u8], field: &str) -> Result<Option<String>, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = SingleField { field }.deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}

/// Correlation id of a command or response envelope.
pub fn extract_id(bytes: &[u8]) -> Result<String, CorrelationError> {
    extract_field(bytes, "id")
        .map_err(CorrelationError::Malformed)?
        .ok_or(CorrelationError::MissingId)
}

/// `command` discriminator of an envelope, if present.
pub fn extract_kind(bytes: &[u8]) -> Result<Option<String>, serde_json::Error> {
    extract_field(bytes, "command")
}

pub fn encode_command(command: &Command) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(command)?;
    tracing::trace!(
        kind = command.kind(),
        id = command.id(),
        json_size_bytes = json.len(),
        "Encoded command"
    );
    Ok(json)
}

/// Decode a response, reporting unrecognised kinds explicitly.
pub fn decode_response(bytes: &[u8]) -> Result<Response, DecodeError> {
    let kind = extract_kind(bytes)
        .map_err(DecodeError::Malformed)?
        .ok_or(DecodeError::MissingKind)?;

    if !RESPONSE_KINDS.contains(&kind.as_str()) {
        return Err(DecodeError::UnknownKind(kind));
    }

    serde_json::from_slice(bytes).map_err(DecodeError::Malformed)
}
