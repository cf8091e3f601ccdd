//! The signed multipart wire format.

use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::WireError;

pub const DELIMITER: &[u8] = b"<IDS|MSG>";

/// Protocol version advertised in headers and in `kernel_info_reply`.
pub const PROTOCOL_VERSION: [u32; 2] = [4, 1];

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MsgHeader {
    pub msg_id: String,
    #[serde(default)]
    pub username: String,
    pub session: String,
    /// Unreadable timestamps are treated as absent.
    #[serde(
        default,
        deserialize_with = "lenient_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<DateTime<Utc>>,
    pub msg_type: String,
    #[serde(default)]
    pub version: String,
}

impl MsgHeader {
    pub fn new(msg_type: &str, session: &str, username: &str) -> MsgHeader {
        MsgHeader {
            msg_id: Uuid::new_v4().hyphenated().to_string(),
            username: username.to_owned(),
            session: session.to_owned(),
            date: Some(Utc::now()),
            msg_type: msg_type.to_owned(),
            version: format!("{}.{}", PROTOCOL_VERSION[0], PROTOCOL_VERSION[1]),
        }
    }
}

// Frontends send RFC 3339, but older ones leave off the offset.
fn lenient_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<Value>::deserialize(d)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(parse_date))
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Routing identities captured in front of the delimiter. Opaque; replayed
/// verbatim in front of every reply to the same request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope(pub Vec<Vec<u8>>);

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: MsgHeader,
    /// `None` for messages that do not answer anything; sent as `{}`.
    pub parent_header: Option<MsgHeader>,
    pub metadata: Map<String, Value>,
    pub content: Value,
}

impl Message {
    /// Builds a message answering `self`: the parent header is our header and
    /// the session and username carry over.
    pub fn reply<T: Serialize>(&self, msg_type: &str, content: &T) -> Result<Message, WireError> {
        let content = serde_json::to_value(content).map_err(|source| WireError::Serialize {
            part: "content",
            source,
        })?;
        Ok(Message {
            header: MsgHeader::new(msg_type, &self.header.session, &self.header.username),
            parent_header: Some(self.header.clone()),
            metadata: Map::new(),
            content,
        })
    }

    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }
}

fn mac_over(key: &[u8], parts: &[Vec<u8>]) -> Result<HmacSha256, WireError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| WireError::InvalidKey)?;
    for p in parts {
        mac.update(p);
    }
    Ok(mac)
}

/// Hex HMAC-SHA256 over `parts` in order, or an empty string for an empty key.
pub fn sign(key: &[u8], parts: &[Vec<u8>]) -> Result<String, WireError> {
    if key.is_empty() {
        return Ok(String::new());
    }
    let mac = mac_over(key, parts)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn verify(key: &[u8], signature: &[u8], parts: &[Vec<u8>]) -> Result<(), WireError> {
    let expected = hex::decode(signature).map_err(|_| WireError::InvalidSignature)?;
    // constant-time comparison
    mac_over(key, parts)?
        .verify_slice(&expected)
        .map_err(|_| WireError::InvalidSignature)
}

fn to_frame<T: Serialize>(part: &'static str, value: &T) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(value).map_err(|source| WireError::Serialize { part, source })
}

fn from_frame<T: DeserializeOwned>(part: &'static str, frame: &[u8]) -> Result<T, WireError> {
    serde_json::from_slice(frame).map_err(|source| WireError::MalformedPayload { part, source })
}

fn parent_from_frame(frame: &[u8]) -> Result<Option<MsgHeader>, WireError> {
    let part = "parent_header";
    let map: Map<String, Value> = from_frame(part, frame)?;
    if map.is_empty() {
        return Ok(None);
    }
    serde_json::from_value(Value::Object(map))
        .map(Some)
        .map_err(|source| WireError::MalformedPayload { part, source })
}

/// Parses a received multipart message, checking its signature when `key` is
/// non-empty. Nothing past the signature is parsed if it does not match.
pub fn decode(mut frames: Vec<Vec<u8>>, key: &[u8]) -> Result<(Message, Envelope), WireError> {
    let delim = frames
        .iter()
        .position(|f| f.as_slice() == DELIMITER)
        .ok_or(WireError::MissingDelimiter(frames.len()))?;
    let body = frames.split_off(delim);
    if body.len() < 6 {
        return Err(WireError::Truncated(body.len() - 1));
    }
    let envelope = Envelope(frames);

    let signature = &body[1];
    let parts = &body[2..6];
    if !key.is_empty() {
        verify(key, signature, parts)?;
    }

    let msg = Message {
        header: from_frame("header", &parts[0])?,
        parent_header: parent_from_frame(&parts[1])?,
        metadata: from_frame("metadata", &parts[2])?,
        content: from_frame("content", &parts[3])?,
    };
    Ok((msg, envelope))
}

/// Serializes and signs `msg`, returning the signature frame followed by the
/// four payload frames. The caller adds identities and the delimiter.
pub fn encode(msg: &Message, key: &[u8]) -> Result<Vec<Vec<u8>>, WireError> {
    let parent_header = match msg.parent_header {
        Some(ref h) => to_frame("parent_header", h)?,
        None => b"{}".to_vec(),
    };
    let parts = vec![
        to_frame("header", &msg.header)?,
        parent_header,
        to_frame("metadata", &msg.metadata)?,
        to_frame("content", &msg.content)?,
    ];
    let mut frames = Vec::with_capacity(5);
    frames.push(sign(key, &parts)?.into_bytes());
    frames.extend(parts);
    Ok(frames)
}

/// Complete frame list for sending `msg` back along `envelope`.
pub fn frames_for(
    envelope: &Envelope,
    msg: &Message,
    key: &[u8],
) -> Result<Vec<Vec<u8>>, WireError> {
    let mut frames = envelope.0.clone();
    frames.push(DELIMITER.to_vec());
    frames.extend(encode(msg, key)?);
    Ok(frames)
}
