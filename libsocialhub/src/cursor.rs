//! Opaque pagination cursors
//!
//! Every platform paginates differently: Facebook and Instagram hand
//! out opaque `after` tokens, LinkedIn uses numeric offsets, Twitter
//! walks an id watermark, YouTube issues page tokens. A [`Cursor`]
//! wraps whichever idiom its platform uses behind one encode/decode
//! contract so callers can pass cursors across process and API
//! boundaries as plain strings. A cursor is never interpreted outside
//! the adapter that issued it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::types::Platform;

/// Platform-specific pagination state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum CursorPayload {
    /// Numeric record offset (LinkedIn `start`).
    Offset(u64),
    /// Opaque string token (Facebook/Instagram `after`, YouTube `pageToken`).
    PageToken(String),
    /// Id or timestamp watermark (Twitter `max_id` walking).
    Watermark(i64),
}

/// An opaque pagination token scoped to one adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub platform: Platform,
    pub payload: CursorPayload,
}

impl Cursor {
    pub fn offset(platform: Platform, start: u64) -> Self {
        Self {
            platform,
            payload: CursorPayload::Offset(start),
        }
    }

    pub fn page_token(platform: Platform, token: impl Into<String>) -> Self {
        Self {
            platform,
            payload: CursorPayload::PageToken(token.into()),
        }
    }

    pub fn watermark(platform: Platform, mark: i64) -> Self {
        Self {
            platform,
            payload: CursorPayload::Watermark(mark),
        }
    }

    /// Encode to the external wire form: URL-safe base64 over a compact
    /// JSON envelope. Safe to embed in query strings and JSON bodies.
    pub fn encode(&self) -> String {
        // Serialization of this enum cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode the external wire form back into a cursor.
    pub fn decode(encoded: &str) -> Result<Self, AdapterError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .map_err(|e| AdapterError::InvalidCursor(format!("not base64: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AdapterError::InvalidCursor(format!("corrupt envelope: {}", e)))
    }

    /// Check that this cursor was issued by `platform`'s adapter and
    /// return its payload. Adapters call this before interpreting
    /// anything.
    pub fn payload_for(&self, platform: Platform) -> Result<&CursorPayload, AdapterError> {
        if self.platform != platform {
            return Err(AdapterError::InvalidCursor(format!(
                "cursor was issued by {} but presented to {}",
                self.platform, platform
            )));
        }
        Ok(&self.payload)
    }

    /// Payload accessor for adapters that only ever issue page tokens.
    pub fn as_page_token(&self, platform: Platform) -> Result<&str, AdapterError> {
        match self.payload_for(platform)? {
            CursorPayload::PageToken(token) => Ok(token),
            other => Err(AdapterError::InvalidCursor(format!(
                "{} expected a page token cursor, got {:?}",
                platform, other
            ))),
        }
    }

    /// Payload accessor for adapters that only ever issue offsets.
    pub fn as_offset(&self, platform: Platform) -> Result<u64, AdapterError> {
        match self.payload_for(platform)? {
            CursorPayload::Offset(start) => Ok(*start),
            other => Err(AdapterError::InvalidCursor(format!(
                "{} expected an offset cursor, got {:?}",
                platform, other
            ))),
        }
    }

    /// Payload accessor for adapters that only ever issue watermarks.
    pub fn as_watermark(&self, platform: Platform) -> Result<i64, AdapterError> {
        match self.payload_for(platform)? {
            CursorPayload::Watermark(mark) => Ok(*mark),
            other => Err(AdapterError::InvalidCursor(format!(
                "{} expected a watermark cursor, got {:?}",
                platform, other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip_all_payloads() {
        let cursors = [
            Cursor::offset(Platform::LinkedIn, 40),
            Cursor::page_token(Platform::Facebook, "QVFIUk5…after"),
            Cursor::watermark(Platform::Twitter, 1_699_999_999),
        ];
        for cursor in cursors {
            let encoded = cursor.encode();
            let decoded = Cursor::decode(&encoded).unwrap();
            assert_eq!(decoded, cursor);
        }
    }

    #[test]
    fn test_encoded_form_is_url_safe() {
        let cursor = Cursor::page_token(Platform::YouTube, "CAUQAA==&next?page");
        let encoded = cursor.encode();
        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Cursor::decode("!!not base64!!"),
            Err(AdapterError::InvalidCursor(_))
        ));
        // Valid base64, invalid envelope.
        let junk = URL_SAFE_NO_PAD.encode(b"{\"nope\":true}");
        assert!(matches!(
            Cursor::decode(&junk),
            Err(AdapterError::InvalidCursor(_))
        ));
    }

    #[test]
    fn test_payload_for_wrong_platform() {
        let cursor = Cursor::page_token(Platform::Facebook, "after-token");
        let err = cursor.payload_for(Platform::Instagram).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidCursor(_)));
        assert!(format!("{}", err).contains("facebook"));
        assert!(format!("{}", err).contains("instagram"));
    }

    #[test]
    fn test_as_page_token_wrong_variant() {
        let cursor = Cursor::offset(Platform::LinkedIn, 10);
        assert!(cursor.as_offset(Platform::LinkedIn).is_ok());
        assert!(matches!(
            cursor.as_page_token(Platform::LinkedIn),
            Err(AdapterError::InvalidCursor(_))
        ));
        assert!(matches!(
            cursor.as_watermark(Platform::LinkedIn),
            Err(AdapterError::InvalidCursor(_))
        ));
    }
}
