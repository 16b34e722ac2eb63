//! Self-describing `data:` URIs used to hand file contents to the extraction model.

use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;

const DEFAULT_MIME: &str = "application/octet-stream";

/// Errors raised while decoding a `data:` URI.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataUriError {
    /// Input does not start with `data:` or lacks the `,` separator.
    #[error("Not a data URI")]
    Malformed,
    /// Only base64-encoded payloads are accepted.
    #[error("Data URI must be base64 encoded")]
    NotBase64,
    /// The payload failed to decode.
    #[error("Invalid base64 payload: {0}")]
    InvalidPayload(String),
    /// The payload decoded to zero bytes.
    #[error("Data URI payload is empty")]
    Empty,
}

/// Decoded `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    /// Declared media type (defaults to `application/octet-stream`).
    pub mime_type: String,
    /// Decoded payload.
    pub bytes: Vec<u8>,
}

impl DataUri {
    /// Render the URI as `data:<mime>;base64,<payload>`.
    pub fn encode(&self) -> String {
        encode(&self.mime_type, &self.bytes)
    }
}

/// Encode bytes as a base64 `data:` URI with the given MIME type.
pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
    let mime_type = if mime_type.trim().is_empty() {
        DEFAULT_MIME
    } else {
        mime_type.trim()
    };
    format!("data:{mime_type};base64,{}", STANDARD.encode(bytes))
}

/// Decode a base64 `data:` URI.
pub fn decode(uri: &str) -> Result<DataUri, DataUriError> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or(DataUriError::Malformed)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUriError::Malformed)?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or(DataUriError::NotBase64)?;
    // Parameters such as `;charset=utf-8` stay out of the media type.
    let mime_type = mime_type.split(';').next().unwrap_or_default().trim();
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|err| DataUriError::InvalidPayload(err.to_string()))?;
    if bytes.is_empty() {
        return Err(DataUriError::Empty);
    }
    Ok(DataUri {
        mime_type: if mime_type.is_empty() {
            DEFAULT_MIME.to_string()
        } else {
            mime_type.to_string()
        },
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_media_type() {
        assert_eq!(encode("image/png", b"hi"), "data:image/png;base64,aGk=");
        assert_eq!(
            encode("", b"hi"),
            "data:application/octet-stream;base64,aGk="
        );
    }

    #[test]
    fn decodes_what_it_encodes() {
        let uri = encode("image/jpeg", &[0xff, 0xd8, 0xff]);
        let decoded = decode(&uri).expect("decode");
        assert_eq!(decoded.mime_type, "image/jpeg");
        assert_eq!(decoded.bytes, vec![0xff, 0xd8, 0xff]);
        assert_eq!(decoded.encode(), uri);
    }

    #[test]
    fn drops_media_type_parameters() {
        let decoded = decode("data:text/plain;charset=utf-8;base64,aGk=").expect("decode");
        assert_eq!(decoded.mime_type, "text/plain");
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(decode("https://example.org/a.png"), Err(DataUriError::Malformed));
        assert_eq!(decode("data:image/png;base64"), Err(DataUriError::Malformed));
        assert_eq!(decode("data:text/plain,hello"), Err(DataUriError::NotBase64));
        assert_eq!(decode("data:image/png;base64,"), Err(DataUriError::Empty));
        assert!(matches!(
            decode("data:image/png;base64,@@@"),
            Err(DataUriError::InvalidPayload(_))
        ));
    }
}
