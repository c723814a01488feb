//! Body snapshot for recordings.

use crate::http::HttpHeaders;
use bytes::Bytes;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use md5::{Digest, Md5};
use std::io::Read;
use tracing::debug;

/// Bytes inspected by the text heuristic.
const TEXT_SAMPLE_SIZE: usize = 8 * 1024;

/// Share of control characters tolerated in text.
const MAX_CONTROL_RATIO: f64 = 0.05;

/// Rough content class of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyClassification {
    Empty,
    Text,
    Image,
    Binary,
}

/// Decoded body with its classification and MD5 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBody {
    pub bytes: Bytes,
    pub classification: BodyClassification,
    /// Lowercase hex digest, empty for an empty body.
    pub md5: String,
}

impl RecordedBody {
    /// Snapshot `raw`, optionally decoding it per the `Content-Encoding` header.
    pub fn new(headers: &HttpHeaders, raw: &Bytes, decode: bool) -> Self {
        let bytes = if decode {
            decode_body(headers.get("content-encoding"), raw)
        } else {
            raw.clone()
        };

        let classification = classify(headers.get("content-type"), &bytes);
        let md5 = if bytes.is_empty() {
            String::new()
        } else {
            md5_hex(&bytes)
        };

        Self {
            bytes,
            classification,
            md5,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Body as text, if it was classified as such.
    pub fn text(&self) -> Option<String> {
        (self.classification == BodyClassification::Text)
            .then(|| String::from_utf8_lossy(&self.bytes).into_owned())
    }
}

fn classify(content_type: Option<&str>, bytes: &[u8]) -> BodyClassification {
    if bytes.is_empty() {
        BodyClassification::Empty
    } else if content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("image"))
        .unwrap_or(false)
    {
        BodyClassification::Image
    } else if is_text(bytes) {
        BodyClassification::Text
    } else {
        BodyClassification::Binary
    }
}

/// Lowercase hex MD5 digest.
pub fn md5_hex(bytes: &[u8]) -> String {
    Md5::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Heuristic text detection over the start of the content.
pub fn is_text(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    // UTF-8 and UTF-16 byte order marks
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF])
        || bytes.starts_with(&[0xFF, 0xFE])
        || bytes.starts_with(&[0xFE, 0xFF])
    {
        return true;
    }

    let sample = &bytes[..bytes.len().min(TEXT_SAMPLE_SIZE)];
    if sample.contains(&0) {
        return false;
    }

    let text = match std::str::from_utf8(sample) {
        Ok(text) => text,
        // The sample may cut a multi-byte sequence at its end
        Err(e) if e.error_len().is_none() => match std::str::from_utf8(&sample[..e.valid_up_to()]) {
            Ok(text) => text,
            Err(_) => return false,
        },
        Err(_) => return false,
    };

    let total = text.chars().count();
    if total == 0 {
        return false;
    }
    let control = text
        .chars()
        .filter(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r' | '\x0c'))
        .count();
    (control as f64 / total as f64) <= MAX_CONTROL_RATIO
}

/// Undo the content codings listed in `content_encoding`, last applied first.
/// Unknown codings and decode failures return the input unchanged.
pub fn decode_body(content_encoding: Option<&str>, raw: &Bytes) -> Bytes {
    let Some(content_encoding) = content_encoding else {
        return raw.clone();
    };

    let mut bytes = raw.to_vec();
    for coding in content_encoding.rsplit(',').map(|c| c.trim().to_ascii_lowercase()) {
        let decoded = match coding.as_str() {
            "" | "identity" => continue,
            "gzip" | "x-gzip" => read_all(GzDecoder::new(&bytes[..])),
            "deflate" => read_all(ZlibDecoder::new(&bytes[..]))
                .or_else(|_| read_all(DeflateDecoder::new(&bytes[..]))),
            "br" => read_all(brotli::Decompressor::new(&bytes[..], 4096)),
            other => {
                debug!("Unsupported content encoding '{}', keeping raw body", other);
                return raw.clone();
            }
        };
        match decoded {
            Ok(decoded) => bytes = decoded,
            Err(e) => {
                debug!("Failed to decode '{}' body: {}", coding, e);
                return raw.clone();
            }
        }
    }
    Bytes::from(bytes)
}

fn read_all(mut reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}
