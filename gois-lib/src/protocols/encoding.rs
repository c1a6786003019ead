//! Best-effort decoding of WHOIS response bytes.
//!
//! Registries answer in whatever encoding they like. Decoding never fails:
//! when no candidate encoding accepts the bytes, the result is lossy UTF-8.

use encoding_rs::{UTF_8, WINDOWS_1252};
use std::borrow::Cow;

/// Encodings tried in order by [`decode_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
    Windows1252,
}

pub const FALLBACK_ENCODINGS: [TextEncoding; 3] = [
    TextEncoding::Utf8,
    TextEncoding::Latin1,
    TextEncoding::Windows1252,
];

impl TextEncoding {
    /// Strict decode; `None` if the bytes are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => UTF_8
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(Cow::into_owned),
            // C1 controls never appear in real ISO-8859-1 text; their
            // presence means the sender used Windows-1252.
            TextEncoding::Latin1 if bytes.iter().any(|b| (0x80..=0x9f).contains(b)) => None,
            TextEncoding::Latin1 => Some(encoding_rs::mem::decode_latin1(bytes).into_owned()),
            TextEncoding::Windows1252 => WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(Cow::into_owned),
        }
    }
}

/// Decode with the first encoding in [`FALLBACK_ENCODINGS`] that accepts
/// the bytes.
pub fn decode_text(bytes: &[u8]) -> String {
    FALLBACK_ENCODINGS
        .iter()
        .find_map(|encoding| encoding.decode(bytes))
        .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
}
