//! Text encodings for metadata values
//!
//! Values are stored as raw bytes in the coordination service. The store
//! converts between `String` and bytes with a configurable charset, named the
//! way Java/IANA charsets are named so configuration stays portable.

use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while resolving an encoding name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("'encoding' cannot be null or empty")]
    Empty,

    #[error("unsupported encoding: {0}")]
    Unsupported(String),
}

/// Supported charsets for node payloads
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    /// UTF-8 (default)
    #[default]
    Utf8,
    /// UTF-16 with byte-order mark (written big-endian)
    Utf16,
    /// UTF-16 big-endian, no byte-order mark
    Utf16Be,
    /// UTF-16 little-endian, no byte-order mark
    Utf16Le,
    /// ISO-8859-1 (Latin-1)
    Iso8859_1,
    /// 7-bit US-ASCII
    UsAscii,
}

const BOM_BE: [u8; 2] = [0xFE, 0xFF];
const BOM_LE: [u8; 2] = [0xFF, 0xFE];

impl TextEncoding {
    /// Canonical charset name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf16 => "UTF-16",
            Self::Utf16Be => "UTF-16BE",
            Self::Utf16Le => "UTF-16LE",
            Self::Iso8859_1 => "ISO-8859-1",
            Self::UsAscii => "US-ASCII",
        }
    }

    /// Encode a value into node payload bytes.
    ///
    /// Characters the charset cannot represent are written as `?`.
    #[must_use]
    pub fn encode(self, value: &str) -> Bytes {
        match self {
            Self::Utf8 => Bytes::copy_from_slice(value.as_bytes()),
            Self::Utf16 => {
                let mut out = BOM_BE.to_vec();
                out.extend(value.encode_utf16().flat_map(u16::to_be_bytes));
                Bytes::from(out)
            }
            Self::Utf16Be => value.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            Self::Utf16Le => value.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Self::Iso8859_1 => value
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            Self::UsAscii => value
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
        }
    }

    /// Decode node payload bytes into a value.
    ///
    /// Malformed input never fails; it decodes to U+FFFD.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Utf16 => {
                if let Some(rest) = bytes.strip_prefix(&BOM_LE) {
                    decode_utf16(rest, u16::from_le_bytes)
                } else {
                    decode_utf16(bytes.strip_prefix(&BOM_BE).unwrap_or(bytes), u16::from_be_bytes)
                }
            }
            Self::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
            Self::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            Self::Iso8859_1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Self::UsAscii => bytes
                .iter()
                .map(|&b| {
                    if b.is_ascii() {
                        char::from(b)
                    } else {
                        char::REPLACEMENT_CHARACTER
                    }
                })
                .collect(),
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let chunks = bytes.chunks_exact(2);
    let trailing = !chunks.remainder().is_empty();
    let units = chunks.map(|pair| unit([pair[0], pair[1]]));
    let mut out: String = char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    if trailing {
        out.push(char::REPLACEMENT_CHARACTER);
    }
    out
}

impl FromStr for TextEncoding {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            return Err(EncodingError::Empty);
        }
        let normalized = name.to_ascii_uppercase().replace('_', "-");
        match normalized.as_str() {
            "UTF-8" | "UTF8" => Ok(Self::Utf8),
            "UTF-16" | "UTF16" => Ok(Self::Utf16),
            "UTF-16BE" | "UTF16BE" => Ok(Self::Utf16Be),
            "UTF-16LE" | "UTF16LE" => Ok(Self::Utf16Le),
            "ISO-8859-1" | "ISO8859-1" | "LATIN1" | "LATIN-1" => Ok(Self::Iso8859_1),
            "US-ASCII" | "ASCII" => Ok(Self::UsAscii),
            _ => Err(EncodingError::Unsupported(name.to_string())),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("utf-8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("UTF8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("latin1".parse::<TextEncoding>().unwrap(), TextEncoding::Iso8859_1);
        assert_eq!("ISO8859_1".parse::<TextEncoding>().unwrap(), TextEncoding::Iso8859_1);
        assert_eq!("utf-16le".parse::<TextEncoding>().unwrap(), TextEncoding::Utf16Le);
        assert_eq!("ascii".parse::<TextEncoding>().unwrap(), TextEncoding::UsAscii);
    }

    #[test]
    fn test_parse_rejects_empty_and_unknown() {
        assert_eq!("".parse::<TextEncoding>(), Err(EncodingError::Empty));
        assert_eq!("   ".parse::<TextEncoding>(), Err(EncodingError::Empty));
        assert_eq!(
            "EBCDIC".parse::<TextEncoding>(),
            Err(EncodingError::Unsupported("EBCDIC".to_string()))
        );
    }

    #[test]
    fn test_multibyte_round_trip() {
        let value = "Grüße, 世界 🦀";
        for encoding in [
            TextEncoding::Utf8,
            TextEncoding::Utf16,
            TextEncoding::Utf16Be,
            TextEncoding::Utf16Le,
        ] {
            assert_eq!(encoding.decode(&encoding.encode(value)), value, "{encoding}");
        }
    }

    #[test]
    fn test_utf16_writes_bom_and_detects_le() {
        let bytes = TextEncoding::Utf16.encode("A");
        assert_eq!(bytes.as_ref(), &[0xFE, 0xFF, 0x00, 0x41]);
        assert_eq!(TextEncoding::Utf16.decode(&[0xFF, 0xFE, 0x41, 0x00]), "A");
    }

    #[test]
    fn test_unmappable_characters() {
        assert_eq!(TextEncoding::Iso8859_1.encode("é€").as_ref(), &[0xE9, b'?']);
        assert_eq!(TextEncoding::UsAscii.encode("aé").as_ref(), b"a?");
        assert_eq!(TextEncoding::UsAscii.decode(&[b'a', 0xE9]), "a\u{FFFD}");
        assert_eq!(TextEncoding::Utf8.decode(&[0x66, 0xFF]), "f\u{FFFD}");
        assert_eq!(TextEncoding::Utf16Be.decode(&[0x00, 0x41, 0x00]), "A\u{FFFD}");
    }
}
