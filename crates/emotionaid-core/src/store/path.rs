//! Key to filename mapping.
//!
//! `[A-Za-z0-9_-]` is kept as is; every other UTF-8 byte, including `%`,
//! `.` and path separators, becomes `%XX`. The mapping is deterministic,
//! injective and reversible, which lets the store list its keys back.
//!
//! Escaped stems longer than [`MAX_ESCAPED_STEM`] would overflow the
//! filesystem's name limit. Those keys get a fixed-length hashed stem,
//! `<escaped prefix>~<sha256 hex>`, and the key itself is kept inside the
//! record. `~` never appears in an escaped stem, so the two forms cannot
//! collide.

use std::fmt::Write;

use sha2::{Digest, Sha256};

/// Extension of KV record files
pub(crate) const RECORD_EXTENSION: &str = "dat";

/// Longest escaped stem used verbatim as a filename
pub(crate) const MAX_ESCAPED_STEM: usize = 150;

/// Readable part kept in front of a hashed stem
const HASHED_PREFIX_LEN: usize = 64;

const HASH_SEPARATOR: char = '~';

fn is_plain(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-'
}

/// How a key is laid out on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordName {
    /// Stem is the escaped key
    Escaped(String),
    /// Stem is a digest; the record carries its key
    Hashed(String),
}

impl RecordName {
    pub(crate) fn for_key(key: &str) -> Self {
        let escaped = escape_key(key);
        if escaped.len() <= MAX_ESCAPED_STEM {
            return Self::Escaped(escaped);
        }
        // Escaped stems are ASCII, so any byte index is a char boundary
        let mut stem = escaped[..HASHED_PREFIX_LEN].to_string();
        stem.push(HASH_SEPARATOR);
        stem.push_str(&hex::encode(Sha256::digest(key.as_bytes())));
        Self::Hashed(stem)
    }

    pub(crate) fn stem(&self) -> &str {
        match self {
            Self::Escaped(stem) | Self::Hashed(stem) => stem,
        }
    }

    pub(crate) fn is_hashed(&self) -> bool {
        matches!(self, Self::Hashed(_))
    }
}

/// Whether a stem found on disk has the hashed form.
pub(crate) fn is_hashed_stem(stem: &str) -> bool {
    let Some((prefix, digest)) = stem.split_once(HASH_SEPARATOR) else {
        return false;
    };
    prefix.len() == HASHED_PREFIX_LEN
        && prefix.bytes().all(|b| is_plain(b) || b == b'%' || b.is_ascii_hexdigit())
        && digest.len() == 64
        && digest.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Encode a key as a filename stem.
pub(crate) fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if is_plain(byte) {
            out.push(byte as char);
        } else {
            let _ = write!(out, "%{:02X}", byte);
        }
    }
    out
}

/// Decode a filename stem back into a key.
///
/// Returns `None` for stems that [`escape_key`] could not have produced.
pub(crate) fn unescape_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = stem.get(i + 1..i + 3)?;
                if !hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_lowercase()) {
                    return None;
                }
                let byte = u8::from_str_radix(hex, 16).ok()?;
                if is_plain(byte) {
                    return None;
                }
                out.push(byte);
                i += 3;
            }
            b if is_plain(b) => {
                out.push(b);
                i += 1;
            }
            _ => return None,
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_keys_stay_readable() {
        assert_eq!(escape_key("chat_U1"), "chat_U1");
        assert_eq!(
            escape_key("diary_entries_U1_page3"),
            "diary_entries_U1_page3"
        );
    }

    #[test]
    fn test_separators_are_escaped() {
        assert_eq!(escape_key("a/b"), "a%2Fb");
        assert_eq!(escape_key("a\\b"), "a%5Cb");
        assert_eq!(escape_key("../up"), "%2E%2E%2Fup");
        assert_eq!(escape_key("chat_U1.json"), "chat_U1%2Ejson");
    }

    #[test]
    fn test_separator_does_not_collide_with_underscore() {
        assert_ne!(escape_key("a/b"), escape_key("a_b"));
        assert_ne!(escape_key("a%2Fb"), escape_key("a/b"));
    }

    #[test]
    fn test_unescape_roundtrip() {
        for key in ["cache_message_U1_x+y/z=", "профиль", "a b", "%", ""] {
            assert_eq!(unescape_stem(&escape_key(key)).as_deref(), Some(key));
        }
    }

    #[test]
    fn test_short_keys_are_escaped_verbatim() {
        assert_eq!(
            RecordName::for_key("cache_a/b"),
            RecordName::Escaped("cache_a%2Fb".into())
        );
    }

    #[test]
    fn test_long_multibyte_key_gets_hashed_stem() {
        let key = format!("cache_{}", "я".repeat(50));
        let name = RecordName::for_key(&key);

        assert!(name.is_hashed());
        assert_eq!(name.stem().len(), HASHED_PREFIX_LEN + 1 + 64);
        assert!(name.stem().starts_with("cache_%D1%8F"));
        assert!(is_hashed_stem(name.stem()));
        assert!(unescape_stem(name.stem()).is_none());
    }

    #[test]
    fn test_hashed_stems_differ_per_key() {
        let a = RecordName::for_key(&"я".repeat(60));
        let b = RecordName::for_key(&format!("{}ю", "я".repeat(59)));
        assert_ne!(a, b);
        assert_eq!(a, RecordName::for_key(&"я".repeat(60)));
    }

    #[test]
    fn test_escaped_stems_are_never_hashed_form() {
        assert!(!is_hashed_stem(&escape_key("a~b")));
        assert!(!is_hashed_stem("chat_U1"));
    }

    #[test]
    fn test_unescape_rejects_foreign_names() {
        assert!(unescape_stem("has.dot").is_none());
        assert!(unescape_stem("bad%2").is_none());
        assert!(unescape_stem("lower%2f").is_none());
        assert!(unescape_stem("plain%41").is_none());
    }
}
