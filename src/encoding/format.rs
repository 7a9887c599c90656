//! Formats raw keys and values for diagnostics. Composite keys are rendered
//! with their structural parts; everything else falls back to escaped ASCII.

use itertools::Itertools as _;

use crate::key;

/// Formats encoded keys and values.
pub trait Formatter {
    /// Formats a key.
    fn key(key: &[u8]) -> String;

    /// Formats a value. Also takes the key to determine the kind of value.
    fn value(key: &[u8], value: &[u8]) -> String;

    /// Formats a key/value pair.
    fn key_value(key: &[u8], value: &[u8]) -> String {
        format!("{} → {}", Self::key(key), Self::value(key, value))
    }
}

/// Formats raw byte slices without any decoding.
pub struct Raw;

impl Raw {
    /// Formats raw bytes as escaped ASCII strings.
    pub fn bytes(bytes: &[u8]) -> String {
        let escaped = bytes
            .iter()
            .copied()
            .flat_map(std::ascii::escape_default)
            .collect_vec();
        format!("\"{}\"", String::from_utf8_lossy(&escaped))
    }
}

impl Formatter for Raw {
    fn key(key: &[u8]) -> String {
        Self::bytes(key)
    }

    fn value(_key: &[u8], value: &[u8]) -> String {
        Self::bytes(value)
    }
}

/// Formats composite store keys as table/index/parts.
pub struct Composite;

impl Formatter for Composite {
    fn key(key: &[u8]) -> String {
        let Ok(decoded) = key::decode(key) else {
            return Raw::bytes(key); // metadata or foreign key
        };
        if decoded.index_id == key::PRIMARY_INDEX_ID {
            format!(
                "t{}/primary{}",
                decoded.table_id,
                Raw::bytes(decoded.tail)
            )
        } else {
            format!(
                "t{}/i{} key={} tail={}",
                decoded.table_id,
                decoded.index_id,
                Raw::bytes(decoded.index_key),
                Raw::bytes(decoded.tail)
            )
        }
    }

    fn value(_key: &[u8], value: &[u8]) -> String {
        if value.is_empty() {
            return "∅".to_string();
        }
        Raw::bytes(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyBuilder;

    #[test]
    fn test_raw_escapes_control_bytes() {
        assert_eq!(Raw::bytes(b"a\x00b"), "\"a\\x00b\"");
    }

    #[test]
    fn test_composite_primary_key() {
        let pk = KeyBuilder::new().add_u64(1).bytes();
        let key = key::encode(1, key::PRIMARY_INDEX_ID, &[], &[], &pk);
        let rendered = Composite::key(&key);
        assert!(rendered.starts_with("t1/primary"));
    }

    #[test]
    fn test_composite_index_key() {
        let ik = KeyBuilder::new().add_string("acct").bytes();
        let pk = KeyBuilder::new().add_u64(1).bytes();
        let key = key::encode(2, 1, &ik, &[], &pk);
        let rendered = Composite::key(&key);
        assert!(rendered.starts_with("t2/i1 key="));
    }

    #[test]
    fn test_composite_falls_back_on_foreign_keys() {
        assert_eq!(Composite::key(&[0x01]), Raw::bytes(&[0x01]));
    }

    #[test]
    fn test_empty_index_value() {
        assert_eq!(Composite::value(b"k", b""), "∅");
    }
}
