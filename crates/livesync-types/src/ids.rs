//! Typed identifiers for rooms and file records.
//!
//! Both wrap an owned string. They're opaque on the wire (a plain JSON string
//! or a store key) and display verbatim for logging. Fresh ids are short
//! lowercase base-36 tokens, which keeps them readable in share links.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::record::ValidationError;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of a generated [`FileId`].
pub const FILE_ID_LEN: usize = 9;

/// Prefix of a generated [`RoomId`].
pub const ROOM_PREFIX: &str = "sync-";

/// Length of the random suffix of a generated [`RoomId`].
pub const ROOM_SUFFIX_LEN: usize = 5;

/// Random lowercase base-36 token of the given length.
fn base36_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// A file record key, unique within a room.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

/// A room identifier.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_string_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Wrap a non-empty identifier. Surrounding whitespace is trimmed.
            pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
                let trimmed = raw.as_ref().trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::EmptyId($name));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Borrow the identifier text.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume into the identifier text.
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.0)
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $T {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

impl_string_id!(FileId, "FileId");
impl_string_id!(RoomId, "RoomId");

impl FileId {
    /// Generate a fresh random key (9 lowercase base-36 characters).
    ///
    /// Collisions are possible in principle; the key space is 36^9.
    pub fn generate() -> Self {
        Self(base36_token(FILE_ID_LEN))
    }
}

impl RoomId {
    /// Generate a fresh room token: `sync-` followed by 5 base-36 characters.
    pub fn generate() -> Self {
        Self(format!("{ROOM_PREFIX}{}", base36_token(ROOM_SUFFIX_LEN)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn is_base36(s: &str) -> bool {
        s.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
    }

    #[test]
    fn test_generated_file_id_shape() {
        let id = FileId::generate();
        assert_eq!(id.as_str().len(), FILE_ID_LEN);
        assert!(is_base36(id.as_str()));
    }

    #[test]
    fn test_generated_file_ids_differ() {
        let a = FileId::generate();
        let b = FileId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_generated_room_shape() {
        let room = RoomId::generate();
        let suffix = room.as_str().strip_prefix(ROOM_PREFIX).expect("prefix");
        assert_eq!(suffix.len(), ROOM_SUFFIX_LEN);
        assert!(is_base36(suffix));
    }

    #[test]
    fn test_new_trims_and_rejects_empty() {
        assert_eq!(RoomId::new("  r1 ").unwrap().as_str(), "r1");
        assert!(matches!(RoomId::new("   "), Err(ValidationError::EmptyId("RoomId"))));
        assert!("".parse::<FileId>().is_err());
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = FileId::new("abc123xyz").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123xyz\"");
        let back: FileId = serde_json::from_str("\"abc123xyz\"").unwrap();
        assert_eq!(back, id);
    }
}
