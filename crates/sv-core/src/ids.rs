use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(UserId, "Stable opaque identifier for a user.");
opaque_id!(FolderId, "Stable opaque identifier for a folder (`folder_unique_id`).");
opaque_id!(ShareId, "Short, base32 identifier for a published share.");
opaque_id!(SessionId, "Identifier for a download session.");
opaque_id!(MessageId, "Opaque article identifier on the transport.");

const ALPHABET: base32::Alphabet = base32::Alphabet::RFC4648 { padding: false };

/// Generates a fresh random opaque id with the given byte width, base32-encoded
/// (no padding, uppercase) the way [`ShareId`] and [`SessionId`] values are minted.
pub fn random_id(bytes: usize) -> String {
    use rand::RngCore;
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    encode_base32(&buf)
}

/// Public entry point for crates that need the same unpadded base32 alphabet
/// [`random_id`] uses but over bytes they generated themselves (e.g. the
/// publisher encoding a `share_id` it also needs as raw bytes for the access
/// credential).
pub fn encode_base32(bytes: &[u8]) -> String {
    base32::encode(ALPHABET, bytes)
}

/// Inverse of [`encode_base32`]: decodes an unpadded, case-insensitive base32
/// string back to bytes. Returns `None` on any character outside the
/// alphabet, so callers decoding untrusted input (an access credential
/// someone mistyped) get a clean rejection rather than a panic.
pub fn decode_base32(s: &str) -> Option<Vec<u8>> {
    base32::decode(ALPHABET, &s.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_id_is_uppercase_base32_alphabet() {
        let id = random_id(16);
        assert!(id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert!(!id.is_empty());
    }

    #[test]
    fn ids_display_round_trip() {
        let f = FolderId::from("abc123");
        assert_eq!(f.to_string(), "abc123");
        assert_eq!(f.as_str(), "abc123");
    }

    #[test]
    fn base32_round_trips_arbitrary_bytes() {
        let bytes: Vec<u8> = (0..=64u16).map(|b| b as u8).collect();
        let encoded = encode_base32(&bytes);
        let decoded = decode_base32(&encoded).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn base32_decode_is_case_insensitive() {
        let encoded = encode_base32(b"sharevault");
        assert_eq!(decode_base32(&encoded.to_lowercase()), decode_base32(&encoded));
    }

    #[test]
    fn base32_decode_rejects_invalid_characters() {
        assert!(decode_base32("not-base32!").is_none());
    }
}
