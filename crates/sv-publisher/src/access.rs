use serde::{Deserialize, Serialize};

use sv_core::{decode_base32, encode_base32, Error, Result};
use sv_crypto::hash::sha256_prefix4;
use sv_crypto::identity::{self, IdentityCommitment};
use sv_crypto::kdf::{derive_identity_kek, derive_password_key, unwrap_key, wrap_key};
use sv_crypto::ContentKey;

const CREDENTIAL_MAGIC: u8 = 0x55;
const CREDENTIAL_VERSION: u8 = 0x01;
const CREDENTIAL_LEN: usize = 1 + 1 + 16 + 4;

/// One authorized user's published commitment plus their wrapped copy of
/// the share's session key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityGrant {
    pub commitment: IdentityCommitment,
    pub wrapped_session_key: Vec<u8>,
}

/// Mode-specific instructions for recovering a share's session key,
/// published in the clear alongside the encrypted index body so a holder
/// can unlock the body without already having the key that protects it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AccessBlock {
    /// Anyone holding the credential can decrypt; the folder signature is
    /// still the only thing authenticating the content.
    Open { session_key: [u8; 32] },
    /// One commitment per authorized user, plus the owner's own wrapped
    /// copy so the owner never needs to re-derive from a collaborator's
    /// secret to read their own folder back.
    Identity { grants: Vec<IdentityGrant>, owner_wrapped_session_key: Vec<u8> },
    /// Password-derived key-encryption key wraps the session key directly.
    Password {
        salt: [u8; 16],
        memory_kib: u32,
        wrapped_session_key: Vec<u8>,
        password_hint: Option<String>,
    },
}

/// Whatever secret the caller holds to unlock a share; which variant
/// applies depends on the share's [`AccessBlock`] mode.
pub enum UnlockSecret {
    None,
    OwnerMasterSecret([u8; 32]),
    Identity { user_id: String, identity_secret: [u8; 32] },
    Password(Vec<u8>),
}

impl AccessBlock {
    pub fn open(session_key: &ContentKey) -> Self {
        Self::Open { session_key: *session_key.expose() }
    }

    /// Builds the identity access block. `owner_identity_secret` is the
    /// owner's own identity secret, used so the owner can always recover
    /// the session key without being listed as just another grant; `users`
    /// holds each authorized collaborator's `(user_id, identity_secret)`,
    /// learned out of band when the owner granted them access.
    pub fn identity(
        session_key: &ContentKey,
        owner_identity_secret: &[u8; 32],
        users: &[(String, [u8; 32])],
    ) -> Result<Self> {
        let mut grants = Vec::with_capacity(users.len());
        for (user_id, secret) in users {
            let commitment = identity::commit_user(user_id, secret)?;
            let kek = derive_identity_kek(secret)?;
            let wrapped_session_key = wrap_key(&kek, session_key.expose())?;
            grants.push(IdentityGrant { commitment, wrapped_session_key });
        }
        let owner_kek = derive_identity_kek(owner_identity_secret)?;
        let owner_wrapped_session_key = wrap_key(&owner_kek, session_key.expose())?;
        Ok(Self::Identity { grants, owner_wrapped_session_key })
    }

    pub fn password(
        session_key: &ContentKey,
        password: &[u8],
        memory_kib: u32,
        password_hint: Option<String>,
    ) -> Result<Self> {
        use rand_core::RngCore;
        let mut salt = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let kek = derive_password_key(password, &salt, memory_kib)?;
        let wrapped_session_key = wrap_key(&kek, session_key.expose())?;
        Ok(Self::Password { salt, memory_kib, wrapped_session_key, password_hint })
    }

    pub fn share_mode(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Identity { .. } => "identity",
            Self::Password { .. } => "password",
        }
    }

    /// Recovers the session key given whatever secret the caller holds.
    /// Every failure path, whether a wrong password, an unrecognized
    /// identity, or a mismatched mode, surfaces as the same
    /// [`Error::Unauthorized`] so a resolver never leaks which part of the
    /// attempt was wrong.
    pub fn unlock(&self, secret: &UnlockSecret) -> Result<ContentKey> {
        match (self, secret) {
            (Self::Open { session_key }, _) => Ok(ContentKey::from_bytes(*session_key)),
            (
                Self::Identity { owner_wrapped_session_key, .. },
                UnlockSecret::OwnerMasterSecret(owner_secret),
            ) => {
                let kek = derive_identity_kek(owner_secret)?;
                let key = unwrap_key(&kek, owner_wrapped_session_key)
                    .map_err(|_| Error::Unauthorized("owner secret did not unlock the session key".into()))?;
                Ok(ContentKey::from_bytes(key))
            }
            (
                Self::Identity { grants, .. },
                UnlockSecret::Identity { user_id, identity_secret },
            ) => {
                for grant in grants {
                    if identity::authenticate(user_id, identity_secret, &grant.commitment).is_ok() {
                        let kek = derive_identity_kek(identity_secret)?;
                        let key = unwrap_key(&kek, &grant.wrapped_session_key).map_err(|_| {
                            Error::Unauthorized("identity proof matched but unwrap failed".into())
                        })?;
                        return Ok(ContentKey::from_bytes(key));
                    }
                }
                Err(Error::Unauthorized("no authorized commitment matched this identity".into()))
            }
            (
                Self::Password { salt, memory_kib, wrapped_session_key, .. },
                UnlockSecret::Password(password),
            ) => {
                let kek = derive_password_key(password, salt, *memory_kib)?;
                let key = unwrap_key(&kek, wrapped_session_key)
                    .map_err(|_| Error::Unauthorized("password did not unlock the session key".into()))?;
                Ok(ContentKey::from_bytes(key))
            }
            _ => Err(Error::Unauthorized("unlock secret does not match this share's access mode".into())),
        }
    }
}

/// The short, case-insensitive, human-transcribable string a share is
/// handed out as. Bit-exact layout: `magic(1) || version(1) || share_id(16)
/// || index_prefix(4)`, base32-encoded without padding. Deliberately never
/// carries a session key, password, or the index article's own message_id
/// (only an integrity prefix of it) — a credential alone grants no more
/// than the ability to *locate* a share, not to bypass its access mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessCredential {
    pub share_id: [u8; 16],
    pub index_prefix: [u8; 4],
}

impl AccessCredential {
    pub fn new(share_id: [u8; 16], index_message_id: &str) -> Self {
        Self { share_id, index_prefix: sha256_prefix4(index_message_id) }
    }

    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(CREDENTIAL_LEN);
        bytes.push(CREDENTIAL_MAGIC);
        bytes.push(CREDENTIAL_VERSION);
        bytes.extend_from_slice(&self.share_id);
        bytes.extend_from_slice(&self.index_prefix);
        encode_base32(&bytes)
    }

    pub fn decode(credential: &str) -> Result<Self> {
        let bytes = decode_base32(credential.trim())
            .ok_or_else(|| Error::InvalidInput("access credential is not valid base32".into()))?;
        if bytes.len() != CREDENTIAL_LEN {
            return Err(Error::InvalidInput(format!(
                "access credential decodes to {} bytes, expected {CREDENTIAL_LEN}",
                bytes.len()
            )));
        }
        if bytes[0] != CREDENTIAL_MAGIC {
            return Err(Error::InvalidInput("access credential has the wrong magic byte".into()));
        }
        if bytes[1] != CREDENTIAL_VERSION {
            return Err(Error::InvalidInput(format!("unsupported access credential version {}", bytes[1])));
        }

        let mut share_id = [0u8; 16];
        share_id.copy_from_slice(&bytes[2..18]);
        let mut index_prefix = [0u8; 4];
        index_prefix.copy_from_slice(&bytes[18..22]);
        Ok(Self { share_id, index_prefix })
    }

    /// Hex form of `share_id`, the same encoding the catalog stores it
    /// under so resolving a credential never needs a lookup table.
    pub fn share_id_hex(&self) -> String {
        hex::encode(self.share_id)
    }

    pub fn verify_index_message_id(&self, index_message_id: &str) -> bool {
        sha256_prefix4(index_message_id) == self.index_prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_access_unlocks_with_any_secret() {
        let key = ContentKey::random();
        let block = AccessBlock::open(&key);
        let unlocked = block.unlock(&UnlockSecret::None).unwrap();
        assert_eq!(unlocked.expose(), key.expose());
    }

    #[test]
    fn identity_access_unlocks_for_authorized_user_and_owner() {
        let key = ContentKey::random();
        let owner_secret = [1u8; 32];
        let alice_secret = [2u8; 32];
        let block = AccessBlock::identity(&key, &owner_secret, &[("alice".into(), alice_secret)]).unwrap();

        let as_alice = block
            .unlock(&UnlockSecret::Identity { user_id: "alice".into(), identity_secret: alice_secret })
            .unwrap();
        assert_eq!(as_alice.expose(), key.expose());

        let as_owner = block.unlock(&UnlockSecret::OwnerMasterSecret(owner_secret)).unwrap();
        assert_eq!(as_owner.expose(), key.expose());
    }

    #[test]
    fn identity_access_rejects_unauthorized_user() {
        let key = ContentKey::random();
        let block = AccessBlock::identity(&key, &[1u8; 32], &[("alice".into(), [2u8; 32])]).unwrap();
        let result = block.unlock(&UnlockSecret::Identity { user_id: "mallory".into(), identity_secret: [9u8; 32] });
        assert!(result.is_err());
    }

    #[test]
    fn password_access_round_trips_and_rejects_wrong_password() {
        let key = ContentKey::random();
        let block = AccessBlock::password(&key, b"hunter2", 65536, None).unwrap();
        let unlocked = block.unlock(&UnlockSecret::Password(b"hunter2".to_vec())).unwrap();
        assert_eq!(unlocked.expose(), key.expose());
        assert!(block.unlock(&UnlockSecret::Password(b"wrong".to_vec())).is_err());
    }

    #[test]
    fn credential_round_trips_through_encode_decode() {
        let cred = AccessCredential::new([7u8; 16], "<abc@news.example>");
        let encoded = cred.encode();
        let decoded = AccessCredential::decode(&encoded).unwrap();
        assert_eq!(cred, decoded);
        assert!(decoded.verify_index_message_id("<abc@news.example>"));
        assert!(!decoded.verify_index_message_id("<other@news.example>"));
    }

    #[test]
    fn credential_decode_is_case_insensitive() {
        let cred = AccessCredential::new([3u8; 16], "<x@news>");
        let encoded = cred.encode();
        assert_eq!(AccessCredential::decode(&encoded.to_lowercase()).unwrap(), cred);
    }

    #[test]
    fn credential_decode_rejects_garbage() {
        assert!(AccessCredential::decode("not-a-credential").is_err());
        assert!(AccessCredential::decode(&encode_base32(&[0u8; 5])).is_err());
    }
}
