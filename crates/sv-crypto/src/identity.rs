//! Identity-gated share access.
//!
//! Every authorized user holds a long-lived `identity_secret` established
//! when their [`sv_core::UserId`] was created (analogous to the teacher's
//! per-user signer secret). The owner, who learns a collaborator's
//! `identity_secret` out of band when granting access, publishes one
//! [`IdentityCommitment`] per authorized user inside the share's identity
//! access block. A downloader proves membership by recomputing the same
//! keyed hash locally and never transmits `user_id` or `identity_secret`
//! anywhere the network can observe — resolution happens entirely against
//! the index bytes already fetched.
//!
//! This is a simplification of a general zero-knowledge proof system: no ZK
//! crate exists in the retrieval pack, so the "proof" is a keyed hash
//! compared in constant time, which gives the properties that matter here
//! (no identity disclosure, constant-time verification) without a full ZK
//! construction. Recorded as a deliberate simplification in `DESIGN.md`.

use subtle::ConstantTimeEq;

use sv_core::{Error, Result};

/// Published per-authorized-user record inside an identity share's access
/// block. `user_hash` lets a holder locate their own slot; `verification_tag`
/// lets them prove membership without ever disclosing `user_id`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct IdentityCommitment {
    pub salt: [u8; 16],
    pub user_hash: [u8; 32],
    pub verification_tag: [u8; 32],
}

fn keyed(salt: &[u8; 16], label: &[u8], data: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(salt);
    key[16..].copy_from_slice(salt);
    let mut hasher = blake3::Hasher::new_keyed(&key);
    hasher.update(label);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Builds the commitment the owner publishes when authorizing `user_id` for
/// a folder. `identity_secret` must have been shared with the owner out of
/// band; it is never stored in the commitment.
pub fn commit_user(user_id: &str, identity_secret: &[u8; 32]) -> Result<IdentityCommitment> {
    let mut salt = [0u8; 16];
    use rand_core::RngCore;
    rand::rngs::OsRng.fill_bytes(&mut salt);

    Ok(IdentityCommitment {
        salt,
        user_hash: keyed(&salt, b"sharevault/identity-user/v1", user_id.as_bytes()),
        verification_tag: keyed(&salt, b"sharevault/identity-proof/v1", identity_secret),
    })
}

/// Recomputes the membership proof for `user_id` against one published
/// commitment. Returns `None` when `user_id` does not match this slot at
/// all (the caller should try the next commitment), and `Some(proof)`
/// otherwise so the caller can hand it to [`verify_identity`].
pub fn prove_identity(
    user_id: &str,
    identity_secret: &[u8; 32],
    commitment: &IdentityCommitment,
) -> Option<[u8; 32]> {
    let expected_user_hash = keyed(&commitment.salt, b"sharevault/identity-user/v1", user_id.as_bytes());
    if expected_user_hash.ct_eq(&commitment.user_hash).unwrap_u8() != 1 {
        return None;
    }
    Some(keyed(&commitment.salt, b"sharevault/identity-proof/v1", identity_secret))
}

/// Verifies a proof produced by [`prove_identity`] against the published
/// commitment, in constant time regardless of where the mismatch is (no
/// early return on the first differing byte).
pub fn verify_identity(proof: &[u8; 32], commitment: &IdentityCommitment) -> bool {
    proof.ct_eq(&commitment.verification_tag).unwrap_u8() == 1
}

/// Convenience wrapper combining [`prove_identity`] and [`verify_identity`]
/// for the common "do I hold this identity" check, returning the single
/// opaque [`Error::Unauthorized`] the resolver surfaces on failure: crypto
/// and identity failures never distinguish their cause.
pub fn authenticate(user_id: &str, identity_secret: &[u8; 32], commitment: &IdentityCommitment) -> Result<()> {
    match prove_identity(user_id, identity_secret, commitment) {
        Some(proof) if verify_identity(&proof, commitment) => Ok(()),
        _ => Err(Error::Unauthorized("identity proof did not match any authorized commitment".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorized_user_authenticates() {
        let secret = [7u8; 32];
        let commitment = commit_user("user-1", &secret).unwrap();
        assert!(authenticate("user-1", &secret, &commitment).is_ok());
    }

    #[test]
    fn wrong_user_id_is_rejected() {
        let secret = [7u8; 32];
        let commitment = commit_user("user-1", &secret).unwrap();
        assert!(authenticate("user-2", &secret, &commitment).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let secret = [7u8; 32];
        let other_secret = [9u8; 32];
        let commitment = commit_user("user-1", &secret).unwrap();
        assert!(authenticate("user-1", &other_secret, &commitment).is_err());
    }

    #[test]
    fn commitment_never_stores_user_id_or_secret_in_clear() {
        let secret = [1u8; 32];
        let commitment = commit_user("alice", &secret).unwrap();
        assert_ne!(&commitment.user_hash[..], "alice".as_bytes());
        assert_ne!(&commitment.verification_tag[..], &secret[..]);
    }
}
