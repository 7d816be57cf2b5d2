//! Password hashing, player id and token minting.
//!
//! Passwords are stored as self describing argon2 strings with a fresh salt
//! per record. Client tokens are 32 random bytes handed out as lowercase
//! hex; only a SHA-256 digest of the raw bytes is ever at rest, so a stolen
//! store cannot be replayed against the server.

use argon2::password_hash::rand_core::OsRng as SaltRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Raw length of a client token before hex encoding.
const TOKEN_BYTES: usize = 32;

/// Argon2id with 64 MiB of memory, one pass, two lanes.
fn kdf() -> Argon2<'static> {
    let params = Params::new(65536, 1, 2, None).unwrap_or_default();
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Hashes a password with a fresh random salt. The result embeds algorithm,
/// parameters and salt and is the only password form the store sees.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut SaltRng);
    Ok(kdf().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Verifies a password against a stored hash. The comparison itself is
/// constant time; any parse failure counts as a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|hash| kdf().verify_password(password.as_bytes(), &hash).is_ok())
        .unwrap_or(false)
}

/// A fresh lowercase UUIDv4 for a new user.
pub fn new_player_id() -> String {
    Uuid::new_v4().to_string()
}

/// The token handed to a client on login.
pub fn new_client_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// The digest of a client token as stored at rest. A token that is not
/// valid hex digests to a constant that matches no stored entry.
pub fn server_token_digest(client_token_hex: &str) -> String {
    let raw = hex::decode(client_token_hex).unwrap_or_default();
    hex::encode(Sha256::digest(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "not-a-hash"));
    }

    #[test]
    fn fresh_salts_give_distinct_hashes() {
        let first = hash_password("same").unwrap();
        let second = hash_password("same").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn client_tokens_are_lowercase_hex() {
        let token = new_client_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(token, new_client_token());
    }

    #[test]
    fn token_digest_matches_its_token_and_no_other() {
        let token = new_client_token();
        let digest = server_token_digest(&token);
        assert_eq!(digest, server_token_digest(&token));
        assert_ne!(digest, server_token_digest(&new_client_token()));
        // digest output is itself hex and never the raw token
        assert_eq!(digest.len(), 64);
        assert_ne!(digest, token);
    }

    #[test]
    fn player_ids_are_lowercase_uuids() {
        let id = new_player_id();
        assert_eq!(id.len(), 36);
        assert_eq!(id, id.to_lowercase());
        assert_ne!(id, new_player_id());
    }
}
