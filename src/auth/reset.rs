use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::Duration;

/// Window during which a pending reset token can be consumed.
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);

/// Generates a one-time reset secret: the hex plaintext goes out by email,
/// only the digest is stored. Lookup needs a deterministic hash, so this is
/// sha-256 rather than the salted password hash.
pub fn generate_reset_token() -> (String, String) {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = hex::encode(bytes);
    let digest = hash_reset_token(&plaintext);
    (plaintext, digest)
}

pub fn hash_reset_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_is_256_bits_of_hex() {
        let (plaintext, _) = generate_reset_token();
        assert_eq!(plaintext.len(), 64);
        assert!(plaintext.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_is_deterministic_and_differs_from_plaintext() {
        let (plaintext, digest) = generate_reset_token();
        assert_eq!(digest, hash_reset_token(&plaintext));
        assert_ne!(digest, plaintext);
    }

    #[test]
    fn successive_tokens_are_distinct() {
        let (a, _) = generate_reset_token();
        let (b, _) = generate_reset_token();
        assert_ne!(a, b);
    }

    #[test]
    fn known_digest_value() {
        // sha-256 of the ASCII string "abc"
        assert_eq!(
            hash_reset_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
