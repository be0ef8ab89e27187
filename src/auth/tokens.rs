//! Single-use opaque tokens for password reset and email verification.
//!
//! The plaintext goes to the user out of band; only its SHA-256 digest is
//! stored, next to an expiry.
use rand::RngCore;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);
pub const VERIFICATION_TOKEN_TTL: Duration = Duration::hours(24);

const TOKEN_BYTES: usize = 20;

/// A freshly minted token: `plaintext` for delivery, `digest` for storage.
#[derive(Debug, Clone)]
pub struct OneTimeToken {
    pub plaintext: String,
    pub digest: String,
    pub expires: OffsetDateTime,
}

impl OneTimeToken {
    pub fn generate(now: OffsetDateTime, ttl: Duration) -> Self {
        let mut buf = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut buf);
        let plaintext = hex::encode(buf);
        let digest = digest(&plaintext);
        Self {
            plaintext,
            digest,
            expires: now + ttl,
        }
    }
}

pub fn digest(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_plaintext_and_not_itself() {
        let now = OffsetDateTime::now_utc();
        let token = OneTimeToken::generate(now, RESET_TOKEN_TTL);
        assert_eq!(token.plaintext.len(), TOKEN_BYTES * 2);
        assert_eq!(digest(&token.plaintext), token.digest);
        assert_ne!(token.plaintext, token.digest);
        assert_eq!(token.expires, now + Duration::minutes(10));
    }

    #[test]
    fn tokens_are_random() {
        let now = OffsetDateTime::now_utc();
        let a = OneTimeToken::generate(now, VERIFICATION_TOKEN_TTL);
        let b = OneTimeToken::generate(now, VERIFICATION_TOKEN_TTL);
        assert_ne!(a.plaintext, b.plaintext);
    }
}
