use rand::{rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};

/// Well-known code used when the development switch is on.
pub const DEV_CODE: &str = "123456";

/// Six decimal digits, leading zeros kept.
pub fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}

/// Constant-time comparison of `code` against a stored hash.
pub fn code_matches(stored_hash: &str, code: &str) -> bool {
    hash_code(code)
        .as_bytes()
        .ct_eq(stored_hash.as_bytes())
        .into()
}

/// A pending one-time code. Only the hash of the code is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub email: String,
    pub code_hash: String,
    pub expires_at: OffsetDateTime,
    pub last_sent_at: OffsetDateTime,
}

impl Challenge {
    pub fn issue(email: &str, code: &str, now: OffsetDateTime, ttl: Duration) -> Self {
        Self {
            email: email.to_string(),
            code_hash: hash_code(code),
            expires_at: now + ttl,
            last_sent_at: now,
        }
    }

    /// Seconds left before another code may be sent, if any.
    pub fn resend_wait(&self, now: OffsetDateTime, interval: Duration) -> Option<i64> {
        let ready_at = self.last_sent_at + interval;
        (now < ready_at).then(|| (ready_at - now).whole_seconds().max(1))
    }

    pub fn accepts(&self, email: &str, code: &str, now: OffsetDateTime) -> bool {
        // evaluate the hash even on an email mismatch
        let code_ok = code_matches(&self.code_hash, code);
        self.email == email && now <= self.expires_at && code_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> OffsetDateTime {
        time::macros::datetime!(2025-09-02 12:00 UTC)
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn hash_ignores_surrounding_whitespace() {
        assert_eq!(hash_code(" 012345\n"), hash_code("012345"));
        assert!(code_matches(&hash_code("012345"), "012345"));
        assert!(!code_matches(&hash_code("012345"), "12345"));
    }

    #[test]
    fn challenge_expires_after_ttl() {
        let c = Challenge::issue("a@example.com", "000042", t0(), Duration::minutes(15));
        assert!(c.accepts("a@example.com", "000042", t0() + Duration::minutes(15)));
        assert!(!c.accepts("a@example.com", "000042", t0() + Duration::minutes(15) + Duration::seconds(1)));
    }

    #[test]
    fn challenge_is_bound_to_its_email() {
        let c = Challenge::issue("a@example.com", "000042", t0(), Duration::minutes(15));
        assert!(!c.accepts("b@example.com", "000042", t0()));
        assert!(!c.accepts("a@example.com", "000043", t0()));
    }

    #[test]
    fn resend_wait_counts_down() {
        let c = Challenge::issue("a@example.com", "1", t0(), Duration::minutes(15));
        let interval = Duration::seconds(60);
        assert_eq!(c.resend_wait(t0() + Duration::seconds(15), interval), Some(45));
        assert_eq!(c.resend_wait(t0() + Duration::seconds(60), interval), None);
    }
}
