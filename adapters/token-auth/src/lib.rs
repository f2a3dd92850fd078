//! token-auth — password hashing and signed access tokens for the credential service.
//!
//! Purpose
//! - `Pbkdf2Hasher`: salted PBKDF2-HMAC-SHA256 password hashes, stored as
//!   `pbkdf2-sha256$<iterations>$<salt>$<hash>` (unpadded base64).
//! - `Hs256Tokens`: HS256 JWTs carrying `sub`, `email`, `iat` and `exp`.
//! - `parse_ttl`: token lifetimes written as `7d`, `12h`, `30m`, `45s` or
//!   bare seconds.
//!
//! Notes
//! - Verification reads the iteration count from the stored hash, so raising
//!   the configured cost does not invalidate existing accounts.
//! - Token validation uses no clock leeway.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use domain::credentials::{PasswordHasher, TokenClaims, TokenIssuer};
use domain::CoreError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;

pub const DEFAULT_ITERATIONS: u32 = 600_000;
/// Upper bound on the cost accepted from configuration or a stored hash.
pub const MAX_ITERATIONS: u32 = 16 * DEFAULT_ITERATIONS;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const MAX_HASH_LEN: usize = 64;

pub struct Pbkdf2Hasher {
    iterations: u32,
}

impl Pbkdf2Hasher {
    /// The cost is clamped to `1..=MAX_ITERATIONS`.
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.clamp(1, MAX_ITERATIONS),
        }
    }
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32, out: &mut [u8]) {
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, out);
}

struct StoredHash {
    iterations: u32,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

impl StoredHash {
    fn parse(encoded: &str) -> Option<Self> {
        let mut parts = encoded.split('$');
        if parts.next()? != SCHEME {
            return None;
        }
        let iterations: u32 = parts.next()?.parse().ok()?;
        let salt = STANDARD_NO_PAD.decode(parts.next()?).ok()?;
        let hash = STANDARD_NO_PAD.decode(parts.next()?).ok()?;
        if parts.next().is_some() || iterations == 0 || iterations > MAX_ITERATIONS {
            return None;
        }
        if hash.is_empty() || hash.len() > MAX_HASH_LEN {
            return None;
        }
        Some(Self {
            iterations,
            salt,
            hash,
        })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl PasswordHasher for Pbkdf2Hasher {
    fn hash(&self, password: &str) -> Result<String, CoreError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut digest = [0u8; HASH_LEN];
        derive(password, &salt, self.iterations, &mut digest);
        Ok(format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(digest)
        ))
    }

    fn verify(&self, password: &str, encoded: &str) -> bool {
        let Some(stored) = StoredHash::parse(encoded) else {
            return false;
        };
        let mut digest = vec![0u8; stored.hash.len()];
        derive(password, &stored.salt, stored.iterations, &mut digest);
        constant_time_eq(&digest, &stored.hash)
    }
}

/// HS256 token issuer keyed by a shared secret.
pub struct Hs256Tokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Hs256Tokens {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl TokenIssuer for Hs256Tokens {
    fn issue(&self, subject: &str, email: &str) -> Result<String, CoreError> {
        let iat = now_secs();
        let claims = TokenClaims {
            sub: subject.to_string(),
            email: email.to_string(),
            iat,
            exp: iat.saturating_add(self.ttl.as_secs()),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| CoreError::Token(e.to_string()))
    }

    fn verify(&self, token: &str) -> Option<TokenClaims> {
        match decode::<TokenClaims>(token, &self.decoding, &Self::validation()) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!(error = %e, "token rejected");
                None
            }
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TtlError {
    #[error("duration is empty")]
    Empty,
    #[error("invalid duration: {0}")]
    Invalid(String),
}

/// Parse a token lifetime such as `7d`, `12h`, `30m`, `45s` or `3600`.
pub fn parse_ttl(raw: &str) -> Result<Duration, TtlError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(TtlError::Empty);
    }
    let (digits, unit) = match raw.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&raw[..i], c.to_ascii_lowercase()),
        _ => (raw, 's'),
    };
    let scale: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        _ => return Err(TtlError::Invalid(raw.to_string())),
    };
    let count: u64 = digits
        .parse()
        .map_err(|_| TtlError::Invalid(raw.to_string()))?;
    match count.checked_mul(scale) {
        Some(0) | None => Err(TtlError::Invalid(raw.to_string())),
        Some(secs) => Ok(Duration::from_secs(secs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> Pbkdf2Hasher {
        Pbkdf2Hasher::new(1_000)
    }

    #[test]
    fn hash_then_verify() {
        let hasher = fast_hasher();
        let encoded = hasher.hash("correct horse").unwrap();
        assert!(encoded.starts_with("pbkdf2-sha256$1000$"));
        assert!(hasher.verify("correct horse", &encoded));
        assert!(!hasher.verify("wrong horse", &encoded));
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = fast_hasher();
        let a = hasher.hash("same").unwrap();
        let b = hasher.hash("same").unwrap();
        assert_ne!(a, b);
        assert!(hasher.verify("same", &a) && hasher.verify("same", &b));
    }

    #[test]
    fn verify_uses_stored_iterations() {
        let old = Pbkdf2Hasher::new(500).hash("pw").unwrap();
        assert!(fast_hasher().verify("pw", &old));
    }

    #[test]
    fn malformed_hashes_never_verify() {
        let hasher = fast_hasher();
        for bad in [
            "",
            "plain",
            "bcrypt$10$abc$def",
            "pbkdf2-sha256$x$AAAA$AAAA",
            "pbkdf2-sha256$0$AAAA$AAAA",
            "pbkdf2-sha256$10$AAAA",
            "pbkdf2-sha256$10$AAAA$AAAA$extra",
            "pbkdf2-sha256$10$!!$AAAA",
        ] {
            assert!(!hasher.verify("pw", bad), "{bad:?} verified");
        }
    }

    #[test]
    fn oversized_iteration_counts_are_refused() {
        let hasher = fast_hasher();
        let encoded = hasher.hash("pw").unwrap();
        let salt_and_hash = encoded.splitn(3, '$').nth(2).unwrap();

        // A tampered cost is refused before any derivation runs.
        let inflated = format!("pbkdf2-sha256${}${}", u32::MAX, salt_and_hash);
        assert!(!hasher.verify("pw", &inflated));
        let just_over = format!("pbkdf2-sha256${}${}", MAX_ITERATIONS + 1, salt_and_hash);
        assert!(StoredHash::parse(&just_over).is_none());
        let at_cap = format!("pbkdf2-sha256${}${}", MAX_ITERATIONS, salt_and_hash);
        assert!(StoredHash::parse(&at_cap).is_some());

        assert_eq!(Pbkdf2Hasher::new(u32::MAX).iterations, MAX_ITERATIONS);
        assert_eq!(Pbkdf2Hasher::new(0).iterations, 1);
    }

    #[test]
    fn issued_token_verifies() {
        let tokens = Hs256Tokens::new(b"secret", Duration::from_secs(3600));
        let token = tokens.issue("user-1", "a@b.c").unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "a@b.c");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn wrong_secret_and_garbage_are_rejected() {
        let tokens = Hs256Tokens::new(b"secret", Duration::from_secs(3600));
        let other = Hs256Tokens::new(b"other", Duration::from_secs(3600));
        let token = other.issue("user-1", "a@b.c").unwrap();
        assert_eq!(tokens.verify(&token), None);
        assert_eq!(tokens.verify("not-a-token"), None);
        assert_eq!(tokens.verify(""), None);
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = Hs256Tokens::new(b"secret", Duration::from_secs(3600));
        let now = now_secs();
        let claims = TokenClaims {
            sub: "user-1".into(),
            email: "a@b.c".into(),
            iat: now - 120,
            exp: now - 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert_eq!(tokens.verify(&token), None);
    }

    #[test]
    fn parse_ttl_units() {
        assert_eq!(parse_ttl("7d"), Ok(Duration::from_secs(7 * 86_400)));
        assert_eq!(parse_ttl("12h"), Ok(Duration::from_secs(12 * 3_600)));
        assert_eq!(parse_ttl("30m"), Ok(Duration::from_secs(1_800)));
        assert_eq!(parse_ttl("45s"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_ttl(" 3600 "), Ok(Duration::from_secs(3_600)));
        assert_eq!(parse_ttl("2H"), Ok(Duration::from_secs(7_200)));
    }

    #[test]
    fn parse_ttl_rejects_bad_input() {
        assert_eq!(parse_ttl(""), Err(TtlError::Empty));
        assert!(matches!(parse_ttl("0"), Err(TtlError::Invalid(_))));
        assert!(matches!(parse_ttl("7w"), Err(TtlError::Invalid(_))));
        assert!(matches!(parse_ttl("d"), Err(TtlError::Invalid(_))));
        assert!(matches!(parse_ttl("-5m"), Err(TtlError::Invalid(_))));
        assert!(matches!(
            parse_ttl("99999999999999999999d"),
            Err(TtlError::Invalid(_))
        ));
    }
}
