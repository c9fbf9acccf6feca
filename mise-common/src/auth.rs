//! Password hashing and signed access tokens
//!
//! # Passwords
//!
//! PBKDF2-HMAC-SHA256 with a random 16-byte salt. The stored form carries its
//! own parameters so the round count can change without invalidating old hashes:
//!
//! ```text
//! pbkdf2-sha256$<rounds>$<salt, base64>$<hash, base64>
//! ```
//!
//! # Access tokens
//!
//! HS256 tokens in the usual `header.payload.signature` layout, each part
//! base64url without padding. Claims are `sub` (user id), `iat` and `exp`
//! (Unix seconds).
//!
//! # Signing secret
//!
//! Comes from configuration, or is generated once and kept in the `settings`
//! table so tokens survive restarts.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Identifier prefix of stored password hashes
const HASH_SCHEME: &str = "pbkdf2-sha256";

/// Default PBKDF2 round count for new hashes
pub const DEFAULT_HASH_ROUNDS: u32 = 100_000;

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Settings key holding the generated token secret
const TOKEN_SECRET_KEY: &str = "token_secret";

// ========================================
// Passwords
// ========================================

/// Hash a password with the default round count
pub fn hash_password(password: &str) -> String {
    hash_password_with_rounds(password, DEFAULT_HASH_ROUNDS)
}

/// Hash a password with an explicit round count
pub fn hash_password_with_rounds(password: &str, rounds: u32) -> String {
    let rounds = rounds.max(1);
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut hash = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, rounds, &mut hash);

    format!(
        "{}${}${}${}",
        HASH_SCHEME,
        rounds,
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    )
}

/// Check a password against a stored hash
///
/// Malformed stored hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    let [scheme, rounds, salt, hash] = parts.as_slice() else {
        return false;
    };
    if *scheme != HASH_SCHEME {
        return false;
    }
    let Ok(rounds) = rounds.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (STANDARD_NO_PAD.decode(salt), STANDARD_NO_PAD.decode(hash))
    else {
        return false;
    };
    if rounds == 0 || expected.is_empty() {
        return false;
    }

    let mut computed = vec![0u8; expected.len()];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, rounds, &mut computed);
    constant_time_eq(&computed, &expected)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ========================================
// Access tokens
// ========================================

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Issued at, Unix seconds
    pub iat: i64,
    /// Expiry, Unix seconds
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// Issues and verifies HS256 access tokens
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl_minutes", &self.ttl.num_minutes())
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl_minutes: i64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Token lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `subject` valid from now
    pub fn issue(&self, subject: &str) -> Result<String> {
        self.issue_at(subject, Utc::now())
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_at(&self, subject: &str, now: DateTime<Utc>) -> Result<String> {
        let header = TokenHeader {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        let header_part = encode_part(&header)?;
        let payload_part = encode_part(&claims)?;
        let signing_input = format!("{}.{}", header_part, payload_part);
        let mac = self.mac(signing_input.as_bytes())?;
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Verify signature and expiry, returning the claims
    pub fn verify(&self, token: &str) -> Result<Claims> {
        self.verify_at(token, Utc::now())
    }

    /// Verify as if the current time were `now`
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let parts: Vec<&str> = token.split('.').collect();
        let [header_part, payload_part, signature_part] = parts.as_slice() else {
            return Err(Error::Auth("Malformed token".to_string()));
        };

        let header: TokenHeader = decode_part(header_part)?;
        if header.alg != "HS256" {
            return Err(Error::Auth(format!("Unsupported token algorithm: {}", header.alg)));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_part)
            .map_err(|_| Error::Auth("Malformed token signature".to_string()))?;
        let signing_input = format!("{}.{}", header_part, payload_part);
        self.mac(signing_input.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| Error::Auth("Invalid token signature".to_string()))?;

        let claims: Claims = decode_part(payload_part)?;
        if claims.exp <= now.timestamp() {
            return Err(Error::Auth("Token expired".to_string()));
        }
        if claims.sub.is_empty() {
            return Err(Error::Auth("Token has no subject".to_string()));
        }

        Ok(claims)
    }

    fn mac(&self, input: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::Internal(format!("Invalid token secret: {}", e)))?;
        mac.update(input);
        Ok(mac)
    }
}

fn encode_part<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize token part: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn decode_part<T: for<'de> Deserialize<'de>>(part: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| Error::Auth("Malformed token encoding".to_string()))?;
    serde_json::from_slice(&bytes).map_err(|_| Error::Auth("Malformed token contents".to_string()))
}

// ========================================
// Signing secret management
// ========================================

/// Use the configured secret, or load/generate the persisted one
pub async fn resolve_token_secret(db: &SqlitePool, configured: Option<&str>) -> Result<String> {
    match configured {
        Some(secret) if !secret.trim().is_empty() => {
            info!("Token secret loaded from configuration");
            Ok(secret.to_string())
        }
        Some(_) => {
            warn!("Configured token secret is blank, falling back to stored secret");
            load_token_secret(db).await
        }
        None => load_token_secret(db).await,
    }
}

/// Load the stored token secret, generating it on first use
pub async fn load_token_secret(db: &SqlitePool) -> Result<String> {
    let existing: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(TOKEN_SECRET_KEY)
            .fetch_optional(db)
            .await?;

    if let Some(secret) = existing {
        return Ok(secret);
    }

    initialize_token_secret(db).await
}

/// Generate a random 32-byte secret and store it unless one already exists
pub async fn initialize_token_secret(db: &SqlitePool) -> Result<String> {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let secret = URL_SAFE_NO_PAD.encode(bytes);

    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(TOKEN_SECRET_KEY)
        .bind(&secret)
        .execute(db)
        .await?;

    // Another process may have won the insert race
    let stored: String = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(TOKEN_SECRET_KEY)
        .fetch_one(db)
        .await?;

    info!("Generated new token secret");
    Ok(stored)
}
