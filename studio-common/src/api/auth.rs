//! API authentication via timestamp and hash validation
//!
//! # Scheme
//!
//! - Every request names its caller (user id) and carries a timestamp
//!   (i64 Unix epoch ms) and a SHA-256 hash
//! - Timestamp must be within ≤1000ms past and ≤1ms future
//! - Hash is calculated from canonical JSON of `{hash, timestamp, userId}`
//!   followed by the shared secret
//! - Shared secret is stored in the settings table
//! - Hash checking can be disabled by setting shared_secret = 0
//!
//! This module contains ONLY pure functions and database operations.
//! No HTTP framework dependencies; the axum middleware lives in the service.

use crate::db::settings::API_SHARED_SECRET;
use crate::time::now_millis;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

/// Placeholder written into the `hash` field before hashing
const DUMMY_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Maximum age of a request timestamp
const MAX_PAST_MS: i64 = 1000;

/// Maximum clock drift into the future
const MAX_FUTURE_MS: i64 = 1;

// ========================================
// Error Types
// ========================================

/// Authentication error types
#[derive(Debug, Clone)]
pub enum ApiAuthError {
    /// Timestamp outside acceptable window
    InvalidTimestamp {
        timestamp: i64,
        now: i64,
        reason: String,
    },

    /// Hash does not match calculated value
    InvalidHash { provided: String, calculated: String },

    /// Database error loading shared secret
    DatabaseError(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::InvalidTimestamp { reason, .. } => {
                write!(f, "Invalid timestamp: {}", reason)
            }
            ApiAuthError::InvalidHash { .. } => write!(f, "Invalid hash"),
            ApiAuthError::DatabaseError(err) => write!(f, "Database error: {}", err),
        }
    }
}

impl std::error::Error for ApiAuthError {}

// ========================================
// Shared Secret Management
// ========================================

/// Load shared secret from database settings
///
/// Generates and stores a new secret when none exists yet.
/// Special value 0 disables hash checking.
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    let result: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(API_SHARED_SECRET)
        .fetch_optional(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match result {
        Some((value,)) => value
            .trim()
            .parse::<i64>()
            .map_err(|e| ApiAuthError::DatabaseError(format!("Invalid i64: {}", e))),
        None => initialize_shared_secret(db).await,
    }
}

/// Generate a random non-zero secret and store it
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let secret: i64 = loop {
        let val = rng.gen::<i64>();
        if val != 0 {
            break val;
        }
    };

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(API_SHARED_SECRET)
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    Ok(secret)
}

// ========================================
// Timestamp Validation
// ========================================

/// Validate a request timestamp against the current clock
///
/// The window is asymmetric: past tolerance covers transit and processing
/// delay, future tolerance covers clock drift only.
///
/// # Examples
///
/// ```
/// use studio_common::api::auth::validate_timestamp;
/// use studio_common::time::now_millis;
///
/// assert!(validate_timestamp(now_millis()).is_ok());
/// assert!(validate_timestamp(now_millis() - 5000).is_err());
/// ```
pub fn validate_timestamp(timestamp: i64) -> Result<(), ApiAuthError> {
    validate_timestamp_at(timestamp, now_millis())
}

fn validate_timestamp_at(timestamp: i64, now: i64) -> Result<(), ApiAuthError> {
    let diff = now - timestamp;

    if diff > MAX_PAST_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {}ms too old (max {}ms past)", diff, MAX_PAST_MS),
        });
    }

    if diff < -MAX_FUTURE_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!(
                "Timestamp {}ms in future (max {}ms future)",
                diff.abs(),
                MAX_FUTURE_MS
            ),
        });
    }

    Ok(())
}

// ========================================
// Hash Calculation and Validation
// ========================================

/// JSON document a request signature is computed over
pub fn identity_payload(user_id: i64, timestamp: i64) -> Value {
    json!({
        "hash": DUMMY_HASH,
        "timestamp": timestamp,
        "userId": user_id,
    })
}

/// Signature a client sends in the hash header
pub fn sign_request(user_id: i64, timestamp: i64, shared_secret: i64) -> String {
    calculate_hash(&identity_payload(user_id, timestamp), shared_secret)
}

/// Calculate hash of a JSON document
///
/// 1. Replace hash field with dummy hash (64 zeros)
/// 2. Convert to canonical JSON (sorted keys, no whitespace)
/// 3. Append shared secret as decimal i64 string
/// 4. Return SHA-256 as 64 hex characters
pub fn calculate_hash(json_value: &Value, shared_secret: i64) -> String {
    let mut value = json_value.clone();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(DUMMY_HASH.to_string()));
    }

    let canonical = to_canonical_json(&value);
    let to_hash = format!("{}{}", canonical, shared_secret);

    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Convert JSON to canonical form (sorted keys, no whitespace)
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("\"{}\":{}", k, to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

/// Validate the hash a caller provided for `user_id` at `timestamp`
pub fn validate_request_hash(
    provided_hash: &str,
    user_id: i64,
    timestamp: i64,
    shared_secret: i64,
) -> Result<(), ApiAuthError> {
    let calculated = sign_request(user_id, timestamp, shared_secret);

    if !provided_hash.eq_ignore_ascii_case(&calculated) {
        return Err(ApiAuthError::InvalidHash {
            provided: provided_hash.to_string(),
            calculated,
        });
    }

    Ok(())
}

// ========================================
// Tests
// ========================================
