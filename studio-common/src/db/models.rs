//! Database models
//!
//! Plain row structs. Enumerated columns (role, status, decision, charge
//! type) stay as their stored text here; services parse them into typed
//! enums where the rules live.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub available_sessions: i64,
    pub specialties: Option<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Package {
    pub id: i64,
    pub name: String,
    pub session_count: i64,
    pub price_per_session_cents: i64,
    pub is_special: bool,
}

/// A client's package grant joined with the package it refers to
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivePackage {
    pub client_package_id: i64,
    pub package_id: i64,
    pub name: String,
    pub session_count: i64,
    pub price_per_session_cents: i64,
    pub is_special: bool,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRecord {
    pub id: i64,
    pub session_date: DateTime<Utc>,
    pub duration: i64,
    pub client_id: Option<i64>,
    pub trainer_id: Option<i64>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub credit_deducted: bool,
    pub credit_restored: bool,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<i64>,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub silent_cancellation: bool,
    pub cancellation_decision: Option<String>,
    pub cancellation_reviewed_by: Option<i64>,
    pub cancellation_reviewed_at: Option<DateTime<Utc>>,
    pub cancellation_review_reason: Option<String>,
    pub cancellation_charge_type: Option<String>,
    pub cancellation_charge_cents: Option<i64>,
    pub cancellation_charged_at: Option<DateTime<Utc>>,
}

/// Column list matching [`SessionRecord`], for `SELECT` statements
pub const SESSION_COLUMNS: &str = "id, session_date, duration, client_id, trainer_id, location, \
     notes, status, credit_deducted, credit_restored, cancellation_reason, cancelled_by, \
     cancellation_date, silent_cancellation, cancellation_decision, cancellation_reviewed_by, \
     cancellation_reviewed_at, cancellation_review_reason, cancellation_charge_type, \
     cancellation_charge_cents, cancellation_charged_at";
