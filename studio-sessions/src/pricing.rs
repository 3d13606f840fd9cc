//! Dynamic pricing resolver
//!
//! Cancellation fees come from the client's active package. When the client
//! has no active package the fee falls back to duration-based rates read from
//! the settings table; nothing here carries a built-in price. Quotes are
//! computed per request and never cached.

use serde::Serialize;
use sqlx::SqlitePool;
use studio_common::db::settings::{
    get_setting_i64, LATE_FEE_PERCENT, PRICING_SHORT_RATE_CENTS, PRICING_STANDARD_MIN_DURATION,
    PRICING_STANDARD_RATE_CENTS,
};
use studio_common::db::ActivePackage;
use studio_common::{Error, Result};

use crate::db;
use crate::session::ChargeType;

/// Upper bound on any per-session price or charge entered through the API
pub const MAX_PRICE_CENTS: i64 = 10_000_000;

/// Pricing knobs loaded from settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    pub standard_rate_cents: i64,
    pub short_rate_cents: i64,
    pub standard_min_duration: i64,
    pub late_fee_percent: i64,
}

impl PricingPolicy {
    /// Load the policy; missing keys fall back to the seeded defaults
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let policy = PricingPolicy {
            standard_rate_cents: get_setting_i64(pool, PRICING_STANDARD_RATE_CENTS, 17500).await?,
            short_rate_cents: get_setting_i64(pool, PRICING_SHORT_RATE_CENTS, 10000).await?,
            standard_min_duration: get_setting_i64(pool, PRICING_STANDARD_MIN_DURATION, 60).await?,
            late_fee_percent: get_setting_i64(pool, LATE_FEE_PERCENT, 50).await?,
        };
        policy.validate()?;
        Ok(policy)
    }

    fn validate(&self) -> Result<()> {
        for rate in [self.standard_rate_cents, self.short_rate_cents] {
            if !(0..=MAX_PRICE_CENTS).contains(&rate) {
                return Err(Error::Config(format!(
                    "Fallback rates must be within 0..={}, got {}",
                    MAX_PRICE_CENTS, rate
                )));
            }
        }
        if !(0..=100).contains(&self.late_fee_percent) {
            return Err(Error::Config(format!(
                "late_fee_percent must be within 0..=100, got {}",
                self.late_fee_percent
            )));
        }
        Ok(())
    }

    /// Rate used when no package applies
    pub fn fallback_rate(&self, duration_minutes: i64) -> i64 {
        if duration_minutes >= self.standard_min_duration {
            self.standard_rate_cents
        } else {
            self.short_rate_cents
        }
    }

    /// Late fee for a session rate, rounded half-up to the cent
    pub fn late_fee(&self, rate_cents: i64) -> Result<i64> {
        rate_cents
            .checked_mul(self.late_fee_percent)
            .and_then(|v| v.checked_add(50))
            .map(|v| v / 100)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Session rate {} cents is too large to price",
                    rate_cents
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Package,
    Fallback,
}

/// Per-session price for one client
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingQuote {
    pub client_id: Option<i64>,
    pub package_id: Option<i64>,
    pub package_name: Option<String>,
    /// Package price; None when the fallback applies
    pub price_per_session_cents: Option<i64>,
    pub is_special_package: bool,
    /// Special pricing or no package at all: an admin should confirm the amount
    pub requires_admin_review: bool,
    pub source: PriceSource,
    pub session_duration: i64,
    pub fallback_price_cents: i64,
    pub default_charge_cents: i64,
    pub late_fee_cents: i64,
}

impl PricingQuote {
    /// Build a quote from an (optional) active package
    pub fn new(
        policy: PricingPolicy,
        client_id: Option<i64>,
        active: Option<&ActivePackage>,
        session_duration: i64,
    ) -> Result<Self> {
        let fallback_price_cents = policy.fallback_rate(session_duration);
        let price_per_session_cents = active.map(|p| p.price_per_session_cents);
        let rate = price_per_session_cents.unwrap_or(fallback_price_cents);
        let is_special_package = active.map(|p| p.is_special).unwrap_or(false);

        Ok(PricingQuote {
            client_id,
            package_id: active.map(|p| p.package_id),
            package_name: active.map(|p| p.name.clone()),
            price_per_session_cents,
            is_special_package,
            requires_admin_review: is_special_package || active.is_none(),
            source: if active.is_some() {
                PriceSource::Package
            } else {
                PriceSource::Fallback
            },
            session_duration,
            fallback_price_cents,
            default_charge_cents: rate,
            late_fee_cents: policy.late_fee(rate)?,
        })
    }

    /// Per-session rate the charges derive from
    pub fn rate_cents(&self) -> i64 {
        self.default_charge_cents
    }

    /// Amount for a charge type
    pub fn charge_for(&self, charge_type: ChargeType) -> i64 {
        match charge_type {
            ChargeType::None => 0,
            ChargeType::Full => self.rate_cents(),
            ChargeType::LateFee | ChargeType::Partial => self.late_fee_cents,
        }
    }
}

/// Resolve the price for `client_id` (None: session has no client)
pub async fn resolve_pricing(
    pool: &SqlitePool,
    client_id: Option<i64>,
    session_duration: i64,
) -> Result<PricingQuote> {
    let policy = PricingPolicy::load(pool).await?;

    let active = match client_id {
        Some(id) => db::packages::active_package(pool, id).await?,
        None => None,
    };

    if let Some(package) = &active {
        tracing::debug!(
            client_id,
            package_id = package.package_id,
            price_cents = package.price_per_session_cents,
            "Resolved client package price"
        );
    }

    PricingQuote::new(policy, client_id, active.as_ref(), session_duration)
}
