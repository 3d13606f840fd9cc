//! Notifications and the silent-cancellation gate
//!
//! Delivery goes through the [`Notifier`] trait so the transport can be
//! swapped (log only, webhook, test recorder). Dispatch is inline in the
//! request after the database commit; a failed delivery is logged and never
//! fails the request.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use studio_common::db::User;
use tracing::{info, warn};

use crate::session::{ChargeType, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Client,
    Trainer,
}

/// One outgoing message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub session_id: i64,
    pub user_id: i64,
    pub audience: Audience,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub body: String,
}

/// Notification transport
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Transport identifier for logs (e.g., "log", "webhook")
    fn name(&self) -> &'static str;

    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log only
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            session_id = notification.session_id,
            user_id = notification.user_id,
            audience = ?notification.audience,
            to = %notification.email,
            subject = %notification.subject,
            "Notification"
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a webhook (mail/SMS relay)
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        self.client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .with_context(|| format!("Webhook request to {} failed", self.url))?
            .error_for_status()
            .context("Webhook rejected notification")?;
        Ok(())
    }
}

/// Which parties were actually notified
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub client: bool,
    pub trainer: bool,
}

/// Everything the cancellation notices are built from
pub struct CancellationNotice<'a> {
    pub session: &'a Session,
    pub client: Option<&'a User>,
    pub trainer: Option<&'a User>,
    /// The user who cancelled; never notified about their own action
    pub actor_id: i64,
    pub is_late: bool,
    pub credit_restored: bool,
}

/// Send cancellation notices to client and trainer unless `silent`
pub async fn dispatch_cancellation(
    notifier: &dyn Notifier,
    silent: bool,
    notice: CancellationNotice<'_>,
) -> DispatchReport {
    let session = notice.session;

    if silent {
        info!(
            session_id = session.id,
            "Silent cancellation: client and trainer notifications suppressed"
        );
        return DispatchReport::default();
    }

    let when = format_session_date(session);
    let reason = session
        .cancellation_reason
        .as_deref()
        .unwrap_or("No reason provided");
    let mut report = DispatchReport::default();

    if let Some(client) = recipient(notice.client, notice.actor_id) {
        let mut body = format!(
            "Your session scheduled for {} has been cancelled.\n\nReason: {}",
            when, reason
        );
        if notice.credit_restored {
            body.push_str("\nYour session credit has been restored to your account.");
        }
        let notification = build(session, client, Audience::Client, "Session Cancelled", body);
        report.client = deliver(notifier, &notification).await;
    }

    if let Some(trainer) = recipient(notice.trainer, notice.actor_id) {
        let client_name = notice
            .client
            .map(User::full_name)
            .unwrap_or_else(|| "Unknown Client".to_string());
        let mut body = format!(
            "A session with {} scheduled for {} has been cancelled.\n\nReason: {}",
            client_name, when, reason
        );
        if notice.is_late {
            body.push_str("\nNote: This was a late cancellation.");
        }
        let notification = build(session, trainer, Audience::Trainer, "Session Cancelled", body);
        report.trainer = deliver(notifier, &notification).await;
    }

    report
}

/// Tell the client a cancellation charge was applied
///
/// Sessions cancelled silently stay silent: no charge notice either.
pub async fn dispatch_charge_notice(
    notifier: &dyn Notifier,
    session: &Session,
    client: Option<&User>,
    charge_type: ChargeType,
    amount_cents: i64,
) -> bool {
    if session.silent_cancellation {
        info!(
            session_id = session.id,
            "Charge notice suppressed for silently cancelled session"
        );
        return false;
    }

    let Some(client) = client.filter(|c| c.email.is_some()) else {
        return false;
    };

    let label = match charge_type {
        ChargeType::LateFee => "Late Cancellation Fee",
        ChargeType::Full => "Full Session Charge",
        ChargeType::Partial => "Partial Charge",
        ChargeType::None => "No Charge",
    };
    let body = format!(
        "A cancellation charge has been applied for your session on {}.\n\nCharge Type: {}\nAmount: {}",
        format_session_date(session),
        label,
        format_cents(amount_cents)
    );
    let notification = build(
        session,
        client,
        Audience::Client,
        "Cancellation Charge Applied",
        body,
    );
    deliver(notifier, &notification).await
}

/// Format cents as dollars, e.g. `$87.50`
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{}${}.{:02}", sign, cents / 100, cents % 100)
}

fn recipient(user: Option<&User>, actor_id: i64) -> Option<&User> {
    user.filter(|u| u.id != actor_id && u.email.is_some())
}

fn build(session: &Session, user: &User, audience: Audience, subject: &str, body: String) -> Notification {
    Notification {
        session_id: session.id,
        user_id: user.id,
        audience,
        email: user.email.clone().unwrap_or_default(),
        phone: user.phone.clone(),
        subject: subject.to_string(),
        body,
    }
}

async fn deliver(notifier: &dyn Notifier, notification: &Notification) -> bool {
    match notifier.send(notification).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                session_id = notification.session_id,
                user_id = notification.user_id,
                transport = notifier.name(),
                "Failed to send notification: {:#}",
                e
            );
            false
        }
    }
}

fn format_session_date(session: &Session) -> String {
    session
        .session_date
        .format("%A, %B %-d, %Y at %-I:%M %p UTC")
        .to_string()
}
