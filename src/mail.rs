//! Outbound mail.
//!
//! `HttpMailer` posts to a transactional-mail HTTP API; `LogMailer` only logs
//! (development, or when no mail API is configured); `MemoryMailer` keeps an
//! outbox for tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::MailApiConfig;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

pub type SharedMailer = Arc<dyn Mailer>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailBody {
    sender: MailAddress,
    to: Vec<MailAddress>,
    subject: String,
    text_content: String,
}

pub struct HttpMailer {
    client: reqwest::Client,
    cfg: MailApiConfig,
}

impl HttpMailer {
    pub fn new(cfg: MailApiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("babytrack/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, cfg })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let payload = SendMailBody {
            sender: MailAddress { email: self.cfg.sender.clone(), name: self.cfg.sender_name.clone() },
            to: vec![MailAddress { email: to.to_string(), name: None }],
            subject: subject.to_string(),
            text_content: body.to_string(),
        };
        let resp = self.client
            .post(&self.cfg.url)
            .header("api-key", &self.cfg.api_key)
            .header("accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::io("mail_unavailable".to_string(), format!("mail API request failed: {}", e)))?;
        let status = resp.status();
        if status.is_success() {
            info!(target: "mail", "sent '{}' to {}", subject, to);
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        warn!(target: "mail", "mail API rejected '{}' to {}: status={} body={}", subject, to, status, text);
        Err(AppError::io("mail_unavailable".to_string(), format!("mail API returned {}", status)))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        info!(target: "mail", "mail to {} ('{}') not delivered: no mail API configured", to, subject);
        debug!(target: "mail", "body for {}:\n{}", to, body);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Captures mail instead of sending it. Can be switched to fail every send.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<OutgoingMail>>,
    failing: Mutex<bool>,
}

impl MemoryMailer {
    pub fn new() -> Self { Self::default() }

    pub fn sent(&self) -> Vec<OutgoingMail> { self.outbox.lock().clone() }

    pub fn last_to(&self, to: &str) -> Option<OutgoingMail> {
        self.outbox.lock().iter().rev().find(|m| m.to == to).cloned()
    }

    pub fn set_failing(&self, failing: bool) { *self.failing.lock() = failing; }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        if *self.failing.lock() {
            return Err(AppError::io("mail_unavailable", "mail dispatch disabled"));
        }
        self.outbox.lock().push(OutgoingMail { to: to.to_string(), subject: subject.to_string(), body: body.to_string() });
        Ok(())
    }
}

/// HTTP mailer when the mail API is configured, otherwise the logging one.
pub fn mailer_from_config(cfg: Option<&MailApiConfig>) -> anyhow::Result<SharedMailer> {
    match cfg {
        Some(c) => Ok(Arc::new(HttpMailer::new(c.clone())?)),
        None => {
            warn!(target: "mail", "no mail API configured; activation codes will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

pub fn activation_subject(purpose: crate::identity::Purpose) -> &'static str {
    use crate::identity::Purpose;
    match purpose {
        Purpose::Registration => "Activate your account",
        Purpose::EmailChange => "Confirm your new email address",
        Purpose::PasswordReset => "Reset your password",
    }
}

/// Plain-text body carrying the 4-digit code.
pub fn activation_body(name: &str, code: &str, valid_secs: i64) -> String {
    let minutes = (valid_secs + 59) / 60;
    format!(
        "Hello {name},\n\nYour verification code is: {code}\n\nThe code expires in {minutes} minute(s). If you did not request it, you can ignore this email.\n",
    )
}
