//! Pending account changes confirmed by an emailed code.
//!
//! Per (email, purpose) the lifecycle is `NoPending -> Pending -> Consumed | Expired`.
//! A pending row stores only the argon2 hash of the 4-digit code; the signed
//! activation token carries the payload needed to commit the change. Both are
//! checked on consumption and neither check relies on the other.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::error::{AppError, AppResult};
use crate::mail::{activation_body, activation_subject, SharedMailer};
use crate::security;
use crate::storage::{AccountStore, ActivationStore, InsertOutcome};

use super::principal::{Identity, Role, UserPatch, UserRecord};
use super::tokens::{ActivationClaims, TokenSigner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Registration,
    EmailChange,
    PasswordReset,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Registration => "registration",
            Purpose::EmailChange => "email_change",
            Purpose::PasswordReset => "password_reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "purpose", rename_all = "snake_case")]
pub enum PendingPayload {
    Registration {
        name: String,
        email: String,
        password_hash: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gender: Option<String>,
    },
    EmailChange { user_id: String, email: String },
    PasswordReset { user_id: String, email: String },
}

impl PendingPayload {
    pub fn purpose(&self) -> Purpose {
        match self {
            PendingPayload::Registration { .. } => Purpose::Registration,
            PendingPayload::EmailChange { .. } => Purpose::EmailChange,
            PendingPayload::PasswordReset { .. } => Purpose::PasswordReset,
        }
    }

    /// Address the code is mailed to.
    pub fn email(&self) -> &str {
        match self {
            PendingPayload::Registration { email, .. }
            | PendingPayload::EmailChange { email, .. }
            | PendingPayload::PasswordReset { email, .. } => email.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingActivation {
    pub id: String,
    pub email: String,
    pub purpose: Purpose,
    pub code_hash: String,
    pub activation_token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_resend_at: DateTime<Utc>,
}

impl PendingActivation {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool { now < self.expires_at }

    /// Whole seconds until a resend is allowed, rounded up; zero once allowed.
    pub fn remaining_cooldown_secs(&self, now: DateTime<Utc>, cooldown: Duration) -> u64 {
        let left_ms = (cooldown - (now - self.last_resend_at)).num_milliseconds();
        if left_ms <= 0 { return 0; }
        ((left_ms + 999) / 1000) as u64
    }
}

/// Handed back to the client after a code has been mailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationTicket {
    pub activation_token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct ActivationWorkflow {
    accounts: Arc<dyn AccountStore>,
    activations: Arc<dyn ActivationStore>,
    signer: Arc<TokenSigner>,
    mailer: SharedMailer,
    clock: SharedClock,
    ttl: Duration,
    cooldown: Duration,
}

impl ActivationWorkflow {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        activations: Arc<dyn ActivationStore>,
        signer: Arc<TokenSigner>,
        mailer: SharedMailer,
        clock: SharedClock,
        ttl_secs: i64,
        cooldown_secs: i64,
    ) -> Self {
        Self { accounts, activations, signer, mailer, clock, ttl: Duration::seconds(ttl_secs), cooldown: Duration::seconds(cooldown_secs) }
    }

    pub async fn request_registration(&self, name: &str, email: &str, password: &str, gender: Option<String>) -> AppResult<ActivationTicket> {
        let name = security::validate_name(name)?;
        let email = security::validate_email(email)?;
        security::validate_password(password)?;
        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(AppError::duplicate_email("An account with this email already exists"));
        }
        let password_hash = security::hash_password(password)?;
        let greeting = name.clone();
        let payload = PendingPayload::Registration { name, email, password_hash, gender: gender.filter(|g| !g.trim().is_empty()) };
        self.start(payload, &greeting).await
    }

    /// Mail a code to `new_email`; the account keeps its old address until confirmed.
    pub async fn request_email_change(&self, user: &Identity, new_email: &str) -> AppResult<ActivationTicket> {
        let email = security::validate_email(new_email)?;
        if email == user.email {
            return Err(AppError::user("email_unchanged", "New email is the same as the current one"));
        }
        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(AppError::duplicate_email("An account with this email already exists"));
        }
        let payload = PendingPayload::EmailChange { user_id: user.id.clone(), email };
        self.start(payload, &user.name).await
    }

    pub async fn request_password_reset(&self, email: &str) -> AppResult<ActivationTicket> {
        let email = security::normalize_email(email);
        let Some(user) = self.accounts.find_by_email(&email).await? else {
            return Err(AppError::not_found("user_not_found", "No account uses this email address"));
        };
        let payload = PendingPayload::PasswordReset { user_id: user.id.clone(), email };
        self.start(payload, &user.name).await
    }

    async fn start(&self, payload: PendingPayload, greeting: &str) -> AppResult<ActivationTicket> {
        let now = self.clock.now();
        let email = payload.email().to_string();
        let purpose = payload.purpose();

        let purged = self.activations.delete_expired_for_email(&email, now).await?;
        if purged > 0 { debug!(target: "activation", "purged {} expired row(s) for {}", purged, email); }

        let existing = self.activations.find_live(&email, purpose, now).await?;
        if let Some(row) = existing.as_ref() {
            let remaining = row.remaining_cooldown_secs(now, self.cooldown);
            if remaining > 0 {
                debug!(target: "activation", "resend for {} ({}) throttled, {}s left", email, purpose.as_str(), remaining);
                return Err(AppError::throttled(remaining, row.activation_token.clone()));
            }
        }

        let code = security::generate_activation_code();
        let expires_at = now + self.ttl;
        let signed = self.signer.sign_activation(&email, payload, expires_at)?;
        let row = PendingActivation {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            purpose,
            code_hash: security::hash_activation_code(&code)?,
            activation_token: signed.token.clone(),
            issued_at: now,
            expires_at,
            last_resend_at: now,
        };

        let replaced = match existing {
            Some(prev) => self.activations.replace(&prev.id, row.clone()).await?,
            None => false,
        };
        if !replaced {
            // Either nothing was pending or the previous row vanished meanwhile.
            if let InsertOutcome::Existing(other) = self.activations.insert_unique(row.clone(), now).await? {
                let remaining = other.remaining_cooldown_secs(now, self.cooldown);
                return Err(AppError::throttled(remaining, other.activation_token));
            }
        }

        let body = activation_body(greeting, &code, self.ttl.num_seconds());
        if let Err(e) = self.mailer.send(&email, activation_subject(purpose), &body).await {
            warn!(target: "activation", "mail to {} failed, dropping pending {}: {}", email, purpose.as_str(), e);
            self.activations.delete(&row.id).await?;
            return Err(e);
        }
        info!(target: "activation", "code sent to {} for {}", email, purpose.as_str());
        Ok(ActivationTicket { activation_token: signed.token, expires_at })
    }

    /// Check the token, the pending row and the code, in that order.
    async fn verify(&self, token: &str, code: &str, expected: Purpose) -> AppResult<(ActivationClaims, PendingActivation)> {
        let now = self.clock.now();
        let claims = self.signer.verify_activation(token)
            .map_err(|e| AppError::invalid_code(format!("Activation token is not valid: {}", e)))?;
        if claims.payload.purpose() != expected {
            return Err(AppError::invalid_code("Activation token was issued for a different action"));
        }
        let Some(row) = self.activations.find_by_token(token).await? else {
            if let PendingPayload::Registration { email, .. } = &claims.payload {
                if self.accounts.find_by_email(email).await?.is_some() {
                    return Err(AppError::already_activated("This account is already activated"));
                }
            }
            return Err(AppError::invalid_code("Invalid or expired activation code"));
        };
        if !row.is_live(now) {
            self.activations.delete(&row.id).await?;
            return Err(AppError::invalid_code("Invalid or expired activation code"));
        }
        if !security::verify_activation_code(&row.code_hash, code) {
            return Err(AppError::invalid_code("Invalid or expired activation code"));
        }
        Ok((claims, row))
    }

    /// Promote a pending registration to a durable account.
    pub async fn activate_registration(&self, token: &str, code: &str) -> AppResult<UserRecord> {
        let (claims, row) = self.verify(token, code, Purpose::Registration).await?;
        let PendingPayload::Registration { name, email, password_hash, gender } = claims.payload else {
            return Err(AppError::invalid_code("Activation token was issued for a different action"));
        };
        let now = self.clock.now();
        let user = UserRecord {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            password_hash,
            role: Role::User,
            verified: true,
            avatar: None,
            gender,
            created_at: now,
            updated_at: now,
        };
        match self.accounts.insert(user.clone()).await {
            Ok(()) => {}
            Err(AppError::DuplicateEmail { .. }) => {
                self.activations.delete(&row.id).await?;
                return Err(AppError::already_activated("This account is already activated"));
            }
            Err(e) => return Err(e),
        }
        self.activations.delete(&row.id).await?;
        info!(target: "activation", "account {} activated for {}", user.id, user.email);
        Ok(user)
    }

    /// Commit a pending email change requested by `requester_id`.
    pub async fn confirm_email_change(&self, requester_id: &str, token: &str, code: &str) -> AppResult<UserRecord> {
        let (claims, row) = self.verify(token, code, Purpose::EmailChange).await?;
        let PendingPayload::EmailChange { user_id, email } = claims.payload else {
            return Err(AppError::invalid_code("Activation token was issued for a different action"));
        };
        if user_id != requester_id {
            return Err(AppError::forbidden("This email change belongs to another account"));
        }
        let patch = UserPatch { email: Some(email), ..Default::default() };
        let updated = self.accounts.update(&user_id, patch, self.clock.now()).await;
        self.activations.delete(&row.id).await?;
        let updated = updated?;
        info!(target: "activation", "email changed for {}", updated.id);
        Ok(updated)
    }

    pub async fn reset_password(&self, token: &str, code: &str, new_password: &str) -> AppResult<UserRecord> {
        security::validate_password(new_password)?;
        let (claims, row) = self.verify(token, code, Purpose::PasswordReset).await?;
        let PendingPayload::PasswordReset { user_id, .. } = claims.payload else {
            return Err(AppError::invalid_code("Activation token was issued for a different action"));
        };
        let patch = UserPatch { password_hash: Some(security::hash_password(new_password)?), ..Default::default() };
        let updated = self.accounts.update(&user_id, patch, self.clock.now()).await;
        self.activations.delete(&row.id).await?;
        let updated = updated?;
        info!(target: "activation", "password reset for {}", updated.id);
        Ok(updated)
    }

    /// Drop every pending row whose expiry has passed.
    pub async fn sweep(&self) -> AppResult<usize> {
        self.activations.delete_expired(self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(last_resend_at: DateTime<Utc>) -> PendingActivation {
        PendingActivation {
            id: "r".into(), email: "a@example.com".into(), purpose: Purpose::Registration,
            code_hash: String::new(), activation_token: "t".into(),
            issued_at: last_resend_at, expires_at: last_resend_at + Duration::seconds(120), last_resend_at,
        }
    }

    #[test]
    fn cooldown_rounds_up_and_clamps() {
        let t0 = Utc::now();
        let r = row(t0);
        let cd = Duration::seconds(120);
        assert_eq!(r.remaining_cooldown_secs(t0, cd), 120);
        assert_eq!(r.remaining_cooldown_secs(t0 + Duration::milliseconds(500), cd), 120);
        assert_eq!(r.remaining_cooldown_secs(t0 + Duration::milliseconds(1000), cd), 119);
        assert_eq!(r.remaining_cooldown_secs(t0 + Duration::seconds(119) + Duration::milliseconds(1), cd), 1);
        assert_eq!(r.remaining_cooldown_secs(t0 + Duration::seconds(120), cd), 0);
        assert_eq!(r.remaining_cooldown_secs(t0 + Duration::seconds(500), cd), 0);
    }

    #[test]
    fn liveness_ends_at_expiry() {
        let t0 = Utc::now();
        let r = row(t0);
        assert!(r.is_live(t0 + Duration::seconds(119)));
        assert!(!r.is_live(t0 + Duration::seconds(120)));
    }

    #[test]
    fn payload_serializes_with_purpose_tag() {
        let p = PendingPayload::EmailChange { user_id: "u".into(), email: "n@example.com".into() };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["purpose"], "email_change");
        assert_eq!(p.purpose(), Purpose::EmailChange);
        assert_eq!(p.email(), "n@example.com");
    }
}
