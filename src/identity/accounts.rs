use std::sync::Arc;

use tracing::info;

use crate::clock::SharedClock;
use crate::error::{AppError, AppResult};
use crate::security;
use crate::storage::{AccountStore, BabyStore};

use super::issuer::{TokenIssuer, TokenPair};
use super::principal::{Identity, Role, UserPatch, UserRecord};

/// Result of a successful login or activation.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub identity: Identity,
    pub tokens: TokenPair,
}

pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    babies: Arc<dyn BabyStore>,
    issuer: Arc<TokenIssuer>,
    clock: SharedClock,
}

impl AccountService {
    pub fn new(accounts: Arc<dyn AccountStore>, babies: Arc<dyn BabyStore>, issuer: Arc<TokenIssuer>, clock: SharedClock) -> Self {
        Self { accounts, babies, issuer, clock }
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginOutcome> {
        let email = security::normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AppError::user("missing_credentials", "Please enter email and password"));
        }
        let Some(user) = self.accounts.find_by_email(&email).await? else {
            return Err(AppError::invalid_credential("Invalid email or password"));
        };
        if !security::verify_password(&user.password_hash, password) {
            return Err(AppError::invalid_credential("Invalid email or password"));
        }
        self.open_session(&user).await
    }

    /// Issue credentials for an account that was just created or confirmed.
    pub async fn open_session(&self, user: &UserRecord) -> AppResult<LoginOutcome> {
        let identity = user.identity();
        let tokens = self.issuer.issue(&identity).await?;
        info!(target: "auth", "session opened for {}", identity.id);
        Ok(LoginOutcome { identity, tokens })
    }

    /// Drop the user's session; every outstanding access credential dies with it.
    pub async fn logout(&self, user_id: &str) -> AppResult<()> {
        self.issuer.sessions().revoke(user_id).await?;
        info!(target: "auth", "logged out {}", user_id);
        Ok(())
    }

    pub async fn refresh(&self, refresh_token: &str) -> AppResult<LoginOutcome> {
        let (tokens, identity) = self.issuer.refresh(refresh_token).await?;
        Ok(LoginOutcome { identity, tokens })
    }

    /// Profile from the session cache. Only login and activation create a
    /// session, so a missing one means the caller was signed out.
    pub async fn me(&self, user_id: &str) -> AppResult<Identity> {
        match self.issuer.sessions().load(user_id).await? {
            Some(sess) => Ok(sess.identity),
            None => Err(AppError::unauthenticated("Please login to access this resource")),
        }
    }

    pub async fn update_name(&self, user: &Identity, name: &str) -> AppResult<Identity> {
        let name = security::validate_name(name)?;
        let patch = UserPatch { name: Some(name), ..Default::default() };
        self.apply(&user.id, patch).await
    }

    pub async fn change_password(&self, user: &Identity, old_password: &str, new_password: &str) -> AppResult<Identity> {
        if old_password.is_empty() || new_password.is_empty() {
            return Err(AppError::user("missing_password", "Please enter old and new password"));
        }
        security::validate_password(new_password)?;
        let stored = self.require_user(&user.id).await?;
        if !security::verify_password(&stored.password_hash, old_password) {
            return Err(AppError::invalid_credential("Old password is incorrect"));
        }
        let patch = UserPatch { password_hash: Some(security::hash_password(new_password)?), ..Default::default() };
        self.apply(&user.id, patch).await
    }

    pub async fn update_avatar(&self, user: &Identity, avatar: &str) -> AppResult<Identity> {
        let avatar = avatar.trim();
        if avatar.is_empty() {
            return Err(AppError::user("missing_avatar", "Avatar reference must not be empty"));
        }
        let patch = UserPatch { avatar: Some(avatar.to_string()), ..Default::default() };
        self.apply(&user.id, patch).await
    }

    /// Re-cache an identity whose durable row changed outside this service.
    pub async fn sync_session(&self, user: &UserRecord) -> AppResult<Identity> {
        let identity = user.identity();
        self.issuer.sessions().replace_identity(&identity).await?;
        Ok(identity)
    }

    /// All accounts, newest first.
    pub async fn list_users(&self) -> AppResult<Vec<Identity>> {
        let mut users = self.accounts.list().await?;
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users.iter().map(Identity::from).collect())
    }

    pub async fn update_role(&self, user_id: &str, role: Role) -> AppResult<Identity> {
        let patch = UserPatch { role: Some(role), ..Default::default() };
        let identity = self.apply(user_id, patch).await?;
        info!(target: "auth", "role of {} set to {}", user_id, role);
        Ok(identity)
    }

    /// Hard-delete an account, its session and its babies.
    pub async fn delete_user(&self, user_id: &str) -> AppResult<()> {
        if !self.accounts.delete(user_id).await? {
            return Err(AppError::not_found("user_not_found", "User not found"));
        }
        self.issuer.sessions().revoke(user_id).await?;
        let removed = self.babies.delete_babies_for_owner(user_id).await?;
        info!(target: "auth", "deleted user {} ({} baby record(s))", user_id, removed);
        Ok(())
    }

    async fn require_user(&self, user_id: &str) -> AppResult<UserRecord> {
        self.accounts.find_by_id(user_id).await?
            .ok_or_else(|| AppError::not_found("user_not_found", "User not found"))
    }

    async fn apply(&self, user_id: &str, patch: UserPatch) -> AppResult<Identity> {
        let updated = self.accounts.update(user_id, patch, self.clock.now()).await?;
        self.sync_session(&updated).await
    }
}
