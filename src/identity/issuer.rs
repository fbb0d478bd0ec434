use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

use super::principal::Identity;
use super::session::SessionManager;
use super::tokens::{SignedToken, TokenSigner};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: chrono::DateTime<chrono::Utc>,
    pub refresh_expires_at: chrono::DateTime<chrono::Utc>,
}

impl TokenPair {
    fn from_parts(access: SignedToken, refresh: SignedToken) -> Self {
        Self {
            access_token: access.token,
            refresh_token: refresh.token,
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
        }
    }
}

/// Mints credential pairs and keeps the session cache in step with them.
pub struct TokenIssuer {
    signer: Arc<TokenSigner>,
    sessions: SessionManager,
}

impl TokenIssuer {
    pub fn new(signer: Arc<TokenSigner>, sessions: SessionManager) -> Self { Self { signer, sessions } }

    pub fn sessions(&self) -> &SessionManager { &self.sessions }
    pub fn signer(&self) -> &Arc<TokenSigner> { &self.signer }

    /// Sign a fresh pair and overwrite the session for this identity.
    pub async fn issue(&self, identity: &Identity) -> AppResult<TokenPair> {
        let access = self.signer.sign_access(&identity.id)?;
        let refresh = self.signer.sign_refresh(&identity.id)?;
        self.sessions.store(identity).await?;
        info!(target: "auth", "issued credentials for {}", identity.id);
        Ok(TokenPair::from_parts(access, refresh))
    }

    /// Exchange a refresh credential for a new pair (the refresh credential is
    /// rotated) and slide the session TTL.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<(TokenPair, Identity)> {
        let claims = self.signer.verify_refresh(refresh_token)
            .map_err(|e| AppError::invalid_credential(format!("Could not refresh token: {}", e)))?;
        let Some(sess) = self.sessions.load(&claims.sub).await? else {
            return Err(AppError::session_expired("Please login to access this resource"));
        };
        let access = self.signer.sign_access(&claims.sub)?;
        let refresh = self.signer.sign_refresh(&claims.sub)?;
        let Some(sess) = self.sessions.touch(sess).await? else {
            return Err(AppError::session_expired("Please login to access this resource"));
        };
        debug!(target: "auth", "refreshed credentials for {}", claims.sub);
        Ok((TokenPair::from_parts(access, refresh), sess.identity))
    }

    /// Resolve an access credential to the identity held in its session.
    pub async fn authenticate(&self, access_token: &str) -> AppResult<Identity> {
        let claims = self.signer.verify_access(access_token)
            .map_err(|e| AppError::unauthenticated(format!("Access token is not valid: {}", e)))?;
        match self.sessions.load(&claims.sub).await? {
            Some(sess) => Ok(sess.identity),
            None => Err(AppError::unauthenticated("Please login to access this resource")),
        }
    }
}
