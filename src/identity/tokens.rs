//! Signed credentials (HS256 JWT).
//!
//! Access, refresh and activation tokens use three distinct secrets, so a token
//! of one kind never verifies as another. Expiry is compared against the
//! injected clock rather than the library's wall clock.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::TokenSecrets;
use crate::error::AppError;

use super::activation::PendingPayload;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed or badly signed token: {0}")]
    Invalid(String),
    #[error("token expired")]
    Expired,
    #[error("wrong token type: expected {expected}, got {got}")]
    WrongType { expected: TokenType, got: TokenType },
    #[error("token encoding failed: {0}")]
    Encode(String),
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Encode(msg) => AppError::internal("token_encoding".to_string(), msg),
            other => AppError::unauthenticated(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
    Activation,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
            TokenType::Activation => write!(f, "activation"),
        }
    }
}

/// Claims of access and refresh credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id
    pub sub: String,
    pub typ: TokenType,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of an activation token; `payload` carries what consumption needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationClaims {
    /// Email the code was sent to
    pub sub: String,
    pub typ: TokenType,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub payload: PendingPayload,
}

trait Expiring {
    fn typ(&self) -> TokenType;
    fn exp(&self) -> i64;
}

impl Expiring for Claims {
    fn typ(&self) -> TokenType { self.typ }
    fn exp(&self) -> i64 { self.exp }
}

impl Expiring for ActivationClaims {
    fn typ(&self) -> TokenType { self.typ }
    fn exp(&self) -> i64 { self.exp }
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

struct KeyPair {
    enc: EncodingKey,
    dec: DecodingKey,
}

impl KeyPair {
    fn new(secret: &str) -> Self {
        Self { enc: EncodingKey::from_secret(secret.as_bytes()), dec: DecodingKey::from_secret(secret.as_bytes()) }
    }
}

pub struct TokenSigner {
    access: KeyPair,
    refresh: KeyPair,
    activation: KeyPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: SharedClock,
}

impl TokenSigner {
    pub fn new(secrets: &TokenSecrets, access_ttl_secs: i64, refresh_ttl_secs: i64, clock: SharedClock) -> Self {
        Self {
            access: KeyPair::new(&secrets.access),
            refresh: KeyPair::new(&secrets.refresh),
            activation: KeyPair::new(&secrets.activation),
            access_ttl: Duration::seconds(access_ttl_secs),
            refresh_ttl: Duration::seconds(refresh_ttl_secs),
            clock,
        }
    }

    pub fn refresh_ttl(&self) -> Duration { self.refresh_ttl }

    pub fn sign_access(&self, user_id: &str) -> Result<SignedToken, TokenError> {
        self.sign_session(user_id, TokenType::Access, self.access_ttl, &self.access)
    }

    pub fn sign_refresh(&self, user_id: &str) -> Result<SignedToken, TokenError> {
        self.sign_session(user_id, TokenType::Refresh, self.refresh_ttl, &self.refresh)
    }

    /// Sign an activation token that expires exactly at `expires_at`.
    pub fn sign_activation(&self, email: &str, payload: PendingPayload, expires_at: DateTime<Utc>) -> Result<SignedToken, TokenError> {
        let now = self.clock.now();
        let claims = ActivationClaims {
            sub: email.to_string(),
            typ: TokenType::Activation,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            payload,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.activation.enc)
            .map_err(|e| TokenError::Encode(e.to_string()))?;
        Ok(SignedToken { token, expires_at })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenType::Access, &self.access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenType::Refresh, &self.refresh)
    }

    pub fn verify_activation(&self, token: &str) -> Result<ActivationClaims, TokenError> {
        self.verify(token, TokenType::Activation, &self.activation)
    }

    fn sign_session(&self, user_id: &str, typ: TokenType, ttl: Duration, keys: &KeyPair) -> Result<SignedToken, TokenError> {
        let now = self.clock.now();
        let expires_at = now + ttl;
        let claims = Claims {
            sub: user_id.to_string(),
            typ,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.enc)
            .map_err(|e| TokenError::Encode(e.to_string()))?;
        Ok(SignedToken { token, expires_at })
    }

    fn verify<C: DeserializeOwned + Expiring>(&self, token: &str, expected: TokenType, keys: &KeyPair) -> Result<C, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        let data = decode::<C>(token, &keys.dec, &validation).map_err(|e| TokenError::Invalid(e.to_string()))?;
        let claims = data.claims;
        if claims.typ() != expected {
            return Err(TokenError::WrongType { expected, got: claims.typ() });
        }
        let exp = Utc.timestamp_opt(claims.exp(), 0).single().ok_or(TokenError::Expired)?;
        if self.clock.now() >= exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::sync::Arc;

    fn secrets() -> TokenSecrets {
        TokenSecrets { access: "acc-secret".into(), refresh: "ref-secret".into(), activation: "act-secret".into() }
    }

    fn signer(clock: Arc<ManualClock>) -> TokenSigner {
        TokenSigner::new(&secrets(), 60, 600, clock)
    }

    #[test]
    fn access_token_round_trip_and_expiry() {
        let clock = Arc::new(ManualClock::starting_now());
        let s = signer(clock.clone());
        let t = s.sign_access("user-1").unwrap();
        let c = s.verify_access(&t.token).unwrap();
        assert_eq!(c.sub, "user-1");
        assert_eq!(c.typ, TokenType::Access);
        clock.advance(Duration::seconds(61));
        assert!(matches!(s.verify_access(&t.token), Err(TokenError::Expired)));
    }

    #[test]
    fn kinds_do_not_cross_verify() {
        let s = signer(Arc::new(ManualClock::starting_now()));
        let refresh = s.sign_refresh("user-1").unwrap();
        let access = s.sign_access("user-1").unwrap();
        assert!(matches!(s.verify_access(&refresh.token), Err(TokenError::Invalid(_))));
        assert!(matches!(s.verify_refresh(&access.token), Err(TokenError::Invalid(_))));
        assert!(s.verify_refresh(&refresh.token).is_ok());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let s = signer(Arc::new(ManualClock::starting_now()));
        let t = s.sign_access("user-1").unwrap().token;
        let mut parts: Vec<String> = t.split('.').map(|p| p.to_string()).collect();
        parts[2] = parts[2].chars().rev().collect();
        assert!(s.verify_access(&parts.join(".")).is_err());
        assert!(s.verify_access("not-a-jwt").is_err());
    }

    #[test]
    fn two_tokens_for_same_user_differ() {
        let s = signer(Arc::new(ManualClock::starting_now()));
        assert_ne!(s.sign_access("u").unwrap().token, s.sign_access("u").unwrap().token);
    }

    #[test]
    fn activation_token_carries_payload() {
        let clock = Arc::new(ManualClock::starting_now());
        let s = signer(clock.clone());
        let payload = PendingPayload::PasswordReset { user_id: "u1".into(), email: "a@example.com".into() };
        let exp = clock.now() + Duration::seconds(120);
        let t = s.sign_activation("a@example.com", payload.clone(), exp).unwrap();
        let c = s.verify_activation(&t.token).unwrap();
        assert_eq!(c.payload, payload);
        assert_eq!(c.sub, "a@example.com");
        clock.advance(Duration::seconds(120));
        assert!(matches!(s.verify_activation(&t.token), Err(TokenError::Expired)));
    }
}
