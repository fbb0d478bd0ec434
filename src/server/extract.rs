//! Request extractors: the authenticated caller and JSON bodies whose
//! rejections render as `AppError`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::identity::{require_role, Identity, Role};

use super::cookies::access_credential;
use super::AppState;

/// Caller resolved from the access credential and a live session.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = access_credential(&parts.headers) else {
            return Err(AppError::unauthenticated("Please login to access this resource"));
        };
        let identity = state.issuer.authenticate(&token).await?;
        Ok(AuthUser(identity))
    }
}

/// Authenticated caller holding the `admin` role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Identity);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;
        require_role(&identity, &[Role::Admin])?;
        Ok(AdminUser(identity))
    }
}

pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(v)) => Ok(JsonBody(v)),
            Err(rej) => Err(rejection_to_error(rej)),
        }
    }
}

fn rejection_to_error(rej: JsonRejection) -> AppError {
    AppError::user("invalid_body".to_string(), rej.body_text())
}
