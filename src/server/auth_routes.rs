//! Account, session and activation endpoints.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::identity::{LoginOutcome, Role};

use super::cookies::{clear_credential_cookies, credential_cookies, refresh_credential};
use super::extract::{AdminUser, AuthUser, JsonBody};
use super::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/registration", post(registration))
        .route("/activate-user", post(activate_user))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh", get(refresh))
        .route("/me", get(me))
        .route("/update-user-info", put(update_user_info))
        .route("/confirm-email-change", post(confirm_email_change))
        .route("/update-user-password", put(update_user_password))
        .route("/update-user-avatar", put(update_user_avatar))
        .route("/request-password-reset", post(request_password_reset))
        .route("/reset-password", post(reset_password))
        .route("/get-all-users", get(get_all_users))
        .route("/update-user-role", put(update_user_role))
        .route("/delete-user/{id}", delete(delete_user))
}

#[derive(Debug, Deserialize)]
struct RegistrationBody {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    gender: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActivationBody {
    #[serde(default)]
    activation_token: String,
    #[serde(default)]
    activation_code: String,
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct UpdateInfoBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordBody {
    #[serde(default)]
    old_password: String,
    #[serde(default)]
    new_password: String,
}

#[derive(Debug, Deserialize)]
struct AvatarBody {
    #[serde(default)]
    avatar: String,
}

#[derive(Debug, Deserialize)]
struct ResetRequestBody {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct ResetBody {
    #[serde(default)]
    activation_token: String,
    #[serde(default)]
    activation_code: String,
    #[serde(default, rename = "newPassword")]
    new_password: String,
}

#[derive(Debug, Deserialize)]
struct RoleBody {
    id: String,
    role: Role,
}

fn require_activation_fields(token: &str, code: &str) -> AppResult<()> {
    if token.trim().is_empty() || code.trim().is_empty() {
        return Err(AppError::user("missing_activation_fields", "activation_token and activation_code are required"));
    }
    Ok(())
}

/// JSON body plus both credential cookies.
fn signed_in(state: &AppState, status: StatusCode, outcome: LoginOutcome) -> AppResult<Response> {
    let cookies = credential_cookies(&outcome.tokens, state.clock.now(), state.config.cookie_secure)?;
    let body = json!({
        "success": true,
        "user": outcome.identity,
        "accessToken": outcome.tokens.access_token,
        "refreshToken": outcome.tokens.refresh_token,
        "accessTokenExpiresAt": outcome.tokens.access_expires_at,
    });
    Ok((status, cookies, Json(body)).into_response())
}

async fn registration(State(state): State<AppState>, JsonBody(body): JsonBody<RegistrationBody>) -> AppResult<Response> {
    let ticket = state.activation.request_registration(&body.name, &body.email, &body.password, body.gender).await?;
    let body = json!({
        "success": true,
        "message": format!("Please check your email: {} to activate your account", body.email.trim()),
        "activationToken": ticket.activation_token,
        "expiresAt": ticket.expires_at,
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

async fn activate_user(State(state): State<AppState>, JsonBody(body): JsonBody<ActivationBody>) -> AppResult<Response> {
    require_activation_fields(&body.activation_token, &body.activation_code)?;
    let user = state.activation.activate_registration(&body.activation_token, &body.activation_code).await?;
    let outcome = state.accounts.open_session(&user).await?;
    signed_in(&state, StatusCode::CREATED, outcome)
}

async fn login(State(state): State<AppState>, JsonBody(body): JsonBody<LoginBody>) -> AppResult<Response> {
    let outcome = state.accounts.login(&body.email, &body.password).await?;
    signed_in(&state, StatusCode::OK, outcome)
}

async fn logout(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<Response> {
    state.accounts.logout(&user.id).await?;
    let cookies = clear_credential_cookies(state.config.cookie_secure);
    Ok((cookies, Json(json!({ "success": true, "message": "Logged out successfully" }))).into_response())
}

async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let Some(token) = refresh_credential(&headers) else {
        return Err(AppError::invalid_credential("Could not refresh token"));
    };
    let outcome = state.accounts.refresh(&token).await?;
    signed_in(&state, StatusCode::OK, outcome)
}

async fn me(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<Json<serde_json::Value>> {
    let identity = state.accounts.me(&user.id).await?;
    Ok(Json(json!({ "success": true, "user": identity })))
}

/// Name changes apply at once; a new email only starts a confirmation.
async fn update_user_info(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<UpdateInfoBody>,
) -> AppResult<Json<serde_json::Value>> {
    let name = body.name.filter(|n| !n.trim().is_empty());
    let email = body.email.filter(|e| !e.trim().is_empty());
    if name.is_none() && email.is_none() {
        return Err(AppError::user("nothing_to_update", "Provide a name or an email to update"));
    }
    let mut identity = user.clone();
    if let Some(name) = name {
        identity = state.accounts.update_name(&user, &name).await?;
    }
    let mut activation_token = None;
    if let Some(email) = email {
        let ticket = state.activation.request_email_change(&identity, &email).await?;
        activation_token = Some(ticket.activation_token);
    }
    Ok(Json(json!({
        "success": true,
        "user": identity,
        "activationToken": activation_token,
    })))
}

async fn confirm_email_change(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<ActivationBody>,
) -> AppResult<Json<serde_json::Value>> {
    require_activation_fields(&body.activation_token, &body.activation_code)?;
    let updated = state.activation.confirm_email_change(&user.id, &body.activation_token, &body.activation_code).await?;
    let identity = state.accounts.sync_session(&updated).await?;
    Ok(Json(json!({ "success": true, "user": identity })))
}

async fn update_user_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<PasswordBody>,
) -> AppResult<Json<serde_json::Value>> {
    let identity = state.accounts.change_password(&user, &body.old_password, &body.new_password).await?;
    Ok(Json(json!({ "success": true, "user": identity })))
}

async fn update_user_avatar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<AvatarBody>,
) -> AppResult<Json<serde_json::Value>> {
    let identity = state.accounts.update_avatar(&user, &body.avatar).await?;
    Ok(Json(json!({ "success": true, "user": identity })))
}

async fn request_password_reset(State(state): State<AppState>, JsonBody(body): JsonBody<ResetRequestBody>) -> AppResult<Response> {
    if body.email.trim().is_empty() {
        return Err(AppError::user("missing_email", "Please enter your email"));
    }
    let ticket = state.activation.request_password_reset(&body.email).await?;
    let body = json!({
        "success": true,
        "message": "A reset code was sent to your email",
        "activationToken": ticket.activation_token,
        "expiresAt": ticket.expires_at,
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// Sets the new password and signs the account out everywhere.
async fn reset_password(State(state): State<AppState>, JsonBody(body): JsonBody<ResetBody>) -> AppResult<Response> {
    require_activation_fields(&body.activation_token, &body.activation_code)?;
    let user = state.activation.reset_password(&body.activation_token, &body.activation_code, &body.new_password).await?;
    state.accounts.logout(&user.id).await?;
    let cookies = clear_credential_cookies(state.config.cookie_secure);
    Ok((cookies, Json(json!({ "success": true, "message": "Password reset successfully" }))).into_response())
}

async fn get_all_users(State(state): State<AppState>, AdminUser(_admin): AdminUser) -> AppResult<Json<serde_json::Value>> {
    let users = state.accounts.list_users().await?;
    Ok(Json(json!({ "success": true, "users": users })))
}

async fn update_user_role(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    JsonBody(body): JsonBody<RoleBody>,
) -> AppResult<Json<serde_json::Value>> {
    let identity = state.accounts.update_role(&body.id, body.role).await?;
    Ok(Json(json!({ "success": true, "user": identity })))
}

async fn delete_user(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.accounts.delete_user(&id).await?;
    Ok(Json(json!({ "success": true, "message": "User deleted successfully" })))
}
