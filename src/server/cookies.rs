use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};
use crate::identity::TokenPair;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
pub const REFRESH_HEADER: &str = "x-refresh-token";

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(COOKIE).iter() {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name && !v.is_empty() { return Some(v.to_string()); }
            }
        }
    }
    None
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") { return None; }
    let token = token.trim();
    if token.is_empty() { None } else { Some(token.to_string()) }
}

/// Access credential from the `access_token` cookie, else from a bearer header.
pub fn access_credential(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, ACCESS_COOKIE).or_else(|| bearer_token(headers))
}

pub fn refresh_credential(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, REFRESH_COOKIE).or_else(|| {
        headers.get(REFRESH_HEADER).and_then(|v| v.to_str().ok()).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
    })
}

fn cookie_value(name: &str, value: &str, max_age_secs: i64, secure: bool) -> AppResult<HeaderValue> {
    let mut s = format!("{}={}; Max-Age={}; HttpOnly; SameSite=Lax; Path=/", name, value, max_age_secs.max(0));
    if secure { s.push_str("; Secure"); }
    HeaderValue::from_str(&s).map_err(|e| AppError::internal("cookie_encoding".to_string(), e.to_string()))
}

fn clear_value(name: &str, secure: bool) -> HeaderValue {
    let s = format!(
        "{}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Lax; Path=/{}",
        name,
        if secure { "; Secure" } else { "" }
    );
    HeaderValue::from_str(&s).unwrap_or_else(|_| HeaderValue::from_static("access_token=; Max-Age=0; Path=/"))
}

/// `Set-Cookie` headers carrying both credentials.
pub fn credential_cookies(tokens: &TokenPair, now: DateTime<Utc>, secure: bool) -> AppResult<HeaderMap> {
    let mut h = HeaderMap::new();
    let access_age = (tokens.access_expires_at - now).num_seconds();
    let refresh_age = (tokens.refresh_expires_at - now).num_seconds();
    h.append(SET_COOKIE, cookie_value(ACCESS_COOKIE, &tokens.access_token, access_age, secure)?);
    h.append(SET_COOKIE, cookie_value(REFRESH_COOKIE, &tokens.refresh_token, refresh_age, secure)?);
    Ok(h)
}

pub fn clear_credential_cookies(secure: bool) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.append(SET_COOKIE, clear_value(ACCESS_COOKIE, secure));
    h.append(SET_COOKIE, clear_value(REFRESH_COOKIE, secure));
    h
}
