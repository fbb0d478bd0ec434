use anyhow::{Result, anyhow};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use once_cell::sync::Lazy;
use password_hash::{SaltString, PasswordHash};
use rand::Rng;
use regex::Regex;

use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// One-way salted hash (argon2 PHC string).
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

/// Uniformly random 4-digit code in 1000..=9999.
pub fn generate_activation_code() -> String {
    rand::thread_rng().gen_range(1000..10000).to_string()
}

// Codes are stored hashed like passwords; only the mail carries the clear value.
pub fn hash_activation_code(code: &str) -> Result<String> { hash_password(code) }

pub fn verify_activation_code(hash: &str, code: &str) -> bool { verify_password(hash, code.trim()) }

pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

/// Normalize and check an email address; returns the normalized form.
pub fn validate_email(email: &str) -> AppResult<String> {
    let e = normalize_email(email);
    let ok = EMAIL_RE.as_ref().map(|re| re.is_match(&e)).unwrap_or(false);
    if !ok { return Err(AppError::user("invalid_email", "Please enter a valid email address")); }
    Ok(e)
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::user(
            "weak_password".to_string(),
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> AppResult<String> {
    let n = name.trim();
    if n.is_empty() { return Err(AppError::user("invalid_name", "Name must not be empty")); }
    Ok(n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let h = hash_password("s3cret!").unwrap();
        assert!(h.starts_with("$argon2"));
        assert!(verify_password(&h, "s3cret!"));
        assert!(!verify_password(&h, "s3cret"));
        assert!(!verify_password("not-a-phc-string", "s3cret!"));
    }

    #[test]
    fn activation_codes_are_four_digits() {
        for _ in 0..200 {
            let c = generate_activation_code();
            assert_eq!(c.len(), 4, "code {}", c);
            let n: u32 = c.parse().unwrap();
            assert!((1000..=9999).contains(&n));
        }
    }

    #[test]
    fn activation_code_hash_tolerates_whitespace() {
        let h = hash_activation_code("4821").unwrap();
        assert!(verify_activation_code(&h, " 4821 "));
        assert!(!verify_activation_code(&h, "4822"));
    }

    #[test]
    fn email_is_normalized_and_checked() {
        assert_eq!(validate_email("  Alice@Example.COM ").unwrap(), "alice@example.com");
        assert!(validate_email("alice@example").is_err());
        assert!(validate_email("a lice@example.com").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn password_and_name_rules() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
        assert!(validate_name("   ").is_err());
        assert_eq!(validate_name(" Alice ").unwrap(), "Alice");
    }
}
