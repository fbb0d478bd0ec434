use crate::error::{AppError, AppResult};

use super::principal::{Identity, Role};

/// Role gate run after authentication.
pub fn require_role(identity: &Identity, allowed: &[Role]) -> AppResult<()> {
    if allowed.contains(&identity.role) {
        return Ok(());
    }
    Err(AppError::forbidden(format!("Role: {} is not allowed to access this resource", identity.role)))
}
