//! # Auth gate and credential rules
//!
//! Pure checks. Hashing and token signing live behind [`crate::AuthProvider`].

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Role, Session};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Fails with [`AppError::AuthenticationRequired`] when nobody is logged in.
pub fn require_session(session: Option<&Session>) -> Result<&Session> {
    session.ok_or(AppError::AuthenticationRequired)
}

/// True iff the session owns the resource or holds the admin role.
pub fn require_owner_or_admin(resource_author_id: Uuid, session: &Session) -> bool {
    session.user_id == resource_author_id || session.role == Role::Admin
}

/// Registration input rules. Lengths are counted in characters.
pub fn validate_registration(username: &str, password: &str) -> Result<()> {
    if username.is_empty() || password.is_empty() {
        return Err(AppError::validation("username and password are required"));
    }
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(AppError::validation(format!(
            "username must be at least {MIN_USERNAME_LEN} characters"
        )));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
