//! Account and session handling.
//!
//! Credentials are stored as bcrypt hashes. The session is a single stored
//! pointer to the current user; logging in replaces it, logging out removes
//! it.

use anyhow::Context;
use chrono::Utc;

use crate::{db::Database, eid::Eid, errors::AppError, records::User};

pub fn signup(db: &Database, name: &str, email: &str, password: &str) -> Result<User, AppError> {
    if db.user_by_email(email)?.is_some() {
        return Err(AppError::EmailTaken);
    }

    let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .context("hashing password")
        .map_err(AppError::Other)?;

    let user = db.save_user(User {
        id: Eid::new(),
        name: name.to_string(),
        email: email.to_string(),
        password_hash,
        created_at: Utc::now(),
    })?;

    db.set_current_user(&user)?;
    log::info!("new account {} ({})", user.id, user.email);
    Ok(user)
}

/// Returns None on unknown email or wrong password; a successful login sets
/// the session pointer.
pub fn login(db: &Database, email: &str, password: &str) -> Result<Option<User>, AppError> {
    let Some(user) = db.user_by_email(email)? else {
        return Ok(None);
    };

    let valid = bcrypt::verify(password, &user.password_hash)
        .context("verifying password")
        .map_err(AppError::Other)?;

    if !valid {
        return Ok(None);
    }

    db.set_current_user(&user)?;
    Ok(Some(user))
}

pub fn logout(db: &Database) -> Result<(), AppError> {
    db.clear_current_user()?;
    Ok(())
}

pub fn current_user(db: &Database) -> Result<Option<User>, AppError> {
    Ok(db.current_user()?)
}
