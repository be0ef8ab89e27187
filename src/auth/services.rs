//! Account-security operations: registration, login with lockout, and the
//! reset / verification token lifecycle.
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        password::PasswordHasher,
        tokens::{self, OneTimeToken, RESET_TOKEN_TTL, VERIFICATION_TOKEN_TTL},
    },
    config::LockoutPolicy,
    error::AppError,
    users::{
        model::{AccountStatus, NewUser, Role, User},
        repo::UserStore,
    },
};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_NAME_LEN: usize = 50;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Create an active `user`-role account. The password is hashed before the
/// record is first written.
pub async fn register(
    users: &dyn UserStore,
    hasher: &PasswordHasher,
    input: Registration,
) -> Result<User, AppError> {
    let name = input.name.trim().to_string();
    let email = normalize_email(&input.email);

    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "Name must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::BadRequest("Please add a valid email".into()));
    }
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if users.find_by_email(&email, None).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hasher.hash(&input.password)?;
    let user = users
        .create(NewUser {
            name,
            email,
            password_hash,
            role: Role::User,
            status: AccountStatus::Active,
        })
        .await?;

    info!(user_id = %user.id, "user registered");
    Ok(user)
}

/// Check credentials against an active account and apply the lockout policy.
///
/// Unknown email and wrong password fail identically. A locked account is
/// rejected before the password is looked at.
pub async fn authenticate(
    users: &dyn UserStore,
    hasher: &PasswordHasher,
    policy: &LockoutPolicy,
    email: &str,
    password: &str,
    now: OffsetDateTime,
) -> Result<User, AppError> {
    let email = normalize_email(email);

    let Some(user) = users.find_by_email(&email, Some(AccountStatus::Active)).await? else {
        warn!(email = %email, "login unknown or inactive email");
        return Err(AppError::InvalidCredentials);
    };

    if user.is_locked(now) {
        warn!(user_id = %user.id, "login attempt on locked account");
        return Err(AppError::AccountLocked);
    }

    if !hasher.verify(password, &user.password_hash)? {
        let attempts = users.record_failed_login(user.id, now, policy).await?;
        if attempts.lock_until.is_some() {
            warn!(
                user_id = %user.id,
                attempts = attempts.login_attempts,
                "account locked after repeated failed logins"
            );
        } else {
            warn!(user_id = %user.id, attempts = attempts.login_attempts, "login invalid password");
        }
        return Err(AppError::InvalidCredentials);
    }

    users.record_successful_login(user.id, now).await?;
    info!(user_id = %user.id, "user logged in");

    Ok(User {
        login_attempts: 0,
        lock_until: None,
        last_login: Some(now),
        ..user
    })
}

/// Store a fresh reset digest (10 minutes) and return the plaintext for delivery.
pub async fn issue_reset_token(
    users: &dyn UserStore,
    user_id: Uuid,
    now: OffsetDateTime,
) -> anyhow::Result<String> {
    let token = OneTimeToken::generate(now, RESET_TOKEN_TTL);
    users
        .set_reset_token(user_id, &token.digest, token.expires)
        .await?;
    info!(user_id = %user_id, "password reset token issued");
    Ok(token.plaintext)
}

/// Store a fresh verification digest (24 hours) and return the plaintext.
pub async fn issue_verification_token(
    users: &dyn UserStore,
    user_id: Uuid,
    now: OffsetDateTime,
) -> anyhow::Result<String> {
    let token = OneTimeToken::generate(now, VERIFICATION_TOKEN_TTL);
    users
        .set_verification_token(user_id, &token.digest, token.expires)
        .await?;
    info!(user_id = %user_id, "email verification token issued");
    Ok(token.plaintext)
}

pub async fn reset_password(
    users: &dyn UserStore,
    hasher: &PasswordHasher,
    token: &str,
    new_password: &str,
    now: OffsetDateTime,
) -> Result<User, AppError> {
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let password_hash = hasher.hash(new_password)?;
    let user = users
        .reset_password(&tokens::digest(token), &password_hash, now)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired token".into()))?;
    info!(user_id = %user.id, "password reset");
    Ok(user)
}

pub async fn verify_email(
    users: &dyn UserStore,
    token: &str,
    now: OffsetDateTime,
) -> Result<User, AppError> {
    let user = users
        .verify_email(&tokens::digest(token), now)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired token".into()))?;
    info!(user_id = %user.id, "email verified");
    Ok(user)
}
