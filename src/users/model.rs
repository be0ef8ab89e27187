use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::LockoutPolicy;

/// Roles, declared in ascending order of privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    User,
    Author,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Author => "author",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "account_status", rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Suspended,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String, // always lowercased
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string
    pub role: Role,
    pub status: AccountStatus,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub login_attempts: i32,
    #[serde(skip_serializing)]
    pub lock_until: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub reset_password_token: Option<String>, // sha256 hex of the emailed token
    #[serde(skip_serializing)]
    pub reset_password_expire: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub email_verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub email_verification_expire: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    /// A lock in the past is treated as no lock at all.
    pub fn is_locked(&self, now: OffsetDateTime) -> bool {
        self.lock_until.map_or(false, |until| until > now)
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Fields needed to insert a user; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
}

/// Failed-login bookkeeping after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct LoginAttempts {
    pub login_attempts: i32,
    pub lock_until: Option<OffsetDateTime>,
}

impl LoginAttempts {
    /// State after one more failed attempt.
    ///
    /// An expired lock restarts the count at one. Reaching the threshold while
    /// not already locked sets a fresh lock. Stores must apply this as a
    /// single atomic update.
    pub fn after_failure(self, now: OffsetDateTime, policy: &LockoutPolicy) -> Self {
        match self.lock_until {
            Some(until) if until < now => LoginAttempts {
                login_attempts: 1,
                lock_until: None,
            },
            current => {
                let attempts = self.login_attempts + 1;
                let locked = current.map_or(false, |until| until > now);
                let lock_until = if attempts >= policy.max_attempts && !locked {
                    Some(now + policy.lock_duration())
                } else {
                    current
                };
                LoginAttempts {
                    login_attempts: attempts,
                    lock_until,
                }
            }
        }
    }
}
