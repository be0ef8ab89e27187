use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::LockoutPolicy;
use crate::users::model::{AccountStatus, LoginAttempts, NewUser, Role, User};
use crate::users::repo::UserStore;

/// In-process `UserStore`. Each operation runs under one lock acquisition,
/// which gives the same atomicity the SQL store gets from single statements.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_users<T>(&self, f: impl FnOnce(&mut HashMap<Uuid, User>) -> T) -> anyhow::Result<T> {
        let mut users = self
            .users
            .lock()
            .map_err(|_| anyhow!("user store mutex poisoned"))?;
        Ok(f(&mut users))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        self.with_users(|users| users.get(&id).cloned())
    }

    async fn find_by_email(
        &self,
        email: &str,
        status: Option<AccountStatus>,
    ) -> anyhow::Result<Option<User>> {
        self.with_users(|users| {
            users
                .values()
                .find(|u| u.email == email && status.map_or(true, |s| u.status == s))
                .cloned()
        })
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        self.with_users(|users| {
            if users.values().any(|u| u.email == new.email) {
                return Err(anyhow!("duplicate email {}", new.email));
            }
            let now = OffsetDateTime::now_utc();
            let user = User {
                id: Uuid::new_v4(),
                name: new.name,
                email: new.email,
                password_hash: new.password_hash,
                role: new.role,
                status: new.status,
                email_verified: false,
                login_attempts: 0,
                lock_until: None,
                last_login: None,
                reset_password_token: None,
                reset_password_expire: None,
                email_verification_token: None,
                email_verification_expire: None,
                created_at: now,
                updated_at: now,
            };
            users.insert(user.id, user.clone());
            Ok(user)
        })?
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        now: OffsetDateTime,
        policy: &LockoutPolicy,
    ) -> anyhow::Result<LoginAttempts> {
        self.with_users(|users| {
            let user = users.get_mut(&id).ok_or_else(|| anyhow!("user {id} not found"))?;
            let next = LoginAttempts {
                login_attempts: user.login_attempts,
                lock_until: user.lock_until,
            }
            .after_failure(now, policy);
            user.login_attempts = next.login_attempts;
            user.lock_until = next.lock_until;
            user.updated_at = now;
            Ok::<_, anyhow::Error>(next)
        })?
    }

    async fn record_successful_login(&self, id: Uuid, now: OffsetDateTime) -> anyhow::Result<()> {
        self.with_users(|users| {
            if let Some(user) = users.get_mut(&id) {
                user.login_attempts = 0;
                user.lock_until = None;
                user.last_login = Some(now);
                user.updated_at = now;
            }
        })
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        digest: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        self.with_users(|users| {
            if let Some(user) = users.get_mut(&id) {
                user.reset_password_token = Some(digest.to_string());
                user.reset_password_expire = Some(expires);
            }
        })
    }

    async fn set_verification_token(
        &self,
        id: Uuid,
        digest: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        self.with_users(|users| {
            if let Some(user) = users.get_mut(&id) {
                user.email_verification_token = Some(digest.to_string());
                user.email_verification_expire = Some(expires);
            }
        })
    }

    async fn reset_password(
        &self,
        digest: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        self.with_users(|users| {
            let user = users.values_mut().find(|u| {
                u.reset_password_token.as_deref() == Some(digest)
                    && u.reset_password_expire.map_or(false, |exp| exp > now)
            })?;
            user.password_hash = password_hash.to_string();
            user.reset_password_token = None;
            user.reset_password_expire = None;
            user.login_attempts = 0;
            user.lock_until = None;
            user.updated_at = now;
            Some(user.clone())
        })
    }

    async fn verify_email(
        &self,
        digest: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        self.with_users(|users| {
            let user = users.values_mut().find(|u| {
                u.email_verification_token.as_deref() == Some(digest)
                    && u.email_verification_expire.map_or(false, |exp| exp > now)
            })?;
            user.email_verified = true;
            user.email_verification_token = None;
            user.email_verification_expire = None;
            user.updated_at = now;
            Some(user.clone())
        })
    }

    async fn update_account(
        &self,
        id: Uuid,
        role: Option<Role>,
        status: Option<AccountStatus>,
    ) -> anyhow::Result<Option<User>> {
        self.with_users(|users| {
            let user = users.get_mut(&id)?;
            if let Some(role) = role {
                user.role = role;
            }
            if let Some(status) = status {
                user.status = status;
            }
            user.updated_at = OffsetDateTime::now_utc();
            Some(user.clone())
        })
    }
}
