use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::LockoutPolicy;
use crate::users::model::{AccountStatus, LoginAttempts, NewUser, Role, User};

/// Persistence contract for principals.
///
/// Every mutating method is a single atomic operation against the store;
/// callers never read a counter and write it back.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    /// `email` must already be lowercased. `status` narrows the match when set.
    async fn find_by_email(
        &self,
        email: &str,
        status: Option<AccountStatus>,
    ) -> anyhow::Result<Option<User>>;

    async fn create(&self, new: NewUser) -> anyhow::Result<User>;

    /// Count one failed login and lock the account once the policy threshold is hit.
    async fn record_failed_login(
        &self,
        id: Uuid,
        now: OffsetDateTime,
        policy: &LockoutPolicy,
    ) -> anyhow::Result<LoginAttempts>;

    /// Clear the counter and lock and stamp the last login.
    async fn record_successful_login(&self, id: Uuid, now: OffsetDateTime) -> anyhow::Result<()>;

    async fn set_reset_token(
        &self,
        id: Uuid,
        digest: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()>;

    async fn set_verification_token(
        &self,
        id: Uuid,
        digest: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()>;

    /// Consume an unexpired reset digest, replacing the password hash and
    /// clearing any lockout. Returns `None` when no such token is live.
    async fn reset_password(
        &self,
        digest: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>>;

    /// Consume an unexpired verification digest and mark the email verified.
    async fn verify_email(&self, digest: &str, now: OffsetDateTime)
        -> anyhow::Result<Option<User>>;

    /// Change role and/or status; `None` leaves a field untouched.
    async fn update_account(
        &self,
        id: Uuid,
        role: Option<Role>,
        status: Option<AccountStatus>,
    ) -> anyhow::Result<Option<User>>;
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, status, email_verified, \
    login_attempts, lock_until, last_login, reset_password_token, reset_password_expire, \
    email_verification_token, email_verification_expire, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(
        &self,
        email: &str,
        status: Option<AccountStatus>,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE email = $1 AND ($2::account_status IS NULL OR status = $2)
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .bind(status)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (name, email, password_hash, role, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.role)
            .bind(new.status)
            .fetch_one(&self.db)
            .await?;
        Ok(user)
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        now: OffsetDateTime,
        policy: &LockoutPolicy,
    ) -> anyhow::Result<LoginAttempts> {
        // Mirrors LoginAttempts::after_failure; SET expressions see the old row.
        let attempts = sqlx::query_as::<_, LoginAttempts>(
            r#"
            UPDATE users SET
                login_attempts = CASE
                    WHEN lock_until IS NOT NULL AND lock_until < $2 THEN 1
                    ELSE login_attempts + 1
                END,
                lock_until = CASE
                    WHEN lock_until IS NOT NULL AND lock_until < $2 THEN NULL
                    WHEN login_attempts + 1 >= $3 AND (lock_until IS NULL OR lock_until <= $2) THEN $4
                    ELSE lock_until
                END,
                updated_at = $2
            WHERE id = $1
            RETURNING login_attempts, lock_until
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(policy.max_attempts)
        .bind(now + policy.lock_duration())
        .fetch_one(&self.db)
        .await?;
        Ok(attempts)
    }

    async fn record_successful_login(&self, id: Uuid, now: OffsetDateTime) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET login_attempts = 0, lock_until = NULL, last_login = $2, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        digest: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_password_token = $2, reset_password_expire = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(digest)
        .bind(expires)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn set_verification_token(
        &self,
        id: Uuid,
        digest: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET email_verification_token = $2, email_verification_expire = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(digest)
        .bind(expires)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn reset_password(
        &self,
        digest: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users SET
                password_hash = $2,
                reset_password_token = NULL,
                reset_password_expire = NULL,
                login_attempts = 0,
                lock_until = NULL,
                updated_at = $3
            WHERE reset_password_token = $1 AND reset_password_expire > $3
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(digest)
            .bind(password_hash)
            .bind(now)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn verify_email(
        &self,
        digest: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users SET
                email_verified = TRUE,
                email_verification_token = NULL,
                email_verification_expire = NULL,
                updated_at = $2
            WHERE email_verification_token = $1 AND email_verification_expire > $2
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(digest)
            .bind(now)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn update_account(
        &self,
        id: Uuid,
        role: Option<Role>,
        status: Option<AccountStatus>,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users SET
                role = COALESCE($2, role),
                status = COALESCE($3, status),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(role)
            .bind(status)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }
}
