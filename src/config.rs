use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub cookie_name: String,
}

/// Argon2 cost parameters. Raise these to slow offline guessing, lower them to bound login latency.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

/// Failed-login lockout policy.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LockoutPolicy {
    pub max_attempts: i32,
    pub lock_minutes: i64,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lock_minutes: 120,
        }
    }
}

impl LockoutPolicy {
    pub fn lock_duration(&self) -> time::Duration {
        time::Duration::minutes(self.lock_minutes)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub environment: String,
    pub cors_origin: Option<String>,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub lockout: LockoutPolicy,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "blogapi".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "blogapi-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(60 * 24 * 7),
            cookie_name: std::env::var("JWT_COOKIE_NAME").unwrap_or_else(|_| "token".into()),
        };

        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: env_parse("PASSWORD_MEMORY_KIB").unwrap_or(defaults.memory_kib),
            // fewer than two passes is not worth having
            iterations: env_parse::<u32>("PASSWORD_ITERATIONS")
                .unwrap_or(defaults.iterations)
                .max(2),
            parallelism: env_parse("PASSWORD_PARALLELISM").unwrap_or(defaults.parallelism),
        };

        let lockout_defaults = LockoutPolicy::default();
        let lockout = LockoutPolicy {
            max_attempts: env_parse("LOCKOUT_MAX_ATTEMPTS").unwrap_or(lockout_defaults.max_attempts),
            lock_minutes: env_parse("LOCKOUT_MINUTES").unwrap_or(lockout_defaults.lock_minutes),
        };

        Ok(Self {
            database_url,
            environment: std::env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            cors_origin: std::env::var("CORS_ORIGIN").ok(),
            jwt,
            password,
            lockout,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}
