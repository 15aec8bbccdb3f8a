use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
    /// Refresh lifetime when the client logs in with `remember_me`.
    pub remember_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    pub expire_minutes: i64,
    pub max_attempts: u32,
    pub resend_cooldown_seconds: i64,
    pub rate_limit_per_hour: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub debug: bool,
    pub database_url: String,
    pub password_min_length: usize,
    pub jwt: JwtConfig,
    pub otp: OtpConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let secret = std::env::var("JWT_SECRET")?;
        anyhow::ensure!(
            secret.len() >= 32,
            "JWT_SECRET must be at least 32 characters"
        );
        let jwt = JwtConfig {
            secret,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "caregate".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "caregate-clients".into()),
            access_ttl_minutes: env_parse("JWT_ACCESS_TTL_MINUTES", 15),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 7),
            remember_ttl_minutes: env_parse("JWT_REMEMBER_TTL_MINUTES", 60 * 24 * 30),
        };
        let otp = OtpConfig {
            expire_minutes: env_parse("OTP_EXPIRE_MINUTES", 5),
            max_attempts: env_parse("OTP_MAX_ATTEMPTS", 5),
            resend_cooldown_seconds: env_parse("OTP_RESEND_COOLDOWN_SECONDS", 60),
            rate_limit_per_hour: env_parse("OTP_RATE_LIMIT_PER_HOUR", 5),
        };
        Ok(Self {
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "caregate".into()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            debug: env_parse("DEBUG", false),
            database_url,
            password_min_length: env_parse("PASSWORD_MIN_LENGTH", 8),
            jwt,
            otp,
        })
    }
}
