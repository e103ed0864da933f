use serde::Deserialize;

/// Verification settings for access tokens minted by the identity service.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    /// Seconds between subscription expiry sweeps, 0 disables the sweep.
    pub maintenance_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "globalpath".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "globalpath-users".into()),
        };
        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT")?,
            bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "globalpath".into()),
            access_key: std::env::var("S3_ACCESS_KEY")?,
            secret_key: std::env::var("S3_SECRET_KEY")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };
        Ok(Self {
            database_url,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            jwt,
            storage,
            maintenance_interval_secs: env_or("MAINTENANCE_INTERVAL_SECS", 3600),
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_on_missing_or_garbage() {
        std::env::set_var("GLOBALPATH_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or::<u64>("GLOBALPATH_TEST_GARBAGE", 7), 7);
        assert_eq!(env_or::<u64>("GLOBALPATH_TEST_UNSET_KEY", 42), 42);
        std::env::set_var("GLOBALPATH_TEST_NUMBER", "15");
        assert_eq!(env_or::<u32>("GLOBALPATH_TEST_NUMBER", 1), 15);
    }
}
