use anyhow::{Result, anyhow};
use config::{Config, Environment};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    pub secret: String,
    /// Token lifetime in seconds
    pub expiration_seconds: i64,
    pub issuer: String,
}

/// Runtime settings, read from `CHRONA_*` environment variables.
///
/// Nested keys use a double underscore, e.g. `CHRONA_JWT__SECRET`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub database_admin_url: Option<String>,
    pub max_connections: u32,
    pub jwt: JwtSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let settings = Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8080)?
            .set_default("storage", "postgres")?
            .set_default("max_connections", 5)?
            .set_default("jwt.expiration_seconds", 86400)?
            .set_default("jwt.issuer", "chrona")?
            .add_source(
                Environment::with_prefix("CHRONA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt.secret.trim().is_empty() {
            return Err(anyhow!("CHRONA_JWT__SECRET must be set"));
        }
        if self.storage == StorageBackend::Postgres && self.database_url.is_none() {
            return Err(anyhow!("CHRONA_DATABASE_URL must be set for postgres storage"));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Migrations run over the admin URL, falling back to the application URL
    pub fn migration_url(&self) -> Option<&str> {
        self.database_admin_url
            .as_deref()
            .or(self.database_url.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(storage: StorageBackend, database_url: Option<&str>) -> AppConfig {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            storage,
            database_url: database_url.map(str::to_string),
            database_admin_url: None,
            max_connections: 5,
            jwt: JwtSettings {
                secret: "secret".to_string(),
                expiration_seconds: 3600,
                issuer: "chrona".to_string(),
            },
        }
    }

    #[test]
    fn test_postgres_requires_database_url() {
        assert!(config(StorageBackend::Postgres, None).validate().is_err());
        assert!(config(StorageBackend::Memory, None).validate().is_ok());
    }

    #[test]
    fn test_migration_url_falls_back_to_database_url() {
        let config = config(StorageBackend::Postgres, Some("postgres://app@localhost/chrona"));
        assert_eq!(config.migration_url(), Some("postgres://app@localhost/chrona"));
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
    }
}
