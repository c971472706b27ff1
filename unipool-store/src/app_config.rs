use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub booking: BookingRules,
    #[serde(default)]
    pub matching: MatchingConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

/// Default weights and limits for ride matching
#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    pub w_rating: f64,
    pub w_price: f64,
    pub w_proximity: f64,
    pub proximity_window_minutes: i64,
    pub max_results: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            w_rating: 0.3,
            w_price: 0.3,
            w_proximity: 0.4,
            proximity_window_minutes: 30,
            max_results: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    /// Attempts per seat mutation before giving up with a conflict
    #[serde(default = "default_retries")]
    pub max_conflict_retries: u32,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_retries(),
        }
    }
}

fn default_retries() -> u32 { 3 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked developer overrides
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `UNIPOOL_DATABASE__URL=postgres://...` sets `database.url`
            .add_source(config::Environment::with_prefix("UNIPOOL").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_sections_fall_back_to_defaults() {
        let s = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [server]
                port = 8080

                [database]
                url = "postgres://localhost/unipool"

                [auth]
                jwt_secret = "secret"

                [store]
                backend = "memory"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let config: Config = s.try_deserialize().unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.booking.max_conflict_retries, 3);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.matching.proximity_window_minutes, 30);
        assert!((config.matching.w_proximity - 0.4).abs() < f64::EPSILON);
    }
}
