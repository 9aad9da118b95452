use crate::error::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
        }
    }
}

fn default_environment() -> String {
    "development".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Origins allowed by CORS; empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Without a database section the API serves from the in-memory store.
    #[serde(default)]
    pub db: Option<DbConfig>,
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self> {
        // Load base config from `config/default.(toml|yaml|json)` relative to the
        // current working directory, then override with `CRYPTOBOT__...` variables.
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("CRYPTOBOT").separator("__"))
            .build()?;

        settings.try_deserialize().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(src: &str) -> DashboardConfig {
        config::Config::builder()
            .add_source(config::File::from_str(src, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn empty_source_uses_defaults_and_memory_store() {
        let cfg = from_toml("");
        assert_eq!(cfg.api.bind_addr, "0.0.0.0:5000");
        assert_eq!(cfg.runtime.environment, "development");
        assert!(cfg.db.is_none());
    }

    #[test]
    fn db_section_enables_postgres() {
        let cfg = from_toml(
            r#"
            [api]
            bind_addr = "127.0.0.1:8080"

            [db]
            url = "postgres://localhost/cryptobot"
            "#,
        );
        assert_eq!(cfg.api.bind_addr, "127.0.0.1:8080");
        let db = cfg.db.unwrap();
        assert_eq!(db.url, "postgres://localhost/cryptobot");
        assert_eq!(db.max_connections, 5);
    }
}
