use axum::http::HeaderValue;

const DEFAULT_TABLE: &str = "todos";
const DEFAULT_ORIGIN: &str = "https://clario-frontend.onrender.com";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub table: String,
    pub allowed_origin: HeaderValue,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let supabase_url = require("SUPABASE_URL")?;
        let supabase_anon_key = require("SUPABASE_ANON_KEY")?;
        let table = get("SUPABASE_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());

        let origin = get("ALLOWED_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let allowed_origin = HeaderValue::from_str(&origin).map_err(|_| ConfigError::Invalid {
            key: "ALLOWED_ORIGIN",
            value: origin.clone(),
        })?;

        let port = match get("PORT") {
            Some(port) => port.parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: port,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Config {
            supabase_url,
            supabase_anon_key,
            table,
            allowed_origin,
            port,
        })
    }
}
