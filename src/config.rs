use log::warn;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_DATA_DIR: &str = "database";
pub const DEFAULT_JWT_SECRET: &str = "replace_this_with_a_secure_secret";
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 7 * 24;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_CLIENT_HOME: &str = ".excel-analytics";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding `users.json` and `uploads.json`
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let config = Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT", defaults.port),
            data_dir: lookup("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            jwt_secret: lookup("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            token_ttl_hours: parsed(&lookup, "TOKEN_TTL_HOURS", defaults.token_ttl_hours),
        };

        if config.jwt_secret == DEFAULT_JWT_SECRET {
            warn!("JWT_SECRET is not set; tokens are signed with the built-in development secret");
        }
        config
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_url: String,
    /// Directory used as durable local storage
    pub home: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            home: PathBuf::from(DEFAULT_CLIENT_HOME),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_url: lookup("EXCEL_ANALYTICS_API").unwrap_or(defaults.api_url),
            home: lookup("EXCEL_ANALYTICS_HOME")
                .map(PathBuf::from)
                .unwrap_or(defaults.home),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn server_defaults() {
        let config = ServerConfig::from_lookup(env(&[]));
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
        assert_eq!(config.token_ttl_hours, 168);
    }

    #[test]
    fn server_overrides_and_bad_numbers() {
        let config = ServerConfig::from_lookup(env(&[
            ("PORT", "8080"),
            ("DATA_DIR", "/tmp/db"),
            ("TOKEN_TTL_HOURS", "soon"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/db"));
        assert_eq!(config.token_ttl_hours, DEFAULT_TOKEN_TTL_HOURS);
    }

    #[test]
    fn client_overrides() {
        let config = ClientConfig::from_lookup(env(&[("EXCEL_ANALYTICS_API", "http://api:9000")]));
        assert_eq!(config.api_url, "http://api:9000");
        assert_eq!(config.home, PathBuf::from(DEFAULT_CLIENT_HOME));
    }
}
