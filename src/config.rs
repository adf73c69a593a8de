use std::{env, net::SocketAddr, str::FromStr};

use crate::error::AppError;

pub const DEFAULT_HISTORY_LIMIT: i64 = 100;
pub const DEFAULT_ROOM_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub cookie_secret: String,
    /// Allowed CORS origin for the browser frontend. `None` allows any origin.
    pub frontend_url: Option<String>,
    pub chat_history_limit: i64,
    pub chat_room_capacity: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://triptab.db".to_string());
        let listen_addr: SocketAddr = parse_var(&lookup, "APP_LISTEN_ADDR", "127.0.0.1:4000")?;

        let cookie_secret = lookup("COOKIE_SECRET")
            .unwrap_or_else(|| "change-me-triptab-session-cookie-secret".to_string());

        let frontend_url = lookup("FRONTEND_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let chat_history_limit: i64 = parse_var(
            &lookup,
            "CHAT_HISTORY_LIMIT",
            &DEFAULT_HISTORY_LIMIT.to_string(),
        )?;
        if !(1..=DEFAULT_HISTORY_LIMIT).contains(&chat_history_limit) {
            return Err(AppError::Config(format!(
                "CHAT_HISTORY_LIMIT must be between 1 and {DEFAULT_HISTORY_LIMIT}"
            )));
        }

        let chat_room_capacity: usize = parse_var(
            &lookup,
            "CHAT_ROOM_CAPACITY",
            &DEFAULT_ROOM_CAPACITY.to_string(),
        )?;
        if chat_room_capacity == 0 {
            return Err(AppError::Config(
                "CHAT_ROOM_CAPACITY must be greater than zero".into(),
            ));
        }

        Ok(Self {
            database_url,
            listen_addr,
            cookie_secret,
            frontend_url,
            chat_history_limit,
            chat_room_capacity,
        })
    }

    /// Settings for an in-memory database, used by tests and local experiments.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cookie_secret: "in-memory-cookie-secret".into(),
            frontend_url: None,
            chat_history_limit: DEFAULT_HISTORY_LIMIT,
            chat_room_capacity: DEFAULT_ROOM_CAPACITY,
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .unwrap_or_else(|| default.to_string())
        .parse()
        .map_err(|err| AppError::Config(format!("invalid {name}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    fn config_error(vars: &[(&str, &str)]) -> String {
        match load(vars) {
            Err(AppError::Config(message)) => message,
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite://triptab.db");
        assert_eq!(config.listen_addr, "127.0.0.1:4000".parse().unwrap());
        assert_eq!(config.frontend_url, None);
        assert_eq!(config.chat_history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(config.chat_room_capacity, DEFAULT_ROOM_CAPACITY);
    }

    #[test]
    fn explicit_values_are_used() {
        let config = load(&[
            ("CHAT_HISTORY_LIMIT", "25"),
            ("CHAT_ROOM_CAPACITY", "8"),
            ("FRONTEND_URL", "  "),
        ])
        .unwrap();
        assert_eq!(config.chat_history_limit, 25);
        assert_eq!(config.chat_room_capacity, 8);
        assert_eq!(config.frontend_url, None);
    }

    #[test]
    fn history_limit_outside_range_is_rejected() {
        for value in ["0", "101", "-3"] {
            let message = config_error(&[("CHAT_HISTORY_LIMIT", value)]);
            assert_eq!(message, "CHAT_HISTORY_LIMIT must be between 1 and 100");
        }
        let message = config_error(&[("CHAT_HISTORY_LIMIT", "lots")]);
        assert!(message.starts_with("invalid CHAT_HISTORY_LIMIT"), "{message}");
    }

    #[test]
    fn zero_room_capacity_is_rejected() {
        let message = config_error(&[("CHAT_ROOM_CAPACITY", "0")]);
        assert_eq!(message, "CHAT_ROOM_CAPACITY must be greater than zero");
    }

    #[test]
    fn unparsable_listen_addr_is_a_config_error() {
        let message = config_error(&[("APP_LISTEN_ADDR", "nope")]);
        assert!(message.starts_with("invalid APP_LISTEN_ADDR"), "{message}");
    }
}
