//! Environment-driven runtime configuration.

/// Runtime configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Listen endpoint (`ADDR`).
    pub addr: String,
    /// SQLite database path (`DB_PATH`).
    pub db_path: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            db_path: "asd.db".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Read `ADDR` and `DB_PATH` from the environment, keeping defaults for
    /// anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            addr: env_or("ADDR", &defaults.addr),
            db_path: env_or("DB_PATH", &defaults.db_path),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.addr, "127.0.0.1:8080");
        assert_eq!(config.db_path, "asd.db");
    }
}
