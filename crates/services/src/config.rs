use std::path::PathBuf;

pub const DEFAULT_DB_URL: &str = "sqlite://annales-bia.sqlite3";
pub const DEFAULT_SLOTS_DIR: &str = ".annales-bia";
pub const DEFAULT_KEY_PREFIX: &str = "annales-bia-csv";

pub const DB_URL_ENV: &str = "ANNALES_DB_URL";
pub const SLOTS_DIR_ENV: &str = "ANNALES_SLOTS_DIR";

/// Where local state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `SQLite` URL of the collection store.
    pub db_url: String,
    /// Directory holding the simple-key slots.
    pub slots_dir: PathBuf,
    /// Prefix of every slot file name.
    pub key_prefix: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_url: DEFAULT_DB_URL.to_owned(),
            slots_dir: PathBuf::from(DEFAULT_SLOTS_DIR),
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `ANNALES_DB_URL` and `ANNALES_SLOTS_DIR`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`AppConfig::from_env`] with a custom variable source.
    /// Empty values are ignored.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name| lookup(name).filter(|v: &String| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(url) = var(DB_URL_ENV) {
            config.db_url = url;
        }
        if let Some(dir) = var(SLOTS_DIR_ENV) {
            config.slots_dir = PathBuf::from(dir);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_defaults() {
        let config = AppConfig::from_lookup(|name| match name {
            DB_URL_ENV => Some("sqlite::memory:".into()),
            SLOTS_DIR_ENV => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.db_url, "sqlite::memory:");
        assert_eq!(config.slots_dir, PathBuf::from(DEFAULT_SLOTS_DIR));
        assert_eq!(config.key_prefix, DEFAULT_KEY_PREFIX);
    }
}
