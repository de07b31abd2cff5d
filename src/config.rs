use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::constants::DEFAULT_DOMAIN;
use crate::logging::LogConfig;
use crate::store::BackendKind;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub cors_origin: String,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub data_file_path: String,
    pub sqlite_path: String,
    pub sled_path: String,
    pub default_domain: String,
    pub seed_sample_data: bool,
    /// overwrite 导入时是否同时清空预设领域
    pub import_overwrite_clears_domains: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:3000"),
            storage: StorageConfig {
                backend: env_or_parse("STORAGE_BACKEND", BackendKind::Embedded),
                data_file_path: env_or("DATA_FILE_PATH", "./data/flashcards-data.json"),
                sqlite_path: env_or("SQLITE_PATH", "./data/flashcards.sqlite3"),
                sled_path: env_or("SLED_PATH", "./data/flashcards.sled"),
                default_domain: env_or_nonblank("DEFAULT_DOMAIN", DEFAULT_DOMAIN),
                seed_sample_data: env_or_bool("SEED_SAMPLE_DATA", true),
                import_overwrite_clears_domains: env_or_bool(
                    "IMPORT_OVERWRITE_CLEARS_DOMAINS",
                    false,
                ),
            },
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            log_level: self.log_level.clone(),
            enable_file_logs: self.enable_file_logs,
            log_dir: self.log_dir.clone(),
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_nonblank(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
        _ => default.to_string(),
    }
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "HOST",
            "PORT",
            "RUST_LOG",
            "STORAGE_BACKEND",
            "DEFAULT_DOMAIN",
            "SEED_SAMPLE_DATA",
            "IMPORT_OVERWRITE_CLEARS_DOMAINS",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.storage.backend, BackendKind::Embedded);
        assert_eq!(cfg.storage.default_domain, "通用");
        assert!(cfg.storage.seed_sample_data);
        assert!(!cfg.storage.import_overwrite_clears_domains);
    }

    #[test]
    fn parses_backend_and_numbers() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "4000");
        env::set_var("STORAGE_BACKEND", "SQL");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.storage.backend, BackendKind::Sql);
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "bad");
        env::set_var("STORAGE_BACKEND", "postgres");
        env::set_var("DEFAULT_DOMAIN", "   ");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.storage.backend, BackendKind::Embedded);
        assert_eq!(cfg.storage.default_domain, "通用");
    }

    #[test]
    fn feature_flags_isolation() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("SEED_SAMPLE_DATA", "off");
        env::set_var("IMPORT_OVERWRITE_CLEARS_DOMAINS", "1");

        let cfg = Config::from_env();
        assert!(!cfg.storage.seed_sample_data);
        assert!(cfg.storage.import_overwrite_clears_domains);
    }
}
