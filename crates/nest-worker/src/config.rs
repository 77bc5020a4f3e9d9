//! Process-wide configuration, loaded once from the environment at
//! startup. Mirrors the original worker's `os.environ.get(...)` reads,
//! generalized to the trait-based store names while keeping the
//! `SUPABASE_*` names as accepted aliases, since spec §6 names them
//! explicitly as the external contract.

use std::env;

use crate::error::WorkerError;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_TEMP_DIR: &str = "/tmp/nest-work";
const DEFAULT_STORAGE_BUCKET: &str = "pdm-files";

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub object_store_base_url: String,
    pub object_store_token: String,
    pub poll_interval_secs: u64,
    pub temp_dir: String,
    pub storage_bucket: String,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, WorkerError> {
        let database_url = first_present(&["DATABASE_URL", "SUPABASE_URL"])
            .ok_or_else(|| WorkerError::ConfigError("DATABASE_URL (or SUPABASE_URL) must be set".into()))?;

        let object_store_base_url = first_present(&["OBJECT_STORE_BASE_URL", "SUPABASE_URL"])
            .ok_or_else(|| {
                WorkerError::ConfigError("OBJECT_STORE_BASE_URL (or SUPABASE_URL) must be set".into())
            })?;

        let object_store_token = first_present(&["OBJECT_STORE_TOKEN", "SUPABASE_SERVICE_KEY"])
            .ok_or_else(|| {
                WorkerError::ConfigError(
                    "OBJECT_STORE_TOKEN (or SUPABASE_SERVICE_KEY) must be set".into(),
                )
            })?;

        let poll_interval_secs = env::var("POLL_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

        let temp_dir = env::var("TEMP_DIR").unwrap_or_else(|_| DEFAULT_TEMP_DIR.to_string());
        let storage_bucket =
            env::var("STORAGE_BUCKET").unwrap_or_else(|_| DEFAULT_STORAGE_BUCKET.to_string());

        Ok(Self {
            database_url,
            object_store_base_url,
            object_store_token,
            poll_interval_secs,
            temp_dir,
            storage_bucket,
        })
    }
}

fn first_present(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| env::var(name).ok().filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for name in [
            "DATABASE_URL",
            "SUPABASE_URL",
            "OBJECT_STORE_BASE_URL",
            "OBJECT_STORE_TOKEN",
            "SUPABASE_SERVICE_KEY",
            "POLL_INTERVAL",
            "TEMP_DIR",
            "STORAGE_BUCKET",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_missing_database_url_is_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let result = WorkerConfig::from_env();
        assert!(matches!(result, Err(WorkerError::ConfigError(_))));
    }

    #[test]
    fn test_supabase_aliases_satisfy_all_three() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        env::set_var("SUPABASE_URL", "postgres://example");
        env::set_var("SUPABASE_SERVICE_KEY", "secret");
        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.database_url, "postgres://example");
        assert_eq!(config.object_store_base_url, "postgres://example");
        assert_eq!(config.object_store_token, "secret");
        assert_eq!(config.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(config.temp_dir, DEFAULT_TEMP_DIR);
        assert_eq!(config.storage_bucket, DEFAULT_STORAGE_BUCKET);
        clear_all();
    }

    #[test]
    fn test_explicit_names_take_precedence_over_aliases() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        env::set_var("DATABASE_URL", "postgres://explicit");
        env::set_var("OBJECT_STORE_BASE_URL", "https://store.example");
        env::set_var("OBJECT_STORE_TOKEN", "tok");
        env::set_var("POLL_INTERVAL", "30");
        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.database_url, "postgres://explicit");
        assert_eq!(config.object_store_base_url, "https://store.example");
        assert_eq!(config.poll_interval_secs, 30);
        clear_all();
    }
}
