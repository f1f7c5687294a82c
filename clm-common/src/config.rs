//! Config loading. Mirrors the teacher's `figment`-backed `ConfigLoader<T>`
//! pattern: a toml file provides defaults, environment variables (with a
//! fixed prefix) override them, and the whole thing is logged through
//! `SafeDisplay` rather than `Debug` so nothing sensitive leaks.

use crate::SafeDisplay;
use figment::providers::{Env, Format as _, Serialized, Toml};
use figment::Figment;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct ConfigLoader<T> {
    toml_path: PathBuf,
    env_prefix: String,
    _marker: PhantomData<T>,
}

impl<T> ConfigLoader<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    pub fn new(toml_path: &Path) -> Self {
        Self {
            toml_path: toml_path.to_path_buf(),
            env_prefix: "CLM_".to_string(),
            _marker: PhantomData,
        }
    }

    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.to_string();
        self
    }

    /// Loads `T`, layering (lowest to highest precedence): struct defaults,
    /// the toml file if present, then `CLM_`-prefixed environment variables.
    pub fn load(&self) -> Result<T, figment::Error> {
        let figment = Figment::from(Serialized::defaults(T::default()))
            .merge(Toml::file(&self.toml_path))
            .merge(Env::prefixed(&self.env_prefix).split("__"));
        figment.extract()
    }
}

/// Where the job queue store's database file lives, and which journal mode
/// to use (spec.md §4.1). `Wal` is the default for single-host runs with
/// many local writers; `Fallback` avoids shared-memory journal files for
/// writers that span filesystem boundaries (containerized workers on a host
/// that cannot trust multi-writer shared memory — notably Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    Wal,
    Fallback,
}

impl Default for JournalMode {
    fn default() -> Self {
        JournalMode::Wal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub journal_mode: JournalMode,
    /// Budget for acquiring the single-writer lock before surfacing
    /// `QueueBusyError` (spec.md §4.1, §5).
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
    /// Polling cadence used when native wakeups are unavailable for
    /// `claim_next` (spec.md §4.1). Must stay <= 1s.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("clm-build.db"),
            journal_mode: JournalMode::Wal,
            busy_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl SafeDisplay for StoreConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "db_path: {}", self.db_path.display());
        let _ = writeln!(&mut result, "journal_mode: {:?}", self.journal_mode);
        let _ = writeln!(&mut result, "busy_timeout: {:?}", self.busy_timeout);
        let _ = writeln!(&mut result, "poll_interval: {:?}", self.poll_interval);
        result
    }
}

/// Top-level engine configuration (spec.md §6 env vars, §5 concurrency
/// model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub store: StoreConfig,
    /// `MAX_CONCURRENCY`: global in-flight operation bound (spec.md §4.7).
    pub max_concurrency: usize,
    /// `MAX_WORKER_STARTUP_CONCURRENCY`: bounded fan-out for worker start
    /// (spec.md §4.4).
    pub max_worker_startup_concurrency: usize,
    pub plantuml_jar: Option<PathBuf>,
    pub drawio_executable: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub heartbeat_freshness_window: Duration,
    #[serde(with = "humantime_serde")]
    pub worker_startup_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub max_job_time: Duration,
    pub attempt_cap: u32,
    pub cache_byte_budget: u64,
    #[serde(with = "humantime_serde")]
    pub progress_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub stop_grace_window: Duration,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            max_concurrency: 50,
            max_worker_startup_concurrency: 10,
            plantuml_jar: None,
            drawio_executable: None,
            heartbeat_freshness_window: Duration::from_secs(30),
            worker_startup_timeout: Duration::from_secs(30),
            max_job_time: Duration::from_secs(600),
            attempt_cap: 2,
            cache_byte_budget: 2 * 1024 * 1024 * 1024,
            progress_interval: Duration::from_secs(1),
            stop_grace_window: Duration::from_secs(10),
            log_level: "info".to_string(),
        }
    }
}

impl SafeDisplay for EngineConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "store:");
        let _ = writeln!(&mut result, "{}", self.store.to_safe_string_indented());
        let _ = writeln!(&mut result, "max_concurrency: {}", self.max_concurrency);
        let _ = writeln!(
            &mut result,
            "max_worker_startup_concurrency: {}",
            self.max_worker_startup_concurrency
        );
        let _ = writeln!(
            &mut result,
            "plantuml_jar: {}",
            self.plantuml_jar
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string())
        );
        let _ = writeln!(
            &mut result,
            "drawio_executable: {}",
            self.drawio_executable
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string())
        );
        let _ = writeln!(
            &mut result,
            "heartbeat_freshness_window: {:?}",
            self.heartbeat_freshness_window
        );
        let _ = writeln!(
            &mut result,
            "worker_startup_timeout: {:?}",
            self.worker_startup_timeout
        );
        let _ = writeln!(&mut result, "max_job_time: {:?}", self.max_job_time);
        let _ = writeln!(&mut result, "attempt_cap: {}", self.attempt_cap);
        let _ = writeln!(
            &mut result,
            "cache_byte_budget: {}",
            self.cache_byte_budget
        );
        let _ = writeln!(&mut result, "log_level: {}", self.log_level);
        result
    }
}

pub fn make_config_loader(toml_path: &Path) -> ConfigLoader<EngineConfig> {
    ConfigLoader::new(toml_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;

    #[test]
    fn defaults_round_trip_through_figment() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("clm.toml");
        let loader: ConfigLoader<EngineConfig> = ConfigLoader::new(&toml_path);
        let loaded = loader.load().expect("defaults must be loadable");
        assert_eq!(loaded.max_concurrency, 50);
    }

    #[test]
    fn env_override_wins_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("clm.toml");
        std::env::set_var("CLM_MAX_CONCURRENCY", "7");
        let loader: ConfigLoader<EngineConfig> = ConfigLoader::new(&toml_path);
        let loaded = loader.load().expect("env override must load");
        std::env::remove_var("CLM_MAX_CONCURRENCY");
        assert_eq!(loaded.max_concurrency, 7);
    }
}
