use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::lock::LockPolicy;

pub const DEFAULT_LOCK_NAME: &str = "tidemark_migration";

const ENV_LOCK_NAME: &str = "TIDEMARK_LOCK_NAME";
const ENV_LOCK_TIMEOUT_MS: &str = "TIDEMARK_LOCK_TIMEOUT_MS";
const ENV_STALE_LOCK_SECS: &str = "TIDEMARK_STALE_LOCK_SECS";
const ENV_STRICT_CHECKSUMS: &str = "TIDEMARK_STRICT_CHECKSUMS";

/// How checksum drift in applied migrations is treated before applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChecksumPolicy {
    /// Mismatches are reported by `verify_checksums` and `status` only.
    #[default]
    Advisory,
    /// `apply_pending` refuses to run while any applied migration mismatches.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    pub lock_name: String,
    pub lock_policy: LockPolicy,
    /// Age after which a table-backed lock whose holder stopped refreshing it
    /// may be reclaimed. Holders refresh before every statement, so this must
    /// exceed the longest single statement. `None` (the default) never reclaims.
    pub stale_lock_after: Option<Duration>,
    pub checksum_policy: ChecksumPolicy,
    /// Identifies this process as lock holder.
    pub owner: String,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            lock_name: DEFAULT_LOCK_NAME.to_string(),
            lock_policy: LockPolicy::FailFast,
            stale_lock_after: None,
            checksum_policy: ChecksumPolicy::Advisory,
            owner: default_owner(),
        }
    }
}

fn default_owner() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    format!(
        "pid-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    )
}

impl MigratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `TIDEMARK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`MigratorConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_LOCK_NAME) {
            config.lock_name = name;
        }
        if let Some(value) = lookup(ENV_LOCK_TIMEOUT_MS) {
            let millis = parse_number(ENV_LOCK_TIMEOUT_MS, &value)?;
            config.lock_policy = match millis {
                0 => LockPolicy::FailFast,
                ms => LockPolicy::wait(Duration::from_millis(ms)),
            };
        }
        if let Some(value) = lookup(ENV_STALE_LOCK_SECS) {
            config.stale_lock_after = match parse_number(ENV_STALE_LOCK_SECS, &value)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };
        }
        if let Some(value) = lookup(ENV_STRICT_CHECKSUMS) {
            config.checksum_policy = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => ChecksumPolicy::Strict,
                "0" | "false" | "no" | "off" | "" => ChecksumPolicy::Advisory,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: ENV_STRICT_CHECKSUMS,
                        value,
                        reason: "expected a boolean".to_string(),
                    })
                }
            };
        }

        Ok(config)
    }

    pub fn lock_name(mut self, name: impl Into<String>) -> Self {
        self.lock_name = name.into();
        self
    }

    pub fn lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    pub fn wait_for_lock(self, timeout: Duration) -> Self {
        self.lock_policy(LockPolicy::wait(timeout))
    }

    pub fn stale_lock_after(mut self, after: Option<Duration>) -> Self {
        self.stale_lock_after = after;
        self
    }

    pub fn checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum_policy = policy;
        self
    }

    pub fn strict_checksums(self) -> Self {
        self.checksum_policy(ChecksumPolicy::Strict)
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults() {
        let config = MigratorConfig::default();
        assert_eq!(config.lock_name, "tidemark_migration");
        assert_eq!(config.lock_policy, LockPolicy::FailFast);
        assert_eq!(config.stale_lock_after, None);
        assert_eq!(config.checksum_policy, ChecksumPolicy::Advisory);
    }

    #[test]
    fn owners_are_distinct() {
        assert_ne!(MigratorConfig::default().owner, MigratorConfig::default().owner);
    }

    #[test]
    fn reads_overrides() {
        let config = MigratorConfig::from_lookup(lookup(&[
            ("TIDEMARK_LOCK_NAME", "app_schema"),
            ("TIDEMARK_LOCK_TIMEOUT_MS", "5000"),
            ("TIDEMARK_STALE_LOCK_SECS", "600"),
            ("TIDEMARK_STRICT_CHECKSUMS", "true"),
        ]))
        .unwrap();

        assert_eq!(config.lock_name, "app_schema");
        assert_eq!(
            config.lock_policy,
            LockPolicy::Wait {
                timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(250),
            }
        );
        assert_eq!(config.stale_lock_after, Some(Duration::from_secs(600)));
        assert_eq!(config.checksum_policy, ChecksumPolicy::Strict);

        let config =
            MigratorConfig::from_lookup(lookup(&[("TIDEMARK_STALE_LOCK_SECS", "0")])).unwrap();
        assert_eq!(config.stale_lock_after, None);
    }

    #[test]
    fn rejects_bad_values() {
        let err = MigratorConfig::from_lookup(lookup(&[("TIDEMARK_LOCK_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { var: "TIDEMARK_LOCK_TIMEOUT_MS", .. }
        ));

        assert!(
            MigratorConfig::from_lookup(lookup(&[("TIDEMARK_STRICT_CHECKSUMS", "maybe")])).is_err()
        );
    }

    #[test]
    fn deserializes_partial_config() {
        let config: MigratorConfig =
            serde_json::from_str(r#"{"lock_name": "custom", "checksum_policy": "Strict"}"#)
                .unwrap();
        assert_eq!(config.lock_name, "custom");
        assert_eq!(config.checksum_policy, ChecksumPolicy::Strict);
        assert_eq!(config.stale_lock_after, None);
    }

    #[test]
    fn builder() {
        let config = MigratorConfig::new()
            .lock_name("other")
            .wait_for_lock(Duration::from_millis(100))
            .strict_checksums()
            .owner("worker-1");
        assert_eq!(config.owner, "worker-1");
        assert!(matches!(config.lock_policy, LockPolicy::Wait { .. }));
        assert_eq!(config.checksum_policy, ChecksumPolicy::Strict);
    }
}
