//! Configuration: data directory layout and the per-request time budget policy.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Paths to all Deskline data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Record store directory (`data/db/`).
    pub db: PathBuf,
    /// Generative backend configuration (`data/llm-config.json`).
    pub llm_config_file: PathBuf,
    /// Budget policy overrides (`data/budget.json`).
    pub budget_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            db: root.join("db"),
            llm_config_file: root.join("llm-config.json"),
            budget_file: root.join("budget.json"),
            root,
        };
        std::fs::create_dir_all(&paths.db)?;
        Ok(paths)
    }
}

/// Wall-clock policy for answering one query.
///
/// All values are milliseconds. Thresholds are compared against the budget
/// left *after* lookup and correction have finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetPolicy {
    /// Total allowance for one request.
    pub total_budget_ms: u64,
    /// Minimum remaining budget for the full generative tier.
    pub full_tier_ms: u64,
    /// Minimum remaining budget for the quick generative tier.
    pub quick_tier_ms: u64,
    /// Upper bound on the correction advisor call.
    pub corrector_cap_ms: u64,
    /// Budget held back for response generation while correcting.
    pub response_reserve_ms: u64,
    /// Upper bound on a single record store call.
    pub store_timeout_ms: u64,
    pub store_margin_ms: u64,
    pub correction_margin_ms: u64,
    pub generation_margin_ms: u64,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            total_budget_ms: 4500,
            full_tier_ms: 2800,
            quick_tier_ms: 1500,
            corrector_cap_ms: 1500,
            response_reserve_ms: 1600,
            store_timeout_ms: 400,
            store_margin_ms: 50,
            correction_margin_ms: 150,
            generation_margin_ms: 200,
        }
    }
}

impl BudgetPolicy {
    /// Load the policy from a JSON file, then apply `DESKLINE_*` env overrides.
    ///
    /// A missing or unreadable file falls back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`BudgetPolicy::load`] with overrides read through `lookup`.
    pub fn load_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut policy: BudgetPolicy = match std::fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s)?,
            Err(_) => BudgetPolicy::default(),
        };
        policy.apply_overrides(lookup);
        policy.validate()?;
        Ok(policy)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fields: [(&str, &mut u64); 9] = [
            ("DESKLINE_TOTAL_BUDGET_MS", &mut self.total_budget_ms),
            ("DESKLINE_FULL_TIER_MS", &mut self.full_tier_ms),
            ("DESKLINE_QUICK_TIER_MS", &mut self.quick_tier_ms),
            ("DESKLINE_CORRECTOR_CAP_MS", &mut self.corrector_cap_ms),
            ("DESKLINE_RESPONSE_RESERVE_MS", &mut self.response_reserve_ms),
            ("DESKLINE_STORE_TIMEOUT_MS", &mut self.store_timeout_ms),
            ("DESKLINE_STORE_MARGIN_MS", &mut self.store_margin_ms),
            ("DESKLINE_CORRECTION_MARGIN_MS", &mut self.correction_margin_ms),
            ("DESKLINE_GENERATION_MARGIN_MS", &mut self.generation_margin_ms),
        ];
        for (key, slot) in fields {
            if let Some(raw) = lookup(key) {
                match raw.trim().parse() {
                    Ok(value) => *slot = value,
                    Err(_) => warn!("Ignoring {}={:?}: not a millisecond count", key, raw),
                }
            }
        }
    }

    /// Reject policies whose tiers can never be reached in order.
    pub fn validate(&self) -> Result<()> {
        if self.total_budget_ms == 0 {
            return Err(Error::Config("total_budget_ms must be positive".into()));
        }
        if self.quick_tier_ms > self.full_tier_ms {
            return Err(Error::Config(format!(
                "quick_tier_ms ({}) exceeds full_tier_ms ({})",
                self.quick_tier_ms, self.full_tier_ms
            )));
        }
        if self.full_tier_ms > self.total_budget_ms {
            return Err(Error::Config(format!(
                "full_tier_ms ({}) exceeds total_budget_ms ({})",
                self.full_tier_ms, self.total_budget_ms
            )));
        }
        Ok(())
    }

    pub fn total_budget(&self) -> Duration {
        Duration::from_millis(self.total_budget_ms)
    }

    pub fn full_tier(&self) -> Duration {
        Duration::from_millis(self.full_tier_ms)
    }

    pub fn quick_tier(&self) -> Duration {
        Duration::from_millis(self.quick_tier_ms)
    }

    pub fn corrector_cap(&self) -> Duration {
        Duration::from_millis(self.corrector_cap_ms)
    }

    pub fn response_reserve(&self) -> Duration {
        Duration::from_millis(self.response_reserve_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn store_margin(&self) -> Duration {
        Duration::from_millis(self.store_margin_ms)
    }

    pub fn correction_margin(&self) -> Duration {
        Duration::from_millis(self.correction_margin_ms)
    }

    pub fn generation_margin(&self) -> Duration {
        Duration::from_millis(self.generation_margin_ms)
    }
}

/// Top-level Deskline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Per-request time budget.
    pub budget: BudgetPolicy,
}

impl DeskConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3010);

        let data_paths = DataPaths::new(data_dir)?;
        let budget = BudgetPolicy::load(&data_paths.budget_file)?;

        info!(
            "Budget policy: total={}ms full>={}ms quick>={}ms",
            budget.total_budget_ms, budget.full_tier_ms, budget.quick_tier_ms
        );

        Ok(Self {
            port,
            data_paths,
            budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = BudgetPolicy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.full_tier_ms, 2800);
        assert_eq!(policy.quick_tier_ms, 1500);
    }

    #[test]
    fn test_inverted_tiers_rejected() {
        let policy = BudgetPolicy {
            full_tier_ms: 1000,
            quick_tier_ms: 2000,
            ..Default::default()
        };
        assert!(matches!(policy.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_total_rejected() {
        let policy = BudgetPolicy {
            total_budget_ms: 0,
            full_tier_ms: 0,
            quick_tier_ms: 0,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("budget.json");
        std::fs::write(&path, r#"{"total_budget_ms": 6000}"#).unwrap();

        let policy = BudgetPolicy::load_with(&path, no_env).unwrap();
        assert_eq!(policy.total_budget_ms, 6000);
        assert_eq!(policy.full_tier_ms, 2800);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path()).unwrap();
        assert!(paths.db.exists());
        assert!(!paths.budget_file.exists());

        let policy = BudgetPolicy::load_with(&paths.budget_file, no_env).unwrap();
        assert_eq!(policy, BudgetPolicy::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("budget.json");
        std::fs::write(&path, r#"{"total_budget_ms": 6000, "full_tier_ms": 3000}"#).unwrap();

        let policy = BudgetPolicy::load_with(
            &path,
            env(&[
                ("DESKLINE_FULL_TIER_MS", "3500"),
                ("DESKLINE_QUICK_TIER_MS", " 1200 "),
                ("DESKLINE_STORE_TIMEOUT_MS", "soon"),
            ]),
        )
        .unwrap();
        assert_eq!(policy.total_budget_ms, 6000);
        assert_eq!(policy.full_tier_ms, 3500);
        assert_eq!(policy.quick_tier_ms, 1200);
        assert_eq!(policy.store_timeout_ms, 400);
    }

    #[test]
    fn test_load_rejects_invalid_combination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("budget.json");
        std::fs::write(&path, r#"{"total_budget_ms": 2000}"#).unwrap();
        assert!(matches!(
            BudgetPolicy::load_with(&path, no_env),
            Err(Error::Config(_))
        ));

        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(
            BudgetPolicy::load_with(&path, env(&[("DESKLINE_QUICK_TIER_MS", "3000")])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("budget.json");
        std::fs::write(&path, "{total: soon").unwrap();
        assert!(matches!(
            BudgetPolicy::load_with(&path, no_env),
            Err(Error::Json(_))
        ));
    }
}
