use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::clock::UsageCalendar;
use crate::gate::DEFAULT_RESERVATION_TTL_SECS;
use crate::policy::{OperationClass, TierCeilings, TierPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Sqlite,
    Memory,
}

impl FromStr for LedgerBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(LedgerBackend::Sqlite),
            "memory" => Ok(LedgerBackend::Memory),
            other => anyhow::bail!("unknown ledger backend {other}"),
        }
    }
}

impl fmt::Display for LedgerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerBackend::Sqlite => f.write_str("sqlite"),
            LedgerBackend::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub server_host: String,
    pub server_port: u16,
    pub data_dir: PathBuf,
    pub ledger_backend: LedgerBackend,
    pub accounts_db_path: Option<PathBuf>,
    pub tier_policy: TierPolicy,
    pub day_boundary_offset_minutes: i32,
    pub reservation_ttl_secs: u64,
    pub reconcile_interval_secs: u64,
    pub enable_reconciliation: bool,
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8184,
            data_dir: PathBuf::from("data/quota"),
            ledger_backend: LedgerBackend::Sqlite,
            accounts_db_path: None,
            tier_policy: TierPolicy::default(),
            day_boundary_offset_minutes: 0,
            reservation_ttl_secs: DEFAULT_RESERVATION_TTL_SECS,
            reconcile_interval_secs: 60,
            enable_reconciliation: true,
            request_timeout_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

impl GateConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(host) = lookup("GATE_HOST") {
            cfg.server_host = host;
        }
        if let Some(port) = lookup("GATE_PORT") {
            cfg.server_port = port.parse().context("GATE_PORT must be a valid u16")?;
        }
        if let Some(dir) = lookup("GATE_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup("LEDGER_BACKEND") {
            cfg.ledger_backend = backend
                .parse()
                .context("LEDGER_BACKEND must be `sqlite` or `memory`")?;
        }
        if let Some(path) = lookup("ACCOUNTS_DB_PATH") {
            cfg.accounts_db_path = Some(PathBuf::from(path));
        }

        let mut defaults = TierCeilings::default();
        if let Some(limit) = lookup("FREE_DAILY_LIMIT") {
            defaults.free = limit
                .parse()
                .context("FREE_DAILY_LIMIT must be a non-negative integer")?;
        }
        if let Some(limit) = lookup("PRIVILEGED_DAILY_LIMIT") {
            defaults.privileged = limit
                .parse()
                .context("PRIVILEGED_DAILY_LIMIT must be a non-negative integer")?;
        }
        let mut policy = TierPolicy::new(defaults);
        for operation in OperationClass::ALL {
            let prefix = operation.env_prefix();
            let free_key = format!("{prefix}_FREE_DAILY_LIMIT");
            let privileged_key = format!("{prefix}_PRIVILEGED_DAILY_LIMIT");
            let free = lookup(&free_key);
            let privileged = lookup(&privileged_key);
            if free.is_none() && privileged.is_none() {
                continue;
            }

            let mut ceilings = defaults;
            if let Some(limit) = free {
                ceilings.free = limit
                    .parse()
                    .with_context(|| format!("{free_key} must be a non-negative integer"))?;
            }
            if let Some(limit) = privileged {
                ceilings.privileged = limit
                    .parse()
                    .with_context(|| format!("{privileged_key} must be a non-negative integer"))?;
            }
            policy.set_class(operation, ceilings);
        }
        cfg.tier_policy = policy;

        if let Some(offset) = lookup("DAY_BOUNDARY_UTC_OFFSET_MINUTES") {
            cfg.day_boundary_offset_minutes = offset
                .parse()
                .context("DAY_BOUNDARY_UTC_OFFSET_MINUTES must be an integer")?;
        }
        if let Some(ttl) = lookup("RESERVATION_TTL_SECS") {
            cfg.reservation_ttl_secs = ttl
                .parse()
                .context("RESERVATION_TTL_SECS must be a positive integer")?;
        }
        if let Some(interval) = lookup("RECONCILE_INTERVAL_SECS") {
            cfg.reconcile_interval_secs = interval
                .parse()
                .context("RECONCILE_INTERVAL_SECS must be a positive integer")?;
        }
        if let Some(flag) = lookup("ENABLE_RECONCILIATION") {
            cfg.enable_reconciliation = parse_bool(&flag)
                .with_context(|| format!("ENABLE_RECONCILIATION is invalid: {flag}"))?;
        }
        if let Some(timeout) = lookup("REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout_secs = timeout
                .parse()
                .context("REQUEST_TIMEOUT_SECS must be a positive integer")?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledger_backend == LedgerBackend::Sqlite {
            ensure_directory(&self.data_dir)?;
        }

        if let Some(path) = &self.accounts_db_path {
            if !path.is_file() {
                anyhow::bail!("ACCOUNTS_DB_PATH {} is not a file", path.display());
            }
        }
        if UsageCalendar::with_offset_minutes(self.day_boundary_offset_minutes).is_none() {
            anyhow::bail!("DAY_BOUNDARY_UTC_OFFSET_MINUTES must be within one day of UTC");
        }
        if self.reservation_ttl_secs == 0 {
            anyhow::bail!("RESERVATION_TTL_SECS must be greater than zero");
        }
        if self.reconcile_interval_secs == 0 {
            anyhow::bail!("RECONCILE_INTERVAL_SECS must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        Ok(())
    }

    pub fn calendar(&self) -> Result<UsageCalendar> {
        UsageCalendar::with_offset_minutes(self.day_boundary_offset_minutes).with_context(|| {
            format!(
                "invalid day boundary offset {} minutes",
                self.day_boundary_offset_minutes
            )
        })
    }

    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.reservation_ttl_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("{} exists but is not a directory", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("unable to create data directory {}", path.display()))?;
    }
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => anyhow::bail!("invalid boolean value {value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_free_and_privileged_constants() {
        let cfg = GateConfig::from_lookup(lookup_from(&[("LEDGER_BACKEND", "memory")])).unwrap();
        let ceilings = cfg.tier_policy.ceilings_for(OperationClass::Report);
        assert_eq!(ceilings.free, 3);
        assert_eq!(ceilings.privileged, 50);
        assert_eq!(cfg.ledger_backend, LedgerBackend::Memory);
        assert_eq!(cfg.listen_addr(), "127.0.0.1:8184");
    }

    #[test]
    fn per_class_limits_inherit_unset_tier_from_global() {
        let cfg = GateConfig::from_lookup(lookup_from(&[
            ("LEDGER_BACKEND", "memory"),
            ("FREE_DAILY_LIMIT", "5"),
            ("PRIVILEGED_DAILY_LIMIT", "200"),
            ("REPORT_PRIVILEGED_DAILY_LIMIT", "50"),
        ]))
        .unwrap();

        let report = cfg.tier_policy.ceilings_for(OperationClass::Report);
        assert_eq!(report.free, 5);
        assert_eq!(report.privileged, 50);

        let cover = cfg.tier_policy.ceilings_for(OperationClass::CoverLetter);
        assert_eq!(cover.free, 5);
        assert_eq!(cover.privileged, 200);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(GateConfig::from_lookup(lookup_from(&[
            ("LEDGER_BACKEND", "memory"),
            ("FREE_DAILY_LIMIT", "-1"),
        ]))
        .is_err());
        assert!(GateConfig::from_lookup(lookup_from(&[("LEDGER_BACKEND", "redis")])).is_err());
        assert!(GateConfig::from_lookup(lookup_from(&[
            ("LEDGER_BACKEND", "memory"),
            ("DAY_BOUNDARY_UTC_OFFSET_MINUTES", "1440"),
        ]))
        .is_err());
        assert!(GateConfig::from_lookup(lookup_from(&[
            ("LEDGER_BACKEND", "memory"),
            ("ENABLE_RECONCILIATION", "maybe"),
        ]))
        .is_err());
    }

    #[test]
    fn test_config_validation() {
        let temp = tempdir().unwrap();
        let mut config = GateConfig {
            data_dir: temp.path().join("ledger"),
            ..GateConfig::default()
        };

        assert!(config.validate().is_ok());
        assert!(config.data_dir.is_dir());

        config.reservation_ttl_secs = 0;
        assert!(config.validate().is_err());
        config.reservation_ttl_secs = 60;

        config.accounts_db_path = Some(temp.path().join("missing.db"));
        assert!(config.validate().is_err());
        config.accounts_db_path = None;

        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("YES").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("sometimes").is_err());
    }
}
