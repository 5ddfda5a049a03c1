use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use bigdecimal::BigDecimal;

use crate::points::PointsPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Memory,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Ok(Backend::Postgres),
            "memory" => Ok(Backend::Memory),
            other => Err(anyhow!("unknown ledger backend {other:?}, expected postgres or memory")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_address: String,
    pub backend: Backend,
    pub database_url: Option<String>,
    pub admin_ids: HashSet<String>,
    pub policy: PointsPolicy,
    pub notify_url: Option<String>,
    pub session_ttl: Duration,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_address = var("BIND_ADDRESS").context("BIND_ADDRESS is not set")?;
        let backend = match var("LEDGER_BACKEND") {
            Some(value) => value.parse().context("invalid LEDGER_BACKEND")?,
            None => Backend::Postgres,
        };
        let database_url = var("DATABASE_URL");
        if backend == Backend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL is required for the postgres backend");
        }

        let admin_ids = var("ADMIN_IDS")
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let defaults = PointsPolicy::default();
        let policy = PointsPolicy {
            earn_rate: parsed(&var, "EARN_RATE", defaults.earn_rate)?,
            redeem_rate: parsed(&var, "REDEEM_RATE", defaults.redeem_rate)?,
            max_discount_pct: parsed::<BigDecimal>(&var, "MAX_DISCOUNT_PCT", defaults.max_discount_pct)?,
            welcome_bonus: parsed(&var, "WELCOME_BONUS", defaults.welcome_bonus)?,
            birthday_bonus: parsed(&var, "BIRTHDAY_BONUS", defaults.birthday_bonus)?,
        };
        policy.validate().map_err(|e| anyhow!("invalid loyalty settings: {e}"))?;

        let session_ttl = Duration::from_secs(parsed(&var, "SESSION_TTL_SECS", 900u64)?);

        Ok(Self {
            bind_address,
            backend,
            database_url,
            admin_ids,
            policy,
            notify_url: var("NOTIFY_URL"),
            session_ttl,
        })
    }
}

fn parsed<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {key} {value:?}: {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> anyhow::Result<Settings> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let s = settings(&[("BIND_ADDRESS", "0.0.0.0:8080"), ("LEDGER_BACKEND", "memory")]).unwrap();
        assert_eq!(s.backend, Backend::Memory);
        assert_eq!(s.policy, PointsPolicy::default());
        assert_eq!(s.session_ttl, Duration::from_secs(900));
        assert!(s.admin_ids.is_empty());
        assert!(s.notify_url.is_none());
    }

    #[test]
    fn reads_overrides() {
        let s = settings(&[
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/loyalty"),
            ("ADMIN_IDS", " 1, 2 ,,3"),
            ("EARN_RATE", "0.1"),
            ("WELCOME_BONUS", "0"),
            ("SESSION_TTL_SECS", "60"),
        ])
        .unwrap();
        assert_eq!(s.backend, Backend::Postgres);
        assert_eq!(s.admin_ids, HashSet::from(["1".into(), "2".into(), "3".into()]));
        assert_eq!(s.policy.earn_rate, BigDecimal::from_str("0.1").unwrap());
        assert_eq!(s.policy.welcome_bonus, 0);
        assert_eq!(s.session_ttl, Duration::from_secs(60));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(settings(&[("LEDGER_BACKEND", "memory")]).is_err());
        assert!(settings(&[("BIND_ADDRESS", "x")]).is_err());
        assert!(settings(&[("BIND_ADDRESS", "x"), ("LEDGER_BACKEND", "redis")]).is_err());
        let err = settings(&[
            ("BIND_ADDRESS", "x"),
            ("LEDGER_BACKEND", "memory"),
            ("MAX_DISCOUNT_PCT", "150"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("max discount"));
        assert!(settings(&[("BIND_ADDRESS", "x"), ("LEDGER_BACKEND", "memory"), ("EARN_RATE", "lots")]).is_err());
    }
}
