use crate::writer::WritePolicy;
use anyhow::{anyhow, Context};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub write_policy: WritePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            log_filter: "info".to_string(),
            write_policy: WritePolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let workspace = lookup("GRADEBOOKD_WORKSPACE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let log_filter = lookup("GRADEBOOKD_LOG")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.log_filter);

        let base = defaults.write_policy;
        let flush_delay = parse_var(&lookup, "GRADEBOOKD_FLUSH_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(base.flush_delay);
        let max_attempts = parse_var::<u32, _>(&lookup, "GRADEBOOKD_WRITE_RETRIES")?
            .unwrap_or(base.max_attempts);
        if max_attempts == 0 {
            return Err(anyhow!("GRADEBOOKD_WRITE_RETRIES must be at least 1"));
        }
        let backoff_base = parse_var(&lookup, "GRADEBOOKD_RETRY_BACKOFF_MS")?
            .map(Duration::from_millis)
            .unwrap_or(base.backoff_base);

        Ok(Self {
            workspace,
            log_filter,
            write_policy: WritePolicy {
                flush_delay,
                max_attempts,
                backoff_base,
            },
        })
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid value for {}: {:?}", name, raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::from_lookup(lookup(&[])).expect("config");
        assert!(cfg.workspace.is_none());
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.write_policy, WritePolicy::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = Config::from_lookup(lookup(&[
            ("GRADEBOOKD_WORKSPACE", "/tmp/ws"),
            ("GRADEBOOKD_LOG", "gradebookd=debug"),
            ("GRADEBOOKD_FLUSH_DELAY_MS", "50"),
            ("GRADEBOOKD_WRITE_RETRIES", "5"),
            ("GRADEBOOKD_RETRY_BACKOFF_MS", "0"),
        ]))
        .expect("config");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cfg.log_filter, "gradebookd=debug");
        assert_eq!(cfg.write_policy.flush_delay, Duration::from_millis(50));
        assert_eq!(cfg.write_policy.max_attempts, 5);
        assert_eq!(cfg.write_policy.backoff_base, Duration::ZERO);
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let e = Config::from_lookup(lookup(&[("GRADEBOOKD_FLUSH_DELAY_MS", "soon")]))
            .expect_err("invalid");
        assert!(format!("{e:#}").contains("GRADEBOOKD_FLUSH_DELAY_MS"));

        assert!(Config::from_lookup(lookup(&[("GRADEBOOKD_WRITE_RETRIES", "0")])).is_err());
    }
}
