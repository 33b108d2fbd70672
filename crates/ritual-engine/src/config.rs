use anyhow::{Context, Result, ensure};
use ritual_core::{CacheConfig, RewardRules};

pub const ENV_DEVICE_ID: &str = "RITUAL_DEVICE_ID";
pub const ENV_INVITE_DAILY_LIMIT: &str = "RITUAL_INVITE_DAILY_LIMIT";
pub const ENV_LEAGUE_THRESHOLD: &str = "RITUAL_LEAGUE_THRESHOLD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Stable id of this install, attached to invite claim logs.
    pub device_id: String,
    /// Invite claims accepted per calendar day on this device.
    pub invite_daily_limit: u32,
    pub rewards: RewardRules,
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_id: "local-device".into(),
            invite_daily_limit: 3,
            rewards: RewardRules::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `RITUAL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(device_id) = lookup(ENV_DEVICE_ID).filter(|v| !v.trim().is_empty()) {
            config.device_id = device_id.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_INVITE_DAILY_LIMIT) {
            config.invite_daily_limit = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_INVITE_DAILY_LIMIT}='{raw}' is not a count"))?;
        }
        if let Some(raw) = lookup(ENV_LEAGUE_THRESHOLD) {
            let threshold: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_LEAGUE_THRESHOLD}='{raw}' is not an XP amount"))?;
            ensure!(threshold > 0, "{ENV_LEAGUE_THRESHOLD} must be positive");
            config.rewards.league_threshold = threshold;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.invite_daily_limit, 3);
        assert_eq!(config.rewards.league_threshold, 500);
    }

    #[test]
    fn env_overrides_apply() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_DEVICE_ID, " phone-7 "),
            (ENV_INVITE_DAILY_LIMIT, "5"),
            (ENV_LEAGUE_THRESHOLD, "1000"),
        ]))
        .unwrap();
        assert_eq!(config.device_id, "phone-7");
        assert_eq!(config.invite_daily_limit, 5);
        assert_eq!(config.rewards.league_threshold, 1000);
    }

    #[test]
    fn malformed_values_are_reported_with_context() {
        let err = EngineConfig::from_lookup(lookup(&[(ENV_INVITE_DAILY_LIMIT, "lots")])).unwrap_err();
        assert!(err.to_string().contains(ENV_INVITE_DAILY_LIMIT));
        assert!(EngineConfig::from_lookup(lookup(&[(ENV_LEAGUE_THRESHOLD, "0")])).is_err());
    }
}
