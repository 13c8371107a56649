//! Server configuration read from the environment

use anyhow::Context;
use engagement_rules::{BusinessHours, MatchPolicy};
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_DATA_DIR: &str = "./data";

/// Startup configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `ENGAGE_BIND_ADDR`
    pub bind_addr: SocketAddr,
    /// `ENGAGE_DATA_DIR`, holds `rules.json`
    pub data_dir: PathBuf,
    /// `ENGAGE_MATCH_POLICY`: `all` or `first`
    pub match_policy: MatchPolicy,
    /// `ENGAGE_BUSINESS_HOURS`: `HH:MM-HH:MM`, Monday to Friday
    pub business_hours: BusinessHours,
}

impl ServerConfig {
    /// Read the configuration from process environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind_addr = lookup("ENGAGE_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("Invalid ENGAGE_BIND_ADDR")?;

        let data_dir = lookup("ENGAGE_DATA_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);

        let match_policy = match lookup("ENGAGE_MATCH_POLICY") {
            Some(value) => value
                .parse::<MatchPolicy>()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Invalid ENGAGE_MATCH_POLICY")?,
            None => MatchPolicy::default(),
        };

        let business_hours = match lookup("ENGAGE_BUSINESS_HOURS") {
            Some(value) => value
                .parse::<BusinessHours>()
                .context("Invalid ENGAGE_BUSINESS_HOURS")?,
            None => BusinessHours::default(),
        };

        Ok(Self {
            bind_addr,
            data_dir,
            match_policy,
            business_hours,
        })
    }
}
