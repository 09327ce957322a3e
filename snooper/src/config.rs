// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Configuration for the snooping cache.

use serde::Deserialize;
use serde::Serialize;

use crate::types::SnoopError;
use crate::types::SnoopResult;
use aal::Tick;
use common::logging::LogFormat;
use common::ports::PortNo;
use common::ports::PORT_MASK_MAX;

pub const DEFAULT_GROUP_POOL_SIZE: usize = 512;
pub const DEFAULT_MEMBER_POOL_SIZE: usize = 1024;
pub const DEFAULT_HOST_POOL_SIZE: usize = 32;
pub const DEFAULT_HOST_TTL: Tick = 3;
pub const DEFAULT_HASH_SIZE: usize = 64;
pub const DEFAULT_PORT_MAX: PortNo = 7;

// Pool slots are addressed with 16-bit indices
const MAX_POOL_SIZE: usize = u16::MAX as usize + 1;

/// The Config structure captures the sizing of the cache's tables and the
/// run-time settings of the process embedding it.  Every field has a default,
/// so a config file only needs to name the settings it changes.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Maximum number of multicast groups tracked at once.
    pub group_pool_size: usize,

    /// Maximum number of group members (and routers) tracked at once, shared
    /// across all groups.
    pub member_pool_size: usize,

    /// Maximum number of MAC-to-port mappings cached.
    pub host_pool_size: usize,

    /// Number of ticks a cached MAC-to-port mapping is trusted.
    pub host_ttl: Tick,

    /// Number of hash buckets in the host and group tables.
    pub hash_size: usize,

    /// Highest physical port number on the switch.
    pub port_max: PortNo,

    /// If set, where the log should be written.  If not set, the log goes to
    /// stdout.
    pub log_file: Option<String>,

    /// Output log info in unstructured text or json?
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            group_pool_size: DEFAULT_GROUP_POOL_SIZE,
            member_pool_size: DEFAULT_MEMBER_POOL_SIZE,
            host_pool_size: DEFAULT_HOST_POOL_SIZE,
            host_ttl: DEFAULT_HOST_TTL,
            hash_size: DEFAULT_HASH_SIZE,
            port_max: DEFAULT_PORT_MAX,
            log_file: None,
            log_format: LogFormat::Json,
        }
    }
}

fn check_pool(name: &str, size: usize) -> SnoopResult<()> {
    if size == 0 || size > MAX_POOL_SIZE {
        Err(SnoopError::Invalid(format!(
            "{name} must be between 1 and {MAX_POOL_SIZE}, not {size}"
        )))
    } else {
        Ok(())
    }
}

impl Config {
    /// Parse a TOML document, filling in defaults for any missing settings.
    pub fn from_toml(txt: &str) -> SnoopResult<Self> {
        let config: Config = toml::from_str(txt)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> SnoopResult<Self> {
        let txt = std::fs::read_to_string(path)?;
        Self::from_toml(&txt)
    }

    /// Verify that the settings describe a cache we can actually build.
    pub fn validate(&self) -> SnoopResult<()> {
        if self.port_max > PORT_MASK_MAX {
            return Err(SnoopError::Invalid(format!(
                "port_max {} exceeds the port mask width (max {})",
                self.port_max, PORT_MASK_MAX
            )));
        }
        check_pool("group_pool_size", self.group_pool_size)?;
        check_pool("member_pool_size", self.member_pool_size)?;
        check_pool("host_pool_size", self.host_pool_size)?;
        if self.hash_size == 0 {
            return Err(SnoopError::Invalid(
                "hash_size must be non-zero".to_string(),
            ));
        }
        if self.host_ttl == 0 {
            return Err(SnoopError::Invalid(
                "host_ttl must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the root logger described by `log_file` and `log_format`.
    pub fn logger(&self) -> anyhow::Result<slog::Logger> {
        common::logging::init("snooper", &self.log_file, self.log_format)
    }
}

/// This builds the Config used to size the cache.  With no config file, the
/// default settings are used.
pub fn build_config(path: Option<&str>) -> SnoopResult<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = build_config(None).unwrap();
        assert_eq!(config.group_pool_size, 512);
        assert_eq!(config.member_pool_size, 1024);
        assert_eq!(config.host_pool_size, 32);
        assert_eq!(config.host_ttl, 3);
        assert_eq!(config.hash_size, 64);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_updates() {
        let config = Config::from_toml(
            r#"
            port_max = 4
            host_ttl = 10
            log_format = "human"
            log_file = "snooper.log"
            "#,
        )
        .unwrap();
        assert_eq!(config.port_max, 4);
        assert_eq!(config.host_ttl, 10);
        assert_eq!(config.log_format, LogFormat::Human);
        assert_eq!(config.log_file, Some("snooper.log".to_string()));
        // Untouched settings keep their defaults
        assert_eq!(config.group_pool_size, DEFAULT_GROUP_POOL_SIZE);
    }

    #[test]
    fn test_unknown_setting() {
        let err = Config::from_toml("pool_size = 3").unwrap_err();
        assert!(matches!(err, SnoopError::Config(_)));
    }

    #[test]
    fn test_validation() {
        let bad = [
            "port_max = 32",
            "group_pool_size = 0",
            "member_pool_size = 65537",
            "host_pool_size = 0",
            "hash_size = 0",
            "host_ttl = 0",
        ];
        for txt in bad {
            let err = Config::from_toml(txt).unwrap_err();
            assert!(matches!(err, SnoopError::Invalid(_)), "{txt}: {err:?}");
        }
        Config::from_toml("port_max = 31\nmember_pool_size = 65536").unwrap();
    }

    #[test]
    fn test_log_file() -> anyhow::Result<()> {
        let path = std::env::temp_dir()
            .join(format!("snooper-{}.log", std::process::id()));
        let config = Config {
            log_file: Some(path.to_string_lossy().to_string()),
            log_format: LogFormat::Human,
            ..Config::default()
        };
        let log = config.logger()?;
        slog::info!(log, "logging to a file");
        assert!(path.exists());
        drop(log);
        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let err = build_config(Some("/nonexistent/snooper.toml")).unwrap_err();
        assert!(matches!(err, SnoopError::Io(_)));
    }
}
