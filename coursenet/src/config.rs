// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Run-time settings for provisioning.

use std::path::Path;
use std::time::Duration;

use common::logging::LogFormat;
use serde::Deserialize;
use serde::Serialize;

use crate::topology::AttachmentSelection;
use crate::types::CnError;
use crate::types::CnResult;

/// Default bound on each controller request, in milliseconds.
pub const DEFAULT_CONTROLLER_TIMEOUT: u64 = 5000;

/// Priority of installed flow rules.  Floodlight's default.
pub const DEFAULT_FLOW_PRIORITY: u16 = 32768;

/// The settings that tune provisioning.  Any field missing from a config
/// file takes its default value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// If set, where the log should be written.  If not set, the log goes to
    /// stdout.
    pub log_file: Option<String>,

    /// Output log info in unstructured text or json?
    pub log_format: LogFormat,

    /// Base URL of the controller's REST API.
    pub controller_url: String,

    /// Bound on each controller request, in milliseconds.
    pub controller_timeout: u64,

    /// Priority of installed flow rules.
    pub flow_priority: u16,

    /// Which attachment point to use for a host reported at several.
    pub attachment_selection: AttachmentSelection,

    /// Confirm with the controller that installed rules are present.
    pub verify_installs: bool,

    /// Catalog document to load at startup.
    pub catalog: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_file: None,
            log_format: LogFormat::Human,
            controller_url: common::default_controller_url(),
            controller_timeout: DEFAULT_CONTROLLER_TIMEOUT,
            flow_priority: DEFAULT_FLOW_PRIORITY,
            attachment_selection: AttachmentSelection::default(),
            verify_installs: true,
            catalog: None,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> CnResult<Config> {
        let config: Config = toml::from_str(text)
            .map_err(|e| CnError::Invalid(format!("bad config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> CnResult<Config> {
        let text = std::fs::read_to_string(path)?;
        Config::from_toml(&text)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.controller_timeout)
    }

    pub fn validate(&self) -> CnResult<()> {
        if self.controller_timeout == 0 {
            return Err(CnError::Invalid(
                "controller_timeout must be positive".to_string(),
            ));
        }
        if !(self.controller_url.starts_with("http://")
            || self.controller_url.starts_with("https://"))
        {
            return Err(CnError::Invalid(format!(
                "controller_url must be an http(s) URL: {}",
                self.controller_url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.controller_url, "http://127.0.0.1:8080");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.flow_priority, 32768);
        assert!(config.verify_installs);
    }

    #[test]
    fn test_parse() {
        let config = Config::from_toml(
            r#"
            log_format = "json"
            controller_url = "http://10.20.12.65:8080"
            controller_timeout = 250
            attachment_selection = "last"
            verify_installs = false
            catalog = "/etc/coursenet/catalog.yaml"
            "#,
        )
        .unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.controller_url, "http://10.20.12.65:8080");
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.attachment_selection, AttachmentSelection::Last);
        assert!(!config.verify_installs);
        assert_eq!(
            config.catalog.as_deref(),
            Some("/etc/coursenet/catalog.yaml")
        );
        assert_eq!(config.flow_priority, DEFAULT_FLOW_PRIORITY);
    }

    #[test]
    fn test_invalid() {
        assert!(Config::from_toml("controller_timeout = 0").is_err());
        assert!(Config::from_toml("controller_url = \"10.0.0.1\"").is_err());
        let bad = "attachment_selection = \"random\"";
        assert!(Config::from_toml(bad).is_err());
        assert!(Config::from_toml("no_such_field = 1").is_err());
    }
}
