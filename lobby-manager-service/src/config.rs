// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{collections::BTreeMap, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, warn};

use crate::launcher::LaunchParameters;

const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub api: ApiConfig,
    pub store: StoreConfig,
    pub launcher: LauncherConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
    pub graceful_shutdown_timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            graceful_shutdown_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Dynamodb,
}

impl StoreBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(StoreBackend::Memory),
            "dynamodb" => Some(StoreBackend::Dynamodb),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub table_name: String,
    pub endpoint: Option<String>,
    /// When set, records carry an `expires_at` attribute for DynamoDB TTL.
    pub ttl_seconds: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            table_name: "lobbies".to_string(),
            endpoint: None,
            ttl_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LauncherBackend {
    #[default]
    Local,
    Http,
}

impl LauncherBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(LauncherBackend::Local),
            "http" => Some(LauncherBackend::Http),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub backend: LauncherBackend,
    pub base_url: String,
    pub timeout_seconds: u64,
    pub cluster: Option<String>,
    pub task_definition: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            backend: LauncherBackend::Local,
            base_url: "http://task-launcher:8095".to_string(),
            timeout_seconds: 10,
            cluster: None,
            task_definition: None,
            parameters: BTreeMap::new(),
        }
    }
}

impl LauncherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    pub fn launch_parameters(&self) -> LaunchParameters {
        LaunchParameters {
            cluster: self.cluster.clone(),
            task_definition: self.task_definition.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

impl ServiceConfig {
    /// Reads the YAML file named by `LOBBY_CONFIG_PATH` and applies
    /// environment overrides on top.
    pub fn load() -> anyhow::Result<Self> {
        let path = env_value("LOBBY_CONFIG_PATH").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_env_overrides(env_value);
        Ok(config)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_yaml(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        info!(path = %path.display(), "loaded service config");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup("LOBBY_MANAGER_BIND") {
            self.api.bind = bind;
        }

        if let Some(raw) = lookup("LOBBY_STORE_BACKEND") {
            match StoreBackend::parse(&raw) {
                Some(backend) => self.store.backend = backend,
                None => warn!(value = %raw, "ignoring unknown LOBBY_STORE_BACKEND"),
            }
        }
        if let Some(table_name) = lookup("LOBBY_STATE_TABLE") {
            self.store.table_name = table_name;
        }
        if let Some(endpoint) = lookup("DYNAMODB_ENDPOINT") {
            self.store.endpoint = Some(endpoint);
        }

        if let Some(raw) = lookup("LOBBY_LAUNCHER_BACKEND") {
            match LauncherBackend::parse(&raw) {
                Some(backend) => self.launcher.backend = backend,
                None => warn!(value = %raw, "ignoring unknown LOBBY_LAUNCHER_BACKEND"),
            }
        }
        if let Some(base_url) = lookup("TASK_LAUNCHER_BASE_URL") {
            self.launcher.base_url = base_url;
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.api.graceful_shutdown_timeout_seconds)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = ServiceConfig::from_yaml("  \n").unwrap();
        assert_eq!(config.api.bind, "0.0.0.0:8080");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.launcher.backend, LauncherBackend::Local);
        assert_eq!(config.launcher.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn yaml_sections_are_parsed() {
        let config = ServiceConfig::from_yaml(
            r#"
api:
  bind: "127.0.0.1:9000"
  graceful_shutdown_timeout_seconds: 3
store:
  backend: dynamodb
  table_name: lobby_state
  ttl_seconds: 3600
launcher:
  backend: http
  base_url: "http://orchestrator:7000"
  cluster: games
  task_definition: lobby-host:4
  parameters:
    image_tag: stable
"#,
        )
        .unwrap();

        assert_eq!(config.api.bind, "127.0.0.1:9000");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(3));
        assert_eq!(config.store.backend, StoreBackend::Dynamodb);
        assert_eq!(config.store.table_name, "lobby_state");
        assert_eq!(config.store.ttl_seconds, Some(3600));
        assert_eq!(config.launcher.backend, LauncherBackend::Http);

        let parameters = config.launcher.launch_parameters();
        assert_eq!(parameters.cluster.as_deref(), Some("games"));
        assert_eq!(parameters.task_definition.as_deref(), Some("lobby-host:4"));
        assert_eq!(
            parameters.parameters.get("image_tag").map(String::as_str),
            Some("stable")
        );
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(ServiceConfig::from_yaml("api: [not, a, map").is_err());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LOBBY_MANAGER_BIND", "0.0.0.0:9999"),
            ("LOBBY_STORE_BACKEND", "DynamoDB"),
            ("LOBBY_STATE_TABLE", "custom_table"),
            ("LOBBY_LAUNCHER_BACKEND", "http"),
            ("TASK_LAUNCHER_BASE_URL", "http://launcher.local"),
        ]);

        let mut config = ServiceConfig::default();
        config.apply_env_overrides(|name| env.get(name).map(|value| value.to_string()));

        assert_eq!(config.api.bind, "0.0.0.0:9999");
        assert_eq!(config.store.backend, StoreBackend::Dynamodb);
        assert_eq!(config.store.table_name, "custom_table");
        assert_eq!(config.launcher.backend, LauncherBackend::Http);
        assert_eq!(config.launcher.base_url, "http://launcher.local");
    }

    #[test]
    fn unknown_backend_override_is_ignored() {
        let mut config = ServiceConfig::default();
        config.apply_env_overrides(|name| {
            (name == "LOBBY_STORE_BACKEND").then(|| "redis".to_string())
        });
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }
}
