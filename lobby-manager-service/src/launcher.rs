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

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{config::LauncherConfig, error::LaunchError};

pub type TaskHandle = String;

/// Static launch settings passed through to the orchestration API.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct LaunchParameters {
    pub cluster: Option<String>,
    pub task_definition: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

/// Starts the hosting process for a lobby.
///
/// Implementations must be idempotent per `reference_id`: repeated calls for
/// an identity that is already launching or launched return the same handle
/// instead of starting a second process.
#[async_trait]
pub trait TaskLauncher: Send + Sync {
    async fn launch(
        &self,
        reference_id: &str,
        parameters: &LaunchParameters,
    ) -> Result<TaskHandle, LaunchError>;
}

/// In-process launcher for local runs. Hands out one synthetic handle per
/// reference id and starts nothing.
#[derive(Default)]
pub struct LocalTaskLauncher {
    handles: Mutex<HashMap<String, TaskHandle>>,
}

impl LocalTaskLauncher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskLauncher for LocalTaskLauncher {
    async fn launch(
        &self,
        reference_id: &str,
        _parameters: &LaunchParameters,
    ) -> Result<TaskHandle, LaunchError> {
        let mut handles = self
            .handles
            .lock()
            .map_err(|_| LaunchError::Permanent("local launcher state poisoned".to_string()))?;
        let handle = handles
            .entry(reference_id.to_string())
            .or_insert_with(|| format!("local-{}", Uuid::new_v4()))
            .clone();
        info!(reference_id = %reference_id, task_handle = %handle, "local launcher assigned task handle");
        Ok(handle)
    }
}

#[derive(Debug, Serialize)]
struct LaunchTaskRequest<'a> {
    client_token: &'a str,
    reference_id: &'a str,
    cluster: Option<&'a str>,
    task_definition: Option<&'a str>,
    parameters: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LaunchTaskResponse {
    task_handle: String,
}

/// Talks to a remote orchestration API over HTTP. The reference id doubles
/// as the idempotency key so retries never start a second task.
#[derive(Clone)]
pub struct HttpTaskLauncher {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTaskLauncher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build task launcher HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
        })
    }

    pub fn from_config(config: &LauncherConfig) -> anyhow::Result<Self> {
        info!(base_url = %config.base_url, timeout = ?config.timeout(), "HTTP task launcher enabled");
        Self::new(config.base_url.clone(), config.timeout())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn request_error(&self, error: reqwest::Error) -> LaunchError {
        if error.is_timeout() {
            LaunchError::Timeout(self.timeout)
        } else {
            LaunchError::Transient(format!("failed to call task launcher: {error}"))
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[async_trait]
impl TaskLauncher for HttpTaskLauncher {
    async fn launch(
        &self,
        reference_id: &str,
        parameters: &LaunchParameters,
    ) -> Result<TaskHandle, LaunchError> {
        let payload = LaunchTaskRequest {
            client_token: reference_id,
            reference_id,
            cluster: parameters.cluster.as_deref(),
            task_definition: parameters.task_definition.as_deref(),
            parameters: &parameters.parameters,
        };

        let response = self
            .client
            .post(self.endpoint("tasks"))
            .header("Idempotency-Key", reference_id)
            .json(&payload)
            .send()
            .await
            .map_err(|error| self.request_error(error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_string());
            let message = format!("task launcher returned {status}: {body}");
            return Err(if is_transient_status(status) {
                LaunchError::Transient(message)
            } else {
                LaunchError::Permanent(message)
            });
        }

        let body: LaunchTaskResponse = response.json().await.map_err(|error| {
            LaunchError::Permanent(format!("invalid task launcher response: {error}"))
        })?;
        if body.task_handle.trim().is_empty() {
            return Err(LaunchError::Permanent(
                "task launcher returned an empty task handle".to_string(),
            ));
        }

        Ok(body.task_handle)
    }
}
