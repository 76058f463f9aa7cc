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

//! Lobby lifecycle: identity, persisted status and the launch hand-off.
//!
//! Status moves `Creating -> Running` or `Creating -> Failed`. A lobby with
//! no stored status does not exist, whatever else the store holds for it.

use std::{sync::Arc, time::Duration};

use lobby_common::{CreateLobbyRequest, LobbyStatus, StatusLobbyResponse};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    error::{LaunchError, LobbyError},
    launcher::{LaunchParameters, TaskHandle, TaskLauncher},
    store::{StateStore, payload_key, status_key, task_key},
};

const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The launcher confirmed a task and the lobby is now `Running`.
    Launched { task_handle: TaskHandle },
    /// The identity was already running; nothing was written or launched.
    AlreadyRunning,
}

#[derive(Clone)]
pub struct LobbyManager {
    store: Arc<dyn StateStore>,
    launcher: Arc<dyn TaskLauncher>,
    launch_parameters: LaunchParameters,
    launch_timeout: Duration,
}

impl LobbyManager {
    pub fn new(
        store: Arc<dyn StateStore>,
        launcher: Arc<dyn TaskLauncher>,
        launch_parameters: LaunchParameters,
    ) -> Self {
        Self {
            store,
            launcher,
            launch_parameters,
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
        }
    }

    pub fn with_launch_timeout(mut self, launch_timeout: Duration) -> Self {
        self.launch_timeout = launch_timeout;
        self
    }

    /// Persists the lobby as `Creating`, launches its task and records the
    /// outcome. Succeeds only once both the writes and the launch succeeded.
    ///
    /// Retries are idempotent per reference id: a `Running` lobby is left
    /// untouched, a `Creating` one keeps its payload and re-asks the launcher
    /// (which dedupes by identity), a `Failed` one is created afresh. A failed
    /// retry never downgrades a lobby that reached `Running` meanwhile.
    pub async fn create_lobby(
        &self,
        request: &CreateLobbyRequest,
    ) -> Result<CreateOutcome, LobbyError> {
        validate_request(request)?;
        let reference_id = request.reference_id.as_str();
        info!(
            reference_id = %reference_id,
            lobby_name = %request.lobby_name,
            "creating lobby"
        );

        let payload = serde_json::to_string(request)
            .map_err(|error| LobbyError::validation(format!("payload is not serializable: {error}")))?;

        match self.stored_status(reference_id).await? {
            Some(LobbyStatus::Running) => {
                self.ensure_same_payload(reference_id, request).await?;
                info!(reference_id = %reference_id, "lobby already running; skipping launch");
                return Ok(CreateOutcome::AlreadyRunning);
            }
            Some(LobbyStatus::Creating) => {
                self.ensure_same_payload(reference_id, request).await?;
                info!(reference_id = %reference_id, "lobby already creating; re-requesting launch");
            }
            Some(LobbyStatus::Failed) => {
                info!(reference_id = %reference_id, "retrying previously failed lobby");
                self.persist_creating(reference_id, &payload).await?;
            }
            None => self.persist_creating(reference_id, &payload).await?,
        }

        let launched = tokio::time::timeout(
            self.launch_timeout,
            self.launcher.launch(reference_id, &self.launch_parameters),
        )
        .await
        .unwrap_or_else(|_| Err(LaunchError::Timeout(self.launch_timeout)));

        match launched {
            Ok(task_handle) => {
                info!(reference_id = %reference_id, task_handle = %task_handle, "lobby task started");
                self.store
                    .set_many(&[
                        (task_key(reference_id), task_handle.clone()),
                        (status_key(reference_id), LobbyStatus::Running.to_string()),
                    ])
                    .await
                    .map_err(|error| {
                        error!(
                            reference_id = %reference_id,
                            task_handle = %task_handle,
                            error = %error,
                            "task started but Running status was not persisted"
                        );
                        LobbyError::Store(error)
                    })?;
                Ok(CreateOutcome::Launched { task_handle })
            }
            Err(launch_error) => {
                warn!(
                    reference_id = %reference_id,
                    transient = launch_error.is_transient(),
                    error = %launch_error,
                    "lobby task launch failed"
                );
                self.mark_failed(reference_id).await;
                Err(LobbyError::Launch(launch_error))
            }
        }
    }

    /// Reads the status, then the payload. A missing status is `not_found`
    /// even if a payload exists; a payload that cannot be read only empties
    /// `data`.
    pub async fn status_lobby(&self, reference_id: &str) -> Result<StatusLobbyResponse, LobbyError> {
        validate_reference_id(reference_id)?;

        let status = self.stored_status(reference_id).await?;
        if status.is_none() {
            return Ok(StatusLobbyResponse {
                status: status.into(),
                data: None,
            });
        }

        let data = match self.store.get(&payload_key(reference_id)).await {
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(data) => Some(data),
                Err(error) => {
                    warn!(reference_id = %reference_id, error = %error, "stored lobby payload is not valid JSON");
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                warn!(reference_id = %reference_id, error = %error, "failed to read lobby payload");
                None
            }
        };

        Ok(StatusLobbyResponse {
            status: status.into(),
            data,
        })
    }

    /// Returns the payload exactly as it was stored.
    pub async fn get_lobby_data(&self, reference_id: &str) -> Result<String, LobbyError> {
        validate_reference_id(reference_id)?;
        self.store
            .get(&payload_key(reference_id))
            .await
            .map_err(LobbyError::Store)?
            .ok_or_else(|| LobbyError::NotFound(reference_id.to_string()))
    }

    async fn stored_status(&self, reference_id: &str) -> Result<Option<LobbyStatus>, LobbyError> {
        let raw = self
            .store
            .get(&status_key(reference_id))
            .await
            .map_err(LobbyError::Store)?;

        raw.map(|value| {
            LobbyStatus::parse(&value).ok_or_else(|| {
                LobbyError::Store(anyhow::anyhow!(
                    "unrecognised status {value:?} stored for lobby {reference_id}"
                ))
            })
        })
        .transpose()
    }

    /// Payload first, then status; the status write commits the lobby.
    async fn persist_creating(&self, reference_id: &str, payload: &str) -> Result<(), LobbyError> {
        self.store
            .set_many(&[
                (payload_key(reference_id), payload.to_string()),
                (status_key(reference_id), LobbyStatus::Creating.to_string()),
            ])
            .await
            .map_err(|error| {
                error!(reference_id = %reference_id, error = %error, "failed to persist lobby");
                LobbyError::Store(error)
            })
    }

    /// Compares decoded requests, so key order in the stored text is irrelevant.
    async fn ensure_same_payload(
        &self,
        reference_id: &str,
        request: &CreateLobbyRequest,
    ) -> Result<(), LobbyError> {
        let stored = self
            .store
            .get(&payload_key(reference_id))
            .await
            .map_err(LobbyError::Store)?;

        let Some(stored) =
            stored.and_then(|raw| serde_json::from_str::<CreateLobbyRequest>(&raw).ok())
        else {
            return Ok(());
        };
        if &stored != request {
            return Err(LobbyError::validation(format!(
                "reference id {reference_id} is already used by a different lobby"
            )));
        }
        Ok(())
    }

    /// Best-effort `Failed` write. A lobby another create already moved to
    /// `Running` keeps that status.
    async fn mark_failed(&self, reference_id: &str) {
        match self.stored_status(reference_id).await {
            Ok(Some(LobbyStatus::Running)) => {
                warn!(
                    reference_id = %reference_id,
                    "launch retry failed but lobby is already running; keeping Running"
                );
                return;
            }
            Ok(_) => {}
            Err(error) => {
                warn!(reference_id = %reference_id, error = %error, "failed to re-read status before marking lobby failed");
            }
        }

        if let Err(error) = self
            .store
            .set(&status_key(reference_id), LobbyStatus::Failed.as_str())
            .await
        {
            error!(
                reference_id = %reference_id,
                error = %error,
                "failed to persist Failed status; lobby left in Creating"
            );
        }
    }
}

fn validate_reference_id(reference_id: &str) -> Result<(), LobbyError> {
    if reference_id.trim().is_empty() {
        return Err(LobbyError::validation("referenceID is required"));
    }
    Ok(())
}

fn validate_request(request: &CreateLobbyRequest) -> Result<(), LobbyError> {
    validate_reference_id(&request.reference_id)?;
    if request.lobby_name.trim().is_empty() {
        return Err(LobbyError::validation("lobbyName is required"));
    }
    Ok(())
}
