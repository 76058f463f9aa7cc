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

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const LOBBY_KEY_PREFIX: &str = "lobby";

pub type ReferenceId = String;

/// Body of `POST /new-lobby`. Stored verbatim as the lobby payload, so any
/// field beyond the two known ones is carried through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CreateLobbyRequest {
    #[serde(rename = "referenceID", default)]
    pub reference_id: ReferenceId,
    #[serde(rename = "lobbyName", default)]
    pub lobby_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CreateLobbyRequest {
    pub fn new(reference_id: impl Into<String>, lobby_name: impl Into<String>) -> Self {
        Self {
            reference_id: reference_id.into(),
            lobby_name: lobby_name.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CreateResult {
    Created,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateLobbyResponse {
    pub result: CreateResult,
}

/// Lifecycle state persisted under `lobby:<referenceID>:status`.
///
/// The stored literal is the variant name (`Creating`, `Running`, `Failed`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LobbyStatus {
    Creating,
    Running,
    Failed,
}

impl LobbyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LobbyStatus::Creating => "Creating",
            LobbyStatus::Running => "Running",
            LobbyStatus::Failed => "Failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Creating" => Some(LobbyStatus::Creating),
            "Running" => Some(LobbyStatus::Running),
            "Failed" => Some(LobbyStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for LobbyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status as reported by `GET /status-lobby/{referenceId}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    NotFound,
    Creating,
    Running,
    Failed,
    Error,
}

impl From<LobbyStatus> for ClientStatus {
    fn from(status: LobbyStatus) -> Self {
        match status {
            LobbyStatus::Creating => ClientStatus::Creating,
            LobbyStatus::Running => ClientStatus::Running,
            LobbyStatus::Failed => ClientStatus::Failed,
        }
    }
}

impl From<Option<LobbyStatus>> for ClientStatus {
    fn from(status: Option<LobbyStatus>) -> Self {
        status.map(Into::into).unwrap_or(ClientStatus::NotFound)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusLobbyResponse {
    pub status: ClientStatus,
    pub data: Option<Value>,
}
