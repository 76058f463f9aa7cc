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

/// Failures surfaced by the lobby lifecycle manager.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// Missing or malformed reference id or payload; rejected before any write.
    #[error("invalid lobby request: {0}")]
    Validation(String),

    /// The state store could not be read or written.
    #[error("state store failure: {0:#}")]
    Store(anyhow::Error),

    /// The task launcher refused or failed to start the hosting process.
    #[error("task launch failed: {0}")]
    Launch(#[from] LaunchError),

    #[error("lobby {0} not found")]
    NotFound(String),
}

impl LobbyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Launch failures as classified by the launcher adapter.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// Worth retrying by the caller: network errors, 5xx, throttling.
    #[error("transient launcher error: {0}")]
    Transient(String),

    /// Retrying with the same input will not help.
    #[error("permanent launcher error: {0}")]
    Permanent(String),

    #[error("launcher did not answer within {0:?}")]
    Timeout(std::time::Duration),
}

impl LaunchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LaunchError::Transient(_) | LaunchError::Timeout(_))
    }
}
