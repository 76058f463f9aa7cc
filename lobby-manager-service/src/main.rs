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

mod config;
mod error;
mod launcher;
mod manager;
mod store;

use std::{future::IntoFuture, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use lambda_http::run as lambda_run;
use lobby_common::{
    ClientStatus, CreateLobbyRequest, CreateLobbyResponse, CreateResult, StatusLobbyResponse,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    config::{LauncherBackend, ServiceConfig, StoreBackend},
    error::LobbyError,
    launcher::{HttpTaskLauncher, LocalTaskLauncher, TaskLauncher},
    manager::{CreateOutcome, LobbyManager},
    store::{DynamoStateStore, InMemoryStateStore, StateStore},
};

#[derive(Clone)]
struct AppState {
    manager: LobbyManager,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_config = std::env::var("LOG_CONFIG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| default_log_filter(log_config.as_deref()).to_string()),
        )
        .init();

    let config = ServiceConfig::load()?;
    let state = AppState {
        manager: build_manager(&config).await?,
    };

    let app = build_router(state);

    if std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        info!("AWS Lambda runtime detected; running lobby-manager-service in lambda mode");
        lambda_run(app)
            .await
            .map_err(|e| anyhow::Error::msg(format!("lambda runtime error: {e}")))?;
        return Ok(());
    }

    let bind_addr: SocketAddr = config
        .api
        .bind
        .parse()
        .with_context(|| format!("invalid api bind address {}", config.api.bind))?;
    info!(%bind_addr, "lobby-manager-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    let shutdown_timeout = config.shutdown_timeout();
    tokio::select! {
        result = server.into_future() => result?,
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!(?shutdown_timeout, "graceful shutdown timed out; dropping open connections");
        }
    }

    info!("lobby-manager-service stopped");
    Ok(())
}

fn default_log_filter(log_config: Option<&str>) -> &'static str {
    match log_config.map(str::trim) {
        Some("production") => "lobby_manager_service=info,tower_http=warn",
        _ => "lobby_manager_service=debug,tower_http=info",
    }
}

async fn build_manager(config: &ServiceConfig) -> anyhow::Result<LobbyManager> {
    let store: Arc<dyn StateStore> = match config.store.backend {
        StoreBackend::Memory => {
            warn!("using in-memory lobby state store; lobbies are lost on restart");
            Arc::new(InMemoryStateStore::new())
        }
        StoreBackend::Dynamodb => Arc::new(DynamoStateStore::from_config(&config.store).await),
    };

    let launcher: Arc<dyn TaskLauncher> = match config.launcher.backend {
        LauncherBackend::Local => {
            info!("using local task launcher; no hosting processes will be started");
            Arc::new(LocalTaskLauncher::new())
        }
        LauncherBackend::Http => Arc::new(HttpTaskLauncher::from_config(&config.launcher)?),
    };

    // Leave the adapter's own timeout room to fire first.
    let launch_timeout = config.launcher.timeout() + Duration::from_secs(1);
    Ok(
        LobbyManager::new(store, launcher, config.launcher.launch_parameters())
            .with_launch_timeout(launch_timeout),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(error = %error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/new-lobby", post(new_lobby_handler))
        .route("/status-lobby/{reference_id}", get(status_lobby_handler))
        .route("/lobby-data/{reference_id}", get(lobby_data_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "service": "lobby-manager-service"}))
}

async fn new_lobby_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateLobbyRequest>, JsonRejection>,
) -> Result<Json<CreateLobbyResponse>, ApiError> {
    let error_body = || serde_json::json!({"result": CreateResult::Error});

    let Json(request) = payload.map_err(|rejection| {
        ApiError::bad_request(format!("invalid lobby request body: {rejection}"))
            .with_body(error_body())
    })?;

    match state.manager.create_lobby(&request).await {
        Ok(CreateOutcome::Launched { task_handle }) => {
            info!(reference_id = %request.reference_id, task_handle = %task_handle, "lobby created");
        }
        Ok(CreateOutcome::AlreadyRunning) => {
            info!(reference_id = %request.reference_id, "lobby create replayed for running lobby");
        }
        Err(error) => return Err(ApiError::from(error).with_body(error_body())),
    }

    Ok(Json(CreateLobbyResponse {
        result: CreateResult::Created,
    }))
}

async fn status_lobby_handler(
    State(state): State<AppState>,
    Path(reference_id): Path<String>,
) -> Result<Json<StatusLobbyResponse>, ApiError> {
    let response = state
        .manager
        .status_lobby(&reference_id)
        .await
        .map_err(|error| {
            ApiError::from(error)
                .with_body(serde_json::json!({"status": ClientStatus::Error, "data": null}))
        })?;
    Ok(Json(response))
}

async fn lobby_data_handler(
    State(state): State<AppState>,
    Path(reference_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let raw = state.manager.get_lobby_data(&reference_id).await?;
    let data = serde_json::from_str(&raw).map_err(|error| {
        ApiError::internal(format!(
            "stored payload for lobby {reference_id} is not valid JSON: {error}"
        ))
    })?;
    Ok(Json(data))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    body: serde_json::Value,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status,
            body: serde_json::json!({"error": message}),
            message,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Replaces the client-facing body; `message` is still logged.
    fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }
}

impl From<LobbyError> for ApiError {
    fn from(error: LobbyError) -> Self {
        let status = match &error {
            LobbyError::Validation(_) => StatusCode::BAD_REQUEST,
            LobbyError::NotFound(_) => StatusCode::NOT_FOUND,
            LobbyError::Store(_) | LobbyError::Launch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "request failed");
        (self.status, Json(self.body)).into_response()
    }
}
