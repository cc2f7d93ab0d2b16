//! Request handlers of the sidecar API.

use axum::{extract::State, Json};
use tracing::{error, info, warn};

use crate::observability::metrics;
use crate::reload::shell::run_command;
use crate::server::api::{ApiResponse, OnlineUpdateRequest, StopContainerRequest};
use crate::server::ServerState;

pub async fn healthz() -> Json<ApiResponse> {
    Json(ApiResponse::ok())
}

/// Run the container-runtime stop command once per id, stopping at the
/// first failure.
pub async fn stop_container(
    State(state): State<ServerState>,
    Json(request): Json<StopContainerRequest>,
) -> Json<ApiResponse> {
    if request.container_ids.is_empty() {
        return Json(ApiResponse::error("no container ids given"));
    }
    let Some((program, base_args)) = state.stop_command.split_first() else {
        return Json(ApiResponse::error("container stop command is not configured"));
    };

    for id in &request.container_ids {
        let mut args = base_args.to_vec();
        args.push(id.clone());
        match run_command(program, &args, None).await {
            Ok(_) => info!(container = %id, "container stopped"),
            Err(e) => {
                error!(container = %id, error = %e, "failed to stop container");
                return Json(ApiResponse::error(e.to_string()));
            }
        }
    }
    Json(ApiResponse::ok())
}

pub async fn online_update(
    State(state): State<ServerState>,
    Json(request): Json<OnlineUpdateRequest>,
) -> Json<ApiResponse> {
    if request.params.is_empty() {
        warn!(config_spec = %request.config_spec, "online update without parameters");
        return Json(ApiResponse::ok());
    }

    let result = state
        .handler
        .online_update(&request.config_spec, &request.params)
        .await;
    metrics::record_online_update(result.is_ok());
    match result {
        Ok(()) => {
            info!(
                config_spec = %request.config_spec,
                config_file = request.config_file.as_deref().unwrap_or(""),
                params = request.params.len(),
                "online update applied"
            );
            Json(ApiResponse::ok())
        }
        Err(e) => {
            error!(config_spec = %request.config_spec, error = %e, "online update failed");
            Json(ApiResponse::error(e.to_string()))
        }
    }
}
