//! Wire types of the sidecar API, shared by the server and the remote client.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const STOP_CONTAINER_PATH: &str = "/v1/stop-container";
pub const ONLINE_UPDATE_PATH: &str = "/v1/online-update";
pub const HEALTH_PATH: &str = "/healthz";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopContainerRequest {
    pub container_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUpdateRequest {
    pub config_spec: String,
    pub params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
}

/// Every sidecar response. A non-empty message is an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub err_message: String,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            err_message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.err_message.is_empty()
    }
}
