//! Remote pod operations: stop-container and online-update against a
//! replica's sidecar.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::policy::types::{Pod, PolicyError, PolicyResult};
use crate::server::api::{
    ApiResponse, OnlineUpdateRequest, StopContainerRequest, ONLINE_UPDATE_PATH,
    STOP_CONTAINER_PATH,
};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid sidecar address '{0}'")]
    InvalidAddress(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The sidecar answered with a non-empty error message.
    #[error("sidecar error: {0}")]
    Remote(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// The two unary calls a policy makes against one pod.
#[async_trait]
pub trait ReconfigureClient: Send + Sync {
    async fn stop_container(&self, container_ids: &[String]) -> RemoteResult<()>;

    async fn online_upgrade_params(
        &self,
        config_spec: &str,
        params: &BTreeMap<String, String>,
    ) -> RemoteResult<()>;
}

/// Builds a client for a `host:port` sidecar address.
pub trait ClientFactory: Send + Sync {
    fn create(&self, address: &str) -> RemoteResult<Box<dyn ReconfigureClient>>;
}

/// Sidecar address for `pod`.
///
/// Prefers an IPv4 pod IP; host-network pods use their own published port.
pub fn resolve_address(pod: &Pod, default_port: u16) -> PolicyResult<String> {
    let ip: IpAddr = pod
        .first_ip()
        .ok_or_else(|| PolicyError::Structural(format!("pod {} has no valid ip", pod.name)))?;

    let port = if pod.host_network {
        pod.sidecar_port.ok_or_else(|| {
            PolicyError::Structural(format!(
                "pod {} uses host network but publishes no sidecar port",
                pod.name
            ))
        })?
    } else {
        default_port
    };

    Ok(SocketAddr::new(ip, port).to_string())
}

/// Container ids for the named containers of `pod`.
pub fn resolve_container_ids(pod: &Pod, names: &[String]) -> PolicyResult<Vec<String>> {
    names
        .iter()
        .map(|name| {
            pod.containers
                .iter()
                .find(|c| &c.name == name && !c.id.is_empty())
                .map(|c| c.id.clone())
                .ok_or_else(|| {
                    PolicyError::Structural(format!(
                        "container {} not found in pod {}",
                        name, pod.name
                    ))
                })
        })
        .collect()
}

/// HTTP client for the sidecar API.
pub struct HttpReconfigureClient {
    base: Url,
    http: reqwest::Client,
}

impl HttpReconfigureClient {
    pub fn new(address: &str, timeout: Duration) -> RemoteResult<Self> {
        let base = Url::parse(&format!("http://{address}"))
            .map_err(|_| RemoteError::InvalidAddress(address.to_string()))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base, http })
    }

    async fn post<T: serde::Serialize + ?Sized>(&self, path: &str, body: &T) -> RemoteResult<()> {
        let url = self
            .base
            .join(path)
            .map_err(|_| RemoteError::InvalidAddress(self.base.to_string()))?;
        let response: ApiResponse = self
            .http
            .post(url)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.is_ok() {
            Ok(())
        } else {
            Err(RemoteError::Remote(response.err_message))
        }
    }
}

#[async_trait]
impl ReconfigureClient for HttpReconfigureClient {
    async fn stop_container(&self, container_ids: &[String]) -> RemoteResult<()> {
        let request = StopContainerRequest {
            container_ids: container_ids.to_vec(),
        };
        self.post(STOP_CONTAINER_PATH, &request).await
    }

    async fn online_upgrade_params(
        &self,
        config_spec: &str,
        params: &BTreeMap<String, String>,
    ) -> RemoteResult<()> {
        let request = OnlineUpdateRequest {
            config_spec: config_spec.to_string(),
            params: params.clone(),
            config_file: None,
        };
        self.post(ONLINE_UPDATE_PATH, &request).await
    }
}

/// Factory for [`HttpReconfigureClient`].
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    timeout: Duration,
}

impl HttpClientFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ClientFactory for HttpClientFactory {
    fn create(&self, address: &str) -> RemoteResult<Box<dyn ReconfigureClient>> {
        Ok(Box::new(HttpReconfigureClient::new(address, self.timeout)?))
    }
}
