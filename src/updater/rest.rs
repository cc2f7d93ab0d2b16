//! Patroni REST command channel.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use url::Url;

use crate::resilience::with_timeout;
use crate::updater::{DynamicParamUpdater, UpdaterError, UpdaterOptions, UpdaterResult};

pub struct RestUpdater {
    base: Url,
    http: reqwest::Client,
    options: UpdaterOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestCommand {
    /// PATCH `<base>/config` with a JSON body.
    Config,
    /// POST `<base>/reload`.
    Reload,
    /// POST `<base>/restart`.
    Restart,
}

impl RestCommand {
    fn parse(command: &str) -> UpdaterResult<Self> {
        match command {
            "config" => Ok(RestCommand::Config),
            "reload" => Ok(RestCommand::Reload),
            "restart" => Ok(RestCommand::Restart),
            other => Err(UpdaterError::UnsupportedCommand {
                command: other.to_string(),
                channel: "rest",
            }),
        }
    }

    fn path(&self) -> &'static str {
        match self {
            RestCommand::Config => "config",
            RestCommand::Reload => "reload",
            RestCommand::Restart => "restart",
        }
    }
}

impl RestUpdater {
    pub fn new(base: &str, options: UpdaterOptions) -> UpdaterResult<Self> {
        let mut base = Url::parse(base).map_err(|e| UpdaterError::InvalidDsn(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder().build()?;
        Ok(Self { base, http, options })
    }

    fn url_for(&self, command: RestCommand) -> UpdaterResult<Url> {
        self.base
            .join(command.path())
            .map_err(|e| UpdaterError::InvalidDsn(e.to_string()))
    }

    async fn send(&self, command: RestCommand, args: &[String]) -> UpdaterResult<String> {
        let url = self.url_for(command)?;
        let request = match command {
            RestCommand::Config => {
                let body = args.first().ok_or_else(|| {
                    UpdaterError::InvalidArgument("config command needs a JSON body".to_string())
                })?;
                let body: Value = serde_json::from_str(body)
                    .map_err(|e| UpdaterError::InvalidArgument(e.to_string()))?;
                self.http.patch(url).json(&body)
            }
            RestCommand::Reload | RestCommand::Restart => self.http.post(url),
        };
        let response = request.send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl DynamicParamUpdater for RestUpdater {
    async fn exec_command(&self, command: &str, args: &[String]) -> UpdaterResult<String> {
        let command = RestCommand::parse(command)?;
        let output = with_timeout(self.options.call_timeout, self.send(command, args)).await??;
        info!(command = command.path(), "rest command executed");
        Ok(output)
    }

    async fn close(&self) {}
}
