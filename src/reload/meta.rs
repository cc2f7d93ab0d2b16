//! Sidecar descriptor: which reload action applies to which mounted config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::parser::FormatterConfig;
use crate::reload::{ReloadError, ReloadResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReloadType {
    #[serde(rename = "signal")]
    UnixSignal,
    #[serde(rename = "shell")]
    Shell,
    #[serde(rename = "tplScript")]
    TplScript,
}

impl ReloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadType::UnixSignal => "signal",
            ReloadType::Shell => "shell",
            ReloadType::TplScript => "tplScript",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnixSignalTrigger {
    pub signal: String,
    pub process_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellTrigger {
    pub command: Vec<String>,

    /// Run the command once, feeding every changed parameter on stdin.
    #[serde(default)]
    pub batch_reload: bool,

    /// Template rendering the stdin of a batch reload.
    #[serde(default)]
    pub batch_params_formatter_template: Option<String>,
}

impl ShellTrigger {
    /// The batch template, only when batch mode is on and a template exists.
    pub fn batch_template(&self) -> Option<&str> {
        if !self.batch_reload {
            return None;
        }
        self.batch_params_formatter_template
            .as_deref()
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TplScriptTrigger {
    /// Name of the script config map (informational on the sidecar side).
    #[serde(default)]
    pub script_config_map_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadOptions {
    #[serde(default)]
    pub unix_signal: Option<UnixSignalTrigger>,

    #[serde(default)]
    pub shell: Option<ShellTrigger>,

    #[serde(default)]
    pub tpl_script: Option<TplScriptTrigger>,
}

/// A downward-API volume with its own trigger command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownwardApiOption {
    pub name: String,
    pub mount_point: PathBuf,
    pub command: Vec<String>,
}

/// One mounted config spec and how to reload it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSpecMeta {
    pub config_spec_name: String,
    pub reload_type: ReloadType,
    pub mount_point: PathBuf,

    /// Regex selecting the files of the mount point that are diffed.
    #[serde(default)]
    pub config_file: Option<String>,

    #[serde(default)]
    pub formatter_config: FormatterConfig,

    #[serde(default)]
    pub reload_options: ReloadOptions,

    /// Path of the `TplScriptConfig` YAML for template reloads.
    #[serde(default)]
    pub tpl_config: Option<PathBuf>,

    #[serde(default)]
    pub downward_api_options: Vec<DownwardApiOption>,
}

/// Templated-script settings, loaded from `ConfigSpecMeta::tpl_config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TplScriptConfig {
    /// Script file, relative to the config's own directory.
    pub scripts: String,

    #[serde(default)]
    pub file_regex: Option<String>,

    /// Engine type of the command channel; empty disables `exec_sql`.
    #[serde(default)]
    pub data_type: String,

    /// Command channel DSN, itself rendered as a template.
    #[serde(default)]
    pub dsn: String,

    #[serde(default)]
    pub formatter_config: FormatterConfig,
}

impl TplScriptConfig {
    pub fn load(path: &Path) -> ReloadResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ReloadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

/// Read the descriptor list written next to the sidecar.
pub fn load_descriptor(path: &Path) -> ReloadResult<Vec<ConfigSpecMeta>> {
    let raw = std::fs::read_to_string(path).map_err(|source| ReloadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let metas: Vec<ConfigSpecMeta> = serde_yaml::from_str(&raw)?;
    for meta in &metas {
        validate_meta(meta)?;
    }
    Ok(metas)
}

fn validate_meta(meta: &ConfigSpecMeta) -> ReloadResult<()> {
    let missing = |what: &str| {
        ReloadError::Descriptor(format!(
            "config spec '{}' uses {} reload but has no {}",
            meta.config_spec_name,
            meta.reload_type.as_str(),
            what
        ))
    };
    match meta.reload_type {
        ReloadType::UnixSignal if meta.reload_options.unix_signal.is_none() => Err(missing("unixSignal options")),
        ReloadType::Shell if meta.reload_options.shell.is_none() => Err(missing("shell options")),
        ReloadType::TplScript if meta.tpl_config.is_none() => Err(missing("tplConfig path")),
        _ => Ok(()),
    }
}
