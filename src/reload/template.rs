//! Reload by rendering a user-supplied template.
//!
//! The template sees every changed parameter under `parameters`, and also
//! as a top-level variable when the name is a valid identifier. Two
//! functions are registered:
//!
//! - `exec(command="...", args=[...])` runs a process and returns stdout.
//! - `exec_sql(sql="...", args=[...])` runs a command on the command
//!   channel. `args` are bind parameters for SQL channels and the request
//!   body for REST channels.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tera::{Context, Tera};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::parser::FormatterConfig;
use crate::reload::files::{backup_dirs, backup_files, changed_since_backup, FileFilter};
use crate::reload::handler::{owns_event, ConfigHandler};
use crate::reload::meta::TplScriptConfig;
use crate::reload::{ReloadError, ReloadResult};
use crate::updater::{new_updater, DynamicParamUpdater, UpdaterOptions};
use crate::watcher::VolumeEvent;

const SCRIPT_NAME: &str = "reload";

/// Template variables for a parameter set.
pub fn template_context(params: &BTreeMap<String, String>) -> Context {
    let mut context = Context::new();
    for (key, value) in params {
        if is_identifier(key) {
            context.insert(key.as_str(), value);
        }
    }
    context.insert("parameters", params);
    context
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn string_arg(args: &HashMap<String, Value>, name: &str, function: &str) -> tera::Result<String> {
    match args.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(tera::Error::msg(format!("{function}: missing argument '{name}'"))),
    }
}

/// Optional list argument; non-string elements are passed as their JSON text.
fn list_arg(args: &HashMap<String, Value>, name: &str, function: &str) -> tera::Result<Vec<String>> {
    match args.get(name) {
        Some(Value::Array(items)) => Ok(items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect()),
        Some(other) => Err(tera::Error::msg(format!("{function}: {name} must be a list, got {other}"))),
        None => Ok(Vec::new()),
    }
}

fn exec_function(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let command = string_arg(args, "command", "exec")?;
    let argv = list_arg(args, "args", "exec")?;

    let output = std::process::Command::new(&command)
        .args(&argv)
        .output()
        .map_err(|e| tera::Error::msg(format!("exec {command}: {e}")))?;
    if !output.status.success() {
        return Err(tera::Error::msg(format!(
            "exec {command} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(Value::String(String::from_utf8_lossy(&output.stdout).into_owned()))
}

fn get_env_function(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let name = string_arg(args, "name", "get_env")?;
    match std::env::var(&name) {
        Ok(value) => Ok(Value::String(value)),
        Err(_) => match args.get("default") {
            Some(default) => Ok(default.clone()),
            None => Err(tera::Error::msg(format!("get_env: environment variable '{name}' not set"))),
        },
    }
}

/// Render a DSN template with environment access.
pub fn render_dsn(dsn: &str) -> ReloadResult<String> {
    let mut tera = Tera::default();
    tera.register_function("get_env", get_env_function);
    Ok(tera.render_str(dsn, &Context::new())?)
}

/// Render `script` with `params`; must run on a blocking thread when an
/// updater is present, since `exec_sql` blocks on the runtime handle.
fn render_script(
    script: &str,
    params: &BTreeMap<String, String>,
    updater: Option<(Arc<dyn DynamicParamUpdater>, Handle)>,
) -> ReloadResult<String> {
    let mut tera = Tera::default();
    tera.register_function("exec", exec_function);
    tera.register_function("get_env", get_env_function);
    if let Some((updater, handle)) = updater {
        tera.register_function("exec_sql", move |args: &HashMap<String, Value>| {
            let sql = string_arg(args, "sql", "exec_sql")?;
            let params = list_arg(args, "args", "exec_sql")?;
            handle
                .block_on(updater.exec_command(&sql, &params))
                .map(Value::String)
                .map_err(|e| tera::Error::msg(format!("exec_sql: {e}")))
        });
    }
    tera.add_raw_template(SCRIPT_NAME, script)?;
    Ok(tera.render(SCRIPT_NAME, &template_context(params))?)
}

pub struct TplScriptHandler {
    name: String,
    mount_points: Vec<PathBuf>,
    script: String,
    filter: FileFilter,
    formatter: FormatterConfig,
    backup_dir: PathBuf,
    updater: Option<Arc<dyn DynamicParamUpdater>>,
}

impl TplScriptHandler {
    /// Load the script config, check the template parses, connect the
    /// command channel lazily and take the initial backup.
    pub fn create(
        name: &str,
        tpl_config: &Path,
        mount_points: Vec<PathBuf>,
        backup_dir: PathBuf,
        options: UpdaterOptions,
    ) -> ReloadResult<Self> {
        let config = TplScriptConfig::load(tpl_config)?;
        let script_path = tpl_config
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&config.scripts);
        let script = std::fs::read_to_string(&script_path).map_err(|source| ReloadError::Io {
            path: script_path.clone(),
            source,
        })?;
        Tera::default().add_raw_template(SCRIPT_NAME, &script)?;

        let filter = FileFilter::new(config.file_regex.as_deref())?;
        let updater = if config.data_type.is_empty() {
            None
        } else {
            let dsn = if config.dsn.is_empty() {
                String::new()
            } else {
                render_dsn(&config.dsn)?
            };
            Some(new_updater(&config.data_type, &dsn, options)?)
        };

        backup_dirs(&mount_points, &filter, &backup_dir)?;
        Ok(Self {
            name: name.to_string(),
            mount_points,
            script,
            filter,
            formatter: config.formatter_config,
            backup_dir,
            updater,
        })
    }

    async fn render(&self, params: &BTreeMap<String, String>) -> ReloadResult<String> {
        let script = self.script.clone();
        let params = params.clone();
        let updater = self
            .updater
            .clone()
            .map(|updater| (updater, Handle::current()));
        tokio::task::spawn_blocking(move || render_script(&script, &params, updater)).await?
    }
}

#[async_trait]
impl ConfigHandler for TplScriptHandler {
    async fn online_update(&self, _name: &str, params: &BTreeMap<String, String>) -> ReloadResult<()> {
        let output = self.render(params).await?;
        info!(handler = %self.name, params = params.len(), output = %output.trim(), "reload template rendered");
        Ok(())
    }

    async fn volume_handle(&self, event: &VolumeEvent) -> ReloadResult<()> {
        if !owns_event(&self.mount_points, event) {
            debug!(handler = %self.name, path = %event.path.display(), "event outside watched volumes");
            return Ok(());
        }

        let (params, files) =
            changed_since_backup(event.volume_dir(), &self.backup_dir, &self.filter, &self.formatter)?;
        if params.is_empty() {
            info!(handler = %self.name, "no parameter changed, skipping reload");
            return Ok(());
        }

        self.online_update(&self.name, &params).await?;
        backup_files(&files, &self.backup_dir)
    }

    fn mount_points(&self) -> Vec<PathBuf> {
        self.mount_points.clone()
    }
}
