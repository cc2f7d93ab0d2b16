//! Reload by running a shell command.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tera::{Context, Tera};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::parser::FormatterConfig;
use crate::reload::files::{backup_dirs, backup_files, changed_since_backup, FileFilter};
use crate::reload::handler::ConfigHandler;
use crate::reload::meta::{ConfigSpecMeta, DownwardApiOption};
use crate::reload::template::template_context;
use crate::reload::{ReloadError, ReloadResult};
use crate::watcher::VolumeEvent;

/// Placeholder in command arguments replaced by the directory containing the
/// changed entry. For a `..data` swap that is the mount point, not the event
/// path itself.
pub const VOLUME_DIR_PLACEHOLDER: &str = "$volume_dir";

/// Diff state for handlers that run once per changed parameter.
struct BackupState {
    dir: PathBuf,
    filter: FileFilter,
    formatter: FormatterConfig,
}

/// Runs a command when a watched volume changes. `$volume_dir` in the
/// arguments expands to the parent directory of the event path.
pub struct ShellHandler {
    name: String,
    program: String,
    args: Vec<String>,
    mount_point: PathBuf,
    backup: Option<BackupState>,
    batch_template: Option<String>,
    downward: BTreeMap<PathBuf, ShellHandler>,
    /// Downward-API handlers run on every event, without diffing.
    unconditional: bool,
}

impl ShellHandler {
    /// Build from a descriptor entry. With `backup_dir`, the current files
    /// are copied there so the first event has something to diff against.
    pub fn from_meta(meta: &ConfigSpecMeta, backup_dir: Option<PathBuf>) -> ReloadResult<Self> {
        let trigger = meta.reload_options.shell.as_ref().ok_or_else(|| {
            ReloadError::Descriptor(format!("config spec '{}' has no shell options", meta.config_spec_name))
        })?;
        let mut handler = Self::command(&meta.config_spec_name, &trigger.command, meta.mount_point.clone())?;
        handler.batch_template = trigger.batch_template().map(str::to_string);

        if let Some(dir) = backup_dir {
            let filter = FileFilter::new(meta.config_file.as_deref())?;
            backup_dirs(&[meta.mount_point.clone()], &filter, &dir)?;
            handler.backup = Some(BackupState {
                dir,
                filter,
                formatter: meta.formatter_config.clone(),
            });
        }

        for option in &meta.downward_api_options {
            let sub = Self::downward(&meta.config_spec_name, option)?;
            handler.downward.insert(option.mount_point.clone(), sub);
        }
        Ok(handler)
    }

    /// A plain command handler without diffing.
    pub fn command(name: &str, command: &[String], mount_point: PathBuf) -> ReloadResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| ReloadError::InvalidCommand(format!("empty command for '{name}'")))?;
        Ok(Self {
            name: name.to_string(),
            program: program.clone(),
            args: args.to_vec(),
            mount_point,
            backup: None,
            batch_template: None,
            downward: BTreeMap::new(),
            unconditional: false,
        })
    }

    fn downward(parent: &str, option: &DownwardApiOption) -> ReloadResult<Self> {
        let name = format!("{parent}.{}", option.name);
        let mut handler = Self::command(&name, &option.command, option.mount_point.clone())?;
        handler.unconditional = true;
        Ok(handler)
    }

    fn substituted_args(&self, volume_dir: &Path) -> Vec<String> {
        let dir = volume_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(VOLUME_DIR_PLACEHOLDER, &dir))
            .collect()
    }

    fn downward_for(&self, event: &VolumeEvent) -> Option<&ShellHandler> {
        self.downward
            .iter()
            .find(|(mount, _)| event.path.starts_with(mount))
            .map(|(_, handler)| handler)
    }

    /// Run once per parameter (`args.. name value`) or once in batch mode.
    async fn apply_params(&self, params: &BTreeMap<String, String>, args: &[String]) -> ReloadResult<()> {
        if let Some(template) = &self.batch_template {
            let stdin = render_batch_input(template, params)?;
            let output = run_command(&self.program, args, Some(stdin)).await?;
            info!(handler = %self.name, stdout = %output.trim(), "batch reload finished");
            return Ok(());
        }

        for (key, value) in params {
            let mut full = args.to_vec();
            full.push(key.clone());
            full.push(value.clone());
            let output = run_command(&self.program, &full, None).await?;
            debug!(handler = %self.name, param = %key, stdout = %output.trim(), "reload command finished");
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigHandler for ShellHandler {
    async fn online_update(&self, _name: &str, params: &BTreeMap<String, String>) -> ReloadResult<()> {
        info!(handler = %self.name, params = ?params, "online update via shell");
        self.apply_params(params, &self.args).await
    }

    async fn volume_handle(&self, event: &VolumeEvent) -> ReloadResult<()> {
        if let Some(sub) = self.downward_for(event) {
            return sub.volume_handle(event).await;
        }

        let args = self.substituted_args(event.volume_dir());
        let Some(backup) = self.backup.as_ref().filter(|_| !self.unconditional) else {
            let output = run_command(&self.program, &args, None).await?;
            info!(handler = %self.name, stdout = %output.trim(), "reload command finished");
            return Ok(());
        };

        let (params, files) =
            changed_since_backup(event.volume_dir(), &backup.dir, &backup.filter, &backup.formatter)?;
        if params.is_empty() {
            info!(handler = %self.name, "no parameter changed, skipping reload");
            return Ok(());
        }

        info!(handler = %self.name, params = ?params, "applying changed parameters");
        self.apply_params(&params, &args).await?;
        backup_files(&files, &backup.dir)
    }

    fn mount_points(&self) -> Vec<PathBuf> {
        let mut points = vec![self.mount_point.clone()];
        points.extend(self.downward.keys().cloned());
        points
    }
}

/// Render the stdin of a batch reload; always ends with one newline.
pub fn render_batch_input(template: &str, params: &BTreeMap<String, String>) -> ReloadResult<String> {
    let context: Context = template_context(params);
    let rendered = Tera::one_off(template, &context, false)?;
    Ok(format!("{}\n", rendered.trim()))
}

/// Run a command, returning stdout. A non-zero exit is an error carrying
/// stderr.
pub async fn run_command(program: &str, args: &[String], stdin: Option<String>) -> ReloadResult<String> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .kill_on_drop(true);

    let rendered = format!("{} {}", program, args.join(" "));
    let mut child = command.spawn().map_err(|source| ReloadError::Spawn {
        command: rendered.clone(),
        source,
    })?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())
            .await
            .map_err(|source| ReloadError::Spawn {
                command: rendered.clone(),
                source,
            })?;
    }

    let output = child.wait_with_output().await.map_err(|source| ReloadError::Spawn {
        command: rendered.clone(),
        source,
    })?;
    if !output.status.success() {
        return Err(ReloadError::CommandFailed {
            command: rendered,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
