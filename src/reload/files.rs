//! Scanning mounted config files and keeping the last applied copy.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::diff::{diff, updated_parameters, ConfigBundle, ConfigSnapshot};
use crate::parser::FormatterConfig;
use crate::reload::{ReloadError, ReloadResult};

/// Selects which files of a mount point take part in diffing.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    pattern: Option<Regex>,
}

impl FileFilter {
    /// An empty or absent pattern accepts every file.
    pub fn new(pattern: Option<&str>) -> ReloadResult<Self> {
        let pattern = match pattern.filter(|p| !p.is_empty()) {
            Some(p) => Some(Regex::new(p).map_err(|source| ReloadError::Regex {
                pattern: p.to_string(),
                source,
            })?),
            None => None,
        };
        Ok(Self { pattern })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.pattern
            .as_ref()
            .map_or(true, |re| re.is_match(file_name))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ReloadError + '_ {
    move |source| ReloadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Regular files of `dir` that pass `filter`, sorted by name.
///
/// Hidden entries (the `..data` link and versioned dirs) are skipped;
/// symlinks are followed.
pub fn scan_config_files(dir: &Path, filter: &FileFilter) -> ReloadResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with('.') || !filter.matches(name) {
            continue;
        }
        let path = entry.path();
        let metadata = fs::metadata(&path).map_err(io_err(&path))?;
        if metadata.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load files into a bundle keyed by file name.
pub fn read_bundle(files: &[PathBuf]) -> ReloadResult<ConfigBundle> {
    let mut bundle = ConfigBundle::default();
    for path in files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let content = fs::read_to_string(path).map_err(io_err(path))?;
        bundle.files.insert(name.to_string(), content);
    }
    Ok(bundle)
}

/// Copy `files` into `backup_dir`, replacing any previous copy.
pub fn backup_files(files: &[PathBuf], backup_dir: &Path) -> ReloadResult<()> {
    fs::create_dir_all(backup_dir).map_err(io_err(backup_dir))?;
    for path in files {
        let Some(name) = path.file_name() else {
            continue;
        };
        let target = backup_dir.join(name);
        fs::copy(path, &target).map_err(io_err(&target))?;
    }
    debug!(backup = %backup_dir.display(), files = files.len(), "config files backed up");
    Ok(())
}

/// Back up every matching file of each directory.
pub fn backup_dirs(dirs: &[PathBuf], filter: &FileFilter, backup_dir: &Path) -> ReloadResult<()> {
    for dir in dirs {
        let files = scan_config_files(dir, filter)?;
        backup_files(&files, backup_dir)?;
    }
    Ok(())
}

/// Parameters changed in `current_dir` relative to `backup_dir`, plus the
/// current files so the caller can refresh the backup after applying.
pub fn changed_since_backup(
    current_dir: &Path,
    backup_dir: &Path,
    filter: &FileFilter,
    formatter: &FormatterConfig,
) -> ReloadResult<(BTreeMap<String, String>, Vec<PathBuf>)> {
    let current_files = scan_config_files(current_dir, filter)?;
    let backup_files = if backup_dir.exists() {
        scan_config_files(backup_dir, filter)?
    } else {
        Vec::new()
    };

    let current = ConfigSnapshot::build_uniform(&read_bundle(&current_files)?, formatter)?;
    let last = ConfigSnapshot::build_uniform(&read_bundle(&backup_files)?, formatter)?;
    let patch = diff(&last, &current);

    Ok((updated_parameters(&patch), current_files))
}
