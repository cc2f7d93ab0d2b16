//! Reload by delivering an OS signal to the database process.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use sysinfo::{Pid, Signal, System};
use tracing::info;

use crate::reload::handler::ConfigHandler;
use crate::reload::{ReloadError, ReloadResult};
use crate::watcher::VolumeEvent;

#[cfg(unix)]
const SIGNAL_TABLE: &[(&str, Signal)] = &[
    ("SIGHUP", Signal::Hangup),
    ("SIGINT", Signal::Interrupt),
    ("SIGQUIT", Signal::Quit),
    ("SIGILL", Signal::Illegal),
    ("SIGTRAP", Signal::Trap),
    ("SIGABRT", Signal::Abort),
    ("SIGBUS", Signal::Bus),
    ("SIGFPE", Signal::FloatingPointException),
    ("SIGKILL", Signal::Kill),
    ("SIGUSR1", Signal::User1),
    ("SIGSEGV", Signal::Segv),
    ("SIGUSR2", Signal::User2),
    ("SIGPIPE", Signal::Pipe),
    ("SIGALRM", Signal::Alarm),
    ("SIGTERM", Signal::Term),
    ("SIGCHLD", Signal::Child),
    ("SIGCONT", Signal::Continue),
    ("SIGSTOP", Signal::Stop),
    ("SIGTSTP", Signal::TSTP),
    ("SIGTTIN", Signal::TTIN),
    ("SIGTTOU", Signal::TTOU),
    ("SIGURG", Signal::Urgent),
    ("SIGXCPU", Signal::XCPU),
    ("SIGXFSZ", Signal::XFSZ),
    ("SIGVTALRM", Signal::VirtualAlarm),
    ("SIGPROF", Signal::Profiling),
    ("SIGWINCH", Signal::Winch),
    ("SIGIO", Signal::IO),
    ("SIGPWR", Signal::Power),
    ("SIGSYS", Signal::Sys),
];

#[cfg(not(unix))]
const SIGNAL_TABLE: &[(&str, Signal)] = &[("SIGKILL", Signal::Kill)];

/// Look up a signal by its `SIG*` name on this platform.
pub fn parse_signal(name: &str) -> Option<Signal> {
    let upper = name.trim().to_ascii_uppercase();
    let wanted = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    SIGNAL_TABLE
        .iter()
        .find(|(n, _)| *n == wanted)
        .map(|(_, sig)| *sig)
}

/// One process-table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcEntry {
    pub pid: u32,
    pub parent: Option<u32>,
    pub name: String,
}

/// The matching process whose parent is not itself a match.
///
/// Ties go to the lowest pid.
pub fn find_root_pid(entries: &[ProcEntry], process_name: &str) -> Option<u32> {
    let matches: Vec<&ProcEntry> = entries.iter().filter(|e| e.name == process_name).collect();
    let pids: HashSet<u32> = matches.iter().map(|e| e.pid).collect();
    matches
        .iter()
        .filter(|e| e.parent.map_or(true, |p| !pids.contains(&p)))
        .map(|e| e.pid)
        .min()
}

fn process_table(sys: &System) -> Vec<ProcEntry> {
    sys.processes()
        .iter()
        .map(|(pid, process)| ProcEntry {
            pid: pid.as_u32(),
            parent: process.parent().map(|p| p.as_u32()),
            name: process.name().to_string(),
        })
        .collect()
}

pub struct SignalHandler {
    process_name: String,
    signal_name: String,
    signal: Signal,
    mount_point: PathBuf,
}

impl SignalHandler {
    pub fn new(signal_name: &str, process_name: &str, mount_point: PathBuf) -> ReloadResult<Self> {
        let signal = parse_signal(signal_name)
            .ok_or_else(|| ReloadError::UnsupportedSignal(signal_name.to_string()))?;
        if process_name.is_empty() {
            return Err(ReloadError::Descriptor("signal handler needs a process name".to_string()));
        }
        Ok(Self {
            process_name: process_name.to_string(),
            signal_name: signal_name.to_string(),
            signal,
            mount_point,
        })
    }

    fn deliver(process_name: &str, signal_name: &str, signal: Signal) -> ReloadResult<u32> {
        let mut sys = System::new();
        sys.refresh_processes();

        let pid = find_root_pid(&process_table(&sys), process_name)
            .ok_or_else(|| ReloadError::ProcessNotFound(process_name.to_string()))?;
        let process = sys
            .process(Pid::from_u32(pid))
            .ok_or_else(|| ReloadError::ProcessNotFound(process_name.to_string()))?;

        match process.kill_with(signal) {
            Some(true) => Ok(pid),
            _ => Err(ReloadError::SignalFailed {
                pid,
                signal: signal_name.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ConfigHandler for SignalHandler {
    async fn online_update(&self, _name: &str, _params: &BTreeMap<String, String>) -> ReloadResult<()> {
        Err(ReloadError::OnlineUpdateNotSupported("signal"))
    }

    async fn volume_handle(&self, _event: &VolumeEvent) -> ReloadResult<()> {
        let process_name = self.process_name.clone();
        let signal_name = self.signal_name.clone();
        let signal = self.signal;
        let pid = tokio::task::spawn_blocking(move || Self::deliver(&process_name, &signal_name, signal)).await??;
        info!(pid, process = %self.process_name, signal = %self.signal_name, "reload signal sent");
        Ok(())
    }

    fn mount_points(&self) -> Vec<PathBuf> {
        vec![self.mount_point.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pid: u32, parent: Option<u32>, name: &str) -> ProcEntry {
        ProcEntry {
            pid,
            parent,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_root_of_forked_workers() {
        let table = vec![
            entry(1, None, "tini"),
            entry(10, Some(1), "postgres"),
            entry(11, Some(10), "postgres"),
            entry(12, Some(10), "postgres"),
        ];
        assert_eq!(find_root_pid(&table, "postgres"), Some(10));
        assert_eq!(find_root_pid(&table, "mysqld"), None);
    }

    #[test]
    fn test_root_ties_pick_lowest_pid() {
        let table = vec![entry(30, Some(1), "redis-server"), entry(20, Some(2), "redis-server")];
        assert_eq!(find_root_pid(&table, "redis-server"), Some(20));
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_table() {
        assert_eq!(parse_signal("SIGHUP"), Some(Signal::Hangup));
        assert_eq!(parse_signal("usr1"), Some(Signal::User1));
        assert_eq!(parse_signal("SIGNOPE"), None);
    }

    #[test]
    fn test_new_rejects_unknown_signal() {
        assert!(matches!(
            SignalHandler::new("SIGNOPE", "mysqld", PathBuf::from("/etc/mysql")),
            Err(ReloadError::UnsupportedSignal(_))
        ));
    }

    #[tokio::test]
    async fn test_online_update_not_supported() {
        let handler = SignalHandler::new("SIGKILL", "mysqld", PathBuf::from("/etc/mysql")).unwrap();
        assert!(handler.online_update("x", &BTreeMap::new()).await.is_err());
    }
}
