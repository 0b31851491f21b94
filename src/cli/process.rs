// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Child process control: cancellation, process-tree termination and
//! liveness checks

use std::collections::HashMap;
use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System};
use tracing::debug;

/// Poll interval used while waiting on a child
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared cancellation flag, set from the Ctrl-C handler
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Owns a spawned child; the whole process tree is killed if the guard is
/// dropped while the child is still running
pub(crate) struct ProcessGuard {
    child: Option<Child>,
}

impl ProcessGuard {
    pub(crate) fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    pub(crate) fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => child.try_wait(),
            None => Err(std::io::Error::other("child already reaped")),
        }
    }

    /// SIGTERM the tree, wait up to `grace`, then SIGKILL whatever is left.
    pub(crate) fn terminate(&mut self, grace: Duration) -> Option<ExitStatus> {
        let mut child = self.child.take()?;
        let pid = child.id();
        let tree = collect_process_tree(pid);

        signal_group(pid, Signal::Term);
        signal_pids(&tree, Signal::Term);

        let deadline = Instant::now() + grace;
        let mut status = None;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(s)) => {
                    status = Some(s);
                    break;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(_) => break,
            }
        }

        // Descendants may outlive the root, so the group and the tree are
        // always killed.
        signal_group(pid, Signal::Kill);
        signal_pids(&tree, Signal::Kill);

        if status.is_none() {
            debug!(pid, "child ignored SIGTERM, killed");
            let _ = child.kill();
        }
        child.wait().ok().or(status)
    }

    /// SIGKILL whatever is left in the child's process group once the child
    /// itself has exited
    pub(crate) fn kill_group(&mut self) {
        if let Some(child) = self.child.as_ref() {
            signal_group(child.id(), Signal::Kill);
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(None) => {}
                Ok(Some(_)) | Err(_) => return,
            }
            let pid = child.id();
            signal_group(pid, Signal::Kill);
            kill_process_tree(Some(pid));
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// SIGKILL a process and all of its descendants
pub fn kill_process_tree(pid: Option<u32>) {
    if let Some(pid) = pid {
        signal_pids(&collect_process_tree(pid), Signal::Kill);
    }
}

/// Whether `pid` names a live (non-zombie) process
pub fn is_alive(pid: u32) -> bool {
    let mut sys = System::new();
    let pid = Pid::from_u32(pid);
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid)
        .is_some_and(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
}

/// `pid` followed by every descendant, parents before children
fn collect_process_tree(pid: u32) -> Vec<Pid> {
    let root = Pid::from_u32(pid);

    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let mut children_map: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (p, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            children_map.entry(parent).or_default().push(*p);
        }
    }

    let mut out = Vec::new();
    walk_tree(root, &children_map, &mut out);
    out
}

fn walk_tree(pid: Pid, children_map: &HashMap<Pid, Vec<Pid>>, out: &mut Vec<Pid>) {
    out.push(pid);
    if let Some(children) = children_map.get(&pid) {
        for child in children {
            walk_tree(*child, children_map, out);
        }
    }
}

fn signal_pids(pids: &[Pid], signal: Signal) {
    if pids.is_empty() {
        return;
    }
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(pids), true);

    // Children first.
    for pid in pids.iter().rev() {
        if let Some(process) = sys.process(*pid) {
            match process.kill_with(signal) {
                Some(true) => {}
                Some(false) | None => {
                    if signal == Signal::Kill {
                        let _ = process.kill();
                    }
                }
            }
        }
    }
}

/// Signal the process group led by `pid` (children are spawned as group
/// leaders)
#[cfg(unix)]
fn signal_group(pid: u32, signal: Signal) {
    use nix::sys::signal::{killpg, Signal as NixSignal};
    use nix::unistd::Pid as NixPid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    let signal = match signal {
        Signal::Term => NixSignal::SIGTERM,
        _ => NixSignal::SIGKILL,
    };
    // ESRCH once the group is gone
    let _ = killpg(NixPid::from_raw(raw), signal);
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: Signal) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_unknown_pid_is_noop() {
        kill_process_tree(None);
        kill_process_tree(Some(u32::MAX - 1));
        assert!(!is_alive(u32::MAX - 1));
    }

    #[cfg(unix)]
    #[test]
    fn test_guard_kills_running_child_on_drop() {
        use std::os::unix::process::CommandExt;
        use std::process::{Command, Stdio};

        let child = Command::new("/bin/sh")
            .args(["-c", "sleep 30"])
            .stdin(Stdio::null())
            .process_group(0)
            .spawn()
            .unwrap();
        let pid = child.id();
        assert!(is_alive(pid));
        drop(ProcessGuard::new(child));
        assert!(!is_alive(pid));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_reaps_child() {
        use std::os::unix::process::CommandExt;
        use std::process::{Command, Stdio};

        let child = Command::new("/bin/sh")
            .args(["-c", "sleep 30"])
            .stdin(Stdio::null())
            .process_group(0)
            .spawn()
            .unwrap();
        let mut guard = ProcessGuard::new(child);
        let status = guard.terminate(Duration::from_secs(2));
        assert!(status.is_some_and(|s| !s.success()));
        assert!(guard.try_wait().is_err());
    }
}
