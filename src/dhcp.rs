//! Embedded DHCP server for peers joining the P2P group.
//!
//! Runs busybox `udhcpd` in the foreground as a child the session owns.
//! Files live in the session's config directory and carry the interface name
//! so several interfaces can share the directory:
//!
//! - `udhcp_<interface>.conf` - rendered config, deleted right after spawn
//! - `udhcp_<interface>.leases` - lease database, must exist before launch
//! - `udhcp_<interface>.pid` - written by the daemon
//!
//! # Shutdown
//!
//! [`DhcpHandle::stop`] sends SIGTERM and waits up to the grace period
//! (10 seconds by default) so the daemon can flush its leases, then sends
//! SIGKILL. Both signals go to the daemon's process group, so they reach
//! `udhcpd` itself and not only the `sudo` in front of it. A forced kill is
//! logged, never returned as an error. Dropping a handle that was not
//! stopped runs the same sequence.

use std::fs::{self, OpenOptions};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::command::{BackgroundProcess, Shell};
use crate::error::{Result, WfdError};
use crate::privilege::Privilege;

pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Address pool and lease settings handed to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpPool {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub lease_minutes: u32,
}

impl Default for DhcpPool {
    fn default() -> Self {
        Self {
            start: Ipv4Addr::new(192, 168, 49, 2),
            end: Ipv4Addr::new(192, 168, 49, 254),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            lease_minutes: 60,
        }
    }
}

/// Per-interface artifact paths under the config directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpPaths {
    pub config: PathBuf,
    pub pid: PathBuf,
    pub leases: PathBuf,
}

impl DhcpPaths {
    pub fn new(config_dir: &Path, interface: &str) -> Self {
        let file = |ext: &str| config_dir.join(format!("udhcp_{}.{}", interface, ext));
        Self {
            config: file("conf"),
            pid: file("pid"),
            leases: file("leases"),
        }
    }
}

/// Render the `udhcpd` config: one `key value` pair per line.
pub fn render_config(interface: &str, pool: &DhcpPool, paths: &DhcpPaths) -> String {
    format!(
        "start {}\n\
         end {}\n\
         interface {}\n\
         option subnet {}\n\
         option lease {}\n\
         lease_file {}\n\
         pidfile {}\n",
        pool.start,
        pool.end,
        interface,
        pool.subnet_mask,
        pool.lease_minutes,
        paths.leases.display(),
        paths.pid.display(),
    )
}

/// How to launch and stop the daemon.
#[derive(Debug, Clone)]
pub struct DhcpLauncher<'a> {
    /// Daemon command line without the config path, e.g.
    /// `busybox udhcpd -f -S`.
    pub daemon: &'a [String],
    pub privilege: &'a Privilege,
    pub stop_grace: Duration,
}

/// Start the DHCP daemon on `interface`.
///
/// # Arguments
/// * `interface` - The P2P group interface the daemon binds to
/// * `config_dir` - Directory for the config, lease and pid files
/// * `pool` - Address range, netmask and lease time
///
/// # Returns
/// A [`DhcpHandle`] owning the running daemon.
///
/// # Command Executed
/// ```bash
/// sudo busybox udhcpd -f -S <config_dir>/udhcp_<interface>.conf
/// ```
pub fn start<S: Shell + ?Sized>(
    shell: &S,
    launcher: &DhcpLauncher<'_>,
    interface: &str,
    config_dir: &Path,
    pool: &DhcpPool,
) -> Result<DhcpHandle> {
    let paths = DhcpPaths::new(config_dir, interface);

    // udhcpd refuses to start without an existing lease file
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.leases)
        .map_err(|err| {
            WfdError::setup(format!("Unable to create lease file {}", paths.leases.display()), err)
        })?;

    fs::write(&paths.config, render_config(interface, pool, &paths)).map_err(|err| {
        WfdError::setup(format!("Unable to write DHCP config {}", paths.config.display()), err)
    })?;

    let mut argv = launcher.daemon.to_vec();
    argv.push(paths.config.display().to_string());
    let spawned = shell.spawn_background(&launcher.privilege.wrap(argv));

    // The daemon reads its config once at startup.
    if let Err(err) = fs::remove_file(&paths.config) {
        warn!(path = %paths.config.display(), error = %err, "could not remove DHCP config");
    }

    let process = spawned
        .map_err(|err| WfdError::setup(format!("Unable to start DHCP server on {}", interface), err))?;

    info!(interface, pid = process.id(), start = %pool.start, end = %pool.end, "dhcp server started");
    Ok(DhcpHandle {
        interface: interface.to_string(),
        paths,
        process: Some(process),
        stop_grace: launcher.stop_grace,
    })
}

/// How a daemon went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited within the grace period after SIGTERM.
    Terminated,
    /// Still running after the grace period and was killed.
    Killed,
}

/// Sole owner of a running DHCP daemon.
pub struct DhcpHandle {
    interface: String,
    paths: DhcpPaths,
    process: Option<Box<dyn BackgroundProcess>>,
    stop_grace: Duration,
}

impl DhcpHandle {
    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn paths(&self) -> &DhcpPaths {
        &self.paths
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(|p| p.id())
    }

    /// Stop the daemon: SIGTERM, bounded wait, then SIGKILL.
    pub fn stop(mut self) -> Option<StopOutcome> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<StopOutcome> {
        let mut process = self.process.take()?;
        let pid = process.id();

        if let Err(err) = process.terminate() {
            warn!(pid, error = %err, "failed to signal DHCP server");
        }

        match process.wait_for_exit(self.stop_grace) {
            Ok(true) => {
                info!(interface = %self.interface, pid, "dhcp server stopped");
                return Some(StopOutcome::Terminated);
            }
            Ok(false) => {
                warn!(pid, grace = ?self.stop_grace, "dhcp server ignored SIGTERM, killing it");
            }
            Err(err) => {
                warn!(pid, error = %err, "failed waiting for DHCP server, killing it");
            }
        }

        if let Err(err) = process.kill() {
            warn!(pid, error = %err, "failed to kill DHCP server");
        }
        Some(StopOutcome::Killed)
    }
}

impl Drop for DhcpHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Stop `handle` if there is one; `None` is a no-op.
pub fn stop(handle: Option<DhcpHandle>) -> Option<StopOutcome> {
    handle.and_then(DhcpHandle::stop)
}
