//! Wi-Fi Direct display sink session.
//!
//! [`P2pSession::open`] walks the setup steps in order, each one depending
//! on the previous:
//!
//! 1. discover a P2P-capable device
//! 2. reuse its persistent group interface, or configure the WFD sink
//!    capabilities and create one
//! 3. assign the gateway address (privileged)
//! 4. arm the WPS PIN
//! 5. start the DHCP server
//!
//! A failed `open` leaves host changes in place; [`P2pSession::close`]
//! cleans up what it can and always returns the session to
//! [`SessionState::Closed`].

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::command::Shell;
use crate::config::Config;
use crate::control::ControlPlane;
use crate::dhcp::{self, DhcpHandle, DhcpLauncher, DhcpPool};
use crate::discovery;
use crate::error::{Result, WfdError};
use crate::interface::{self, GroupRequest};
use crate::network;
use crate::pairing;
use crate::privilege::Privilege;
use crate::wfd::WfdSettings;

/// Derived from which session fields are populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No device is held.
    Closed,
    /// A device is held but the DHCP server is not running. Normally the
    /// group interface is known too; after an `open` that failed while
    /// negotiating the interface only the device is set. Either way the
    /// session must be closed before it can be opened again.
    Negotiated,
    /// Device, interface and DHCP server are all up.
    Open,
}

/// Fixed per-deployment values a session is built with.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub config_dir: PathBuf,
    pub control: ControlPlane,
    pub privilege: Privilege,
    pub gateway_cidr: String,
    pub wps_pin: String,
    pub pool: DhcpPool,
    pub dhcp_daemon: Vec<String>,
    pub dhcp_stop_grace: Duration,
    pub wfd: WfdSettings,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            config_dir: config.config_dir(),
            control: ControlPlane::new(config.control_plane.clone()),
            privilege: Privilege::new(config.privilege.clone()),
            gateway_cidr: config.gateway_cidr.clone(),
            wps_pin: config.wps_pin.clone(),
            pool: config.dhcp.pool(),
            dhcp_daemon: config.dhcp.daemon.clone(),
            dhcp_stop_grace: Duration::from_secs(config.dhcp.stop_grace_secs),
            wfd: config.wfd.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

pub struct P2pSession<S: Shell> {
    shell: S,
    settings: SessionSettings,
    device: Option<String>,
    interface: Option<String>,
    dhcp: Option<DhcpHandle>,
}

/// Create `dir` (and parents) readable only by the owner.
fn create_config_dir(dir: &Path) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(|err| WfdError::setup(format!("Unable to create config directory {}", dir.display()), err))
}

impl<S: Shell> P2pSession<S> {
    pub fn new(shell: S, settings: SessionSettings) -> Self {
        Self {
            shell,
            settings,
            device: None,
            interface: None,
            dhcp: None,
        }
    }

    pub fn state(&self) -> SessionState {
        match (&self.device, &self.interface, &self.dhcp) {
            (None, _, _) => SessionState::Closed,
            (Some(_), Some(_), Some(_)) => SessionState::Open,
            (Some(_), Some(_), None) => SessionState::Negotiated,
            // Discovery succeeded but no group interface was obtained.
            (Some(_), None, _) => SessionState::Negotiated,
        }
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    pub fn dhcp(&self) -> Option<&DhcpHandle> {
        self.dhcp.as_ref()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    /// Bring up the display sink, advertised to peers as `display_name`.
    ///
    /// # Errors
    /// - `WfdError::NotClosed` if a previous session was not closed
    /// - `WfdError::InterfaceNotFound` if no P2P device or group interface
    ///   can be located
    /// - `WfdError::Setup` if any configuration step fails
    pub fn open(&mut self, display_name: &str) -> Result<()> {
        if let Some(device) = &self.device {
            return Err(WfdError::NotClosed(device.clone()));
        }

        let settings = &self.settings;
        create_config_dir(&settings.config_dir)?;

        let device = discovery::find_device(&self.shell, &settings.control)?;
        let device = self.device.insert(device);

        let request = GroupRequest {
            display_name,
            wfd: &settings.wfd,
        };
        let iface = interface::negotiate(&self.shell, &settings.control, device, request)?;
        let iface = self.interface.insert(iface);

        network::assign_gateway_ip(&self.shell, &settings.privilege, iface, &settings.gateway_cidr)?;
        pairing::set_pairing_pin(&self.shell, &settings.control, iface, &settings.wps_pin)?;

        let launcher = DhcpLauncher {
            daemon: &settings.dhcp_daemon,
            privilege: &settings.privilege,
            stop_grace: settings.dhcp_stop_grace,
        };
        let handle = dhcp::start(&self.shell, &launcher, iface, &settings.config_dir, &settings.pool)?;
        self.dhcp = Some(handle);

        info!(display_name, interface = %iface, "wifi display sink open");
        Ok(())
    }

    /// Tear the session down. Never fails.
    ///
    /// Removing the P2P group is best effort: a failure is logged and the
    /// session still ends up closed.
    pub fn close(&mut self) {
        dhcp::stop(self.dhcp.take());

        let device = self.device.take();
        let interface = self.interface.take();
        if let (Some(device), Some(interface)) = (device, interface) {
            let argv = self
                .settings
                .control
                .on(&device, &["p2p_group_remove", &interface]);
            match self.shell.run_control_plane(&argv) {
                Ok(_) => info!(device = %device, interface = %interface, "p2p group removed"),
                Err(err) => warn!(device = %device, interface = %interface, error = %err, "failed to remove p2p group"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeShell;
    use tempfile::TempDir;

    fn session(shell: &FakeShell, dir: &TempDir) -> P2pSession<FakeShell> {
        let settings = SessionSettings {
            config_dir: dir.path().join("displaypi"),
            dhcp_stop_grace: Duration::from_millis(10),
            ..SessionSettings::default()
        };
        P2pSession::new(shell.clone(), settings)
    }

    fn scripted_new_group() -> FakeShell {
        let shell = FakeShell::new();
        shell.respond("p2p_find", "Selected interface 'p2p-dev0'\nOK\n");
        shell.fail(" interface", 255, "");
        shell.respond(" interface", "p2p-wlan0-1\n");
        shell.respond("wps_pin", "12345670\n");
        shell
    }

    #[test]
    fn close_without_open_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let shell = FakeShell::new();
        let mut session = session(&shell, &dir);
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(shell.calls().is_empty());
    }

    #[test]
    fn opens_sink_with_new_group() {
        let dir = TempDir::new().unwrap();
        let shell = scripted_new_group();
        let mut session = session(&shell, &dir);

        session.open("LivingRoomDisplay").unwrap();

        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.device(), Some("p2p-dev0"));
        assert_eq!(session.interface(), Some("p2p-wlan0-1"));
        assert!(session.dhcp().is_some());
        assert!(shell.is_running());
    }

    #[test]
    fn setup_steps_run_in_order() {
        let dir = TempDir::new().unwrap();
        let shell = scripted_new_group();
        let mut session = session(&shell, &dir);
        session.open("LivingRoomDisplay").unwrap();

        let at = |needle: &str| shell.position(needle).unwrap();
        let group_add = at("p2p_group_add");
        for capability in ["device_type", "p2p_go_ht40", "wfd_subelem_set 0", "wfd_subelem_set 1", "wfd_subelem_set 6"] {
            assert!(at(capability) < group_add, "{capability} after group creation");
        }
        assert!(group_add < at("ip address flush"));
        assert!(at("ip address flush") < at("ip address add"));
        assert!(at("ip address add") < at("wps_pin"));
        assert!(at("wps_pin") < at("spawn"));
    }

    #[test]
    fn config_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let shell = scripted_new_group();
        let mut session = session(&shell, &dir);
        session.open("Sink").unwrap();

        let mode = std::fs::metadata(dir.path().join("displaypi")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn discovery_failure_starts_nothing() {
        let dir = TempDir::new().unwrap();
        let shell = FakeShell::new();
        shell.fail("p2p_find", 255, "Failed to connect to non-global ctrl_ifname");
        let mut session = session(&shell, &dir);

        let err = session.open("Sink").unwrap_err();
        assert!(matches!(err, WfdError::InterfaceNotFound { .. }));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(shell.spawned().is_empty());
        assert_eq!(shell.calls().len(), 1);
    }

    #[test]
    fn unparsable_discovery_output_starts_nothing() {
        let dir = TempDir::new().unwrap();
        let shell = FakeShell::new();
        shell.respond("p2p_find", "OK\n");
        let mut session = session(&shell, &dir);

        assert!(matches!(
            session.open("Sink").unwrap_err(),
            WfdError::InterfaceNotFound { .. }
        ));
        assert!(shell.spawned().is_empty());
    }

    #[test]
    fn close_stops_dhcp_then_removes_group() {
        let dir = TempDir::new().unwrap();
        let shell = scripted_new_group();
        let mut session = session(&shell, &dir);
        session.open("Sink").unwrap();

        session.close();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(shell.signals(), vec!["terminate"]);
        let calls = shell.calls();
        assert_eq!(calls.last().unwrap(), "wpa_cli -ip2p-dev0 p2p_group_remove p2p-wlan0-1");

        session.close();
        assert_eq!(shell.calls().len(), calls.len());
    }

    #[test]
    fn group_removal_failure_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let shell = scripted_new_group();
        shell.respond("p2p_group_remove", "FAIL\n");
        let mut session = session(&shell, &dir);
        session.open("Sink").unwrap();

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.dhcp().is_none());
    }

    #[test]
    fn failed_open_can_be_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let shell = FakeShell::new();
        shell.respond("p2p_find", "Selected interface 'p2p-dev0'\nOK\n");
        shell.respond(" interface", "p2p-wlan0-1\n");
        shell.fail("wps_pin", 1, "");
        let mut session = session(&shell, &dir);

        let err = session.open("Sink").unwrap_err();
        assert!(matches!(err, WfdError::Setup { .. }));
        assert_eq!(session.state(), SessionState::Negotiated);
        assert!(matches!(session.open("Sink"), Err(WfdError::NotClosed(_))));

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(shell.spawned().is_empty());
        assert!(shell.position("p2p_group_remove p2p-wlan0-1").is_some());
    }

    #[test]
    fn failed_negotiation_holds_only_the_device() {
        let dir = TempDir::new().unwrap();
        let shell = FakeShell::new();
        shell.respond("p2p_find", "Selected interface 'p2p-dev0'\nOK\n");
        shell.fail(" interface", 1, "");
        shell.respond("p2p_group_add", "FAIL\n");
        let mut session = session(&shell, &dir);

        let err = session.open("Sink").unwrap_err();
        assert!(matches!(err, WfdError::Setup { .. }));
        assert_eq!(session.device(), Some("p2p-dev0"));
        assert_eq!(session.interface(), None);
        assert_eq!(session.state(), SessionState::Negotiated);
        assert!(matches!(session.open("Sink"), Err(WfdError::NotClosed(_))));

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(shell.position("p2p_group_remove").is_none());
        assert!(shell.spawned().is_empty());
    }

    #[test]
    fn session_can_be_reopened_after_close() {
        let dir = TempDir::new().unwrap();
        let shell = scripted_new_group();
        let mut session = session(&shell, &dir);

        session.open("Sink").unwrap();
        session.close();
        session.open("Sink").unwrap();

        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(shell.spawned().len(), 2);
    }
}
