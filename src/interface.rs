use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

use crate::command::Shell;
use crate::control::ControlPlane;
use crate::error::{Result, SetupCause, WfdError};
use crate::wfd::{self, WfdSettings};

lazy_static! {
    static ref GROUP_INTERFACE: Regex = Regex::new(r"p2p-wl\S*").expect("group interface pattern");
}

/// Everything needed to create a group when no persistent one exists.
#[derive(Debug, Clone, Copy)]
pub struct GroupRequest<'a> {
    pub display_name: &'a str,
    pub wfd: &'a WfdSettings,
}

/// First P2P group interface name (`p2p-wl...`) in `wpa_cli interface` output
pub fn parse_group_interface(output: &str) -> Option<&str> {
    GROUP_INTERFACE.find(output).map(|m| m.as_str())
}

/// Find the persistent P2P group interface bound to `device`
pub fn find_persistent_interface<S: Shell + ?Sized>(
    shell: &S,
    control: &ControlPlane,
    device: &str,
) -> Result<String> {
    let output = shell
        .run(&control.on(device, &["interface"]))
        .map_err(|err| WfdError::InterfaceNotFound {
            message: format!("Failed to detect the p2p interface on {}", device),
            source: Some(err),
        })?;

    parse_group_interface(&output)
        .map(str::to_string)
        .ok_or_else(|| WfdError::InterfaceNotFound {
            message: format!("No p2p group interface bound to {}", device),
            source: None,
        })
}

/// Configure `device` as a display sink and add a persistent group.
///
/// The capability subelements go out before `p2p_group_add`: peers read
/// them while discovering the group. Nothing is rolled back if a step fails.
pub fn create_interface<S: Shell + ?Sized>(
    shell: &S,
    control: &ControlPlane,
    device: &str,
    request: GroupRequest<'_>,
) -> Result<String> {
    let configure = || -> std::result::Result<(), crate::error::CommandError> {
        shell.run_control_plane(&control.on(device, &["set", "device_name", request.display_name]))?;
        shell.run_control_plane(&control.on(device, &["set", "device_type", &request.wfd.device_type]))?;
        shell.run_control_plane(&control.on(device, &["set", "p2p_go_ht40", "1"]))?;
        wfd::advertise_capabilities(shell, control, device, request.wfd)?;
        shell.run_control_plane(&control.on(device, &["p2p_group_add", "persistent", "ht40"]))?;
        Ok(())
    };
    configure().map_err(|err| WfdError::setup(format!("Unable to establish p2p wifi for {}", device), err))?;

    find_persistent_interface(shell, control, device).map_err(|err| {
        WfdError::setup(
            format!("Group creation on {} reported success but no group interface appeared", device),
            SetupCause::Lookup(Box::new(err)),
        )
    })
}

/// Reuse the persistent group interface of `device`, creating it if needed
pub fn negotiate<S: Shell + ?Sized>(
    shell: &S,
    control: &ControlPlane,
    device: &str,
    request: GroupRequest<'_>,
) -> Result<String> {
    match find_persistent_interface(shell, control, device) {
        Ok(interface) => {
            info!(device, interface = %interface, "reusing persistent p2p group");
            Ok(interface)
        }
        Err(err) => {
            info!(device, reason = %err, "no persistent p2p group, creating one");
            let interface = create_interface(shell, control, device, request)?;
            info!(device, interface = %interface, "created persistent p2p group");
            Ok(interface)
        }
    }
}
