//! P2P device discovery.
//!
//! Asks the supplicant to start a progressive P2P find. `wpa_cli` answers
//! with the device it picked for the request before the `OK`:
//!
//! ```text
//! Selected interface 'p2p-dev-wlan0'
//! OK
//! ```
//!
//! That selected device is the radio the rest of the session configures.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

use crate::command::Shell;
use crate::control::ControlPlane;
use crate::error::{Result, WfdError};

/// Discovery flavour requested from the supplicant.
pub const DISCOVERY_TYPE: &str = "type=progressive";

lazy_static! {
    static ref SELECTED_INTERFACE: Regex =
        Regex::new(r"(?m)Selected interface '(.+)'").expect("selected interface pattern");
}

/// Extract the device name from `p2p_find` output.
pub fn parse_selected_interface(output: &str) -> Option<&str> {
    SELECTED_INTERFACE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Find a wireless device that supports progressive P2P discovery.
///
/// # Command Executed
/// ```bash
/// wpa_cli p2p_find type=progressive
/// ```
///
/// # Errors
/// `WfdError::InterfaceNotFound` when the command fails (including a missing
/// `OK`) or its output names no device.
pub fn find_device<S: Shell + ?Sized>(shell: &S, control: &ControlPlane) -> Result<String> {
    let output = shell
        .run_control_plane(&control.global(&["p2p_find", DISCOVERY_TYPE]))
        .map_err(|err| WfdError::InterfaceNotFound {
            message: "No progressive p2p device found".to_string(),
            source: Some(err),
        })?;

    let device = parse_selected_interface(&output).ok_or_else(|| WfdError::InterfaceNotFound {
        message: format!("No progressive p2p device found in output: {}", output.trim()),
        source: None,
    })?;

    info!(device, "selected p2p device");
    Ok(device.to_string())
}
