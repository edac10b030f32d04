//! Wi-Fi Display capability advertisement.
//!
//! A sink announces itself through WFD subelements set on the P2P device
//! before the group exists; peers read them while discovering the group.
//! Each payload is the hex encoding `wpa_supplicant` expects for
//! `wfd_subelem_set`: a 2-byte big-endian length followed by the body.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::Shell;
use crate::control::ControlPlane;
use crate::error::CommandError;

/// WPS primary device type for a Wi-Fi Display sink (category 7, display).
pub const DEVICE_TYPE_DISPLAY_SINK: &str = "7-0050F204-1";

/// Subelement 0: primary sink, session available, RTSP on 554, 300 Mbps.
pub const SUBELEM_DEVICE_INFO: &str = "00060151022a012c";

/// Subelement 1: no associated BSS.
pub const SUBELEM_ASSOCIATED_BSSID: &str = "0006000000000000";

/// Subelement 6: no active session.
pub const SUBELEM_SESSION_INFO: &str = "000700000000000000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WfdSettings {
    pub device_type: String,
    pub device_info: String,
    pub associated_bssid: String,
    pub session_info: String,
}

impl Default for WfdSettings {
    fn default() -> Self {
        Self {
            device_type: DEVICE_TYPE_DISPLAY_SINK.to_string(),
            device_info: SUBELEM_DEVICE_INFO.to_string(),
            associated_bssid: SUBELEM_ASSOCIATED_BSSID.to_string(),
            session_info: SUBELEM_SESSION_INFO.to_string(),
        }
    }
}

impl WfdSettings {
    /// Subelements in the order they are installed.
    pub fn subelements(&self) -> [(u8, &str); 3] {
        [
            (0, self.device_info.as_str()),
            (1, self.associated_bssid.as_str()),
            (6, self.session_info.as_str()),
        ]
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.device_type.trim().is_empty() {
            return Err("WFD device type must not be empty".to_string());
        }
        for (id, payload) in self.subelements() {
            validate_subelement(payload).map_err(|e| format!("WFD subelement {}: {}", id, e))?;
        }
        DeviceInformation::decode(&self.device_info)?;
        Ok(())
    }
}

/// Check that a payload is hex and that its length prefix matches its body.
pub fn validate_subelement(payload: &str) -> Result<(), String> {
    let bytes =
        hex::decode(payload).map_err(|e| format!("invalid hex in payload '{}': {}", payload, e))?;
    if bytes.len() < 2 {
        return Err(format!("payload '{}' is missing its length prefix", payload));
    }
    let declared = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    let actual = bytes.len() - 2;
    if declared != actual {
        return Err(format!(
            "payload '{}' declares {} bytes but carries {}",
            payload, declared, actual
        ));
    }
    Ok(())
}

/// Decoded body of subelement 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInformation {
    pub bitmap: u16,
    pub rtsp_port: u16,
    /// Maximum throughput in Mbps.
    pub max_throughput: u16,
}

impl DeviceInformation {
    pub fn decode(payload: &str) -> Result<Self, String> {
        validate_subelement(payload)?;
        let bytes = hex::decode(payload).map_err(|e| format!("invalid hex in payload '{}': {}", payload, e))?;
        if bytes.len() != 8 {
            return Err(format!("device information payload '{}' must carry 6 bytes", payload));
        }
        let word = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);
        Ok(Self {
            bitmap: word(2),
            rtsp_port: word(4),
            max_throughput: word(6),
        })
    }

    /// Device type field (bits 0-1): 1 is primary sink.
    pub fn device_type(&self) -> u16 {
        self.bitmap & 0b11
    }

    /// Session availability (bits 4-5): 1 is available.
    pub fn session_available(&self) -> bool {
        (self.bitmap >> 4) & 0b11 == 1
    }
}

/// Install the three WFD subelements on `device`.
///
/// # Commands Executed
/// ```bash
/// wpa_cli -i<device> wfd_subelem_set 0 <device_info>
/// wpa_cli -i<device> wfd_subelem_set 1 <associated_bssid>
/// wpa_cli -i<device> wfd_subelem_set 6 <session_info>
/// ```
pub fn advertise_capabilities<S: Shell + ?Sized>(
    shell: &S,
    control: &ControlPlane,
    device: &str,
    settings: &WfdSettings,
) -> Result<(), CommandError> {
    for (id, payload) in settings.subelements() {
        let id = id.to_string();
        shell.run_control_plane(&control.on(device, &["wfd_subelem_set", &id, payload]))?;
        debug!(device, subelement = %id, "wfd subelement set");
    }
    Ok(())
}
