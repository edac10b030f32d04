use tracing::info;

use crate::command::Shell;
use crate::control::ControlPlane;
use crate::error::{Result, WfdError};

/// Check a WPS PIN: four digits, or eight digits ending in the WPS checksum.
pub fn validate_pin(pin: &str) -> std::result::Result<(), String> {
    if !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("WPS PIN '{}' must contain only digits", pin));
    }
    match pin.len() {
        4 => Ok(()),
        8 => {
            let value: u32 = pin[..7].parse().map_err(|_| format!("invalid WPS PIN '{}'", pin))?;
            let expected = checksum(value);
            if pin.as_bytes()[7] - b'0' == expected {
                Ok(())
            } else {
                Err(format!("WPS PIN '{}' has a bad checksum digit (expected {})", pin, expected))
            }
        }
        n => Err(format!("WPS PIN must have 4 or 8 digits, got {}", n)),
    }
}

/// WPS checksum digit for the first seven digits of a PIN.
fn checksum(mut pin: u32) -> u8 {
    let mut accum = 0;
    while pin > 0 {
        accum += 3 * (pin % 10);
        pin /= 10;
        accum += pin % 10;
        pin /= 10;
    }
    ((10 - accum % 10) % 10) as u8
}

/// Require `pin` from any peer joining the group on `interface`.
///
/// Without it, anyone who sees the display could connect. `wps_pin` echoes
/// the PIN rather than `OK`, so only the exit status is checked.
pub fn set_pairing_pin<S: Shell + ?Sized>(
    shell: &S,
    control: &ControlPlane,
    interface: &str,
    pin: &str,
) -> Result<()> {
    shell
        .run(&control.on(interface, &["wps_pin", "any", pin]))
        .map_err(|err| WfdError::setup(format!("Unable to set WPS pin for {}", interface), err))?;
    info!(interface, "wps pin armed");
    Ok(())
}
