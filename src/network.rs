//! Gateway address assignment for the P2P group interface.
//!
//! This is the one configuration step that needs elevated privileges; the
//! commands are wrapped by [`Privilege`] and nothing else here touches the
//! host.

use tracing::info;

use crate::command::Shell;
use crate::error::{Result, WfdError};
use crate::privilege::Privilege;

/// Replace any address on `interface` with `gateway_cidr`.
///
/// # Arguments
/// * `interface` - The P2P group interface (e.g., "p2p-wlan0-1")
/// * `gateway_cidr` - Address with prefix length (e.g., "192.168.49.1/24");
///   must lie in the subnet handed out by the DHCP pool
///
/// # Commands Executed
/// ```bash
/// sudo ip address flush dev <interface>
/// sudo ip address add <gateway_cidr> dev <interface>
/// ```
///
/// The flush makes the call idempotent: re-running it on an interface that
/// already carries the gateway does not fail with "File exists".
pub fn assign_gateway_ip<S: Shell + ?Sized>(
    shell: &S,
    privilege: &Privilege,
    interface: &str,
    gateway_cidr: &str,
) -> Result<()> {
    let ip = |args: &[&str]| -> Vec<String> {
        privilege.wrap(
            std::iter::once("ip")
                .chain(args.iter().copied())
                .map(String::from)
                .collect(),
        )
    };

    shell
        .run(&ip(&["address", "flush", "dev", interface]))
        .map_err(|err| WfdError::setup(format!("Unable to flush addresses on {}", interface), err))?;

    shell
        .run(&ip(&["address", "add", gateway_cidr, "dev", interface]))
        .map_err(|err| {
            WfdError::setup(format!("Unable to assign {} to {}", gateway_cidr, interface), err)
        })?;

    info!(interface, gateway = gateway_cidr, "gateway address assigned");
    Ok(())
}
