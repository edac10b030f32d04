//! Wi-Fi Direct Display Sink
//!
//! This library turns a Wi-Fi radio into a Wi-Fi Direct (WFD) display sink.
//! It drives the wireless supplicant through `wpa_cli` to find a P2P-capable
//! device and bring up a persistent P2P group that advertises display-sink
//! capabilities, protects pairing with a WPS PIN, assigns the sink a gateway
//! address and runs busybox `udhcpd` so connecting peers get a lease.
//!
//! # Modules
//!
//! - [`command`] - External command execution and background processes
//! - [`config`] - TOML configuration with the per-deployment constants
//! - [`control`] - `wpa_cli` command line construction
//! - [`dhcp`] - DHCP daemon configuration and supervision
//! - [`discovery`] - P2P device discovery
//! - [`error`] - Error types for the library
//! - [`interface`] - Persistent P2P group interface lookup and creation
//! - [`network`] - Gateway address assignment
//! - [`pairing`] - WPS PIN setup and validation
//! - [`player`] - Media player launched once the sink is up
//! - [`privilege`] - Privilege elevation for root-only commands
//! - [`session`] - The open/close lifecycle tying everything together
//! - [`wfd`] - Wi-Fi Display capability subelements
//!
//! # Example Usage
//!
//! ```no_run
//! use displaypi::{Config, P2pSession, SessionSettings, SystemShell};
//!
//! let config = Config::load().expect("Invalid config");
//! let shell = SystemShell::new(config.command_timeout());
//! let mut session = P2pSession::new(shell, SessionSettings::from(&config));
//!
//! session.open("LivingRoomDisplay").expect("Failed to open display sink");
//! println!("Sink up on {:?}", session.interface());
//!
//! session.close();
//! ```

/// Command execution module.
/// Runs external commands and classifies their success, including the
/// trailing `OK` check for control-plane calls.
pub mod command;

/// Configuration module for the deployment constants.
/// Handles reading/writing and validating the TOML config file.
pub mod config;

pub mod control;

/// DHCP server module.
/// Renders the `udhcpd` config, launches the daemon and stops it again.
pub mod dhcp;

pub mod discovery;

/// Error module defining custom error types for the library.
/// Uses `thiserror` for ergonomic error handling.
pub mod error;

/// Interface module for the persistent P2P group interface.
pub mod interface;

pub mod network;

pub mod pairing;

pub mod player;

pub mod privilege;

/// Session module: the display sink lifecycle.
pub mod session;

pub mod wfd;

#[cfg(test)]
pub(crate) mod testing;

// Re-export the pieces needed to run a session
pub use command::{BackgroundProcess, CommandOutput, Shell, SystemShell};
pub use config::Config;
pub use session::{P2pSession, SessionSettings, SessionState};

// Re-export the error types for library users
pub use error::{CommandError, SetupCause, WfdError};
