use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dhcp::{DhcpPool, DEFAULT_STOP_GRACE};
use crate::pairing;
use crate::wfd::WfdSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for per-interface artifacts; a leading `~/` is expanded.
    pub config_dir: String,
    pub display_name: String,
    pub control_plane: String,
    /// Prefix for privileged commands; empty when already running as root.
    pub privilege: Vec<String>,
    pub gateway_cidr: String,
    pub wps_pin: String,
    /// Per-command timeout in seconds, 0 waits forever.
    pub command_timeout_secs: u64,
    pub dhcp: DhcpConfig,
    pub wfd: WfdSettings,
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DhcpConfig {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub lease_minutes: u32,
    pub daemon: Vec<String>,
    pub stop_grace_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: "~/.displaypi".to_string(),
            display_name: "DisplayPi".to_string(),
            control_plane: "wpa_cli".to_string(),
            privilege: vec!["sudo".to_string()],
            gateway_cidr: "192.168.49.1/24".to_string(),
            wps_pin: "12345670".to_string(),
            command_timeout_secs: 30,
            dhcp: DhcpConfig::default(),
            wfd: WfdSettings::default(),
            player: PlayerConfig::default(),
        }
    }
}

impl Default for DhcpConfig {
    fn default() -> Self {
        let pool = DhcpPool::default();
        Self {
            start: pool.start,
            end: pool.end,
            subnet_mask: pool.subnet_mask,
            lease_minutes: pool.lease_minutes,
            daemon: ["busybox", "udhcpd", "-f", "-S"].iter().map(|s| s.to_string()).collect(),
            stop_grace_secs: DEFAULT_STOP_GRACE.as_secs(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: ["cvlc", "--fullscreen", "--loop"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DhcpConfig {
    pub fn pool(&self) -> DhcpPool {
        DhcpPool {
            start: self.start,
            end: self.end,
            subnet_mask: self.subnet_mask,
            lease_minutes: self.lease_minutes,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Artifact directory with `~/` expanded against the home directory.
    pub fn config_dir(&self) -> PathBuf {
        match (self.config_dir.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(&self.config_dir),
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        match self.command_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.control_plane.trim().is_empty() {
            bail!("control_plane must name the supplicant control utility");
        }
        if self.dhcp.daemon.is_empty() {
            bail!("dhcp.daemon must not be empty");
        }
        if self.player.command.is_empty() {
            bail!("player.command must not be empty");
        }

        let (gateway, prefix) = parse_cidr(&self.gateway_cidr)?;
        let mask = u32::from(self.dhcp.subnet_mask);
        if mask.leading_ones() + mask.trailing_zeros() != 32 {
            bail!("dhcp.subnet_mask {} is not a contiguous netmask", self.dhcp.subnet_mask);
        }
        if mask.leading_ones() != prefix {
            bail!(
                "gateway_cidr /{} does not match dhcp.subnet_mask {}",
                prefix,
                self.dhcp.subnet_mask
            );
        }
        let start = u32::from(self.dhcp.start);
        let end = u32::from(self.dhcp.end);
        if start > end {
            bail!("dhcp.start {} is after dhcp.end {}", self.dhcp.start, self.dhcp.end);
        }
        let network = u32::from(gateway) & mask;
        if start & mask != network || end & mask != network {
            bail!(
                "dhcp pool {}-{} lies outside the gateway subnet {}",
                self.dhcp.start,
                self.dhcp.end,
                self.gateway_cidr
            );
        }
        if (start..=end).contains(&u32::from(gateway)) {
            bail!("dhcp pool must not contain the gateway address {}", gateway);
        }

        pairing::validate_pin(&self.wps_pin).map_err(anyhow::Error::msg)?;
        self.wfd.validate().map_err(anyhow::Error::msg)?;
        Ok(())
    }
}

fn parse_cidr(cidr: &str) -> Result<(Ipv4Addr, u32)> {
    let (addr, prefix) = cidr
        .split_once('/')
        .with_context(|| format!("gateway_cidr '{}' is missing a prefix length", cidr))?;
    let addr: Ipv4Addr = addr
        .parse()
        .with_context(|| format!("gateway_cidr '{}' has an invalid address", cidr))?;
    let prefix: u32 = prefix
        .parse()
        .ok()
        .filter(|p| *p <= 32)
        .with_context(|| format!("gateway_cidr '{}' has an invalid prefix length", cidr))?;
    Ok((addr, prefix))
}

pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?;
    Ok(config_dir.join("displaypi").join("config.toml"))
}
