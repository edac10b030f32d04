use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

use displaypi::{
    config::{self, Config},
    control::ControlPlane,
    discovery, interface,
    player::{Player, ProcessPlayer},
    wfd::DeviceInformation,
    P2pSession, SessionSettings, SystemShell,
};

const PLAYER_STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "displaypi")]
#[command(about = "Run a Wi-Fi Direct display sink on this machine")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log every executed command
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the display sink and keep it up until Ctrl-C
    Run {
        /// Name shown to peers (defaults to display_name from the config)
        #[arg(short, long)]
        name: Option<String>,

        /// Media file or stream URL to play once the sink is up
        #[arg(short, long)]
        media: Option<String>,
    },

    /// Look up the P2P device and its persistent group interface
    Discover,

    /// Show the effective configuration
    ShowConfig,

    /// Write a config file with the default settings
    InitConfig {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    let path = match cli.config {
        Some(path) => path,
        None => config::config_path()?,
    };

    match cli.command {
        Commands::Run { name, media } => {
            let cfg = Config::load_from(&path)?;
            cmd_run(&cfg, name.as_deref(), media.as_deref()).await
        }
        Commands::Discover => cmd_discover(&Config::load_from(&path)?),
        Commands::ShowConfig => cmd_show_config(&path),
        Commands::InitConfig { force } => cmd_init_config(&path, force),
    }
}

async fn cmd_run(cfg: &Config, name: Option<&str>, media: Option<&str>) -> Result<()> {
    let name = name.unwrap_or(&cfg.display_name);
    let shell = SystemShell::new(cfg.command_timeout());
    let mut session = P2pSession::new(shell, SessionSettings::from(cfg));

    println!("Opening display sink '{}'...", name);
    let served = match session.open(name) {
        Ok(()) => serve(&session, cfg, media).await,
        Err(err) => Err(anyhow::Error::new(err).context("Failed to open display sink")),
    };

    // Clean up even after a failed open: stop DHCP and drop the group.
    println!("Closing display sink...");
    session.close();
    served
}

async fn serve(session: &P2pSession<SystemShell>, cfg: &Config, media: Option<&str>) -> Result<()> {
    println!();
    println!("Device:    {}", session.device().unwrap_or("-"));
    println!("Interface: {}", session.interface().unwrap_or("-"));
    println!("Gateway:   {}", cfg.gateway_cidr);
    println!("DHCP:      {} - {}", cfg.dhcp.start, cfg.dhcp.end);
    println!("WPS PIN:   {}", cfg.wps_pin);
    println!();

    let mut player = ProcessPlayer::new(session.shell(), cfg.player.command.clone(), PLAYER_STOP_GRACE);
    if let Some(uri) = media {
        player.open(uri);
        player.play().context("Failed to start media player")?;
        println!("Playing {}", uri);
    }

    println!("Display sink is up. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    player.stop();
    Ok(())
}

fn cmd_discover(cfg: &Config) -> Result<()> {
    let shell = SystemShell::new(cfg.command_timeout());
    let control = ControlPlane::new(cfg.control_plane.clone());

    let device = discovery::find_device(&shell, &control)?;
    println!("P2P device:       {}", device);

    match interface::find_persistent_interface(&shell, &control, &device) {
        Ok(iface) => println!("Persistent group: {}", iface),
        Err(_) => println!("Persistent group: (none, created on first run)"),
    }

    Ok(())
}

fn cmd_show_config(path: &Path) -> Result<()> {
    println!("Config file: {}", path.display());
    if !path.exists() {
        println!("(not present, using defaults)");
    }
    println!();

    let cfg = Config::load_from(path)?;
    print!("{}", toml::to_string_pretty(&cfg).context("Failed to serialize config")?);

    println!();
    println!("Artifacts:   {}", cfg.config_dir().display());
    let info = DeviceInformation::decode(&cfg.wfd.device_info).map_err(anyhow::Error::msg)?;
    println!(
        "WFD sink:    type {}, session {}, RTSP port {}, {} Mbps",
        info.device_type(),
        if info.session_available() { "available" } else { "unavailable" },
        info.rtsp_port,
        info.max_throughput
    );

    Ok(())
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("Config file {} already exists (use --force to overwrite)", path.display());
    }

    Config::default().save_to(path)?;
    println!("Wrote default config to {}", path.display());

    Ok(())
}
