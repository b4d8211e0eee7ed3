use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

/// Command line arguments for SppCom
#[derive(Parser, Debug)]
#[command(
    name = "sppcom",
    version = env!("CARGO_PKG_VERSION"),
    about = "Bluetooth SPP command console for ESP32-class devices",
    long_about = "Connects to a Serial Port Profile peripheral, sends newline-terminated text commands and prints whatever the device answers."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List configured devices
    Devices,
    /// List quick commands
    Commands,
    /// List serial ports (bound RFCOMM devices show up here)
    Ports,
    /// Discover nearby Bluetooth devices (needs the `bluez` build)
    Scan {
        /// How long to scan, in seconds
        #[arg(short, long, default_value = "10")]
        seconds: u64,
    },
    /// List Bluetooth devices bonded with this host (needs the `bluez` build)
    Paired,
    /// Open an interactive console to a device
    Connect(ConnectArgs),
    /// Send commands to a device and print the replies
    Send(SendArgs),
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
}

/// Which device to talk to
#[derive(ClapArgs, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct TargetArgs {
    /// Name of a configured device
    #[arg(short, long)]
    pub device: Option<String>,

    /// Address of a TCP bridge (host:port)
    #[arg(long, value_name = "HOST:PORT")]
    pub tcp: Option<String>,

    /// Path of a bound RFCOMM serial device
    #[arg(long, value_name = "PATH")]
    pub rfcomm: Option<String>,

    /// MAC address of a Bluetooth device, connected through BlueZ
    #[arg(long, value_name = "MAC")]
    pub bt: Option<String>,
}

/// Interactive console arguments
#[derive(ClapArgs, Debug)]
pub struct ConnectArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Baud rate for RFCOMM devices
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// RFCOMM channel for Bluetooth devices (default: look up the SPP service)
    #[arg(long)]
    pub channel: Option<u8>,

    /// Show received data as hex
    #[arg(long)]
    pub hex: bool,
}

/// One-shot send arguments
#[derive(ClapArgs, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Baud rate for RFCOMM devices
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// RFCOMM channel for Bluetooth devices (default: look up the SPP service)
    #[arg(long)]
    pub channel: Option<u8>,

    /// Show received data as hex
    #[arg(long)]
    pub hex: bool,

    /// How long to wait for replies after the last command, in milliseconds
    #[arg(short, long, default_value = "500")]
    pub wait_ms: u64,

    /// Commands to send; `:name` sends a quick command
    #[arg(required = true)]
    pub commands: Vec<String>,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Create a project configuration in the given directory
    Init {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        path: String,
    },
    /// Show the effective configuration
    Show,
    /// Show the configuration file locations
    Path,
}
