use crate::cli::args::OutputFormat;
use crate::core::link::LinkEvent;
use crate::domain::config::{DeviceConfig, QuickCommand, SppComConfig};
use crate::domain::device::BluetoothDevice;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::{self, Write};
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_devices(&self, devices: &[DeviceConfig]) -> Result<(), OutputError>;
    fn write_commands(&self, commands: &[QuickCommand]) -> Result<(), OutputError>;
    fn write_ports(&self, ports: &[String]) -> Result<(), OutputError>;
    fn write_bluetooth_devices(&self, devices: &[BluetoothDevice]) -> Result<(), OutputError>;
    fn write_config(&self, config: &SppComConfig) -> Result<(), OutputError>;
    fn write_transcript(&self, line: &TranscriptLine) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("TOML serialization error: {0}")]
    TomlError(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for crate::domain::error::SppComError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Direction of a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    Status,
}

impl Direction {
    fn prefix(self) -> &'static str {
        match self {
            Direction::Outgoing => "> ",
            Direction::Incoming => "< ",
            Direction::Status => "  ",
        }
    }
}

/// One line of the session transcript
#[derive(Debug, Clone)]
pub struct TranscriptLine {
    pub timestamp: DateTime<Local>,
    pub direction: Direction,
    pub text: String,
}

impl TranscriptLine {
    pub fn new(direction: Direction, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            direction,
            text: text.into(),
        }
    }

    pub fn outgoing(text: impl Into<String>) -> Self {
        Self::new(Direction::Outgoing, text)
    }

    pub fn status(text: impl Into<String>) -> Self {
        Self::new(Direction::Status, text)
    }

    /// Transcript line for a link event; received data is shown as text or hex
    pub fn from_event(event: &LinkEvent, hex: bool) -> Self {
        match event {
            LinkEvent::Connected { device_name } => Self::status(format!("Connected to {}", device_name)),
            LinkEvent::Disconnected => Self::status("Disconnected"),
            LinkEvent::DataReceived { bytes, .. } if hex => Self::new(Direction::Incoming, hex::encode(bytes)),
            LinkEvent::DataReceived { text, .. } => {
                Self::new(Direction::Incoming, text.trim_end_matches(['\r', '\n']))
            }
            LinkEvent::Error(message) => Self::status(format!("Error: {}", message)),
        }
    }

    /// `HH:MM:SS.mmm <prefix><text>`; continuation lines keep the prefix
    pub fn render(&self) -> String {
        let time = self.timestamp.format("%H:%M:%S%.3f");
        let prefix = self.direction.prefix();
        let mut lines = self.text.split('\n').map(|line| line.trim_end_matches('\r'));

        let mut rendered = format!("{} {}{}", time, prefix, lines.next().unwrap_or_default());
        for line in lines {
            rendered.push('\n');
            rendered.push_str(&format!("{} {}{}", time, prefix, line));
        }
        rendered
    }
}

#[derive(Serialize)]
struct TranscriptRecord<'a> {
    timestamp: String,
    direction: Direction,
    text: &'a str,
}

#[derive(Tabled)]
struct DeviceTableRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Transport")]
    transport: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&DeviceConfig> for DeviceTableRow {
    fn from(device: &DeviceConfig) -> Self {
        Self {
            name: device.name.clone(),
            address: device.address.clone(),
            transport: device.transport.to_string(),
            description: device.description.clone(),
        }
    }
}

#[derive(Tabled)]
struct CommandTableRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Payload")]
    payload: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&QuickCommand> for CommandTableRow {
    fn from(command: &QuickCommand) -> Self {
        Self {
            name: command.name.clone(),
            payload: command.payload.clone(),
            description: command.description.clone(),
        }
    }
}

#[derive(Tabled)]
struct BluetoothTableRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Paired")]
    paired: String,
    #[tabled(rename = "RSSI")]
    rssi: String,
}

impl From<&BluetoothDevice> for BluetoothTableRow {
    fn from(device: &BluetoothDevice) -> Self {
        Self {
            name: device.name.clone().unwrap_or_default(),
            address: device.address.clone(),
            paired: if device.paired { "yes" } else { "" }.to_string(),
            rssi: device.rssi.map(|rssi| format!("{} dBm", rssi)).unwrap_or_default(),
        }
    }
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn print(&self, text: &str) -> Result<(), OutputError> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", text)?;
        stdout.flush()?;
        Ok(())
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_devices(&self, devices: &[DeviceConfig]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                if devices.is_empty() {
                    return self.print("No devices configured. Run `sppcom config init` to create an example.");
                }
                for device in devices {
                    self.print(&format!("{}\n  {} ({})", device.name, device.address, device.transport))?;
                    if !device.description.is_empty() {
                        self.print(&format!("  {}", device.description))?;
                    }
                }
                Ok(())
            }
            OutputFormat::Json => self.print(&serde_json::to_string_pretty(devices)?),
            OutputFormat::Table => {
                let rows: Vec<DeviceTableRow> = devices.iter().map(DeviceTableRow::from).collect();
                self.print(&Table::new(rows).to_string())
            }
        }
    }

    fn write_commands(&self, commands: &[QuickCommand]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                for command in commands {
                    self.print(&format!(":{:<12} {:<10} {}", command.name, command.payload, command.description))?;
                }
                Ok(())
            }
            OutputFormat::Json => self.print(&serde_json::to_string_pretty(commands)?),
            OutputFormat::Table => {
                let rows: Vec<CommandTableRow> = commands.iter().map(CommandTableRow::from).collect();
                self.print(&Table::new(rows).to_string())
            }
        }
    }

    fn write_ports(&self, ports: &[String]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => self.print(&serde_json::to_string_pretty(ports)?),
            _ => {
                if ports.is_empty() {
                    return self.print("No serial ports found");
                }
                for port in ports {
                    self.print(port)?;
                }
                Ok(())
            }
        }
    }

    fn write_bluetooth_devices(&self, devices: &[BluetoothDevice]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                if devices.is_empty() {
                    return self.print("No Bluetooth devices found");
                }
                for device in devices {
                    self.print(&device.label())?;
                }
                Ok(())
            }
            OutputFormat::Json => self.print(&serde_json::to_string_pretty(devices)?),
            OutputFormat::Table => {
                let rows: Vec<BluetoothTableRow> = devices.iter().map(BluetoothTableRow::from).collect();
                self.print(&Table::new(rows).to_string())
            }
        }
    }

    fn write_config(&self, config: &SppComConfig) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => self.print(&serde_json::to_string_pretty(config)?),
            _ => self.print(&toml::to_string_pretty(config)?),
        }
    }

    fn write_transcript(&self, line: &TranscriptLine) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let record = TranscriptRecord {
                    timestamp: line.timestamp.to_rfc3339(),
                    direction: line.direction,
                    text: &line.text,
                };
                self.print(&serde_json::to_string(&record)?)
            }
            _ => self.print(&line.render()),
        }
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => self.print(&serde_json::json!({ "message": message }).to_string()),
            _ => self.print(message),
        }
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "error": error }).to_string();
                eprintln!("{}", json);
            }
            _ => eprintln!("Error: {}", error),
        }
        Ok(())
    }
}
