use crate::core::transport::SPP_UUID;
use crate::domain::device::{is_bluetooth_address, RemoteDevice};
use crate::domain::error::{SppComError, SppComResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// SppCom configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SppComConfig {
    /// Global configuration
    #[serde(default)]
    pub global: GlobalConfig,
    /// Known (paired) devices
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    /// Quick commands
    #[serde(default = "default_commands")]
    pub commands: Vec<QuickCommand>,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Read loop buffer size in bytes
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Service record the link connects to
    #[serde(default = "default_service_uuid")]
    pub service_uuid: Uuid,
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name
    pub name: String,
    /// Device description
    #[serde(default)]
    pub description: String,
    /// Bluetooth MAC address, serial device path or `host:port`
    pub address: String,
    /// Transport used to reach the device
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransportConfig {
    #[serde(rename = "rfcomm")]
    Rfcomm {
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    #[serde(rename = "tcp")]
    Tcp,
    /// RFCOMM through BlueZ. Without a channel the service UUID is looked up
    /// on the device.
    #[serde(rename = "bluetooth")]
    Bluetooth {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<u8>,
    },
}

/// Named payload sent with a single keystroke
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickCommand {
    /// Command name
    pub name: String,
    /// Command description
    #[serde(default)]
    pub description: String,
    /// Text sent to the device, without line terminator
    pub payload: String,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_read_buffer_size() -> usize {
    1024
}

fn default_service_uuid() -> Uuid {
    SPP_UUID
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_commands() -> Vec<QuickCommand> {
    [
        ("idle", "Stop motor", "mot0"),
        ("shot_power", "Rigid shot power mode", "mot1"),
        ("stick_flex", "Non-rigid stick flex mode", "mot2"),
        ("smart", "Automatic detection mode", "mot101"),
    ]
    .into_iter()
    .map(|(name, description, payload)| QuickCommand {
        name: name.to_string(),
        description: description.to_string(),
        payload: payload.to_string(),
    })
    .collect()
}

impl Default for SppComConfig {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            devices: Vec::new(),
            commands: default_commands(),
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            read_buffer_size: default_read_buffer_size(),
            service_uuid: default_service_uuid(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Rfcomm {
            baud_rate: default_baud_rate(),
        }
    }
}

impl std::fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportConfig::Rfcomm { baud_rate } => write!(f, "rfcomm ({} baud)", baud_rate),
            TransportConfig::Tcp => write!(f, "tcp"),
            TransportConfig::Bluetooth { channel: Some(channel) } => write!(f, "bluetooth (channel {})", channel),
            TransportConfig::Bluetooth { channel: None } => write!(f, "bluetooth"),
        }
    }
}

impl DeviceConfig {
    pub fn remote_device(&self) -> RemoteDevice {
        RemoteDevice::new(self.address.clone(), Some(self.name.clone()))
    }
}

impl SppComConfig {
    /// Find a configured device by name, case-insensitively
    pub fn find_device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices
            .iter()
            .find(|device| device.name.eq_ignore_ascii_case(name))
    }

    /// Find a quick command by name
    pub fn find_command(&self, name: &str) -> Option<&QuickCommand> {
        self.commands.iter().find(|command| command.name == name)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> SppComResult<()> {
        if self.global.read_buffer_size == 0 {
            return Err(SppComError::Config {
                message: "read_buffer_size must be greater than zero".to_string(),
            });
        }

        let mut names = HashSet::new();
        for device in &self.devices {
            if device.address.trim().is_empty() {
                return Err(SppComError::Config {
                    message: format!("Device '{}' has no address", device.name),
                });
            }
            if matches!(device.transport, TransportConfig::Bluetooth { .. })
                && !is_bluetooth_address(&device.address)
            {
                return Err(SppComError::Config {
                    message: format!(
                        "Device '{}' uses bluetooth but '{}' is not a MAC address",
                        device.name, device.address
                    ),
                });
            }
            if !names.insert(device.name.to_ascii_lowercase()) {
                return Err(SppComError::Config {
                    message: format!("Duplicate device name '{}'", device.name),
                });
            }
        }

        let mut names = HashSet::new();
        for command in &self.commands {
            if command.name.is_empty() || command.payload.is_empty() {
                return Err(SppComError::Config {
                    message: format!("Quick command '{}' needs a name and a payload", command.name),
                });
            }
            if !names.insert(command.name.as_str()) {
                return Err(SppComError::Config {
                    message: format!("Duplicate quick command '{}'", command.name),
                });
            }
        }

        Ok(())
    }
}
