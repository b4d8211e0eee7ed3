use serde::Serialize;
use std::fmt;

/// A remote peer as handed out by a transport provider.
///
/// `address` is whatever the provider needs to reach the device: a MAC
/// address for BlueZ, a serial device path for RFCOMM ttys, `host:port` for
/// TCP bridges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteDevice {
    address: String,
    name: Option<String>,
}

impl RemoteDevice {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Name shown to the user; falls back to the address for unnamed devices.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.address)
    }
}

impl fmt::Display for RemoteDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.display_name(), self.address)
    }
}

/// A Bluetooth device seen by the adapter, from discovery or the bond list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BluetoothDevice {
    pub address: String,
    pub name: Option<String>,
    pub paired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i16>,
}

impl BluetoothDevice {
    pub fn remote_device(&self) -> RemoteDevice {
        RemoteDevice::new(self.address.clone(), self.name.clone())
    }

    /// `name [address]`, marked when the device is bonded
    pub fn label(&self) -> String {
        let device = self.remote_device();
        if self.paired {
            format!("{} (paired)", device)
        } else {
            device.to_string()
        }
    }
}

/// `XX:XX:XX:XX:XX:XX` with hex digits in either case
pub fn is_bluetooth_address(address: &str) -> bool {
    let parts: Vec<&str> = address.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}
