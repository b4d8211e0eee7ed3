// Infrastructure module - External dependencies and adapters
#[cfg(all(target_os = "linux", feature = "bluez"))]
pub mod bluez;
pub mod config;
pub mod logging;
pub mod rfcomm;
pub mod tcp;

use crate::core::transport::TransportProvider;
use crate::domain::config::TransportConfig;
use crate::domain::device::BluetoothDevice;
use crate::domain::error::{SppComError, SppComResult};
use std::sync::Arc;
use std::time::Duration;

/// Build the transport provider described by a device's configuration
pub fn provider_for(transport: &TransportConfig) -> SppComResult<Arc<dyn TransportProvider>> {
    match transport {
        TransportConfig::Rfcomm { baud_rate } => Ok(Arc::new(rfcomm::RfcommTransport::new(*baud_rate))),
        TransportConfig::Tcp => Ok(Arc::new(tcp::TcpTransport::new())),
        TransportConfig::Bluetooth { channel } => bluetooth_provider(*channel),
    }
}

/// Discover nearby Bluetooth devices for `duration`
pub async fn scan_devices(duration: Duration) -> SppComResult<Vec<BluetoothDevice>> {
    #[cfg(all(target_os = "linux", feature = "bluez"))]
    return bluez::discover(duration).await;

    #[cfg(not(all(target_os = "linux", feature = "bluez")))]
    {
        let _ = duration;
        Err(bluetooth_unsupported())
    }
}

/// Devices bonded with the local adapter
pub async fn bonded_devices() -> SppComResult<Vec<BluetoothDevice>> {
    #[cfg(all(target_os = "linux", feature = "bluez"))]
    return bluez::paired_devices().await;

    #[cfg(not(all(target_os = "linux", feature = "bluez")))]
    Err(bluetooth_unsupported())
}

#[cfg(all(target_os = "linux", feature = "bluez"))]
fn bluetooth_provider(channel: Option<u8>) -> SppComResult<Arc<dyn TransportProvider>> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|e| SppComError::Bluetooth {
        message: format!("BlueZ transport needs a tokio runtime: {}", e),
    })?;
    Ok(Arc::new(bluez::BluezTransport::new(runtime).with_channel(channel)))
}

#[cfg(not(all(target_os = "linux", feature = "bluez")))]
fn bluetooth_provider(_channel: Option<u8>) -> SppComResult<Arc<dyn TransportProvider>> {
    Err(bluetooth_unsupported())
}

#[cfg(not(all(target_os = "linux", feature = "bluez")))]
fn bluetooth_unsupported() -> SppComError {
    SppComError::Bluetooth {
        message: "built without BlueZ support; rebuild on Linux with --features bluez".to_string(),
    }
}
