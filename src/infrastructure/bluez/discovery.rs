use crate::domain::device::BluetoothDevice;
use crate::domain::error::{SppComError, SppComResult};
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::{pin_mut, StreamExt};
use std::time::Duration;
use tracing::{debug, info};

/// Inquiry scan for Bluetooth Classic devices, collected for `duration`
pub async fn discover(duration: Duration) -> SppComResult<Vec<BluetoothDevice>> {
    let (_session, adapter) = powered_adapter().await?;
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::BrEdr,
            ..Default::default()
        })
        .await
        .map_err(bluetooth_error)?;

    info!("Discovering devices on {} for {:?}", adapter.name(), duration);
    let events = adapter.discover_devices().await.map_err(bluetooth_error)?;
    pin_mut!(events);
    let deadline = tokio::time::sleep(duration);
    pin_mut!(deadline);

    let mut found: Vec<Address> = Vec::new();
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.next() => match event {
                Some(AdapterEvent::DeviceAdded(address)) if !found.contains(&address) => {
                    debug!("Discovered {}", address);
                    found.push(address);
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    describe(&adapter, found).await
}

/// Devices bonded with the default adapter
pub async fn paired_devices() -> SppComResult<Vec<BluetoothDevice>> {
    let (_session, adapter) = powered_adapter().await?;
    let addresses = adapter.device_addresses().await.map_err(bluetooth_error)?;

    let mut devices = describe(&adapter, addresses).await?;
    devices.retain(|device| device.paired);
    Ok(devices)
}

async fn powered_adapter() -> SppComResult<(Session, Adapter)> {
    let session = Session::new().await.map_err(bluetooth_error)?;
    let adapter = session.default_adapter().await.map_err(bluetooth_error)?;
    if !adapter.is_powered().await.map_err(bluetooth_error)? {
        info!("Powering on Bluetooth adapter {}", adapter.name());
        adapter.set_powered(true).await.map_err(bluetooth_error)?;
    }
    Ok((session, adapter))
}

async fn describe(adapter: &Adapter, addresses: Vec<Address>) -> SppComResult<Vec<BluetoothDevice>> {
    let mut devices = Vec::with_capacity(addresses.len());
    for address in addresses {
        let device = adapter.device(address).map_err(bluetooth_error)?;
        devices.push(BluetoothDevice {
            address: address.to_string(),
            name: device.name().await.map_err(bluetooth_error)?,
            paired: device.is_paired().await.map_err(bluetooth_error)?,
            rssi: device.rssi().await.unwrap_or(None),
        });
    }
    sort_devices(&mut devices);
    Ok(devices)
}

/// Bonded devices first, then by name; unnamed devices last
fn sort_devices(devices: &mut [BluetoothDevice]) {
    devices.sort_by(|a, b| {
        b.paired
            .cmp(&a.paired)
            .then_with(|| a.name.is_none().cmp(&b.name.is_none()))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.address.cmp(&b.address))
    });
}

fn bluetooth_error(e: bluer::Error) -> SppComError {
    SppComError::Bluetooth { message: e.to_string() }
}
