// BlueZ module - RFCOMM, discovery and pairing through bluetoothd
pub mod discovery;
pub mod socket;

pub use discovery::{discover, paired_devices};
pub use socket::{BluezSocket, BluezTransport};
