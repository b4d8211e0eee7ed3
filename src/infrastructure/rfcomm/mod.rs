// RFCOMM module - SPP over bound serial devices
pub mod socket;

pub use socket::{available_ports, RfcommSocket, RfcommTransport};
