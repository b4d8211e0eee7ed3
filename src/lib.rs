//! SppCom Library
//!
//! Serial Port Profile link management for ESP32-class peripherals: a
//! connection lifecycle manager that exchanges newline-terminated text
//! commands over an RFCOMM-like byte stream, plus the transports and
//! console that drive it.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use crate::core::link::{ChannelListener, ConnectionState, LinkEvent, LinkListener, LinkOptions, SerialLink};
pub use crate::core::transport::{StreamSocket, TransportProvider, SPP_UUID};
pub use crate::domain::config::SppComConfig;
pub use crate::domain::device::{BluetoothDevice, RemoteDevice};
pub use crate::domain::error::{LinkError, SppComError, SppComResult};
