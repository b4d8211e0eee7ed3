// TCP module - SPP peers reachable over TCP
pub mod socket;

pub use socket::{TcpSocket, TcpTransport};
