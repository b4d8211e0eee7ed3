// Core module - Link management and transport abstractions
pub mod link;
pub mod transport;

pub use link::{ConnectionState, LinkEvent, LinkListener, SerialLink};
pub use transport::{StreamSocket, TransportProvider, SPP_UUID};
