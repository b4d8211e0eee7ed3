// Link module - Connection lifecycle and serial I/O
pub mod listener;
pub mod serial_link;
pub mod state;

pub use listener::{ChannelListener, FnListener, LinkEvent, LinkListener};
pub use serial_link::{LinkOptions, SerialLink, DEFAULT_READ_BUFFER_SIZE, LINE_TERMINATOR};
pub use state::{AtomicConnectionState, ConnectionState};
