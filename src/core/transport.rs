use crate::domain::device::RemoteDevice;
use std::io;
use std::sync::Arc;
use uuid::Uuid;

/// Standard Serial Port Profile service class UUID, as advertised by HC-05,
/// HC-06 and ESP32 Bluetooth Classic firmware.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5f9b_34fb);

/// Byte-stream socket to a remote device.
///
/// Every method takes `&self`: one thread may sit in a blocking `read` or
/// `connect` while another calls `close`, which must make the blocked call
/// return an error.
pub trait StreamSocket: Send + Sync {
    /// Blocking handshake with the remote service
    fn connect(&self) -> io::Result<()>;

    /// Blocking read; `Ok(0)` means the peer closed the stream
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write the whole buffer
    fn write_all(&self, data: &[u8]) -> io::Result<()>;

    /// Flush buffered output
    fn flush(&self) -> io::Result<()>;

    /// Release the socket. Idempotent.
    fn close(&self) -> io::Result<()>;
}

/// Source of sockets, typically the platform Bluetooth stack.
pub trait TransportProvider: Send + Sync {
    /// Create an unconnected socket to `service` on `device`
    fn open_stream(&self, device: &RemoteDevice, service: Uuid) -> io::Result<Arc<dyn StreamSocket>>;
}

/// Error returned by sockets used after `close`
pub(crate) fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket closed")
}
