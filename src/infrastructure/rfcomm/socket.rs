use crate::core::transport::{closed_error, StreamSocket, TransportProvider};
use crate::domain::device::RemoteDevice;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// How long a blocked read waits before re-checking for `close`
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

type Port = Box<dyn SerialPort>;

/// Transport over serial devices bound to an SPP channel.
///
/// On Linux the RFCOMM channel is bound to a tty with
/// `rfcomm bind /dev/rfcomm0 <addr>`; opening the tty performs the
/// connection. The device address is the tty path, the service UUID is
/// resolved by the binding.
#[derive(Debug, Clone)]
pub struct RfcommTransport {
    baud_rate: u32,
    poll_timeout: Duration,
}

impl RfcommTransport {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }
}

impl TransportProvider for RfcommTransport {
    fn open_stream(&self, device: &RemoteDevice, service: Uuid) -> io::Result<Arc<dyn StreamSocket>> {
        if device.address().trim().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "device has no serial path",
            ));
        }

        debug!("Creating RFCOMM socket for {} (service {})", device, service);
        Ok(Arc::new(self.socket_for(device)))
    }
}

impl RfcommTransport {
    fn socket_for(&self, device: &RemoteDevice) -> RfcommSocket {
        RfcommSocket {
            path: device.address().to_string(),
            baud_rate: self.baud_rate,
            poll_timeout: self.poll_timeout,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }
}

/// Serial port split into a reading and a writing handle so a pending read
/// never holds up a write.
pub struct RfcommSocket {
    path: String,
    baud_rate: u32,
    poll_timeout: Duration,
    reader: Mutex<Option<Port>>,
    writer: Mutex<Option<Port>>,
    closed: AtomicBool,
}

impl RfcommSocket {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn writer(&self) -> MutexGuard<'_, Option<Port>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reader(&self) -> MutexGuard<'_, Option<Port>> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StreamSocket for RfcommSocket {
    fn connect(&self) -> io::Result<()> {
        if self.is_closed() {
            return Err(closed_error());
        }

        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(self.poll_timeout)
            .open()?;
        let writer = port.try_clone()?;

        *self.reader() = Some(port);
        *self.writer() = Some(writer);

        if self.is_closed() {
            self.reader().take();
            self.writer().take();
            return Err(closed_error());
        }

        info!("Serial port {} opened at {} baud", self.path, self.baud_rate);
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = self.reader();
        if self.is_closed() {
            reader.take();
            return Err(closed_error());
        }
        match reader.as_mut() {
            Some(port) => port.read(buf),
            None => Err(closed_error()),
        }
    }

    fn write_all(&self, data: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(closed_error());
        }
        match self.writer().as_mut() {
            Some(port) => port.write_all(data),
            None => Err(closed_error()),
        }
    }

    fn flush(&self) -> io::Result<()> {
        match self.writer().as_mut() {
            Some(port) => port.flush(),
            None => Err(closed_error()),
        }
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.writer().take();
        // A pending read holds the reader lock for at most one poll interval.
        // The port must be released before returning: ttys are opened
        // exclusively, so a reconnect to the same path would fail with EBUSY.
        self.reader().take();

        debug!("Serial port {} closed", self.path);
        Ok(())
    }
}

/// Names of the serial ports present on this machine
pub fn available_ports() -> serialport::Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|port| port.port_name)
        .collect())
}
