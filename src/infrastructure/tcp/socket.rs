use crate::core::transport::{closed_error, StreamSocket, TransportProvider};
use crate::domain::device::RemoteDevice;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// First handshake slice; `close` is observed between slices
const CONNECT_SLICE: Duration = Duration::from_millis(250);
/// Slices double up to this length so slow bridges still get through
const MAX_CONNECT_SLICE: Duration = Duration::from_secs(2);
/// Per-address budget, about what a blocking connect gets from the OS
const CONNECT_BUDGET: Duration = Duration::from_secs(75);

/// Transport to SPP peers exposed over TCP, e.g. a serial-to-WiFi bridge or
/// an emulator. The device address is `host:port`.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    no_delay: bool,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self { no_delay: true }
    }
}

impl TransportProvider for TcpTransport {
    fn open_stream(&self, device: &RemoteDevice, service: Uuid) -> io::Result<Arc<dyn StreamSocket>> {
        let address = device.address();
        if address.rsplit_once(':').map_or(true, |(host, port)| host.is_empty() || port.parse::<u16>().is_err()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' is not a host:port address", address),
            ));
        }

        debug!("Creating TCP socket for {} (service {})", device, service);
        Ok(Arc::new(TcpSocket {
            address: address.to_string(),
            no_delay: self.no_delay,
            stream: OnceLock::new(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// `TcpStream` shared between the reader and writers. Shutting the stream
/// down unblocks a pending read.
pub struct TcpSocket {
    address: String,
    no_delay: bool,
    stream: OnceLock<TcpStream>,
    closed: AtomicBool,
}

impl TcpSocket {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Connect to the first reachable address. A pending handshake cannot be
    /// interrupted, so it runs in bounded slices and gives up once `close`
    /// has been called.
    fn dial(&self) -> io::Result<TcpStream> {
        let addrs: Vec<SocketAddr> = self.address.to_socket_addrs()?.collect();
        let mut last_error = io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("'{}' resolved to no addresses", self.address),
        );

        for addr in addrs {
            let started = Instant::now();
            let mut slice = CONNECT_SLICE;
            loop {
                if self.is_closed() {
                    return Err(closed_error());
                }
                if started.elapsed() >= CONNECT_BUDGET {
                    last_error = io::Error::new(io::ErrorKind::TimedOut, format!("no answer from {}", addr));
                    break;
                }
                match TcpStream::connect_timeout(&addr, slice) {
                    Ok(stream) => return Ok(stream),
                    Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                        debug!("No answer from {} within {:?}, retrying", addr, slice);
                        slice = (slice * 2).min(MAX_CONNECT_SLICE);
                    }
                    Err(e) => {
                        debug!("Connecting to {} failed: {}", addr, e);
                        last_error = e;
                        break;
                    }
                }
            }
        }

        Err(last_error)
    }

    fn stream(&self) -> io::Result<&TcpStream> {
        if self.is_closed() {
            return Err(closed_error());
        }
        self.stream.get().ok_or_else(closed_error)
    }
}

impl StreamSocket for TcpSocket {
    fn connect(&self) -> io::Result<()> {
        if self.is_closed() {
            return Err(closed_error());
        }

        let stream = self.dial()?;
        if self.no_delay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY: {}", e);
            }
        }

        if self.stream.set(stream).is_err() {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "socket already connected"));
        }

        // close() may have run while we were connecting
        if self.is_closed() {
            if let Some(stream) = self.stream.get() {
                let _ = stream.shutdown(Shutdown::Both);
            }
            return Err(closed_error());
        }

        info!("TCP connection established to {}", self.address);
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream = self.stream()?;
        stream.read(buf)
    }

    fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut stream = self.stream()?;
        stream.write_all(data)
    }

    fn flush(&self) -> io::Result<()> {
        let mut stream = self.stream()?;
        stream.flush()
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(stream) = self.stream.get() {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(e),
            }
        }

        debug!("TCP connection to {} closed", self.address);
        Ok(())
    }
}
