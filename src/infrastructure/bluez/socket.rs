use crate::core::transport::{closed_error, StreamSocket, TransportProvider};
use crate::domain::device::RemoteDevice;
use bluer::rfcomm::{Profile, Role, SocketAddr, Stream};
use bluer::{Address, Device, Session};
use futures::StreamExt;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// RFCOMM through the BlueZ daemon. The device address is the peer's MAC
/// address; unbonded peers are paired before connecting.
///
/// bluer is async, the socket contract is blocking: the link's worker
/// threads block on `runtime`, which must be a multi-threaded runtime.
#[derive(Debug, Clone)]
pub struct BluezTransport {
    runtime: Handle,
    channel: Option<u8>,
}

impl BluezTransport {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime, channel: None }
    }

    /// Connect to a fixed RFCOMM channel instead of resolving the service
    pub fn with_channel(mut self, channel: Option<u8>) -> Self {
        self.channel = channel;
        self
    }
}

impl TransportProvider for BluezTransport {
    fn open_stream(&self, device: &RemoteDevice, service: Uuid) -> io::Result<Arc<dyn StreamSocket>> {
        let address: Address = device.address().parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' is not a Bluetooth address", device.address()),
            )
        })?;

        debug!("Creating BlueZ socket for {} (service {})", device, service);
        Ok(Arc::new(BluezSocket::new(self.runtime.clone(), address, service, self.channel)))
    }
}

/// RFCOMM stream split into halves so a pending read never holds up a write.
pub struct BluezSocket {
    runtime: Handle,
    address: Address,
    service: Uuid,
    channel: Option<u8>,
    reader: Mutex<Option<ReadHalf<Stream>>>,
    writer: Mutex<Option<WriteHalf<Stream>>>,
    closed: watch::Sender<bool>,
}

impl BluezSocket {
    fn new(runtime: Handle, address: Address, service: Uuid, channel: Option<u8>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            runtime,
            address,
            service,
            channel,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            closed,
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn reader(&self) -> MutexGuard<'_, Option<ReadHalf<Stream>>> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writer(&self) -> MutexGuard<'_, Option<WriteHalf<Stream>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drive `operation` on the runtime until it completes or `close` is called
    fn block_on<T>(&self, operation: impl Future<Output = io::Result<T>>) -> io::Result<T> {
        let mut closed = self.closed.subscribe();
        self.runtime.block_on(async move {
            tokio::select! {
                result = operation => result,
                _ = closed.wait_for(|closed| *closed) => Err(closed_error()),
            }
        })
    }

    fn release(&self) {
        let _runtime = self.runtime.enter();
        self.writer().take();
        self.reader().take();
    }

    async fn establish(&self) -> io::Result<Stream> {
        let session = Session::new().await.map_err(bluez_error)?;
        let adapter = session.default_adapter().await.map_err(bluez_error)?;
        if !adapter.is_powered().await.map_err(bluez_error)? {
            info!("Powering on Bluetooth adapter {}", adapter.name());
            adapter.set_powered(true).await.map_err(bluez_error)?;
        }

        let device = adapter.device(self.address).map_err(bluez_error)?;
        if !device.is_paired().await.map_err(bluez_error)? {
            info!("Pairing with {}", self.address);
            device.pair().await.map_err(bluez_error)?;
            info!("Paired with {}", self.address);
        }

        match self.channel {
            Some(channel) => {
                debug!("Connecting to {} on RFCOMM channel {}", self.address, channel);
                Stream::connect(SocketAddr::new(self.address, channel))
                    .await
                    .map_err(bluez_error)
            }
            None => self.connect_service(&session, &device).await,
        }
    }

    /// Let bluetoothd resolve the service record and hand over the socket
    async fn connect_service(&self, session: &Session, device: &Device) -> io::Result<Stream> {
        let profile = Profile {
            uuid: self.service,
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let mut requests = session.register_profile(profile).await.map_err(bluez_error)?;
        debug!("Connecting to {} via service {}", self.address, self.service);

        let connect = device.connect_profile(&self.service);
        tokio::pin!(connect);
        let mut connected = false;

        loop {
            tokio::select! {
                result = &mut connect, if !connected => {
                    result.map_err(bluez_error)?;
                    connected = true;
                }
                request = requests.next() => match request {
                    Some(request) if request.device() == self.address => {
                        return request.accept().map_err(bluez_error);
                    }
                    Some(request) => debug!("Ignoring profile connection from {}", request.device()),
                    None => {
                        return Err(io::Error::new(
                            io::ErrorKind::ConnectionAborted,
                            "profile was unregistered",
                        ))
                    }
                },
            }
        }
    }
}

impl StreamSocket for BluezSocket {
    fn connect(&self) -> io::Result<()> {
        if self.is_closed() {
            return Err(closed_error());
        }

        let stream = self.block_on(self.establish())?;
        let (reader, writer) = tokio::io::split(stream);
        *self.reader() = Some(reader);
        *self.writer() = Some(writer);

        if self.is_closed() {
            self.release();
            return Err(closed_error());
        }

        info!("RFCOMM connection established to {}", self.address);
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = self.reader();
        let half = reader.as_mut().ok_or_else(closed_error)?;
        self.block_on(half.read(buf))
    }

    fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut writer = self.writer();
        let half = writer.as_mut().ok_or_else(closed_error)?;
        self.block_on(half.write_all(data))
    }

    fn flush(&self) -> io::Result<()> {
        let mut writer = self.writer();
        let half = writer.as_mut().ok_or_else(closed_error)?;
        self.block_on(half.flush())
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.send_replace(true) {
            return Ok(());
        }

        // Pending operations see the flag and drop their locks
        self.release();
        debug!("RFCOMM connection to {} closed", self.address);
        Ok(())
    }
}

fn bluez_error<E>(e: E) -> io::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    io::Error::new(io::ErrorKind::Other, e)
}
