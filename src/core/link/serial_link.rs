use crate::core::link::listener::LinkListener;
use crate::core::link::state::{AtomicConnectionState, ConnectionState};
use crate::core::transport::{StreamSocket, TransportProvider, SPP_UUID};
use crate::domain::device::RemoteDevice;
use crate::domain::error::LinkError;
use std::cell::Cell;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default read loop buffer size
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Line terminator appended to every outgoing command
pub const LINE_TERMINATOR: char = '\n';

/// Tunables for a `SerialLink`
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Service record to connect to
    pub service: Uuid,
    /// Size of the read loop buffer
    pub read_buffer_size: usize,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            service: SPP_UUID,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

thread_local! {
    /// Set while a reader thread is inside `on_bytes_received`
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

/// Current attempt and the socket it registered.
///
/// `generation` grows with every `connect` and `disconnect`; a worker whose
/// generation is no longer current has been cancelled and must stay silent.
struct Slot {
    generation: u64,
    socket: Option<Arc<dyn StreamSocket>>,
    device: Option<RemoteDevice>,
}

struct Shared {
    state: AtomicConnectionState,
    slot: Mutex<Slot>,
    /// Held by the reader across its generation check and the data callback
    delivery: Mutex<()>,
    provider: Arc<dyn TransportProvider>,
    listener: Arc<dyn LinkListener>,
    options: LinkOptions,
}

/// Owns at most one connection to a remote device and services it on
/// background threads. All outcomes are reported through the listener.
pub struct SerialLink {
    shared: Arc<Shared>,
}

impl SerialLink {
    pub fn new(provider: Arc<dyn TransportProvider>, listener: Arc<dyn LinkListener>) -> Self {
        Self::with_options(provider, listener, LinkOptions::default())
    }

    pub fn with_options(
        provider: Arc<dyn TransportProvider>,
        listener: Arc<dyn LinkListener>,
        options: LinkOptions,
    ) -> Self {
        let options = LinkOptions {
            read_buffer_size: options.read_buffer_size.max(1),
            ..options
        };

        Self {
            shared: Arc::new(Shared {
                state: AtomicConnectionState::default(),
                slot: Mutex::new(Slot {
                    generation: 0,
                    socket: None,
                    device: None,
                }),
                delivery: Mutex::new(()),
                provider,
                listener,
                options,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Device of the current attempt or connection
    pub fn device(&self) -> Option<RemoteDevice> {
        self.shared.lock_slot().device.clone()
    }

    /// Cancel whatever is in progress and start connecting to `device` on a
    /// background thread. Returns immediately.
    pub fn connect(&self, device: &RemoteDevice) {
        let (generation, previous) = {
            let mut slot = self.shared.lock_slot();
            slot.generation += 1;
            slot.device = Some(device.clone());
            self.shared.state.store(ConnectionState::Connecting);
            (slot.generation, slot.socket.take())
        };

        if let Some(previous) = previous {
            debug!("Cancelling previous connection before connecting to {}", device);
            close_quietly(previous.as_ref());
        }
        self.shared.wait_for_delivery();

        info!("Connecting to {}", device);

        let shared = Arc::clone(&self.shared);
        let target = device.clone();
        let spawned = thread::Builder::new()
            .name("sppcom-connect".to_string())
            .spawn(move || shared.run_connect(target, generation));

        if let Err(e) = spawned {
            error!("Failed to spawn connect thread: {}", e);
            self.shared.fail_attempt(generation, LinkError::Connect(e));
        }
    }

    /// Cancel any attempt, close any connection and report `on_disconnected`.
    pub fn disconnect(&self) {
        let previous = self.shared.cancel();

        if let Some(socket) = previous {
            close_quietly(socket.as_ref());
        }
        self.shared.wait_for_delivery();

        info!("Disconnected");
        self.shared.listener.on_disconnected();
    }

    /// Write `data` followed by a newline on the caller's thread.
    pub fn send(&self, data: &str) {
        let target = {
            let slot = self.shared.lock_slot();
            if self.shared.state.load() == ConnectionState::Connected {
                slot.socket.clone().map(|socket| (socket, slot.generation))
            } else {
                None
            }
        };

        let Some((socket, generation)) = target else {
            warn!("Refusing to send {:?} while {}", data, self.state());
            self.shared.listener.on_error(&LinkError::NotConnected);
            return;
        };

        let mut line = String::with_capacity(data.len() + 1);
        line.push_str(data);
        line.push(LINE_TERMINATOR);

        match socket.write_all(line.as_bytes()).and_then(|_| socket.flush()) {
            Ok(()) => debug!("Sent {} bytes", line.len()),
            Err(e) => {
                if self.shared.retire(generation) {
                    close_quietly(socket.as_ref());
                    self.shared.wait_for_delivery();
                    warn!("Send failed, dropping connection: {}", e);
                    self.shared.listener.on_error(&LinkError::Write(e));
                    self.shared.listener.on_disconnected();
                } else {
                    debug!("Ignoring send failure on a closing link: {}", e);
                }
            }
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        if let Some(socket) = self.shared.cancel() {
            close_quietly(socket.as_ref());
        }
    }
}

impl Shared {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_delivery(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a data callback already past its generation check has
    /// returned. A listener that calls back into the link from
    /// `on_data_received` is that callback, so it does not wait on itself.
    fn wait_for_delivery(&self) {
        if !DELIVERING.with(Cell::get) {
            drop(self.lock_delivery());
        }
    }

    /// Hand a chunk to the listener unless the connection was cancelled
    fn deliver(&self, generation: u64, data: &[u8]) {
        let _delivery = self.lock_delivery();
        if !self.is_current(generation) {
            debug!("Dropping {} bytes read after cancellation", data.len());
            return;
        }

        DELIVERING.with(|delivering| delivering.set(true));
        self.listener.on_bytes_received(data);
        DELIVERING.with(|delivering| delivering.set(false));
    }

    /// Invalidate every worker and hand back the registered socket
    fn cancel(&self) -> Option<Arc<dyn StreamSocket>> {
        let mut slot = self.lock_slot();
        slot.generation += 1;
        slot.device = None;
        self.state.store(ConnectionState::Disconnected);
        slot.socket.take()
    }

    fn is_current(&self, generation: u64) -> bool {
        let slot = self.lock_slot();
        slot.generation == generation && self.state.load() == ConnectionState::Connected
    }

    /// Move a current connection to Disconnected. Returns false when the
    /// connection was already superseded or dropped, in which case the caller
    /// must not signal.
    fn retire(&self, generation: u64) -> bool {
        let mut slot = self.lock_slot();
        if slot.generation != generation
            || !self
                .state
                .transition(ConnectionState::Connected, ConnectionState::Disconnected)
        {
            return false;
        }
        slot.socket = None;
        slot.device = None;
        true
    }

    /// End a still-current attempt that never connected
    fn fail_attempt(&self, generation: u64, error: LinkError) {
        {
            let mut slot = self.lock_slot();
            if slot.generation != generation {
                debug!("Superseded attempt failed: {}", error);
                return;
            }
            slot.socket = None;
            slot.device = None;
            self.state.store(ConnectionState::Disconnected);
        }

        warn!("{}", error);
        self.listener.on_error(&error);
    }

    fn run_connect(self: Arc<Self>, device: RemoteDevice, generation: u64) {
        let socket = match self.provider.open_stream(&device, self.options.service) {
            Ok(socket) => socket,
            Err(e) => {
                self.fail_attempt(generation, LinkError::SocketCreation(e));
                return;
            }
        };

        {
            let mut slot = self.lock_slot();
            if slot.generation != generation {
                drop(slot);
                close_quietly(socket.as_ref());
                return;
            }
            slot.socket = Some(Arc::clone(&socket));
        }

        if let Err(e) = socket.connect() {
            close_quietly(socket.as_ref());
            self.fail_attempt(generation, LinkError::Connect(e));
            return;
        }

        {
            let slot = self.lock_slot();
            if slot.generation != generation {
                drop(slot);
                debug!("Connected to {} after being cancelled, closing", device);
                close_quietly(socket.as_ref());
                return;
            }
            self.state.store(ConnectionState::Connected);
        }

        info!("Connected to {}", device);
        self.listener.on_connected(device.display_name());

        let shared = Arc::clone(&self);
        let reader_socket = Arc::clone(&socket);
        let spawned = thread::Builder::new()
            .name("sppcom-reader".to_string())
            .spawn(move || shared.run_reader(reader_socket, generation));

        if let Err(e) = spawned {
            error!("Failed to spawn reader thread: {}", e);
            if self.retire(generation) {
                close_quietly(socket.as_ref());
                self.listener.on_error(&LinkError::Read(e));
                self.listener.on_disconnected();
            }
        }
    }

    fn run_reader(self: Arc<Self>, socket: Arc<dyn StreamSocket>, generation: u64) {
        let mut buffer = vec![0u8; self.options.read_buffer_size];

        while self.is_current(generation) {
            match socket.read(&mut buffer) {
                Ok(0) => {
                    self.lose_connection(socket.as_ref(), generation, "stream closed by peer");
                    break;
                }
                Ok(n) => {
                    debug!("Received {} bytes", n);
                    self.deliver(generation, &buffer[..n]);
                }
                Err(e) if is_transient(&e) => continue,
                Err(e) => {
                    self.lose_connection(socket.as_ref(), generation, &LinkError::Read(e).to_string());
                    break;
                }
            }
        }

        debug!("Reader for generation {} finished", generation);
    }

    fn lose_connection(&self, socket: &dyn StreamSocket, generation: u64, reason: &str) {
        if self.retire(generation) {
            close_quietly(socket);
            warn!("Connection lost: {}", reason);
            self.listener.on_disconnected();
        } else {
            debug!("Reader stopping after cancellation: {}", reason);
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn close_quietly(socket: &dyn StreamSocket) {
    if let Err(e) = socket.close() {
        debug!("Ignoring close failure: {}", e);
    }
}
