//! In-memory transport and recording listener shared by the integration tests.

#![allow(dead_code)]

use sppcom::{LinkError, LinkEvent, LinkListener, RemoteDevice, StreamSocket, TransportProvider};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(5);

/// How the fake peer answers a handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Succeed,
    Fail,
    /// Block until `FakeSocket::release` or `close`
    Gated,
}

#[derive(Default)]
struct Live {
    current: usize,
    max: usize,
}

#[derive(Default)]
struct ProviderState {
    sockets: Vec<Arc<FakeSocket>>,
    fail_creation: bool,
}

/// Transport provider whose sockets are driven by the test
pub struct FakeProvider {
    handshake: Handshake,
    state: Mutex<ProviderState>,
    changed: Condvar,
    live: Arc<Mutex<Live>>,
}

impl FakeProvider {
    pub fn new(handshake: Handshake) -> Arc<Self> {
        Arc::new(Self {
            handshake,
            state: Mutex::new(ProviderState::default()),
            changed: Condvar::new(),
            live: Arc::new(Mutex::new(Live::default())),
        })
    }

    pub fn failing_creation() -> Arc<Self> {
        let provider = Self::new(Handshake::Succeed);
        provider.state.lock().unwrap().fail_creation = true;
        provider
    }

    pub fn sockets(&self) -> Vec<Arc<FakeSocket>> {
        self.state.lock().unwrap().sockets.clone()
    }

    pub fn socket_count(&self) -> usize {
        self.state.lock().unwrap().sockets.len()
    }

    /// Wait until the n-th socket (1-based) has been created
    pub fn wait_for_socket(&self, n: usize) -> Arc<FakeSocket> {
        let state = self.state.lock().unwrap();
        let (state, timeout) = self
            .changed
            .wait_timeout_while(state, WAIT, |state| state.sockets.len() < n)
            .unwrap();
        assert!(!timeout.timed_out(), "socket {} was never created", n);
        Arc::clone(&state.sockets[n - 1])
    }

    /// Connected sockets that have not been closed
    pub fn live(&self) -> usize {
        self.live.lock().unwrap().current
    }

    /// Most connected-and-open sockets ever seen at once
    pub fn max_live(&self) -> usize {
        self.live.lock().unwrap().max
    }
}

impl TransportProvider for FakeProvider {
    fn open_stream(&self, device: &RemoteDevice, service: Uuid) -> io::Result<Arc<dyn StreamSocket>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_creation {
            return Err(io::Error::new(io::ErrorKind::NotFound, "device not bonded"));
        }

        let socket = Arc::new(FakeSocket {
            device: device.clone(),
            service,
            handshake: self.handshake,
            live: Arc::clone(&self.live),
            state: Mutex::new(SocketState::default()),
            changed: Condvar::new(),
        });
        state.sockets.push(Arc::clone(&socket));
        self.changed.notify_all();
        Ok(socket)
    }
}

#[derive(Default)]
struct SocketState {
    in_handshake: bool,
    released: bool,
    connected: bool,
    closed: bool,
    peer_closed: bool,
    fail_reads: bool,
    fail_writes: bool,
    inbound: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    write_calls: usize,
    readers: usize,
    read_calls: usize,
}

/// Socket whose peer is played by the test
pub struct FakeSocket {
    device: RemoteDevice,
    service: Uuid,
    handshake: Handshake,
    live: Arc<Mutex<Live>>,
    state: Mutex<SocketState>,
    changed: Condvar,
}

impl FakeSocket {
    pub fn device(&self) -> &RemoteDevice {
        &self.device
    }

    pub fn service(&self) -> Uuid {
        self.service
    }

    /// Let a gated handshake complete
    pub fn release(&self) {
        self.state.lock().unwrap().released = true;
        self.changed.notify_all();
    }

    pub fn wait_in_handshake(&self) {
        let state = self.state.lock().unwrap();
        let (_state, timeout) = self
            .changed
            .wait_timeout_while(state, WAIT, |state| !state.in_handshake)
            .unwrap();
        assert!(!timeout.timed_out(), "handshake never started");
    }

    /// Peer sends bytes
    pub fn push_inbound(&self, data: &[u8]) {
        self.state.lock().unwrap().inbound.push_back(data.to_vec());
        self.changed.notify_all();
    }

    /// Peer hangs up; reads return end of stream
    pub fn close_from_peer(&self) {
        self.state.lock().unwrap().peer_closed = true;
        self.changed.notify_all();
    }

    /// Pending and future reads fail
    pub fn fail_reads(&self) {
        self.state.lock().unwrap().fail_reads = true;
        self.changed.notify_all();
    }

    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn write_calls(&self) -> usize {
        self.state.lock().unwrap().write_calls
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    pub fn read_calls(&self) -> usize {
        self.state.lock().unwrap().read_calls
    }

    /// Wait until no thread is blocked in `read`
    pub fn wait_for_no_readers(&self) -> bool {
        let state = self.state.lock().unwrap();
        let (_state, timeout) = self
            .changed
            .wait_timeout_while(state, WAIT, |state| state.readers > 0)
            .unwrap();
        !timeout.timed_out()
    }
}

impl StreamSocket for FakeSocket {
    fn connect(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed"));
        }

        match self.handshake {
            Handshake::Fail => {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "service discovery failed"));
            }
            Handshake::Gated => {
                state.in_handshake = true;
                self.changed.notify_all();
                state = self
                    .changed
                    .wait_while(state, |state| !state.released && !state.closed)
                    .unwrap();
                state.in_handshake = false;
                if state.closed {
                    return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "socket closed"));
                }
            }
            Handshake::Succeed => {}
        }

        state.connected = true;
        let mut live = self.live.lock().unwrap();
        live.current += 1;
        live.max = live.max.max(live.current);
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.readers += 1;
        state.read_calls += 1;
        state = self
            .changed
            .wait_while(state, |state| {
                state.inbound.is_empty() && !state.closed && !state.peer_closed && !state.fail_reads
            })
            .unwrap();

        let result = if state.closed {
            Err(io::Error::new(io::ErrorKind::ConnectionAborted, "socket closed"))
        } else if let Some(mut chunk) = state.inbound.pop_front() {
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                state.inbound.push_front(chunk.split_off(n));
            }
            Ok(n)
        } else if state.fail_reads {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"))
        } else {
            Ok(0)
        };

        state.readers -= 1;
        self.changed.notify_all();
        result
    }

    fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.write_calls += 1;
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed"));
        }
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
        }
        state.written.extend_from_slice(data);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.closed {
            state.closed = true;
            if state.connected {
                self.live.lock().unwrap().current -= 1;
            }
        }
        self.changed.notify_all();
        Ok(())
    }
}

/// Listener that keeps every event for later assertions
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<LinkEvent>>,
    changed: Condvar,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, event: LinkEvent) {
        self.events.lock().unwrap().push(event);
        self.changed.notify_all();
    }

    pub fn events(&self) -> Vec<LinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, wanted: &LinkEvent) -> usize {
        self.events.lock().unwrap().iter().filter(|event| *event == wanted).count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                LinkEvent::Error(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Wait until `done` holds for the recorded events
    pub fn wait_until(&self, done: impl Fn(&[LinkEvent]) -> bool) -> bool {
        let events = self.events.lock().unwrap();
        let (_events, timeout) = self
            .changed
            .wait_timeout_while(events, WAIT, |events| !done(events))
            .unwrap();
        !timeout.timed_out()
    }

    pub fn wait_for(&self, wanted: &LinkEvent) -> bool {
        self.wait_until(|events| events.contains(wanted))
    }
}

impl LinkListener for Recorder {
    fn on_connected(&self, device_name: &str) {
        self.push(LinkEvent::Connected {
            device_name: device_name.to_string(),
        });
    }

    fn on_disconnected(&self) {
        self.push(LinkEvent::Disconnected);
    }

    fn on_data_received(&self, data: &str) {
        self.push(LinkEvent::data(data.as_bytes()));
    }

    fn on_bytes_received(&self, data: &[u8]) {
        self.push(LinkEvent::data(data));
    }

    fn on_error(&self, error: &LinkError) {
        self.push(LinkEvent::Error(error.to_string()));
    }
}

pub fn connected(name: &str) -> LinkEvent {
    LinkEvent::Connected {
        device_name: name.to_string(),
    }
}

pub fn device(name: &str) -> RemoteDevice {
    RemoteDevice::new(format!("fake://{}", name), Some(name.to_string()))
}

/// Poll `condition` until it holds or the wait budget runs out
pub fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Give background threads a moment to produce anything they still would
pub fn settle() {
    std::thread::sleep(Duration::from_millis(100));
}
