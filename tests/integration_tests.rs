use sppcom::cli::output::TranscriptLine;
use sppcom::core::link::ChannelListener;
use sppcom::infrastructure::tcp::TcpTransport;
use sppcom::{ConnectionState, LinkEvent, RemoteDevice, SerialLink, SppComConfig, SPP_UUID};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Integration tests for SppCom library
#[cfg(test)]
mod integration_tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_config_serialization() {
        let config = SppComConfig::default();
        let toml_str = toml::to_string(&config).expect("Failed to serialize config");
        let deserialized: SppComConfig = toml::from_str(&toml_str).expect("Failed to deserialize config");

        assert_eq!(config.global.read_buffer_size, deserialized.global.read_buffer_size);
        assert_eq!(config.global.log_level, deserialized.global.log_level);
        assert_eq!(deserialized.global.service_uuid, SPP_UUID);
    }

    #[test]
    fn test_config_defaults() {
        let config = SppComConfig::default();

        assert_eq!(config.global.log_level, "info");
        assert_eq!(config.global.read_buffer_size, 1024);
        assert!(config.devices.is_empty());
        let payloads: Vec<_> = config.commands.iter().map(|c| c.payload.as_str()).collect();
        assert_eq!(payloads, vec!["mot0", "mot1", "mot2", "mot101"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tcp_session_lifecycle() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        // Peer greets, reads one command, replies and hangs up
        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"ESP32 ready\n").unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(b"OK\n").unwrap();
            buf
        });

        let (listener, mut events) = ChannelListener::channel();
        let link = Arc::new(SerialLink::new(Arc::new(TcpTransport::new()), Arc::new(listener)));
        link.connect(&RemoteDevice::new(address, Some("bridge".to_string())));

        let first = timeout(WAIT, events.recv()).await.unwrap();
        assert_eq!(first, Some(LinkEvent::Connected { device_name: "bridge".to_string() }));
        assert_eq!(link.state(), ConnectionState::Connected);

        let mut received = String::new();
        while !received.contains("ready") {
            match timeout(WAIT, events.recv()).await.unwrap() {
                Some(LinkEvent::DataReceived { text, .. }) => received.push_str(&text),
                other => panic!("unexpected event {:?}", other),
            }
        }

        let sender = Arc::clone(&link);
        tokio::task::spawn_blocking(move || sender.send("mot1")).await.unwrap();
        assert_eq!(&peer.join().unwrap(), b"mot1\n");

        // Reply then end of stream
        let mut disconnected = false;
        while !disconnected {
            match timeout(WAIT, events.recv()).await.unwrap() {
                Some(LinkEvent::DataReceived { text, .. }) => received.push_str(&text),
                Some(LinkEvent::Disconnected) => disconnected = true,
                other => panic!("unexpected event {:?}", other),
            }
        }

        assert!(received.ends_with("OK\n"));
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_hex_transcript_shows_wire_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(&[0xff, 0x01]).unwrap();
            // Hold the stream until the link hangs up
            let mut buf = [0u8; 1];
            let _ = stream.read(&mut buf);
        });

        let (listener, mut events) = ChannelListener::channel();
        let link = SerialLink::new(Arc::new(TcpTransport::new()), Arc::new(listener));
        link.connect(&RemoteDevice::new(address, None));

        let mut bytes = Vec::new();
        while bytes.len() < 2 {
            match timeout(WAIT, events.recv()).await.unwrap() {
                Some(event @ LinkEvent::DataReceived { .. }) => {
                    let line = TranscriptLine::from_event(&event, true);
                    if let LinkEvent::DataReceived { bytes: chunk, .. } = event {
                        assert_eq!(line.text, hex::encode(&chunk));
                        bytes.extend(chunk);
                    }
                }
                Some(LinkEvent::Connected { .. }) => {}
                other => panic!("unexpected event {:?}", other),
            }
        }

        assert_eq!(bytes, vec![0xff, 0x01]);
        assert_eq!(hex::encode(&bytes), "ff01");
        link.disconnect();
        peer.join().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disconnect_during_pending_tcp_connect() {
        let (listener, mut events) = ChannelListener::channel();
        let link = Arc::new(SerialLink::new(Arc::new(TcpTransport::new()), Arc::new(listener)));

        // Non-routable address: the handshake hangs until the link gives up on it
        link.connect(&RemoteDevice::new("10.255.255.1:9", Some("unreachable".to_string())));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        let closer = Arc::clone(&link);
        tokio::task::spawn_blocking(move || closer.disconnect()).await.unwrap();

        loop {
            match timeout(WAIT, events.recv()).await.unwrap() {
                Some(LinkEvent::Disconnected) => break,
                Some(LinkEvent::Error(_)) => {}
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(link.state(), ConnectionState::Disconnected);

        // Nothing from the abandoned attempt arrives later
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(events.try_recv().is_err());
    }
}
