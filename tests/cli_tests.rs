use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::process::{Command, Output};
use std::str;
use std::thread;
use tempfile::TempDir;

/// CLI interface tests
#[cfg(test)]
mod cli_tests {
    use super::*;

    const CONFIG: &str = r#"
[global]
log_level = "warn"

[[devices]]
name = "SmartStick"
description = "Test stick"
address = "/dev/rfcomm0"
transport = { type = "rfcomm", baud_rate = 115200 }
"#;

    fn write_config(dir: &TempDir, content: &str) -> String {
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    fn sppcom(args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_sppcom"))
            .args(args)
            .output()
            .expect("Failed to execute sppcom")
    }

    #[test]
    fn test_cli_help() {
        let output = sppcom(&["--help"]);
        let stdout = str::from_utf8(&output.stdout).expect("Invalid UTF-8");

        assert!(output.status.success());
        assert!(stdout.contains("Usage:"));
        assert!(stdout.contains("Commands:"));
        for command in ["devices", "commands", "ports", "scan", "paired", "connect", "send", "config"] {
            assert!(stdout.contains(command), "help is missing {}", command);
        }
    }

    #[test]
    fn test_cli_version() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, CONFIG);

        let output = sppcom(&["-q", "-c", &config, "version"]);
        let stdout = str::from_utf8(&output.stdout).expect("Invalid UTF-8");
        assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_cli_devices_json() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, CONFIG);

        let output = sppcom(&["-q", "-c", &config, "-o", "json", "devices"]);
        assert!(output.status.success());

        let devices: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(devices[0]["name"], "SmartStick");
        assert_eq!(devices[0]["transport"]["type"], "rfcomm");
    }

    #[test]
    fn test_cli_default_quick_commands() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, CONFIG);

        let output = sppcom(&["-q", "-c", &config, "commands"]);
        let stdout = str::from_utf8(&output.stdout).expect("Invalid UTF-8");
        assert!(stdout.contains(":shot_power"));
        assert!(stdout.contains("mot101"));
    }

    #[test]
    fn test_cli_unknown_device() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, CONFIG);

        let output = sppcom(&["-q", "-c", &config, "send", "-d", "ghost", "mot1"]);
        assert!(!output.status.success());
        let stderr = str::from_utf8(&output.stderr).expect("Invalid UTF-8");
        assert!(stderr.contains("ghost"));
    }

    #[test]
    fn test_cli_rejects_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, "[global]\nread_buffer_size = 0\n");

        let output = sppcom(&["-q", "-c", &config, "devices"]);
        assert!(!output.status.success());
    }

    #[test]
    fn test_cli_send_over_tcp() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, CONFIG);

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        // Peer answers every line until the console hangs up
        let peer = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut received = Vec::new();
            for line in BufReader::new(stream).lines() {
                let Ok(line) = line else { break };
                writer.write_all(format!("OK {}\n", line).as_bytes()).unwrap();
                received.push(line);
            }
            received
        });

        let output = sppcom(&[
            "-q", "-c", &config, "send", "--tcp", &address, "--wait-ms", "300", "mot1", ":idle",
        ]);
        let stdout = str::from_utf8(&output.stdout).expect("Invalid UTF-8");

        assert!(output.status.success(), "{}", str::from_utf8(&output.stderr).unwrap());
        assert!(stdout.contains("  Connected to"));
        assert!(stdout.contains("> mot1"));
        assert!(stdout.contains("> mot0"));
        assert!(stdout.contains("< OK mot1"));
        assert_eq!(peer.join().unwrap(), vec!["mot1", "mot0"]);
    }

    #[test]
    fn test_cli_send_connection_refused() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, CONFIG);

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let output = sppcom(&["-q", "-c", &config, "send", "--tcp", &address, "mot1"]);
        assert!(!output.status.success());
        let stderr = str::from_utf8(&output.stderr).expect("Invalid UTF-8");
        assert!(stderr.contains("connection failed"));
    }

    #[test]
    fn test_cli_rejects_malformed_bluetooth_address() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, CONFIG);

        let output = sppcom(&["-q", "-c", &config, "send", "--bt", "24:6F:28", "mot1"]);
        assert!(!output.status.success());
        let stderr = str::from_utf8(&output.stderr).expect("Invalid UTF-8");
        assert!(stderr.contains("not a Bluetooth address"));
    }

    #[cfg(not(all(target_os = "linux", feature = "bluez")))]
    #[test]
    fn test_cli_bluetooth_commands_need_bluez_build() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, CONFIG);

        for args in [vec!["scan", "-s", "1"], vec!["paired"], vec!["send", "--bt", "24:6F:28:AA:BB:CC", "mot1"]] {
            let mut full = vec!["-q", "-c", config.as_str()];
            full.extend(args);
            let output = sppcom(&full);
            assert!(!output.status.success());
            let stderr = str::from_utf8(&output.stderr).expect("Invalid UTF-8");
            assert!(stderr.contains("--features bluez"), "{}", stderr);
        }
    }
}
