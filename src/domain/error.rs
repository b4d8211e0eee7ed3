use std::io;
use thiserror::Error;

/// Failures of a serial link. Reported through the link listener, never
/// returned from link operations.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("failed to create socket: {0}")]
    SocketCreation(#[source] io::Error),

    #[error("connection failed: {0}")]
    Connect(#[source] io::Error),

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("send failed: {0}")]
    Write(#[source] io::Error),

    #[error("not connected")]
    NotConnected,
}

/// SppCom unified error type
#[derive(Error, Debug)]
pub enum SppComError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Bluetooth error: {message}")]
    Bluetooth { message: String },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output error: {0}")]
    Output(String),
}

pub type SppComResult<T> = Result<T, SppComError>;
