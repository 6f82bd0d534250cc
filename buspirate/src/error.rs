//! Common error types for the Bus Pirate driver.
//!
//! This module provides a centralized Error enum using thiserror, with
//! conversions from the underlying serial and I/O error types.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::Mode;

/// Main error type for Bus Pirate operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// The very first read of a response returned no bytes.
    #[error("No data read from device")]
    NoData,

    /// The device did not confirm a mode switch, or the bus driver for the
    /// new mode could not be brought up.
    #[error("Failed to switch to {mode} mode: {reason}")]
    ModeSwitchFailed { mode: Mode, reason: String },

    /// The mode exists in the protocol table but has no driver.
    #[error("Mode {0} is not supported")]
    UnsupportedMode(Mode),

    /// Caller supplied an argument the protocol cannot encode.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A step expected the success byte (0x01) and got something else.
    #[error("{step} not acknowledged (got 0x{got:02X})")]
    AckMismatch { step: &'static str, got: u8 },

    /// A multi-byte status reply did not match what the mode requires.
    #[error("{step}: expected {expected:?}, got {got:?}")]
    UnexpectedReply {
        step: &'static str,
        expected: String,
        got: String,
    },

    /// The binary-mode handshake never produced "BBIO1".
    #[error("Device did not enter binary mode after {attempts} attempts")]
    ConnectTimeout { attempts: u32 },

    /// Operation requires a session in binary mode.
    #[error("Session is not connected")]
    NotConnected,

    /// A bounded wait (lock or response deadline) expired.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
