//! Transport layer for the Bus Pirate driver.
//!
//! Two seams live here. [`ByteChannel`] is the raw duplex byte stream the
//! device is attached to (normally a USB serial port, see [`serial`]), with
//! no protocol knowledge. [`BusTransport`] is what callers use once the
//! device has been switched into a bus mode.

use std::io;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub mod serial;

#[cfg(test)]
pub(crate) mod mock;

/// Duplex byte stream to the adapter.
///
/// `read` must honour the timeout set with `set_read_timeout`: when it
/// expires with nothing received, it returns `Ok(0)` rather than an error.
#[async_trait]
pub trait ByteChannel: Send {
    /// Write all of `data` to the device.
    async fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read whatever is available into `buf`, waiting at most the read
    /// timeout. Returns the number of bytes read.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discard anything received but not yet read.
    fn reset_input_buffer(&mut self) -> io::Result<()>;

    /// Discard anything written but not yet transmitted.
    fn reset_output_buffer(&mut self) -> io::Result<()>;

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

/// Bus-level capability exposed once a protocol mode is active.
#[async_trait]
pub trait BusTransport: Send {
    /// Write one complete transaction. `data` carries the target address
    /// byte followed by the payload, 1 to 16 bytes in total.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read `buffer.len()` bytes from the device at `address`.
    async fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<usize>;
}
