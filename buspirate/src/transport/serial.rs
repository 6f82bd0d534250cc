//! USB serial byte channel.
//!
//! Thin wrapper over `tokio-serial`: opening a port, listing ports, and the
//! read-timeout behaviour [`ByteChannel`] expects.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialPortInfo, SerialStream};

use super::ByteChannel;
use crate::error::Result;
use crate::tracing::prelude::*;

/// Default baud rate of the Bus Pirate v3/v4 USB serial interface.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// List the serial ports the OS knows about.
pub fn available_ports() -> Result<Vec<SerialPortInfo>> {
    Ok(tokio_serial::available_ports()?)
}

/// Serial port implementing [`ByteChannel`].
pub struct SerialChannel {
    stream: SerialStream,
    read_timeout: Duration,
}

impl SerialChannel {
    /// Open `path` at `baud_rate`, 8N1, no flow control.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        debug!("Opening {} at {} baud", path, baud_rate);
        let stream = tokio_serial::new(path, baud_rate).open_native_async()?;
        Ok(Self {
            stream,
            read_timeout: crate::config::DEFAULT_READ_TIMEOUT,
        })
    }

    /// Name of the underlying port, if the OS reports one.
    pub fn name(&self) -> Option<String> {
        SerialPort::name(&self.stream)
    }
}

#[async_trait]
impl ByteChannel for SerialChannel {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(&mut self.stream, data).await?;
        AsyncWriteExt::flush(&mut self.stream).await
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match time::timeout(self.read_timeout, AsyncReadExt::read(&mut self.stream, buf)).await {
            Ok(result) => result,
            Err(_) => Ok(0),
        }
    }

    fn reset_input_buffer(&mut self) -> io::Result<()> {
        SerialPort::clear(&self.stream, ClearBuffer::Input).map_err(io::Error::from)
    }

    fn reset_output_buffer(&mut self) -> io::Result<()> {
        SerialPort::clear(&self.stream, ClearBuffer::Output).map_err(io::Error::from)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.read_timeout = timeout;
        Ok(())
    }
}
