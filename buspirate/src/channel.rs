//! Command channel to a Bus Pirate in binary mode.
//!
//! This module owns the byte channel and provides the raw command/response
//! primitives every mode builds on: send one command byte, write a raw
//! payload, and collect a fixed-size reply.
//!
//! The channel can be cloned so the session and the active bus driver share
//! one device. Each clone must [`lock`](CommandChannel::lock) it to get an
//! [`Exchange`]; a multi-step transaction keeps the exchange for its whole
//! duration so no other step can land between its bytes.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{self, Instant};

use crate::config::Timing;
use crate::error::{Error, Result};
use crate::protocol::SUCCESS;
use crate::tracing::prelude::*;
use crate::transport::ByteChannel;

/// Shared handle to the device's byte channel.
pub struct CommandChannel<C> {
    inner: Arc<Mutex<C>>,
    timing: Timing,
}

impl<C> Clone for CommandChannel<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            timing: self.timing,
        }
    }
}

impl<C: ByteChannel> CommandChannel<C> {
    /// Take ownership of a byte channel.
    pub fn new(channel: C, timing: Timing) -> Self {
        Self {
            inner: Arc::new(Mutex::new(channel)),
            timing,
        }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Acquire exclusive use of the device.
    ///
    /// Waits at most `Timing::lock_timeout`; a longer wait means another
    /// holder is stuck on an unresponsive device.
    pub async fn lock(&self) -> Result<Exchange<'_, C>> {
        let port = time::timeout(self.timing.lock_timeout, self.inner.lock())
            .await
            .map_err(|_| Error::Timeout(self.timing.lock_timeout))?;
        Ok(Exchange {
            port,
            timing: self.timing,
        })
    }

    /// Send a single command byte.
    pub async fn send_command(&self, command: u8) -> Result<()> {
        self.lock().await?.send_command(command).await
    }

    /// Read exactly `size` reply bytes.
    pub async fn read_response(&self, size: usize) -> Result<Vec<u8>> {
        self.lock().await?.read_response(size).await
    }
}

/// Exclusive access to the device for one or more protocol steps.
pub struct Exchange<'a, C> {
    port: MutexGuard<'a, C>,
    timing: Timing,
}

impl<C: ByteChannel> Exchange<'_, C> {
    /// Drop anything sitting in either direction of the channel.
    pub fn reset_buffers(&mut self) -> Result<()> {
        self.port.reset_input_buffer()?;
        self.port.reset_output_buffer()?;
        Ok(())
    }

    pub fn apply_read_timeout(&mut self) -> Result<()> {
        self.port.set_read_timeout(self.timing.read_timeout)?;
        Ok(())
    }

    /// Write exactly one command byte.
    pub async fn send_command(&mut self, command: u8) -> Result<()> {
        trace!("TX command 0x{:02X}", command);
        self.port.write(&[command]).await?;
        Ok(())
    }

    /// Write payload bytes with no command framing.
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        trace!("TX raw {}", hex::encode(data));
        self.port.write(data).await?;
        Ok(())
    }

    /// Read exactly `size` bytes, accumulating partial reads.
    ///
    /// A first read that returns nothing means the device is silent and
    /// fails with [`Error::NoData`]. After that, empty reads are retried:
    /// the device answered and is assumed to be slow. Unless
    /// `Timing::response_deadline` is set, a device that stops short blocks
    /// here for as long as the channel stays open.
    pub async fn read_response(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        if size == 0 {
            return Ok(buf);
        }

        let started = Instant::now();
        let mut count = self.port.read(&mut buf).await?;
        if count == 0 {
            return Err(Error::NoData);
        }

        while count < size {
            if let Some(deadline) = self.timing.response_deadline {
                if started.elapsed() >= deadline {
                    debug!("Gave up on response after {} of {} bytes", count, size);
                    return Err(Error::Timeout(deadline));
                }
            }
            count += self.port.read(&mut buf[count..]).await?;
        }

        trace!("RX {}", hex::encode(&buf));
        Ok(buf)
    }

    /// Read one byte and require it to be the success code.
    pub async fn expect_ack(&mut self, step: &'static str) -> Result<()> {
        let reply = self.read_response(1).await?;
        match reply[0] {
            SUCCESS => Ok(()),
            got => Err(Error::AckMismatch { step, got }),
        }
    }

    /// Send a command byte and require the success code back.
    pub async fn command_ack(&mut self, command: u8, step: &'static str) -> Result<()> {
        self.send_command(command).await?;
        self.expect_ack(step).await
    }

    /// Give the device time to act on the last write before reading.
    pub async fn settle(&self) {
        time::sleep(self.timing.settle_delay).await;
    }
}
