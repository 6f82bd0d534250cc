//! Device session for a Bus Pirate.
//!
//! A [`Session`] owns the byte channel to one adapter. It takes the adapter
//! from its interactive console into binary bit-bang mode, and from there
//! into a bus mode whose driver it then holds as the active [`Transport`].
//!
//! ```text
//! Console --connect()--> Binary --switch_mode(I2C)--> Bus(I2C)
//!    ^                      ^                            |
//!    |                      +--------connect()-----------+
//! ```

use async_trait::async_trait;

use crate::channel::{CommandChannel, Exchange};
use crate::config::Timing;
use crate::error::{Error, Result};
use crate::i2c::{I2c, I2cConfig};
use crate::protocol::{bbio, Mode, BINARY_MODE_ACK};
use crate::tracing::prelude::*;
use crate::transport::{BusTransport, ByteChannel};

/// Where the adapter is in its mode hierarchy, as far as we know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not yet handshaked; the adapter may be showing its console.
    Console,
    /// Binary bit-bang mode, ready for a mode switch.
    Binary,
    /// A bus mode was acknowledged by the device.
    Bus(Mode),
}

/// Parameters for the bus driver created by a mode switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusParams {
    I2c(I2cConfig),
}

/// The active bus driver.
pub enum Transport<C> {
    I2c(I2c<C>),
}

impl<C: ByteChannel> Transport<C> {
    pub fn mode(&self) -> Mode {
        match self {
            Transport::I2c(i2c) => i2c.mode(),
        }
    }

    pub fn as_i2c(&mut self) -> Option<&mut I2c<C>> {
        match self {
            Transport::I2c(i2c) => Some(i2c),
        }
    }
}

#[async_trait]
impl<C: ByteChannel + Sync> BusTransport for Transport<C> {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Transport::I2c(i2c) => i2c.write(data).await,
        }
    }

    async fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<usize> {
        match self {
            Transport::I2c(i2c) => i2c.read(address, buffer).await,
        }
    }
}

/// One Bus Pirate attached over a byte channel.
pub struct Session<C> {
    channel: CommandChannel<C>,
    state: SessionState,
    transport: Option<Transport<C>>,
}

impl<C: ByteChannel> Session<C> {
    /// Take ownership of the channel with default timing.
    pub fn new(channel: C) -> Self {
        Self::with_timing(channel, Timing::default())
    }

    pub fn with_timing(channel: C, timing: Timing) -> Self {
        Self {
            channel: CommandChannel::new(channel, timing),
            state: SessionState::Console,
            transport: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Enter binary bit-bang mode.
    ///
    /// Clears both channel buffers, applies the read timeout, then sends the
    /// reset command until the device answers "BBIO1" or the attempts run
    /// out. From a bus mode the same command exits back to binary mode, so
    /// this also drops any active transport.
    pub async fn connect(&mut self) -> Result<()> {
        let attempts = self.channel.timing().connect_attempts;
        let mut link = self.channel.lock().await?;
        link.reset_buffers()?;
        link.apply_read_timeout()?;

        debug!("Connecting to Bus Pirate");
        for attempt in 1..=attempts {
            match reset_attempt(&mut link).await {
                Ok(reply) if reply == BINARY_MODE_ACK => {
                    info!("Bus Pirate in binary mode after {} attempt(s)", attempt);
                    drop(link);
                    self.transport = None;
                    self.state = SessionState::Binary;
                    return Ok(());
                }
                Ok(reply) => {
                    trace!("Attempt {}: unexpected reply {}", attempt, hex::encode(&reply));
                }
                Err(e) => {
                    trace!("Attempt {}: {}", attempt, e);
                }
            }
        }

        // The reset bytes may already have taken the device out of a bus
        // mode, so nothing about the previous state can be trusted.
        drop(link);
        self.transport = None;
        self.state = SessionState::Console;
        warn!("No binary mode handshake after {} attempts", attempts);
        Err(Error::ConnectTimeout { attempts })
    }

    /// Send one raw command byte.
    pub async fn send_command(&self, command: u8) -> Result<()> {
        self.channel.send_command(command).await
    }

    /// Read exactly `size` reply bytes.
    pub async fn read_response(&self, size: usize) -> Result<Vec<u8>> {
        self.channel.read_response(size).await
    }

    /// Switch from binary mode into a bus mode and bring up its driver.
    ///
    /// Only I2C has a driver; every other mode fails with
    /// [`Error::UnsupportedMode`] before anything is sent.
    pub async fn switch_mode(&mut self, mode: Mode, params: BusParams) -> Result<&mut Transport<C>> {
        if mode != Mode::I2c {
            return Err(Error::UnsupportedMode(mode));
        }
        let BusParams::I2c(config) = params;

        match self.state {
            SessionState::Console => return Err(Error::NotConnected),
            SessionState::Bus(current) => {
                return Err(Error::ModeSwitchFailed {
                    mode,
                    reason: format!("already in {} mode", current),
                })
            }
            SessionState::Binary => {}
        }

        self.enter(mode).await.map_err(|e| match e {
            Error::ModeSwitchFailed { .. } => e,
            other => Error::ModeSwitchFailed {
                mode,
                reason: other.to_string(),
            },
        })?;
        self.state = SessionState::Bus(mode);
        debug!("Device acknowledged {} mode", mode);

        let i2c = I2c::new(self.channel.clone(), config)
            .await
            .map_err(|e| Error::ModeSwitchFailed {
                mode,
                reason: format!("driver setup failed: {}", e),
            })?;
        info!("{} transport ready", mode);
        Ok(self.transport.insert(Transport::I2c(i2c)))
    }

    /// The active transport, if a mode switch succeeded.
    pub fn transport(&mut self) -> Option<&mut Transport<C>> {
        self.transport.as_mut()
    }

    pub fn i2c(&mut self) -> Option<&mut I2c<C>> {
        self.transport.as_mut().and_then(Transport::as_i2c)
    }

    // Send the entry command and compare the echoed acknowledgment.
    async fn enter(&self, mode: Mode) -> Result<()> {
        let mut link = self.channel.lock().await?;
        link.send_command(mode.command()).await?;
        let expected = mode.ack();
        let reply = link.read_response(expected.len()).await?;
        if reply != expected {
            return Err(Error::ModeSwitchFailed {
                mode,
                reason: format!(
                    "expected {:?}, got {:?}",
                    String::from_utf8_lossy(expected),
                    String::from_utf8_lossy(&reply)
                ),
            });
        }
        Ok(())
    }
}

async fn reset_attempt<C: ByteChannel>(link: &mut Exchange<'_, C>) -> Result<Vec<u8>> {
    link.send_command(bbio::RESET).await?;
    link.read_response(BINARY_MODE_ACK.len()).await
}
