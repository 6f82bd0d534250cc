//! Configuration for the Bus Pirate driver.
//!
//! Settings can be loaded from a TOML file and then overridden from
//! environment variables. Everything has a default matching the Bus Pirate
//! v3/v4 firmware, so an empty file (or no file) is a valid configuration.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::i2c::I2cConfig;
use crate::session::BusParams;
use crate::transport::serial::DEFAULT_BAUD_RATE;

/// Read timeout applied to the byte channel during the handshake.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause between a write and reading its reply in the I2C sub-protocol.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(10);

/// Reset commands sent before giving up on the binary-mode handshake.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 30;

/// Bound on waiting for exclusive use of the channel.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Serial port settings
    pub port: PortConfig,

    /// Protocol timing
    pub timing: TimingConfig,

    /// I2C mode parameters
    pub i2c: I2cConfig,
}

/// Serial port settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortConfig {
    /// Device path, e.g. /dev/ttyUSB0. None means "pick one".
    pub path: Option<String>,

    pub baud_rate: u32,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            path: None,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Protocol timing, in the units people write in config files.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    pub read_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub connect_attempts: u32,
    pub lock_timeout_ms: u64,
    /// Overall bound on collecting one response. Unset means wait as long
    /// as the device keeps the channel open.
    pub response_deadline_ms: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Timing::default().into()
    }
}

/// Protocol timing used at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub read_timeout: Duration,
    pub settle_delay: Duration,
    pub connect_attempts: u32,
    pub lock_timeout: Duration,
    pub response_deadline: Option<Duration>,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            response_deadline: None,
        }
    }
}

impl From<&TimingConfig> for Timing {
    fn from(config: &TimingConfig) -> Self {
        Self {
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            connect_attempts: config.connect_attempts,
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            response_deadline: config.response_deadline_ms.map(Duration::from_millis),
        }
    }
}

impl From<Timing> for TimingConfig {
    fn from(timing: Timing) -> Self {
        Self {
            read_timeout_ms: timing.read_timeout.as_millis() as u64,
            settle_delay_ms: timing.settle_delay.as_millis() as u64,
            connect_attempts: timing.connect_attempts,
            lock_timeout_ms: timing.lock_timeout.as_millis() as u64,
            response_deadline_ms: timing.response_deadline.map(|d| d.as_millis() as u64),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment
    /// overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&text)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Timing in runtime form.
    pub fn timing(&self) -> Timing {
        Timing::from(&self.timing)
    }

    /// Parameters for switching into I2C mode, taken from `[i2c]`.
    pub fn i2c_params(&self) -> BusParams {
        BusParams::I2c(self.i2c)
    }

    /// Apply BUSPIRATE_PORT, BUSPIRATE_BAUD and BUSPIRATE_READ_TIMEOUT_MS.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("BUSPIRATE_PORT") {
            self.port.path = Some(path);
        }
        if let Some(baud) = env_number::<u32>("BUSPIRATE_BAUD")? {
            self.port.baud_rate = baud;
        }
        if let Some(ms) = env_number("BUSPIRATE_READ_TIMEOUT_MS")? {
            self.timing.read_timeout_ms = ms;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.port.baud_rate == 0 {
            return Err(Error::Config("baud_rate must be non-zero".to_string()));
        }
        if self.timing.connect_attempts == 0 {
            return Err(Error::Config("connect_attempts must be at least 1".to_string()));
        }
        if self.timing.read_timeout_ms == 0 {
            return Err(Error::Config("read_timeout_ms must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn env_number<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            Error::Config(format!("{} is not a valid number: {:?}", name, value))
        }),
        Err(_) => Ok(None),
    }
}
