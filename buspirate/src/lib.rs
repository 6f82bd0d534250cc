//! Driver for the Bus Pirate binary protocol.
//!
//! A [`Session`] takes ownership of a [`ByteChannel`] (normally a
//! [`SerialChannel`]), performs the binary-mode handshake, and switches the
//! adapter into a bus mode. The resulting [`Transport`] implements
//! [`BusTransport`]; I2C is the only bus mode with a driver.
//!
//! ```no_run
//! use buspirate::{BusParams, BusTransport, I2cConfig, Mode, SerialChannel, Session};
//!
//! # async fn demo() -> buspirate::Result<()> {
//! let port = SerialChannel::open("/dev/ttyUSB0", 115_200)?;
//! let mut session = Session::new(port);
//! session.connect().await?;
//!
//! let bus = session.switch_mode(Mode::I2c, BusParams::I2c(I2cConfig::default())).await?;
//! bus.write(&[0x20, 0x00, 0x16]).await?;
//! let mut data = [0u8; 1];
//! bus.read(0x21, &mut data).await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod i2c;
pub mod protocol;
pub mod session;
pub mod tracing;
pub mod transport;

pub use config::{Config, Timing};
pub use error::{Error, Result};
pub use i2c::{I2c, I2cConfig, I2cSpeed, PinConfig, PullUpVoltage};
pub use protocol::Mode;
pub use session::{BusParams, Session, SessionState, Transport};
pub use transport::serial::SerialChannel;
pub use transport::{BusTransport, ByteChannel};
