//! Bus Pirate binary protocol tables.
//!
//! Command bytes for binary bit-bang ("BBIO") mode and the I2C sub-protocol,
//! plus the mode table mapping each binary mode to its entry command and the
//! acknowledgment string the firmware echoes.
//!
//! Protocol reference: <http://dangerousprototypes.com/docs/Bitbang>

use strum::{Display, EnumIter};

/// Reply to the reset command once the device is in binary bit-bang mode.
pub const BINARY_MODE_ACK: &[u8] = b"BBIO1";

/// Single-byte success reply used throughout the I2C sub-protocol.
pub const SUCCESS: u8 = 0x01;

/// Binary bit-bang (root) mode commands
pub mod bbio {
    pub const RESET: u8 = 0x00; // Enter/stay in binary mode, replies "BBIO1"
    pub const SPI: u8 = 0x01; // replies "SPI1"
    pub const I2C: u8 = 0x02; // replies "I2C1"
    pub const UART: u8 = 0x03; // replies "ART1"
    pub const ONE_WIRE: u8 = 0x04; // replies "1W01"
    pub const RAW_WIRE: u8 = 0x05; // replies "RAW1"
    pub const JTAG: u8 = 0x06; // OpenOCD JTAG mode
    pub const RESET_DEVICE: u8 = 0x0F; // Leave binary mode, reboot to console
    pub const SELF_TEST_SHORT: u8 = 0x10;
    pub const SELF_TEST_LONG: u8 = 0x11;
    pub const PWM_SETUP: u8 = 0x12; // Followed by 5 setup bytes
    pub const PWM_CLEAR: u8 = 0x13;
    pub const VOLTAGE_PROBE: u8 = 0x14; // Returns 2 bytes
    pub const VOLTAGE_PROBE_CONTINUOUS: u8 = 0x15;
    pub const FREQUENCY_AUX: u8 = 0x16;
    pub const PIN_DIRECTION: u8 = 0x40; // | AUX MOSI CLK MISO CS, 1=input
    pub const PIN_POWER: u8 = 0x80; // | POWER PULLUP AUX MOSI CLK MISO CS
}

/// I2C mode commands
pub mod i2c {
    pub const EXIT: u8 = 0x00; // Back to bit-bang mode, replies "BBIO1"
    pub const VERSION: u8 = 0x01; // Replies "I2C1"
    pub const START: u8 = 0x02;
    pub const STOP: u8 = 0x03;
    pub const READ_BYTE: u8 = 0x04;
    pub const ACK: u8 = 0x06;
    pub const NACK: u8 = 0x07;
    pub const SNIFF: u8 = 0x0F;
    pub const BULK_WRITE: u8 = 0x10; // | (count - 1), 1-16 bytes
    pub const CONFIG_PERIPHERALS: u8 = 0x40; // | power pullups aux cs
    pub const PULL_UP_SELECT: u8 = 0x50; // | 5V 3V3
    pub const SET_SPEED: u8 = 0x60; // | speed 0-3

    /// Largest payload a single bulk write can carry.
    pub const MAX_BULK_WRITE: usize = 16;
}

/// Binary protocol modes.
///
/// `Reset` is the bit-bang root itself; the rest are bus modes entered from
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Mode {
    #[strum(to_string = "binary")]
    Reset,
    #[strum(to_string = "SPI")]
    Spi,
    #[strum(to_string = "I2C")]
    I2c,
    #[strum(to_string = "UART")]
    Uart,
    #[strum(to_string = "1-Wire")]
    OneWire,
    #[strum(to_string = "raw-wire")]
    RawWire,
    #[strum(to_string = "JTAG")]
    Jtag,
}

impl Mode {
    /// Byte that requests this mode from binary bit-bang mode.
    pub const fn command(self) -> u8 {
        match self {
            Mode::Reset => bbio::RESET,
            Mode::Spi => bbio::SPI,
            Mode::I2c => bbio::I2C,
            Mode::Uart => bbio::UART,
            Mode::OneWire => bbio::ONE_WIRE,
            Mode::RawWire => bbio::RAW_WIRE,
            Mode::Jtag => bbio::JTAG,
        }
    }

    /// Exact reply the firmware sends after entering this mode.
    pub const fn ack(self) -> &'static [u8] {
        match self {
            Mode::Reset => BINARY_MODE_ACK,
            Mode::Spi => b"SPI1",
            Mode::I2c => b"I2C1",
            Mode::Uart => b"ART1",
            Mode::OneWire => b"1W01",
            Mode::RawWire => b"RAW1",
            Mode::Jtag => b"JTAG1",
        }
    }

    /// Whether this is a bus protocol mode rather than the binary root.
    pub const fn is_bus(self) -> bool {
        !matches!(self, Mode::Reset)
    }
}
