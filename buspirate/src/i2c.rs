//! Bus Pirate I2C master driver
//!
//! Drives the I2C sub-protocol of a Bus Pirate that has already been switched
//! into I2C mode. Every bus operation is a single command byte answered by a
//! single status byte, except bulk writes, which are followed by the raw
//! payload and answered with one ACK/NACK byte per payload byte.
//!
//! Protocol reference: <http://dangerousprototypes.com/docs/I2C_(binary)>

use async_trait::async_trait;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::channel::{CommandChannel, Exchange};
use crate::error::{Error, Result};
use crate::protocol::{i2c as cmd, Mode};
use crate::tracing::prelude::*;
use crate::transport::{BusTransport, ByteChannel};

/// I2C clock speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum I2cSpeed {
    Khz5 = 0x00,
    Khz50 = 0x01,
    Khz100 = 0x02,
    #[default]
    Khz400 = 0x03,
}

/// Rail the on-board pull-up resistors are tied to (v4 hardware).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PullUpVoltage {
    #[default]
    V3v3 = 0x01,
    V5 = 0x02,
}

bitflags! {
    /// Peripheral configuration bits, low nibble of the config command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PinConfig: u8 {
        const CS = 0x01;
        const AUX = 0x02;
        const PULL_UPS = 0x04;
        const POWER = 0x08;
    }
}

impl Default for PinConfig {
    fn default() -> Self {
        PinConfig::POWER | PinConfig::PULL_UPS
    }
}

/// I2C mode parameters, applied when the driver is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct I2cConfig {
    /// Bus clock
    pub speed: I2cSpeed,
    /// Power supply, pull-ups, AUX and CS pins
    pub pins: PinConfig,
    /// Pull-up rail
    pub pull_up: PullUpVoltage,
}

/// I2C master over a Bus Pirate in I2C mode.
pub struct I2c<C> {
    channel: CommandChannel<C>,
    config: I2cConfig,
}

impl<C: ByteChannel> I2c<C> {
    /// Configure the bus and return a ready driver.
    ///
    /// Speed, pins and pull-up rail are set in that order and each must be
    /// acknowledged. The first failure aborts; settings already applied stay
    /// applied on the device.
    pub async fn new(channel: CommandChannel<C>, config: I2cConfig) -> Result<Self> {
        let mut i2c = Self { channel, config };
        i2c.set_speed(config.speed).await?;
        i2c.configure_pins(config.pins).await?;
        i2c.set_pull_up_voltage(config.pull_up).await?;
        debug!(
            "I2C configured: {:?}, pins {:?}, pull-ups {:?}",
            config.speed, config.pins, config.pull_up
        );
        Ok(i2c)
    }

    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        Mode::I2c
    }

    pub async fn set_speed(&mut self, speed: I2cSpeed) -> Result<()> {
        self.configure(cmd::SET_SPEED | speed as u8, "I2C speed").await?;
        self.config.speed = speed;
        Ok(())
    }

    pub async fn configure_pins(&mut self, pins: PinConfig) -> Result<()> {
        self.configure(cmd::CONFIG_PERIPHERALS | pins.bits(), "pin configuration")
            .await?;
        self.config.pins = pins;
        Ok(())
    }

    pub async fn set_pull_up_voltage(&mut self, volts: PullUpVoltage) -> Result<()> {
        self.configure(cmd::PULL_UP_SELECT | volts as u8, "pull-up voltage")
            .await?;
        self.config.pull_up = volts;
        Ok(())
    }

    /// Ask the firmware which mode it is in; it must answer "I2C1".
    pub async fn version(&self) -> Result<()> {
        let mut link = self.channel.lock().await?;
        link.send_command(cmd::VERSION).await?;
        let expected = Mode::I2c.ack();
        let reply = link.read_response(expected.len()).await?;
        if reply != expected {
            return Err(Error::UnexpectedReply {
                step: "I2C version",
                expected: String::from_utf8_lossy(expected).into_owned(),
                got: String::from_utf8_lossy(&reply).into_owned(),
            });
        }
        Ok(())
    }

    /// Put a start condition on the bus.
    pub async fn send_start(&self) -> Result<()> {
        send_start(&mut self.channel.lock().await?).await
    }

    /// Put a stop condition on the bus, e.g. after a failed transaction.
    pub async fn send_stop(&self) -> Result<()> {
        send_stop(&mut self.channel.lock().await?).await
    }

    async fn configure(&self, command: u8, step: &'static str) -> Result<()> {
        let mut link = self.channel.lock().await?;
        link.command_ack(command, step).await
    }
}

#[async_trait]
impl<C: ByteChannel + Sync> BusTransport for I2c<C> {
    /// Start, bulk write of `data` (address byte first), stop.
    ///
    /// A failure part way leaves the bus without a stop condition.
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        check_payload(data)?;
        let mut link = self.channel.lock().await?;
        send_start(&mut link).await?;
        bulk_write(&mut link, data).await?;
        send_stop(&mut link).await?;
        Ok(())
    }

    /// Start, address write, one read per buffer byte (ACK between bytes,
    /// NACK after the last), stop.
    async fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let mut link = self.channel.lock().await?;
        send_start(&mut link).await?;
        bulk_write(&mut link, &[address]).await?;

        let count = buffer.len();
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = read_byte(&mut link).await?;
            if i + 1 < count {
                send_ack(&mut link).await?;
            }
        }
        send_nack(&mut link).await?;
        send_stop(&mut link).await?;

        trace!("Read {} from 0x{:02X}", hex::encode(&*buffer), address);
        Ok(count)
    }
}

fn check_payload(data: &[u8]) -> Result<()> {
    if data.is_empty() || data.len() > cmd::MAX_BULK_WRITE {
        return Err(Error::InvalidArgument(format!(
            "I2C write takes 1 to {} bytes, got {}",
            cmd::MAX_BULK_WRITE,
            data.len()
        )));
    }
    Ok(())
}

async fn send_start<C: ByteChannel>(link: &mut Exchange<'_, C>) -> Result<()> {
    link.command_ack(cmd::START, "start bit").await
}

async fn send_stop<C: ByteChannel>(link: &mut Exchange<'_, C>) -> Result<()> {
    link.command_ack(cmd::STOP, "stop bit").await
}

/// Bulk write of 1-16 bytes. Returns the per-byte receipt, where 0x00 means
/// the target ACKed that byte.
async fn bulk_write<C: ByteChannel>(link: &mut Exchange<'_, C>, data: &[u8]) -> Result<Vec<u8>> {
    check_payload(data)?;

    link.send_command(cmd::BULK_WRITE | (data.len() - 1) as u8)
        .await?;
    link.settle().await;
    link.expect_ack("bulk write").await?;

    link.write_raw(data).await?;
    link.settle().await;
    let receipt = link.read_response(data.len()).await?;

    let nacked = receipt.iter().filter(|&&b| b != 0x00).count();
    if nacked > 0 {
        debug!("Target NACKed {} of {} written bytes", nacked, data.len());
    }
    Ok(receipt)
}

async fn read_byte<C: ByteChannel>(link: &mut Exchange<'_, C>) -> Result<u8> {
    link.send_command(cmd::READ_BYTE).await?;
    link.settle().await;
    let reply = link.read_response(1).await?;
    Ok(reply[0])
}

async fn send_ack<C: ByteChannel>(link: &mut Exchange<'_, C>) -> Result<u8> {
    link.send_command(cmd::ACK).await?;
    Ok(link.read_response(1).await?[0])
}

async fn send_nack<C: ByteChannel>(link: &mut Exchange<'_, C>) -> Result<u8> {
    link.send_command(cmd::NACK).await?;
    Ok(link.read_response(1).await?[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timing;
    use crate::transport::mock::MockChannel;
    use test_case::test_case;

    async fn driver(mock: &MockChannel, config: I2cConfig) -> Result<I2c<MockChannel>> {
        I2c::new(CommandChannel::new(mock.clone(), Timing::default()), config).await
    }

    fn fast_config() -> I2cConfig {
        I2cConfig {
            speed: I2cSpeed::Khz400,
            pins: PinConfig::POWER | PinConfig::PULL_UPS,
            pull_up: PullUpVoltage::V3v3,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_construction_sends_three_config_commands() {
        let mock = MockChannel::new();
        mock.ok(3);

        let i2c = driver(&mock, fast_config()).await.unwrap();

        assert_eq!(mock.writes(), vec![vec![0x63], vec![0x4C], vec![0x51]]);
        assert_eq!(i2c.config(), &fast_config());
    }

    #[test_case(0 ; "speed rejected")]
    #[test_case(1 ; "pins rejected")]
    #[test_case(2 ; "pull-up rejected")]
    #[tokio::test(start_paused = true)]
    async fn test_construction_is_all_or_nothing(failing_step: usize) {
        let mock = MockChannel::new();
        mock.ok(failing_step);
        mock.reply(&[0x00]);

        let err = driver(&mock, fast_config()).await.err().unwrap();

        assert!(matches!(err, Error::AckMismatch { got: 0x00, .. }), "got {err:?}");
        // Nothing is sent after the rejected step.
        assert_eq!(mock.writes().len(), failing_step + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_construction_fails_on_silent_device() {
        let mock = MockChannel::new();
        mock.ok(1).silent();

        let err = driver(&mock, fast_config()).await.err().unwrap();
        assert!(matches!(err, Error::NoData), "got {err:?}");
    }

    #[test_case(I2cSpeed::Khz5, 0x60)]
    #[test_case(I2cSpeed::Khz50, 0x61)]
    #[test_case(I2cSpeed::Khz100, 0x62)]
    #[test_case(I2cSpeed::Khz400, 0x63)]
    #[tokio::test(start_paused = true)]
    async fn test_speed_encoding(speed: I2cSpeed, command: u8) {
        let mock = MockChannel::new();
        mock.ok(4);
        let mut i2c = driver(&mock, I2cConfig::default()).await.unwrap();

        i2c.set_speed(speed).await.unwrap();

        assert_eq!(mock.writes().last(), Some(&vec![command]));
        assert_eq!(i2c.config().speed, speed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pin_and_pull_up_encoding() {
        let mock = MockChannel::new();
        mock.ok(5);
        let mut i2c = driver(&mock, I2cConfig::default()).await.unwrap();

        i2c.configure_pins(PinConfig::all()).await.unwrap();
        i2c.set_pull_up_voltage(PullUpVoltage::V5).await.unwrap();

        let writes = mock.writes();
        assert_eq!(writes[3], vec![0x4F]);
        assert_eq!(writes[4], vec![0x52]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_transaction() {
        let mock = MockChannel::new();
        mock.ok(3);
        let mut i2c = driver(&mock, fast_config()).await.unwrap();
        mock.ok(1) // start
            .ok(1) // bulk write, 3 bytes
            .reply(&[0x00, 0x00, 0x00])
            .ok(1); // stop

        i2c.write(&[0x20, 0x00, 0x16]).await.unwrap();

        assert_eq!(
            mock.writes()[3..],
            [vec![0x02], vec![0x12], vec![0x20, 0x00, 0x16], vec![0x03]]
        );
        assert_eq!(mock.pending_replies(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_sixteen_bytes() {
        let mock = MockChannel::new();
        mock.ok(3);
        let mut i2c = driver(&mock, fast_config()).await.unwrap();
        let payload: Vec<u8> = (0..16).collect();
        mock.ok(2).reply(&[0x00; 16]).ok(1);

        i2c.write(&payload).await.unwrap();

        let writes = mock.writes();
        assert_eq!(writes[4], vec![0x1F]);
        assert_eq!(writes[5], payload);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_succeeds_when_target_nacks_bytes() {
        let mock = MockChannel::new();
        mock.ok(3);
        let mut i2c = driver(&mock, fast_config()).await.unwrap();
        mock.ok(2).reply(&[0x00, 0x01]).ok(1);

        i2c.write(&[0x20, 0x7F]).await.unwrap();

        assert_eq!(mock.written_bytes()[3..], [0x02, 0x11, 0x20, 0x7F, 0x03]);
        assert_eq!(mock.pending_replies(), 0);
    }

    #[test_case(0 ; "empty")]
    #[test_case(17 ; "one too many")]
    #[test_case(64 ; "far too many")]
    #[tokio::test(start_paused = true)]
    async fn test_write_rejects_bad_length_without_traffic(len: usize) {
        let mock = MockChannel::new();
        mock.ok(3);
        let mut i2c = driver(&mock, fast_config()).await.unwrap();
        let before = mock.writes().len();

        let err = i2c.write(&vec![0xAA; len]).await.unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
        assert_eq!(mock.writes().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_aborts_without_stop_when_write_rejected() {
        let mock = MockChannel::new();
        mock.ok(3);
        let mut i2c = driver(&mock, fast_config()).await.unwrap();
        mock.ok(1).reply(&[0x00]);

        let err = i2c.write(&[0x20, 0x01]).await.unwrap_err();

        assert!(
            matches!(err, Error::AckMismatch { step: "bulk write", got: 0x00 }),
            "got {err:?}"
        );
        // start, write command; no payload and no stop
        assert_eq!(mock.writes()[3..], [vec![0x02], vec![0x11]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_rejected_start() {
        let mock = MockChannel::new();
        mock.ok(3);
        let mut i2c = driver(&mock, fast_config()).await.unwrap();
        mock.reply(&[0xFF]);

        let err = i2c.write(&[0x20]).await.unwrap_err();
        assert!(
            matches!(err, Error::AckMismatch { step: "start bit", got: 0xFF }),
            "got {err:?}"
        );
    }

    /// Script replies for a `k` byte read and return the expected data.
    fn script_read(mock: &MockChannel, k: usize) -> Vec<u8> {
        let data: Vec<u8> = (0..k).map(|i| 0x80 + i as u8).collect();
        mock.ok(1) // start
            .ok(1) // bulk write command
            .reply(&[0x00]); // address receipt
        for (i, byte) in data.iter().enumerate() {
            mock.reply(&[*byte]);
            if i + 1 < k {
                mock.ok(1); // ack
            }
        }
        mock.ok(1) // nack
            .ok(1); // stop
        data
    }

    #[test_case(1)]
    #[test_case(2)]
    #[test_case(5)]
    #[tokio::test(start_paused = true)]
    async fn test_read_framing(k: usize) {
        let mock = MockChannel::new();
        mock.ok(3);
        let mut i2c = driver(&mock, fast_config()).await.unwrap();
        let expected = script_read(&mock, k);

        let mut buffer = vec![0u8; k];
        let n = i2c.read(0x21, &mut buffer).await.unwrap();

        assert_eq!(n, k);
        assert_eq!(buffer, expected);

        let sent: Vec<Vec<u8>> = mock.writes()[3..].to_vec();
        let count = |byte: u8| sent.iter().filter(|w| **w == vec![byte]).count();
        assert_eq!(count(cmd::READ_BYTE), k);
        assert_eq!(count(cmd::ACK), k - 1);
        assert_eq!(count(cmd::NACK), 1);
        assert_eq!(sent[..3], [vec![0x02], vec![0x10], vec![0x21]]);
        assert_eq!(sent[sent.len() - 2..], [vec![cmd::NACK], vec![cmd::STOP]]);

        // ACK follows every read except the last
        for pair in sent.windows(2) {
            if pair[0] == vec![cmd::ACK] {
                assert_eq!(pair[1], vec![cmd::READ_BYTE]);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_empty_buffer_is_noop() {
        let mock = MockChannel::new();
        mock.ok(3);
        let mut i2c = driver(&mock, fast_config()).await.unwrap();

        let n = i2c.read(0x21, &mut []).await.unwrap();

        assert_eq!(n, 0);
        assert_eq!(mock.writes().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_propagates_ack_failure() {
        let mock = MockChannel::new();
        mock.ok(3);
        let mut i2c = driver(&mock, fast_config()).await.unwrap();
        mock.ok(2).reply(&[0x00]).reply(&[0x42]).silent();

        let mut buffer = [0u8; 2];
        let err = i2c.read(0x21, &mut buffer).await.unwrap_err();

        assert!(matches!(err, Error::NoData), "got {err:?}");
        assert_eq!(buffer[0], 0x42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_stop_for_recovery() {
        let mock = MockChannel::new();
        mock.ok(4);
        let i2c = driver(&mock, fast_config()).await.unwrap();

        i2c.send_stop().await.unwrap();

        assert_eq!(mock.writes().last(), Some(&vec![0x03]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_version() {
        let mock = MockChannel::new();
        mock.ok(3).reply(b"I2C1").reply(b"BBIO");
        let i2c = driver(&mock, fast_config()).await.unwrap();

        i2c.version().await.unwrap();
        let err = i2c.version().await.unwrap_err();
        assert!(
            matches!(&err, Error::UnexpectedReply { step: "I2C version", got, .. } if got == "BBIO"),
            "got {err:?}"
        );
    }

    #[test]
    fn test_pin_config_bits() {
        assert_eq!((PinConfig::POWER | PinConfig::PULL_UPS).bits(), 0x0C);
        assert_eq!(PinConfig::all().bits(), 0x0F);
        assert_eq!(PinConfig::default().bits(), 0x0C);
    }
}
