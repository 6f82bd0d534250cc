//! Command-line interface for the Bus Pirate driver.
//!
//! Lists serial ports and runs an I2C smoke test against a device: enter I2C
//! mode with the `[i2c]` settings (400kHz, power and pull-ups on at 3.3V
//! unless configured otherwise), select a register with a write, and read it
//! back.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use buspirate::tracing::{self, prelude::*};
use buspirate::transport::serial::available_ports;
use buspirate::{BusTransport, Config, Mode, SerialChannel, Session};

#[derive(Parser)]
#[command(name = "buspirate-cli", version, about = "Drive a Bus Pirate in binary I2C mode")]
struct Cli {
    /// Serial port the Bus Pirate is attached to
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports
    Ports,
    /// Write a register pointer and read the register back
    Demo {
        /// 8-bit write address of the target
        #[arg(long, default_value = "0x20", value_parser = parse_byte)]
        address: u8,
        /// Registers to read
        #[arg(long, value_delimiter = ',', default_values = ["0x16", "0x17"], value_parser = parse_byte)]
        registers: Vec<u8>,
    },
}

fn parse_byte(s: &str) -> std::result::Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("{s:?}: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init_journald_or_stdout();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::from_env()?,
    };
    if let Some(port) = cli.port {
        config.port.path = Some(port);
    }
    if let Some(baud) = cli.baud {
        config.port.baud_rate = baud;
    }

    match cli.command {
        Command::Ports => list_ports(),
        Command::Demo { address, registers } => demo(&config, address, &registers).await,
    }
}

fn list_ports() -> Result<()> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{}", port.port_name);
    }
    Ok(())
}

async fn demo(config: &Config, address: u8, registers: &[u8]) -> Result<()> {
    let path = match &config.port.path {
        Some(path) => path.clone(),
        None => available_ports()?
            .into_iter()
            .next()
            .map(|p| p.port_name)
            .ok_or_else(|| anyhow!("no serial ports found, use --port"))?,
    };

    let port = SerialChannel::open(&path, config.port.baud_rate)
        .with_context(|| format!("opening {}", path))?;
    let mut session = Session::with_timing(port, config.timing());
    session.connect().await.context("entering binary mode")?;

    let bus = session.switch_mode(Mode::I2c, config.i2c_params()).await?;

    for &register in registers {
        bus.write(&[address, 0x00, register])
            .await
            .with_context(|| format!("selecting register 0x{:02X}", register))?;
        let mut data = [0u8; 1];
        bus.read(address | 0x01, &mut data)
            .await
            .with_context(|| format!("reading register 0x{:02X}", register))?;
        info!("Register 0x{:02X}: 0x{:02X}", register, data[0]);
    }

    Ok(())
}
