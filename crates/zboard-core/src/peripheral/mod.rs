//! Peripheral requests and allocations
//!
//! A request is what the user asks for, in board-agnostic terms. An
//! allocation is the resolved result: a concrete device id plus the physical
//! pins it is wired to. Allocations are produced by
//! [`crate::session::AllocationSession::allocate`].

mod adc;

use core::fmt;

use crate::board::PhysicalPin;

pub use adc::{AdcGain, AdcReference};

/// Bus-agnostic alias replaced by the board's default SDA pin
pub const SDA_ALIAS: &str = "SDA";
/// Bus-agnostic alias replaced by the board's default SCL pin
pub const SCL_ALIAS: &str = "SCL";

fn default_sda() -> String {
    SDA_ALIAS.to_string()
}

fn default_scl() -> String {
    SCL_ALIAS.to_string()
}

fn default_frequency() -> u32 {
    100_000
}

fn default_resolution() -> u8 {
    10
}

/// I2C bus request
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct I2cRequest {
    /// Logical SDA pin, or "SDA" for the board default
    #[serde(default = "default_sda")]
    pub sda: String,
    /// Logical SCL pin, or "SCL" for the board default
    #[serde(default = "default_scl")]
    pub scl: String,
    /// Bus clock in Hz
    #[serde(
        default = "default_frequency",
        deserialize_with = "crate::request::deserialize_frequency"
    )]
    pub frequency: u32,
    /// Explicit hardware controller id
    #[serde(default)]
    pub device: Option<String>,
}

impl Default for I2cRequest {
    fn default() -> Self {
        Self {
            sda: default_sda(),
            scl: default_scl(),
            frequency: default_frequency(),
            device: None,
        }
    }
}

/// SPI bus request; unset pins use the board defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpiRequest {
    /// Clock pin
    #[serde(default)]
    pub clk: Option<String>,
    /// MOSI pin
    #[serde(default)]
    pub mosi: Option<String>,
    /// MISO pin
    #[serde(default)]
    pub miso: Option<String>,
}

/// ADC channel request
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdcRequest {
    /// Logical analog pin
    pub pin: String,
    /// Voltage reference
    #[serde(default)]
    pub reference: AdcReference,
    /// Input gain
    #[serde(default)]
    pub gain: AdcGain,
    /// Resolution in bits
    #[serde(default = "default_resolution")]
    pub resolution: u8,
}

impl AdcRequest {
    /// Request an analog pin with default settings
    pub fn new(pin: impl Into<String>) -> Self {
        Self {
            pin: pin.into(),
            reference: AdcReference::default(),
            gain: AdcGain::default(),
            resolution: default_resolution(),
        }
    }
}

/// One declarative peripheral request
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PeripheralRequest {
    /// I2C bus
    I2c(I2cRequest),
    /// SPI bus
    Spi(SpiRequest),
    /// ADC channel
    Adc(AdcRequest),
}

/// Whether an I2C bus runs on a hardware controller or is bit-banged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusKind {
    /// Dedicated hardware controller
    Hardware,
    /// Software-emulated bus on plain GPIOs
    Emulated,
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware => write!(f, "hardware"),
            Self::Emulated => write!(f, "emulated"),
        }
    }
}

/// A logical pin name together with its physical location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinAssignment {
    /// Logical name as resolved (after default substitution)
    pub name: String,
    /// Physical pin
    pub pin: PhysicalPin,
}

impl fmt::Display for PinAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.pin)
    }
}

/// Resolved I2C bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cAllocation {
    /// Controller id, or synthetic id for emulated buses
    pub device: String,
    /// Hardware or emulated
    pub bus: BusKind,
    /// Bus clock in Hz
    pub frequency: u32,
    /// SDA pin
    pub sda: PinAssignment,
    /// SCL pin
    pub scl: PinAssignment,
}

/// Resolved SPI bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiAllocation {
    /// SPI controller id
    pub device: String,
    /// Clock pin
    pub clk: PinAssignment,
    /// MOSI pin
    pub mosi: PinAssignment,
    /// MISO pin
    pub miso: PinAssignment,
}

/// Resolved ADC channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdcAllocation {
    /// Analog peripheral id
    pub device: String,
    /// Logical pin name
    pub pin: String,
    /// Analog channel
    pub channel: u8,
    /// Voltage reference
    pub reference: AdcReference,
    /// Input gain
    pub gain: AdcGain,
    /// Resolution in bits
    pub resolution: u8,
}

/// Result of resolving one peripheral request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// I2C bus
    I2c(I2cAllocation),
    /// SPI bus
    Spi(SpiAllocation),
    /// ADC channel
    Adc(AdcAllocation),
}

impl Allocation {
    /// Device id of this allocation
    pub fn device(&self) -> &str {
        match self {
            Self::I2c(a) => &a.device,
            Self::Spi(a) => &a.device,
            Self::Adc(a) => &a.device,
        }
    }

    /// Peripheral kind ("i2c", "spi" or "adc")
    pub fn kind(&self) -> &'static str {
        match self {
            Self::I2c(_) => "i2c",
            Self::Spi(_) => "spi",
            Self::Adc(_) => "adc",
        }
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c(a) => write!(
                f,
                "i2c {} [{}] sda={} scl={} @ {} Hz",
                a.device, a.bus, a.sda, a.scl, a.frequency
            ),
            Self::Spi(a) => write!(
                f,
                "spi {} clk={} mosi={} miso={}",
                a.device, a.clk, a.mosi, a.miso
            ),
            Self::Adc(a) => write!(
                f,
                "adc {} channel {} ({}) ref={} gain={} {}-bit",
                a.device, a.channel, a.pin, a.reference, a.gain, a.resolution
            ),
        }
    }
}
