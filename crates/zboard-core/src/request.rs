//! TOML request file parsing
//!
//! A request file names the board and lists the peripherals a firmware
//! needs, in the order they should be allocated:
//!
//! ```toml
//! [board]
//! name = "xiao_ble"
//! use_west = false
//! components = ["lsm6ds3"]
//!
//! [[peripheral]]
//! kind = "i2c"
//! sda = "D4"
//! scl = "D5"
//! frequency = "400kHz"
//!
//! [[peripheral]]
//! kind = "spi"
//!
//! [[peripheral]]
//! kind = "adc"
//! pin = "A0"
//! gain = "1/6"
//! reference = "internal"
//! resolution = 12
//! ```

use std::fs;
use std::io;
use std::path::Path;

use crate::board::BoardArgs;
use crate::peripheral::PeripheralRequest;

/// Error type for request file loading
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// I/O error reading the file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// TOML parsing error
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// `[board]` section of a request file
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardSection {
    /// Board name or alias
    pub name: String,
    /// Flash through a debug probe with `west flash`
    #[serde(default)]
    pub use_west: bool,
    /// Configured component platforms (selects board setup hooks)
    #[serde(default)]
    pub components: Vec<String>,
}

/// Parsed request file
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestFile {
    /// Board selection
    pub board: BoardSection,
    /// Peripheral requests in declaration order
    #[serde(default, rename = "peripheral")]
    pub peripherals: Vec<PeripheralRequest>,
}

impl RequestFile {
    /// Load a request file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, RequestError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a request file from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, RequestError> {
        Ok(toml::from_str(content)?)
    }

    /// Board options selected by the file
    pub fn board_args(&self) -> BoardArgs {
        BoardArgs {
            use_west: self.board.use_west,
        }
    }

    /// Peripheral requests in declaration order
    pub fn requests(&self) -> &[PeripheralRequest] {
        &self.peripherals
    }
}

/// Deserialize a frequency given in Hz or as a string like "400kHz"
pub(crate) fn deserialize_frequency<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HzOrStr {
        Int(u32),
        Str(String),
    }

    match HzOrStr::deserialize(deserializer)? {
        HzOrStr::Int(n) => Ok(n),
        HzOrStr::Str(s) => parse_frequency(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse a frequency string like "400kHz", "1 MHz" or "100000"
fn parse_frequency(s: &str) -> Result<u32, String> {
    let s = s.trim();

    if let Ok(n) = s.parse::<u32>() {
        return Ok(n);
    }

    let lower = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = lower.strip_suffix("mhz") {
        (n.trim(), 1_000_000.0)
    } else if let Some(n) = lower.strip_suffix("khz") {
        (n.trim(), 1_000.0)
    } else if let Some(n) = lower.strip_suffix("hz") {
        (n.trim(), 1.0)
    } else {
        return Err(format!("invalid frequency: {}", s));
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("invalid frequency: {}", s))?;
    let hz = (num * multiplier).round();
    if !(0.0..=u32::MAX as f64).contains(&hz) {
        return Err(format!("frequency out of range: {}", s));
    }
    Ok(hz as u32)
}
