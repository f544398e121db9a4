//! Error types for zboard-core
//!
//! Every variant here is attributable to configuration: a pin that does not
//! exist, a controller that is already taken, a setting the board cannot do.
//! Messages always enumerate the valid options so the operator can fix the
//! request without reading board tables.

use core::fmt::Display;

use thiserror::Error;

use crate::board::{LayoutVariant, UploadMethod};
use crate::peripheral::{AdcGain, AdcReference};

/// Join a list of displayable items with ", ", or "none" when empty
pub(crate) fn join<T: Display>(items: &[T]) -> String {
    if items.is_empty() {
        return "none".to_string();
    }
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Logical pin name is not in the board's pin table
    #[error("cannot handle pin '{pin}' on {board}, must be one of: {}", join(.valid))]
    UnknownPin {
        /// Board name
        board: String,
        /// Requested logical pin name
        pin: String,
        /// Every valid logical pin name for the board
        valid: Vec<String>,
    },

    /// Pin exists digitally but has no analog channel
    #[error("pin '{pin}' cannot be used as ADC input on {board}, analog pins are: {}", join(.valid))]
    UnsupportedAnalogPin {
        /// Board name
        board: String,
        /// Requested logical pin name
        pin: String,
        /// Every valid analog pin name for the board
        valid: Vec<String>,
    },

    /// Explicit I2C controller is claimed already or does not exist
    #[error(
        "I2C controller '{requested}' is not available on {board} (unclaimed controllers: {})",
        join(.available)
    )]
    ControllerUnavailable {
        /// Board name
        board: String,
        /// Requested controller id
        requested: String,
        /// Controllers still unclaimed at the time of the request
        available: Vec<String>,
    },

    /// Clock frequency not supported by the hardware controller
    #[error(
        "{board} only supports {} Hz for its built-in I2C controllers, got {frequency} Hz",
        join(.supported)
    )]
    UnsupportedFrequency {
        /// Board name
        board: String,
        /// Requested frequency in Hz
        frequency: u32,
        /// Supported discrete rates in Hz
        supported: Vec<u32>,
    },

    /// ADC voltage reference not supported by the board
    #[error("{board} does not support ADC reference {reference}, supported: {}", join(.supported))]
    UnsupportedReference {
        /// Board name
        board: String,
        /// Requested reference
        reference: AdcReference,
        /// Supported references
        supported: Vec<AdcReference>,
    },

    /// ADC gain not supported by the board
    #[error("{board} does not support ADC gain {gain}, supported: {}", join(.supported))]
    UnsupportedGain {
        /// Board name
        board: String,
        /// Requested gain
        gain: AdcGain,
        /// Supported gains
        supported: Vec<AdcGain>,
    },

    /// ADC resolution not supported by the board
    #[error("{board} does not support {resolution}-bit ADC resolution, supported: {}", join(.supported))]
    UnsupportedResolution {
        /// Board name
        board: String,
        /// Requested resolution in bits
        resolution: u8,
        /// Supported resolutions in bits
        supported: Vec<u8>,
    },

    /// A second SPI request asked for different pins on the single SPI bus
    #[error(
        "SPI bus {device} on {board} is already configured with clk={clk}, mosi={mosi}, miso={miso}"
    )]
    SpiBusConflict {
        /// Board name
        board: String,
        /// SPI controller id
        device: String,
        /// Clock pin of the existing configuration
        clk: String,
        /// MOSI pin of the existing configuration
        mosi: String,
        /// MISO pin of the existing configuration
        miso: String,
    },

    /// Setting string from a request file could not be parsed
    #[error("invalid {field} '{value}', must be one of: {}", join(.valid))]
    InvalidSetting {
        /// Setting name (e.g. "gain")
        field: &'static str,
        /// Value as written by the user
        value: String,
        /// Accepted spellings
        valid: Vec<String>,
    },

    /// Board name is not in the database
    #[error("unknown board '{name}', known boards: {}", join(.known))]
    UnknownBoard {
        /// Requested board name
        name: String,
        /// Names of every loaded board
        known: Vec<String>,
    },

    /// Board has no partition layout for the requested variant
    #[error("{board} has no {variant} partition layout, available: {}", join(.available))]
    UnsupportedLayout {
        /// Board name
        board: String,
        /// Requested layout variant
        variant: LayoutVariant,
        /// Variants the board provides
        available: Vec<LayoutVariant>,
    },

    /// Board cannot be uploaded with the requested method
    #[error("{board} cannot be uploaded with {method}, available: {}", join(.available))]
    UnsupportedUploadMethod {
        /// Board name
        board: String,
        /// Requested upload method
        method: UploadMethod,
        /// Methods the board provides
        available: Vec<UploadMethod>,
    },
}

impl Error {
    /// Returns true for errors caused by a peripheral request
    ///
    /// Input errors are raised during allocation, before any overlay text is
    /// emitted or any external tool is started.
    pub fn is_input_error(&self) -> bool {
        !matches!(
            self,
            Self::UnknownBoard { .. }
                | Self::UnsupportedLayout { .. }
                | Self::UnsupportedUploadMethod { .. }
        )
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
