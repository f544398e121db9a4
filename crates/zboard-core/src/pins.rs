//! Logical pin resolution
//!
//! Maps the logical pin names printed on a board ("D4", "A2", "P0.05") to
//! physical (controller, index) pairs and analog channels. Lookups are pure;
//! unknown names fail with the full list of valid names.

use crate::board::{BoardDescriptor, PhysicalPin};
use crate::error::{Error, Result};

/// Pin lookups against one board's tables
#[derive(Debug, Clone, Copy)]
pub struct PinResolver<'a> {
    board: &'a BoardDescriptor,
}

impl<'a> PinResolver<'a> {
    /// Create a resolver for a board
    pub fn new(board: &'a BoardDescriptor) -> Self {
        Self { board }
    }

    /// Resolve a logical pin to its physical location
    pub fn resolve(&self, name: &str) -> Result<&'a PhysicalPin> {
        self.board
            .pins
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, pin)| pin)
            .ok_or_else(|| Error::UnknownPin {
                board: self.board.name.clone(),
                pin: name.to_string(),
                valid: self.names().map(str::to_string).collect(),
            })
    }

    /// Resolve a logical analog pin to its ADC channel
    pub fn resolve_analog(&self, name: &str) -> Result<u8> {
        if let Some((_, channel)) = self.board.analog.iter().find(|(n, _)| n == name) {
            return Ok(*channel);
        }
        if self.board.pins.iter().any(|(n, _)| n == name) {
            Err(Error::UnsupportedAnalogPin {
                board: self.board.name.clone(),
                pin: name.to_string(),
                valid: self.analog_names().map(str::to_string).collect(),
            })
        } else {
            Err(Error::UnknownPin {
                board: self.board.name.clone(),
                pin: name.to_string(),
                valid: self.analog_names().map(str::to_string).collect(),
            })
        }
    }

    /// Valid logical pin names, in table order
    pub fn names(&self) -> impl Iterator<Item = &'a str> {
        self.board.pins.iter().map(|(n, _)| n.as_str())
    }

    /// Valid analog pin names, in table order
    pub fn analog_names(&self) -> impl Iterator<Item = &'a str> {
        self.board.analog.iter().map(|(n, _)| n.as_str())
    }
}
