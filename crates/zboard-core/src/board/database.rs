//! Board database for runtime loading and lookup
//!
//! This module provides the `BoardDatabase` type for loading board
//! definitions from RON files. The boards shipped with zboard are embedded at
//! compile time and parsed once on first use.

use std::fs;
use std::io;
use std::path::Path;

use once_cell::sync::Lazy;

use super::{
    AdcTable, BoardDescriptor, BootloaderFlags, Conflict, I2cTable, LayoutVariant,
    PartitionLayout, PhysicalPin, SetupHook, Soc, SpiTable, UploadMethod, UploadPlan,
};
use crate::error::{Error, Result};
use crate::kconfig::{BuildFlags, KconfigValue};
use crate::peripheral::{AdcGain, AdcReference};

/// Error type for board database operations
#[derive(Debug, thiserror::Error)]
pub enum BoardDbError {
    /// I/O error reading files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// RON parsing error
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Validation error
    #[error("Validation error in board '{board}': {message}")]
    Validation {
        /// Board being validated
        board: String,
        /// What is wrong
        message: String,
    },
}

// ============================================================================
// RON deserialization types (intermediate format)
// ============================================================================

/// Pin table entry: (logical name, controller, index)
#[derive(Debug, Clone, serde::Deserialize)]
struct PinDef(String, String, u8);

/// Analog table entry: (logical name, channel)
#[derive(Debug, Clone, serde::Deserialize)]
struct AnalogDef(String, u8);

/// Build flag entry: (key, value as written in Kconfig)
#[derive(Debug, Clone, serde::Deserialize)]
struct FlagDef(String, String);

fn default_frequencies() -> Vec<u32> {
    vec![100_000, 400_000]
}

#[derive(Debug, Clone, serde::Deserialize)]
struct I2cDef {
    controllers: Vec<String>,
    #[serde(default = "default_frequencies")]
    frequencies: Vec<u32>,
    default_sda: String,
    default_scl: String,
    #[serde(default)]
    conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct SpiDef {
    device: String,
    default_clk: String,
    default_mosi: String,
    default_miso: String,
}

fn default_adc_device() -> String {
    "adc".to_string()
}

fn default_resolutions() -> Vec<u8> {
    vec![8, 10, 12, 14]
}

#[derive(Debug, Clone, serde::Deserialize)]
struct AdcDef {
    #[serde(default = "default_adc_device")]
    device: String,
    references: Vec<AdcReference>,
    gains: Vec<AdcGain>,
    #[serde(default = "default_resolutions")]
    resolutions: Vec<u8>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
struct BootloaderDef {
    common: Vec<FlagDef>,
    per_layout: Vec<(LayoutVariant, Vec<FlagDef>)>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct LayoutDef {
    variant: LayoutVariant,
    text: String,
}

/// Single board definition in RON format
#[derive(Debug, Clone, serde::Deserialize)]
struct BoardDef {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    description: String,
    soc: Soc,
    #[serde(default)]
    openthread: bool,
    pins: Vec<PinDef>,
    #[serde(default)]
    analog: Vec<AnalogDef>,
    i2c: I2cDef,
    spi: SpiDef,
    adc: AdcDef,
    #[serde(default)]
    kconfig: Vec<FlagDef>,
    #[serde(default)]
    bootloader: BootloaderDef,
    layouts: Vec<LayoutDef>,
    default_layout: LayoutVariant,
    #[serde(default)]
    setup_hooks: Vec<SetupHook>,
    uploads: Vec<UploadPlan>,
    default_method: UploadMethod,
}

fn flags(defs: Vec<FlagDef>) -> BuildFlags {
    defs.into_iter()
        .map(|FlagDef(key, value)| {
            let value = KconfigValue::parse(&value);
            (key, value)
        })
        .collect()
}

impl From<BoardDef> for BoardDescriptor {
    fn from(def: BoardDef) -> Self {
        Self {
            name: def.name,
            aliases: def.aliases,
            description: def.description,
            soc: def.soc,
            openthread: def.openthread,
            pins: def
                .pins
                .into_iter()
                .map(|PinDef(name, controller, index)| (name, PhysicalPin::new(controller, index)))
                .collect(),
            analog: def
                .analog
                .into_iter()
                .map(|AnalogDef(name, channel)| (name, channel))
                .collect(),
            i2c: I2cTable {
                controllers: def.i2c.controllers,
                frequencies: def.i2c.frequencies,
                default_sda: def.i2c.default_sda,
                default_scl: def.i2c.default_scl,
                conflicts: def.i2c.conflicts,
            },
            spi: SpiTable {
                device: def.spi.device,
                default_clk: def.spi.default_clk,
                default_mosi: def.spi.default_mosi,
                default_miso: def.spi.default_miso,
            },
            adc: AdcTable {
                device: def.adc.device,
                references: def.adc.references,
                gains: def.adc.gains,
                resolutions: def.adc.resolutions,
            },
            kconfig: flags(def.kconfig),
            bootloader: BootloaderFlags {
                common: flags(def.bootloader.common),
                per_layout: def
                    .bootloader
                    .per_layout
                    .into_iter()
                    .map(|(variant, defs)| (variant, flags(defs)))
                    .collect(),
            },
            layouts: def
                .layouts
                .into_iter()
                .map(|l| PartitionLayout {
                    variant: l.variant,
                    text: l.text,
                })
                .collect(),
            default_layout: def.default_layout,
            setup_hooks: def.setup_hooks,
            uploads: def.uploads,
            default_method: def.default_method,
        }
    }
}

/// Check the internal consistency of a board descriptor
fn validate(board: &BoardDescriptor) -> core::result::Result<(), BoardDbError> {
    let fail = |message: String| BoardDbError::Validation {
        board: board.name.clone(),
        message,
    };
    let has_pin = |name: &str| board.pins.iter().any(|(n, _)| n == name);

    for (role, pin) in [
        ("default_sda", &board.i2c.default_sda),
        ("default_scl", &board.i2c.default_scl),
        ("default_clk", &board.spi.default_clk),
        ("default_mosi", &board.spi.default_mosi),
        ("default_miso", &board.spi.default_miso),
    ] {
        if !has_pin(pin.as_str()) {
            return Err(fail(format!("{} '{}' is not in the pin table", role, pin)));
        }
    }

    for (i, name) in board.pins.iter().map(|(n, _)| n).enumerate() {
        if board.pins.iter().skip(i + 1).any(|(n, _)| n == name) {
            return Err(fail(format!("duplicate pin name '{}'", name)));
        }
    }

    for (i, controller) in board.i2c.controllers.iter().enumerate() {
        if board.i2c.controllers.iter().skip(i + 1).any(|c| c == controller) {
            return Err(fail(format!("duplicate I2C controller '{}'", controller)));
        }
    }

    for conflict in &board.i2c.conflicts {
        if !board.i2c.controllers.contains(&conflict.controller) {
            return Err(fail(format!(
                "conflict names unknown I2C controller '{}'",
                conflict.controller
            )));
        }
    }

    if board.partition_layout(board.default_layout).is_err() {
        return Err(fail(format!(
            "default layout {} has no template",
            board.default_layout
        )));
    }

    if board.upload_plan(board.default_method).is_err() {
        return Err(fail(format!(
            "default upload method {} has no plan",
            board.default_method
        )));
    }

    for plan in &board.uploads {
        if board.partition_layout(plan.layout).is_err() {
            return Err(fail(format!(
                "upload method {} expects layout {} which has no template",
                plan.method, plan.layout
            )));
        }
        plan.validate_templates().map_err(fail)?;
    }

    Ok(())
}

// ============================================================================
// Built-in boards
// ============================================================================

/// RON sources of the boards shipped with zboard
const BUILTIN_SOURCES: &[(&str, &str)] = &[
    ("xiao_ble.ron", include_str!("../../boards/xiao_ble.ron")),
    (
        "adafruit_feather_nrf52840.ron",
        include_str!("../../boards/adafruit_feather_nrf52840.ron"),
    ),
    (
        "nrf52840dk_nrf52840.ron",
        include_str!("../../boards/nrf52840dk_nrf52840.ron"),
    ),
];

/// Static board database
///
/// Lazily initialized on first access.
static BUILTIN: Lazy<BoardDatabase> = Lazy::new(|| {
    let mut db = BoardDatabase::new();
    for (file, source) in BUILTIN_SOURCES {
        if let Err(e) = db.load_ron(source) {
            log::error!("Built-in board file {} is invalid: {}", file, e);
        }
    }
    db
});

// ============================================================================
// Board database
// ============================================================================

/// Runtime board database
///
/// Holds a collection of board descriptors that can be loaded from RON files.
#[derive(Debug, Clone, Default)]
pub struct BoardDatabase {
    boards: Vec<BoardDescriptor>,
}

impl BoardDatabase {
    /// Create an empty board database
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a database holding the built-in boards
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Load a single board from a RON string
    ///
    /// A board with the same name as an existing one replaces it.
    /// Returns the number of boards loaded (always 1 on success).
    pub fn load_ron(&mut self, content: &str) -> core::result::Result<usize, BoardDbError> {
        let def: BoardDef = ron::from_str(content)?;
        let board = BoardDescriptor::from(def);
        validate(&board)?;

        match self.boards.iter_mut().find(|b| b.name == board.name) {
            Some(existing) => {
                log::debug!("Board {} replaced by a new definition", board.name);
                *existing = board;
            }
            None => self.boards.push(board),
        }
        Ok(1)
    }

    /// Load a board from a RON file
    pub fn load_file(&mut self, path: &Path) -> core::result::Result<usize, BoardDbError> {
        let content = fs::read_to_string(path)?;
        self.load_ron(&content)
    }

    /// Load all `.ron` files from a directory
    pub fn load_dir(&mut self, dir: &Path) -> core::result::Result<usize, BoardDbError> {
        let mut entries: Vec<_> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "ron"))
            .collect();
        entries.sort();

        let mut count = 0;
        for path in entries {
            log::debug!("Loading board definition {}", path.display());
            count += self.load_file(&path)?;
        }
        Ok(count)
    }

    /// Find a board by name or alias
    pub fn find(&self, name: &str) -> Option<&BoardDescriptor> {
        self.boards.iter().find(|b| b.matches(name))
    }

    /// Get a board by name or alias
    pub fn get(&self, name: &str) -> Result<&BoardDescriptor> {
        self.find(name).ok_or_else(|| Error::UnknownBoard {
            name: name.to_string(),
            known: self.names().map(str::to_string).collect(),
        })
    }

    /// Names of all boards
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.boards.iter().map(|b| b.name.as_str())
    }

    /// Get the number of boards
    pub fn len(&self) -> usize {
        self.boards.len()
    }

    /// Check if the database is empty
    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Iterate over all boards
    pub fn iter(&self) -> impl Iterator<Item = &BoardDescriptor> {
        self.boards.iter()
    }
}
