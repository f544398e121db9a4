//! Board descriptors and database
//!
//! A board is described entirely by data: its pin tables, the I2C
//! controllers available for hardware allocation, the fixed SPI and ADC
//! peripherals, partition layouts, build flags and the upload plans used to
//! flash it. Descriptors are loaded from RON files (see [`BoardDatabase`]) and
//! are immutable once loaded; per-build mutable state lives in
//! [`crate::session::AllocationSession`].

mod database;
mod upload;

use core::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::kconfig::BuildFlags;
use crate::peripheral::{AdcGain, AdcReference};

pub use database::*;
pub use upload::*;

/// A concrete (GPIO controller, pin index) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhysicalPin {
    /// GPIO controller id (e.g. "gpio0")
    pub controller: String,
    /// Pin index within the controller
    pub index: u8,
}

impl PhysicalPin {
    /// Create a new physical pin
    pub fn new(controller: impl Into<String>, index: u8) -> Self {
        Self {
            controller: controller.into(),
            index,
        }
    }

    /// Port number used by pin-control macros ("gpio1" -> "1")
    pub fn port(&self) -> &str {
        self.controller
            .strip_prefix("gpio")
            .unwrap_or(&self.controller)
    }
}

impl fmt::Display for PhysicalPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.controller, self.index)
    }
}

/// SoC family, selects the pin-control dialect of rendered fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub enum Soc {
    /// Nordic nRF52840
    Nrf52840,
}

impl fmt::Display for Soc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nrf52840 => write!(f, "nRF52840"),
        }
    }
}

/// Partition layout flavour
///
/// Boards flashed through a debug probe keep the second image slot in
/// external SPI flash; boards that install the bootloader through a
/// mass-storage (UF2) volume need a layout that preserves the factory
/// UF2 bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
pub enum LayoutVariant {
    /// Layout for debug-probe flashing with slot1 in external flash
    ExternalFlash,
    /// Layout for serial recovery / mass-storage bootloader installation
    SerialRecovery,
}

impl fmt::Display for LayoutVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExternalFlash => write!(f, "external-flash"),
            Self::SerialRecovery => write!(f, "serial-recovery"),
        }
    }
}

impl FromStr for LayoutVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "external-flash" => Ok(Self::ExternalFlash),
            "serial-recovery" => Ok(Self::SerialRecovery),
            _ => Err(Error::InvalidSetting {
                field: "layout",
                value: s.to_string(),
                valid: vec!["external-flash".into(), "serial-recovery".into()],
            }),
        }
    }
}

/// Per-build board options supplied by the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardArgs {
    /// Flash through `west flash` (debug probe) instead of the bootloader
    pub use_west: bool,
}

/// A controller that electrically conflicts with another peripheral
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Conflict {
    /// I2C controller id that triggers the conflict
    pub controller: String,
    /// Devicetree node to disable when the controller is used
    pub disables: String,
}

/// Hardware I2C capabilities of a board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cTable {
    /// Controller ids in registration order
    pub controllers: Vec<String>,
    /// Supported clock rates in Hz
    pub frequencies: Vec<u32>,
    /// Logical pin substituted for the "SDA" alias
    pub default_sda: String,
    /// Logical pin substituted for the "SCL" alias
    pub default_scl: String,
    /// Controllers that require another peripheral to be disabled
    pub conflicts: Vec<Conflict>,
}

/// The single SPI bus of a board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiTable {
    /// SPI controller id
    pub device: String,
    /// Default clock pin
    pub default_clk: String,
    /// Default MOSI pin
    pub default_mosi: String,
    /// Default MISO pin
    pub default_miso: String,
}

/// ADC capabilities of a board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdcTable {
    /// Analog peripheral id
    pub device: String,
    /// Supported voltage references
    pub references: Vec<AdcReference>,
    /// Supported gains
    pub gains: Vec<AdcGain>,
    /// Supported resolutions in bits
    pub resolutions: Vec<u8>,
}

/// Partition layout text for one variant
///
/// The text may contain [`crate::overlay::PARTITION_PLACEHOLDER`], which is
/// replaced with the code partition of the build stage at composition time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLayout {
    /// Variant this layout belongs to
    pub variant: LayoutVariant,
    /// Devicetree overlay text
    pub text: String,
}

/// Extra C code run before `setup()` when a component is configured
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct SetupHook {
    /// Component platform that triggers this hook
    pub component: String,
    /// C source defining `void board_setup()`
    pub code: String,
}

/// Build flags for the bootloader image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootloaderFlags {
    /// Flags used for every layout
    pub common: BuildFlags,
    /// Flags added only for a specific layout
    pub per_layout: Vec<(LayoutVariant, BuildFlags)>,
}

/// Immutable description of a board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardDescriptor {
    /// Board name (Zephyr board identifier)
    pub name: String,
    /// Alternative names
    pub aliases: Vec<String>,
    /// Human-readable description
    pub description: String,
    /// SoC family
    pub soc: Soc,
    /// Whether the board can run OpenThread
    pub openthread: bool,
    /// Logical pin name -> physical pin, in table order
    pub pins: Vec<(String, PhysicalPin)>,
    /// Logical analog pin name -> ADC channel, in table order
    pub analog: Vec<(String, u8)>,
    /// Hardware I2C table
    pub i2c: I2cTable,
    /// SPI bus
    pub spi: SpiTable,
    /// ADC
    pub adc: AdcTable,
    /// Application build flags contributed by the board
    pub kconfig: BuildFlags,
    /// Bootloader build flags
    pub bootloader: BootloaderFlags,
    /// Partition layouts
    pub layouts: Vec<PartitionLayout>,
    /// Layout used when nothing else selects one
    pub default_layout: LayoutVariant,
    /// Board setup hooks
    pub setup_hooks: Vec<SetupHook>,
    /// Upload plans
    pub uploads: Vec<UploadPlan>,
    /// Upload method used unless the user asks for `west`
    pub default_method: UploadMethod,
}

impl BoardDescriptor {
    /// Check if a name refers to this board (name or alias)
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }

    /// Get the partition layout text for a variant
    pub fn partition_layout(&self, variant: LayoutVariant) -> Result<&str> {
        self.layouts
            .iter()
            .find(|l| l.variant == variant)
            .map(|l| l.text.as_str())
            .ok_or_else(|| Error::UnsupportedLayout {
                board: self.name.clone(),
                variant,
                available: self.layout_variants(),
            })
    }

    /// Layout variants this board provides
    pub fn layout_variants(&self) -> Vec<LayoutVariant> {
        self.layouts.iter().map(|l| l.variant).collect()
    }

    /// Get the upload plan for a method
    pub fn upload_plan(&self, method: UploadMethod) -> Result<&UploadPlan> {
        self.uploads
            .iter()
            .find(|u| u.method == method)
            .ok_or_else(|| Error::UnsupportedUploadMethod {
                board: self.name.clone(),
                method,
                available: self.upload_methods(),
            })
    }

    /// Upload methods this board provides
    pub fn upload_methods(&self) -> Vec<UploadMethod> {
        self.uploads.iter().map(|u| u.method).collect()
    }

    /// Pick the upload method for the given board options
    pub fn select_method(&self, args: &BoardArgs) -> UploadMethod {
        if args.use_west {
            UploadMethod::DebugProbe
        } else {
            self.default_method
        }
    }

    /// Pick the partition layout for the given board options
    ///
    /// The layout must match what the bootloader of the selected upload plan
    /// expects; boards without a plan for the method use their default.
    pub fn select_layout(&self, args: &BoardArgs) -> LayoutVariant {
        self.upload_plan(self.select_method(args))
            .map(|plan| plan.layout)
            .unwrap_or(self.default_layout)
    }

    /// Bootloader build flags for a layout variant
    pub fn bootloader_flags(&self, variant: LayoutVariant) -> BuildFlags {
        let mut flags = self.bootloader.common.clone();
        for (v, extra) in &self.bootloader.per_layout {
            if *v == variant {
                flags.extend(extra);
            }
        }
        flags
    }

    /// Find the setup hook for the configured components, if any
    pub fn setup_hook<S: AsRef<str>>(&self, components: &[S]) -> Option<&SetupHook> {
        self.setup_hooks.iter().find(|hook| {
            components
                .iter()
                .any(|c| c.as_ref().eq_ignore_ascii_case(&hook.component))
        })
    }
}

impl fmt::Display for BoardDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
