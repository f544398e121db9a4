//! Upload plan tables
//!
//! An upload plan describes, as data, how a board's bootloader and
//! application images reach the device: which external tools run with which
//! argument templates, whether the bootloader is dropped onto a mass-storage
//! volume, how long the device needs to reboot, and whether the serial
//! endpoint has to be chosen again afterwards. The orchestration itself lives
//! in the `zboard-flash` crate.
//!
//! Arguments are templates. `{build_dir}`, `{port}` and `{image}` are
//! substituted inside an argument; an argument that is exactly
//! `{extra_args}` expands to the operator's extra flash arguments.

use core::fmt;
use core::time::Duration;
use std::str::FromStr;

use super::LayoutVariant;
use crate::error::{Error, Result};

/// Placeholders accepted inside an argument template
pub const PLACEHOLDERS: &[&str] = &["build_dir", "port", "image"];

/// Whole-argument token expanding to the operator's extra arguments
pub const EXTRA_ARGS: &str = "{extra_args}";

/// Extract placeholder names (`{name}`) from an argument template
pub fn placeholders(arg: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = arg;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

/// How the images reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
pub enum UploadMethod {
    /// Bootloader packaged and sent over the serial DFU protocol
    SerialDfu,
    /// Bootloader dropped onto the factory UF2 mass-storage volume
    MassStorage,
    /// Both images flashed locally through a debug probe (`west flash`)
    DebugProbe,
}

impl UploadMethod {
    /// All methods, in display order
    pub const ALL: [UploadMethod; 3] = [Self::SerialDfu, Self::MassStorage, Self::DebugProbe];
}

impl fmt::Display for UploadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerialDfu => write!(f, "serial-dfu"),
            Self::MassStorage => write!(f, "mass-storage"),
            Self::DebugProbe => write!(f, "debug-probe"),
        }
    }
}

impl FromStr for UploadMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        UploadMethod::ALL
            .into_iter()
            .find(|m| m.to_string() == s)
            .ok_or_else(|| Error::InvalidSetting {
                field: "upload method",
                value: s.to_string(),
                valid: UploadMethod::ALL.iter().map(|m| m.to_string()).collect(),
            })
    }
}

/// One action within an upload stage
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub enum Step {
    /// Run an external tool; success is a zero exit code
    Run {
        /// Program name, looked up on `PATH`
        tool: String,
        /// Argument templates
        args: Vec<String>,
        /// Operator hint appended to the failure message
        #[serde(default)]
        hint: Option<String>,
    },
    /// Copy the stage image onto a volume chosen by the operator
    ///
    /// The device reboots as soon as it has the image, so copy errors are
    /// expected and ignored.
    CopyToVolume {
        /// File name on the volume
        dest: String,
    },
}

impl Step {
    /// Tool run by this step, if any
    pub fn tool(&self) -> Option<&str> {
        match self {
            Self::Run { tool, .. } => Some(tool),
            Self::CopyToVolume { .. } => None,
        }
    }

    /// Argument templates of this step
    pub fn args(&self) -> &[String] {
        match self {
            Self::Run { args, .. } => args,
            Self::CopyToVolume { .. } => &[],
        }
    }
}

/// Steps for one image (bootloader or application)
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct StagePlan {
    /// Image path relative to the stage's build directory
    pub image: String,
    /// Steps, run in order
    pub steps: Vec<Step>,
}

fn default_reboot_delay_ms() -> u64 {
    2000
}

/// Complete upload recipe for one method
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct UploadPlan {
    /// Method implemented by this plan
    pub method: UploadMethod,
    /// Partition layout the bootloader of this plan expects
    pub layout: LayoutVariant,
    /// Time the device needs to reboot into the new bootloader
    #[serde(default = "default_reboot_delay_ms")]
    pub reboot_delay_ms: u64,
    /// Whether the operator must choose the serial endpoint again after
    /// the bootloader has been installed
    #[serde(default)]
    pub reselect_port: bool,
    /// Bootloader stage
    pub bootloader: StagePlan,
    /// Application stage
    pub application: StagePlan,
    /// Optional reset after the application upload
    #[serde(default)]
    pub reset: Option<Step>,
}

impl UploadPlan {
    /// Re-enumeration delay
    pub fn reboot_delay(&self) -> Duration {
        Duration::from_millis(self.reboot_delay_ms)
    }

    /// Every step of the plan, in execution order
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.bootloader
            .steps
            .iter()
            .chain(self.application.steps.iter())
            .chain(self.reset.iter())
    }

    /// External tools this plan needs, deduplicated, in first-use order
    pub fn tools(&self) -> Vec<&str> {
        let mut tools: Vec<&str> = Vec::new();
        for tool in self.steps().filter_map(Step::tool) {
            if !tools.contains(&tool) {
                tools.push(tool);
            }
        }
        tools
    }

    /// Check that every argument template only uses known placeholders
    pub fn validate_templates(&self) -> core::result::Result<(), String> {
        for arg in self.steps().flat_map(Step::args) {
            if arg == EXTRA_ARGS {
                continue;
            }
            for name in placeholders(arg) {
                if !PLACEHOLDERS.contains(&name) {
                    return Err(format!(
                        "unknown placeholder '{{{}}}' in argument '{}' (known: {})",
                        name,
                        arg,
                        PLACEHOLDERS.join(", ")
                    ));
                }
            }
        }
        Ok(())
    }
}
