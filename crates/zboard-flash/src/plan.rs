//! Flash plans
//!
//! A [`FlashPlan`] is the upload recipe of one board for one method, taken
//! from the board database. [`UploadContext`] holds what varies per upload:
//! build directories, the marker location, the serial port and extra
//! arguments from the operator.

use std::path::PathBuf;

use zboard_core::board::{BoardDescriptor, StagePlan, Step, UploadMethod, UploadPlan};

use crate::error::{Result, Stage};
use crate::template::uses_port;

/// Per-upload inputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadContext {
    /// Build directory of the bootloader (e.g. `mcuboot/build`)
    pub boot_build_dir: PathBuf,
    /// Build directory of the application (e.g. `app/build`)
    pub app_build_dir: PathBuf,
    /// Location of the bootloader progress marker
    pub marker: PathBuf,
    /// Serial port of the device, if already known
    pub port: Option<String>,
    /// Extra arguments spliced into `{extra_args}`
    pub extra_args: Vec<String>,
}

/// Upload recipe for one board and method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashPlan {
    board: String,
    plan: UploadPlan,
}

impl FlashPlan {
    /// Look up the plan of a board for an upload method
    pub fn for_board(board: &BoardDescriptor, method: UploadMethod) -> Result<Self> {
        let plan = board.upload_plan(method)?;
        Ok(Self {
            board: board.name.clone(),
            plan: plan.clone(),
        })
    }

    /// Replace the board's re-enumeration delay
    pub fn with_reboot_delay(mut self, delay_ms: u64) -> Self {
        self.plan.reboot_delay_ms = delay_ms;
        self
    }

    /// Board name
    pub fn board(&self) -> &str {
        &self.board
    }

    /// Upload method
    pub fn method(&self) -> UploadMethod {
        self.plan.method
    }

    /// Underlying upload table
    pub fn upload(&self) -> &UploadPlan {
        &self.plan
    }

    /// External tools needed by any stage, in first-use order
    pub fn tools(&self) -> Vec<&str> {
        self.plan.tools()
    }

    /// First stage that needs the serial port before any re-selection
    ///
    /// Plans that re-select the port after installing the bootloader only
    /// need it up front when a bootloader step uses it, or when the
    /// bootloader stage is skipped. `None` means the port can wait.
    pub fn port_needed_by(&self, bootloader_installed: bool, extra_args: &[String]) -> Option<Stage> {
        let stage_uses_port =
            |stage: &StagePlan| stage.steps.iter().any(|s| step_uses_port(s, extra_args));

        if !bootloader_installed {
            if stage_uses_port(&self.plan.bootloader) {
                return Some(Stage::Bootloader);
            }
            if self.plan.reselect_port {
                return None;
            }
        }
        if stage_uses_port(&self.plan.application) {
            Some(Stage::Application)
        } else if self
            .plan
            .reset
            .as_ref()
            .is_some_and(|s| step_uses_port(s, extra_args))
        {
            Some(Stage::Reset)
        } else {
            None
        }
    }
}

fn step_uses_port(step: &Step, extra_args: &[String]) -> bool {
    uses_port(step.args(), extra_args)
}
