//! zboard-flash - Two-stage firmware upload for zboard boards
//!
//! Uploads an MCUboot bootloader and then a signed application image to a
//! device, using the upload plan of a board from `zboard-core`. The work is
//! done by external tools (`nrfutil`, `mcumgr`, `west`) and, for boards with
//! a UF2 factory bootloader, by copying the image onto a mass-storage volume.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    FlashOrchestrator                       │
//! │   NotStarted → Bootloader → wait → Application → Reset     │
//! └──────┬───────────────┬───────────────┬──────────────┬──────┘
//!        │               │               │              │
//! ┌──────▼─────┐ ┌───────▼──────┐ ┌──────▼─────┐ ┌──────▼───────┐
//! │ ToolRunner │ │  TargetHost  │ │   Prompt   │ │ProgressMarker│
//! │ (PATH,     │ │ (volumes,    │ │ (operator  │ │ (empty file) │
//! │  Command)  │ │  ports,sleep)│ │  choices)  │ │              │
//! └────────────┘ └──────────────┘ └────────────┘ └──────────────┘
//! ```
//!
//! The bootloader stage is skipped when the progress marker exists, so an
//! upload that failed after the bootloader was installed can simply be run
//! again.
//!
//! # Example
//!
//! ```ignore
//! use zboard_core::board::{BoardDatabase, UploadMethod};
//! use zboard_flash::{FlashEnv, FlashOrchestrator, FlashPlan, UploadContext};
//! use zboard_flash::host::{NoProgress, SystemHost, SystemTools};
//!
//! let db = BoardDatabase::builtin();
//! let plan = FlashPlan::for_board(db.get("xiao_ble")?, UploadMethod::MassStorage)?;
//! let mut orch = FlashOrchestrator::new(plan, UploadContext {
//!     boot_build_dir: "mcuboot/build".into(),
//!     app_build_dir: "app/build".into(),
//!     marker: "build/bootloader_installed".into(),
//!     ..Default::default()
//! });
//! let report = orch.run(&mut FlashEnv {
//!     tools: &mut SystemTools,
//!     host: &mut SystemHost::new(),
//!     prompt: &mut my_prompt,
//!     progress: &mut NoProgress,
//! })?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod host;
pub mod marker;
pub mod orchestrator;
pub mod plan;
pub mod template;

pub use error::{Choice, FlashError, Result, Stage};
pub use marker::ProgressMarker;
pub use orchestrator::{
    BootloaderOutcome, FlashEnv, FlashOrchestrator, FlashReport, FlashState, ResetOutcome,
};
pub use plan::{FlashPlan, UploadContext};
