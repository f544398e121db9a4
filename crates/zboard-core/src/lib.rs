//! zboard-core - Board abstraction for Zephyr firmware builds
//!
//! This crate turns portable peripheral requests ("use pin D4 as I2C SDA")
//! into concrete controller/pin assignments for a specific board, and renders
//! those assignments into devicetree overlay fragments and KConfig build
//! flags. It never touches the build tree or spawns processes; emission and
//! flashing live in the `zboard` CLI and the `zboard-flash` crate.
//!
//! # Data flow
//!
//! ```text
//! BoardDescriptor ─► PinResolver ─► AllocationSession ─► FragmentList ─► compose_final
//!                                   (claim set, build flags)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use zboard_core::board::BoardDatabase;
//! use zboard_core::peripheral::{I2cRequest, PeripheralRequest};
//! use zboard_core::session::AllocationSession;
//! use zboard_core::overlay::BuildStage;
//!
//! let db = BoardDatabase::builtin();
//! let board = db.get("xiao_ble")?;
//! let mut session = AllocationSession::new(board);
//! session.allocate(&PeripheralRequest::I2c(I2cRequest::default()))?;
//! let overlay = session.compose_final(board.default_layout, BuildStage::Application)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod board;
pub mod error;
pub mod kconfig;
pub mod overlay;
pub mod peripheral;
pub mod pins;
pub mod registry;
pub mod request;
pub mod session;

pub use error::{Error, Result};
