//! CLI command implementations
//!
//! - `boards` lists boards, pin tables and bootloader arguments
//! - `generate` resolves request files and writes the build files
//! - `upload` drives the two-stage upload with terminal progress and prompts

mod boards;
pub mod generate;
pub mod upload;

pub use boards::{bootloader_args, list_boards, show_pins};
