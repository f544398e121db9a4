//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse an upload method name (`serial-dfu`, `mass-storage`, `debug-probe`)
fn parse_method(s: &str) -> Result<zboard_core::board::UploadMethod, String> {
    s.parse().map_err(|e: zboard_core::Error| e.to_string())
}

#[derive(Parser)]
#[command(name = "zboard")]
#[command(author, version, about = "Board resolution and two-stage flashing for Zephyr boards", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Additional board definitions (.ron file or directory of .ron files)
    /// The built-in boards are always available
    #[arg(long, global = true)]
    pub board_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List known boards
    ListBoards,

    /// Show the pin table of a board
    Pins {
        /// Board name or alias
        #[arg(short, long)]
        board: String,
    },

    /// Resolve a request file and print the allocations
    Resolve {
        /// Request file (TOML format)
        #[arg(short, long)]
        request: PathBuf,

        /// Override the board named in the request file
        #[arg(short, long)]
        board: Option<String>,
    },

    /// Generate overlays, KConfig fragments and the setup hook
    Generate {
        /// Request file (TOML format)
        #[arg(short, long)]
        request: PathBuf,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Print the CMake arguments of the bootloader build
    BootloaderArgs {
        /// Board name or alias
        #[arg(short, long)]
        board: String,

        /// Use the layout for flashing through a debug probe
        #[arg(long)]
        use_west: bool,
    },

    /// Upload bootloader and application to a device
    Upload {
        /// Board name or alias
        #[arg(short, long)]
        board: String,

        /// Bootloader build directory
        #[arg(long)]
        boot_dir: PathBuf,

        /// Application build directory
        #[arg(long)]
        app_dir: PathBuf,

        /// Bootloader progress marker file
        #[arg(long)]
        marker: PathBuf,

        /// Serial port of the device (prompted for if needed and not given)
        #[arg(short, long)]
        port: Option<String>,

        /// Flash through a debug probe with west
        #[arg(long, conflicts_with = "method")]
        use_west: bool,

        /// Upload method [serial-dfu, mass-storage, debug-probe]
        #[arg(short, long, value_parser = parse_method)]
        method: Option<zboard_core::board::UploadMethod>,

        /// Extra arguments for the flash tool (spliced into {extra_args})
        #[arg(long, allow_hyphen_values = true, value_delimiter = ' ')]
        flash_args: Vec<String>,

        /// Override the reboot delay of the board in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Volume to copy UF2 images to, instead of asking
        #[arg(long)]
        mount: Option<PathBuf>,

        /// Serial port to use after the bootloader reboot, instead of asking
        #[arg(long)]
        new_port: Option<String>,
    },
}
