//! zboard - board resolution and two-stage flashing for Zephyr boards
//!
//! # Architecture
//!
//! zboard turns a request file describing which peripherals a firmware needs
//! into the files a Zephyr build consumes, and uploads the resulting images:
//! - **zboard-core** - board database, pin resolution, peripheral allocation
//!   and overlay composition
//! - **zboard-flash** - the bootloader/application upload state machine and
//!   its system seams (external tools, volumes, serial ports)
//!
//! This binary wires both to the command line, writes the generated files and
//! provides terminal progress and operator prompts.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::upload::UploadArgs;
use zboard_core::board::BoardDatabase;
use zboard_flash::FlashError;

use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    // Load board database
    let db = match load_board_database(cli.board_db.as_deref()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to load board database: {}", e);
            std::process::exit(1);
        }
    };

    log::debug!("Loaded {} board definitions", db.len());

    let result = match cli.command {
        Commands::ListBoards => {
            commands::list_boards(&db);
            Ok(())
        }
        Commands::Pins { board } => commands::show_pins(&db, &board),
        Commands::Resolve { request, board } => {
            commands::generate::resolve(&db, &request, board.as_deref())
        }
        Commands::Generate { request, out } => commands::generate::generate(&db, &request, &out),
        Commands::BootloaderArgs { board, use_west } => {
            commands::bootloader_args(&db, &board, use_west)
        }
        Commands::Upload {
            board,
            boot_dir,
            app_dir,
            marker,
            port,
            use_west,
            method,
            flash_args,
            delay_ms,
            mount,
            new_port,
        } => commands::upload::run_upload(
            &db,
            UploadArgs {
                board,
                boot_dir,
                app_dir,
                marker,
                port,
                use_west,
                method,
                flash_args,
                delay_ms,
                mount,
                new_port,
            },
        ),
    };

    // A failing flash tool decides the exit code
    if let Err(e) = &result {
        if let Some(code) = e.downcast_ref::<FlashError>().and_then(FlashError::exit_code) {
            eprintln!("Error: {}", e);
            std::process::exit(code);
        }
    }

    result
}

/// Load the built-in boards plus any from the specified path
fn load_board_database(path: Option<&Path>) -> Result<BoardDatabase, Box<dyn std::error::Error>> {
    let mut db = BoardDatabase::builtin();

    if let Some(path) = path {
        let count = if path.is_dir() {
            db.load_dir(path)?
        } else if path.is_file() {
            db.load_file(path)?
        } else {
            return Err(format!("Board database path not found: {}", path.display()).into());
        };
        log::info!("Loaded {} board(s) from {}", count, path.display());
    }

    Ok(db)
}
