//! Request resolution and build file emission

use std::fs;
use std::path::Path;

use zboard_core::board::{BoardDatabase, LayoutVariant};
use zboard_core::overlay::{BuildStage, OverlayComposer};
use zboard_core::request::RequestFile;
use zboard_core::session::AllocationSession;

/// Application devicetree overlay
pub const APP_OVERLAY: &str = "app.overlay";
/// Bootloader devicetree overlay
pub const BOOT_OVERLAY: &str = "boot.overlay";
/// Application KConfig fragment
pub const BOARD_CONF: &str = "board.conf";
/// Bootloader CMake arguments, one per line
pub const BOOTLOADER_ARGS: &str = "bootloader.args";
/// Board setup hook
pub const BOARD_SETUP: &str = "board_setup.c";

/// Everything emitted for one request file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    /// Board the files were generated for
    pub board: String,
    /// Partition layout used
    pub layout: LayoutVariant,
    /// Application overlay
    pub app_overlay: String,
    /// Bootloader overlay
    pub boot_overlay: String,
    /// Application KConfig fragment
    pub board_conf: String,
    /// Bootloader CMake arguments
    pub bootloader_args: Vec<String>,
    /// `board_setup()` source
    pub board_setup: String,
}

/// Resolve a request against the database and render every build file
///
/// All requests are allocated before anything is rendered, so an invalid
/// request never produces partial output.
pub fn build(
    db: &BoardDatabase,
    request: &RequestFile,
    board_override: Option<&str>,
) -> Result<Generated, Box<dyn std::error::Error>> {
    let board = db.get(board_override.unwrap_or(&request.board.name))?;
    log::info!("Resolving {} peripheral(s) for {}", request.requests().len(), board.name);

    let mut session = AllocationSession::new(board);
    session.allocate_all(request.requests())?;

    let layout = board.select_layout(&request.board_args());
    let composer = OverlayComposer::new(board);
    Ok(Generated {
        board: board.name.clone(),
        layout,
        app_overlay: session.compose_final(layout, BuildStage::Application)?,
        boot_overlay: session.compose_final(layout, BuildStage::Bootloader)?,
        board_conf: session.build_flags().render_conf(),
        bootloader_args: composer.bootloader_args(layout),
        board_setup: composer.board_setup(&request.board.components),
    })
}

/// Print the allocations of a request file
pub fn resolve(
    db: &BoardDatabase,
    request_path: &Path,
    board_override: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = RequestFile::from_toml_file(request_path)?;
    let board = db.get(board_override.unwrap_or(&request.board.name))?;

    let mut session = AllocationSession::new(board);
    let allocations = session.allocate_all(request.requests())?;

    println!("Board: {} ({})", board.name, board.description);
    println!();
    for allocation in &allocations {
        println!("  {}", allocation);
    }
    println!();
    println!("Claimed I2C controllers: {}", controller_list(session.claimed()));
    println!("Free I2C controllers:    {}", controller_list(session.available()));
    Ok(())
}

fn controller_list(controllers: &[String]) -> String {
    if controllers.is_empty() {
        "none".to_string()
    } else {
        controllers.join(", ")
    }
}

/// Write every build file for a request into `out`
pub fn generate(
    db: &BoardDatabase,
    request_path: &Path,
    out: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = RequestFile::from_toml_file(request_path)?;
    let generated = build(db, &request, None)?;
    write_files(&generated, out)?;
    println!(
        "Generated build files for {} ({} layout) in {}",
        generated.board,
        generated.layout,
        out.display()
    );
    Ok(())
}

/// Write generated files into a directory
pub fn write_files(generated: &Generated, out: &Path) -> std::io::Result<()> {
    fs::create_dir_all(out)?;

    let mut args = generated.bootloader_args.join("\n");
    if !args.is_empty() {
        args.push('\n');
    }

    let files = [
        (APP_OVERLAY, generated.app_overlay.as_str()),
        (BOOT_OVERLAY, generated.boot_overlay.as_str()),
        (BOARD_CONF, generated.board_conf.as_str()),
        (BOOTLOADER_ARGS, args.as_str()),
        (BOARD_SETUP, generated.board_setup.as_str()),
    ];
    for (name, content) in files {
        let path = out.join(name);
        fs::write(&path, content)?;
        log::debug!("Wrote {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = r#"
[board]
name = "xiao_ble"
components = ["lsm6ds3"]

[[peripheral]]
kind = "i2c"
frequency = "400kHz"

[[peripheral]]
kind = "adc"
pin = "A0"
"#;

    #[test]
    fn test_build_xiao() {
        let db = BoardDatabase::builtin();
        let request = RequestFile::from_toml_str(REQUEST).unwrap();
        let generated = build(&db, &request, None).unwrap();

        assert_eq!(generated.board, "xiao_ble");
        assert_eq!(generated.layout, LayoutVariant::SerialRecovery);
        assert!(generated.app_overlay.contains("&i2c0 {"));
        assert!(generated
            .app_overlay
            .contains("zephyr,code-partition = &slot0_partition;"));
        assert!(generated
            .boot_overlay
            .contains("zephyr,code-partition = &boot_partition;"));
        assert!(!generated.app_overlay.contains("CODE_PARTITION"));
        assert!(generated.board_setup.contains("board_setup"));
        assert!(!generated.bootloader_args.is_empty());
    }

    #[test]
    fn test_invalid_request_writes_nothing() {
        let db = BoardDatabase::builtin();
        let request = RequestFile::from_toml_str(
            r#"
[board]
name = "xiao_ble"

[[peripheral]]
kind = "i2c"
sda = "D42"
"#,
        )
        .unwrap();
        let err = build(&db, &request, None).unwrap_err();
        assert!(err.to_string().contains("D42"));
    }

    #[test]
    fn test_controller_list() {
        assert_eq!(controller_list(&[]), "none");
        assert_eq!(
            controller_list(&["i2c0".to_string(), "i2c1".to_string()]),
            "i2c0, i2c1"
        );
    }

    #[test]
    fn test_write_files() {
        let db = BoardDatabase::builtin();
        let request = RequestFile::from_toml_str(REQUEST).unwrap();
        let generated = build(&db, &request, None).unwrap();

        let out = std::env::temp_dir()
            .join(format!("zboard-{}", std::process::id()))
            .join("generate");
        let _ = fs::remove_dir_all(&out);
        write_files(&generated, &out).unwrap();

        for name in [APP_OVERLAY, BOOT_OVERLAY, BOARD_CONF, BOOTLOADER_ARGS, BOARD_SETUP] {
            assert!(out.join(name).is_file(), "{} missing", name);
        }
        let args = fs::read_to_string(out.join(BOOTLOADER_ARGS)).unwrap();
        assert_eq!(args.lines().count(), generated.bootloader_args.len());
    }
}
