//! Board listing commands

use zboard_core::board::{BoardArgs, BoardDatabase, BoardDescriptor};
use zboard_core::overlay::OverlayComposer;
use zboard_core::pins::PinResolver;

/// List all known boards
pub fn list_boards(db: &BoardDatabase) {
    println!("Known boards:");
    println!();
    println!(
        "{:<28} {:<10} {:<26} {:<7} Description",
        "Name", "SoC", "Upload methods", "Thread"
    );
    println!("{}", "-".repeat(98));

    for board in db.iter() {
        println!("{}", board_row(board));
        if !board.aliases.is_empty() {
            println!("{:<28} aliases: {}", "", board.aliases.join(", "));
        }
    }
}

/// One line of the board listing
fn board_row(board: &BoardDescriptor) -> String {
    let methods: Vec<String> = board.upload_methods().iter().map(|m| m.to_string()).collect();
    format!(
        "{:<28} {:<10} {:<26} {:<7} {}",
        board.name,
        board.soc.to_string(),
        methods.join(","),
        if board.openthread { "yes" } else { "no" },
        board.description
    )
}

/// Print the digital and analog pin tables of a board
pub fn show_pins(db: &BoardDatabase, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let board = db.get(name)?;
    let resolver = PinResolver::new(board);

    println!("{} ({})", board.description, board.name);
    println!();
    println!("{:<10} {:<12} Analog", "Pin", "Physical");
    println!("{}", "-".repeat(32));
    for name in resolver.names() {
        let pin = resolver.resolve(name)?;
        let analog = match resolver.resolve_analog(name) {
            Ok(channel) => format!("AIN{}", channel),
            Err(_) => String::new(),
        };
        println!("{:<10} {:<12} {}", name, pin.to_string(), analog);
    }
    for name in resolver.analog_names() {
        if resolver.resolve(name).is_err() {
            let channel = resolver.resolve_analog(name)?;
            println!("{:<10} {:<12} AIN{}", name, "-", channel);
        }
    }

    println!();
    println!("I2C controllers: {}", board.i2c.controllers.join(", "));
    println!(
        "I2C defaults:    SDA={} SCL={}",
        board.i2c.default_sda, board.i2c.default_scl
    );
    println!(
        "SPI:             {} (clk={} mosi={} miso={})",
        board.spi.device, board.spi.default_clk, board.spi.default_mosi, board.spi.default_miso
    );
    Ok(())
}

/// Print the CMake arguments for the bootloader build, one per line
pub fn bootloader_args(
    db: &BoardDatabase,
    name: &str,
    use_west: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let board = db.get(name)?;
    let variant = board.select_layout(&BoardArgs { use_west });
    log::debug!("Using {} layout for {}", variant, board.name);
    for arg in OverlayComposer::new(board).bootloader_args(variant) {
        println!("{}", arg);
    }
    Ok(())
}
