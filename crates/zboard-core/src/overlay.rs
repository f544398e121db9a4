//! Devicetree overlay composition
//!
//! Allocations are rendered into overlay fragments as they are made and kept
//! in an append-only [`FragmentList`]. The final overlay for a build stage is
//! the fragments in accumulation order followed by the board's partition
//! layout, with [`PARTITION_PLACEHOLDER`] replaced exactly once at the end.

use core::fmt;

use crate::board::{BoardDescriptor, LayoutVariant, PhysicalPin, Soc};
use crate::error::Result;
use crate::peripheral::{AdcAllocation, Allocation, BusKind, I2cAllocation, SpiAllocation};
use crate::session::AllocationSession;

/// Token in partition layouts standing for the code partition of a stage
pub const PARTITION_PLACEHOLDER: &str = "CODE_PARTITION";

/// Prefix of synthetic ids given to emulated I2C buses
pub const EMULATED_I2C_PREFIX: &str = "gpioi2c";

/// Image being built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStage {
    /// MCUboot image
    Bootloader,
    /// Application image
    Application,
}

impl BuildStage {
    /// Partition the image of this stage runs from
    pub fn code_partition(&self) -> &'static str {
        match self {
            Self::Bootloader => "boot_partition",
            Self::Application => "slot0_partition",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bootloader => write!(f, "bootloader"),
            Self::Application => write!(f, "application"),
        }
    }
}

/// Ordered, append-only list of overlay fragments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentList {
    fragments: Vec<String>,
}

impl FragmentList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment
    pub fn push(&mut self, fragment: String) {
        self.fragments.push(fragment);
    }

    /// Number of fragments
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Iterate over fragments in accumulation order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fragments.iter().map(String::as_str)
    }

    /// Concatenate all fragments, separated by newlines
    pub fn concat(&self) -> String {
        self.fragments.join("\n")
    }
}

/// Small helper for building indented devicetree text
struct Dts {
    out: String,
}

impl Dts {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn line(&mut self, depth: usize, text: &str) -> &mut Self {
        for _ in 0..depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
        self
    }

    fn finish(&mut self) -> String {
        core::mem::take(&mut self.out)
    }
}

/// Renders allocations and partition layouts for one board
#[derive(Debug, Clone, Copy)]
pub struct OverlayComposer<'a> {
    board: &'a BoardDescriptor,
}

impl<'a> OverlayComposer<'a> {
    /// Create a composer for a board
    pub fn new(board: &'a BoardDescriptor) -> Self {
        Self { board }
    }

    /// Render an allocation into an overlay fragment
    pub fn render(&self, allocation: &Allocation) -> String {
        match allocation {
            Allocation::I2c(a) => match a.bus {
                BusKind::Hardware => self.render_i2c(a),
                BusKind::Emulated => self.render_gpio_i2c(a),
            },
            Allocation::Spi(a) => self.render_spi(a),
            Allocation::Adc(a) => self.render_adc(a),
        }
    }

    /// Fragment disabling a devicetree node
    pub fn disable_fragment(&self, node: &str) -> String {
        Dts::new()
            .line(0, &format!("&{} {{", node))
            .line(1, "status = \"disabled\";")
            .line(0, "};")
            .finish()
    }

    /// Compose the complete overlay of a session for one build stage
    pub fn compose_final(
        &self,
        session: &AllocationSession<'_>,
        variant: LayoutVariant,
        stage: BuildStage,
    ) -> Result<String> {
        let layout = self.board.partition_layout(variant)?;
        let mut text = session.fragments().concat();
        if !text.is_empty() && !layout.is_empty() {
            text.push('\n');
        }
        text.push_str(layout);
        Ok(text.replace(PARTITION_PLACEHOLDER, stage.code_partition()))
    }

    /// CMake arguments for the bootloader build
    pub fn bootloader_args(&self, variant: LayoutVariant) -> Vec<String> {
        self.board.bootloader_flags(variant).cmake_args()
    }

    /// C source of the `board_setup()` hook for the configured components
    pub fn board_setup<S: AsRef<str>>(&self, components: &[S]) -> String {
        match self.board.setup_hook(components) {
            Some(hook) => {
                let mut code = hook.code.trim().to_string();
                code.push('\n');
                code
            }
            None => "void board_setup() {\n}\n".to_string(),
        }
    }

    fn render_i2c(&self, a: &I2cAllocation) -> String {
        let mut dts = Dts::new();
        dts.line(0, &format!("&{} {{", a.device))
            .line(1, &format!("clock-frequency = <{}>;", a.frequency));
        match self.board.soc {
            Soc::Nrf52840 => {
                dts.line(1, "compatible = \"nordic,nrf-twi\";");
            }
        }
        dts.line(1, "status = \"okay\";");
        self.pinctrl(
            &mut dts,
            &a.device,
            &[("TWIM_SDA", &a.sda.pin), ("TWIM_SCL", &a.scl.pin)],
        );
        dts.finish()
    }

    fn render_gpio_i2c(&self, a: &I2cAllocation) -> String {
        let index = a
            .device
            .strip_prefix(EMULATED_I2C_PREFIX)
            .unwrap_or(&a.device);
        Dts::new()
            .line(0, "/ {")
            .line(1, &format!("{}: gpio_i2c_{} {{", a.device, index))
            .line(2, "compatible = \"gpio-i2c\";")
            .line(2, "status = \"okay\";")
            .line(2, &format!("clock-frequency = <{}>;", a.frequency))
            .line(2, &format!("sda-gpios = <{} (GPIO_OPEN_DRAIN)>;", gpio_ref(&a.sda.pin)))
            .line(2, &format!("scl-gpios = <{} (GPIO_OPEN_DRAIN)>;", gpio_ref(&a.scl.pin)))
            .line(2, &format!("label = \"GPIOI2C_{}\";", index))
            .line(2, "#address-cells = <1>;")
            .line(2, "#size-cells = <0>;")
            .line(1, "};")
            .line(0, "};")
            .finish()
    }

    fn render_spi(&self, a: &SpiAllocation) -> String {
        let mut dts = Dts::new();
        dts.line(0, &format!("&{} {{", a.device));
        self.pinctrl(
            &mut dts,
            &a.device,
            &[
                ("SPIM_SCK", &a.clk.pin),
                ("SPIM_MOSI", &a.mosi.pin),
                ("SPIM_MISO", &a.miso.pin),
            ],
        );
        dts.finish()
    }

    fn render_adc(&self, a: &AdcAllocation) -> String {
        let mut dts = Dts::new();
        dts.line(0, &format!("&{} {{", a.device))
            .line(1, "#address-cells = <1>;")
            .line(1, "#size-cells = <0>;")
            .line(1, "status = \"okay\";")
            .line(1, &format!("channel@{} {{", a.channel))
            .line(2, &format!("reg = <{}>;", a.channel))
            .line(2, &format!("zephyr,gain = \"{}\";", a.gain.zephyr_name()))
            .line(2, &format!("zephyr,reference = \"{}\";", a.reference.zephyr_name()))
            .line(2, "zephyr,acquisition-time = <ADC_ACQ_TIME_DEFAULT>;");
        match self.board.soc {
            Soc::Nrf52840 => {
                dts.line(
                    2,
                    &format!("zephyr,input-positive = <NRF_SAADC_AIN{}>;", a.channel),
                );
            }
        }
        dts.line(2, &format!("zephyr,resolution = <{}>;", a.resolution))
            .line(1, "};")
            .line(0, "};")
            .finish()
    }

    /// Close the controller node with pin-control references and emit the
    /// default and sleep pin-control groups
    fn pinctrl(&self, dts: &mut Dts, device: &str, signals: &[(&str, &PhysicalPin)]) {
        dts.line(1, &format!("pinctrl-0 = <&{}_default_alt>;", device))
            .line(1, &format!("pinctrl-1 = <&{}_sleep_alt>;", device))
            .line(1, "pinctrl-names = \"default\", \"sleep\";")
            .line(0, "};")
            .line(0, "&pinctrl {");

        for (state, low_power) in [("default", false), ("sleep", true)] {
            dts.line(1, &format!("{d}_{s}_alt: {d}_{s}_alt {{", d = device, s = state))
                .line(2, "group1 {");
            for (i, (signal, pin)) in signals.iter().enumerate() {
                let psel = match self.board.soc {
                    Soc::Nrf52840 => {
                        format!("<NRF_PSEL({}, {}, {})>", signal, pin.port(), pin.index)
                    }
                };
                let lead = if i == 0 { "psels = " } else { "        " };
                let tail = if i + 1 == signals.len() { ";" } else { "," };
                dts.line(3, &format!("{}{}{}", lead, psel, tail));
            }
            if low_power {
                dts.line(3, "low-power-enable;");
            }
            dts.line(2, "};").line(1, "};");
        }
        dts.line(0, "};");
    }
}

/// GPIO phandle reference of a pin ("&gpio0 4")
fn gpio_ref(pin: &PhysicalPin) -> String {
    format!("&{} {}", pin.controller, pin.index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardDatabase;
    use crate::peripheral::{I2cRequest, PeripheralRequest, SpiRequest};

    #[test]
    fn test_render_hardware_i2c() {
        let db = BoardDatabase::builtin();
        let board = db.get("adafruit_feather_nrf52840").unwrap();
        let mut session = AllocationSession::new(board);
        let alloc = session
            .allocate(&PeripheralRequest::I2c(I2cRequest {
                frequency: 400_000,
                ..Default::default()
            }))
            .unwrap();

        let text = OverlayComposer::new(board).render(&alloc);
        assert!(text.starts_with("&i2c0 {\n    clock-frequency = <400000>;\n"));
        assert!(text.contains("compatible = \"nordic,nrf-twi\";"));
        assert!(text.contains("i2c0_default_alt: i2c0_default_alt {"));
        assert!(text.contains(
            "psels = <NRF_PSEL(TWIM_SDA, 0, 12)>,\n                    <NRF_PSEL(TWIM_SCL, 0, 11)>;"
        ));
        assert_eq!(text.matches("low-power-enable;").count(), 1);
    }

    #[test]
    fn test_render_spi_uses_ports() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();
        let mut session = AllocationSession::new(board);
        let alloc = session
            .allocate(&PeripheralRequest::Spi(SpiRequest::default()))
            .unwrap();

        let text = OverlayComposer::new(board).render(&alloc);
        assert!(text.starts_with("&spi1 {\n"));
        assert!(text.contains("<NRF_PSEL(SPIM_SCK, 1, 13)>,"));
        assert!(text.contains("<NRF_PSEL(SPIM_MOSI, 1, 15)>,"));
        assert!(text.contains("<NRF_PSEL(SPIM_MISO, 1, 14)>;"));
        assert!(!text.contains("status"));
    }

    #[test]
    fn test_disable_fragment() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();
        assert_eq!(
            OverlayComposer::new(board).disable_fragment("spi0"),
            "&spi0 {\n    status = \"disabled\";\n};\n"
        );
    }

    #[test]
    fn test_compose_substitutes_partition_per_stage() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();
        let session = AllocationSession::new(board);
        let composer = OverlayComposer::new(board);
        let variant = board.default_layout;

        let boot = composer
            .compose_final(&session, variant, BuildStage::Bootloader)
            .unwrap();
        let app = composer
            .compose_final(&session, variant, BuildStage::Application)
            .unwrap();

        assert!(boot.contains("zephyr,code-partition = &boot_partition;"));
        assert!(app.contains("zephyr,code-partition = &slot0_partition;"));
        assert!(!boot.contains(PARTITION_PLACEHOLDER));
        assert!(!app.contains(PARTITION_PLACEHOLDER));
    }

    #[test]
    fn test_compose_preserves_request_order() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();
        let mut session = AllocationSession::new(board);
        session
            .allocate(&PeripheralRequest::Spi(SpiRequest::default()))
            .unwrap();
        session
            .allocate(&PeripheralRequest::I2c(I2cRequest::default()))
            .unwrap();

        let text = OverlayComposer::new(board)
            .compose_final(&session, board.default_layout, BuildStage::Application)
            .unwrap();
        let spi = text.find("&spi1 {").unwrap();
        let disable = text.find("&spi0 {").unwrap();
        let i2c = text.find("&i2c0 {").unwrap();
        let layout = text.find("/delete-node/ &code_partition;").unwrap();
        assert!(spi < disable && disable < i2c && i2c < layout);
    }

    #[test]
    fn test_compose_empty_layout() {
        let db = BoardDatabase::builtin();
        let board = db.get("nrf52840dk_nrf52840").unwrap();
        let session = AllocationSession::new(board);
        let text = OverlayComposer::new(board)
            .compose_final(&session, board.default_layout, BuildStage::Application)
            .unwrap();
        assert_eq!(text, "");
    }

    #[test]
    fn test_board_setup_hook() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();
        let composer = OverlayComposer::new(board);

        assert_eq!(composer.board_setup::<&str>(&[]), "void board_setup() {\n}\n");
        let code = composer.board_setup(&["lsm6ds3"]);
        assert!(code.contains("nrf_gpio_pin_set(40);"));
    }

    #[test]
    fn test_bootloader_args_per_layout() {
        let db = BoardDatabase::builtin();
        let board = db.get("adafruit_feather_nrf52840").unwrap();
        let composer = OverlayComposer::new(board);

        let west = composer.bootloader_args(LayoutVariant::ExternalFlash);
        let uf2 = composer.bootloader_args(LayoutVariant::SerialRecovery);
        assert!(west.contains(&"-DCONFIG_MULTITHREADING=y".to_string()));
        assert!(!west.contains(&"-DCONFIG_BUILD_OUTPUT_UF2=y".to_string()));
        assert!(uf2.contains(&"-DCONFIG_BUILD_OUTPUT_UF2=y".to_string()));
        assert!(uf2.contains(&"-DCONFIG_BOOT_SERIAL_DETECT_PIN=33".to_string()));
    }
}
