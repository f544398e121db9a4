//! Allocation session
//!
//! One session per board build. It owns the mutable state of the build: the
//! hardware controller claim set, the overlay fragment list and the build
//! flags. Requests are processed one at a time, in declaration order.
//!
//! Every request is fully validated before the session is touched, so a
//! failing request leaves claim set, fragments and flags exactly as they
//! were.

use crate::board::{BoardDescriptor, LayoutVariant};
use crate::error::{Error, Result};
use crate::kconfig::BuildFlags;
use crate::overlay::{BuildStage, FragmentList, OverlayComposer, EMULATED_I2C_PREFIX};
use crate::peripheral::{
    AdcAllocation, AdcRequest, Allocation, BusKind, I2cAllocation, I2cRequest, PeripheralRequest,
    PinAssignment, SpiAllocation, SpiRequest, SCL_ALIAS, SDA_ALIAS,
};
use crate::pins::PinResolver;
use crate::registry::ClaimSet;

/// Build flag enabling the bit-banged I2C driver
pub const I2C_GPIO_FLAG: &str = "CONFIG_I2C_GPIO";

/// Mutable state of one board build
#[derive(Debug, Clone)]
pub struct AllocationSession<'a> {
    board: &'a BoardDescriptor,
    claims: ClaimSet,
    fragments: FragmentList,
    flags: BuildFlags,
    allocations: Vec<Allocation>,
    emulated_buses: usize,
}

impl<'a> AllocationSession<'a> {
    /// Start a session for a board
    pub fn new(board: &'a BoardDescriptor) -> Self {
        Self {
            board,
            claims: ClaimSet::from_controllers(board.i2c.controllers.iter().cloned()),
            fragments: FragmentList::new(),
            flags: board.kconfig.clone(),
            allocations: Vec::new(),
            emulated_buses: 0,
        }
    }

    /// Board of this session
    pub fn board(&self) -> &'a BoardDescriptor {
        self.board
    }

    /// Controllers claimed so far, in claim order
    pub fn claimed(&self) -> &[String] {
        self.claims.claimed()
    }

    /// Controllers still available for hardware allocation
    pub fn available(&self) -> &[String] {
        self.claims.unclaimed()
    }

    /// Accumulated overlay fragments
    pub fn fragments(&self) -> &FragmentList {
        &self.fragments
    }

    /// Application build flags (board flags plus flags added by allocations)
    pub fn build_flags(&self) -> &BuildFlags {
        &self.flags
    }

    /// Allocations made so far, in request order
    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    /// Compose the overlay for a build stage
    pub fn compose_final(&self, variant: LayoutVariant, stage: BuildStage) -> Result<String> {
        OverlayComposer::new(self.board).compose_final(self, variant, stage)
    }

    /// Allocate a batch of requests in order, stopping at the first error
    pub fn allocate_all<'r, I>(&mut self, requests: I) -> Result<Vec<Allocation>>
    where
        I: IntoIterator<Item = &'r PeripheralRequest>,
    {
        requests.into_iter().map(|r| self.allocate(r)).collect()
    }

    /// Resolve one request into an allocation
    pub fn allocate(&mut self, request: &PeripheralRequest) -> Result<Allocation> {
        match request {
            PeripheralRequest::I2c(req) => self.allocate_i2c(req).map(Allocation::I2c),
            PeripheralRequest::Spi(req) => self.allocate_spi(req).map(Allocation::Spi),
            PeripheralRequest::Adc(req) => self.allocate_adc(req).map(Allocation::Adc),
        }
    }

    /// Allocate an I2C bus
    ///
    /// Hardware controllers are handed out in registration order. Once all
    /// are claimed, further buses are emulated on plain GPIOs.
    pub fn allocate_i2c(&mut self, req: &I2cRequest) -> Result<I2cAllocation> {
        let board = self.board;
        let sda_name = substitute(&req.sda, SDA_ALIAS, &board.i2c.default_sda);
        let scl_name = substitute(&req.scl, SCL_ALIAS, &board.i2c.default_scl);

        let (device, bus) = match &req.device {
            Some(device) if !self.claims.contains(device) => {
                return Err(Error::ControllerUnavailable {
                    board: board.name.clone(),
                    requested: device.clone(),
                    available: self.claims.unclaimed().to_vec(),
                });
            }
            Some(device) => (device.clone(), BusKind::Hardware),
            None => match self.claims.peek_next() {
                Some(device) => (device.to_string(), BusKind::Hardware),
                None => (
                    format!("{}{}", EMULATED_I2C_PREFIX, self.emulated_buses),
                    BusKind::Emulated,
                ),
            },
        };

        if bus == BusKind::Hardware && !board.i2c.frequencies.contains(&req.frequency) {
            return Err(Error::UnsupportedFrequency {
                board: board.name.clone(),
                frequency: req.frequency,
                supported: board.i2c.frequencies.clone(),
            });
        }

        let pins = PinResolver::new(board);
        let sda = assign(&pins, sda_name)?;
        let scl = assign(&pins, scl_name)?;

        let alloc = I2cAllocation {
            device,
            bus,
            frequency: req.frequency,
            sda,
            scl,
        };

        let composer = OverlayComposer::new(board);
        match bus {
            BusKind::Hardware => {
                let claimed = self.claims.claim(&alloc.device);
                debug_assert!(claimed, "{} was checked as unclaimed", alloc.device);
                for conflict in board.i2c.conflicts.iter().filter(|c| c.controller == alloc.device) {
                    log::warn!(
                        "{} cannot be used together with {} on {}, disabling {}",
                        conflict.controller,
                        conflict.disables,
                        board.name,
                        conflict.disables
                    );
                    self.fragments.push(composer.disable_fragment(&conflict.disables));
                }
            }
            BusKind::Emulated => {
                log::warn!(
                    "No hardware I2C controller left on {}, using emulated bus {}",
                    board.name,
                    alloc.device
                );
                self.emulated_buses += 1;
                self.flags.set(I2C_GPIO_FLAG, true);
            }
        }

        let allocation = Allocation::I2c(alloc.clone());
        self.fragments.push(composer.render(&allocation));
        self.allocations.push(allocation);
        log::debug!("Allocated I2C bus {} ({})", alloc.device, alloc.bus);
        Ok(alloc)
    }

    /// Allocate the board's SPI bus
    ///
    /// A board has a single SPI bus. Requesting it again with the same pins
    /// returns the existing allocation; different pins are a conflict.
    pub fn allocate_spi(&mut self, req: &SpiRequest) -> Result<SpiAllocation> {
        let board = self.board;
        let pins = PinResolver::new(board);
        let clk = assign(&pins, req.clk.as_deref().unwrap_or(&board.spi.default_clk))?;
        let mosi = assign(&pins, req.mosi.as_deref().unwrap_or(&board.spi.default_mosi))?;
        let miso = assign(&pins, req.miso.as_deref().unwrap_or(&board.spi.default_miso))?;

        let alloc = SpiAllocation {
            device: board.spi.device.clone(),
            clk,
            mosi,
            miso,
        };

        let existing = self.allocations.iter().find_map(|a| match a {
            Allocation::Spi(spi) => Some(spi),
            _ => None,
        });
        if let Some(existing) = existing {
            if existing.clk.pin == alloc.clk.pin
                && existing.mosi.pin == alloc.mosi.pin
                && existing.miso.pin == alloc.miso.pin
            {
                log::debug!("SPI bus {} already configured, reusing it", existing.device);
                return Ok(existing.clone());
            }
            return Err(Error::SpiBusConflict {
                board: board.name.clone(),
                device: existing.device.clone(),
                clk: existing.clk.name.clone(),
                mosi: existing.mosi.name.clone(),
                miso: existing.miso.name.clone(),
            });
        }

        let allocation = Allocation::Spi(alloc.clone());
        self.fragments
            .push(OverlayComposer::new(board).render(&allocation));
        self.allocations.push(allocation);
        log::debug!("Allocated SPI bus {}", alloc.device);
        Ok(alloc)
    }

    /// Allocate an ADC channel
    pub fn allocate_adc(&mut self, req: &AdcRequest) -> Result<AdcAllocation> {
        let board = self.board;
        let adc = &board.adc;

        if !adc.references.contains(&req.reference) {
            return Err(Error::UnsupportedReference {
                board: board.name.clone(),
                reference: req.reference,
                supported: adc.references.clone(),
            });
        }
        if !adc.gains.contains(&req.gain) {
            return Err(Error::UnsupportedGain {
                board: board.name.clone(),
                gain: req.gain,
                supported: adc.gains.clone(),
            });
        }
        if !adc.resolutions.contains(&req.resolution) {
            return Err(Error::UnsupportedResolution {
                board: board.name.clone(),
                resolution: req.resolution,
                supported: adc.resolutions.clone(),
            });
        }

        let channel = PinResolver::new(board).resolve_analog(&req.pin)?;
        let alloc = AdcAllocation {
            device: adc.device.clone(),
            pin: req.pin.clone(),
            channel,
            reference: req.reference,
            gain: req.gain,
            resolution: req.resolution,
        };

        let allocation = Allocation::Adc(alloc.clone());
        self.fragments
            .push(OverlayComposer::new(board).render(&allocation));
        self.allocations.push(allocation);
        log::debug!("Allocated ADC channel {} for {}", alloc.channel, alloc.pin);
        Ok(alloc)
    }
}

/// Replace a bus-agnostic alias with the board default
fn substitute<'s>(name: &'s str, alias: &str, default: &'s str) -> &'s str {
    if name == alias {
        default
    } else {
        name
    }
}

fn assign(pins: &PinResolver<'_>, name: &str) -> Result<PinAssignment> {
    let pin = pins.resolve(name)?;
    Ok(PinAssignment {
        name: name.to_string(),
        pin: pin.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardDatabase, PhysicalPin};
    use crate::kconfig::KconfigValue;
    use crate::peripheral::{AdcGain, AdcReference};

    fn i2c(frequency: u32) -> PeripheralRequest {
        PeripheralRequest::I2c(I2cRequest {
            frequency,
            ..Default::default()
        })
    }

    fn i2c_on(device: &str) -> PeripheralRequest {
        PeripheralRequest::I2c(I2cRequest {
            device: Some(device.to_string()),
            ..Default::default()
        })
    }

    fn device_of(alloc: &Allocation) -> (String, BusKind) {
        match alloc {
            Allocation::I2c(a) => (a.device.clone(), a.bus),
            other => panic!("not an I2C allocation: {:?}", other),
        }
    }

    #[test]
    fn test_hardware_then_emulated() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();
        assert_eq!(board.i2c.controllers.len(), 2);
        let mut session = AllocationSession::new(board);

        let first = session.allocate(&i2c(400_000)).unwrap();
        let second = session.allocate(&i2c(400_000)).unwrap();
        let flags_before = session.build_flags().len();
        let third = session.allocate(&i2c(400_000)).unwrap();

        assert_eq!(device_of(&first), ("i2c0".to_string(), BusKind::Hardware));
        assert_eq!(device_of(&second), ("i2c1".to_string(), BusKind::Hardware));
        assert_eq!(device_of(&third), ("gpioi2c0".to_string(), BusKind::Emulated));

        assert_eq!(session.claimed(), ["i2c0", "i2c1"]);
        assert!(session.available().is_empty());
        assert_eq!(session.build_flags().len(), flags_before + 1);
        assert_eq!(
            session.build_flags().get(I2C_GPIO_FLAG),
            Some(&KconfigValue::Bool(true))
        );
    }

    #[test]
    fn test_emulated_buses_get_distinct_ids_and_one_flag() {
        let db = BoardDatabase::builtin();
        let board = db.get("adafruit_feather_nrf52840").unwrap();
        let mut session = AllocationSession::new(board);

        session.allocate(&i2c(100_000)).unwrap();
        let a = session.allocate(&i2c(100_000)).unwrap();
        let flags = session.build_flags().len();
        let b = session.allocate(&i2c(100_000)).unwrap();

        assert_eq!(device_of(&a).0, "gpioi2c0");
        assert_eq!(device_of(&b).0, "gpioi2c1");
        assert_eq!(session.build_flags().len(), flags);

        let text: Vec<_> = session.fragments().iter().collect();
        assert!(text[1].contains("gpioi2c0: gpio_i2c_0 {"));
        assert!(text[1].contains("sda-gpios = <&gpio0 12 (GPIO_OPEN_DRAIN)>;"));
        assert!(text[2].contains("label = \"GPIOI2C_1\";"));
    }

    #[test]
    fn test_emulated_bus_skips_frequency_check() {
        let db = BoardDatabase::builtin();
        let board = db.get("adafruit_feather_nrf52840").unwrap();
        let mut session = AllocationSession::new(board);
        session.allocate(&i2c(100_000)).unwrap();

        let alloc = session.allocate(&i2c(50_000)).unwrap();
        assert_eq!(device_of(&alloc).1, BusKind::Emulated);
    }

    #[test]
    fn test_explicit_controller() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();
        let mut session = AllocationSession::new(board);

        let alloc = session.allocate(&i2c_on("i2c1")).unwrap();
        assert_eq!(device_of(&alloc).0, "i2c1");
        assert_eq!(session.available(), ["i2c0"]);

        // No SPI0 conflict for i2c1
        assert_eq!(session.fragments().len(), 1);
    }

    #[test]
    fn test_unavailable_controller_always_fails() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();

        let mut session = AllocationSession::new(board);
        let err = session.allocate(&i2c_on("i2c7")).unwrap_err();
        assert_eq!(
            err,
            Error::ControllerUnavailable {
                board: "xiao_ble".into(),
                requested: "i2c7".into(),
                available: vec!["i2c0".into(), "i2c1".into()],
            }
        );

        session.allocate(&i2c_on("i2c0")).unwrap();
        assert!(matches!(
            session.allocate(&i2c_on("i2c0")),
            Err(Error::ControllerUnavailable { .. })
        ));

        session.allocate(&i2c(100_000)).unwrap();
        assert!(session.available().is_empty());
        assert!(matches!(
            session.allocate(&i2c_on("i2c1")),
            Err(Error::ControllerUnavailable { .. })
        ));
    }

    #[test]
    fn test_frequency_validation() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();

        for ok in [100_000, 400_000] {
            let mut session = AllocationSession::new(board);
            assert!(session.allocate(&i2c(ok)).is_ok());
        }
        for bad in [100_001, 99_999, 1_000_000, 0] {
            let mut session = AllocationSession::new(board);
            let err = session.allocate(&i2c(bad)).unwrap_err();
            assert!(matches!(err, Error::UnsupportedFrequency { frequency, .. } if frequency == bad));
            assert_eq!(session.available(), ["i2c0", "i2c1"]);
            assert!(session.fragments().is_empty());
        }
    }

    #[test]
    fn test_conflict_fragment_precedes_controller() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();
        let mut session = AllocationSession::new(board);
        session.allocate(&i2c(100_000)).unwrap();

        let fragments: Vec<_> = session.fragments().iter().collect();
        assert_eq!(fragments.len(), 2);
        assert!(fragments[0].starts_with("&spi0 {"));
        assert!(fragments[1].starts_with("&i2c0 {"));
    }

    #[test]
    fn test_unknown_pin_leaves_session_untouched() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();
        let mut session = AllocationSession::new(board);

        let req = PeripheralRequest::I2c(I2cRequest {
            sda: "D42".into(),
            ..Default::default()
        });
        assert!(matches!(session.allocate(&req), Err(Error::UnknownPin { .. })));
        assert_eq!(session.available(), ["i2c0", "i2c1"]);
        assert!(session.fragments().is_empty());
        assert!(session.allocations().is_empty());
    }

    #[test]
    fn test_i2c_alias_substitution() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();
        let mut session = AllocationSession::new(board);

        match session.allocate(&i2c(100_000)).unwrap() {
            Allocation::I2c(a) => {
                assert_eq!(a.sda.name, "D4");
                assert_eq!(a.sda.pin, PhysicalPin::new("gpio0", 4));
                assert_eq!(a.scl.name, "D5");
            }
            other => panic!("unexpected allocation: {:?}", other),
        }
    }

    #[test]
    fn test_spi_defaults_and_overrides() {
        let db = BoardDatabase::builtin();
        let board = db.get("adafruit_feather_nrf52840").unwrap();
        let mut session = AllocationSession::new(board);

        let alloc = session
            .allocate_spi(&SpiRequest {
                miso: Some("D12".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(alloc.device, "spi1");
        assert_eq!(alloc.clk.name, "D26");
        assert_eq!(alloc.mosi.name, "D25");
        assert_eq!(alloc.miso.pin, PhysicalPin::new("gpio0", 8));
    }

    #[test]
    fn test_spi_single_bus() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();
        let mut session = AllocationSession::new(board);

        let first = session.allocate_spi(&SpiRequest::default()).unwrap();
        let again = session.allocate_spi(&SpiRequest::default()).unwrap();
        assert_eq!(first, again);
        assert_eq!(session.fragments().len(), 1);
        assert_eq!(session.allocations().len(), 1);

        let err = session
            .allocate_spi(&SpiRequest {
                clk: Some("D0".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::SpiBusConflict { .. }));
        assert_eq!(session.fragments().len(), 1);
    }

    #[test]
    fn test_adc_allocation() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();
        let mut session = AllocationSession::new(board);

        let alloc = session
            .allocate_adc(&AdcRequest {
                gain: AdcGain::Gain1_6,
                resolution: 12,
                ..AdcRequest::new("A2")
            })
            .unwrap();
        assert_eq!(alloc.device, "adc");
        assert_eq!(alloc.channel, 4);

        let fragment = session.fragments().iter().last().unwrap();
        assert!(fragment.contains("channel@4 {"));
        assert!(fragment.contains("zephyr,gain = \"ADC_GAIN_1_6\";"));
        assert!(fragment.contains("zephyr,reference = \"ADC_REF_INTERNAL\";"));
        assert!(fragment.contains("zephyr,input-positive = <NRF_SAADC_AIN4>;"));
        assert!(fragment.contains("zephyr,resolution = <12>;"));
    }

    #[test]
    fn test_adc_rejects_before_pin_lookup() {
        let db = BoardDatabase::builtin();
        let board = db.get("xiao_ble").unwrap();
        let mut session = AllocationSession::new(board);

        // The pin does not exist either; the reference check must come first
        let err = session
            .allocate_adc(&AdcRequest {
                reference: AdcReference::Vdd1,
                ..AdcRequest::new("nope")
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedReference { .. }));

        let err = session
            .allocate_adc(&AdcRequest {
                gain: AdcGain::Gain128,
                ..AdcRequest::new("nope")
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedGain { .. }));

        let err = session
            .allocate_adc(&AdcRequest {
                resolution: 16,
                ..AdcRequest::new("nope")
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedResolution { .. }));

        assert!(session.fragments().is_empty());
        assert!(session.allocations().is_empty());
    }

    #[test]
    fn test_end_to_end_two_controllers() {
        let db = BoardDatabase::builtin();
        let board = db.get("nrf52840dk_nrf52840").unwrap();
        assert_eq!(board.i2c.controllers.len(), 2);
        let mut session = AllocationSession::new(board);
        let flags_before = session.build_flags().clone();

        let requests = [i2c(400_000), i2c(400_000), i2c(400_000)];
        let allocs = session.allocate_all(&requests).unwrap();

        let devices: Vec<_> = allocs.iter().map(device_of).collect();
        assert_eq!(devices[0].1, BusKind::Hardware);
        assert_eq!(devices[1].1, BusKind::Hardware);
        assert_ne!(devices[0].0, devices[1].0);
        assert_eq!(devices[2], ("gpioi2c0".to_string(), BusKind::Emulated));

        let added: Vec<_> = session
            .build_flags()
            .iter()
            .filter(|(k, _)| !flags_before.contains(k))
            .map(|(k, _)| k)
            .collect();
        assert_eq!(added, [I2C_GPIO_FLAG]);
    }
}
