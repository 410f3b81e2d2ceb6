//! Property-based tests for the memory protocol.
//!
//! Uses `proptest` to drive the controller against the simulated bus with
//! random addresses, page contents and control code strings.

use greenpak_flash::memory::{
	IMAGE_SIZE,
	PAGE_SIZE,
	PageState,
};
use greenpak_flash::transport::sim::{
	SimulatedBus,
	SimulatedDevice,
};
use greenpak_flash::{
	ControlCode,
	ControlCodeSpec,
	DeviceTable,
	Error,
	Greenpak,
	MemorySpace,
};
use proptest::prelude::*;

fn setup(model: &str) -> Greenpak<SimulatedBus> {
	let device = DeviceTable::builtin().lookup(model).unwrap().clone();
	let cc = ControlCode::new(1).unwrap();
	let bus = SimulatedBus::new().with_device(SimulatedDevice::new(&device, cc));
	Greenpak::new(bus, device, cc)
}

/// A register range `(start, data)` with `start + data.len() <= 256`.
fn register_range() -> impl Strategy<Value = (usize, Vec<u8>)> {
	(0..IMAGE_SIZE).prop_flat_map(|start| {
		(Just(start), prop::collection::vec(any::<u8>(), 1..=IMAGE_SIZE - start))
	})
}

fn non_volatile_space() -> impl Strategy<Value = MemorySpace> {
	prop_oneof![Just(MemorySpace::Nvm), Just(MemorySpace::Eeprom)]
}

fn model() -> impl Strategy<Value = &'static str> {
	prop_oneof![Just("SLG46824"), Just("SLG46826"), Just("SLG46827"), Just("SLG47004")]
}

fn is_valid_spec(s: &str) -> bool {
	s.len() == 4 && s.bytes().all(|c| c == b'0' || c == b'1' || c == b'X')
}

proptest! {
	/// Register writes read back unchanged, with no alignment restriction.
	#[test]
	fn register_round_trip((start, data) in register_range()) {
		let mut gp = setup("SLG46826");
		let before = gp.read_register(start, data.len()).unwrap();
		gp.write_register(start, &before).unwrap();
		prop_assert_eq!(&gp.read_register(start, data.len()).unwrap(), &before);

		// avoid the reset and erase trigger bytes, they act on write
		let touches_control = (start..start + data.len()).any(|a| a == 0xc8 || a == 0xe3);
		if !touches_control {
			gp.write_register(start, &data).unwrap();
			prop_assert_eq!(gp.read_register(start, data.len()).unwrap(), data);
		}
	}

	/// The second identical program of a page is a no-op.
	#[test]
	fn program_page_idempotent(
		space in non_volatile_space(),
		page in 0u8..15,
		initial in prop::array::uniform16(any::<u8>()),
		data in prop::array::uniform16(any::<u8>()),
	) {
		let mut gp = setup("SLG46826");
		let base = page as usize * PAGE_SIZE;
		gp.transport_mut().device_mut(1).unwrap().memory_mut(space)[base..base + PAGE_SIZE].copy_from_slice(&initial);

		let first = gp.program_eeprom_or_nvm(space, page, &data);
		let expected = if initial == data { PageState::Clean } else { PageState::Verified };
		prop_assert_eq!(first, vec![(page, expected)]);

		let device = gp.transport().device(1).unwrap();
		let (erases, programs) = (device.erase_count(), device.program_count());
		let second = gp.program_eeprom_or_nvm(space, page, &data);
		prop_assert_eq!(second, vec![(page, PageState::Clean)]);

		let device = gp.transport().device(1).unwrap();
		prop_assert_eq!((device.erase_count(), device.program_count()), (erases, programs));
		prop_assert_eq!(&device.memory(space)[base..base + PAGE_SIZE], &data[..]);
	}

	/// A successful erase always leaves the page reading as erased.
	#[test]
	fn erase_leaves_page_erased(
		space in non_volatile_space(),
		page in 0u8..15,
		initial in prop::array::uniform16(any::<u8>()),
	) {
		let mut gp = setup("SLG46826");
		let base = page as usize * PAGE_SIZE;
		gp.transport_mut().device_mut(1).unwrap().memory_mut(space)[base..base + PAGE_SIZE].copy_from_slice(&initial);

		let state = gp.erase_page(space, page).unwrap();
		prop_assert_eq!(state == PageState::Clean, initial == [0u8; PAGE_SIZE]);
		prop_assert!(gp.is_page_erased(space, page).unwrap());
	}

	/// Only the model's service pages in NVM are read only.
	#[test]
	fn page_writability(model in model(), page in 0u8..16) {
		let gp = setup(model);
		let read_only = gp.device().read_only_nvm_pages().contains(&page);
		prop_assert_eq!(gp.is_page_writable(MemorySpace::Nvm, page), !read_only);
		prop_assert!(gp.is_page_writable(MemorySpace::Eeprom, page));
		prop_assert!(gp.is_page_writable(MemorySpace::Register, page));
	}

	/// Malformed control code strings are rejected before touching the bus.
	#[test]
	fn control_code_spec_rejected(spec in "[01X xY]{0,6}") {
		prop_assume!(!is_valid_spec(&spec));
		let image = [0u8; IMAGE_SIZE];
		let device = DeviceTable::builtin().lookup("SLG46826").unwrap().clone().with_default_image(image);
		let cc = ControlCode::new(1).unwrap();
		let bus = SimulatedBus::new().with_device(SimulatedDevice::new(&device, cc));
		let mut gp = Greenpak::new(bus, device, cc);

		match gp.program_control_code(&spec) {
			Err(Error::InvalidSpec(ref s)) => {
				prop_assert_eq!(s, &spec);
			},
			r => {
				prop_assert!(false, "unexpected {:?}", r);
			},
		}
		prop_assert!(gp.transport().journal().is_empty());
	}

	/// Valid strings pack MSB first: 'X' into the high nibble, '1' into the low.
	#[test]
	fn control_code_spec_packing(spec in "[01X]{4}") {
		let parsed: ControlCodeSpec = spec.parse().unwrap();
		let byte = parsed.to_byte();
		for (i, c) in spec.chars().enumerate() {
			let bit = 3 - i;
			prop_assert_eq!(byte >> (4 + bit) & 1 == 1, c == 'X');
			prop_assert_eq!(byte >> bit & 1 == 1, c == '1');
		}
		prop_assert_eq!(parsed.to_string(), spec);
	}
}

trait ProgramBySpace {
	fn program_eeprom_or_nvm(&mut self, space: MemorySpace, page: u8, data: &[u8; PAGE_SIZE]) -> Vec<(u8, PageState)>;
}

impl ProgramBySpace for Greenpak<SimulatedBus> {
	fn program_eeprom_or_nvm(&mut self, space: MemorySpace, page: u8, data: &[u8; PAGE_SIZE]) -> Vec<(u8, PageState)> {
		match space {
			MemorySpace::Nvm => self.program_nvm(page, data).unwrap(),
			_ => self.program_eeprom(page, data).unwrap(),
		}
	}
}
