use std::fmt;
use std::str;

use crate::address::{
	ControlCode,
	MemorySpace,
	device_address,
};
use crate::devices::DeviceDescriptor;
use crate::error::Error;
use crate::memory::{
	MemoryAccess,
	PAGE_SIZE,
	PageState,
	Timing,
};
use crate::transport::Transport;

pub(crate) const RESET_REGISTER: u8 = 0xc8;
// register bit 1601: reload NVM into the registers and restart
pub(crate) const RESET_BIT: u8 = 0x02;

/// Stored control code configuration: 4 bits, each fixed to 0/1 or taken
/// from the external control code pin ('X'), most significant bit first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ControlCodeSpec {
	fixed: u8,
	selected: u8,
}

impl ControlCodeSpec {
	/// bits forced to 1
	pub fn fixed_bits(&self) -> u8 {
		self.fixed
	}

	/// bits that follow the external pins
	pub fn selection_mask(&self) -> u8 {
		self.selected
	}

	/// NVM byte layout: selection mask in the high nibble, fixed bits low
	pub fn to_byte(&self) -> u8 {
		self.selected << 4 | self.fixed
	}
}

impl str::FromStr for ControlCodeSpec {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let r = s.as_bytes();
		if r.len() != 4 {
			return Err(Error::InvalidSpec(s.into()));
		}
		let mut spec = ControlCodeSpec { fixed: 0, selected: 0 };
		for (i, c) in r.iter().enumerate() {
			let mask = 1u8 << (3 - i);
			match c {
				b'0' => (),
				b'1' => spec.fixed |= mask,
				b'X' => spec.selected |= mask,
				_ => return Err(Error::InvalidSpec(s.into())),
			}
		}
		Ok(spec)
	}
}

impl fmt::Display for ControlCodeSpec {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for bit in (0..4).rev() {
			let mask = 1u8 << bit;
			let c = if self.selected & mask != 0 {
				'X'
			} else if self.fixed & mask != 0 {
				'1'
			} else {
				'0'
			};
			write!(f, "{}", c)?;
		}
		Ok(())
	}
}

/// One GreenPAK on an I2C bus: owns the transport, the selected model and
/// the control code the device is addressed by.
///
/// Operations are strictly sequential and must not be interleaved with other
/// users of the same bus.
pub struct Greenpak<T: Transport> {
	transport: T,
	device: DeviceDescriptor,
	control_code: ControlCode,
	timing: Timing,
}

impl<T: Transport> Greenpak<T> {
	pub fn new(transport: T, device: DeviceDescriptor, control_code: ControlCode) -> Self {
		Self::with_timing(transport, device, control_code, Timing::default())
	}

	pub fn with_timing(transport: T, device: DeviceDescriptor, control_code: ControlCode, timing: Timing) -> Self {
		Greenpak {
			transport,
			device,
			control_code,
			timing,
		}
	}

	pub fn control_code(&self) -> ControlCode {
		self.control_code
	}

	pub fn set_control_code(&mut self, control_code: ControlCode) {
		self.control_code = control_code;
	}

	/// The model this driver assumes; the device type can't be read back from
	/// the chip.
	pub fn device(&self) -> &DeviceDescriptor {
		&self.device
	}

	pub fn set_device(&mut self, device: DeviceDescriptor) {
		self.device = device;
	}

	pub fn timing(&self) -> &Timing {
		&self.timing
	}

	pub fn transport(&self) -> &T {
		&self.transport
	}

	pub fn transport_mut(&mut self) -> &mut T {
		&mut self.transport
	}

	pub fn into_transport(self) -> T {
		self.transport
	}

	fn memory(&mut self) -> MemoryAccess<'_, T> {
		MemoryAccess::new(&mut self.transport, &self.device, self.control_code, &self.timing)
	}

	pub fn read_register(&mut self, start: usize, count: usize) -> crate::Result<Vec<u8>> {
		self.memory().read_bytes(MemorySpace::Register, start, count)
	}

	pub fn read_nvm(&mut self, start: usize, count: usize) -> crate::Result<Vec<u8>> {
		self.memory().read_bytes(MemorySpace::Nvm, start, count)
	}

	pub fn read_eeprom(&mut self, start: usize, count: usize) -> crate::Result<Vec<u8>> {
		self.memory().read_bytes(MemorySpace::Eeprom, start, count)
	}

	pub fn read(&mut self, space: MemorySpace, start: usize, count: usize) -> crate::Result<Vec<u8>> {
		self.memory().read_bytes(space, start, count)
	}

	/// Registers are volatile and written directly, without erasing.
	pub fn write_register(&mut self, start: usize, data: &[u8]) -> crate::Result<()> {
		self.memory().write_bytes(MemorySpace::Register, start, data)
	}

	pub fn read_page(&mut self, space: MemorySpace, page: u8) -> crate::Result<[u8; PAGE_SIZE]> {
		self.memory().read_page(space, page)
	}

	/// Only the vendor service pages of NVM are protected.
	pub fn is_page_writable(&self, space: MemorySpace, page: u8) -> bool {
		match space {
			MemorySpace::Nvm => !self.device.is_read_only_nvm_page(page),
			MemorySpace::Register | MemorySpace::Eeprom => true,
		}
	}

	pub fn is_page_erased(&mut self, space: MemorySpace, page: u8) -> crate::Result<bool> {
		self.memory().is_page_erased(space, page)
	}

	pub fn erase_page(&mut self, space: MemorySpace, page: u8) -> crate::Result<PageState> {
		self.memory().erase_page(space, page)
	}

	/// Program whole pages of NVM; `data.len()` must be a multiple of 16.
	pub fn program_nvm(&mut self, start_page: u8, data: &[u8]) -> crate::Result<Vec<(u8, PageState)>> {
		self.memory().program_pages(MemorySpace::Nvm, start_page, data)
	}

	/// Program whole pages of EEPROM; `data.len()` must be a multiple of 16.
	pub fn program_eeprom(&mut self, start_page: u8, data: &[u8]) -> crate::Result<Vec<(u8, PageState)>> {
		self.memory().program_pages(MemorySpace::Eeprom, start_page, data)
	}

	/// Reload the NVM configuration into the registers and restart the
	/// device.
	///
	/// Nothing is verified afterwards: a changed control code configuration
	/// moves the device to other addresses.
	pub fn reset(&mut self) -> crate::Result<()> {
		info!("Resetting device at control code {}.", self.control_code);
		self.write_register(RESET_REGISTER as usize, &[RESET_BIT])?;
		let delay = self.timing.reset;
		self.transport.settle(delay);
		Ok(())
	}

	/// Probe for a device at `control_code` with an empty write to its
	/// register address. Failures are expected here and only traced.
	pub fn scan_device(&mut self, control_code: ControlCode) -> bool {
		let address = device_address(MemorySpace::Register, control_code);
		match self.transport.write(address, &[]) {
			Ok(()) => true,
			Err(e) => {
				trace!("no device at 0x{:02x}: {}", address, e);
				false
			},
		}
	}

	/// Control codes of all responding devices, ascending.
	pub fn scan_devices(&mut self) -> Vec<ControlCode> {
		ControlCode::all().filter(|&cc| self.scan_device(cc)).collect()
	}

	/// Provision the stored control code configuration (for disambiguating
	/// several devices sharing the default address), using the current
	/// control code and model.
	///
	/// The NVM page holding the control code byte is rewritten from the
	/// model's factory image, clobbering any other configuration in that page;
	/// program the full configuration afterwards. Takes effect on reset.
	pub fn program_control_code(&mut self, spec: &str) -> crate::Result<Vec<(u8, PageState)>> {
		let spec: ControlCodeSpec = spec.parse()?;
		let image = match self.device.default_image() {
			Some(image) => *image,
			None => return Err(Error::MissingDefaultImage(self.device.name().into())),
		};
		let address = self.device.control_code_address() as usize;
		let page = address / PAGE_SIZE;
		let mut page_data = [0u8; PAGE_SIZE];
		page_data.copy_from_slice(&image[page * PAGE_SIZE..(page + 1) * PAGE_SIZE]);
		page_data[address % PAGE_SIZE] = spec.to_byte();

		info!(
			"Programming control code {} (byte 0x{:02x}) on {} at control code {}.",
			spec, spec.to_byte(), self.device.name(), self.control_code
		);
		self.program_nvm(page as u8, &page_data)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn spec(s: &str) -> ControlCodeSpec {
		s.parse().unwrap()
	}

	#[test]
	fn spec_packing() {
		assert_eq!(spec("0000").to_byte(), 0b0000_0000);
		assert_eq!(spec("1111").to_byte(), 0b0000_1111);
		assert_eq!(spec("XXXX").to_byte(), 0b1111_0000);
		assert_eq!(spec("01XX").to_byte(), 0b0011_0100);
		assert_eq!(spec("X010").to_byte(), 0b1000_0010);
		assert_eq!(spec("01XX").selection_mask(), 0b0011);
		assert_eq!(spec("01XX").fixed_bits(), 0b0100);
	}

	#[test]
	fn spec_display() {
		for s in &["0000", "1111", "XXXX", "01XX", "X01X"] {
			assert_eq!(spec(s).to_string(), *s);
		}
	}

	#[test]
	fn spec_rejects_malformed() {
		for s in &["", "01X", "01XY", "0 1X", "01XXX", "01xx", "０１XX"] {
			match s.parse::<ControlCodeSpec>() {
				Err(Error::InvalidSpec(ref got)) => assert_eq!(got, s),
				r => panic!("{:?} unexpectedly gave {:?}", s, r),
			}
		}
	}
}
