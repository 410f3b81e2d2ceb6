use std::fmt;

/// The memory spaces of a GreenPAK device, each reachable at its own I2C
/// address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum MemorySpace {
	/// volatile working memory (active configuration and state)
	Register,
	/// non-volatile configuration, copied into `Register` on reset
	Nvm,
	/// non-volatile user data
	Eeprom,
}

impl MemorySpace {
	pub const ALL: [MemorySpace; 3] = [MemorySpace::Register, MemorySpace::Nvm, MemorySpace::Eeprom];

	/// low 3 bits of the I2C address
	pub fn sub_address(self) -> u8 {
		match self {
			MemorySpace::Register => 0b000,
			MemorySpace::Nvm => 0b010,
			MemorySpace::Eeprom => 0b011,
		}
	}

	/// NVM and EEPROM are organized in 16 byte pages and need erasing before
	/// being written.
	pub fn is_non_volatile(self) -> bool {
		self != MemorySpace::Register
	}

	pub fn name(self) -> &'static str {
		match self {
			MemorySpace::Register => "REGISTER",
			MemorySpace::Nvm => "NVM",
			MemorySpace::Eeprom => "EEPROM",
		}
	}
}

impl fmt::Display for MemorySpace {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl std::str::FromStr for MemorySpace {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"register" | "reg" => Ok(MemorySpace::Register),
			"nvm" => Ok(MemorySpace::Nvm),
			"eeprom" => Ok(MemorySpace::Eeprom),
			_ => bail!("unknown memory space {:?} (expected register, nvm or eeprom)", s),
		}
	}
}

/// 4-bit value selecting which GreenPAK on the bus is addressed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ControlCode(u8);

impl ControlCode {
	pub const MAX: u8 = 15;

	pub fn new(code: u8) -> crate::Result<Self> {
		if code > Self::MAX {
			return Err(crate::Error::InvalidControlCode(code));
		}
		Ok(ControlCode(code))
	}

	pub fn value(self) -> u8 {
		self.0
	}

	/// all 16 codes in ascending order
	pub fn all() -> impl Iterator<Item = ControlCode> {
		(0..=Self::MAX).map(ControlCode)
	}
}

impl fmt::Display for ControlCode {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:x}", self.0)
	}
}

/// 7-bit I2C address a device with `control_code` answers to for `space`.
///
/// Fixed by the silicon: `control_code << 3 | sub_address`.
pub fn device_address(space: MemorySpace, control_code: ControlCode) -> u8 {
	control_code.0 << 3 | space.sub_address()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn addresses_for_control_code_1() {
		let cc = ControlCode::new(1).unwrap();
		assert_eq!(device_address(MemorySpace::Register, cc), 0x08);
		assert_eq!(device_address(MemorySpace::Nvm, cc), 0x0a);
		assert_eq!(device_address(MemorySpace::Eeprom, cc), 0x0b);
	}

	#[test]
	fn addresses_stay_7_bit() {
		for cc in ControlCode::all() {
			for &space in MemorySpace::ALL.iter() {
				let address = device_address(space, cc);
				assert!(address <= 0x7f);
				assert_eq!(address >> 3, cc.value());
			}
		}
	}

	#[test]
	fn control_code_range() {
		assert!(ControlCode::new(15).is_ok());
		match ControlCode::new(16) {
			Err(crate::Error::InvalidControlCode(16)) => (),
			r => panic!("unexpected {:?}", r),
		}
		assert_eq!(ControlCode::all().count(), 16);
	}

	#[test]
	fn parse_space() {
		assert_eq!("NVM".parse::<MemorySpace>().unwrap(), MemorySpace::Nvm);
		assert_eq!("reg".parse::<MemorySpace>().unwrap(), MemorySpace::Register);
		assert!("flash".parse::<MemorySpace>().is_err());
	}
}
