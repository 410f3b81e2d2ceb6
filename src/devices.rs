use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{
	DisplayPath,
	Error,
};
use crate::memory::{
	IMAGE_SIZE,
	PAGE_COUNT,
};

/// Static parameters of one GreenPAK model.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DeviceDescriptor {
	name: String,
	read_only_nvm_pages: Vec<u8>,
	erase_trigger_address: u8,
	erase_trigger_mask: u8,
	control_code_address: u8,
	default_image: Option<[u8; IMAGE_SIZE]>,
}

impl DeviceDescriptor {
	/// Validates the descriptor: read only pages in 0..16 without duplicates,
	/// and `erase_trigger_mask` must leave the low 5 bits (space select and
	/// page index) clear.
	pub fn new(
		name: &str,
		read_only_nvm_pages: &[u8],
		erase_trigger_address: u8,
		erase_trigger_mask: u8,
		control_code_address: u8,
	) -> crate::Result<Self> {
		if name.is_empty() {
			return Err(Error::InvalidDescriptor("empty device name".into()));
		}
		for (i, &page) in read_only_nvm_pages.iter().enumerate() {
			if page as usize >= PAGE_COUNT {
				return Err(Error::InvalidDescriptor(format!("{}: read only page {} out of range", name, page)));
			}
			if read_only_nvm_pages[..i].contains(&page) {
				return Err(Error::InvalidDescriptor(format!("{}: duplicate read only page {}", name, page)));
			}
		}
		if erase_trigger_mask & 0b0001_1111 != 0 {
			return Err(Error::InvalidDescriptor(format!(
				"{}: erase mask 0x{:02x} overlaps space select / page bits", name, erase_trigger_mask
			)));
		}

		Ok(DeviceDescriptor {
			name: name.into(),
			read_only_nvm_pages: read_only_nvm_pages.to_vec(),
			erase_trigger_address,
			erase_trigger_mask,
			control_code_address,
			default_image: None,
		})
	}

	pub fn with_default_image(mut self, image: [u8; IMAGE_SIZE]) -> Self {
		self.default_image = Some(image);
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn read_only_nvm_pages(&self) -> &[u8] {
		&self.read_only_nvm_pages
	}

	pub fn is_read_only_nvm_page(&self, page: u8) -> bool {
		self.read_only_nvm_pages.contains(&page)
	}

	pub fn erase_trigger_address(&self) -> u8 {
		self.erase_trigger_address
	}

	pub fn erase_trigger_mask(&self) -> u8 {
		self.erase_trigger_mask
	}

	pub fn control_code_address(&self) -> u8 {
		self.control_code_address
	}

	/// factory NVM content, if one was loaded
	pub fn default_image(&self) -> Option<&[u8; IMAGE_SIZE]> {
		self.default_image.as_ref()
	}
}

// name, read only NVM pages, erase trigger register, erase mask, control code byte
const BUILTIN: &[(&str, &[u8], u8, u8, u8)] = &[
	("SLG46824", &[15], 0xe3, 0b1000_0000, 0xca),
	("SLG46826", &[15], 0xe3, 0b1000_0000, 0xca),
	("SLG46827", &[15], 0xe3, 0b1000_0000, 0xca),
	("SLG47004", &[8, 15], 0xe3, 0b1100_0000, 0x7f),
];

/// Immutable lookup table of supported models, built once at startup.
#[derive(Clone, Debug, Default)]
pub struct DeviceTable {
	devices: BTreeMap<String, DeviceDescriptor>,
}

impl DeviceTable {
	pub fn from_descriptors<I>(descriptors: I) -> Self
	where
		I: IntoIterator<Item = DeviceDescriptor>,
	{
		DeviceTable {
			devices: descriptors.into_iter().map(|d| (d.name.clone(), d)).collect(),
		}
	}

	/// all models known to this crate, without factory images
	pub fn builtin() -> Self {
		Self::from_descriptors(BUILTIN.iter().map(|&(name, ro, addr, mask, cc_addr)| {
			// the constants above satisfy every invariant checked by `new`
			DeviceDescriptor {
				name: name.into(),
				read_only_nvm_pages: ro.to_vec(),
				erase_trigger_address: addr,
				erase_trigger_mask: mask,
				control_code_address: cc_addr,
				default_image: None,
			}
		}))
	}

	/// Attach factory images from `dir`, one raw 256 byte file per model named
	/// `<MODEL>_default.bin`. Models without a file are left as they are.
	pub fn load_default_images(&mut self, dir: &Path) -> crate::Result<()> {
		for descriptor in self.devices.values_mut() {
			let path = dir.join(format!("{}_default.bin", descriptor.name));
			if !path.exists() {
				debug!("no default image for {} at {}", descriptor.name, path.display());
				continue;
			}
			let data = fs::read(&path).map_err(|cause| Error::Io {
				path: DisplayPath(path.clone()),
				cause,
			})?;
			if data.len() != IMAGE_SIZE {
				return Err(Error::InvalidDescriptor(format!(
					"{}: default image {} has {} bytes (expected {})",
					descriptor.name, path.display(), data.len(), IMAGE_SIZE
				)));
			}
			let mut image = [0u8; IMAGE_SIZE];
			image.copy_from_slice(&data);
			descriptor.default_image = Some(image);
			info!("Loaded default image for {} from {}", descriptor.name, path.display());
		}
		Ok(())
	}

	pub fn lookup(&self, name: &str) -> crate::Result<&DeviceDescriptor> {
		self.devices.get(name).ok_or_else(|| Error::UnknownDevice(name.into()))
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.devices.keys().map(|k| k.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builtin_descriptors_are_valid() {
		for &(name, ro, addr, mask, cc_addr) in BUILTIN {
			let d = DeviceDescriptor::new(name, ro, addr, mask, cc_addr).unwrap();
			assert_eq!(d, *DeviceTable::builtin().lookup(name).unwrap());
		}
	}

	#[test]
	fn lookup() {
		let table = DeviceTable::builtin();
		let d = table.lookup("SLG47004").unwrap();
		assert!(d.is_read_only_nvm_page(8));
		assert!(d.is_read_only_nvm_page(15));
		assert!(!d.is_read_only_nvm_page(7));
		assert_eq!(d.control_code_address(), 0x7f);

		match table.lookup("SLG99999") {
			Err(Error::UnknownDevice(ref name)) if name == "SLG99999" => (),
			r => panic!("unexpected {:?}", r),
		}
		assert_eq!(table.names().count(), 4);
	}

	#[test]
	fn descriptor_validation() {
		assert!(DeviceDescriptor::new("X", &[15, 15], 0xe3, 0x80, 0xca).is_err());
		assert!(DeviceDescriptor::new("X", &[16], 0xe3, 0x80, 0xca).is_err());
		assert!(DeviceDescriptor::new("X", &[15], 0xe3, 0x81, 0xca).is_err());
		assert!(DeviceDescriptor::new("", &[15], 0xe3, 0x80, 0xca).is_err());
		assert!(DeviceDescriptor::new("X", &[], 0xe3, 0xe0, 0xca).is_ok());
	}

	#[test]
	fn load_images() {
		let dir = std::env::temp_dir().join(format!("greenpak-flash-images-{}", std::process::id()));
		fs::create_dir_all(&dir).unwrap();
		let mut image = [0u8; IMAGE_SIZE];
		image[0xca] = 0x31;
		fs::write(dir.join("SLG46826_default.bin"), &image[..]).unwrap();
		fs::write(dir.join("SLG46824_default.bin"), &image[..10]).unwrap();

		let mut table = DeviceTable::builtin();
		match table.load_default_images(&dir) {
			Err(Error::InvalidDescriptor(_)) => (),
			r => panic!("unexpected {:?}", r),
		}
		fs::remove_file(dir.join("SLG46824_default.bin")).unwrap();

		let mut table = DeviceTable::builtin();
		table.load_default_images(&dir).unwrap();
		assert_eq!(table.lookup("SLG46826").unwrap().default_image().unwrap()[0xca], 0x31);
		assert!(table.lookup("SLG47004").unwrap().default_image().is_none());

		fs::remove_dir_all(&dir).unwrap();
	}
}
