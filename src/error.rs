use std::io;
use std::path::PathBuf;

use crate::address::MemorySpace;
use crate::memory::PAGE_SIZE;

/// Failures of the device memory protocol.
///
/// Every variant is raised synchronously to the immediate caller; nothing is
/// retried inside the crate.
#[derive(Debug, Fail)]
pub enum Error {
	#[fail(display = "I2C {} at address 0x{:02x} failed: {}", operation, address, cause)]
	Transport {
		address: u8,
		operation: &'static str,
		#[cause]
		cause: io::Error,
	},

	#[fail(display = "I2C read at address 0x{:02x} returned {} bytes (expected {})", address, actual, expected)]
	ShortRead {
		address: u8,
		expected: usize,
		actual: usize,
	},

	#[fail(display = "page {}/{:02} is read only", space, page)]
	ReadOnlyPage {
		space: MemorySpace,
		page: u8,
	},

	#[fail(display = "page {}/{:02} not erased, read back {:02x?}", space, page, found)]
	EraseVerification {
		space: MemorySpace,
		page: u8,
		found: [u8; PAGE_SIZE],
	},

	#[fail(display = "page {}/{:02} verify failed: expected {:02x?}, read back {:02x?}", space, page, expected, found)]
	ProgramVerification {
		space: MemorySpace,
		page: u8,
		expected: [u8; PAGE_SIZE],
		found: [u8; PAGE_SIZE],
	},

	#[fail(display = "invalid control code specification {:?} (expected 4 chars of '0', '1', 'X')", _0)]
	InvalidSpec(String),

	#[fail(display = "unknown device type {:?}", _0)]
	UnknownDevice(String),

	#[fail(display = "no factory default image loaded for device type {}", _0)]
	MissingDefaultImage(String),

	#[fail(display = "invalid control code {} (must be in 0..=15)", _0)]
	InvalidControlCode(u8),

	#[fail(display = "invalid {} range: start {}, length {}", space, start, len)]
	InvalidRange {
		space: MemorySpace,
		start: usize,
		len: usize,
	},

	#[fail(display = "{} access must be whole 16 byte pages: start {}, length {}", space, start, len)]
	Unaligned {
		space: MemorySpace,
		start: usize,
		len: usize,
	},

	#[fail(display = "{} memory has no pages", _0)]
	NotPaged(MemorySpace),

	#[fail(display = "invalid device descriptor: {}", _0)]
	InvalidDescriptor(String),

	#[fail(display = "couldn't read {}: {}", path, cause)]
	Io {
		path: DisplayPath,
		#[cause]
		cause: io::Error,
	},
}

/// `PathBuf` wrapper so it can show up in `#[fail(display)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayPath(pub PathBuf);

impl std::fmt::Display for DisplayPath {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{}", self.0.display())
	}
}

pub type Result<T> = std::result::Result<T, Error>;
