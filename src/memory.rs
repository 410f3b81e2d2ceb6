//! Byte and page level access to the GreenPAK memory spaces.
//!
//! NVM and EEPROM cells can only be cleared by erasing a whole 16 byte page
//! and only be set by programming it, so every page update runs
//! read/compare, erase, verify erased, program, verify programmed.

use std::time::Duration;

use crate::address::{
	ControlCode,
	MemorySpace,
	device_address,
};
use crate::devices::DeviceDescriptor;
use crate::error::Error;
use crate::transport::Transport;

pub const PAGE_SIZE: usize = 16;
pub const PAGE_COUNT: usize = 16;
pub const IMAGE_SIZE: usize = PAGE_SIZE * PAGE_COUNT;

// bit 4 of the erase trigger byte selects EEPROM instead of NVM
pub(crate) const ERASE_SELECT_EEPROM: u8 = 0x10;

/// Mandatory waits; the hardware has no completion signal.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Timing {
	/// page erase (datasheet: 20 ms max)
	pub erase: Duration,
	/// page program (datasheet: 20 ms max)
	pub program: Duration,
	/// reload of NVM into the registers after a reset command
	pub reset: Duration,
}

impl Default for Timing {
	fn default() -> Self {
		Timing {
			erase: Duration::from_millis(25),
			program: Duration::from_millis(25),
			reset: Duration::from_millis(100),
		}
	}
}

/// What a page operation ended up doing.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum PageState {
	/// page already had the requested content (or was already erased); no
	/// write issued
	Clean,
	/// page erased and verified all zero
	Erased,
	/// page erased, programmed and verified
	Verified,
	/// read only page left alone by a multi page program
	Skipped,
}

/// One logical operation against one device; holds the bus for its lifetime.
///
/// The I2C address is derived from `control_code` on each transaction.
pub struct MemoryAccess<'a, T: Transport + ?Sized + 'a> {
	transport: &'a mut T,
	device: &'a DeviceDescriptor,
	control_code: ControlCode,
	timing: &'a Timing,
}

impl<'a, T: Transport + ?Sized> MemoryAccess<'a, T> {
	pub fn new(
		transport: &'a mut T,
		device: &'a DeviceDescriptor,
		control_code: ControlCode,
		timing: &'a Timing,
	) -> Self {
		MemoryAccess {
			transport,
			device,
			control_code,
			timing,
		}
	}

	fn address(&self, space: MemorySpace) -> u8 {
		device_address(space, self.control_code)
	}

	fn bus_write(&mut self, address: u8, data: &[u8]) -> crate::Result<()> {
		self.transport.write(address, data).map_err(|cause| {
			warn!("I2C write of {} bytes to 0x{:02x} failed: {}", data.len(), address, cause);
			Error::Transport { address, operation: "write", cause }
		})
	}

	fn bus_read(&mut self, address: u8, count: usize) -> crate::Result<Vec<u8>> {
		let data = self.transport.read(address, count).map_err(|cause| {
			warn!("I2C read of {} bytes from 0x{:02x} failed: {}", count, address, cause);
			Error::Transport { address, operation: "read", cause }
		})?;
		if data.len() != count {
			warn!("I2C read from 0x{:02x} returned {} bytes, expected {}", address, data.len(), count);
			return Err(Error::ShortRead { address, expected: count, actual: data.len() });
		}
		Ok(data)
	}

	fn check_range(space: MemorySpace, start: usize, len: usize) -> crate::Result<()> {
		if start >= IMAGE_SIZE || len == 0 || len > IMAGE_SIZE - start {
			return Err(Error::InvalidRange { space, start, len });
		}
		Ok(())
	}

	fn check_paged(space: MemorySpace, page: u8) -> crate::Result<()> {
		if !space.is_non_volatile() {
			return Err(Error::NotPaged(space));
		}
		if page as usize >= PAGE_COUNT {
			return Err(Error::InvalidRange { space, start: page as usize * PAGE_SIZE, len: PAGE_SIZE });
		}
		Ok(())
	}

	/// Set the device's address pointer to `start`, then read `count` bytes.
	pub fn read_bytes(&mut self, space: MemorySpace, start: usize, count: usize) -> crate::Result<Vec<u8>> {
		Self::check_range(space, start, count)?;
		let address = self.address(space);
		self.bus_write(address, &[start as u8])?;
		self.bus_read(address, count)
	}

	/// Single transaction `[start] + data`.
	///
	/// Writes to NVM and EEPROM must be exactly one aligned page; the page
	/// has to be erased beforehand and needs `Timing::program` to complete.
	pub fn write_bytes(&mut self, space: MemorySpace, start: usize, data: &[u8]) -> crate::Result<()> {
		Self::check_range(space, start, data.len())?;
		if space.is_non_volatile() && (start % PAGE_SIZE != 0 || data.len() != PAGE_SIZE) {
			return Err(Error::Unaligned { space, start, len: data.len() });
		}
		let address = self.address(space);
		let mut payload = Vec::with_capacity(data.len() + 1);
		payload.push(start as u8);
		payload.extend_from_slice(data);
		self.bus_write(address, &payload)
	}

	pub fn read_page(&mut self, space: MemorySpace, page: u8) -> crate::Result<[u8; PAGE_SIZE]> {
		Self::check_paged(space, page)?;
		let data = self.read_bytes(space, page as usize * PAGE_SIZE, PAGE_SIZE)?;
		let mut result = [0u8; PAGE_SIZE];
		result.copy_from_slice(&data);
		Ok(result)
	}

	/// Only the vendor service pages of NVM are protected.
	pub fn is_page_writable(&self, space: MemorySpace, page: u8) -> bool {
		match space {
			MemorySpace::Nvm => !self.device.is_read_only_nvm_page(page),
			MemorySpace::Register | MemorySpace::Eeprom => true,
		}
	}

	fn check_writable(&self, space: MemorySpace, page: u8) -> crate::Result<()> {
		if !self.is_page_writable(space, page) {
			return Err(Error::ReadOnlyPage { space, page });
		}
		Ok(())
	}

	pub fn is_page_erased(&mut self, space: MemorySpace, page: u8) -> crate::Result<bool> {
		Ok(self.read_page(space, page)?.iter().all(|&b| b == 0))
	}

	/// Erase a page to all zeros; no-op if it already reads as erased.
	pub fn erase_page(&mut self, space: MemorySpace, page: u8) -> crate::Result<PageState> {
		Self::check_paged(space, page)?;
		self.check_writable(space, page)?;

		if self.is_page_erased(space, page)? {
			debug!("Page {}/{:02} already erased.", space, page);
			return Ok(PageState::Clean);
		}

		info!("Erasing page {}/{:02}.", space, page);
		let select = match space {
			MemorySpace::Eeprom => ERASE_SELECT_EEPROM,
			_ => 0,
		};
		let trigger = self.device.erase_trigger_mask() | select | page;
		let trigger_address = self.device.erase_trigger_address() as usize;
		self.write_bytes(MemorySpace::Register, trigger_address, &[trigger])?;
		self.transport.settle(self.timing.erase);
		self.clear_erase_erratum();

		let found = self.read_page(space, page)?;
		if found.iter().any(|&b| b != 0) {
			error!("Page {}/{:02} not erased: {:02x?}", space, page, found);
			return Err(Error::EraseVerification { space, page, found });
		}
		Ok(PageState::Erased)
	}

	/// SLG4682x erratum: after an erase the device NACKs the next transaction.
	///
	/// Spend that NACK on a throwaway write (register pointer to 0) so the
	/// next real operation goes through. Its result is ignored.
	fn clear_erase_erratum(&mut self) {
		let address = self.address(MemorySpace::Register);
		if let Err(e) = self.transport.write(address, &[0]) {
			trace!("erase erratum write to 0x{:02x}: {}", address, e);
		}
	}

	/// Make a page hold `data`: erase, program and verify unless it already
	/// does.
	pub fn program_page(&mut self, space: MemorySpace, page: u8, data: &[u8; PAGE_SIZE]) -> crate::Result<PageState> {
		Self::check_paged(space, page)?;
		self.check_writable(space, page)?;

		if self.read_page(space, page)? == *data {
			debug!("Page {}/{:02} no change.", space, page);
			return Ok(PageState::Clean);
		}

		self.erase_page(space, page)?;

		info!("Writing page {}/{:02}.", space, page);
		self.write_bytes(space, page as usize * PAGE_SIZE, data)?;
		self.transport.settle(self.timing.program);

		let found = self.read_page(space, page)?;
		if found != *data {
			error!("Page {}/{:02} verify failed: expected {:02x?}, found {:02x?}", space, page, data, found);
			return Err(Error::ProgramVerification { space, page, expected: *data, found });
		}
		Ok(PageState::Verified)
	}

	/// Program consecutive pages starting at `start_page`, in ascending order.
	///
	/// Read only pages in the range are skipped; a range made up only of read
	/// only pages is rejected. The first failing page aborts the rest.
	pub fn program_pages(&mut self, space: MemorySpace, start_page: u8, data: &[u8]) -> crate::Result<Vec<(u8, PageState)>> {
		let start = start_page as usize * PAGE_SIZE;
		if !space.is_non_volatile() {
			return Err(Error::NotPaged(space));
		}
		if data.is_empty() || data.len() % PAGE_SIZE != 0 {
			return Err(Error::Unaligned { space, start, len: data.len() });
		}
		Self::check_range(space, start, data.len())?;

		let page_count = (data.len() / PAGE_SIZE) as u8;
		let pages = start_page..start_page + page_count;
		if !pages.clone().any(|p| self.is_page_writable(space, p)) {
			return Err(Error::ReadOnlyPage { space, page: start_page });
		}

		let mut result = Vec::with_capacity(page_count as usize);
		for (page, chunk) in pages.zip(data.chunks(PAGE_SIZE)) {
			if !self.is_page_writable(space, page) {
				warn!("Page {}/{:02} is a read only page, skipping.", space, page);
				result.push((page, PageState::Skipped));
				continue;
			}
			let mut page_data = [0u8; PAGE_SIZE];
			page_data.copy_from_slice(chunk);
			let state = self.program_page(space, page, &page_data)?;
			result.push((page, state));
		}
		Ok(result)
	}
}
