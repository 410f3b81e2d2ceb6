//! In-memory I2C bus with simulated GreenPAK devices.
//!
//! Models what the programming protocol depends on: the address pointer per
//! memory space, the erase trigger register, program cells that can only be
//! set (not cleared) without an erase, read only service pages, the reset
//! command and the NACK following an erase (silicon erratum). All
//! transactions are recorded in a journal.

use std::io;
use std::time::Duration;

use super::Transport;
use crate::address::{
	ControlCode,
	MemorySpace,
};
use crate::devices::DeviceDescriptor;
use crate::driver::{
	RESET_BIT,
	RESET_REGISTER,
};
use crate::memory::{
	ERASE_SELECT_EEPROM,
	IMAGE_SIZE,
	PAGE_SIZE,
};

fn space_index(space: MemorySpace) -> usize {
	match space {
		MemorySpace::Register => 0,
		MemorySpace::Nvm => 1,
		MemorySpace::Eeprom => 2,
	}
}

fn space_for_sub_address(sub_address: u8) -> Option<MemorySpace> {
	MemorySpace::ALL.iter().cloned().find(|s| s.sub_address() == sub_address)
}

#[derive(Clone, Debug)]
pub struct SimulatedDevice {
	control_code: u8,
	pins: u8,
	registers: [u8; IMAGE_SIZE],
	nvm: [u8; IMAGE_SIZE],
	eeprom: [u8; IMAGE_SIZE],
	pointers: [u8; 3],
	read_only_nvm_pages: Vec<u8>,
	erase_trigger_address: u8,
	erase_trigger_mask: u8,
	control_code_address: u8,
	erratum_pending: bool,
	fail_erase: bool,
	fail_program: bool,
	erase_count: usize,
	program_count: usize,
}

impl SimulatedDevice {
	/// Device of the described model; NVM starts as the factory image (or
	/// all zero without one) and the registers as a copy of it.
	pub fn new(descriptor: &DeviceDescriptor, control_code: ControlCode) -> Self {
		let nvm = descriptor.default_image().cloned().unwrap_or([0u8; IMAGE_SIZE]);
		SimulatedDevice {
			control_code: control_code.value(),
			pins: 0,
			registers: nvm,
			nvm,
			eeprom: [0u8; IMAGE_SIZE],
			pointers: [0; 3],
			read_only_nvm_pages: descriptor.read_only_nvm_pages().to_vec(),
			erase_trigger_address: descriptor.erase_trigger_address(),
			erase_trigger_mask: descriptor.erase_trigger_mask(),
			control_code_address: descriptor.control_code_address(),
			erratum_pending: false,
			fail_erase: false,
			fail_program: false,
			erase_count: 0,
			program_count: 0,
		}
	}

	pub fn control_code(&self) -> u8 {
		self.control_code
	}

	/// levels of the external control code pins, used on reset for bits
	/// configured as externally selected
	pub fn set_pins(&mut self, pins: u8) {
		self.pins = pins & 0x0f;
	}

	pub fn memory(&self, space: MemorySpace) -> &[u8; IMAGE_SIZE] {
		match space {
			MemorySpace::Register => &self.registers,
			MemorySpace::Nvm => &self.nvm,
			MemorySpace::Eeprom => &self.eeprom,
		}
	}

	pub fn memory_mut(&mut self, space: MemorySpace) -> &mut [u8; IMAGE_SIZE] {
		match space {
			MemorySpace::Register => &mut self.registers,
			MemorySpace::Nvm => &mut self.nvm,
			MemorySpace::Eeprom => &mut self.eeprom,
		}
	}

	/// erase commands are acknowledged but leave the page untouched
	pub fn set_fail_erase(&mut self, fail: bool) {
		self.fail_erase = fail;
	}

	/// page writes are acknowledged but don't change the cells
	pub fn set_fail_program(&mut self, fail: bool) {
		self.fail_program = fail;
	}

	/// number of erase commands that hit a writable page
	pub fn erase_count(&self) -> usize {
		self.erase_count
	}

	/// number of page writes to NVM/EEPROM
	pub fn program_count(&self) -> usize {
		self.program_count
	}

	fn is_protected(&self, space: MemorySpace, page: u8) -> bool {
		space == MemorySpace::Nvm && self.read_only_nvm_pages.contains(&page)
	}

	fn write(&mut self, space: MemorySpace, data: &[u8]) {
		let (&start, payload) = match data.split_first() {
			Some(v) => v,
			None => return,
		};
		self.pointers[space_index(space)] = start;
		if payload.is_empty() {
			return;
		}
		match space {
			MemorySpace::Register => {
				for (i, &value) in payload.iter().enumerate() {
					let address = start.wrapping_add(i as u8);
					self.registers[address as usize] = value;
					self.register_written(address, value);
				}
			},
			MemorySpace::Nvm | MemorySpace::Eeprom => self.program(space, start, payload),
		}
	}

	fn register_written(&mut self, address: u8, value: u8) {
		let mask = self.erase_trigger_mask;
		if address == self.erase_trigger_address && mask != 0 && value & mask == mask {
			self.registers[address as usize] = 0;
			let space = if value & ERASE_SELECT_EEPROM != 0 { MemorySpace::Eeprom } else { MemorySpace::Nvm };
			let page = value & 0x0f;
			if !self.fail_erase && !self.is_protected(space, page) {
				let base = page as usize * PAGE_SIZE;
				for b in &mut self.memory_mut(space)[base..base + PAGE_SIZE] {
					*b = 0;
				}
				self.erase_count += 1;
			}
			self.erratum_pending = true;
		} else if address == RESET_REGISTER && value & RESET_BIT != 0 {
			self.reset();
		}
	}

	// writes wrap around within the page; cells can only go from 0 to 1
	fn program(&mut self, space: MemorySpace, start: u8, payload: &[u8]) {
		self.program_count += 1;
		if self.fail_program || self.is_protected(space, start >> 4) {
			return;
		}
		let base = (start as usize) & !(PAGE_SIZE - 1);
		let memory = self.memory_mut(space);
		for (i, &value) in payload.iter().enumerate() {
			let address = base | ((start as usize + i) % PAGE_SIZE);
			memory[address] |= value;
		}
	}

	fn reset(&mut self) {
		self.registers = self.nvm;
		let config = self.nvm[self.control_code_address as usize];
		let fixed = config & 0x0f;
		let selected = config >> 4;
		self.control_code = (fixed & !selected) | (self.pins & selected);
		self.pointers = [0; 3];
	}

	fn read(&mut self, space: MemorySpace, count: usize) -> Vec<u8> {
		let pointer = &mut self.pointers[space_index(space)];
		let start = *pointer;
		*pointer = start.wrapping_add(count as u8);
		let memory = self.memory(space);
		(0..count).map(|i| memory[(start as usize + i) % IMAGE_SIZE]).collect()
	}
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum BusOp {
	Write { address: u8, data: Vec<u8> },
	Read { address: u8, count: usize },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Transaction {
	pub op: BusOp,
	pub acked: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SimulatedBus {
	devices: Vec<SimulatedDevice>,
	journal: Vec<Transaction>,
	settled: Duration,
	short_reads: bool,
	fail_reads: bool,
}

impl SimulatedBus {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_device(mut self, device: SimulatedDevice) -> Self {
		self.devices.push(device);
		self
	}

	pub fn add_device(&mut self, device: SimulatedDevice) {
		self.devices.push(device);
	}

	/// device currently answering to `control_code`
	pub fn device(&self, control_code: u8) -> Option<&SimulatedDevice> {
		self.devices.iter().find(|d| d.control_code == control_code)
	}

	pub fn device_mut(&mut self, control_code: u8) -> Option<&mut SimulatedDevice> {
		self.devices.iter_mut().find(|d| d.control_code == control_code)
	}

	pub fn journal(&self) -> &[Transaction] {
		&self.journal
	}

	pub fn clear_journal(&mut self) {
		self.journal.clear();
	}

	/// all write transactions (acknowledged or not), in order
	pub fn writes(&self) -> Vec<(u8, &[u8])> {
		self.journal.iter().filter_map(|t| match t.op {
			BusOp::Write { address, ref data } => Some((address, &data[..])),
			BusOp::Read { .. } => None,
		}).collect()
	}

	/// total time spent in `settle`
	pub fn settled(&self) -> Duration {
		self.settled
	}

	/// make every read return one byte less than requested
	pub fn set_short_reads(&mut self, short: bool) {
		self.short_reads = short;
	}

	/// make every addressed read fail after the address was acknowledged
	pub fn set_fail_reads(&mut self, fail: bool) {
		self.fail_reads = fail;
	}

	fn target(&mut self, address: u8) -> io::Result<(&mut SimulatedDevice, MemorySpace)> {
		let nack = || io::Error::new(io::ErrorKind::Other, "address not acknowledged");
		let space = space_for_sub_address(address & 0x07).ok_or_else(nack)?;
		let device = self.devices.iter_mut()
			.find(|d| d.control_code == address >> 3)
			.ok_or_else(nack)?;
		if device.erratum_pending {
			device.erratum_pending = false;
			return Err(io::Error::new(io::ErrorKind::Other, "not acknowledged after erase"));
		}
		Ok((device, space))
	}
}

impl Transport for SimulatedBus {
	fn write(&mut self, address: u8, data: &[u8]) -> io::Result<()> {
		let result = self.target(address).map(|(device, space)| device.write(space, data));
		self.journal.push(Transaction {
			op: BusOp::Write { address, data: data.to_vec() },
			acked: result.is_ok(),
		});
		result
	}

	fn read(&mut self, address: u8, count: usize) -> io::Result<Vec<u8>> {
		let short = self.short_reads;
		let fail = self.fail_reads;
		let result = self.target(address).and_then(|(device, space)| {
			if fail {
				return Err(io::Error::new(io::ErrorKind::Other, "read aborted"));
			}
			let mut data = device.read(space, count);
			if short {
				data.pop();
			}
			Ok(data)
		});
		self.journal.push(Transaction {
			op: BusOp::Read { address, count },
			acked: result.is_ok(),
		});
		result
	}

	fn settle(&mut self, duration: Duration) {
		self.settled += duration;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::devices::DeviceTable;

	fn bus() -> SimulatedBus {
		let table = DeviceTable::builtin();
		let device = SimulatedDevice::new(table.lookup("SLG46826").unwrap(), ControlCode::new(1).unwrap());
		SimulatedBus::new().with_device(device)
	}

	#[test]
	fn absent_address_nacks() {
		let mut bus = bus();
		assert!(bus.write(0x08, &[]).is_ok());
		assert!(bus.write(0x10, &[]).is_err());
		assert!(bus.write(0x09, &[]).is_err());
		assert_eq!(bus.journal().len(), 3);
		assert!(!bus.journal()[1].acked);
	}

	#[test]
	fn erase_trigger_sets_erratum() {
		let mut bus = bus();
		bus.device_mut(1).unwrap().memory_mut(MemorySpace::Eeprom)[0x20] = 0xaa;
		// erase EEPROM page 2
		bus.write(0x08, &[0xe3, 0x80 | 0x10 | 2]).unwrap();
		assert_eq!(bus.device(1).unwrap().memory(MemorySpace::Eeprom)[0x20], 0);
		assert!(bus.write(0x08, &[0]).is_err());
		assert!(bus.write(0x08, &[0]).is_ok());
	}

	#[test]
	fn program_only_sets_bits() {
		let mut bus = bus();
		bus.write(0x0b, &[0x10, 0x0f]).unwrap();
		bus.write(0x0b, &[0x10, 0xf0]).unwrap();
		assert_eq!(bus.device(1).unwrap().memory(MemorySpace::Eeprom)[0x10], 0xff);
	}

	#[test]
	fn read_auto_increments() {
		let mut bus = bus();
		bus.device_mut(1).unwrap().memory_mut(MemorySpace::Register)[0x41] = 0x5a;
		bus.write(0x08, &[0x40]).unwrap();
		assert_eq!(bus.read(0x08, 2).unwrap(), vec![0x00, 0x5a]);
	}
}
