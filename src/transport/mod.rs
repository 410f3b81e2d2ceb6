//! Raw I2C access.
//!
//! A transport performs single addressed transactions; it never retries.
//! Zero length writes and reads must still put the address on the bus, so
//! they can be used to probe for devices.

use std::io;
use std::thread;
use std::time::{
	Duration,
	Instant,
};

// OS-specific. for now linux only.
mod linux;
pub mod sim;

pub use self::linux::LinuxI2c;

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

pub trait Transport {
	/// write `data` (0..=256 bytes) to the 7-bit `address`
	fn write(&mut self, address: u8, data: &[u8]) -> io::Result<()>;

	/// read `count` (0..=256) bytes from the 7-bit `address`
	fn read(&mut self, address: u8, count: usize) -> io::Result<Vec<u8>>;

	// block for (at least) `duration` while the device is busy
	fn settle(&mut self, duration: Duration) {
		reliable_sleep(duration);
	}
}

impl<'a, T: ?Sized + Transport> Transport for &'a mut T {
	fn write(&mut self, address: u8, data: &[u8]) -> io::Result<()> {
		T::write(&mut **self, address, data)
	}

	fn read(&mut self, address: u8, count: usize) -> io::Result<Vec<u8>> {
		T::read(&mut **self, address, count)
	}

	fn settle(&mut self, duration: Duration) {
		T::settle(&mut **self, duration)
	}
}

impl<T: ?Sized + Transport> Transport for Box<T> {
	fn write(&mut self, address: u8, data: &[u8]) -> io::Result<()> {
		T::write(&mut **self, address, data)
	}

	fn read(&mut self, address: u8, count: usize) -> io::Result<Vec<u8>> {
		T::read(&mut **self, address, count)
	}

	fn settle(&mut self, duration: Duration) {
		T::settle(&mut **self, duration)
	}
}
