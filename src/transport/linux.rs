use std::fs;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{
	Path,
	PathBuf,
};

use libc::{
	c_ulong,
	ioctl,
};

use super::Transport;

/* from <linux/i2c.h> and <linux/i2c-dev.h> */
const I2C_RDWR: c_ulong = 0x0707;
const I2C_M_RD: u16 = 0x0001;
// largest transfer the GreenPAK protocol needs: address byte + 256 data bytes
const MAX_TRANSFER: usize = 257;

#[repr(C)]
struct I2cMsg {
	addr: u16,
	flags: u16,
	len: u16,
	buf: *mut u8,
}

#[repr(C)]
struct I2cRdwrIoctlData {
	msgs: *mut I2cMsg,
	nmsgs: u32,
}

/// I2C bus adapter using the Linux `i2c-dev` interface (`/dev/i2c-N`).
///
/// Every call is exactly one `I2C_RDWR` message with START and STOP, so
/// zero length transfers are real bus transactions.
#[derive(Debug)]
pub struct LinuxI2c {
	file: fs::File,
	path: PathBuf,
}

impl LinuxI2c {
	pub fn open<P: AsRef<Path>>(path: P) -> crate::AResult<Self> {
		let path = path.as_ref().to_path_buf();
		with_context!(("open I2C bus {}", path.display()), {
			let file = fs::OpenOptions::new()
				.read(true)
				.write(true)
				.open(&path)?;
			Ok(LinuxI2c { file, path: path.clone() })
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn transfer(&mut self, address: u8, flags: u16, buf: &mut [u8]) -> io::Result<()> {
		if address > 0x7f {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "I2C address must be 7-bit"));
		}
		if buf.len() > MAX_TRANSFER {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "I2C transfer too long"));
		}
		let mut msg = I2cMsg {
			addr: address as u16,
			flags,
			len: buf.len() as u16,
			buf: buf.as_mut_ptr(),
		};
		let mut data = I2cRdwrIoctlData {
			msgs: &mut msg,
			nmsgs: 1,
		};
		// returns the number of messages transferred
		let res = unsafe { ioctl(self.file.as_raw_fd(), I2C_RDWR as _, &mut data as *mut I2cRdwrIoctlData) };
		match res {
			1 => Ok(()),
			r if r < 0 => Err(io::Error::last_os_error()),
			_ => Err(io::Error::new(io::ErrorKind::Other, "I2C message not transferred")),
		}
	}
}

impl Transport for LinuxI2c {
	fn write(&mut self, address: u8, data: &[u8]) -> io::Result<()> {
		// the kernel interface wants a mutable buffer even for writes
		let mut buf = data.to_vec();
		self.transfer(address, 0, &mut buf)
	}

	fn read(&mut self, address: u8, count: usize) -> io::Result<Vec<u8>> {
		if count > MAX_TRANSFER {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "I2C transfer too long"));
		}
		let mut buf = vec![0u8; count];
		self.transfer(address, I2C_M_RD, &mut buf)?;
		Ok(buf)
	}
}
