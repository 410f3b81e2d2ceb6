#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

#[macro_export]
macro_rules! with_context {
	(( $fmt:tt $($t:tt)* ), $e:expr) => {{
		use failure::Error;

		match (|| { $e })() {
			Ok(v) => Ok(v),
			Err(e) => {
				let e: Error = e;
				let msg = format!(concat!($fmt, ": {}") $($t)*, e);
				Err(Error::from(e.context(msg)))
			}
		}
	}};

	($msg:expr, $e:expr) => {
		$crate::with_context!(("{}", $msg), $e)
	};
}

pub type AResult<T> = std::result::Result<T, failure::Error>;

pub mod address;
pub mod devices;
pub mod driver;
pub mod error;
pub mod memory;
pub mod transport;

pub use self::address::{
	ControlCode,
	MemorySpace,
	device_address,
};

pub use self::devices::{
	DeviceDescriptor,
	DeviceTable,
};

pub use self::driver::{
	ControlCodeSpec,
	Greenpak,
};

pub use self::error::{
	Error,
	Result,
};

pub use self::memory::Timing;

pub use self::transport::Transport;
