#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

use std::fs;
use std::io::{
	self,
	Write,
};
use std::path::Path;
use std::process::exit;
use std::time::Duration;

use greenpak_flash::{
	AResult,
	ControlCode,
	DeviceTable,
	Greenpak,
	MemorySpace,
	Timing,
	device_address,
	with_context,
};
use greenpak_flash::memory::PageState;
use greenpak_flash::transport::LinuxI2c;

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid paramater {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_param_or<T>(matches: &clap::ArgMatches, name: &str, default: T) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	if matches.is_present(name) {
		get_param(matches, name)
	} else {
		Ok(default)
	}
}

fn get_delay(matches: &clap::ArgMatches, name: &str, default: Duration) -> AResult<Duration> {
	if matches.is_present(name) {
		Ok(Duration::from_millis(get_param::<u64>(matches, name)?))
	} else {
		Ok(default)
	}
}

fn parse_hex_byte(s: &str) -> AResult<u8> {
	let digits = s.trim_start_matches("0x").trim_start_matches("0X");
	with_context!(("invalid hex byte {:?}", s), {
		Ok(u8::from_str_radix(digits, 16)?)
	})
}

fn device_table(matches: &clap::ArgMatches) -> AResult<DeviceTable> {
	let mut table = DeviceTable::builtin();
	if let Some(dir) = matches.value_of("defaults") {
		table.load_default_images(Path::new(dir))?;
	}
	Ok(table)
}

fn open_device(matches: &clap::ArgMatches) -> AResult<Greenpak<LinuxI2c>> {
	let table = device_table(matches)?;
	let model = matches.value_of("device").unwrap_or("SLG46826");
	let device = table.lookup(model)?.clone();
	let control_code = ControlCode::new(get_param_or(matches, "control_code", 1u8)?)?;

	let default = Timing::default();
	let timing = Timing {
		erase: get_delay(matches, "erase_delay", default.erase)?,
		program: get_delay(matches, "program_delay", default.program)?,
		reset: get_delay(matches, "reset_delay", default.reset)?,
	};

	let bus = matches.value_of("bus").unwrap_or("/dev/i2c-1");
	let transport = LinuxI2c::open(bus)?;
	debug!("Using {} on {} at control code {}", device.name(), bus, control_code);

	Ok(Greenpak::with_timing(transport, device, control_code, timing))
}

fn hex_dump(start: usize, data: &[u8]) {
	for (i, b) in data.iter().enumerate() {
		let address = start + i;
		if 0 == i || 0 == address % 16 {
			if 0 != i {
				println!();
			}
			print!("{:02x}:", address);
			for _ in 0..address % 16 {
				print!("   ");
			}
		} else if 0 == address % 8 {
			print!(" ");
		}
		print!(" {:02x}", b);
	}
	println!();
}

fn report_pages(space: MemorySpace, pages: &[(u8, PageState)]) {
	for &(page, state) in pages {
		let what = match state {
			PageState::Clean => "unchanged",
			PageState::Erased => "erased",
			PageState::Verified => "programmed",
			PageState::Skipped => "skipped (read only)",
		};
		info!("{}/{:02}: {}", space, page, what);
	}
}

fn list_models(matches: &clap::ArgMatches) -> AResult<()> {
	let table = device_table(matches)?;
	for name in table.names() {
		let d = table.lookup(name)?;
		println!(
			"{}: read only NVM pages {:?}, control code byte 0x{:02x}, default image {}",
			d.name(),
			d.read_only_nvm_pages(),
			d.control_code_address(),
			if d.default_image().is_some() { "loaded" } else { "missing" },
		);
	}
	Ok(())
}

fn scan(matches: &clap::ArgMatches) -> AResult<()> {
	let mut gp = open_device(matches)?;
	let found = gp.scan_devices();
	if found.is_empty() {
		warn!("No GreenPAK devices found");
	}
	for cc in found {
		println!("control code {} (I2C 0x{:02x})", cc, device_address(MemorySpace::Register, cc));
	}
	Ok(())
}

fn read(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<()> {
	let space: MemorySpace = get_param(sub_m, "SPACE")?;
	let start: usize = get_param_or(sub_m, "START", 0)?;
	let count: usize = get_param_or(sub_m, "COUNT", 256 - start.min(256))?;

	let mut gp = open_device(matches)?;
	let data = gp.read(space, start, count)?;

	match sub_m.value_of("output") {
		Some(path) => with_context!(("write {}", path), {
			fs::write(path, &data)?;
			Ok(())
		})?,
		None => hex_dump(start, &data),
	}
	Ok(())
}

fn write_register(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<()> {
	let start: usize = get_param(sub_m, "START")?;
	let data = match sub_m.values_of("DATA") {
		Some(values) => values.map(parse_hex_byte).collect::<AResult<Vec<u8>>>()?,
		None => bail!("missing parameter DATA"),
	};

	let mut gp = open_device(matches)?;
	gp.write_register(start, &data)?;
	Ok(())
}

fn program(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<()> {
	let space: MemorySpace = get_param(sub_m, "SPACE")?;
	let page: u8 = get_param_or(sub_m, "page", 0)?;
	let file = match sub_m.value_of("FILE") {
		Some(f) => f,
		None => bail!("missing parameter FILE"),
	};
	let image = with_context!(("read {}", file), {
		Ok(fs::read(file)?)
	})?;
	ensure!(!image.is_empty() && image.len() % 16 == 0, "image {} has {} bytes, need a multiple of 16", file, image.len());

	let mut gp = open_device(matches)?;
	let pages = match space {
		MemorySpace::Nvm => gp.program_nvm(page, &image)?,
		MemorySpace::Eeprom => gp.program_eeprom(page, &image)?,
		MemorySpace::Register => bail!("registers are volatile, use write_register"),
	};
	report_pages(space, &pages);

	if space == MemorySpace::Nvm && sub_m.is_present("reset") {
		gp.reset()?;
	}
	Ok(())
}

fn reset(matches: &clap::ArgMatches) -> AResult<()> {
	open_device(matches)?.reset()?;
	Ok(())
}

fn set_control_code(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<()> {
	let spec = match sub_m.value_of("SPEC") {
		Some(s) => s,
		None => bail!("missing parameter SPEC"),
	};
	let mut gp = open_device(matches)?;
	let pages = gp.program_control_code(spec)?;
	report_pages(MemorySpace::Nvm, &pages);
	warn!("Other configuration in the control code page was reset to factory defaults; reprogram the full configuration");
	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg bus: -b --bus +takes_value "I2C bus device (default: /dev/i2c-1)")
		(@arg device: -d --device +takes_value "GreenPAK model (default: SLG46826)")
		(@arg control_code: -c --("control-code") +takes_value "device control code 0..15 (default: 1)")
		(@arg defaults: --defaults +takes_value "directory with <MODEL>_default.bin factory images")
		(@arg erase_delay: --("erase-delay") +takes_value "page erase delay in ms (default: 25)")
		(@arg program_delay: --("program-delay") +takes_value "page program delay in ms (default: 25)")
		(@arg reset_delay: --("reset-delay") +takes_value "reset settle delay in ms (default: 100)")
		(@subcommand models =>
			(about: "list supported GreenPAK models")
		)
		(@subcommand scan =>
			(about: "list control codes of GreenPAK devices on the bus")
		)
		(@subcommand read =>
			(about: "read memory (hex dump, or raw bytes with --output)")
			(@arg output: -o --output +takes_value "write raw bytes to file")
			(@arg SPACE: +required "memory space (register, nvm, eeprom)")
			(@arg START: "start address (default: 0)")
			(@arg COUNT: "number of bytes (default: up to end of memory)")
		)
		(@subcommand write_register =>
			(about: "write bytes to the (volatile) registers")
			(@arg START: +required "start address")
			(@arg DATA: +required +multiple "bytes to write (hex)")
		)
		(@subcommand program =>
			(about: "program NVM or EEPROM pages from a raw image file")
			(@arg page: -p --page +takes_value "first page to program (default: 0)")
			(@arg reset: -r --reset "reset device after programming NVM")
			(@arg SPACE: +required "memory space (nvm, eeprom)")
			(@arg FILE: +required "raw image (multiple of 16 bytes)")
		)
		(@subcommand reset =>
			(about: "reload NVM configuration and restart the device")
		)
		(@subcommand set_control_code =>
			(about: "program the stored control code configuration (needs --defaults)")
			(@arg SPEC: +required "4 chars of 0, 1 or X, MSB first (X: from external pin)")
		)
	).get_matches();

	match matches.subcommand() {
		("models", _) => {
			list_models(&matches)
		}
		("scan", _) => {
			scan(&matches)
		}
		("read", Some(sub_m)) => {
			read(&matches, sub_m)
		}
		("write_register", Some(sub_m)) => {
			write_register(&matches, sub_m)
		}
		("program", Some(sub_m)) => {
			program(&matches, sub_m)
		}
		("reset", _) => {
			reset(&matches)
		}
		("set_control_code", Some(sub_m)) => {
			set_control_code(&matches, sub_m)
		}
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		io::stderr().flush().ok();
		exit(1);
	}
}
