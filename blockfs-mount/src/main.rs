//! `blockfs-mount`: the userspace FUSE host for `blockfs` (§1 "intended to be
//! loaded by a userspace filesystem host"). CLI parsing, logging and the
//! mount/unmount lifecycle live entirely here; none of it leaks into the
//! `blockfs` core.

mod fuse_adapter;

use blockfs::device::FileDevice;
use blockfs::{Filesystem, DEFAULT_INODE_COUNT};
use clap::Parser;
use fuse_adapter::FuseAdapter;
use fuser::MountOption;
use log::{info, warn, LevelFilter};
use std::ffi::CString;
use std::path::PathBuf;
use std::process::exit;

/// Mount a `blockfs` volume at `mountpoint`, backed by `device`.
#[derive(Parser, Debug)]
#[command(name = "blockfs-mount", version, about)]
struct Args {
	/// Path to the backing image or block device.
	device: PathBuf,
	/// Where to attach the FUSE mount.
	mountpoint: PathBuf,

	/// Initialize a fresh volume (§4.1 format mode) instead of loading one.
	#[arg(long)]
	format: bool,
	/// Inode count for a fresh volume. Ignored (with a warning) in load mode.
	#[arg(long, default_value_t = DEFAULT_INODE_COUNT)]
	inode_count: u32,
	/// Block size in bytes for a fresh volume. Ignored (with a warning) in
	/// load mode.
	#[arg(long, default_value_t = 4096)]
	block_size: u32,

	/// Increase logging verbosity; repeatable.
	#[arg(short = 'v', long, action = clap::ArgAction::Count)]
	verbose: u8,
	/// Decrease logging verbosity to errors only.
	#[arg(short = 'q', long)]
	quiet: bool,
	/// Stay attached to the controlling terminal instead of daemonizing.
	#[arg(short = 'f', long)]
	foreground: bool,
}

fn init_logging(args: &Args) {
	let level = if args.quiet {
		LevelFilter::Error
	} else {
		match args.verbose {
			0 => LevelFilter::Info,
			1 => LevelFilter::Debug,
			_ => LevelFilter::Trace,
		}
	};
	env_logger::Builder::new().filter_level(level).parse_default_env().init();
}

/// A minimal fork/setsid daemonization, in the spirit of the traditional
/// libfuse `-f` flag (run in the foreground) vs. its default (detach).
/// `blockfs_utils`'s disk-size probing already reaches for raw `libc`, so
/// this keeps the same idiom rather than pulling in a daemonization crate.
fn daemonize() -> std::io::Result<()> {
	unsafe {
		match libc::fork() {
			-1 => return Err(std::io::Error::last_os_error()),
			0 => {}
			_ => exit(0),
		}
		if libc::setsid() == -1 {
			return Err(std::io::Error::last_os_error());
		}
		let dev_null = CString::new("/dev/null").unwrap();
		let fd = libc::open(dev_null.as_ptr(), libc::O_RDWR);
		if fd >= 0 {
			libc::dup2(fd, 0);
			libc::dup2(fd, 1);
			libc::dup2(fd, 2);
			if fd > 2 {
				libc::close(fd);
			}
		}
	}
	Ok(())
}

fn run(args: Args) -> std::io::Result<()> {
	if !args.format && (args.inode_count != DEFAULT_INODE_COUNT || args.block_size != 4096) {
		warn!("--inode-count/--block-size are ignored in load mode; the on-disk superblock is authoritative");
	}

	let device = FileDevice::open(&args.device, args.block_size)
		.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
	let fs = Filesystem::mount(device, args.format, args.inode_count)
		.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
	info!(
		"mounted {} at {} ({})",
		args.device.display(),
		args.mountpoint.display(),
		if args.format { "formatted" } else { "loaded" }
	);

	if !args.foreground {
		daemonize()?;
	}

	let options = vec![
		MountOption::FSName("blockfs".to_string()),
		MountOption::AutoUnmount,
		MountOption::DefaultPermissions,
	];
	fuser::mount2(FuseAdapter::new(fs), &args.mountpoint, &options)
}

fn main() {
	let args = Args::parse();
	init_logging(&args);
	if let Err(e) = run(args) {
		eprintln!("blockfs-mount: {e}");
		exit(1);
	}
}
