//! Exercises `FileDevice` against a real scratch file, rather than
//! `MemDevice`: format, close, reopen, load, and confirm nothing about the
//! on-disk state depended on the formatting `Filesystem` instance staying
//! alive (§8 "Mount(format) then mount(load) preserves the root inode and
//! superblock exactly").

use blockfs::device::FileDevice;
use blockfs::Filesystem;
use std::fs::OpenOptions;

const BLOCK_SIZE: u32 = 512;
const BLOCK_COUNT: u32 = 8192;
const INODE_COUNT: u32 = 64;

fn sized_scratch_file() -> (tempfile::TempDir, std::path::PathBuf) {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("disk.img");
	let file = OpenOptions::new()
		.read(true)
		.write(true)
		.create(true)
		.open(&path)
		.unwrap();
	file.set_len(BLOCK_SIZE as u64 * BLOCK_COUNT as u64).unwrap();
	(dir, path)
}

#[test]
fn format_then_reopen_preserves_root_and_superblock() {
	let (_dir, path) = sized_scratch_file();

	{
		let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
		let device = FileDevice::from_file(file, BLOCK_SIZE, BLOCK_COUNT);
		let mut fs = Filesystem::mount(device, true, INODE_COUNT).unwrap();
		fs.mkdir("/d").unwrap();
		fs.mknod("/d/f").unwrap();
		fs.write("/d/f", b"hello", 0, false).unwrap();
		// Dropping `fs` here simulates an unmount: nothing is retained
		// in memory across the boundary (§5).
	}

	{
		let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
		let device = FileDevice::from_file(file, BLOCK_SIZE, BLOCK_COUNT);
		let mut fs = Filesystem::mount(device, false, INODE_COUNT).unwrap();
		let entries = fs.readdir("/").unwrap();
		assert!(entries.iter().any(|(n, _)| n == "d"));

		let mut buf = [0u8; 5];
		assert_eq!(fs.read("/d/f", &mut buf, 0).unwrap(), 5);
		assert_eq!(&buf, b"hello");
	}
}

#[test]
fn writes_survive_a_reopen_at_an_offset_spanning_blocks() {
	let (_dir, path) = sized_scratch_file();

	{
		let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
		let device = FileDevice::from_file(file, BLOCK_SIZE, BLOCK_COUNT);
		let mut fs = Filesystem::mount(device, true, INODE_COUNT).unwrap();
		fs.mknod("/big").unwrap();
		let payload = vec![0x42u8; BLOCK_SIZE as usize * 3];
		fs.write("/big", &payload, BLOCK_SIZE as u64 / 2, false).unwrap();
	}

	{
		let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
		let device = FileDevice::from_file(file, BLOCK_SIZE, BLOCK_COUNT);
		let mut fs = Filesystem::mount(device, false, INODE_COUNT).unwrap();
		let mut buf = vec![0u8; BLOCK_SIZE as usize * 3];
		let n = fs.read("/big", &mut buf, BLOCK_SIZE as u64 / 2).unwrap();
		assert_eq!(n, buf.len());
		assert!(buf.iter().all(|&b| b == 0x42));
	}
}
