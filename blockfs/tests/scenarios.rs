//! End-to-end scenarios exercising `Filesystem` through its public API only,
//! the way a FUSE host would call it.

use blockfs::device::MemDevice;
use blockfs::{FsError, Filesystem};

fn mounted(block_size: u32, block_count: u32, inode_count: u32) -> Filesystem<MemDevice> {
	let dev = MemDevice::new(block_size, block_count);
	Filesystem::mount(dev, true, inode_count).unwrap()
}

#[test]
fn format_then_root_is_empty() {
	let mut fs = mounted(512, 8192, 64);
	let entries = fs.readdir("/").unwrap();
	assert_eq!(entries, vec![(".".to_string(), 0), ("..".to_string(), 0)]);
	let attr = fs.getattr("/").unwrap();
	assert_eq!(attr.size, 0);
	assert!(attr.mode & 0o040000 != 0);
}

#[test]
fn create_write_read() {
	let mut fs = mounted(512, 8192, 64);
	fs.mknod("/a").unwrap();
	assert_eq!(fs.write("/a", b"hello", 0, false).unwrap(), 5);
	let mut buf = [0u8; 5];
	assert_eq!(fs.read("/a", &mut buf, 0).unwrap(), 5);
	assert_eq!(&buf, b"hello");
	assert_eq!(fs.getattr("/a").unwrap().size, 5);
}

#[test]
fn nested_directories() {
	let mut fs = mounted(512, 8192, 64);
	fs.mkdir("/d").unwrap();
	fs.mknod("/d/f").unwrap();
	let entries = fs.readdir("/d").unwrap();
	let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
	assert_eq!(names, vec![".", "..", "f"]);
	assert!(fs.getattr("/d/f").unwrap().mode & 0o100000 != 0);
}

#[test]
fn large_file_with_indirection_costs_exactly_two_blocks() {
	let mut fs = mounted(512, 8192, 64);
	fs.mknod("/big").unwrap();

	let ppb = 512 / 4;
	let last_slot_offset = (12 + ppb - 1) as u64 * 512;
	let before = fs.statfs().unwrap();

	let payload = vec![0xabu8; 512];
	fs.write("/big", &payload, last_slot_offset, false).unwrap();

	let mut back = vec![0u8; 512];
	fs.read("/big", &mut back, last_slot_offset).unwrap();
	assert_eq!(back, payload);

	let after = fs.statfs().unwrap();
	assert_eq!(before.bfree - after.bfree, 2);
}

#[test]
fn rename_across_directories() {
	let mut fs = mounted(512, 8192, 64);
	fs.mkdir("/x").unwrap();
	fs.mkdir("/y").unwrap();
	fs.mknod("/x/f").unwrap();
	fs.write("/x/f", b"abc", 0, false).unwrap();
	fs.rename("/x/f", "/y/g").unwrap();

	let x_entries = fs.readdir("/x").unwrap();
	assert!(!x_entries.iter().any(|(n, _)| n == "f"));
	let mut buf = [0u8; 3];
	fs.read("/y/g", &mut buf, 0).unwrap();
	assert_eq!(&buf, b"abc");
}

#[test]
fn delete_reclaims_exactly_the_blocks_written() {
	let mut fs = mounted(512, 8192, 64);
	fs.mknod("/z").unwrap();
	let blob = vec![0x5au8; 512 * 10];
	fs.write("/z", &blob, 0, false).unwrap();

	let before = fs.statfs().unwrap();
	fs.unlink("/z").unwrap();
	let after = fs.statfs().unwrap();
	assert_eq!(after.bfree, before.bfree + 10);
}

#[test]
fn writing_past_max_file_size_is_efbig() {
	let mut fs = mounted(512, 8192, 64);
	fs.mknod("/a").unwrap();
	let max = fs.getattr("/a").unwrap();
	let _ = max;
	// (12 + 2 * 128) * 512 = 137216 for block_size = 512.
	let max_size = (12 + 2 * (512 / 4)) as u64 * 512;
	assert!(matches!(fs.write("/a", &vec![0u8; 1], max_size, false), Err(FsError::TooBig)));
}

#[test]
fn writing_exactly_max_file_size_succeeds() {
	let mut fs = mounted(512, 8192, 64);
	fs.mknod("/a").unwrap();
	let max_size = (12 + 2 * (512 / 4)) as u64 * 512;
	let buf = vec![0x11u8; max_size as usize];
	assert_eq!(fs.write("/a", &buf, 0, false).unwrap(), max_size as usize);
}

#[test]
fn reading_past_eof_returns_zero() {
	let mut fs = mounted(512, 8192, 64);
	fs.mknod("/a").unwrap();
	fs.write("/a", b"x", 0, false).unwrap();
	let mut buf = [0u8; 16];
	assert_eq!(fs.read("/a", &mut buf, 100).unwrap(), 0);
}

#[test]
fn reading_a_hole_returns_zeroes() {
	let mut fs = mounted(512, 8192, 64);
	fs.mknod("/a").unwrap();
	fs.truncate("/a", 4096).unwrap();
	let mut buf = [0xffu8; 512];
	let n = fs.read("/a", &mut buf, 0).unwrap();
	assert_eq!(n, 512);
	assert!(buf.iter().all(|&b| b == 0));
}

#[test]
fn allocating_past_inode_count_is_nospace() {
	let mut fs = mounted(512, 8192, 4);
	// inode 0 is the root; 3 more inodes are available.
	fs.mknod("/a").unwrap();
	fs.mknod("/b").unwrap();
	fs.mknod("/c").unwrap();
	assert!(matches!(fs.mknod("/d"), Err(FsError::NoSpace)));
}

#[test]
fn truncate_is_idempotent() {
	let mut fs = mounted(512, 8192, 64);
	fs.mknod("/a").unwrap();
	fs.write("/a", &vec![1u8; 2000], 0, false).unwrap();
	fs.truncate("/a", 100).unwrap();
	let after_first = fs.getattr("/a").unwrap();
	fs.truncate("/a", 100).unwrap();
	let after_second = fs.getattr("/a").unwrap();
	assert_eq!(after_first.size, after_second.size);
	assert_eq!(after_first.blocks, after_second.blocks);
}

#[test]
fn append_writes_at_current_size() {
	let mut fs = mounted(512, 8192, 64);
	fs.mknod("/a").unwrap();
	fs.write("/a", b"abc", 0, false).unwrap();
	fs.write("/a", b"def", 0, true).unwrap();
	let mut buf = [0u8; 6];
	fs.read("/a", &mut buf, 0).unwrap();
	assert_eq!(&buf, b"abcdef");
}

#[test]
fn a_name_at_the_limit_is_accepted_one_more_is_rejected() {
	let mut fs = mounted(512, 8192, 64);
	let max_name = "a".repeat(blockfs::MAX_FILENAME_LEN);
	fs.mknod(&format!("/{max_name}")).unwrap();

	let too_long = "a".repeat(blockfs::MAX_FILENAME_LEN + 1);
	assert!(matches!(
		fs.mknod(&format!("/{too_long}")),
		Err(FsError::NameTooLong)
	));
}

#[test]
fn rename_round_trip_restores_original_state() {
	let mut fs = mounted(512, 8192, 64);
	fs.mknod("/a").unwrap();
	fs.rename("/a", "/b").unwrap();
	fs.rename("/b", "/a").unwrap();
	assert!(fs.getattr("/a").is_ok());
	assert_eq!(fs.readdir("/").unwrap().len(), 3);
}
