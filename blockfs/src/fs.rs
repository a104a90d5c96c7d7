//! The top-level mount handle (§4.1, §6 "Mount entry point"): owns the block
//! device and the in-memory superblock, and is the facade the FUSE host
//! binds against.

use crate::device::BlockDevice;
use crate::error::FsResult;
use crate::inode::{self, Inode};
use crate::layout::{Superblock, INODE_BITMAP_BLOCK, SUPERBLOCK_BLOCK};
use crate::ops::{self, FileAttr, StatFs};
use blockfs_utils::util::now_secs;
use log::info;

/// A mounted filesystem instance. §5: "exactly one active filesystem
/// instance per block device is assumed" — owning `D` by value enforces
/// that at the type level.
pub struct Filesystem<D: BlockDevice> {
	device: D,
	sb: Superblock,
}

impl<D: BlockDevice> Filesystem<D> {
	/// Mounts `device`. `format = true` initializes a fresh volume (§4.1
	/// format mode); `format = false` loads the superblock already on disk.
	pub fn mount(mut device: D, format: bool, inode_count: u32) -> FsResult<Self> {
		info!("fs_mount is called, format:{format}");
		let sb = if format {
			Self::format(&mut device, inode_count)?
		} else {
			Self::load(&mut device)?
		};
		Ok(Self { device, sb })
	}

	fn format(device: &mut D, inode_count: u32) -> FsResult<Superblock> {
		let sb = Superblock::compute(device.block_size(), device.block_count(), inode_count)?;

		let zero = vec![0u8; sb.block_size as usize];
		for block in INODE_BITMAP_BLOCK..sb.data_start {
			device.write_block(block, &zero)?;
		}

		let mut sb_buf = vec![0u8; sb.block_size as usize];
		sb.to_bytes(&mut sb_buf);
		device.write_block(SUPERBLOCK_BLOCK, &sb_buf)?;

		// Reserve inode 0 as the root directory (§3 Root invariant).
		let root_ino = crate::bitmap::alloc_inode(device, &sb)?;
		debug_assert_eq!(root_ino, 0);
		inode::write_inode(device, &sb, root_ino, &Inode::new_dir(now_secs()))?;

		Ok(sb)
	}

	fn load(device: &mut D) -> FsResult<Superblock> {
		let mut buf = vec![0u8; device.block_size() as usize];
		device.read_block(SUPERBLOCK_BLOCK, &mut buf)?;
		Superblock::from_bytes(&buf)
	}

	pub fn superblock(&self) -> &Superblock {
		&self.sb
	}

	/// Unmounts, handing the backing device back to the caller.
	pub fn into_device(self) -> D {
		self.device
	}

	pub fn getattr(&mut self, path: &str) -> FsResult<FileAttr> {
		ops::getattr(&mut self.device, &self.sb, path)
	}

	pub fn readdir(&mut self, path: &str) -> FsResult<Vec<(String, u32)>> {
		ops::readdir(&mut self.device, &self.sb, path)
	}

	pub fn mknod(&mut self, path: &str) -> FsResult<u32> {
		ops::mknod(&mut self.device, &self.sb, path)
	}

	pub fn mkdir(&mut self, path: &str) -> FsResult<u32> {
		ops::mkdir(&mut self.device, &self.sb, path)
	}

	pub fn unlink(&mut self, path: &str) -> FsResult<()> {
		ops::unlink(&mut self.device, &self.sb, path)
	}

	pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
		ops::rmdir(&mut self.device, &self.sb, path)
	}

	pub fn rename(&mut self, old: &str, new: &str) -> FsResult<()> {
		ops::rename(&mut self.device, &self.sb, old, new)
	}

	pub fn read(&mut self, path: &str, buf: &mut [u8], offset: u64) -> FsResult<usize> {
		ops::read(&mut self.device, &self.sb, path, buf, offset)
	}

	pub fn write(&mut self, path: &str, buf: &[u8], offset: u64, append: bool) -> FsResult<usize> {
		ops::write(&mut self.device, &self.sb, path, buf, offset, append)
	}

	pub fn truncate(&mut self, path: &str, new_size: u64) -> FsResult<()> {
		ops::truncate(&mut self.device, &self.sb, path, new_size)
	}

	pub fn utimens(&mut self, path: &str, atime: u32, mtime: u32) -> FsResult<()> {
		ops::utimens(&mut self.device, &self.sb, path, atime, mtime)
	}

	pub fn statfs(&mut self) -> FsResult<StatFs> {
		ops::statfs(&mut self.device, &self.sb)
	}

	/// No-ops returning success, matching FUSE-style signatures (§6).
	pub fn open(&mut self, _path: &str) -> FsResult<()> {
		Ok(())
	}

	pub fn release(&mut self, _path: &str) -> FsResult<()> {
		Ok(())
	}

	pub fn opendir(&mut self, _path: &str) -> FsResult<()> {
		Ok(())
	}

	pub fn releasedir(&mut self, _path: &str) -> FsResult<()> {
		Ok(())
	}
}

/// Matches `fs_finalize(status)`: runs cleanup and returns `status`
/// unchanged on success (§6). There is no cleanup to run — the core never
/// retains a cross-operation buffer (§5) — so this only exists to give the
/// host a call symmetrical with `fs_mount`.
pub fn finalize(status: i32) -> i32 {
	status
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::MemDevice;
	use crate::error::FsError;

	fn mounted() -> Filesystem<MemDevice> {
		let dev = MemDevice::new(512, 8192);
		Filesystem::mount(dev, true, 64).unwrap()
	}

	#[test]
	fn format_leaves_an_empty_root() {
		let mut fs = mounted();
		let entries = fs.readdir("/").unwrap();
		assert_eq!(entries, vec![(".".to_string(), 0), ("..".to_string(), 0)]);
		let attr = fs.getattr("/").unwrap();
		assert!(layout_is_dir(attr.mode));
		assert_eq!(attr.size, 0);
	}

	fn layout_is_dir(mode: u32) -> bool {
		crate::layout::is_dir(mode)
	}

	#[test]
	fn create_write_read_round_trips() {
		let mut fs = mounted();
		fs.mknod("/a").unwrap();
		let n = fs.write("/a", b"hello", 0, false).unwrap();
		assert_eq!(n, 5);
		let mut buf = [0u8; 5];
		let read = fs.read("/a", &mut buf, 0).unwrap();
		assert_eq!(read, 5);
		assert_eq!(&buf, b"hello");
		assert_eq!(fs.getattr("/a").unwrap().size, 5);
	}

	#[test]
	fn mount_load_preserves_superblock_and_root() {
		let dev = MemDevice::new(512, 8192);
		let fs1 = Filesystem::mount(dev, true, 64).unwrap();
		let sb1 = *fs1.superblock();
		let dev = fs1.into_device();

		let mut fs2 = Filesystem::mount(dev, false, 64).unwrap();
		let sb2 = *fs2.superblock();
		assert_eq!(sb1.magic, sb2.magic);
		assert_eq!(sb1.data_start, sb2.data_start);
		assert_eq!(
			fs2.readdir("/").unwrap(),
			vec![(".".to_string(), 0), ("..".to_string(), 0)]
		);
	}

	#[test]
	fn nested_directories_resolve() {
		let mut fs = mounted();
		fs.mkdir("/d").unwrap();
		fs.mknod("/d/f").unwrap();
		let entries = fs.readdir("/d").unwrap();
		assert!(entries.iter().any(|(n, _)| n == "f"));
		assert!(crate::layout::is_reg(fs.getattr("/d/f").unwrap().mode));
	}

	#[test]
	fn unlink_then_mknod_restores_free_counts() {
		let mut fs = mounted();
		// Prime root with an allocated directory block first: a fresh root
		// has size 0 and no data block yet, so the *first* mknod/unlink pair
		// would itself allocate root's first directory block and never free
		// it (dir::remove only tombstones, §9 "shrinking is left as an
		// optional optimization"). Snapshot "before" only once root already
		// owns a block, matching tests/scenarios.rs's
		// `delete_reclaims_exactly_the_blocks_written`.
		fs.mknod("/warm").unwrap();
		fs.unlink("/warm").unwrap();

		let before = fs.statfs().unwrap();
		fs.mknod("/a").unwrap();
		fs.unlink("/a").unwrap();
		let after = fs.statfs().unwrap();
		assert_eq!(before.ffree, after.ffree);
		assert_eq!(before.bfree, after.bfree);
	}

	#[test]
	fn rename_across_directories() {
		let mut fs = mounted();
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
	fn mknod_duplicate_name_is_exists() {
		let mut fs = mounted();
		fs.mknod("/a").unwrap();
		assert!(matches!(fs.mknod("/a"), Err(FsError::Exists)));
	}

	#[test]
	fn rmdir_nonempty_is_not_empty() {
		let mut fs = mounted();
		fs.mkdir("/d").unwrap();
		fs.mknod("/d/f").unwrap();
		assert!(matches!(fs.rmdir("/d"), Err(FsError::NotEmpty)));
	}
}
