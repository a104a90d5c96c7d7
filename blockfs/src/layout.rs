//! Layout constants and the superblock (§3 Data Model, §4.1 Superblock manager).

use crate::error::{FsError, FsResult};
use crate::raw::{as_bytes, as_bytes_mut};
use std::mem::size_of;

/// `BLOCK_NUM` this crate quotes is supplied by the device adapter at mount
/// time (`BlockDevice::block_count`); there is no separate constant for it.
pub const DIRECT_POINTERS: usize = 12;
pub const INDIRECT_POINTERS: usize = 2;
/// Not counting the NUL terminator (§3 Layout constants).
pub const MAX_FILENAME_LEN: usize = 24;
/// `MAX_FILENAME_LEN` + 2: one byte for the terminator, one pad byte so that
/// `sizeof(dir_entry) == 32` (§6.3 of SPEC_FULL.md).
pub const NAME_BUF_LEN: usize = MAX_FILENAME_LEN + 2;
pub const DEFAULT_INODE_COUNT: u32 = 32768;

/// Block 0.
pub const SUPERBLOCK_BLOCK: u32 = 0;
/// Block 1: one bit per inode.
pub const INODE_BITMAP_BLOCK: u32 = 1;
/// Blocks 2..3: one bit per data block.
pub const DATA_BITMAP_START_BLOCK: u32 = 2;
pub const DATA_BITMAP_BLOCKS: u32 = 2;
/// Blocks 4..4+T-1: the inode table.
pub const INODE_TABLE_START_BLOCK: u32 = 4;

/// Distinguishes a formatted `blockfs` volume from garbage or a foreign
/// filesystem on load. spec.md §9 notes the source defines no such field and
/// recommends implementers add one; this resolves that open question.
pub const MAGIC: u32 = 0x424c_4b46; // b"BLKF"
pub const FORMAT_VERSION: u32 = 1;

pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
/// Directories are always `0755` (§3 Inode).
pub const MODE_DIR: u32 = S_IFDIR | 0o755;
/// Regular files are always `0644` (§3 Inode).
pub const MODE_REG: u32 = S_IFREG | 0o644;

pub fn is_dir(mode: u32) -> bool {
	mode & S_IFDIR != 0
}

pub fn is_reg(mode: u32) -> bool {
	mode & S_IFREG != 0
}

fn ceil_div(a: u64, b: u64) -> u64 {
	(a + b - 1) / b
}

/// Persisted at block 0. Every field here is read-only for the remainder of
/// the mount (§5 Concurrency & Resource Model: "the in-memory superblock,
/// initialized once at mount and read-only thereafter").
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
	pub magic: u32,
	pub version: u32,
	pub block_size: u32,
	pub block_count: u32,
	pub inode_count: u32,
	pub data_block_count: u32,
	pub inode_table_blocks: u32,
	pub data_start: u32,
}

impl Superblock {
	/// Computes a fresh layout for a device of `block_size`/`block_count`,
	/// per §4.1 format mode. Does not touch the device.
	pub fn compute(block_size: u32, block_count: u32, inode_count: u32) -> FsResult<Self> {
		let inode_size = size_of::<crate::inode::Inode>() as u64;
		let inode_table_blocks =
			ceil_div(inode_count as u64 * inode_size, block_size as u64) as u32;
		let data_start = INODE_TABLE_START_BLOCK + inode_table_blocks;
		if data_start >= block_count {
			return Err(FsError::NoSpace);
		}
		let data_block_count = block_count - data_start;

		// The inode bitmap is one block: it can address at most 8 * block_size
		// inodes (§4.2).
		let max_inodes = 8u64 * block_size as u64;
		if inode_count as u64 > max_inodes {
			return Err(FsError::NoSpace);
		}
		// The data bitmap is two fixed blocks: it can address at most
		// 16 * block_size data blocks (§4.2).
		let max_data_blocks = 16u64 * block_size as u64;
		if data_block_count as u64 > max_data_blocks {
			return Err(FsError::NoSpace);
		}

		Ok(Self {
			magic: MAGIC,
			version: FORMAT_VERSION,
			block_size,
			block_count,
			inode_count,
			data_block_count,
			inode_table_blocks,
			data_start,
		})
	}

	pub fn from_bytes(buf: &[u8]) -> FsResult<Self> {
		if buf.len() < size_of::<Self>() {
			return Err(FsError::Io(std::io::Error::new(
				std::io::ErrorKind::InvalidData,
				"superblock block too small",
			)));
		}
		let mut sb = Self {
			magic: 0,
			version: 0,
			block_size: 0,
			block_count: 0,
			inode_count: 0,
			data_block_count: 0,
			inode_table_blocks: 0,
			data_start: 0,
		};
		as_bytes_mut(&mut sb).copy_from_slice(&buf[..size_of::<Self>()]);
		if sb.magic != MAGIC {
			return Err(FsError::Io(std::io::Error::new(
				std::io::ErrorKind::InvalidData,
				"bad superblock magic",
			)));
		}
		Ok(sb)
	}

	pub fn to_bytes(&self, buf: &mut [u8]) {
		buf[..size_of::<Self>()].copy_from_slice(as_bytes(self));
	}

	/// Inodes per inode-table block.
	pub fn inodes_per_block(&self) -> u32 {
		self.block_size / size_of::<crate::inode::Inode>() as u32
	}

	/// Directory entries per data block.
	pub fn entries_per_block(&self) -> u32 {
		self.block_size / size_of::<crate::dir::DirEntry>() as u32
	}

	/// Physical block numbers stored per index block.
	pub fn pointers_per_block(&self) -> u32 {
		self.block_size / 4
	}

	/// `(12 + 2 * pointers_per_block) * block_size` (§3 Maximum file size).
	pub fn max_file_size(&self) -> u64 {
		let direct = DIRECT_POINTERS as u64;
		let indirect = INDIRECT_POINTERS as u64 * self.pointers_per_block() as u64;
		(direct + indirect) * self.block_size as u64
	}
}
