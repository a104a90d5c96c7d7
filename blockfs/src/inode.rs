//! The inode store (§4.3): fixed-size inodes packed contiguously into the
//! inode table, and the read-modify-write accessors for them.

use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::layout::{self, Superblock, DIRECT_POINTERS, INDIRECT_POINTERS, INODE_TABLE_START_BLOCK};
use crate::raw::{as_bytes, as_bytes_mut};
use std::io;
use std::mem::size_of;

/// Power-of-two sized so `BLOCK_SIZE % sizeof(Inode) == 0` for any reasonable
/// block size (§3: "fixed size, power-of-two friendly"). The struct itself
/// only needs 76 bytes; the remainder is reserved padding.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Inode {
	pub size: u32,
	pub mode: u32,
	pub atime: u32,
	pub mtime: u32,
	pub ctime: u32,
	pub direct: [u32; DIRECT_POINTERS],
	pub indirect: [u32; INDIRECT_POINTERS],
	_reserved: [u8; 128 - (5 * 4 + DIRECT_POINTERS * 4 + INDIRECT_POINTERS * 4)],
}

const _: () = assert!(size_of::<Inode>() == 128);

impl Inode {
	fn zeroed() -> Self {
		Self {
			size: 0,
			mode: 0,
			atime: 0,
			mtime: 0,
			ctime: 0,
			direct: [0; DIRECT_POINTERS],
			indirect: [0; INDIRECT_POINTERS],
			_reserved: [0; 128 - (5 * 4 + DIRECT_POINTERS * 4 + INDIRECT_POINTERS * 4)],
		}
	}

	/// A freshly `alloc_inode`-ed directory (§4.7 `mkdir`/format).
	pub fn new_dir(now: u32) -> Self {
		let mut n = Self::zeroed();
		n.mode = layout::MODE_DIR;
		n.touch(true, true, true, now);
		n
	}

	/// A freshly `alloc_inode`-ed regular file (§4.7 `mknod`).
	pub fn new_reg(now: u32) -> Self {
		let mut n = Self::zeroed();
		n.mode = layout::MODE_REG;
		n.touch(true, true, true, now);
		n
	}

	pub fn is_dir(&self) -> bool {
		layout::is_dir(self.mode)
	}

	pub fn is_reg(&self) -> bool {
		layout::is_reg(self.mode)
	}

	/// Updates the requested timestamp fields to `now`, matching the
	/// original `update_timestamp(inode, access, modify, change)` helper
	/// (every §4.7 operation needs exactly one fixed combination of these
	/// three flags).
	pub fn touch(&mut self, access: bool, modify: bool, change: bool, now: u32) {
		if access {
			self.atime = now;
		}
		if modify {
			self.mtime = now;
		}
		if change {
			self.ctime = now;
		}
	}

	fn from_bytes(buf: &[u8]) -> Self {
		let mut inode = Self::zeroed();
		as_bytes_mut(&mut inode).copy_from_slice(buf);
		inode
	}

	fn write_into(&self, buf: &mut [u8]) {
		buf.copy_from_slice(as_bytes(self));
	}
}

fn locate(sb: &Superblock, n: u32) -> FsResult<(u32, usize)> {
	if n >= sb.inode_count {
		return Err(FsError::Io(io::Error::new(
			io::ErrorKind::InvalidInput,
			"inode index out of range",
		)));
	}
	let per_block = sb.inodes_per_block();
	let block = INODE_TABLE_START_BLOCK + n / per_block;
	let offset = (n % per_block) as usize * size_of::<Inode>();
	Ok((block, offset))
}

pub fn read_inode(dev: &mut impl BlockDevice, sb: &Superblock, n: u32) -> FsResult<Inode> {
	let (block, offset) = locate(sb, n)?;
	let mut buf = vec![0u8; sb.block_size as usize];
	dev.read_block(block, &mut buf)?;
	Ok(Inode::from_bytes(&buf[offset..offset + size_of::<Inode>()]))
}

pub fn write_inode(dev: &mut impl BlockDevice, sb: &Superblock, n: u32, inode: &Inode) -> FsResult<()> {
	let (block, offset) = locate(sb, n)?;
	let mut buf = vec![0u8; sb.block_size as usize];
	dev.read_block(block, &mut buf)?;
	inode.write_into(&mut buf[offset..offset + size_of::<Inode>()]);
	dev.write_block(block, &buf)
}
