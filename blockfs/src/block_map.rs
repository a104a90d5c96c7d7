//! The block mapper (§4.4): translates a (inode, logical block index) pair to
//! a physical block number, lazily allocating direct/indirect index blocks.
//!
//! Mirrors §4.4's ownership note: the mapper only mutates the caller's copy
//! of the inode. Whoever calls [`block_for`] with `allocate_if_missing = true`
//! is responsible for persisting the inode afterward if it returns `true`
//! (meaning a direct pointer or an `indirect[]` slot was newly populated).

use crate::bitmap;
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::inode::Inode;
use crate::layout::{Superblock, DIRECT_POINTERS, INDIRECT_POINTERS};

fn zero_block(dev: &mut impl BlockDevice, sb: &Superblock, phys: u32) -> FsResult<()> {
	let buf = vec![0u8; sb.block_size as usize];
	dev.write_block(phys, &buf)
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
	u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

fn write_u32(buf: &mut [u8], off: usize, v: u32) {
	buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

/// Resolves `logical_index` against `inode`. Returns `(physical_block,
/// inode_was_dirtied)`; `physical_block` is `0` (a hole) when the block is
/// unallocated and `allocate_if_missing` is `false`.
pub fn block_for(
	dev: &mut impl BlockDevice,
	sb: &Superblock,
	inode: &mut Inode,
	logical_index: u32,
	allocate_if_missing: bool,
) -> FsResult<(u32, bool)> {
	if (logical_index as usize) < DIRECT_POINTERS {
		let i = logical_index as usize;
		if inode.direct[i] != 0 {
			return Ok((inode.direct[i], false));
		}
		if !allocate_if_missing {
			return Ok((0, false));
		}
		let phys = bitmap::alloc_data_block(dev, sb)?;
		zero_block(dev, sb, phys)?;
		inode.direct[i] = phys;
		return Ok((phys, true));
	}

	let k = logical_index - DIRECT_POINTERS as u32;
	let ppb = sb.pointers_per_block();
	let g = (k / ppb) as usize;
	let o = (k % ppb) as usize;
	if g >= INDIRECT_POINTERS {
		return Err(FsError::TooBig);
	}

	let mut dirtied = false;
	let mut idx_block_phys = inode.indirect[g];
	if idx_block_phys == 0 {
		if !allocate_if_missing {
			return Ok((0, false));
		}
		idx_block_phys = bitmap::alloc_data_block(dev, sb)?;
		zero_block(dev, sb, idx_block_phys)?;
		inode.indirect[g] = idx_block_phys;
		dirtied = true;
	}

	let mut idx_buf = vec![0u8; sb.block_size as usize];
	dev.read_block(idx_block_phys, &mut idx_buf)?;
	let slot_off = o * 4;
	let mut slot = read_u32(&idx_buf, slot_off);
	if slot == 0 {
		if !allocate_if_missing {
			return Ok((0, dirtied));
		}
		slot = bitmap::alloc_data_block(dev, sb)?;
		zero_block(dev, sb, slot)?;
		write_u32(&mut idx_buf, slot_off, slot);
		dev.write_block(idx_block_phys, &idx_buf)?;
	}
	Ok((slot, dirtied))
}

/// Frees every block with logical index `>= from_logical`. Used by both
/// `unlink`/`rmdir` (`from_logical = 0`, i.e. free everything) and shrinking
/// `truncate` (§4.7). If an index block ends up with no remaining occupied
/// slot, it is freed too and its `indirect[]` slot cleared (§4.4 "freeing all
/// blocks").
pub fn free_blocks_from(
	dev: &mut impl BlockDevice,
	sb: &Superblock,
	inode: &mut Inode,
	from_logical: u32,
) -> FsResult<()> {
	for i in 0..DIRECT_POINTERS {
		if i as u32 >= from_logical && inode.direct[i] != 0 {
			bitmap::free_data_block(dev, sb, inode.direct[i])?;
			inode.direct[i] = 0;
		}
	}

	let ppb = sb.pointers_per_block();
	for g in 0..INDIRECT_POINTERS {
		if inode.indirect[g] == 0 {
			continue;
		}
		let idx_block = inode.indirect[g];
		let base = DIRECT_POINTERS as u32 + g as u32 * ppb;
		let mut buf = vec![0u8; sb.block_size as usize];
		dev.read_block(idx_block, &mut buf)?;

		let mut any_remaining = false;
		for o in 0..ppb as usize {
			let logical = base + o as u32;
			let slot_off = o * 4;
			let slot = read_u32(&buf, slot_off);
			if slot == 0 {
				continue;
			}
			if logical >= from_logical {
				bitmap::free_data_block(dev, sb, slot)?;
				write_u32(&mut buf, slot_off, 0);
			} else {
				any_remaining = true;
			}
		}

		if any_remaining {
			dev.write_block(idx_block, &buf)?;
		} else {
			bitmap::free_data_block(dev, sb, idx_block)?;
			inode.indirect[g] = 0;
		}
	}
	Ok(())
}

pub fn free_all_blocks(dev: &mut impl BlockDevice, sb: &Superblock, inode: &mut Inode) -> FsResult<()> {
	free_blocks_from(dev, sb, inode, 0)
}
