//! The operation layer (§4.7): the externally visible POSIX-like calls,
//! expressed in terms of the path resolver, directory layer, inode store and
//! block mapper.

use crate::bitmap;
use crate::block_map;
use crate::device::BlockDevice;
use crate::dir;
use crate::error::{FsError, FsResult};
use crate::inode::{self, Inode};
use crate::layout::{Superblock, MAX_FILENAME_LEN};
use crate::path;
use blockfs_utils::util::now_secs;
use log::trace;

/// Attributes reported by `getattr` (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct FileAttr {
	pub ino: u32,
	pub mode: u32,
	pub size: u64,
	pub atime: u32,
	pub mtime: u32,
	pub ctime: u32,
	pub blksize: u32,
	/// 512-byte units, counting index blocks (§4.7: "blocks = ceil(size/512)
	/// + index-block overhead counted").
	pub blocks: u64,
}

/// `statfs` result (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct StatFs {
	pub bsize: u32,
	pub blocks: u64,
	pub bfree: u64,
	pub bavail: u64,
	pub files: u64,
	pub ffree: u64,
	pub favail: u64,
	pub namelen: u32,
}

fn allocated_block_count(dev: &mut impl BlockDevice, sb: &Superblock, inode: &Inode) -> FsResult<u32> {
	let mut count = inode.direct.iter().filter(|&&p| p != 0).count() as u32;
	let ppb = sb.pointers_per_block();
	for &idx_phys in inode.indirect.iter() {
		if idx_phys == 0 {
			continue;
		}
		count += 1; // the index block itself
		let mut buf = vec![0u8; sb.block_size as usize];
		dev.read_block(idx_phys, &mut buf)?;
		for o in 0..ppb as usize {
			let slot = u32::from_le_bytes(buf[o * 4..o * 4 + 4].try_into().unwrap());
			if slot != 0 {
				count += 1;
			}
		}
	}
	Ok(count)
}

pub fn getattr(dev: &mut impl BlockDevice, sb: &Superblock, path: &str) -> FsResult<FileAttr> {
	trace!("getattr {path}");
	let ino = path::resolve(dev, sb, path)?;
	let inode = inode::read_inode(dev, sb, ino)?;
	let allocated = allocated_block_count(dev, sb, &inode)?;
	let units_per_block = (sb.block_size / 512).max(1);
	Ok(FileAttr {
		ino,
		mode: inode.mode,
		size: inode.size as u64,
		atime: inode.atime,
		mtime: inode.mtime,
		ctime: inode.ctime,
		blksize: sb.block_size,
		blocks: allocated as u64 * units_per_block as u64,
	})
}

/// Yields `.`, `..`, then every live entry, in on-disk order. The caller
/// (the FUSE adapter) is responsible for stopping early if its filler
/// buffer fills up; this just produces the full, already-ordered list.
/// Updates `atime`.
pub fn readdir(dev: &mut impl BlockDevice, sb: &Superblock, path: &str) -> FsResult<Vec<(String, u32)>> {
	trace!("readdir {path}");
	let (self_ino, parent_ino) = path::resolve_with_parent(dev, sb, path)?;
	let dir_inode = path::read_dir_inode(dev, sb, self_ino)?;
	let entries = dir::enumerate(dev, sb, &dir_inode, self_ino, parent_ino)?;

	let mut dir_inode = dir_inode;
	dir_inode.touch(true, false, false, now_secs());
	inode::write_inode(dev, sb, self_ino, &dir_inode)?;
	Ok(entries)
}

fn create(dev: &mut impl BlockDevice, sb: &Superblock, path: &str, new_inode: Inode) -> FsResult<u32> {
	trace!("create {path} (dir={})", new_inode.is_dir());
	let (parent_ino, name) = path::resolve_parent(dev, sb, path)?;
	let mut parent = path::read_dir_inode(dev, sb, parent_ino)?;
	if dir::lookup(dev, sb, &parent, name)?.is_some() {
		return Err(FsError::Exists);
	}

	let ino = bitmap::alloc_inode(dev, sb)?;
	inode::write_inode(dev, sb, ino, &new_inode)?;
	if let Err(e) = dir::insert(dev, sb, &mut parent, name, ino) {
		bitmap::free_inode(dev, sb, ino)?;
		return Err(e);
	}

	parent.touch(false, true, true, now_secs());
	inode::write_inode(dev, sb, parent_ino, &parent)?;
	Ok(ino)
}

pub fn mknod(dev: &mut impl BlockDevice, sb: &Superblock, path: &str) -> FsResult<u32> {
	create(dev, sb, path, Inode::new_reg(now_secs()))
}

pub fn mkdir(dev: &mut impl BlockDevice, sb: &Superblock, path: &str) -> FsResult<u32> {
	create(dev, sb, path, Inode::new_dir(now_secs()))
}

fn remove(dev: &mut impl BlockDevice, sb: &Superblock, path: &str, want_dir: bool) -> FsResult<()> {
	trace!("{} {path}", if want_dir { "rmdir" } else { "unlink" });
	let (parent_ino, name) = path::resolve_parent(dev, sb, path)?;
	let mut parent = path::read_dir_inode(dev, sb, parent_ino)?;
	let child_ino = dir::lookup(dev, sb, &parent, name)?.ok_or(FsError::NotFound)?;
	let mut child = inode::read_inode(dev, sb, child_ino)?;

	if want_dir {
		if !child.is_dir() {
			return Err(FsError::NotADirectory);
		}
		if !dir::is_empty(dev, sb, &child)? {
			return Err(FsError::NotEmpty);
		}
	} else if child.is_dir() {
		return Err(FsError::IsADirectory);
	}

	block_map::free_all_blocks(dev, sb, &mut child)?;
	dir::remove(dev, sb, &parent, name)?;
	bitmap::free_inode(dev, sb, child_ino)?;

	parent.touch(false, true, true, now_secs());
	inode::write_inode(dev, sb, parent_ino, &parent)?;
	Ok(())
}

pub fn unlink(dev: &mut impl BlockDevice, sb: &Superblock, path: &str) -> FsResult<()> {
	remove(dev, sb, path, false)
}

/// The host is expected to have already confirmed the directory is empty
/// via `readdir` before calling; this re-verifies defensively rather than
/// trusting the caller blindly (§4.7: "implementation MAY verify and MUST
/// NOT corrupt on violation").
pub fn rmdir(dev: &mut impl BlockDevice, sb: &Superblock, path: &str) -> FsResult<()> {
	remove(dev, sb, path, true)
}

pub fn rename(dev: &mut impl BlockDevice, sb: &Superblock, old: &str, new: &str) -> FsResult<()> {
	trace!("rename {old} -> {new}");
	let (old_parent_ino, old_name) = path::resolve_parent(dev, sb, old)?;
	let (new_parent_ino, new_name) = path::resolve_parent(dev, sb, new)?;

	let mut old_parent = path::read_dir_inode(dev, sb, old_parent_ino)?;
	let src_ino = dir::lookup(dev, sb, &old_parent, old_name)?.ok_or(FsError::NotFound)?;

	let existing = if new_parent_ino == old_parent_ino {
		dir::lookup(dev, sb, &old_parent, new_name)?
	} else {
		let new_parent = path::read_dir_inode(dev, sb, new_parent_ino)?;
		dir::lookup(dev, sb, &new_parent, new_name)?
	};
	if let Some(dst_ino) = existing {
		// Same inode under both names: a no-op (§4.7).
		return if dst_ino == src_ino {
			Ok(())
		} else {
			Err(FsError::Exists)
		};
	}

	dir::remove(dev, sb, &old_parent, old_name)?;
	let now = now_secs();

	if new_parent_ino == old_parent_ino {
		dir::insert(dev, sb, &mut old_parent, new_name, src_ino)?;
		old_parent.touch(false, true, true, now);
		inode::write_inode(dev, sb, old_parent_ino, &old_parent)?;
	} else {
		old_parent.touch(false, true, true, now);
		inode::write_inode(dev, sb, old_parent_ino, &old_parent)?;

		let mut new_parent = path::read_dir_inode(dev, sb, new_parent_ino)?;
		dir::insert(dev, sb, &mut new_parent, new_name, src_ino)?;
		new_parent.touch(false, true, true, now);
		inode::write_inode(dev, sb, new_parent_ino, &new_parent)?;
	}
	Ok(())
}

pub fn read(dev: &mut impl BlockDevice, sb: &Superblock, path: &str, buf: &mut [u8], offset: u64) -> FsResult<usize> {
	trace!("read {path} size:{} offset:{offset}", buf.len());
	let ino = path::resolve(dev, sb, path)?;
	let mut inode = inode::read_inode(dev, sb, ino)?;
	if inode.is_dir() {
		return Err(FsError::IsADirectory);
	}

	let size = inode.size as u64;
	if offset >= size {
		return Ok(0);
	}
	let want = (buf.len() as u64).min(size - offset) as usize;
	let bs = sb.block_size as u64;

	let mut done = 0usize;
	let mut off = offset;
	while done < want {
		let logical = (off / bs) as u32;
		let in_block = (off % bs) as usize;
		let chunk = (bs as usize - in_block).min(want - done);

		let (phys, _) = block_map::block_for(dev, sb, &mut inode, logical, false)?;
		if phys == 0 {
			buf[done..done + chunk].fill(0);
		} else {
			let mut block_buf = vec![0u8; bs as usize];
			dev.read_block(phys, &mut block_buf)?;
			buf[done..done + chunk].copy_from_slice(&block_buf[in_block..in_block + chunk]);
		}
		done += chunk;
		off += chunk as u64;
	}

	inode.touch(true, false, false, now_secs());
	inode::write_inode(dev, sb, ino, &inode)?;
	Ok(done)
}

pub fn write(dev: &mut impl BlockDevice, sb: &Superblock, path: &str, buf: &[u8], offset: u64, append: bool) -> FsResult<usize> {
	trace!("write {path} size:{} offset:{offset}", buf.len());
	let ino = path::resolve(dev, sb, path)?;
	let mut inode = inode::read_inode(dev, sb, ino)?;
	if inode.is_dir() {
		return Err(FsError::IsADirectory);
	}

	let start = if append { inode.size as u64 } else { offset };
	if start + buf.len() as u64 > sb.max_file_size() {
		return Err(FsError::TooBig);
	}

	let bs = sb.block_size as u64;
	let mut done = 0usize;
	let mut off = start;
	let mut alloc_err = None;

	while done < buf.len() {
		let logical = (off / bs) as u32;
		let in_block = (off % bs) as usize;
		let chunk = (bs as usize - in_block).min(buf.len() - done);

		match block_map::block_for(dev, sb, &mut inode, logical, true) {
			Ok((phys, _)) => {
				let mut block_buf = vec![0u8; bs as usize];
				if chunk < bs as usize {
					dev.read_block(phys, &mut block_buf)?;
				}
				block_buf[in_block..in_block + chunk].copy_from_slice(&buf[done..done + chunk]);
				dev.write_block(phys, &block_buf)?;
				done += chunk;
				off += chunk as u64;
			}
			Err(e) => {
				log::debug!("write {path}: allocation failed after {done} bytes ({e})");
				alloc_err = Some(e);
				break;
			}
		}
	}

	if done > 0 {
		inode.size = inode.size.max(off as u32);
		inode.touch(false, true, true, now_secs());
		inode::write_inode(dev, sb, ino, &inode)?;
	}

	match alloc_err {
		Some(e) if done == 0 => Err(e),
		_ => Ok(done),
	}
}

pub fn truncate(dev: &mut impl BlockDevice, sb: &Superblock, path: &str, new_size: u64) -> FsResult<()> {
	trace!("truncate {path} size:{new_size}");
	let ino = path::resolve(dev, sb, path)?;
	let mut inode = inode::read_inode(dev, sb, ino)?;
	// Directories cannot transition via truncate (§4.7 state machine).
	if inode.is_dir() {
		return Err(FsError::IsADirectory);
	}
	if new_size > sb.max_file_size() {
		return Err(FsError::TooBig);
	}

	let old_size = inode.size as u64;
	let now = now_secs();
	if new_size < old_size {
		let bs = sb.block_size as u64;
		let first_free_logical = ((new_size + bs - 1) / bs) as u32;
		block_map::free_blocks_from(dev, sb, &mut inode, first_free_logical)?;
		inode.size = new_size as u32;
		inode.touch(false, true, true, now);
	} else if new_size > old_size {
		inode.size = new_size as u32;
		inode.touch(false, true, true, now);
	} else {
		inode.touch(false, false, true, now);
	}
	inode::write_inode(dev, sb, ino, &inode)
}

pub fn utimens(dev: &mut impl BlockDevice, sb: &Superblock, path: &str, atime: u32, mtime: u32) -> FsResult<()> {
	trace!("utimens {path}");
	let ino = path::resolve(dev, sb, path)?;
	let mut inode = inode::read_inode(dev, sb, ino)?;
	inode.atime = atime;
	inode.mtime = mtime;
	inode.ctime = now_secs();
	inode::write_inode(dev, sb, ino, &inode)
}

pub fn statfs(dev: &mut impl BlockDevice, sb: &Superblock) -> FsResult<StatFs> {
	trace!("statfs");
	let bfree = bitmap::free_data_block_count(dev, sb)? as u64;
	let ffree = bitmap::free_inode_count(dev, sb)? as u64;
	Ok(StatFs {
		bsize: sb.block_size,
		blocks: sb.data_block_count as u64,
		bfree,
		bavail: bfree,
		files: sb.inode_count as u64,
		ffree,
		favail: ffree,
		namelen: MAX_FILENAME_LEN as u32,
	})
}
