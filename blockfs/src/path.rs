//! The path resolver (§4.6): walks `&str` component slices against the
//! directory layer without any destructive tokenization (no `split('/')`
//! into an owned `Vec<String>`), per §5's Design Notes.

use crate::device::BlockDevice;
use crate::dir;
use crate::error::{FsError, FsResult};
use crate::inode::{self, Inode};
use crate::layout::{Superblock, MAX_FILENAME_LEN};

/// The root directory is always inode 0 (§3: "inode numbers are 0-indexed;
/// the root directory is inode 0").
pub const ROOT_INO: u32 = 0;

fn components(path: &str) -> impl Iterator<Item = &str> {
	path.split('/').filter(|c| !c.is_empty())
}

fn check_len(name: &str) -> FsResult<()> {
	if name.len() > MAX_FILENAME_LEN {
		return Err(FsError::NameTooLong);
	}
	Ok(())
}

/// Resolves an absolute path to the inode number it names. The empty path
/// and `/` both resolve to the root.
pub fn resolve(dev: &mut impl BlockDevice, sb: &Superblock, path: &str) -> FsResult<u32> {
	let mut current = ROOT_INO;
	for name in components(path) {
		check_len(name)?;
		let dir_inode = inode::read_inode(dev, sb, current)?;
		if !dir_inode.is_dir() {
			return Err(FsError::NotADirectory);
		}
		current = dir::lookup(dev, sb, &dir_inode, name)?.ok_or(FsError::NotFound)?;
	}
	Ok(current)
}

/// Resolves every component but the last, returning the parent directory's
/// inode number and the final component (borrowed from `path`). Used by
/// every operation that creates or removes a name (`mknod`, `mkdir`,
/// `unlink`, `rmdir`, `rename`).
pub fn resolve_parent<'a>(dev: &mut impl BlockDevice, sb: &Superblock, path: &'a str) -> FsResult<(u32, &'a str)> {
	let mut comps = components(path).peekable();
	let mut current = ROOT_INO;
	loop {
		let Some(name) = comps.next() else {
			return Err(FsError::NotFound);
		};
		check_len(name)?;
		if comps.peek().is_none() {
			return Ok((current, name));
		}
		let dir_inode = inode::read_inode(dev, sb, current)?;
		if !dir_inode.is_dir() {
			return Err(FsError::NotADirectory);
		}
		current = dir::lookup(dev, sb, &dir_inode, name)?.ok_or(FsError::NotFound)?;
	}
}

/// Reads the directory inode named by `ino`, checking it actually is one.
pub fn read_dir_inode(dev: &mut impl BlockDevice, sb: &Superblock, ino: u32) -> FsResult<Inode> {
	let inode = inode::read_inode(dev, sb, ino)?;
	if !inode.is_dir() {
		return Err(FsError::NotADirectory);
	}
	Ok(inode)
}

/// Resolves `path` to `(self_ino, parent_ino)`. The root is its own parent
/// (§3 Root invariant: "`..` in the root resolves to the root itself"),
/// since directories never store a parent pointer — `readdir` derives `..`
/// from the path it was called with, not from on-disk state.
pub fn resolve_with_parent(dev: &mut impl BlockDevice, sb: &Superblock, path: &str) -> FsResult<(u32, u32)> {
	if components(path).next().is_none() {
		return Ok((ROOT_INO, ROOT_INO));
	}
	let (parent_ino, name) = resolve_parent(dev, sb, path)?;
	let parent_inode = read_dir_inode(dev, sb, parent_ino)?;
	let self_ino = dir::lookup(dev, sb, &parent_inode, name)?.ok_or(FsError::NotFound)?;
	Ok((self_ino, parent_ino))
}
