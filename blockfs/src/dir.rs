//! The directory layer (§4.5): a directory's byte stream is an array of
//! fixed-size `dir_entry` records, addressed through the same block mapper a
//! regular file uses.

use crate::block_map::block_for;
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::inode::Inode;
use crate::layout::{Superblock, MAX_FILENAME_LEN, NAME_BUF_LEN};
use crate::raw::{as_bytes, as_bytes_mut};
use std::mem::size_of;

/// `{ name: byte[MAX_FILENAME_LEN+2], inode_num: u32 }` (§3 Directory entry).
/// `inode_num == 0` marks a tombstone.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
	name: [u8; NAME_BUF_LEN],
	pub inode_num: u32,
}

const _: () = assert!(size_of::<DirEntry>() == 32);

impl DirEntry {
	const EMPTY: Self = Self {
		name: [0; NAME_BUF_LEN],
		inode_num: 0,
	};

	fn new(name: &str, inode_num: u32) -> FsResult<Self> {
		let bytes = name.as_bytes();
		if bytes.len() > MAX_FILENAME_LEN {
			return Err(FsError::NameTooLong);
		}
		let mut buf = [0u8; NAME_BUF_LEN];
		buf[..bytes.len()].copy_from_slice(bytes);
		Ok(Self {
			name: buf,
			inode_num,
		})
	}

	fn name(&self) -> &str {
		let end = self
			.name
			.iter()
			.position(|&b| b == 0)
			.unwrap_or(self.name.len());
		std::str::from_utf8(&self.name[..end]).unwrap_or("")
	}

	fn matches(&self, name: &str) -> bool {
		self.inode_num != 0 && self.name() == name
	}
}

fn ceil_div(a: u32, b: u32) -> u32 {
	(a + b - 1) / b
}

/// Reads directory data block `logical` (a no-op, non-allocating read; a
/// hole — an unallocated directory block — never legitimately occurs, but is
/// tolerated by returning `None`, matching the original `find_entry_in_directory`'s
/// "skip sparse or failed blocks" behavior).
fn read_entries(
	dev: &mut impl BlockDevice,
	sb: &Superblock,
	dir: &Inode,
	logical: u32,
) -> FsResult<Option<Vec<DirEntry>>> {
	let mut tmp = *dir;
	let (phys, _) = block_for(dev, sb, &mut tmp, logical, false)?;
	if phys == 0 {
		return Ok(None);
	}
	let mut buf = vec![0u8; sb.block_size as usize];
	dev.read_block(phys, &mut buf)?;

	let per_block = sb.entries_per_block() as usize;
	let mut entries = vec![DirEntry::EMPTY; per_block];
	for (i, entry) in entries.iter_mut().enumerate() {
		let off = i * size_of::<DirEntry>();
		as_bytes_mut(entry).copy_from_slice(&buf[off..off + size_of::<DirEntry>()]);
	}
	Ok(Some(entries))
}

fn block_count(sb: &Superblock, dir: &Inode) -> u32 {
	ceil_div(dir.size, sb.block_size)
}

/// Lookup (§4.5): first match wins; the uniqueness invariant (§3 invariant 6)
/// guarantees at most one.
pub fn lookup(dev: &mut impl BlockDevice, sb: &Superblock, dir: &Inode, name: &str) -> FsResult<Option<u32>> {
	for logical in 0..block_count(sb, dir) {
		let Some(entries) = read_entries(dev, sb, dir, logical)? else {
			continue;
		};
		if let Some(e) = entries.iter().find(|e| e.matches(name)) {
			return Ok(Some(e.inode_num));
		}
	}
	Ok(None)
}

/// Insert (§4.5): tombstone slots are reused before the directory grows.
pub fn insert(dev: &mut impl BlockDevice, sb: &Superblock, dir: &mut Inode, name: &str, inode_num: u32) -> FsResult<()> {
	let entry = DirEntry::new(name, inode_num)?;

	for logical in 0..block_count(sb, dir) {
		let Some(mut entries) = read_entries(dev, sb, dir, logical)? else {
			continue;
		};
		if let Some(slot) = entries.iter_mut().find(|e| e.inode_num == 0) {
			*slot = entry;
			write_entries(dev, sb, dir, logical, &entries)?;
			return Ok(());
		}
	}

	// No tombstone: append at the current end of the stream.
	let offset = dir.size;
	let logical = offset / sb.block_size;
	let (phys, _) = block_for(dev, sb, dir, logical, true)?;
	let in_block_off = (offset % sb.block_size) as usize;

	let mut buf = vec![0u8; sb.block_size as usize];
	dev.read_block(phys, &mut buf)?;
	buf[in_block_off..in_block_off + size_of::<DirEntry>()].copy_from_slice(as_bytes(&entry));
	dev.write_block(phys, &buf)?;

	dir.size += size_of::<DirEntry>() as u32;
	Ok(())
}

fn write_entries(dev: &mut impl BlockDevice, sb: &Superblock, dir: &Inode, logical: u32, entries: &[DirEntry]) -> FsResult<()> {
	let mut tmp = *dir;
	let (phys, _) = block_for(dev, sb, &mut tmp, logical, false)?;
	debug_assert_ne!(phys, 0, "cannot rewrite a directory block that was never allocated");
	let mut buf = vec![0u8; sb.block_size as usize];
	for (i, entry) in entries.iter().enumerate() {
		let off = i * size_of::<DirEntry>();
		buf[off..off + size_of::<DirEntry>()].copy_from_slice(as_bytes(entry));
	}
	dev.write_block(phys, &buf)
}

/// Remove (§4.5): leaves a tombstone; `size` is never decreased.
pub fn remove(dev: &mut impl BlockDevice, sb: &Superblock, dir: &Inode, name: &str) -> FsResult<bool> {
	for logical in 0..block_count(sb, dir) {
		let Some(mut entries) = read_entries(dev, sb, dir, logical)? else {
			continue;
		};
		if let Some(slot) = entries.iter_mut().find(|e| e.matches(name)) {
			*slot = DirEntry::EMPTY;
			write_entries(dev, sb, dir, logical, &entries)?;
			return Ok(true);
		}
	}
	Ok(false)
}

/// Enumerate (§4.5): `.` and `..` first, then every live entry in on-disk
/// order.
pub fn enumerate(dev: &mut impl BlockDevice, sb: &Superblock, dir: &Inode, self_ino: u32, parent_ino: u32) -> FsResult<Vec<(String, u32)>> {
	let mut out = vec![(".".to_string(), self_ino), ("..".to_string(), parent_ino)];
	for logical in 0..block_count(sb, dir) {
		let Some(entries) = read_entries(dev, sb, dir, logical)? else {
			continue;
		};
		for e in entries.iter().filter(|e| e.inode_num != 0) {
			out.push((e.name().to_string(), e.inode_num));
		}
	}
	Ok(out)
}

/// `true` if the directory has no live entries besides the synthesized `.`
/// and `..` (used by `rmdir`'s emptiness check, §6 of SPEC_FULL.md).
pub fn is_empty(dev: &mut impl BlockDevice, sb: &Superblock, dir: &Inode) -> FsResult<bool> {
	for logical in 0..block_count(sb, dir) {
		let Some(entries) = read_entries(dev, sb, dir, logical)? else {
			continue;
		};
		if entries.iter().any(|e| e.inode_num != 0) {
			return Ok(false);
		}
	}
	Ok(true)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::MemDevice;

	fn setup() -> (MemDevice, Superblock, Inode) {
		let dev = MemDevice::new(512, 8192);
		let sb = Superblock::compute(512, 8192, 64).unwrap();
		(dev, sb, Inode::new_dir(0))
	}

	#[test]
	fn insert_then_lookup_round_trips() {
		let (mut dev, sb, mut dir) = setup();
		insert(&mut dev, &sb, &mut dir, "a", 5).unwrap();
		insert(&mut dev, &sb, &mut dir, "b", 6).unwrap();
		assert_eq!(lookup(&mut dev, &sb, &dir, "a").unwrap(), Some(5));
		assert_eq!(lookup(&mut dev, &sb, &dir, "b").unwrap(), Some(6));
		assert_eq!(lookup(&mut dev, &sb, &dir, "c").unwrap(), None);
	}

	#[test]
	fn remove_tombstones_without_shrinking_size() {
		let (mut dev, sb, mut dir) = setup();
		insert(&mut dev, &sb, &mut dir, "a", 5).unwrap();
		let size_before = dir.size;
		assert!(remove(&mut dev, &sb, &dir, "a").unwrap());
		assert_eq!(dir.size, size_before);
		assert_eq!(lookup(&mut dev, &sb, &dir, "a").unwrap(), None);
	}

	#[test]
	fn insert_reuses_tombstone_slot_before_growing() {
		let (mut dev, sb, mut dir) = setup();
		insert(&mut dev, &sb, &mut dir, "a", 5).unwrap();
		remove(&mut dev, &sb, &dir, "a").unwrap();
		let size_before = dir.size;
		insert(&mut dev, &sb, &mut dir, "b", 7).unwrap();
		assert_eq!(dir.size, size_before, "tombstone reuse must not grow size");
		assert_eq!(lookup(&mut dev, &sb, &dir, "b").unwrap(), Some(7));
	}

	#[test]
	fn enumerate_yields_dot_and_dotdot_first() {
		let (mut dev, sb, mut dir) = setup();
		insert(&mut dev, &sb, &mut dir, "f", 9).unwrap();
		let entries = enumerate(&mut dev, &sb, &dir, 2, 0).unwrap();
		assert_eq!(entries[0], (".".to_string(), 2));
		assert_eq!(entries[1], ("..".to_string(), 0));
		assert!(entries.iter().any(|(n, i)| n == "f" && *i == 9));
	}

	#[test]
	fn name_exactly_at_the_limit_is_accepted_one_more_is_rejected() {
		let (mut dev, sb, mut dir) = setup();
		let max_name = "a".repeat(MAX_FILENAME_LEN);
		assert!(insert(&mut dev, &sb, &mut dir, &max_name, 1).is_ok());
		let too_long = "a".repeat(MAX_FILENAME_LEN + 1);
		assert!(matches!(
			insert(&mut dev, &sb, &mut dir, &too_long, 2),
			Err(FsError::NameTooLong)
		));
	}

	#[test]
	fn is_empty_reports_true_for_fresh_directory() {
		let (mut dev, sb, dir) = setup();
		assert!(is_empty(&mut dev, &sb, &dir).unwrap());
	}
}
