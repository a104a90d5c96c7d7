//! Bridges the `fuser` callback protocol (inode-number based) to `blockfs`'s
//! path-based API. The kernel addresses files by opaque 64-bit inode
//! numbers it learned from prior `lookup`/`readdir` replies; `blockfs`
//! addresses them by absolute path. This adapter keeps the one piece of
//! state `blockfs` itself never needs: a map from the numbers handed out to
//! the kernel back to the path that produced them.

use blockfs::device::BlockDevice;
use blockfs::{FsError, FsResult};
use fuser::{
	FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
	ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use log::{debug, warn};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TTL: Duration = Duration::from_secs(1);
/// FUSE reserves inode 1 for the mount root; `blockfs`'s root is inode 0, so
/// every number crossing the boundary is offset by one.
const FUSE_ROOT_INO: u64 = 1;

fn to_fuse_ino(blockfs_ino: u32) -> u64 {
	blockfs_ino as u64 + 1
}

fn is_dir_mode(mode: u32) -> bool {
	mode & libc::S_IFMT as u32 == libc::S_IFDIR as u32
}

fn system_time(secs: u32) -> SystemTime {
	UNIX_EPOCH + Duration::from_secs(secs as u64)
}

fn secs_since_epoch(t: SystemTime) -> u32 {
	t.duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
}

fn path_str(p: &Path) -> Option<&str> {
	p.to_str()
}

/// Rebases `p` onto `new_base` if `p` is `old_base` itself or lives anywhere
/// beneath it, so a rename of a directory also relocates every already
/// cached descendant (a prior `lookup` on a child keeps its fuse inode
/// number, but the path it resolves to must move with its parent).
fn rebase_path(p: &Path, old_base: &Path, new_base: &Path) -> Option<PathBuf> {
	if p == old_base {
		return Some(new_base.to_path_buf());
	}
	p.strip_prefix(old_base).ok().map(|rest| new_base.join(rest))
}

fn errno(e: &FsError) -> i32 {
	-e.errno()
}

pub struct FuseAdapter<D: BlockDevice> {
	fs: blockfs::Filesystem<D>,
	paths: HashMap<u64, PathBuf>,
}

impl<D: BlockDevice> FuseAdapter<D> {
	pub fn new(fs: blockfs::Filesystem<D>) -> Self {
		let mut paths = HashMap::new();
		paths.insert(FUSE_ROOT_INO, PathBuf::from("/"));
		Self { fs, paths }
	}

	fn path_of(&self, ino: u64) -> Option<PathBuf> {
		self.paths.get(&ino).cloned()
	}

	fn remember(&mut self, path: PathBuf, blockfs_ino: u32) -> u64 {
		let fuse_ino = to_fuse_ino(blockfs_ino);
		self.paths.insert(fuse_ino, path);
		fuse_ino
	}

	fn file_attr(&mut self, path: &str, fuse_ino: u64) -> FsResult<FileAttr> {
		let attr = self.fs.getattr(path)?;
		let kind = if is_dir_mode(attr.mode) {
			FileType::Directory
		} else {
			FileType::RegularFile
		};
		Ok(FileAttr {
			ino: fuse_ino,
			size: attr.size,
			blocks: attr.blocks,
			atime: system_time(attr.atime),
			mtime: system_time(attr.mtime),
			ctime: system_time(attr.ctime),
			crtime: system_time(attr.ctime),
			kind,
			perm: (attr.mode & 0o777) as u16,
			nlink: if kind == FileType::Directory { 2 } else { 1 },
			uid: 0,
			gid: 0,
			rdev: 0,
			blksize: attr.blksize,
			flags: 0,
		})
	}
}

impl<D: BlockDevice> Filesystem for FuseAdapter<D> {
	fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
		let Some(parent_path) = self.path_of(parent) else {
			reply.error(libc::EINVAL);
			return;
		};
		let child_path = parent_path.join(name);
		let Some(path) = path_str(&child_path).map(str::to_owned) else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.fs.getattr(&path) {
			Ok(attr) => {
				let fuse_ino = self.remember(child_path, attr.ino);
				match self.file_attr(&path, fuse_ino) {
					Ok(a) => reply.entry(&TTL, &a, 0),
					Err(e) => reply.error(errno(&e)),
				}
			}
			Err(e) => reply.error(errno(&e)),
		}
	}

	fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
		let Some(path) = self.path_of(ino).and_then(|p| path_str(&p).map(str::to_owned)) else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.file_attr(&path, ino) {
			Ok(attr) => reply.attr(&TTL, &attr),
			Err(e) => reply.error(errno(&e)),
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn setattr(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_mode: Option<u32>,
		_uid: Option<u32>,
		_gid: Option<u32>,
		size: Option<u64>,
		atime: Option<TimeOrNow>,
		mtime: Option<TimeOrNow>,
		_ctime: Option<SystemTime>,
		_fh: Option<u64>,
		_crtime: Option<SystemTime>,
		_chgtime: Option<SystemTime>,
		_bkuptime: Option<SystemTime>,
		_flags: Option<u32>,
		reply: ReplyAttr,
	) {
		let Some(path) = self.path_of(ino).and_then(|p| path_str(&p).map(str::to_owned)) else {
			reply.error(libc::EINVAL);
			return;
		};

		if let Some(new_size) = size {
			if let Err(e) = self.fs.truncate(&path, new_size) {
				reply.error(errno(&e));
				return;
			}
		}

		if atime.is_some() || mtime.is_some() {
			// utimens sets both fields together (§4.7); fall back to the
			// inode's current values for whichever one the kernel left
			// unspecified.
			let current = match self.fs.getattr(&path) {
				Ok(a) => a,
				Err(e) => {
					reply.error(errno(&e));
					return;
				}
			};
			let a = atime
				.map(|t| match t {
					TimeOrNow::SpecificTime(t) => secs_since_epoch(t),
					TimeOrNow::Now => secs_since_epoch(SystemTime::now()),
				})
				.unwrap_or(current.atime);
			let m = mtime
				.map(|t| match t {
					TimeOrNow::SpecificTime(t) => secs_since_epoch(t),
					TimeOrNow::Now => secs_since_epoch(SystemTime::now()),
				})
				.unwrap_or(current.mtime);
			if let Err(e) = self.fs.utimens(&path, a, m) {
				reply.error(errno(&e));
				return;
			}
		}

		match self.file_attr(&path, ino) {
			Ok(attr) => reply.attr(&TTL, &attr),
			Err(e) => reply.error(errno(&e)),
		}
	}

	fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
		let Some(dir_path) = self.path_of(ino) else {
			reply.error(libc::EINVAL);
			return;
		};
		let Some(path) = path_str(&dir_path).map(str::to_owned) else {
			reply.error(libc::EINVAL);
			return;
		};

		let entries = match self.fs.readdir(&path) {
			Ok(e) => e,
			Err(e) => {
				reply.error(errno(&e));
				return;
			}
		};

		for (i, (name, child_ino)) in entries.iter().enumerate().skip(offset as usize) {
			let child_path = match name.as_str() {
				"." => dir_path.clone(),
				".." => dir_path.parent().map(Path::to_path_buf).unwrap_or_else(|| dir_path.clone()),
				_ => dir_path.join(name),
			};
			let fuse_child_ino = to_fuse_ino(*child_ino);
			self.paths.entry(fuse_child_ino).or_insert(child_path.clone());

			let kind = match path_str(&child_path).map(|p| self.fs.getattr(p)) {
				Some(Ok(attr)) if is_dir_mode(attr.mode) => FileType::Directory,
				_ => FileType::RegularFile,
			};
			if reply.add(fuse_child_ino, (i + 1) as i64, kind, name) {
				warn!("readdir {path}: filler buffer is full, returning early");
				break;
			}
		}
		reply.ok();
	}

	fn mknod(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, _rdev: u32, reply: ReplyEntry) {
		self.create(parent, name, false, reply)
	}

	fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, reply: ReplyEntry) {
		self.create(parent, name, true, reply)
	}

	fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		self.remove(parent, name, false, reply)
	}

	fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		self.remove(parent, name, true, reply)
	}

	fn rename(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		newparent: u64,
		newname: &OsStr,
		_flags: u32,
		reply: ReplyEmpty,
	) {
		let (Some(old_dir), Some(new_dir)) = (self.path_of(parent), self.path_of(newparent)) else {
			reply.error(libc::EINVAL);
			return;
		};
		let old_path = old_dir.join(name);
		let new_path = new_dir.join(newname);
		let (Some(old), Some(new)) = (path_str(&old_path).map(str::to_owned), path_str(&new_path).map(str::to_owned)) else {
			reply.error(libc::EINVAL);
			return;
		};

		match self.fs.rename(&old, &new) {
			Ok(()) => {
				let rebased: Vec<(u64, PathBuf)> = self
					.paths
					.iter()
					.filter_map(|(&ino, p)| rebase_path(p, &old_path, &new_path).map(|np| (ino, np)))
					.collect();
				for (ino, new_p) in rebased {
					self.paths.insert(ino, new_p);
				}
				reply.ok();
			}
			Err(e) => reply.error(errno(&e)),
		}
	}

	fn read(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, size: u32, _flags: i32, _lock_owner: Option<u64>, reply: ReplyData) {
		let Some(path) = self.path_of(ino).and_then(|p| path_str(&p).map(str::to_owned)) else {
			reply.error(libc::EINVAL);
			return;
		};
		let mut buf = vec![0u8; size as usize];
		match self.fs.read(&path, &mut buf, offset as u64) {
			Ok(n) => reply.data(&buf[..n]),
			Err(e) => reply.error(errno(&e)),
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn write(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, data: &[u8], _write_flags: u32, _flags: i32, _lock_owner: Option<u64>, reply: ReplyWrite) {
		let Some(path) = self.path_of(ino).and_then(|p| path_str(&p).map(str::to_owned)) else {
			reply.error(libc::EINVAL);
			return;
		};
		// `open`/`release` are no-ops (§6), so no per-handle flags survive to
		// here; the kernel already resolves `O_APPEND` into a concrete
		// `offset` before calling `write`, so `append` is always `false`.
		match self.fs.write(&path, data, offset as u64, false) {
			Ok(n) => reply.written(n as u32),
			Err(e) => reply.error(errno(&e)),
		}
	}

	fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
		match self.fs.statfs() {
			Ok(s) => reply.statfs(s.blocks, s.bfree, s.bavail, s.files, s.ffree, s.bsize, s.namelen, s.bsize),
			Err(e) => reply.error(errno(&e)),
		}
	}

	fn open(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
		reply.opened(0, 0);
	}

	fn release(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, _lock_owner: Option<u64>, _flush: bool, reply: ReplyEmpty) {
		reply.ok();
	}

	fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
		reply.opened(0, 0);
	}

	fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
		reply.ok();
	}
}

impl<D: BlockDevice> FuseAdapter<D> {
	fn create(&mut self, parent: u64, name: &OsStr, is_dir: bool, reply: ReplyEntry) {
		let Some(parent_path) = self.path_of(parent) else {
			reply.error(libc::EINVAL);
			return;
		};
		let child_path = parent_path.join(name);
		let Some(path) = path_str(&child_path).map(str::to_owned) else {
			reply.error(libc::EINVAL);
			return;
		};

		let result = if is_dir { self.fs.mkdir(&path) } else { self.fs.mknod(&path) };
		match result {
			Ok(child_ino) => {
				let fuse_ino = self.remember(child_path, child_ino);
				match self.file_attr(&path, fuse_ino) {
					Ok(attr) => reply.entry(&TTL, &attr, 0),
					Err(e) => reply.error(errno(&e)),
				}
			}
			Err(e) => reply.error(errno(&e)),
		}
	}

	fn remove(&mut self, parent: u64, name: &OsStr, is_dir: bool, reply: ReplyEmpty) {
		let Some(parent_path) = self.path_of(parent) else {
			reply.error(libc::EINVAL);
			return;
		};
		let child_path = parent_path.join(name);
		let Some(path) = path_str(&child_path).map(str::to_owned) else {
			reply.error(libc::EINVAL);
			return;
		};

		let result = if is_dir { self.fs.rmdir(&path) } else { self.fs.unlink(&path) };
		match result {
			Ok(()) => {
				self.paths.retain(|_, p| p != &child_path);
				reply.ok();
			}
			Err(e) => {
				debug!("remove {path}: {e}");
				reply.error(errno(&e));
			}
		}
	}
}
