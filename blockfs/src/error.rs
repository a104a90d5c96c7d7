//! Error type for the filesystem core (§7 Error Handling Design).
//!
//! Operations return [`FsError`] internally; [`FsError::errno`] maps each
//! variant to the negated POSIX error code a FUSE host expects to return from
//! its operation callbacks.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
	/// `ENOENT`: a path did not resolve to an existing entry.
	#[error("no such file or directory")]
	NotFound,
	/// `EEXIST`: the target of a create or rename already exists.
	#[error("file exists")]
	Exists,
	/// `ENOSPC`: the inode or data bitmap has no clear bit left.
	#[error("no space left on device")]
	NoSpace,
	/// `EFBIG`: the requested offset/size exceeds `MAX_FILE_SIZE`.
	#[error("file too large")]
	TooBig,
	/// `ENOTDIR`: a non-directory inode was used where a directory was required.
	#[error("not a directory")]
	NotADirectory,
	/// `EISDIR`: a directory inode was used where a regular file was required.
	#[error("is a directory")]
	IsADirectory,
	/// `ENAMETOOLONG`: a path component exceeded `MAX_FILENAME_LEN`.
	#[error("name too long")]
	NameTooLong,
	/// `ENOTEMPTY`: `rmdir` target still has live directory entries.
	#[error("directory not empty")]
	NotEmpty,
	/// `-EIO`: the block device adapter itself failed, or on-disk state
	/// violated an invariant the core relies on (e.g. an out-of-range inode
	/// index).
	#[error("i/o error: {0}")]
	Io(#[from] io::Error),
}

impl FsError {
	/// Returns the negated POSIX error code a FUSE binding should reply with.
	pub fn errno(&self) -> i32 {
		let code = match self {
			Self::NotFound => libc::ENOENT,
			Self::Exists => libc::EEXIST,
			Self::NoSpace => libc::ENOSPC,
			Self::TooBig => libc::EFBIG,
			Self::NotADirectory => libc::ENOTDIR,
			Self::IsADirectory => libc::EISDIR,
			Self::NameTooLong => libc::ENAMETOOLONG,
			Self::NotEmpty => libc::ENOTEMPTY,
			Self::Io(_) => libc::EIO,
		};
		-code
	}
}

pub type FsResult<T> = Result<T, FsError>;
