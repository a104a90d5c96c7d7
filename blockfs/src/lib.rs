//! `blockfs`: a block-structured, POSIX-style filesystem core meant to be
//! loaded by a userspace FUSE host. See [`Filesystem`] for the entry point.

mod bitmap;
mod block_map;
mod dir;
mod error;
mod fs;
mod inode;
mod layout;
mod ops;
mod path;
mod raw;

pub mod device;

pub use error::{FsError, FsResult};
pub use fs::{finalize, Filesystem};
pub use layout::{
	Superblock, DEFAULT_INODE_COUNT, DIRECT_POINTERS, INDIRECT_POINTERS, MAX_FILENAME_LEN,
};
pub use ops::{FileAttr, StatFs};
pub use path::ROOT_INO;
