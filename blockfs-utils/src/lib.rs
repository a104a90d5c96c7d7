//! Small helpers shared by the `blockfs` core library and the `blockfs-mount`
//! binary: device sizing and byte-count formatting. Nothing here is specific to
//! the on-disk format itself.

pub mod disk;
pub mod util;
