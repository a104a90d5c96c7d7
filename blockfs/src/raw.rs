//! Byte-level (de)serialization for the fixed-size, packed on-disk structures
//! (§3 Data Model, §6 "structures are packed with no padding beyond natural
//! alignment"). Grounded on the teacher's approach in `mkfs/src/ext2.rs`,
//! which reads/writes its `Superblock`/`BlockGroupDescriptor`/`INode` structs
//! by reinterpreting a `&mut T` as a byte slice rather than hand-rolling a
//! field-by-field (de)serializer.

use std::mem::size_of;
use std::slice;

/// Views a `repr(C)` plain-old-data struct as its on-disk byte representation.
pub(crate) fn as_bytes<T: Sized>(v: &T) -> &[u8] {
	unsafe { slice::from_raw_parts((v as *const T) as *const u8, size_of::<T>()) }
}

/// Views a `repr(C)` plain-old-data struct as a mutable on-disk byte buffer.
pub(crate) fn as_bytes_mut<T: Sized>(v: &mut T) -> &mut [u8] {
	unsafe { slice::from_raw_parts_mut((v as *mut T) as *mut u8, size_of::<T>()) }
}
