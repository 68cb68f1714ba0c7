//! Byte-range planning for multipart sessions.

use bytes::Bytes;
use std::num::NonZeroUsize;

/// Number of parts of `part_size` bytes needed for `len` bytes.
pub fn part_count(len: usize, part_size: NonZeroUsize) -> usize {
    len.div_ceil(part_size.get())
}

/// Split `bytes` into consecutive parts of `part_size` bytes, numbered from 1.
///
/// Parts are zero-copy slices; the last may be smaller.
pub fn split_parts(bytes: &Bytes, part_size: NonZeroUsize) -> Vec<(usize, Bytes)> {
    let size = part_size.get();
    (1..)
        .zip((0..bytes.len()).step_by(size))
        .map(|(part_number, offset)| {
            let end = std::cmp::min(offset + size, bytes.len());
            (part_number, bytes.slice(offset..end))
        })
        .collect()
}
