//! Chunk size/count arithmetic.

use crate::CHUNK_SIZE;

/// Size in bytes of chunk `chunk_nr` of a file of `file_size` bytes.
///
/// Returns [`CHUNK_SIZE`] for chunks fully inside the file, 0 for chunks
/// entirely past its end, and the trailing remainder for the last partial
/// chunk. When `file_size` is an exact multiple of the capacity this
/// yields 0 for the index one past the last full chunk; external tooling
/// relies on that exact boundary behavior, so it stays.
pub fn chunk_size(chunk_nr: usize, file_size: u64) -> u64 {
    let end = (chunk_nr as u64 + 1).saturating_mul(CHUNK_SIZE);

    if end <= file_size {
        return CHUNK_SIZE;
    }
    if end - file_size > CHUNK_SIZE {
        return 0;
    }
    file_size % CHUNK_SIZE
}

/// Number of chunks a file of `file_size` bytes occupies (0 when empty).
pub fn chunk_count(file_size: u64) -> usize {
    file_size.div_ceil(CHUNK_SIZE) as usize
}
