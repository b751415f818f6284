// SPDX-License-Identifier: GPL-2.0

/// Rounds `value` up to the next multiple of `align`, which must be a power of two.
///
/// Returns `None` on overflow.
pub(crate) const fn align_up(value: u32, align: u32) -> Option<u32> {
    let mask = align - 1;
    match value.checked_add(mask) {
        Some(v) => Some(v & !mask),
        None => None,
    }
}

/// Returns the low 32 bits of `value`.
#[inline]
pub(crate) const fn lo32(value: u64) -> u32 {
    value as u32
}

/// Serializes a list of words into little-endian bytes, the byte order of falcon memories.
pub(crate) fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
