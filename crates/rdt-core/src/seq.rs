//! Modular sequence arithmetic.
//!
//! Blocks carry their absolute index modulo M on the wire. These helpers
//! recover the absolute index from a window base, and are the only place
//! that conversion happens.

/// Absolute position of a block in the file. Signed so the go-back-n
/// receiver can start at -1.
pub type BlockIndex = i64;

/// The unique `k` in `[base, base + modulus)` with `k mod modulus == num`.
pub fn resolve_forward(base: BlockIndex, num: u8, modulus: usize) -> BlockIndex {
    debug_assert!((num as usize) < modulus);
    let m = modulus as i64;
    let num = num as i64;
    let r = base.rem_euclid(m);
    base + num - r + if r <= num { 0 } else { m }
}

/// The unique `k` in `(base - 1 - modulus, base - 1]` with
/// `k mod modulus == num`.
pub fn resolve_backward(base: BlockIndex, num: u8, modulus: usize) -> BlockIndex {
    debug_assert!((num as usize) < modulus);
    let m = modulus as i64;
    let num = num as i64;
    let r = (base - 1).rem_euclid(m);
    base - 1 - r + num - if num <= r { 0 } else { m }
}

/// Wire number of an absolute index.
pub fn wire_number(index: BlockIndex, modulus: usize) -> u8 {
    index.rem_euclid(modulus as i64) as u8
}

pub(crate) fn slot(index: BlockIndex, modulus: usize) -> usize {
    index.rem_euclid(modulus as i64) as usize
}
