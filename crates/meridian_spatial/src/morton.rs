//! # Morton Codes
//!
//! A quadtree node is addressed by its cell coordinates interleaved into
//! one integer, prefixed with a sentinel bit marking the depth:
//!
//! ```text
//! code = 1 << (2 * depth) | interleave(x, z)
//! ```
//!
//! The root is `1`. Shifting right by 2 walks one level up, the depth is
//! `bit_width / 2`, and codes of different depths share prefixes with
//! their ancestors.

/// Morton code of a quadtree node. `0` means "no node".
pub type Morton = u32;

/// Deepest level whose codes still fit a [`Morton`].
pub const MAX_DEPTH: u32 = 15;

/// Code of the root node.
pub const ROOT: Morton = 1;

/// Bits consumed by one tree level.
pub const BITS_PER_LEVEL: u32 = 2;

/// Spreads the bits of `x` so that they occupy even positions.
#[inline]
#[must_use]
pub const fn part_bits_1by1(x: u16) -> u32 {
    let mut x = x as u32;
    x = (x | (x << 8)) & 0x00ff_00ff;
    x = (x | (x << 4)) & 0x0f0f_0f0f;
    x = (x | (x << 2)) & 0x3333_3333;
    x = (x | (x << 1)) & 0x5555_5555;
    x
}

/// Inverse of [`part_bits_1by1`]: gathers the even bits of `x`.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn compact_bits_1by1(x: u32) -> u16 {
    let mut x = x & 0x5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333;
    x = (x | (x >> 2)) & 0x0f0f_0f0f;
    x = (x | (x >> 4)) & 0x00ff_00ff;
    x = (x | (x >> 8)) & 0x0000_ffff;
    x as u16
}

/// Interleaves `x` (even bits) and `z` (odd bits).
#[inline]
#[must_use]
pub const fn morton_code2(x: u16, z: u16) -> u32 {
    part_bits_1by1(x) | (part_bits_1by1(z) << 1)
}

/// Splits an interleaved value back into `(x, z)`.
#[inline]
#[must_use]
pub const fn morton_decode2(code: u32) -> (u16, u16) {
    (compact_bits_1by1(code), compact_bits_1by1(code >> 1))
}

/// Number of significant bits.
#[inline]
#[must_use]
pub const fn bit_width(x: u32) -> u32 {
    u32::BITS - x.leading_zeros()
}

/// Depth of the node, root being 0.
#[inline]
#[must_use]
pub const fn depth(code: Morton) -> u32 {
    bit_width(code) / BITS_PER_LEVEL
}

/// Parent code. The parent of the root is 0.
#[inline]
#[must_use]
pub const fn parent(code: Morton) -> Morton {
    code >> BITS_PER_LEVEL
}

/// Code of cell `(x, z)` at `depth`.
#[inline]
#[must_use]
pub const fn from_cell(depth: u32, x: u16, z: u16) -> Morton {
    (1 << (BITS_PER_LEVEL * depth)) | morton_code2(x, z)
}

/// Splits a code into `(depth, x, z)`. Returns `None` for 0.
#[inline]
#[must_use]
pub const fn to_cell(code: Morton) -> Option<(u32, u16, u16)> {
    if code == 0 {
        return None;
    }
    let bits = bit_width(code);
    let (x, z) = morton_decode2(code ^ (1 << (bits - 1)));
    Some((bits / BITS_PER_LEVEL, x, z))
}

/// True if `ancestor` is `code` or one of its ancestors.
#[inline]
#[must_use]
pub const fn is_ancestor_or_self(ancestor: Morton, code: Morton) -> bool {
    let (a, c) = (bit_width(ancestor), bit_width(code));
    ancestor != 0 && a <= c && (code >> (c - a)) == ancestor
}

/// Lowest common ancestor of two nodes, possibly at different depths.
///
/// Both codes are brought to the same depth, then the common prefix is
/// cut at a whole-level boundary. The LCA with 0 is 0.
#[inline]
#[must_use]
pub const fn lca(mut a: Morton, mut b: Morton) -> Morton {
    if a == 0 || b == 0 {
        return 0;
    }

    let (bits_a, bits_b) = (bit_width(a), bit_width(b));
    if bits_a < bits_b {
        b >>= bits_b - bits_a;
    } else {
        a >>= bits_a - bits_b;
    }

    // Round the first differing bit up to a whole level
    let unequal = bit_width(a ^ b);
    let shift = unequal.div_ceil(BITS_PER_LEVEL) * BITS_PER_LEVEL;
    match a.checked_shr(shift) {
        Some(code) => code,
        None => 0,
    }
}

/// Largest power of two not above `x`. Returns 0 for 0.
#[inline]
#[must_use]
pub const fn prev_pow2(x: u32) -> u32 {
    if x == 0 {
        0
    } else {
        1 << (bit_width(x) - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleave_round_trip() {
        for (x, z) in [(0u16, 0u16), (1, 0), (0, 1), (5, 9), (0x7fff, 0x1234)] {
            assert_eq!(morton_decode2(morton_code2(x, z)), (x, z));
        }
        assert_eq!(morton_code2(1, 0), 0b01);
        assert_eq!(morton_code2(0, 1), 0b10);
        assert_eq!(morton_code2(3, 3), 0b1111);
    }

    #[test]
    fn test_depth_and_parent() {
        assert_eq!(depth(ROOT), 0);
        let code = from_cell(3, 5, 2);
        assert_eq!(depth(code), 3);
        assert_eq!(to_cell(code), Some((3, 5, 2)));
        assert_eq!(parent(code), from_cell(2, 2, 1));
        assert_eq!(parent(ROOT), 0);
        assert_eq!(to_cell(0), None);
    }

    #[test]
    fn test_lca_siblings_and_ancestors() {
        let a = from_cell(2, 0, 0);
        let b = from_cell(2, 1, 0);
        assert_eq!(lca(a, b), from_cell(1, 0, 0));
        assert_eq!(lca(a, from_cell(2, 3, 3)), ROOT);

        let deep = from_cell(4, 1, 1);
        assert_eq!(lca(deep, a), a);
        assert_eq!(lca(a, deep), a);
        assert_eq!(lca(a, a), a);
        assert_eq!(lca(ROOT, deep), ROOT);
        assert_eq!(lca(0, deep), 0);
    }

    #[test]
    fn test_is_ancestor_or_self() {
        let code = from_cell(3, 6, 1);
        assert!(is_ancestor_or_self(ROOT, code));
        assert!(is_ancestor_or_self(code, code));
        assert!(is_ancestor_or_self(parent(code), code));
        assert!(!is_ancestor_or_self(code, parent(code)));
        assert!(!is_ancestor_or_self(from_cell(3, 6, 0), code));
    }

    #[test]
    fn test_prev_pow2() {
        assert_eq!(prev_pow2(0), 0);
        assert_eq!(prev_pow2(1), 1);
        assert_eq!(prev_pow2(7), 4);
        assert_eq!(prev_pow2(8), 8);
    }

    #[test]
    fn test_max_depth_fits() {
        let max = u16::try_from((1u32 << MAX_DEPTH) - 1).unwrap();
        let code = from_cell(MAX_DEPTH, max, max);
        assert_eq!(depth(code), MAX_DEPTH);
        assert_eq!(to_cell(code), Some((MAX_DEPTH, max, max)));
    }
}
