//! Power-of-two arithmetic used to size buffers and allocator classes.
//!
//! All helpers are `const` and never panic: operations that could overflow return
//! `None` instead.

/// Returns true if `n` is a (non-zero) power of two.
#[inline]
pub const fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Returns the smallest power of two greater than or equal to `n`.
///
/// `0` rounds up to `1`. Returns `None` if the result does not fit in a `usize`.
#[inline]
pub const fn next_power_of_two(n: usize) -> Option<usize> {
    n.checked_next_power_of_two()
}

/// Rounds `n` up to the next multiple of `multiple`.
///
/// Returns `None` if `multiple` is zero or the result overflows.
#[inline]
pub const fn round_up(n: usize, multiple: usize) -> Option<usize> {
    if multiple == 0 {
        return None;
    }
    let remainder = n % multiple;
    if remainder == 0 {
        return Some(n);
    }
    n.checked_add(multiple - remainder)
}

/// Rounds `n` up to the next multiple of `align`, which must be a power of two.
///
/// Returns `None` if `align` is not a power of two or the result overflows.
#[inline]
pub const fn align_up(n: usize, align: usize) -> Option<usize> {
    if !is_power_of_two(align) {
        return None;
    }
    match n.checked_add(align - 1) {
        Some(sum) => Some(sum & !(align - 1)),
        None => None,
    }
}

/// Returns `floor(log2(n))`, or `None` for zero.
#[inline]
pub const fn log2_floor(n: usize) -> Option<u32> {
    if n == 0 {
        return None;
    }
    Some(usize::BITS - 1 - n.leading_zeros())
}
