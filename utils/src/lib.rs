//! Leverage common functionality across conduit primitives.

pub mod bits;

/// Creates a [`core::num::NonZeroUsize`] from a value, failing to compile (in const contexts)
/// or panicking (otherwise) if the value is zero.
///
/// # Example
///
/// ```
/// use conduit_utils::NZUsize;
///
/// const SIZE: core::num::NonZeroUsize = NZUsize!(16 * 1024);
/// assert_eq!(SIZE.get(), 16_384);
/// ```
#[macro_export]
macro_rules! NZUsize {
    ($val:expr) => {
        match ::core::num::NonZeroUsize::new($val) {
            Some(value) => value,
            None => panic!("value must be non-zero"),
        }
    };
}

#[cfg(test)]
mod tests {
    use core::num::NonZeroUsize;

    #[test]
    fn test_nzusize() {
        const VALUE: NonZeroUsize = NZUsize!(8);
        assert_eq!(VALUE.get(), 8);
        assert_eq!(NZUsize!(1).get(), 1);
    }

    #[test]
    #[should_panic(expected = "value must be non-zero")]
    fn test_nzusize_zero() {
        let zero = 0;
        let _ = NZUsize!(zero);
    }
}
