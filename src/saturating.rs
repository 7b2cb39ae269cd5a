//! Overflow-clamping arithmetic for duration components.
//!
//! A result equal to `u32::MAX` means "overflowed" rather than a precise
//! duration. Absurd inputs like `999999999999d` end up there instead of
//! wrapping into a small, silently accepted length.

use tracing::debug;

/// `a + b`, or `u32::MAX` if the sum does not fit.
pub fn add(a: u32, b: u32) -> u32 {
    a.checked_add(b).unwrap_or_else(|| {
        debug!(a, b, "overflowing addition");
        u32::MAX
    })
}

/// `a * factor`, or `u32::MAX` if the product does not fit.
pub fn multiply(a: u32, factor: u32) -> u32 {
    a.checked_mul(factor).unwrap_or_else(|| {
        debug!(a, factor, "overflowing multiplication");
        u32::MAX
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_exact_below_the_limit() {
        assert_eq!(add(0, 0), 0);
        assert_eq!(add(40, 2), 42);
        assert_eq!(add(u32::MAX - 1, 1), u32::MAX);
    }

    #[test]
    fn add_clamps_instead_of_wrapping() {
        let cases = [
            (u32::MAX, 1),
            (u32::MAX - 10, 11),
            (u32::MAX, u32::MAX),
            (1 << 31, 1 << 31),
        ];
        for (a, b) in cases {
            assert_eq!(add(a, b), u32::MAX, "{a} + {b}");
        }
    }

    #[test]
    fn multiply_clamps_instead_of_wrapping() {
        assert_eq!(multiply(3, 60), 180);
        assert_eq!(multiply(u32::MAX, 0), 0);
        assert_eq!(multiply(u32::MAX, 1), u32::MAX);
        assert_eq!(multiply(u32::MAX - 145, 86_400), u32::MAX);
        assert_eq!(multiply(1 << 16, 1 << 16), u32::MAX);
    }

    #[test]
    fn results_never_fall_below_the_larger_operand() {
        let samples = [0, 1, 999, 86_400, u32::MAX / 2, u32::MAX - 1, u32::MAX];
        for a in samples {
            for b in samples {
                let sum = add(a, b);
                assert!(sum >= a.max(b));
                assert!(sum == u32::MAX || u64::from(sum) == u64::from(a) + u64::from(b));

                let product = multiply(a, b);
                let exact = u64::from(a) * u64::from(b);
                assert!(product == u32::MAX || u64::from(product) == exact);
                if exact > u64::from(u32::MAX) {
                    assert_eq!(product, u32::MAX);
                }
            }
        }
    }
}
