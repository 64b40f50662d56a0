//! The repeating decimal-digit test pattern.
//!
//! Byte `i` of a pattern run is `b'0' + (i % 10)`. Writer and reader both
//! derive their bytes from [`digit`], so the two sides can never disagree on
//! what the wire should carry.

/// Number of distinct bytes before the pattern repeats.
pub const PERIOD: u64 = 10;

/// The pattern byte at `index`.
pub fn digit(index: u64) -> u8 {
    b'0' + (index % PERIOD) as u8
}

/// A buffer of `len` pattern bytes starting at pattern index `start`.
pub fn fill(start: u64, len: usize) -> Vec<u8> {
    (start..start + len as u64).map(digit).collect()
}

/// Total bytes moved by a sweep over transfer sizes `1..=max`.
pub fn triangular(max: u64) -> u64 {
    max * (max + 1) / 2
}

/// How a received byte is judged against the expected digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareMode {
    /// The byte must equal the pattern digit exactly.
    #[default]
    Exact,
    /// The byte is parsed as a decimal digit and compared numerically.
    /// Anything that is not a digit counts as `0`, so a NUL byte passes
    /// where `'0'` is expected.
    Legacy,
}

impl CompareMode {
    /// Whether `actual` is acceptable at pattern position `index`.
    pub fn matches(self, index: u64, actual: u8) -> bool {
        match self {
            CompareMode::Exact => actual == digit(index),
            CompareMode::Legacy => {
                let value = if actual.is_ascii_digit() {
                    u64::from(actual - b'0')
                } else {
                    0
                };
                value == index % PERIOD
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_cycles_through_ascii_digits() {
        for i in 0..1000u64 {
            assert_eq!(digit(i), b'0' + (i % 10) as u8);
        }
        assert_eq!(digit(u64::MAX), b'5');
    }

    #[test]
    fn fill_restarts_at_given_index() {
        assert_eq!(fill(0, 12), b"012345678901");
        assert_eq!(fill(3, 3), b"345");
        assert!(fill(0, 0).is_empty());
    }

    #[test]
    fn triangular_numbers() {
        assert_eq!(triangular(1), 1);
        assert_eq!(triangular(5), 15);
        assert_eq!(triangular(100), 5050);
    }

    #[test]
    fn exact_compare_rejects_everything_but_the_digit() {
        assert!(CompareMode::Exact.matches(0, b'0'));
        assert!(CompareMode::Exact.matches(13, b'3'));
        assert!(!CompareMode::Exact.matches(0, 0x00));
        assert!(!CompareMode::Exact.matches(4, b'5'));
    }

    #[test]
    fn legacy_compare_treats_non_digits_as_zero() {
        assert!(CompareMode::Legacy.matches(0, b'0'));
        assert!(CompareMode::Legacy.matches(10, 0x00));
        assert!(CompareMode::Legacy.matches(20, b'x'));
        assert!(!CompareMode::Legacy.matches(1, 0x00));
        assert!(CompareMode::Legacy.matches(7, b'7'));
    }
}
