//! Frame checksum contract
//!
//! The protocol fixes only the shape of the checksum: a deterministic
//! function over the frame's type and payload bytes producing exactly two
//! trailer bytes, computed identically on both ends of the link. The
//! concrete algorithm is an interop choice; [`SumChecksum`] is the default
//! this crate ships.

/// Two-byte checksum over a frame's raw bytes
pub trait Checksum {
    /// Computes the checksum trailer for the given bytes
    fn compute(&self, buf: &[u8]) -> [u8; 2];
}

/// Default checksum: wrapping 16-bit sum of all bytes, big-endian trailer
///
/// Interop contract: both ends must agree on this exact function. Any
/// single-byte corruption changes the sum, which is all the discard-and-retry
/// error model requires.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumChecksum;

impl Checksum for SumChecksum {
    fn compute(&self, buf: &[u8]) -> [u8; 2] {
        let sum = buf
            .iter()
            .fold(0u16, |acc, &byte| acc.wrapping_add(byte as u16));
        sum.to_be_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_checksum_deterministic() {
        let checksum = SumChecksum;
        let data = b"W\x00\x01\x00\x011B5";
        assert_eq!(checksum.compute(data), checksum.compute(data));
    }

    #[test]
    fn test_sum_checksum_values() {
        let checksum = SumChecksum;
        assert_eq!(checksum.compute(&[]), [0x00, 0x00]);
        assert_eq!(checksum.compute(&[0x01, 0x02]), [0x00, 0x03]);
        // Wrapping past 16 bits
        let big = [0xFF; 300];
        let expected = (300u32 * 0xFF % 0x1_0000) as u16;
        assert_eq!(checksum.compute(&big), expected.to_be_bytes());
    }

    #[test]
    fn test_sum_checksum_detects_single_byte_change() {
        let checksum = SumChecksum;
        let base = checksum.compute(b"I S LED");
        let changed = checksum.compute(b"I S LEE");
        assert_ne!(base, changed);
    }
}
