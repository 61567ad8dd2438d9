//! Payload integrity codes.
//!
//! Both peers must agree on the algorithm out-of-band; the wire carries only
//! the 16-bit result.  The code covers the payload bytes alone, never the
//! sequence byte.

use std::fmt;
use std::str::FromStr;

/// CRC-16 generator polynomial (x^16 + x^15 + x^2 + 1).
const CRC16_POLY: u16 = 0x8005;
const CRC16_INIT: u16 = 0xFFFF;

/// Which integrity code a session computes over each payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumKind {
    /// One's-complement sum of big-endian 16-bit words (RFC 1071 style).
    #[default]
    Internet,
    /// CRC-16, polynomial 0x8005, init 0xFFFF, MSB-first, no final XOR.
    Crc16,
}

impl ChecksumKind {
    /// Compute the integrity code for `payload`.
    pub fn compute(self, payload: &[u8]) -> u16 {
        match self {
            ChecksumKind::Internet => internet_checksum(payload),
            ChecksumKind::Crc16 => crc16(payload),
        }
    }

    /// `true` when `code` matches the value recomputed over `payload`.
    ///
    /// A mismatch is an expected input on a lossy link, so this never errors.
    pub fn integrity_ok(self, payload: &[u8], code: u16) -> bool {
        self.compute(payload) == code
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumKind::Internet => f.write_str("internet"),
            ChecksumKind::Crc16 => f.write_str("crc16"),
        }
    }
}

impl FromStr for ChecksumKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "internet" | "sum" => Ok(ChecksumKind::Internet),
            "crc16" | "crc" => Ok(ChecksumKind::Crc16),
            other => Err(format!("unknown checksum algorithm: {other}")),
        }
    }
}

/// Internet-style checksum over `data`.
///
/// Sum consecutive 16-bit big-endian words, fold the carry, return the
/// one's-complement.  An odd trailing byte is added as a standalone low byte.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);

    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
        // Fold eagerly so the accumulator never overflows on large payloads.
        sum = (sum & 0xffff) + (sum >> 16);
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last);
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}

/// Bitwise CRC-16 over `data` (the CRC-16/CMS parameter set).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internet_checksum_rfc1071_example() {
        // RFC 1071 §3: the words sum to 0xddf2, complement 0x220d.
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(internet_checksum(&data), 0x220d);
    }

    #[test]
    fn internet_checksum_odd_byte_is_low_byte() {
        // 0x0102 + 0x0003 = 0x0105
        assert_eq!(internet_checksum(&[0x01, 0x02, 0x03]), !0x0105);
    }

    #[test]
    fn internet_checksum_folds_carry() {
        // 0xffff + 0x0001 = 0x1_0000 -> folds to 0x0001
        assert_eq!(internet_checksum(&[0xff, 0xff, 0x00, 0x01]), !0x0001);
    }

    #[test]
    fn crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0xAEE7);
    }

    #[test]
    fn empty_payload_is_well_defined() {
        assert_eq!(internet_checksum(&[]), 0xFFFF);
        assert_eq!(crc16(&[]), 0xFFFF);
        for kind in [ChecksumKind::Internet, ChecksumKind::Crc16] {
            assert!(kind.integrity_ok(&[], kind.compute(&[])));
        }
    }

    #[test]
    fn recomputed_code_always_verifies() {
        let payloads: [&[u8]; 5] = [b"", b"a", b"ab", b"hello world", &[0xff; 1024]];
        for kind in [ChecksumKind::Internet, ChecksumKind::Crc16] {
            for p in payloads {
                assert!(kind.integrity_ok(p, kind.compute(p)), "{kind} on {p:?}");
            }
        }
    }

    #[test]
    fn every_single_bit_flip_is_detected() {
        let payload: Vec<u8> = (0..64u8).collect();
        for kind in [ChecksumKind::Internet, ChecksumKind::Crc16] {
            let code = kind.compute(&payload);
            for byte in 0..payload.len() {
                for bit in 0..8 {
                    let mut corrupted = payload.clone();
                    corrupted[byte] ^= 1 << bit;
                    assert!(
                        !kind.integrity_ok(&corrupted, code),
                        "{kind}: flip of byte {byte} bit {bit} went unnoticed"
                    );
                }
            }
        }
    }

    #[test]
    fn parses_algorithm_names() {
        assert_eq!("crc16".parse::<ChecksumKind>(), Ok(ChecksumKind::Crc16));
        assert_eq!("Internet".parse::<ChecksumKind>(), Ok(ChecksumKind::Internet));
        assert!("md5".parse::<ChecksumKind>().is_err());
    }
}
