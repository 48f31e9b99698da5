//! Chord node Id or a lookup target
use std::fmt::{self, Debug, Display, Formatter};
use std::net::SocketAddr;
use std::ops::{BitAnd, BitOr, BitXor, Not, Shl, Shr};
use std::str::FromStr;

use rand::Rng;

use crate::{Error, Result};

/// The size of node IDs in bytes.
pub const ID_SIZE: usize = 20;
/// The widest ring supported, in bits.
pub const MAX_BITS: usize = ID_SIZE * 8;

#[derive(Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash, Default)]
/// Chord node Id or a lookup target, a 160 bits big-endian unsigned integer.
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    pub const ZERO: Id = Id([0; ID_SIZE]);
    pub const MAX: Id = Id([u8::MAX; ID_SIZE]);

    /// Random 160 bits Id, see [crate::IdSpace::random_id] for narrower rings.
    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; 20] = rng.gen();

        Id(random_bytes)
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE](crate::common::ID_SIZE).
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();
        let tmp: [u8; ID_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidIdSize(bytes.len()))?;

        Ok(Id(tmp))
    }

    /// Sha1 of the ip octets followed by the big-endian port.
    pub fn from_address(address: &SocketAddr) -> Id {
        let mut hasher = sha1_smol::Sha1::new();

        match address {
            SocketAddr::V4(v4) => hasher.update(&v4.ip().octets()),
            SocketAddr::V6(v6) => hasher.update(&v6.ip().octets()),
        }
        hasher.update(&address.port().to_be_bytes());

        Id(hasher.digest().bytes())
    }

    /// 2^`exponent`, or zero if `exponent` is out of range.
    pub fn power_of_two(exponent: usize) -> Id {
        let mut id = Id::ZERO;

        if exponent < MAX_BITS {
            id.0[ID_SIZE - 1 - exponent / 8] = 1 << (exponent % 8);
        }

        id
    }

    /// 2^`bits` - 1, saturating at [Id::MAX].
    pub fn low_mask(bits: usize) -> Id {
        if bits >= MAX_BITS {
            return Id::MAX;
        }

        let mut id = Id::ZERO;
        for i in 0..bits {
            id.0[ID_SIZE - 1 - i / 8] |= 1 << (i % 8);
        }

        id
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Value of the bit at `index`, counting from the least significant bit.
    pub fn bit(&self, index: usize) -> bool {
        if index >= MAX_BITS {
            return false;
        }

        self.0[ID_SIZE - 1 - index / 8] & (1 << (index % 8)) != 0
    }

    pub fn leading_zeros(&self) -> usize {
        for (i, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return i * 8 + byte.leading_zeros() as usize;
            }
        }

        MAX_BITS
    }

    /// Number of significant bits, zero for [Id::ZERO].
    pub fn bits(&self) -> usize {
        MAX_BITS - self.leading_zeros()
    }

    /// Addition modulo 2^160.
    pub fn wrapping_add(&self, other: &Id) -> Id {
        let mut result = Id::ZERO;
        let mut carry = 0u16;

        for i in (0..ID_SIZE).rev() {
            let sum = self.0[i] as u16 + other.0[i] as u16 + carry;
            result.0[i] = sum as u8;
            carry = sum >> 8;
        }

        result
    }

    /// Subtraction modulo 2^160.
    pub fn wrapping_sub(&self, other: &Id) -> Id {
        let mut result = Id::ZERO;
        let mut borrow = 0i16;

        for i in (0..ID_SIZE).rev() {
            let mut diff = self.0[i] as i16 - other.0[i] as i16 - borrow;
            borrow = 0;
            if diff < 0 {
                diff += 256;
                borrow = 1;
            }
            result.0[i] = diff as u8;
        }

        result
    }

    /// Lower case hex with exactly `digits` characters, keeping the least significant ones.
    pub(crate) fn to_hex(self, digits: usize) -> String {
        let full: String = self.0.iter().map(|b| format!("{b:02x}")).collect();

        full[full.len() - digits.min(full.len())..].to_string()
    }

    /// Parse at most `max_digits` hex characters, case insensitive.
    pub(crate) fn parse_hex(s: &str, max_digits: usize) -> std::result::Result<Id, DecodeIdError> {
        if s.is_empty() {
            return Err(DecodeIdError::Empty);
        }

        if s.len() > max_digits {
            return Err(DecodeIdError::TooLong {
                len: s.len(),
                max: max_digits,
            });
        }

        let mut id = Id::ZERO;
        for (i, c) in s.chars().rev().enumerate() {
            let nibble = c.to_digit(16).ok_or(DecodeIdError::InvalidCharacter(c))? as u8;
            id.0[ID_SIZE - 1 - i / 2] |= nibble << ((i % 2) * 4);
        }

        Ok(id)
    }
}

impl From<[u8; ID_SIZE]> for Id {
    fn from(bytes: [u8; ID_SIZE]) -> Id {
        Id(bytes)
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Id {
        let mut id = Id::ZERO;
        id.0[ID_SIZE - 8..].copy_from_slice(&value.to_be_bytes());

        id
    }
}

impl BitAnd for Id {
    type Output = Id;

    fn bitand(self, rhs: Id) -> Id {
        let mut id = self;
        id.0.iter_mut().zip(rhs.0).for_each(|(a, b)| *a &= b);
        id
    }
}

impl BitOr for Id {
    type Output = Id;

    fn bitor(self, rhs: Id) -> Id {
        let mut id = self;
        id.0.iter_mut().zip(rhs.0).for_each(|(a, b)| *a |= b);
        id
    }
}

impl BitXor for Id {
    type Output = Id;

    fn bitxor(self, rhs: Id) -> Id {
        let mut id = self;
        id.0.iter_mut().zip(rhs.0).for_each(|(a, b)| *a ^= b);
        id
    }
}

impl Not for Id {
    type Output = Id;

    fn not(self) -> Id {
        let mut id = self;
        id.0.iter_mut().for_each(|a| *a = !*a);
        id
    }
}

impl Shl<usize> for Id {
    type Output = Id;

    /// Shift towards the most significant bit, dropping overflowing bits.
    fn shl(self, shift: usize) -> Id {
        if shift >= MAX_BITS {
            return Id::ZERO;
        }

        let bytes = shift / 8;
        let bits = shift % 8;
        let mut id = Id::ZERO;

        for i in 0..ID_SIZE - bytes {
            let source = i + bytes;
            let mut byte = self.0[source] << bits;
            if bits > 0 && source + 1 < ID_SIZE {
                byte |= self.0[source + 1] >> (8 - bits);
            }
            id.0[i] = byte;
        }

        id
    }
}

impl Shr<usize> for Id {
    type Output = Id;

    fn shr(self, shift: usize) -> Id {
        if shift >= MAX_BITS {
            return Id::ZERO;
        }

        let bytes = shift / 8;
        let bits = shift % 8;
        let mut id = Id::ZERO;

        for i in bytes..ID_SIZE {
            let source = i - bytes;
            let mut byte = self.0[source] >> bits;
            if bits > 0 && source > 0 {
                byte |= self.0[source - 1] << (8 - bits);
            }
            id.0[i] = byte;
        }

        id
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex(ID_SIZE * 2))
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

impl FromStr for Id {
    type Err = DecodeIdError;

    fn from_str(s: &str) -> std::result::Result<Id, DecodeIdError> {
        Id::parse_hex(s, ID_SIZE * 2)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors decoding an [Id] from hex text.
pub enum DecodeIdError {
    #[error("Empty identifier")]
    Empty,

    #[error("Invalid hex character {0:?}")]
    InvalidCharacter(char),

    #[error("Identifier has {len} hex digits, at most {max} are allowed")]
    TooLong { len: usize, max: usize },

    #[error("Identifier does not fit in a {0} bits ring")]
    OutOfRange(usize),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_u64() {
        let id = Id::from(258);

        assert_eq!(id.0[ID_SIZE - 1], 2);
        assert_eq!(id.0[ID_SIZE - 2], 1);
        assert_eq!(id.bits(), 9);
    }

    #[test]
    fn display_and_parse() {
        let id = Id::from(0xdead_beef);

        assert_eq!(id.to_string(), "00000000000000000000000000000000deadbeef");
        assert_eq!(Id::from_str("DEADbeef").unwrap(), id);
        assert_eq!(Id::from_str(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(Id::from_str(""), Err(DecodeIdError::Empty));
        assert_eq!(
            Id::from_str("12g4"),
            Err(DecodeIdError::InvalidCharacter('g'))
        );
        assert_eq!(
            Id::from_str(&"f".repeat(41)),
            Err(DecodeIdError::TooLong { len: 41, max: 40 })
        );
    }

    #[test]
    fn wrapping_arithmetic() {
        assert_eq!(Id::MAX.wrapping_add(&Id::from(1)), Id::ZERO);
        assert_eq!(Id::ZERO.wrapping_sub(&Id::from(1)), Id::MAX);
        assert_eq!(Id::from(300).wrapping_sub(&Id::from(45)), Id::from(255));
        assert_eq!(Id::from(255).wrapping_add(&Id::from(1)), Id::from(256));
    }

    #[test]
    fn shifts() {
        let id = Id::from(0b1011);

        assert_eq!(id << 4, Id::from(0b1011_0000));
        assert_eq!(id >> 2, Id::from(0b10));
        assert_eq!(Id::from(1) << 159, Id::power_of_two(159));
        assert_eq!(Id::power_of_two(159) << 1, Id::ZERO);
        assert_eq!(Id::power_of_two(159) >> 159, Id::from(1));
        assert_eq!(Id::MAX >> 160, Id::ZERO);
    }

    #[test]
    fn masks() {
        assert_eq!(Id::low_mask(0), Id::ZERO);
        assert_eq!(Id::low_mask(8), Id::from(255));
        assert_eq!(Id::low_mask(12), Id::from(4095));
        assert_eq!(Id::low_mask(160), Id::MAX);
        assert!(Id::power_of_two(7).bit(7));
        assert!(!Id::power_of_two(7).bit(6));
    }

    #[test]
    fn address_ids_are_stable() {
        let a: SocketAddr = "127.0.0.1:6881".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:6882".parse().unwrap();

        assert_eq!(Id::from_address(&a), Id::from_address(&a));
        assert_ne!(Id::from_address(&a), Id::from_address(&b));
    }
}
