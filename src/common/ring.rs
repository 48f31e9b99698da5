//! Circular identifier arithmetic over a `2^bits` ring.

use rand::Rng;

use crate::common::{DecodeIdError, Id, ID_SIZE, MAX_BITS};
use crate::{Error, Result};

/// Default ring width.
pub const DEFAULT_BITS: usize = MAX_BITS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Identifier space of a ring with `2^bits` positions.
///
/// Every operation returns values in `[0, 2^bits)` as long as its inputs are.
pub struct IdSpace {
    bits: usize,
    mask: Id,
}

impl IdSpace {
    /// Returns [Error::InvalidWidth] unless `1 <= bits <= 160`.
    pub fn new(bits: usize) -> Result<Self> {
        if bits == 0 || bits > MAX_BITS {
            return Err(Error::InvalidWidth(bits));
        }

        Ok(IdSpace {
            bits,
            mask: Id::low_mask(bits),
        })
    }

    // === Getters ===

    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Largest identifier of this space.
    pub fn max(&self) -> Id {
        self.mask
    }

    /// Returns true if `id` is inside `[0, 2^bits)`.
    pub fn contains(&self, id: &Id) -> bool {
        *id & self.mask == *id
    }

    /// Reduce `id` modulo `2^bits`.
    pub fn reduce(&self, id: Id) -> Id {
        id & self.mask
    }

    pub fn random_id(&self) -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        self.reduce(Id(random_bytes))
    }

    // === Arithmetic ===

    pub fn add(&self, a: &Id, b: &Id) -> Id {
        self.reduce(a.wrapping_add(b))
    }

    pub fn sub(&self, a: &Id, b: &Id) -> Id {
        self.reduce(a.wrapping_sub(b))
    }

    pub fn increment(&self, id: &Id) -> Id {
        self.add(id, &Id::from(1))
    }

    pub fn decrement(&self, id: &Id) -> Id {
        self.sub(id, &Id::from(1))
    }

    /// `id + 2^power`, the start of the finger table wedge `power`.
    pub fn successor_id(&self, id: &Id, power: usize) -> Id {
        self.add(id, &self.reduce(Id::power_of_two(power)))
    }

    /// `id - 2^power`.
    pub fn predecessor_id(&self, id: &Id, power: usize) -> Id {
        self.sub(id, &self.reduce(Id::power_of_two(power)))
    }

    /// `id << logbase`, dropping the bits that leave the ring.
    pub fn double_id(&self, id: &Id, logbase: usize) -> Id {
        self.reduce(*id << logbase)
    }

    /// Forward (clockwise) distance from `a` to `b`, zero when `a == b`.
    pub fn distance(&self, a: &Id, b: &Id) -> Id {
        self.sub(b, a)
    }

    // === Bit helpers ===

    /// The `n` most significant bits of `a`, with `n <= 64` and `n <= bits`.
    pub fn top_bits(&self, n: usize, a: &Id) -> u64 {
        let n = n.min(64).min(self.bits);
        let top = *a >> (self.bits - n);

        u64::from_be_bytes(
            top.0[ID_SIZE - 8..]
                .try_into()
                .unwrap_or([0; 8]),
        )
    }

    /// Drop the `n` most significant bits of `a` and shift the rest up by `n`.
    pub fn shift_top_bits_out(&self, n: usize, a: &Id) -> Id {
        let n = n.min(self.bits);

        self.reduce((*a & Id::low_mask(self.bits - n)) << n)
    }

    /// Index of the most significant bit where `a` and `b` differ.
    pub fn bit_index_mismatch(&self, a: &Id, b: &Id) -> Option<usize> {
        let diff = (*a ^ *b) & self.mask;

        diff.bits().checked_sub(1)
    }

    /// Walking down from bit `from`, the index where a run of `nzero`
    /// consecutive zero bits of `p` ends.
    pub fn bit_index_zeros(&self, p: &Id, from: usize, nzero: usize) -> Option<usize> {
        let from = from.min(self.bits - 1);
        let mut run = 0;

        for index in (0..=from).rev() {
            if p.bit(index) {
                run = 0;
                continue;
            }

            run += 1;
            if run >= nzero {
                return Some(index);
            }
        }

        None
    }

    /// Keep the bits of `n` above `pos` and splice the `pos + 1` most
    /// significant bits of `x` below them.
    pub fn create_bits(&self, n: &Id, pos: usize, x: &Id) -> Id {
        let pos = pos.min(self.bits - 1);
        let high = *n & !Id::low_mask(pos + 1);
        let low = *x >> (self.bits - pos - 1);

        self.reduce(high | low)
    }

    // === Codec ===

    /// Parse at most `bits / 4` hex digits (rounded up), rejecting values outside the ring.
    pub fn parse_id(&self, s: &str) -> std::result::Result<Id, DecodeIdError> {
        let id = Id::parse_hex(s, self.bits.div_ceil(4))?;

        if !self.contains(&id) {
            return Err(DecodeIdError::OutOfRange(self.bits));
        }

        Ok(id)
    }

    /// Zero padded lower case hex, `bits / 4` digits rounded up.
    pub fn format_id(&self, id: &Id) -> String {
        id.to_hex(self.bits.div_ceil(4))
    }
}

impl Default for IdSpace {
    fn default() -> Self {
        IdSpace {
            bits: DEFAULT_BITS,
            mask: Id::MAX,
        }
    }
}

/// `n` in the open interval `(a, b)`. When `a == b` this is everyone except `a`.
pub fn between(a: &Id, b: &Id, n: &Id) -> bool {
    if a == b {
        n != a
    } else if a < b {
        a < n && n < b
    } else {
        n > a || n < b
    }
}

/// `n` in `[a, b)`. When `a == b` only `a` itself matches.
pub fn between_left_incl(a: &Id, b: &Id, n: &Id) -> bool {
    if a == b {
        n == a
    } else if a < b {
        a <= n && n < b
    } else {
        n >= a || n < b
    }
}

/// `n` in `(a, b]`. When `a == b` only `a` itself matches.
pub fn between_right_incl(a: &Id, b: &Id, n: &Id) -> bool {
    if a == b {
        n == a
    } else if a < b {
        a < n && n <= b
    } else {
        n > a || n <= b
    }
}

/// `n` in `[a, b]`. When `a == b` only `a` itself matches.
pub fn between_both_incl(a: &Id, b: &Id, n: &Id) -> bool {
    if a == b {
        n == a
    } else if a < b {
        a <= n && n <= b
    } else {
        n >= a || n <= b
    }
}
