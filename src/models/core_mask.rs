use crate::error::{PolicyError, PolicyResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::str::FromStr;

const WORDS: usize = 4;
const WORD_BITS: usize = 64;

/// A set of logical core indices in `[0, CoreMask::MAX_CORES)`.
///
/// Persists as a hexadecimal string (`"FFFF"`, `"0x55"`), which is how affinity
/// masks are usually written down.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CoreMask {
    words: [u64; WORDS],
}

impl CoreMask {
    pub const MAX_CORES: usize = WORDS * WORD_BITS;

    pub const fn empty() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Bits `[0, n)`. `n` saturates at `MAX_CORES`; callers validate core counts first.
    pub fn from_range(n: usize) -> Self {
        let n = n.min(Self::MAX_CORES);
        let mut words = [0u64; WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            let start = i * WORD_BITS;
            if n >= start + WORD_BITS {
                *word = u64::MAX;
            } else if n > start {
                *word = (1u64 << (n - start)) - 1;
            }
        }
        Self { words }
    }

    /// Bits `[start, end)`.
    pub fn from_span(start: usize, end: usize) -> Self {
        Self::from_range(end) & !Self::from_range(start)
    }

    pub fn single(core: usize) -> PolicyResult<Self> {
        let mut mask = Self::empty();
        mask.insert(core)?;
        Ok(mask)
    }

    pub fn from_cores<I: IntoIterator<Item = usize>>(cores: I) -> PolicyResult<Self> {
        let mut mask = Self::empty();
        for core in cores {
            mask.insert(core)?;
        }
        Ok(mask)
    }

    /// Bits at even positions 0, 2, 4, ... across the full width.
    pub const fn even_positions() -> Self {
        Self {
            words: [0x5555_5555_5555_5555; WORDS],
        }
    }

    pub fn insert(&mut self, core: usize) -> PolicyResult<()> {
        if core >= Self::MAX_CORES {
            return Err(PolicyError::CoreOutOfRange {
                index: core,
                max: Self::MAX_CORES,
            });
        }
        self.words[core / WORD_BITS] |= 1u64 << (core % WORD_BITS);
        Ok(())
    }

    pub fn remove(&mut self, core: usize) {
        if core < Self::MAX_CORES {
            self.words[core / WORD_BITS] &= !(1u64 << (core % WORD_BITS));
        }
    }

    pub fn contains(&self, core: usize) -> bool {
        core < Self::MAX_CORES && self.words[core / WORD_BITS] & (1u64 << (core % WORD_BITS)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn lowest_set_bit(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i * WORD_BITS + w.trailing_zeros() as usize)
    }

    pub fn is_subset_of(&self, other: &CoreMask) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & !b == 0)
    }

    pub fn is_disjoint(&self, other: &CoreMask) -> bool {
        (*self & *other).is_empty()
    }

    /// Shifts every bit `n` positions towards higher indices; bits past the width are dropped.
    pub fn shift_left(&self, n: usize) -> Self {
        if n >= Self::MAX_CORES {
            return Self::empty();
        }
        let word_shift = n / WORD_BITS;
        let bit_shift = n % WORD_BITS;
        let mut words = [0u64; WORDS];
        for i in (word_shift..WORDS).rev() {
            let src = i - word_shift;
            let mut value = self.words[src] << bit_shift;
            if bit_shift > 0 && src > 0 {
                value |= self.words[src - 1] >> (WORD_BITS - bit_shift);
            }
            words[i] = value;
        }
        Self { words }
    }

    pub fn and_not(&self, other: &CoreMask) -> Self {
        *self & !*other
    }

    /// Set core indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Self::MAX_CORES).filter(move |&i| self.contains(i))
    }

    pub fn cores(&self) -> Vec<usize> {
        self.iter().collect()
    }

    /// The lowest 64 cores as a plain integer, for platforms limited to one processor group.
    pub fn low_u64(&self) -> u64 {
        self.words[0]
    }

    /// Uppercase hex without leading zeros; `"0"` for the empty mask.
    pub fn to_hex(&self) -> String {
        let Some(top) = self.words.iter().rposition(|&w| w != 0) else {
            return "0".to_string();
        };
        let mut out = format!("{:X}", self.words[top]);
        for word in self.words[..top].iter().rev() {
            out.push_str(&format!("{:016X}", word));
        }
        out
    }

    pub fn from_hex(text: &str) -> PolicyResult<Self> {
        let trimmed = text.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let invalid = || PolicyError::InvalidMask(text.to_string());
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let digits = digits.trim_start_matches('0');
        if digits.len() > WORDS * 16 {
            return Err(invalid());
        }

        let mut words = [0u64; WORDS];
        let bytes = digits.as_bytes();
        for (i, word) in words.iter_mut().enumerate() {
            let end = bytes.len().saturating_sub(i * 16);
            if end == 0 {
                break;
            }
            let start = end.saturating_sub(16);
            let chunk = &digits[start..end];
            *word = u64::from_str_radix(chunk, 16).map_err(|_| invalid())?;
        }
        Ok(Self { words })
    }
}

impl From<u64> for CoreMask {
    fn from(value: u64) -> Self {
        let mut words = [0u64; WORDS];
        words[0] = value;
        Self { words }
    }
}

impl BitAnd for CoreMask {
    type Output = CoreMask;

    fn bitand(self, rhs: CoreMask) -> CoreMask {
        let mut words = self.words;
        for (w, r) in words.iter_mut().zip(rhs.words) {
            *w &= r;
        }
        CoreMask { words }
    }
}

impl BitOr for CoreMask {
    type Output = CoreMask;

    fn bitor(self, rhs: CoreMask) -> CoreMask {
        let mut words = self.words;
        for (w, r) in words.iter_mut().zip(rhs.words) {
            *w |= r;
        }
        CoreMask { words }
    }
}

impl Not for CoreMask {
    type Output = CoreMask;

    fn not(self) -> CoreMask {
        CoreMask {
            words: self.words.map(|w| !w),
        }
    }
}

impl fmt::Display for CoreMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for CoreMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoreMask(0x{})", self.to_hex())
    }
}

impl FromStr for CoreMask {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for CoreMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CoreMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        CoreMask::from_hex(&text).map_err(serde::de::Error::custom)
    }
}
