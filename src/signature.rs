//! Bit-packed record of branch outcomes along one execution.
//!
//! One bit per branch *visit* in visitation order, most significant bit first
//! within each 64-bit word. Two signatures are compared by Hamming distance;
//! a shorter signature is treated as zero-padded.

/// Per-sample sequence of branch outcomes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathSignature {
    words: Vec<u64>,
    len: usize,
}

impl PathSignature {
    /// Create an empty signature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one outcome.
    #[inline]
    pub fn push(&mut self, bit: bool) {
        let offset = self.len % 64;
        if offset == 0 {
            self.words.push(0);
        }
        if bit {
            if let Some(last) = self.words.last_mut() {
                *last |= 1u64 << (63 - offset);
            }
        }
        self.len += 1;
    }

    /// Outcome of the `i`-th visit, if recorded.
    pub fn get(&self, i: usize) -> Option<bool> {
        if i >= self.len {
            return None;
        }
        Some((self.words[i / 64] >> (63 - i % 64)) & 1 == 1)
    }

    /// Number of recorded visits.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing was recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of positions at which the two signatures differ.
    pub fn hamming(&self, other: &PathSignature) -> u64 {
        let n = self.words.len().max(other.words.len());
        (0..n)
            .map(|i| {
                let a = self.words.get(i).copied().unwrap_or(0);
                let b = other.words.get(i).copied().unwrap_or(0);
                u64::from((a ^ b).count_ones())
            })
            .sum()
    }

    /// Forget all outcomes, keeping the allocation.
    pub fn clear(&mut self) {
        self.words.clear();
        self.len = 0;
    }
}
