//! Branch identities: static sites and context-mixed keys.

use std::fmt;
use std::panic::Location;

/// Starting value of the rolling execution-path hash.
pub const INITIAL_PATH_HASH: u64 = 0x9982_101e_e438_24bd;

/// 64-bit key identifying a branch occurrence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchId(pub u64);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl BranchId {
    /// Site id derived from a source location (FNV-1a over file, line, column).
    pub fn from_location(loc: &Location<'_>) -> Self {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        let line = loc.line().to_le_bytes();
        let column = loc.column().to_le_bytes();
        for &b in loc.file().as_bytes().iter().chain(&line).chain(&column) {
            h ^= u64::from(b);
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
        }
        BranchId(h)
    }
}

/// SplitMix64 finalizer applied to `a ^ rotl(b)`.
#[inline]
pub fn mix(a: u64, b: u64) -> u64 {
    let mut z = a ^ b.rotate_left(31);
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Context key of `site` reached along `path_hash`.
#[inline]
pub fn context_key(site: u64, path_hash: u64) -> u64 {
    mix(site, path_hash)
}

/// Advance the rolling path hash past a visit of `id` that took `taken`.
#[inline]
pub fn advance_path(path_hash: u64, id: BranchId, taken: bool) -> u64 {
    mix(path_hash, id.0.wrapping_mul(2).wrapping_add(u64::from(taken)))
}
