//! Lowest-free-block search.
//!
//! Parent blocks are searched in declaration order. Inside a parent,
//! candidates start at the parent's first address and step by the block
//! size, so the first candidate that overlaps neither a reserved range nor
//! an existing allocation is the lowest free block.
//!
//! When a candidate is blocked the search jumps straight to the first
//! aligned candidate past the blocking ranges. Every skipped candidate
//! would have overlapped one of them, so the result is the same as testing
//! each candidate in turn, without walking millions of candidates through
//! a large, mostly allocated pool.

use crate::cidr::{AddrRange, Cidr, MAX_PREFIX_LEN, block_size};
use crate::pool::AddressPool;

/// Finds the lowest free block of `prefix_len` in `pool`.
///
/// `taken` holds the ranges of the pool's existing allocations; the pool's
/// reserved blocks are added here. Returns `None` when every candidate in
/// every parent block is blocked, or when the prefix is longer than 32.
#[must_use]
pub fn find_free_block(pool: &AddressPool, taken: &[AddrRange], prefix_len: u8) -> Option<Cidr> {
    if prefix_len > MAX_PREFIX_LEN {
        return None;
    }

    let mut blocked: Vec<AddrRange> = pool
        .reserved_blocks
        .iter()
        .map(Cidr::range)
        .chain(taken.iter().copied())
        .collect();
    blocked.sort_unstable();

    let size = block_size(prefix_len);
    for parent in &pool.parent_blocks {
        let parent = parent.range();
        if size > parent.len() {
            // Too small for this block size; try the next parent.
            continue;
        }

        let first = u64::from(parent.start);
        let last = u64::from(parent.end) + 1 - size;
        let mut start = first;

        while start <= last {
            let candidate = AddrRange::new(start as u32, (start + size - 1) as u32);
            match blocked_until(&blocked, &candidate) {
                None => return Cidr::from_range_start(candidate.start, prefix_len).ok(),
                Some(end) => {
                    let past = u64::from(end) + 1;
                    start = first + (past - first).div_ceil(size) * size;
                }
            }
        }
    }

    None
}

/// Highest end address among the ranges overlapping `candidate`.
fn blocked_until(blocked: &[AddrRange], candidate: &AddrRange) -> Option<u32> {
    let upto = blocked.partition_point(|r| r.start <= candidate.end);
    blocked[..upto]
        .iter()
        .filter(|r| r.end >= candidate.start)
        .map(|r| r.end)
        .max()
}
