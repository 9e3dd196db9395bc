//! IPv4 address and CIDR block arithmetic.
//!
//! Addresses are handled as plain `u32` values so that range checks are
//! simple integer comparisons. A block `a.b.c.d/p` covers the inclusive
//! range `[network, network + 2^(32-p) - 1]`.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// Errors produced while parsing addresses and CIDR blocks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// The text is not four dot-separated decimal octets in 0..=255.
    #[error("malformed address '{input}'")]
    MalformedAddress {
        /// The rejected input.
        input: String,
    },
    /// The text is not of the form `address/prefix`.
    #[error("malformed CIDR '{input}': expected address/prefix")]
    MalformedCidr {
        /// The rejected input.
        input: String,
    },
    /// The prefix length is outside 0..=32.
    #[error("invalid prefix length {prefix_len}: must be between 0 and 32")]
    InvalidPrefixLength {
        /// The rejected prefix length.
        prefix_len: u32,
    },
}

/// Longest IPv4 prefix.
pub const MAX_PREFIX_LEN: u8 = 32;

/// Parses a dotted-quad address into its 32-bit value.
///
/// Octets must be plain decimal without leading zeros, so that
/// [`int_to_address`] reproduces the input exactly.
pub fn address_to_int(address: &str) -> Result<u32, AddressError> {
    let malformed = || AddressError::MalformedAddress {
        input: address.to_string(),
    };

    let mut value: u32 = 0;
    let mut octets = 0;
    for part in address.split('.') {
        octets += 1;
        if octets > 4
            || part.is_empty()
            || part.len() > 3
            || (part.len() > 1 && part.starts_with('0'))
            || !part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(malformed());
        }
        let octet: u32 = part.parse().map_err(|_| malformed())?;
        if octet > 255 {
            return Err(malformed());
        }
        value = (value << 8) | octet;
    }

    if octets != 4 {
        return Err(malformed());
    }
    Ok(value)
}

/// Converts a 32-bit value back into an address.
#[must_use]
pub const fn int_to_address(value: u32) -> Ipv4Addr {
    Ipv4Addr::from_bits(value)
}

/// Number of addresses in a block with the given prefix length.
#[must_use]
pub fn block_size(prefix_len: u8) -> u64 {
    1u64 << (32 - u32::from(prefix_len.min(MAX_PREFIX_LEN)))
}

/// Inclusive range of addresses `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddrRange {
    /// First address in the range.
    pub start: u32,
    /// Last address in the range.
    pub end: u32,
}

impl AddrRange {
    /// Creates a range. `start` must not exceed `end`.
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Closed-interval overlap test.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Returns true if `inner` lies entirely within this range.
    #[must_use]
    pub const fn contains(&self, inner: &Self) -> bool {
        inner.start >= self.start && inner.end <= self.end
    }

    /// The addresses both ranges cover.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        self.overlaps(other)
            .then(|| Self::new(self.start.max(other.start), self.end.min(other.end)))
    }

    /// Number of addresses in the range.
    #[must_use]
    pub fn len(&self) -> u64 {
        u64::from(self.end) - u64::from(self.start) + 1
    }

    /// A range always holds at least one address.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for AddrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            int_to_address(self.start),
            int_to_address(self.end)
        )
    }
}

/// Counts the distinct addresses covered by a set of possibly overlapping
/// ranges.
#[must_use]
pub fn covered_len(ranges: impl IntoIterator<Item = AddrRange>) -> u64 {
    let mut ranges: Vec<AddrRange> = ranges.into_iter().collect();
    ranges.sort_unstable();

    let mut merged: Vec<AddrRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        if let Some(last) = merged.last_mut() {
            if u64::from(range.start) <= u64::from(last.end) + 1 {
                last.end = last.end.max(range.end);
                continue;
            }
        }
        merged.push(range);
    }
    merged.iter().map(AddrRange::len).sum()
}

/// An IPv4 CIDR block.
///
/// The address is kept as written, host bits included, so a persisted
/// value serializes back verbatim. [`Cidr::range`] masks it down to the
/// block boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr(Ipv4Net);

impl Cidr {
    /// Creates a block from an address and prefix length.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, AddressError> {
        Ipv4Net::new(addr, prefix_len)
            .map(Self)
            .map_err(|_| AddressError::InvalidPrefixLength {
                prefix_len: u32::from(prefix_len),
            })
    }

    /// Rebuilds the normalized block that starts at `start`.
    pub fn from_range_start(start: u32, prefix_len: u8) -> Result<Self, AddressError> {
        Self::new(int_to_address(start), prefix_len).map(|cidr| cidr.normalized())
    }

    /// The address as written.
    #[must_use]
    pub fn addr(&self) -> Ipv4Addr {
        self.0.addr()
    }

    /// The first address of the block.
    #[must_use]
    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }

    /// The prefix length.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// The same block with host bits cleared.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self(self.0.trunc())
    }

    /// Returns true if no host bits are set.
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        self.0.addr() == self.0.network()
    }

    /// The inclusive integer range covered by this block.
    #[must_use]
    pub fn range(&self) -> AddrRange {
        AddrRange::new(u32::from(self.0.network()), u32::from(self.0.broadcast()))
    }

    /// Number of addresses in the block.
    #[must_use]
    pub fn block_size(&self) -> u64 {
        block_size(self.prefix_len())
    }

    /// Wraps an [`Ipv4Net`].
    #[must_use]
    pub const fn from_ipnet(net: Ipv4Net) -> Self {
        Self(net)
    }
}

impl From<Ipv4Net> for Cidr {
    fn from(net: Ipv4Net) -> Self {
        Self::from_ipnet(net)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0.addr(), self.0.prefix_len())
    }
}

impl FromStr for Cidr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s.split_once('/').ok_or_else(|| AddressError::MalformedCidr {
            input: s.to_string(),
        })?;

        if prefix.is_empty()
            || (prefix.len() > 1 && prefix.starts_with('0'))
            || !prefix.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(AddressError::MalformedCidr {
                input: s.to_string(),
            });
        }
        // All digits, so a parse failure can only be overflow.
        let prefix_len: u32 = prefix.parse().unwrap_or(u32::MAX);
        if prefix_len > u32::from(MAX_PREFIX_LEN) {
            return Err(AddressError::InvalidPrefixLength { prefix_len });
        }

        let addr = int_to_address(address_to_int(addr)?);
        Self::new(addr, prefix_len as u8)
    }
}

impl TryFrom<String> for Cidr {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

/// Parses `address/prefix` and returns the block's integer range.
pub fn cidr_to_range(cidr: &str) -> Result<AddrRange, AddressError> {
    cidr.parse::<Cidr>().map(|c| c.range())
}
