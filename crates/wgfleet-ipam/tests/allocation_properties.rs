//! End-to-end allocation behaviour.
//!
//! These tests drive the public API only:
//! - Repeated requests return the same block
//! - Blocks never overlap each other or reserved ranges
//! - Allocation order is deterministic, lowest address first
//! - Concurrent callers never receive the same block

use std::collections::HashSet;
use std::thread;

use proptest::prelude::*;
use wgfleet_ipam::{
    AddressPool, AllocationFailure, Cidr, Ipam, IpamConfig, PoolCategory, PoolId, PoolRegistry,
    RequesterKind, address_to_int, cidr_to_range, int_to_address,
};

fn cidr(s: &str) -> Cidr {
    s.parse().expect("valid CIDR")
}

fn ipam_with(parents: &[&str], reserved: &[&str]) -> Ipam {
    let pool = AddressPool::new(
        "pool-test",
        "Test",
        PoolCategory::Site,
        parents.iter().map(|p| cidr(p)).collect(),
    )
    .with_reserved(reserved.iter().map(|r| cidr(r)).collect());
    Ipam::new(PoolRegistry::new(vec![pool]).expect("valid registry"))
}

fn assert_disjoint(ipam: &Ipam) {
    for pool in ipam.registry().iter() {
        let allocations = ipam.list_allocations(Some(pool.category));
        for (i, a) in allocations.iter().enumerate() {
            for reserved in &pool.reserved_blocks {
                assert!(
                    !a.range().overlaps(&reserved.range()),
                    "{} overlaps reserved {}",
                    a.cidr,
                    reserved
                );
            }
            for b in &allocations[i + 1..] {
                assert!(!a.range().overlaps(&b.range()), "{} overlaps {}", a.cidr, b.cidr);
            }
        }
    }
}

// ============================================================================
// Test: Idempotence
// ============================================================================

#[test]
fn test_repeat_request_returns_same_block() {
    let ipam = ipam_with(&["10.0.0.0/24"], &[]);

    let first = ipam
        .allocate(PoolCategory::Site, "site", "site-001", 26)
        .expect("should allocate");
    let second = ipam
        .allocate(PoolCategory::Site, "site", "site-001", 26)
        .expect("should allocate");

    assert_eq!(first, second);
    assert_eq!(ipam.list_allocations(None).len(), 1);
}

// ============================================================================
// Test: Determinism
// ============================================================================

#[test]
fn test_two_requesters_get_consecutive_blocks() {
    let ipam = ipam_with(&["10.0.0.0/24"], &[]);

    let a = ipam.allocate(PoolCategory::Site, "site", "a", 28).expect("a");
    let b = ipam.allocate(PoolCategory::Site, "site", "b", 28).expect("b");

    assert_eq!(a.to_string(), "10.0.0.0/28");
    assert_eq!(b.to_string(), "10.0.0.16/28");
}

#[test]
fn test_reserved_first_block_is_skipped() {
    let ipam = ipam_with(&["10.0.0.0/24"], &["10.0.0.0/28"]);
    let got = ipam.allocate(PoolCategory::Site, "site", "a", 28).expect("a");
    assert_eq!(got.to_string(), "10.0.0.16/28");
}

// ============================================================================
// Test: Exhaustion
// ============================================================================

#[test]
fn test_four_address_pool_exhausts_on_fifth_requester() {
    let ipam = ipam_with(&["10.0.0.0/30"], &[]);

    let got: Vec<String> = (1..=4)
        .map(|i| {
            ipam.allocate(PoolCategory::Site, "router_device", &format!("r{i}"), 32)
                .expect("should allocate")
                .to_string()
        })
        .collect();
    assert_eq!(got, ["10.0.0.0/32", "10.0.0.1/32", "10.0.0.2/32", "10.0.0.3/32"]);

    let result = ipam.allocate(PoolCategory::Site, "router_device", "r5", 32);
    assert!(matches!(result, Err(AllocationFailure::PoolExhausted { .. })));
    assert_eq!(ipam.list_allocations(None).len(), 4);

    // An existing requester still gets its block back.
    assert_eq!(
        ipam.allocate(PoolCategory::Site, "router_device", "r1", 32)
            .expect("existing")
            .to_string(),
        "10.0.0.0/32"
    );
}

// ============================================================================
// Test: Multi-Parent Continuation
// ============================================================================

#[test]
fn test_fully_reserved_first_parent_falls_through() {
    let ipam = ipam_with(&["10.0.0.0/24", "10.9.0.0/24"], &["10.0.0.0/24"]);
    let got = ipam.allocate(PoolCategory::Site, "site", "a", 26).expect("a");
    assert_eq!(got.to_string(), "10.9.0.0/26");
}

#[test]
fn test_site_pool_skips_reserved_parent_slice() {
    let ipam = Ipam::new(IpamConfig::default().registry().expect("defaults"));
    let kind = RequesterKind::Site;

    // Fill 10.0.0.0/12 with one manual reservation, then allocate.
    ipam.reserve(&PoolId::from("pool-sites"), "reserved", "legacy", cidr("10.0.0.0/12"))
        .expect("should reserve");
    let got = ipam
        .allocate(kind.category(), kind.requester_type(), "site-1", kind.default_prefix_len())
        .expect("site");
    assert_eq!(got.to_string(), "10.16.0.0/24");

    // 10.18.0.0/16 is reserved; fill 10.16.0.0/15 and the next block lands at 10.19.
    ipam.reserve(&PoolId::from("pool-sites"), "reserved", "legacy-2", cidr("10.17.0.0/16"))
        .expect("should reserve");
    ipam.release(&PoolId::from("pool-sites"), kind.requester_type(), "site-1");
    ipam.reserve(&PoolId::from("pool-sites"), "reserved", "legacy-3", cidr("10.16.0.0/16"))
        .expect("should reserve");
    let next = ipam
        .allocate(kind.category(), kind.requester_type(), "site-2", 24)
        .expect("site");
    assert_eq!(next.to_string(), "10.19.0.0/24");
    assert_disjoint(&ipam);
}

// ============================================================================
// Test: Concurrency
// ============================================================================

#[test]
fn test_concurrent_allocations_never_collide() {
    let ipam = Ipam::new(IpamConfig::default().registry().expect("defaults"));

    let results: Vec<Cidr> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ipam = &ipam;
                scope.spawn(move || {
                    (0..50)
                        .map(|i| {
                            ipam.allocate(
                                PoolCategory::Router,
                                "router_device",
                                &format!("r-{t}-{i}"),
                                32,
                            )
                            .expect("should allocate")
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect()
    });

    let unique: HashSet<Cidr> = results.iter().copied().collect();
    assert_eq!(unique.len(), 400);
    assert_eq!(ipam.list_allocations(Some(PoolCategory::Router)).len(), 400);

    // Lowest-free-first means the 400 blocks are exactly the first 400 addresses.
    let base = address_to_int("10.240.0.0").expect("valid");
    let expected: HashSet<Cidr> = (0..400)
        .map(|i| Cidr::new(int_to_address(base + i), 32).expect("valid"))
        .collect();
    assert_eq!(unique, expected);
}

#[test]
fn test_concurrent_same_requester_gets_one_block() {
    let ipam = Ipam::new(IpamConfig::default().registry().expect("defaults"));

    let results: Vec<Cidr> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ipam = &ipam;
                scope.spawn(move || {
                    ipam.allocate(PoolCategory::Site, "site", "site-shared", 24)
                        .expect("should allocate")
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .collect()
    });

    assert!(results.iter().all(|c| *c == results[0]));
    assert_eq!(ipam.list_allocations(Some(PoolCategory::Site)).len(), 1);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_address_text_round_trip(value in any::<u32>()) {
        let text = int_to_address(value).to_string();
        let parsed = address_to_int(&text).expect("valid");
        prop_assert_eq!(int_to_address(parsed).to_string(), text);
    }

    #[test]
    fn prop_range_rebuilds_normalized_cidr(value in any::<u32>(), prefix in 0u8..=32) {
        let text = format!("{}/{prefix}", int_to_address(value));
        let range = cidr_to_range(&text).expect("valid");
        let rebuilt = Cidr::from_range_start(range.start, prefix).expect("valid");
        prop_assert_eq!(rebuilt, cidr(&text).normalized());
    }

    #[test]
    fn prop_allocations_never_overlap(
        requests in proptest::collection::vec((0u8..6, 26u8..=32), 1..40),
    ) {
        let ipam = ipam_with(&["10.0.0.0/25", "10.0.1.0/25"], &["10.0.0.32/28", "10.0.1.0/30"]);
        for (requester, prefix) in &requests {
            let first = ipam.allocate(PoolCategory::Site, "site", &format!("s{requester}"), *prefix);
            if let Ok(block) = first {
                let again = ipam
                    .allocate(PoolCategory::Site, "site", &format!("s{requester}"), *prefix)
                    .expect("existing");
                prop_assert_eq!(again, block);
            }
        }
        assert_disjoint(&ipam);
    }
}
