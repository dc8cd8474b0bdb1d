//! Fuzz target for the sequence verifier state machine
//!
//! # Strategy
//!
//! - Window: any signed value, including out-of-range lookbacks
//! - Arrivals: offsets around the current base, in both directions
//!
//! # Invariants
//!
//! - The base never decreases
//! - Rejections leave the state untouched
//! - Strict mode accepts only the base
//! - `accept` reports exactly how far the window floor moved
//! - Every accepted number is at or above the floor it was checked against

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tokenveil_core::{SequenceVerifier, SequenceWindow, Status};

#[derive(Debug, Arbitrary)]
struct Input {
    window: i32,
    start: u16,
    arrivals: Vec<i16>,
}

fuzz_target!(|input: Input| {
    let Ok(window) = SequenceWindow::from_signed(input.window) else {
        return;
    };
    let mut verifier = SequenceVerifier::new(window);

    // Walk the verifier up to a non-zero base first
    for s in 0..u64::from(input.start % 512) {
        let decision = verifier.check(s).unwrap();
        verifier.accept(&decision);
    }

    for delta in input.arrivals {
        let before = verifier;
        let sequence = before.base().saturating_add_signed(i64::from(delta));

        match before.check(sequence) {
            Ok(decision) => {
                assert!(sequence >= before.floor());
                assert_eq!(decision.offset, sequence - before.floor());
                if window == SequenceWindow::Strict {
                    assert_eq!(sequence, before.base());
                    assert_eq!(decision.status, Status::Success);
                }
                if decision.status == Status::SequenceLate {
                    assert!(sequence < before.base());
                }

                let moved = verifier.accept(&decision);
                assert!(verifier.base() >= before.base());
                assert_eq!(verifier.floor() - before.floor(), moved);
            },
            Err(_) => assert_eq!(verifier, before),
        }
    }
});
