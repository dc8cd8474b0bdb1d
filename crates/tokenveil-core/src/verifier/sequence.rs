//! Sequence verifier state machine.
//!
//! The decoder keeps one number, the base: the next sequence number it
//! expects. Every incoming number is classified against the base before any
//! stream work happens. Rejections leave the state untouched.
//!
//! ```text
//! Strict           accept s == base                       base = s + 1
//! Lookback(w)      base-w <= s <  base      (late)        base unchanged
//!                  s == base                              base = s + 1
//!                  base <  s <= base+w      (ahead)       base unchanged
//!                  base+w < s <= base+2w    (ahead)       base = s - w
//! CatchUp(w)       base <= s <= base+w                    base = s + 1
//! ```
//!
//! The window floor is the lowest sequence number that can still be decoded
//! (`base - w` for lookback, `base` otherwise).

use crate::{config::SequenceWindow, error::Status, error::TokenError};

/// Outcome of classifying an incoming sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceDecision {
    /// Sequence number carried by the message
    pub sequence: u64,
    /// Messages between the window floor and this one
    pub offset: u64,
    /// How far ahead of the base the message was (0 if late or on time)
    pub skipped: u64,
    /// Base after the message is accepted
    pub next_base: u64,
    /// Warning to report, if any
    pub status: Status,
}

/// Ordering state owned by a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceVerifier {
    window: SequenceWindow,
    base: u64,
}

impl SequenceVerifier {
    /// Start expecting sequence number 0.
    pub fn new(window: SequenceWindow) -> Self {
        Self { window, base: 0 }
    }

    /// Next expected sequence number.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Configured tolerance.
    pub fn window(&self) -> SequenceWindow {
        self.window
    }

    /// Lowest sequence number that can still be decoded.
    pub fn floor(&self) -> u64 {
        floor_of(self.window, self.base)
    }

    /// Classify `sequence` without changing state.
    ///
    /// # Errors
    ///
    /// `SequenceOutOfWindow` if the message cannot be accepted.
    pub fn check(&self, sequence: u64) -> Result<SequenceDecision, TokenError> {
        let base = self.base;
        let reject = TokenError::SequenceOutOfWindow { sequence, base };

        let (next_base, skipped, status) = match self.window {
            SequenceWindow::Strict => {
                if sequence != base {
                    return Err(reject);
                }
                (sequence.wrapping_add(1), 0, Status::Success)
            },
            SequenceWindow::Lookback(w) => {
                let w = u64::from(w);
                if sequence < self.floor() {
                    return Err(reject);
                }
                if sequence < base {
                    (base, 0, Status::SequenceLate)
                } else if sequence == base {
                    (sequence.wrapping_add(1), 0, Status::Success)
                } else if sequence - base <= w {
                    (base, sequence - base, Status::SequenceAhead)
                } else if sequence - base <= 2 * w {
                    (sequence - w, sequence - base, Status::SequenceSkipped)
                } else {
                    return Err(reject);
                }
            },
            SequenceWindow::CatchUp(w) => {
                if sequence < base || sequence - base > u64::from(w) {
                    return Err(reject);
                }
                let skipped = sequence - base;
                let status = if skipped > 0 { Status::SequenceSkipped } else { Status::Success };
                (sequence.wrapping_add(1), skipped, status)
            },
        };

        Ok(SequenceDecision {
            sequence,
            offset: sequence - self.floor(),
            skipped,
            next_base,
            status,
        })
    }

    /// Apply an accepted decision. Returns how many messages the window floor
    /// moved forward.
    pub fn accept(&mut self, decision: &SequenceDecision) -> u64 {
        let old_floor = self.floor();
        self.base = decision.next_base;
        self.floor().saturating_sub(old_floor)
    }

    /// Overwrite the base (state restore).
    pub(crate) fn set_base(&mut self, base: u64) {
        self.base = base;
    }
}

/// Window floor for a given base.
pub fn floor_of(window: SequenceWindow, base: u64) -> u64 {
    match window {
        SequenceWindow::Lookback(w) => base.saturating_sub(u64::from(w)),
        SequenceWindow::Strict | SequenceWindow::CatchUp(_) => base,
    }
}
