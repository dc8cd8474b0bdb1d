//! Stream positions kept for late messages in lookback mode.
//!
//! The decoder's committed stream always sits at the base. Each time the base
//! moves forward, the position it leaves behind is recorded here, so a late
//! message decodes from the exact stream position its encoder used no matter
//! what lengths the messages around it had. Entries below the window floor
//! are dropped; dropping a [`RandomSource`] wipes its generator.

use std::collections::VecDeque;

use tokenveil_crypto::Drbg;

use crate::{error::TokenError, random::RandomSource};

/// Stream snapshots for sequence numbers in `[floor, base)`, oldest first.
#[derive(Clone)]
pub(crate) struct StreamHistory<D> {
    entries: VecDeque<(u64, RandomSource<D>)>,
    capacity: usize,
}

impl<D: Drbg> StreamHistory<D> {
    /// Room for `capacity` snapshots. Capacity 0 records nothing.
    pub(crate) fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity), capacity }
    }

    /// Maximum number of snapshots (the lookback window).
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot for `sequence`, if one is held.
    pub(crate) fn get(&self, sequence: u64) -> Option<&RandomSource<D>> {
        self.entries.iter().find(|(held, _)| *held == sequence).map(|(_, random)| random)
    }

    /// Record the stream position of `sequence`. Sequence numbers must be
    /// recorded in increasing order; the oldest entry is evicted when full.
    pub(crate) fn record(&mut self, sequence: u64, random: RandomSource<D>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((sequence, random));
    }

    /// Drop every snapshot below `floor`.
    pub(crate) fn evict_below(&mut self, floor: u64) {
        while self.entries.front().is_some_and(|(held, _)| *held < floor) {
            self.entries.pop_front();
        }
    }

    /// Drop every snapshot.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Record the positions of `from..to` by walking `random` forward one
    /// message at a time, keeping only those at or above `floor`. Leaves
    /// `random` at `to`.
    ///
    /// Lengths of messages that were never seen are unknown, so each is
    /// assumed to be made of `segments`.
    pub(crate) fn walk(
        &mut self,
        random: &mut RandomSource<D>,
        from: u64,
        to: u64,
        floor: u64,
        segments: &[usize],
    ) -> Result<(), TokenError> {
        // Only the last `capacity` positions can survive
        let capacity = u64::try_from(self.capacity).unwrap_or(u64::MAX);
        let keep_from = floor.max(to.saturating_sub(capacity));
        let mut sequence = from;
        while sequence < to {
            if sequence >= keep_from {
                self.record(sequence, random.clone());
            }
            random.skip_messages(1, segments)?;
            sequence += 1;
        }
        self.evict_below(floor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokenveil_crypto::IncrDrbg;

    use super::*;

    fn ready() -> RandomSource<IncrDrbg> {
        let mut random = RandomSource::new(IncrDrbg::new());
        random.instantiate(&mut &[0u8; 0][..], &mut 0u64, b"").unwrap();
        random
    }

    fn held(history: &StreamHistory<IncrDrbg>) -> Vec<u64> {
        history.entries.iter().map(|(sequence, _)| *sequence).collect()
    }

    fn next_byte(random: &RandomSource<IncrDrbg>) -> u8 {
        let mut copy = random.clone();
        let mut byte = [0u8; 1];
        copy.fill(&mut byte).unwrap();
        byte[0]
    }

    #[test]
    fn record_evicts_oldest_when_full() {
        let mut history = StreamHistory::new(2);
        for sequence in 0..3 {
            history.record(sequence, ready());
        }
        assert!(history.get(0).is_none());
        assert!(history.get(1).is_some());
        assert!(history.get(2).is_some());
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let mut history = StreamHistory::new(0);
        history.record(0, ready());
        assert!(history.get(0).is_none());
        assert!(held(&history).is_empty());
    }

    #[test]
    fn evict_below_floor() {
        let mut history = StreamHistory::new(4);
        for sequence in 10..14 {
            history.record(sequence, ready());
        }
        history.evict_below(12);
        assert_eq!(held(&history), vec![12, 13]);
    }

    #[test]
    fn walk_records_each_position() {
        let mut history = StreamHistory::new(3);
        let mut random = ready();
        let start = next_byte(&random);

        history.walk(&mut random, 5, 10, 6, &[4]).unwrap();

        // Only the last three positions below 10 fit
        assert_eq!(held(&history), vec![7, 8, 9]);
        assert_ne!(next_byte(history.get(7).unwrap()), next_byte(history.get(8).unwrap()));
        assert_ne!(next_byte(&random), start);
    }
}
