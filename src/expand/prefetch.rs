//! Background prefetch batches

use crate::deck::{SlideCache, SlideNumber};

use super::cancel::CancelScope;
use super::request::RequestId;

/// Number of slides filled ahead of the one being viewed
pub const DEFAULT_LOOKAHEAD: usize = 2;

/// Prefetch request currently streaming
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InFlight {
    pub id: RequestId,
    pub slide: SlideNumber,
    pub index: usize,
}

/// One bounded walk over the slides following the active one.
///
/// Targets are visited strictly one after another; the owner issues the
/// request for a target and reports back before asking for the next one.
/// All requests of the batch share a single cancellation scope.
#[derive(Debug)]
pub struct PrefetchBatch {
    scope: CancelScope,
    cursor: usize,
    end: usize,
    in_flight: Option<InFlight>,
}

impl PrefetchBatch {
    /// Batch over `start_index .. start_index + lookahead`, clipped to the deck
    #[must_use]
    pub fn new(start_index: usize, lookahead: usize, deck_len: usize) -> Self {
        Self {
            scope: CancelScope::new(),
            cursor: start_index,
            end: start_index.saturating_add(lookahead).min(deck_len),
            in_flight: None,
        }
    }

    /// Fresh batch covering what this one had not finished yet.
    ///
    /// The slide that was in flight is visited again.
    #[must_use]
    pub fn restarted(&self) -> Self {
        let cursor = self.in_flight.map_or(self.cursor, |f| f.index);
        Self {
            scope: CancelScope::new(),
            cursor,
            end: self.end,
            in_flight: None,
        }
    }

    #[must_use]
    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    /// Next index needing generation, skipping slides already cached.
    ///
    /// Returns `None` once the range is exhausted, the deck ends, or the
    /// batch has been cancelled.
    pub fn next_target(&mut self, cache: &SlideCache) -> Option<usize> {
        while self.cursor < self.end {
            if self.scope.is_cancelled() {
                return None;
            }
            let index = self.cursor;
            self.cursor += 1;

            let record = cache.get_at(index)?;
            if record.is_expanded() {
                log::debug!("Prefetch skips slide {} (cached)", record.number());
                continue;
            }
            return Some(index);
        }
        None
    }

    pub fn begin(&mut self, flight: InFlight) {
        self.in_flight = Some(flight);
    }

    #[must_use]
    pub fn in_flight(&self) -> Option<InFlight> {
        self.in_flight
    }

    /// Clear the in-flight marker if it belongs to `id`
    pub fn settle(&mut self, id: RequestId) -> Option<InFlight> {
        match self.in_flight {
            Some(flight) if flight.id == id => self.in_flight.take(),
            _ => None,
        }
    }

    pub fn cancel(&self) {
        self.scope.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }
}
