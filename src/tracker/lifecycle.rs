//! Debounces noisy snapshots into exactly-once open/close events.

use crate::tracker::state::{OrderState, Phase};
use crate::types::{EventKind, OrderEvent, RawOrderRecord};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Consecutive missing ticks after which an unconfirmed row is discarded.
pub const PROVISIONAL_GRACE_TICKS: u32 = 2;

/// Headroom kept above the open threshold before `seen_count` stops growing.
pub const SEEN_HEADROOM: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub open_confirm: u32,
    pub close_confirm: u32,
}

impl Thresholds {
    pub fn new(open_confirm: u32, close_confirm: u32) -> Self {
        Self {
            open_confirm: open_confirm.max(1),
            close_confirm: close_confirm.max(1),
        }
    }

    pub fn seen_ceiling(&self) -> u32 {
        self.open_confirm + SEEN_HEADROOM
    }
}

/// Owns the per-order map and advances it one snapshot at a time.
#[derive(Debug)]
pub struct LifecycleTracker {
    thresholds: Thresholds,
    orders: BTreeMap<String, OrderState>,
}

impl LifecycleTracker {
    pub fn new(thresholds: Thresholds) -> Self {
        Self::with_orders(thresholds, BTreeMap::new())
    }

    /// Resume from persisted state.
    pub fn with_orders(thresholds: Thresholds, orders: BTreeMap<String, OrderState>) -> Self {
        Self { thresholds, orders }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn orders(&self) -> &BTreeMap<String, OrderState> {
        &self.orders
    }

    pub fn get(&self, id: &str) -> Option<&OrderState> {
        self.orders.get(id)
    }

    pub fn phase(&self, id: &str) -> Option<Phase> {
        self.orders.get(id).map(OrderState::phase)
    }

    /// Number of confirmed, not yet closed positions.
    pub fn active_count(&self) -> usize {
        self.orders
            .values()
            .filter(|s| s.phase() == Phase::Active)
            .count()
    }

    /// Apply one snapshot. Visible rows are merged first, then open
    /// confirmations, then missing bookkeeping for absent ids only, so an id
    /// seen this tick never advances its missing counter.
    pub fn update(&mut self, records: &[RawOrderRecord]) -> Vec<OrderEvent> {
        let ceiling = self.thresholds.seen_ceiling();
        let mut visible = HashSet::with_capacity(records.len());
        let mut events = Vec::new();

        for record in records {
            visible.insert(record.id.as_str());
            match self.orders.get_mut(&record.id) {
                None => {
                    debug!(id = %record.id, "new row sighted");
                    self.orders
                        .insert(record.id.clone(), OrderState::first_sighting(record));
                }
                Some(state) if state.phase() == Phase::Closed => {
                    debug!(id = %record.id, "closed order visible again, ignoring");
                }
                Some(state) => {
                    state.seen_count = state.seen_count.saturating_add(1).min(ceiling);
                    state.missing_count = 0;
                    state.merge_sticky(record);
                }
            }
        }

        for (id, state) in self.orders.iter_mut() {
            if !state.opened_notified && state.seen_count >= self.thresholds.open_confirm {
                state.opened_notified = true;
                info!(id = %id, side = %state.side, "📣 position opened");
                events.push(state.to_event(EventKind::Opened, id));
            }
        }

        let mut evicted = Vec::new();
        for (id, state) in self.orders.iter_mut() {
            if visible.contains(id.as_str()) {
                continue;
            }
            match state.phase() {
                Phase::Closed => {}
                Phase::Active => {
                    state.missing_count = state.missing_count.saturating_add(1);
                    if state.missing_count >= self.thresholds.close_confirm {
                        state.closed_notified = true;
                        info!(id = %id, side = %state.side, "📣 position closed");
                        events.push(state.to_event(EventKind::Closed, id));
                    }
                }
                Phase::Provisional => {
                    state.missing_count = state.missing_count.saturating_add(1);
                    if state.missing_count >= PROVISIONAL_GRACE_TICKS {
                        evicted.push(id.clone());
                    }
                }
            }
        }

        for id in evicted {
            debug!(id = %id, "discarding unconfirmed row");
            self.orders.remove(&id);
        }

        events
    }

    /// Marks every visible row as already opened without emitting anything,
    /// so a fresh start does not announce positions that were open before.
    pub fn baseline(&mut self, records: &[RawOrderRecord]) -> usize {
        let open_confirm = self.thresholds.open_confirm;
        for record in records {
            let state = self.orders.entry(record.id.clone()).or_default();
            state.seen_count = state.seen_count.max(open_confirm);
            state.missing_count = 0;
            state.opened_notified = true;
            state.closed_notified = false;
            state.merge_sticky(record);
        }
        info!(count = records.len(), "baseline applied");
        records.len()
    }
}
