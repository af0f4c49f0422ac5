//! Tripped-operation registry.
//!
//! # Responsibilities
//! - Answer "is this operation short-circuited?" on every gated call
//! - Admit exactly one trip per episode (first tripper wins)
//! - Clear a trip when its replay succeeds, or on operator reset once the
//!   retry budget is exhausted
//!
//! # Design Decisions
//! - Sharded map, so lookups for different identities do not contend
//! - Clears are keyed by episode so a stale replay cannot clear a newer trip

use std::time::SystemTime;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::observability::metrics;
use crate::resilience::error::{BreakerError, BreakerResult};
use crate::resilience::identity::OperationId;

/// Where a tripped operation is in its recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripState {
    /// A replay record is owned by the scheduler.
    Retrying,
    /// Replays were exhausted and the alert raised; no replay is scheduled.
    Exhausted,
}

/// Registry entry for one tripped operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripEntry {
    pub episode: Uuid,
    pub tripped_at: SystemTime,
    pub state: TripState,
}

/// Set of currently tripped operation identities.
#[derive(Debug, Default)]
pub struct TripRegistry {
    entries: DashMap<OperationId, TripEntry>,
}

impl TripRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &OperationId) -> Option<TripEntry> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Mark `id` tripped. Returns the new episode, or `None` if it already was.
    pub fn trip(&self, id: &OperationId) -> Option<Uuid> {
        let episode = match self.entries.entry(id.clone()) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(slot) => {
                let episode = Uuid::new_v4();
                slot.insert(TripEntry {
                    episode,
                    tripped_at: SystemTime::now(),
                    state: TripState::Retrying,
                });
                episode
            }
        };
        metrics::record_open_guards(self.entries.len());
        Some(episode)
    }

    /// Remove the trip for `episode`. Returns `false` if it was already gone.
    pub fn clear(&self, id: &OperationId, episode: Uuid) -> bool {
        let removed = self
            .entries
            .remove_if(id, |_, entry| entry.episode == episode)
            .is_some();
        if removed {
            metrics::record_open_guards(self.entries.len());
        }
        removed
    }

    pub fn mark_exhausted(&self, id: &OperationId, episode: Uuid) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) if entry.episode == episode => {
                entry.state = TripState::Exhausted;
                true
            }
            _ => false,
        }
    }

    /// Operator reset. Only exhausted trips can be cleared this way; a trip
    /// that still has a replay scheduled is left to the scheduler.
    pub fn reset(&self, id: &OperationId) -> BreakerResult<TripEntry> {
        match self
            .entries
            .remove_if(id, |_, entry| entry.state == TripState::Exhausted)
        {
            Some((_, entry)) => {
                metrics::record_open_guards(self.entries.len());
                Ok(entry)
            }
            None if self.entries.contains_key(id) => Err(BreakerError::ReplayPending(id.clone())),
            None => Err(BreakerError::NotTripped(id.clone())),
        }
    }

    /// Snapshot of all tripped identities.
    pub fn tripped(&self) -> Vec<(OperationId, TripEntry)> {
        self.entries
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
