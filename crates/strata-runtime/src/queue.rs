//! Task bookkeeping behind the scheduler's mutex: one slot per scheduled
//! tile, a priority heap over queued slots, and the set of dirty parents.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::time::{Duration, Instant};

use hashbrown::{HashMap, HashSet};
use strata_render::{TileCoord, TileGrid};

use crate::events::{Reason, Reasons, TileStatus};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SlotState {
    Queued { seq: u64 },
    InProgress,
    Retrying { due: Instant },
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    reasons: Reasons,
    attempts: u32,
    epoch: u64,
}

/// A dequeued unit of work.
#[derive(Clone, Debug)]
pub struct RenderTask {
    pub tile: TileCoord,
    pub reasons: Reasons,
    /// 1 for the first attempt.
    pub attempt: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// A new slot was created.
    Queued,
    /// The tile was already scheduled; its reasons were merged.
    Merged,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Failure {
    Retry { delay: Duration },
    Terminal { attempts: u32 },
    /// Cancelled while running.
    Dropped,
}

#[derive(Default)]
pub(crate) struct TaskQueue {
    // Ordered by (lod, sequence): lower levels first, FIFO within a level.
    heap: BinaryHeap<Reverse<(u8, u64, TileCoord)>>,
    slots: HashMap<TileCoord, Slot>,
    dirty: BTreeMap<TileCoord, Reasons>,
    // Tiles whose retries ran out and that nothing has scheduled since.
    unavailable: HashSet<TileCoord>,
    seq: u64,
    pub epoch: u64,
    pub in_flight: usize,
    pub paused: bool,
    /// Rescan passes currently running.
    pub rescans: usize,
    peak: usize,
}

impl TaskQueue {
    /// Queued, retrying and in-flight slots.
    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn contains(&self, tile: TileCoord) -> bool {
        self.slots.contains_key(&tile)
    }

    pub fn peak_depth(&self) -> usize {
        self.peak
    }

    pub fn is_idle(&self) -> bool {
        self.slots.is_empty() && self.dirty.is_empty() && self.rescans == 0
    }

    fn push(&mut self, tile: TileCoord, mut reasons: Reasons) {
        if let Some(r) = self.dirty.remove(&tile) {
            reasons.merge(r);
        }
        self.seq += 1;
        let seq = self.seq;
        self.heap.push(Reverse((tile.lod, seq, tile)));
        self.slots.insert(
            tile,
            Slot {
                state: SlotState::Queued { seq },
                reasons,
                attempts: 0,
                epoch: self.epoch,
            },
        );
        self.peak = self.peak.max(self.slots.len());
    }

    pub fn enqueue(&mut self, tile: TileCoord, reasons: Reasons) -> Enqueued {
        if let Some(slot) = self.slots.get_mut(&tile) {
            slot.reasons.merge(reasons);
            // A request after cancel_all revives a still-running slot.
            slot.epoch = self.epoch;
            return Enqueued::Merged;
        }
        self.push(tile, reasons);
        Enqueued::Queued
    }

    /// Records that `tile` should be rendered once its children settle.
    pub fn mark_dirty(&mut self, tile: TileCoord, reason: Reason) {
        if let Some(slot) = self.slots.get_mut(&tile) {
            if matches!(slot.state, SlotState::Queued { .. }) {
                slot.reasons.insert(reason);
                return;
            }
        }
        self.dirty.entry(tile).or_default().insert(reason);
    }

    /// Moves retries whose backoff has elapsed back into the heap. Returns
    /// the earliest remaining due time.
    pub fn promote_retries(&mut self, now: Instant) -> Option<Instant> {
        let mut next: Option<Instant> = None;
        let mut ready = Vec::new();
        for (tile, slot) in &self.slots {
            if let SlotState::Retrying { due } = slot.state {
                if due <= now {
                    ready.push((tile.lod, *tile));
                } else {
                    next = Some(next.map_or(due, |n| n.min(due)));
                }
            }
        }
        ready.sort();
        for (_, tile) in ready {
            self.seq += 1;
            let seq = self.seq;
            if let Some(slot) = self.slots.get_mut(&tile) {
                slot.state = SlotState::Queued { seq };
                self.heap.push(Reverse((tile.lod, seq, tile)));
            }
        }
        next
    }

    /// Queues dirty parents none of whose children are scheduled or dirty,
    /// while depth stays under `cap`.
    pub fn promote_dirty(&mut self, grid: &TileGrid, cap: usize) -> Vec<(TileCoord, Reasons)> {
        let mut promoted = Vec::new();
        if self.dirty.is_empty() {
            return promoted;
        }
        let ready: Vec<TileCoord> = self
            .dirty
            .keys()
            .copied()
            .filter(|tile| !self.slots.contains_key(tile))
            .filter(|tile| {
                grid.children(*tile)
                    .iter()
                    .all(|c| !self.slots.contains_key(c) && !self.dirty.contains_key(c))
            })
            .collect();
        for tile in ready {
            if self.depth() >= cap {
                break;
            }
            let reasons = self.dirty.remove(&tile).unwrap_or_default();
            self.push(tile, reasons);
            promoted.push((tile, reasons));
        }
        promoted
    }

    pub fn pop(&mut self) -> Option<RenderTask> {
        if self.paused {
            return None;
        }
        while let Some(Reverse((_, seq, tile))) = self.heap.pop() {
            let Some(slot) = self.slots.get_mut(&tile) else {
                continue;
            };
            if slot.state != (SlotState::Queued { seq }) {
                continue;
            }
            slot.state = SlotState::InProgress;
            slot.attempts += 1;
            self.in_flight += 1;
            return Some(RenderTask {
                tile,
                reasons: slot.reasons,
                attempt: slot.attempts,
            });
        }
        None
    }

    /// Clears the slot. Returns whether completion should mark the parent
    /// dirty; `false` when the task was cancelled while running.
    pub fn finish_ok(&mut self, task: &RenderTask) -> bool {
        self.in_flight -= 1;
        self.unavailable.remove(&task.tile);
        self.slots
            .remove(&task.tile)
            .is_some_and(|slot| slot.epoch == self.epoch)
    }

    /// Schedules a retry with exponential backoff, or gives up once
    /// `retry_limit` retries are spent.
    pub fn finish_err(&mut self, task: &RenderTask, retry_limit: u32, backoff: Duration) -> Failure {
        self.in_flight -= 1;
        let epoch = self.epoch;
        let Some(slot) = self.slots.get_mut(&task.tile) else {
            return Failure::Dropped;
        };
        if slot.epoch != epoch {
            self.slots.remove(&task.tile);
            return Failure::Dropped;
        }
        if slot.attempts > retry_limit {
            let attempts = slot.attempts;
            self.slots.remove(&task.tile);
            self.unavailable.insert(task.tile);
            return Failure::Terminal { attempts };
        }
        let delay = retry_delay(backoff, slot.attempts);
        slot.state = SlotState::Retrying {
            due: Instant::now() + delay,
        };
        Failure::Retry { delay }
    }

    /// Drops queued, retrying and dirty work and starts a new epoch. Running
    /// slots stay until their workers finish. Returns the dropped tiles.
    pub fn cancel(&mut self) -> Vec<TileCoord> {
        self.epoch += 1;
        self.heap.clear();
        let mut dropped: Vec<TileCoord> = self.dirty.keys().copied().collect();
        self.dirty.clear();
        self.slots.retain(|tile, slot| {
            let keep = slot.state == SlotState::InProgress;
            if !keep {
                dropped.push(*tile);
            }
            keep
        });
        dropped
    }

    pub fn status(&self, tile: TileCoord) -> TileStatus {
        if let Some(slot) = self.slots.get(&tile) {
            return match slot.state {
                SlotState::Queued { .. } => TileStatus::Queued,
                SlotState::InProgress => TileStatus::InProgress,
                SlotState::Retrying { .. } => TileStatus::Retrying {
                    attempt: slot.attempts,
                },
            };
        }
        if self.dirty.contains_key(&tile) {
            return TileStatus::Dirty;
        }
        if self.unavailable.contains(&tile) {
            return TileStatus::Unavailable;
        }
        TileStatus::Idle
    }

    /// (queued, retrying, dirty parents)
    pub fn counts(&self) -> (usize, usize, usize) {
        let retrying = self
            .slots
            .values()
            .filter(|s| matches!(s.state, SlotState::Retrying { .. }))
            .count();
        let queued = self.slots.len() - retrying - self.in_flight;
        (queued, retrying, self.dirty.len())
    }
}

/// `backoff * 2^(attempt - 1)`, capped at a minute.
pub(crate) fn retry_delay(backoff: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    backoff.saturating_mul(factor).min(MAX_BACKOFF)
}
