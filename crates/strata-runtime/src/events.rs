use std::fmt;
use std::time::Duration;

use strata_render::TileCoord;
use strata_world::ChunkCacheStats;

/// Why a tile was scheduled.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Reason {
    /// Never rendered, or its stored copy is unreadable.
    Initial,
    /// Chunks in its footprint changed since it was stored.
    WorldChanged,
    /// A child tile was re-rendered.
    ParentOfChangedChild,
}

impl Reason {
    #[inline]
    fn bit(self) -> u8 {
        match self {
            Reason::Initial => 1,
            Reason::WorldChanged => 2,
            Reason::ParentOfChangedChild => 4,
        }
    }
}

/// Set of reasons merged from every request for one tile.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Reasons(u8);

impl Reasons {
    pub fn of(reason: Reason) -> Self {
        Reasons(reason.bit())
    }

    #[inline]
    pub fn insert(&mut self, reason: Reason) {
        self.0 |= reason.bit();
    }

    #[inline]
    pub fn merge(&mut self, other: Reasons) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn contains(self, reason: Reason) -> bool {
        self.0 & reason.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Reason> {
        [Reason::Initial, Reason::WorldChanged, Reason::ParentOfChangedChild]
            .into_iter()
            .filter(move |r| self.contains(*r))
    }
}

impl fmt::Debug for Reasons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for Reasons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for r in self.iter() {
            if !first {
                f.write_str("+")?;
            }
            first = false;
            f.write_str(match r {
                Reason::Initial => "initial",
                Reason::WorldChanged => "world-changed",
                Reason::ParentOfChangedChild => "parent",
            })?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderEvent {
    Queued {
        tile: TileCoord,
        reasons: Reasons,
    },
    Started {
        tile: TileCoord,
        attempt: u32,
    },
    Completed {
        tile: TileCoord,
        empty: bool,
        elapsed: Duration,
    },
    /// The attempt failed and will be retried after `retry_in`.
    Failed {
        tile: TileCoord,
        attempt: u32,
        error: String,
        retry_in: Duration,
    },
    /// Retries exhausted; the tile stays unrendered until a later rescan
    /// schedules it again.
    Unavailable {
        tile: TileCoord,
        attempts: u32,
        error: String,
    },
    RescanFinished {
        elapsed: Duration,
        regions_scanned: usize,
        regions_changed: usize,
        tiles_enqueued: usize,
    },
}

/// Where a tile stands as far as this process knows.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TileStatus {
    /// Nothing scheduled and no stored copy.
    Idle,
    Queued,
    InProgress,
    /// Waiting out a backoff before the next attempt.
    Retrying { attempt: u32 },
    /// Parent waiting for its children to settle.
    Dirty,
    /// Not scheduled; a stored copy exists.
    Done { empty: bool },
    Unavailable,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Progress {
    pub queued: usize,
    pub in_flight: usize,
    pub retrying: usize,
    pub dirty_parents: usize,
    pub completed: u64,
    pub failed: u64,
    pub terminal_failed: u64,
    /// Highest queued + in-flight count seen.
    pub peak_depth: usize,
    pub paused: bool,
    pub cache: ChunkCacheStats,
}

impl Progress {
    /// Nothing queued, running, retrying or waiting on children.
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.in_flight == 0 && self.retrying == 0 && self.dirty_parents == 0
    }
}
