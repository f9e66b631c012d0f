use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use hashbrown::HashSet;
use log::{debug, error, info, trace, warn};
use notify::RecommendedWatcher;
use rayon::{ThreadPool, ThreadPoolBuilder};
use strata_chunk::RegionCoord;
use strata_render::{RenderError, TileCoord, TilePayload};
use strata_storage::StorageError;
use thiserror::Error;

use crate::context::RenderContext;
use crate::events::{Progress, Reason, Reasons, RenderEvent, TileStatus};
use crate::marks::{WorldMarks, footprint_regions};
use crate::queue::{Enqueued, Failure, RenderTask, TaskQueue};
use crate::watch::watch_regions;

// Upper bound on how long an idle worker sleeps before rechecking retries.
const IDLE_WAIT: Duration = Duration::from_millis(500);
const ENQUEUE_WAIT: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("failed to spawn rescan thread: {0}")]
    Thread(#[source] std::io::Error),
    #[error("failed to watch world directory: {0}")]
    Watch(#[from] notify::Error),
    #[error("scheduler already started")]
    AlreadyStarted,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RescanSummary {
    pub regions_scanned: usize,
    pub regions_changed: usize,
    pub tiles_enqueued: usize,
    pub parents_marked: usize,
    /// The pass stopped early because of `cancel_all` or shutdown.
    pub aborted: bool,
}

/// State shared by the workers, the rescan thread and the handle.
struct Shared {
    ctx: Arc<RenderContext>,
    queue: Mutex<TaskQueue>,
    // Signalled when work may be available.
    work: Condvar,
    // Signalled when slots free up or the queue goes idle.
    space: Condvar,
    marks: Mutex<WorldMarks>,
    rescan_lock: Mutex<()>,
    events: Sender<RenderEvent>,
    stopping: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
    terminal: AtomicU64,
}

/// Keeps the tile pyramid in step with the world store.
///
/// Rescans find tiles whose chunks changed and queue them; workers on a rayon
/// pool render them lowest level first, persist them, and mark parents dirty
/// so the pyramid is rebuilt bottom up.
pub struct Scheduler {
    shared: Arc<Shared>,
    events: Receiver<RenderEvent>,
    pool: Option<ThreadPool>,
    rescan_thread: Option<JoinHandle<()>>,
    wake: Option<Sender<()>>,
    watcher: Option<RecommendedWatcher>,
}

impl Scheduler {
    pub fn new(ctx: Arc<RenderContext>) -> Self {
        let (tx, rx) = unbounded();
        Scheduler {
            shared: Arc::new(Shared {
                ctx,
                queue: Mutex::new(TaskQueue::default()),
                work: Condvar::new(),
                space: Condvar::new(),
                marks: Mutex::new(WorldMarks::default()),
                rescan_lock: Mutex::new(()),
                events: tx,
                stopping: AtomicBool::new(false),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                terminal: AtomicU64::new(0),
            }),
            events: rx,
            pool: None,
            rescan_thread: None,
            wake: None,
            watcher: None,
        }
    }

    pub fn context(&self) -> &Arc<RenderContext> {
        &self.shared.ctx
    }

    /// Receiver for every event the scheduler publishes. Clones share one
    /// stream.
    pub fn events(&self) -> Receiver<RenderEvent> {
        self.events.clone()
    }

    /// Starts the workers, the periodic rescan loop and, when configured, the
    /// region directory watcher. The first rescan runs immediately.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        let (wake_tx, wake_rx) = bounded::<()>(1);
        if self.shared.ctx.config.watch_world {
            let dir = self.shared.ctx.reader.region_dir().to_path_buf();
            self.watcher = Some(watch_regions(&dir, wake_tx.clone())?);
            info!(target: "scheduler", "watching {}", dir.display());
        }
        self.start_workers()?;
        let shared = self.shared.clone();
        let interval = Duration::from_secs(shared.ctx.config.rescan_interval_seconds.max(1));
        let handle = thread::Builder::new()
            .name("strata-rescan".into())
            .spawn(move || rescan_loop(shared, wake_rx, interval))
            .map_err(SchedulerError::Thread)?;
        self.rescan_thread = Some(handle);
        self.wake = Some(wake_tx);
        Ok(())
    }

    /// Starts only the render workers; rescans are driven by the caller.
    pub fn start_workers(&mut self) -> Result<(), SchedulerError> {
        if self.pool.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }
        let n = self.shared.ctx.config.worker_count.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("strata-render-{i}"))
            .build()?;
        for i in 0..n {
            let shared = self.shared.clone();
            pool.spawn(move || {
                while let Some(task) = shared.next_task() {
                    shared.run(task);
                }
                trace!(target: "scheduler", "worker {i} exiting");
            });
        }
        info!(target: "scheduler", "started {n} render workers");
        self.pool = Some(pool);
        Ok(())
    }

    /// Runs one rescan pass on the calling thread.
    pub fn rescan(&self) -> RescanSummary {
        self.shared.rescan()
    }

    /// Wakes the rescan loop early. Requests made while a pass is running
    /// coalesce into one follow-up pass.
    pub fn request_rescan(&self) {
        if let Some(wake) = &self.wake {
            let _ = wake.try_send(());
        }
    }

    /// Schedules `tile` directly. Blocks while the queue is at capacity.
    pub fn enqueue(&self, tile: TileCoord, reason: Reason) -> Option<Enqueued> {
        let epoch = self.shared.lock_queue().epoch;
        self.shared.enqueue_blocking(tile, Reasons::of(reason), epoch)
    }

    pub fn pause(&self) {
        self.shared.lock_queue().paused = true;
        info!(target: "scheduler", "paused");
    }

    pub fn resume(&self) {
        self.shared.lock_queue().paused = false;
        self.shared.work.notify_all();
        info!(target: "scheduler", "resumed");
    }

    /// Drops queued, retrying and dirty work. Running tasks finish and are
    /// stored but neither retry nor propagate. Regions under dropped and
    /// interrupted tiles are re-examined by the next rescan.
    pub fn cancel_all(&self) -> usize {
        let dropped = self.shared.lock_queue().cancel();
        self.shared.space.notify_all();
        self.shared.forget_tiles(&dropped);
        info!(target: "scheduler", "cancelled {} tiles", dropped.len());
        dropped.len()
    }

    /// Blocks until nothing is queued, running, retrying, dirty or being
    /// rescanned. `false` on timeout.
    pub fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut q = self.shared.lock_queue();
        loop {
            if q.is_idle() {
                return true;
            }
            let wait = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return false;
                    }
                    (d - now).min(IDLE_WAIT)
                }
                None => IDLE_WAIT,
            };
            q = self.shared.space.wait_timeout(q, wait).unwrap().0;
        }
    }

    /// Scheduling state, or for tiles nothing is scheduling, whether a copy
    /// is stored.
    pub fn status(&self, tile: TileCoord) -> TileStatus {
        match self.shared.lock_queue().status(tile) {
            TileStatus::Idle => match self.shared.ctx.storage.metadata(tile) {
                Ok(Some(meta)) => TileStatus::Done { empty: meta.empty },
                _ => TileStatus::Idle,
            },
            status => status,
        }
    }

    pub fn progress(&self) -> Progress {
        let q = self.shared.lock_queue();
        let (queued, retrying, dirty_parents) = q.counts();
        Progress {
            queued,
            in_flight: q.in_flight,
            retrying,
            dirty_parents,
            completed: self.shared.completed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            terminal_failed: self.shared.terminal.load(Ordering::Relaxed),
            peak_depth: q.peak_depth(),
            paused: q.paused,
            cache: self.shared.ctx.cache.stats(),
        }
    }

    /// Stops the rescan loop, cancels pending work and waits up to `timeout`
    /// for running tasks. Returns whether everything stopped in time.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.watcher = None;
        self.wake = None;
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.cancel_all();
        self.shared.work.notify_all();

        let mut q = self.shared.lock_queue();
        while q.in_flight > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            q = self.shared.space.wait_timeout(q, deadline - now).unwrap().0;
        }
        let drained = q.in_flight == 0;
        drop(q);

        let mut rescan_done = true;
        if let Some(handle) = self.rescan_thread.take() {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                rescan_done = false;
            }
        }
        self.pool = None;
        let clean = drained && rescan_done;
        if clean {
            info!(target: "scheduler", "shut down");
        } else {
            warn!(target: "scheduler", "shutdown timed out with work still running");
        }
        clean
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.work.notify_all();
        self.shared.space.notify_all();
    }
}

fn rescan_loop(shared: Arc<Shared>, wake: Receiver<()>, interval: Duration) {
    loop {
        if shared.stopping.load(Ordering::SeqCst) {
            break;
        }
        shared.rescan();
        match wake.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(target: "scheduler", "rescan loop exiting");
}

impl Shared {
    #[inline]
    fn lock_queue(&self) -> MutexGuard<'_, TaskQueue> {
        self.queue.lock().unwrap()
    }

    fn emit(&self, event: RenderEvent) {
        let _ = self.events.send(event);
    }

    fn cap(&self) -> usize {
        self.ctx.config.max_queue_depth.max(1)
    }

    fn aborted(&self, epoch: u64, q: &TaskQueue) -> bool {
        self.stopping.load(Ordering::SeqCst) || q.epoch != epoch
    }

    /// Waits for room below the depth cap unless the tile is already
    /// scheduled. `None` if the pass was cancelled while waiting.
    fn enqueue_blocking(&self, tile: TileCoord, reasons: Reasons, epoch: u64) -> Option<Enqueued> {
        let cap = self.cap();
        let mut q = self.lock_queue();
        loop {
            if self.aborted(epoch, &q) {
                return None;
            }
            if q.contains(tile) || q.depth() < cap {
                break;
            }
            q = self.space.wait_timeout(q, ENQUEUE_WAIT).unwrap().0;
        }
        let result = q.enqueue(tile, reasons);
        drop(q);
        if result == Enqueued::Queued {
            debug!(target: "render", "queued {tile} ({reasons})");
            self.emit(RenderEvent::Queued { tile, reasons });
            self.work.notify_one();
        }
        Some(result)
    }

    fn next_task(&self) -> Option<RenderTask> {
        let grid = *self.ctx.grid();
        let cap = self.cap();
        let mut q = self.lock_queue();
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                return None;
            }
            let now = Instant::now();
            let next_due = q.promote_retries(now);
            // A running rescan may still queue children of a dirty parent.
            if q.rescans == 0 {
                for (tile, reasons) in q.promote_dirty(&grid, cap) {
                    debug!(target: "render", "queued {tile} ({reasons})");
                    self.emit(RenderEvent::Queued { tile, reasons });
                }
            }
            if let Some(task) = q.pop() {
                return Some(task);
            }
            let wait = next_due.map_or(IDLE_WAIT, |d| d.saturating_duration_since(now).min(IDLE_WAIT));
            q = self.work.wait_timeout(q, wait).unwrap().0;
        }
    }

    fn run(&self, task: RenderTask) {
        let tile = task.tile;
        let watermark = self.watermark(tile);
        trace!(target: "render", "start {tile} attempt {} ({})", task.attempt, task.reasons);
        self.emit(RenderEvent::Started {
            tile,
            attempt: task.attempt,
        });
        let started = Instant::now();
        let result = self.render(tile).and_then(|payload| {
            self.ctx.storage.put(tile, &payload, watermark)?;
            Ok(payload.is_empty())
        });
        let elapsed = started.elapsed();
        match result {
            Ok(empty) => self.finish_ok(&task, empty, watermark, elapsed),
            Err(e) => self.finish_err(&task, e),
        }
        self.work.notify_all();
        self.space.notify_all();
    }

    fn render(&self, tile: TileCoord) -> Result<TilePayload, TaskError> {
        let renderer = &self.ctx.renderer;
        if tile.is_hires() {
            return Ok(renderer.render_hires(tile)?);
        }
        let children: Vec<Option<TilePayload>> = self
            .ctx
            .grid()
            .children(tile)
            .into_iter()
            .map(|child| match self.ctx.storage.get(child) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(target: "render", "tile {tile}: child {child} unreadable, sampling chunks: {e}");
                    None
                }
            })
            .collect();
        Ok(renderer.render_lowres(tile, &children)?)
    }

    fn finish_ok(&self, task: &RenderTask, empty: bool, watermark: u64, elapsed: Duration) {
        let tile = task.tile;
        let propagate = {
            let mut q = self.lock_queue();
            let propagate = q.finish_ok(task);
            // Cancelled mid-render, or chunks changed under it: the next
            // rescan must look at the tile's regions again. Done before the
            // queue can be seen idle.
            if !propagate || self.watermark(tile) > watermark {
                self.forget_tiles(&[tile]);
            }
            propagate
        };
        self.completed.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "render",
            "rendered {tile} in {:.1}ms{}",
            elapsed.as_secs_f64() * 1000.0,
            if empty { " (empty)" } else { "" }
        );
        self.emit(RenderEvent::Completed {
            tile,
            empty,
            elapsed,
        });
        if propagate {
            if let Some(parent) = self.ctx.grid().parent(tile) {
                self.lock_queue()
                    .mark_dirty(parent, Reason::ParentOfChangedChild);
            }
        }
    }

    fn finish_err(&self, task: &RenderTask, err: TaskError) {
        let tile = task.tile;
        if let TaskError::Render(RenderError::RegionUnavailable(e)) = &err {
            self.marks.lock().unwrap().forget(e.region);
        }
        let config = &self.ctx.config;
        let outcome = {
            let mut q = self.lock_queue();
            let outcome = q.finish_err(
                task,
                config.retry_limit,
                Duration::from_millis(config.retry_backoff_ms),
            );
            if outcome == Failure::Dropped {
                self.forget_tiles(&[tile]);
            }
            outcome
        };
        let error = err.to_string();
        match outcome {
            Failure::Retry { delay } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "render",
                    "tile {tile} attempt {} failed, retrying in {delay:?}: {error}",
                    task.attempt
                );
                self.emit(RenderEvent::Failed {
                    tile,
                    attempt: task.attempt,
                    error,
                    retry_in: delay,
                });
            }
            Failure::Terminal { attempts } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.terminal.fetch_add(1, Ordering::Relaxed);
                error!(target: "render", "tile {tile} unavailable after {attempts} attempts: {error}");
                self.emit(RenderEvent::Unavailable {
                    tile,
                    attempts,
                    error,
                });
            }
            Failure::Dropped => {
                debug!(target: "render", "tile {tile} failed after cancel: {error}");
            }
        }
    }

    fn watermark(&self, tile: TileCoord) -> u64 {
        let fp = self.ctx.grid().footprint(tile);
        self.marks.lock().unwrap().watermark(fp)
    }

    fn forget_tiles(&self, tiles: &[TileCoord]) {
        let grid = self.ctx.grid();
        let regions: BTreeSet<RegionCoord> = tiles
            .iter()
            .flat_map(|t| footprint_regions(grid.footprint(*t)))
            .collect();
        let mut marks = self.marks.lock().unwrap();
        for r in regions {
            marks.forget(r);
        }
    }

    fn rescan(&self) -> RescanSummary {
        let _serial = self.rescan_lock.lock().unwrap();
        let epoch = {
            let mut q = self.lock_queue();
            q.rescans += 1;
            q.epoch
        };
        let started = Instant::now();
        let summary = self.rescan_pass(epoch);
        self.lock_queue().rescans -= 1;
        self.space.notify_all();
        self.work.notify_all();

        let elapsed = started.elapsed();
        if summary.aborted {
            info!(target: "scheduler", "rescan aborted after {elapsed:?}");
        } else {
            info!(
                target: "scheduler",
                "rescan: {} regions, {} changed, {} tiles queued, {} parents dirty in {:.1}ms",
                summary.regions_scanned,
                summary.regions_changed,
                summary.tiles_enqueued,
                summary.parents_marked,
                elapsed.as_secs_f64() * 1000.0
            );
        }
        self.emit(RenderEvent::RescanFinished {
            elapsed,
            regions_scanned: summary.regions_scanned,
            regions_changed: summary.regions_changed,
            tiles_enqueued: summary.tiles_enqueued,
        });
        summary
    }

    fn rescan_pass(&self, epoch: u64) -> RescanSummary {
        let reader = &self.ctx.reader;
        let grid = *self.ctx.grid();
        let mut summary = RescanSummary::default();

        let regions = match reader.list_regions() {
            Ok(r) => r,
            Err(e) => {
                error!(target: "scheduler", "listing regions: {e}");
                return summary;
            }
        };
        summary.regions_scanned = regions.len();

        let mut candidates: BTreeSet<TileCoord> = BTreeSet::new();
        let mut forced: HashSet<TileCoord> = HashSet::new();
        let mut touched: Vec<RegionCoord> = Vec::new();
        let listed: HashSet<RegionCoord> = regions.iter().copied().collect();
        let vanished: Vec<RegionCoord> = self
            .marks
            .lock()
            .unwrap()
            .regions()
            .filter(|r| !listed.contains(r))
            .collect();

        for region in regions.iter().copied().chain(vanished) {
            let mtime = match reader.region_modification_time(region) {
                Ok(t) => t,
                Err(e) => {
                    warn!(target: "scheduler", "{e}");
                    continue;
                }
            };
            if let Some(t) = mtime {
                if self.marks.lock().unwrap().region_unchanged(region, t) {
                    continue;
                }
            }
            let stamps = match mtime {
                Some(_) => match reader.chunk_timestamps(region) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(target: "scheduler", "{e}");
                        continue;
                    }
                },
                None => Vec::new(),
            };
            // Cache first, then marks: a worker that sees the new timestamps
            // can only load the new chunks.
            let delta = {
                let mut marks = self.marks.lock().unwrap();
                let delta = marks.apply(region, mtime, &stamps);
                if !delta.is_empty() {
                    self.ctx.cache.invalidate(region);
                }
                delta
            };
            touched.push(region);
            if delta.is_empty() {
                continue;
            }
            summary.regions_changed += 1;
            trace!(
                target: "scheduler",
                "region {}.{}: {} chunks changed, {} removed",
                region.x,
                region.z,
                delta.changed.len(),
                delta.removed.len()
            );
            candidates.extend(delta.changed.iter().map(|c| grid.hires_tile_of(*c)));
            for c in &delta.removed {
                let t = grid.hires_tile_of(*c);
                candidates.insert(t);
                forced.insert(t);
            }
        }

        let mut settled: Vec<TileCoord> = Vec::new();
        for tile in candidates {
            let watermark = self.watermark(tile);
            let reason = match self.ctx.storage.metadata(tile) {
                Ok(Some(meta)) if meta.watermark >= watermark && !forced.contains(&tile) => {
                    settled.push(tile);
                    continue;
                }
                Ok(Some(_)) => Reason::WorldChanged,
                Ok(None) => Reason::Initial,
                Err(e) => {
                    warn!(target: "scheduler", "tile {tile}: {e}; rendering again");
                    Reason::Initial
                }
            };
            match self.enqueue_blocking(tile, Reasons::of(reason), epoch) {
                Some(_) => summary.tiles_enqueued += 1,
                None => {
                    summary.aborted = true;
                    break;
                }
            }
        }

        if !summary.aborted {
            summary.parents_marked = self.mark_stale_ancestors(&settled, epoch);
            summary.aborted = self.aborted(epoch, &self.lock_queue());
        }
        if summary.aborted {
            let mut marks = self.marks.lock().unwrap();
            for r in touched {
                marks.forget(r);
            }
        }
        summary
    }

    /// Walks up from up-to-date hires tiles and marks every ancestor whose
    /// stored copy is missing or older than its footprint dirty. Ancestors
    /// of a dirty tile are reached later through propagation.
    fn mark_stale_ancestors(&self, settled: &[TileCoord], epoch: u64) -> usize {
        let grid = *self.ctx.grid();
        let mut level: BTreeSet<TileCoord> = settled.iter().filter_map(|t| grid.parent(*t)).collect();
        let mut stale: BTreeMap<TileCoord, Reason> = BTreeMap::new();
        while !level.is_empty() {
            let mut next = BTreeSet::new();
            for tile in level {
                let watermark = self.watermark(tile);
                match self.ctx.storage.metadata(tile) {
                    Ok(Some(meta)) if meta.watermark >= watermark => {
                        next.extend(grid.parent(tile));
                    }
                    Ok(Some(_)) => {
                        stale.insert(tile, Reason::WorldChanged);
                    }
                    Ok(None) | Err(_) => {
                        stale.insert(tile, Reason::Initial);
                    }
                }
            }
            level = next;
        }
        if stale.is_empty() {
            return 0;
        }
        let mut q = self.lock_queue();
        if q.epoch != epoch {
            return 0;
        }
        for (tile, reason) in &stale {
            q.mark_dirty(*tile, *reason);
        }
        drop(q);
        self.work.notify_all();
        stale.len()
    }
}
