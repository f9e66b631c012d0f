mod cli;

use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use log::{LevelFilter, error, info, warn};
use strata_runtime::{
    ConfigError, Progress, RenderConfig, RenderContext, RenderEvent, Scheduler, SchedulerError,
};
use thiserror::Error;

use crate::cli::{Cli, Command, RenderArgs};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const REPORT_EVERY: u64 = 256;

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Render(args) => {
            init_logging(args.verbose);
            match render(args) {
                Ok(code) => code,
                Err(e) => {
                    error!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .init();
}

fn render(args: RenderArgs) -> Result<ExitCode, AppError> {
    let mut config = RenderConfig::load(&args.config)?;
    if let Some(n) = args.workers {
        config.worker_count = n;
        config.validate()?;
    }
    info!(
        "world {} -> tiles {}",
        config.world_store_path.display(),
        config.tile_storage_path.display()
    );
    let ctx = Arc::new(RenderContext::open(config)?);
    let mut scheduler = Scheduler::new(ctx);
    spawn_reporter(scheduler.events());

    if args.once {
        scheduler.start_workers()?;
        scheduler.rescan();
        let drained = scheduler.wait_idle(args.duration.map(Duration::from_secs));
        if !drained {
            warn!("duration elapsed with work still pending");
        }
        let progress = scheduler.progress();
        let stopped = scheduler.shutdown(SHUTDOWN_TIMEOUT);
        info!(
            "done: {} tiles rendered, {} unavailable",
            progress.completed, progress.terminal_failed
        );
        return Ok(if finished_cleanly(drained, stopped, &progress) {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(2)
        });
    }

    scheduler.start()?;
    let deadline = args.duration.map(|s| Instant::now() + Duration::from_secs(s));
    let commands = spawn_stdin();
    loop {
        let wait = match deadline {
            Some(d) => d.saturating_duration_since(Instant::now()),
            None => Duration::from_secs(3600),
        };
        match commands.recv_timeout(wait) {
            Ok(line) => handle_command(&scheduler, line.trim()),
            Err(RecvTimeoutError::Timeout) if deadline.is_none() => {}
            Err(RecvTimeoutError::Timeout) => {
                info!("duration elapsed");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => {
                info!("stdin closed");
                break;
            }
        }
    }
    let clean = scheduler.shutdown(SHUTDOWN_TIMEOUT);
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// A `--once` run succeeds only if the queue drained before the time limit,
/// shutdown finished in time and no tile ended unavailable.
fn finished_cleanly(drained: bool, stopped: bool, progress: &Progress) -> bool {
    drained && stopped && progress.terminal_failed == 0
}

fn handle_command(scheduler: &Scheduler, cmd: &str) {
    match cmd {
        "" => {}
        "pause" => scheduler.pause(),
        "resume" => scheduler.resume(),
        "rescan" => scheduler.request_rescan(),
        "cancel" => {
            scheduler.cancel_all();
        }
        "status" => {
            let p = scheduler.progress();
            info!(
                "queued {} in-flight {} retrying {} dirty {} done {} failed {} unavailable {} cache {}/{} hits/misses{}",
                p.queued,
                p.in_flight,
                p.retrying,
                p.dirty_parents,
                p.completed,
                p.failed,
                p.terminal_failed,
                p.cache.hits,
                p.cache.misses,
                if p.paused { " (paused)" } else { "" }
            );
        }
        other => warn!("unknown command {other:?}; try pause, resume, rescan, cancel or status"),
    }
}

/// Lines from stdin; the channel disconnects at EOF.
fn spawn_stdin() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn spawn_reporter(events: Receiver<RenderEvent>) {
    thread::spawn(move || {
        let mut completed = 0u64;
        for event in events.iter() {
            match event {
                RenderEvent::Completed { .. } => {
                    completed += 1;
                    if completed % REPORT_EVERY == 0 {
                        info!("{completed} tiles rendered");
                    }
                }
                RenderEvent::RescanFinished { tiles_enqueued, .. } if tiles_enqueued > 0 => {
                    info!("{tiles_enqueued} tiles scheduled");
                }
                _ => {}
            }
        }
    });
}
