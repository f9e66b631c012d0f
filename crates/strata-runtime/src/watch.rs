use std::path::Path;

use crossbeam_channel::Sender;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Requests a rescan whenever a file in the region directory is created,
/// modified or removed. Bursts of events collapse into the one pending
/// request the channel can hold.
pub(crate) fn watch_regions(dir: &Path, wake: Sender<()>) -> notify::Result<RecommendedWatcher> {
    let mut watcher =
        notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => match event.kind {
                EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_) | EventKind::Any => {
                    let _ = wake.try_send(());
                }
                _ => {}
            },
            Err(e) => log::warn!(target: "scheduler", "watch error: {e}"),
        })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
