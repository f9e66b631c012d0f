//! Render scheduling: configuration, the shared render context, and the
//! scheduler that keeps stored tiles in step with the world.
#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod events;
mod marks;
mod queue;
pub mod scheduler;
mod watch;

pub use config::{CachePolicy, ConfigError, RenderConfig};
pub use context::RenderContext;
pub use events::{Progress, Reason, Reasons, RenderEvent, TileStatus};
pub use queue::{Enqueued, RenderTask};
pub use scheduler::{RescanSummary, Scheduler, SchedulerError, TaskError};
