//! Housekeeping loop.
//!
//! One background thread carries every periodic duty: the status line, error
//! log flushes, shader-list persistence, and cache saves. Each step runs
//! under `catch_unwind` so a panic in one duty cannot take the thread (and
//! with it all persistence) down.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, trace, warn};

use crate::server::ServerContext;

/// Nominal spacing between ticks. A slow tick shortens the following sleep
/// instead of letting the schedule drift.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Start the housekeeping thread. It runs until the context requests
/// shutdown, finishing with one final tick so nothing pending is stranded.
pub fn spawn(ctx: Arc<ServerContext>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("housekeeping".into())
        .spawn(move || {
            while !ctx.state.is_shutdown() {
                let started = Instant::now();
                tick(&ctx);
                let elapsed = started.elapsed();
                if elapsed < TICK_INTERVAL {
                    thread::sleep(TICK_INTERVAL - elapsed);
                }
            }
            tick(&ctx);
        })
}

/// One pass over every periodic duty.
pub fn tick(ctx: &ServerContext) {
    guarded(ctx, "status", || {
        let line = format!(
            "{} compiling, {} open, {} exceptions",
            ctx.state.active_compiles(),
            ctx.state.open_connections(),
            ctx.state.exceptions(),
        );
        trace!(status = %line);
        ctx.state.set_status(line);
    });

    guarded(ctx, "error-log", || {
        if let Err(e) = ctx.errors.tick() {
            warn!(error = %e, "failed to flush error log");
        }
    });

    guarded(ctx, "shader-lists", || {
        ctx.shader_lists.tick();
    });

    guarded(ctx, "cache", || {
        if let Some(cache) = &ctx.cache {
            if let Err(e) = cache.save_pending() {
                warn!(error = %e, "failed to save cache");
            }
        }
    });
}

fn guarded(ctx: &ServerContext, step: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        ctx.state.exception_recorded();
        error!(step, "housekeeping step panicked");
    }
}
