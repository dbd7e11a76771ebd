//! Accept loop.
//!
//! Polls the listener, applies the whitelist, takes an admission permit, and
//! hands each connection to its own worker thread. The permit and the
//! connection guard travel into the thread so the ceiling and the counters
//! resolve correctly on every exit path, panics included.

use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::job;
use crate::server::{AdmissionControl, ServerContext};
use crate::transport::{Connection, Listener};

/// Drive the listener until shutdown is requested.
pub fn run_accept_loop(
    ctx: &Arc<ServerContext>,
    listener: &mut dyn Listener,
    admission: &Arc<AdmissionControl>,
) {
    while !ctx.state.is_shutdown() {
        match listener.poll_accept() {
            Ok(Some(conn)) => handle_accepted(ctx, conn, admission),
            Ok(None) => thread::sleep(ctx.env.accept_poll),
            Err(e) => {
                warn!(error = %e, "accept failed");
                thread::sleep(ctx.env.accept_poll);
            }
        }
    }
}

fn handle_accepted(
    ctx: &Arc<ServerContext>,
    mut conn: Box<dyn Connection>,
    admission: &Arc<AdmissionControl>,
) {
    let peer = conn.peer_ip();
    if !ctx.env.is_peer_allowed(peer) {
        warn!(%peer, "rejected connection from non-whitelisted peer");
        return;
    }

    // Blocks here when the farm is saturated; no further accepts happen
    // until a worker releases its permit.
    let permit = admission.acquire();
    let connection_id = ctx.state.connection_opened();
    debug!(%peer, connection = connection_id, "connection accepted");

    let job_ctx = Arc::clone(ctx);
    let builder = thread::Builder::new().name(format!("job-{connection_id}"));
    let spawned = builder.spawn(move || {
        let _permit = permit;
        let _open = job_ctx.state.connection_guard();
        job::process_connection(&job_ctx, conn.as_mut(), connection_id);
    });
    if let Err(e) = spawned {
        // The worker never ran, so the open count it would have closed is
        // unwound here.
        warn!(connection = connection_id, error = %e, "failed to spawn worker");
        drop(ctx.state.connection_guard());
    }
}
