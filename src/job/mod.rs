//! Job processor: drives one connection from raw bytes to a sent response.
//!
//! Per-job sequence: receive → parse → negotiate version → dispatch →
//! execute → send. Failures in any stage after receive are caught at the
//! job boundary, recorded, and returned to the client as a compressed error
//! payload; they never propagate past the worker thread.

pub mod compile;

use std::fs;

use shaderfarm_cache::CacheStore;
use shaderfarm_protocol::{
    encode_response, error_payload, CompileRequest, JobState, ProtocolVersion,
    JOB_TYPE_COMPILE, JOB_TYPE_REQUEST_LINE,
};
use tracing::{debug, warn};

use crate::errorlog::{ErrorRecord, JobDiagnostics};
use crate::server::ServerContext;
use crate::transport::Connection;

pub use compile::{CompileBackend, CompileFailure, CompileInvocation, ProcessBackend};

/// Failures raised between parsing and response transmission.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{0}")]
    Protocol(#[from] shaderfarm_protocol::ProtocolError),

    #[error("{0}")]
    Compile(#[from] CompileFailure),
}

impl JobError {
    /// Stable kind name for the error log.
    pub fn kind_name(&self) -> &'static str {
        match self {
            JobError::Protocol(_) => "protocol",
            JobError::Compile(_) => "compile",
        }
    }
}

/// Mutable per-job bookkeeping threaded through dispatch, so the error path
/// knows the negotiated version and the job's last known state.
struct JobRun {
    version: ProtocolVersion,
    /// `None` until a job is constructed; errors before that report NotFound.
    state: Option<JobState>,
    platform: Option<String>,
    buffer: Vec<u8>,
}

/// Process one accepted connection end-to-end.
///
/// A failed or empty initial read is a benign client disconnect: no
/// response, no error record. Everything after that produces a response.
pub fn process_connection(ctx: &ServerContext, conn: &mut dyn Connection, connection_id: u64) {
    let raw = match conn.recv_message() {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!(connection = connection_id, "client disconnected before request");
            return;
        }
        Err(e) => {
            debug!(connection = connection_id, error = %e, "receive failed, dropping connection");
            return;
        }
    };

    let mut run = JobRun {
        version: ProtocolVersion::V1,
        state: None,
        platform: None,
        buffer: Vec::new(),
    };

    match execute(ctx, conn, &raw, &mut run) {
        Ok(()) => {
            let state = run.state.unwrap_or(JobState::NotFound);
            let body = encode_response(run.version, state, &run.buffer);
            if let Err(e) = conn.send_message(&body) {
                warn!(connection = connection_id, error = %e, "failed to send response");
            }
        }
        Err(err) => {
            ctx.state.exception_recorded();
            warn!(
                connection = connection_id,
                peer = %conn.peer_ip(),
                kind = err.kind_name(),
                error = %err,
                "job failed"
            );

            let detail = err.to_string();
            let record = ErrorRecord::new(err.kind_name(), detail.clone()).with_context(
                JobDiagnostics {
                    peer_ip: Some(conn.peer_ip()),
                    platform: run.platform.clone(),
                    protocol_version: Some(run.version.as_str().to_string()),
                    connection_id: Some(connection_id),
                },
            );
            if !ctx.errors.add(record) {
                // Declined by dedupe; the record is dropped here.
                debug!(connection = connection_id, "duplicate error not re-recorded");
            }

            let payload = error_payload(&detail);
            let state = run.state.unwrap_or(JobState::NotFound);
            let body = encode_response(run.version, state, &payload);
            if let Err(e) = conn.send_message(&body) {
                warn!(connection = connection_id, error = %e, "failed to send error response");
            }
        }
    }
}

fn execute(
    ctx: &ServerContext,
    conn: &mut dyn Connection,
    raw: &[u8],
    run: &mut JobRun,
) -> Result<(), JobError> {
    let request = CompileRequest::parse(raw)?;
    run.version = request.version();

    // Platform is required before any job side effect, including shader
    // dump folder creation.
    let platform = request.require_platform()?.to_string();
    run.platform = Some(platform.clone());

    let dump_dir = ctx.env.shader_dump_dir(&platform);
    if let Some(dir) = &dump_dir {
        if let Err(e) = fs::create_dir_all(dir) {
            warn!(platform = %platform, error = %e, "failed to create shader dump folder");
        }
    }

    if run.version.has_ready_handshake() {
        conn.recv_ready_token()?;
    }

    if run.version.requires_job_type() {
        match request.require_job_type()? {
            JOB_TYPE_REQUEST_LINE => {
                let line = String::from_utf8_lossy(request.raw_xml());
                ctx.shader_lists
                    .add_request_line(&platform, conn.peer_ip(), line.trim());
                // State-only response: no payload bytes for this job type.
                run.buffer.clear();
                run.state = Some(JobState::Completed);
            }
            JOB_TYPE_COMPILE => {
                run_compile(ctx, conn, &request, &platform, dump_dir.as_deref(), run)?;
            }
            other => {
                warn!(job_type = other, "unknown job type, producing no job");
            }
        }
    } else {
        // Legacy single-job-type path: any JobType attribute is ignored.
        run_compile(ctx, conn, &request, &platform, dump_dir.as_deref(), run)?;
    }

    Ok(())
}

fn run_compile(
    ctx: &ServerContext,
    conn: &mut dyn Connection,
    request: &CompileRequest,
    platform: &str,
    dump_dir: Option<&std::path::Path>,
    run: &mut JobRun,
) -> Result<(), JobError> {
    run.state = Some(JobState::Compiling);

    let key = CacheStore::entry_key(request.raw_xml());
    if let Some(cache) = &ctx.cache {
        if let Some(hit) = cache.lookup(&key) {
            debug!(platform = %platform, "cache hit");
            run.buffer = hit;
            run.state = Some(JobState::Completed);
            return Ok(());
        }
    }

    let invocation = CompileInvocation {
        version: run.version,
        platform,
        peer_ip: conn.peer_ip(),
        request_xml: request.raw_xml(),
        dump_dir,
    };

    let _active = ctx.state.compile_started();
    match ctx.backend.compile(&invocation) {
        Ok(bytes) => {
            if let Some(cache) = &ctx.cache {
                cache.insert(key, bytes.clone());
            }
            run.buffer = bytes;
            run.state = Some(JobState::Completed);
            Ok(())
        }
        Err(failure) => {
            run.state = Some(JobState::CompileError);
            Err(JobError::Compile(failure))
        }
    }
}
