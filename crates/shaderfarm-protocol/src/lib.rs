//! Shaderfarm Protocol Types
//!
//! Defines the versioned XML request envelope spoken between shader-farm
//! clients and the coordination server, the response framing, and the
//! compressed error-payload encoding.

pub mod compress;
pub mod error;
pub mod framing;
pub mod job_state;
pub mod request;
pub mod version;

pub use compress::{compress_payload, decompress_payload, error_payload};
pub use error::ProtocolError;
pub use framing::{encode_response, read_frame, write_frame, MAX_FRAME_BYTES};
pub use job_state::JobState;
pub use request::CompileRequest;
pub use version::ProtocolVersion;

/// Known job type for shader-request-line registration (V2+).
pub const JOB_TYPE_REQUEST_LINE: &str = "RequestLine";

/// Known job type for shader compilation (V2+).
pub const JOB_TYPE_COMPILE: &str = "Compile";
