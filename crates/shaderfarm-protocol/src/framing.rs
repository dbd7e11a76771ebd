//! Wire framing.
//!
//! Every message on the wire is `[u32 LE length][payload]`. Responses differ
//! by negotiated version: V1 clients receive the payload bytes alone, V2+
//! clients receive a one-byte job-state code followed by the payload.

use std::io::{Read, Write};

use crate::error::ProtocolError;
use crate::job_state::JobState;
use crate::version::ProtocolVersion;

/// Upper bound on a single frame. Anything larger is treated as a protocol
/// violation rather than an allocation request.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Read one length-prefixed frame.
///
/// Returns `Ok(None)` on a clean EOF at a frame boundary, which the server
/// treats as a benign client disconnect. EOF inside a frame is an error.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match read_exact_or_eof(reader, &mut len_buf)? {
        ReadOutcome::Eof => return Ok(None),
        ReadOutcome::Partial(got) => {
            return Err(ProtocolError::TruncatedFrame { got, want: 4 });
        }
        ReadOutcome::Full => {}
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_BYTES,
        });
    }

    let mut payload = vec![0u8; len];
    match read_exact_or_eof(reader, &mut payload)? {
        ReadOutcome::Full => Ok(Some(payload)),
        ReadOutcome::Eof | ReadOutcome::Partial(_) => Err(ProtocolError::TruncatedFrame {
            got: 0,
            want: len,
        }),
    }
}

/// Write one length-prefixed frame.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_BYTES,
        });
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Build the version-specific response body that goes inside a frame.
pub fn encode_response(version: ProtocolVersion, state: JobState, payload: &[u8]) -> Vec<u8> {
    if version.frames_job_state() {
        let mut body = Vec::with_capacity(payload.len() + 1);
        body.push(state.code());
        body.extend_from_slice(payload);
        body
    } else {
        payload.to_vec()
    }
}

enum ReadOutcome {
    Full,
    Eof,
    Partial(usize),
}

fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<ReadOutcome, ProtocolError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Ok(if filled == 0 {
                    ReadOutcome::Eof
                } else {
                    ReadOutcome::Partial(filled)
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtocolError::Io(e)),
        }
    }
    Ok(ReadOutcome::Full)
}
