//! Compile backend seam.
//!
//! The actual cross-compiler toolchains are external collaborators. The
//! server hands them a parsed invocation and expects either compiled bytes
//! or a classified failure. `ProcessBackend` is the production default: it
//! pipes the request through a compiler driver executable, mirroring how
//! farm deployments wrap per-platform toolchains behind one driver.

use std::io::Write as _;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use shaderfarm_protocol::ProtocolVersion;

/// Everything a backend needs to compile one request.
#[derive(Debug)]
pub struct CompileInvocation<'a> {
    pub version: ProtocolVersion,
    pub platform: &'a str,
    pub peer_ip: IpAddr,
    /// The unmodified request XML, as received.
    pub request_xml: &'a [u8],
    /// Shader-dump folder for the platform, when one is configured.
    pub dump_dir: Option<&'a Path>,
}

/// A classified backend failure, surfaced to the client and the error log.
#[derive(Debug, Clone, thiserror::Error)]
#[error("compile failed ({kind}): {detail}")]
pub struct CompileFailure {
    /// Stable failure-kind name (e.g. "compiler", "toolchain-missing").
    pub kind: String,
    pub detail: String,
}

impl CompileFailure {
    pub fn new(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            detail: detail.into(),
        }
    }
}

/// Executes one compile job. Implementations bound their own latency; the
/// server applies no per-job timeout.
pub trait CompileBackend: Send + Sync {
    fn compile(&self, invocation: &CompileInvocation<'_>) -> Result<Vec<u8>, CompileFailure>;
}

/// Production backend: spawns the compiler driver from the configured
/// compiler directory, writes the request XML to its stdin, and takes the
/// compiled payload from its stdout.
pub struct ProcessBackend {
    driver: PathBuf,
}

impl ProcessBackend {
    pub const DRIVER_NAME: &'static str = "shadercc";

    pub fn new(compiler_dir: &Path) -> Self {
        Self {
            driver: compiler_dir.join(Self::DRIVER_NAME),
        }
    }
}

impl CompileBackend for ProcessBackend {
    fn compile(&self, invocation: &CompileInvocation<'_>) -> Result<Vec<u8>, CompileFailure> {
        let mut command = Command::new(&self.driver);
        command
            .arg("--platform")
            .arg(invocation.platform)
            .arg("--protocol")
            .arg(invocation.version.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dump_dir) = invocation.dump_dir {
            command.arg("--dump-dir").arg(dump_dir);
        }

        let mut child = command.spawn().map_err(|e| {
            CompileFailure::new(
                "toolchain-missing",
                format!("failed to start {}: {e}", self.driver.display()),
            )
        })?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(invocation.request_xml).map_err(|e| {
                CompileFailure::new("toolchain-io", format!("failed to feed request: {e}"))
            })?;
        }

        let output = child.wait_with_output().map_err(|e| {
            CompileFailure::new("toolchain-io", format!("compiler driver failed: {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CompileFailure::new(
                "compiler",
                format!("driver exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_driver_is_classified() {
        let backend = ProcessBackend::new(Path::new("/nonexistent/compiler/dir"));
        let invocation = CompileInvocation {
            version: ProtocolVersion::V1,
            platform: "DX11",
            peer_ip: "127.0.0.1".parse().unwrap(),
            request_xml: b"<Compile Platform=\"DX11\"/>",
            dump_dir: None,
        };
        let err = backend.compile(&invocation).unwrap_err();
        assert_eq!(err.kind, "toolchain-missing");
    }

    #[test]
    fn test_failure_display() {
        let failure = CompileFailure::new("compiler", "syntax error line 12");
        assert_eq!(
            failure.to_string(),
            "compile failed (compiler): syntax error line 12"
        );
    }
}
