//! Mail notification seam.
//!
//! Actual mail delivery is an external collaborator; the server only decides
//! *when* a digest goes out. The default implementation logs the digest.

use tracing::warn;

/// Receives failure digests from the error log.
pub trait MailNotifier: Send + Sync {
    fn notify(&self, digest: &str);
}

/// Default notifier: writes the digest to the log at warn level.
pub struct LogNotifier;

impl MailNotifier for LogNotifier {
    fn notify(&self, digest: &str) {
        warn!(%digest, "failure digest (mail delivery not configured)");
    }
}
