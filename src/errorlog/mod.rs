//! Durable, deduplicated failure log.
//!
//! Job threads offer records via [`ErrorLog::add`], which either takes the
//! record (returns `true`) or declines it because an identical failure was
//! seen inside the dedupe window (returns `false` — the caller just drops
//! its record; the log bumps the occurrence count of the one it kept).
//! The housekeeping loop is the only caller of [`ErrorLog::tick`], which
//! flushes pending records to JSONL files and drives mail notification.

pub mod mail;

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

pub use mail::{LogNotifier, MailNotifier};

/// Optional request context attached to a failure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobDiagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_ip: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<u64>,
}

/// One classified failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Stable kind name from the error taxonomy.
    pub kind: String,
    /// Human-readable detail, as sent to the client.
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<JobDiagnostics>,
    pub first_seen: DateTime<Utc>,
    /// How many identical failures were coalesced into this record.
    pub occurrences: u32,
}

impl ErrorRecord {
    pub fn new(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            detail: detail.into(),
            context: None,
            first_seen: Utc::now(),
            occurrences: 1,
        }
    }

    pub fn with_context(mut self, context: JobDiagnostics) -> Self {
        self.context = Some(context);
        self
    }

    fn dedupe_key(&self) -> (String, String) {
        (self.kind.clone(), self.detail.clone())
    }
}

struct Inner {
    pending: Vec<ErrorRecord>,
    /// Last time each (kind, detail) pair was seen, for the dedupe window.
    recent: HashMap<(String, String), Instant>,
    last_notified: Instant,
    flushed_since_notify: usize,
}

/// Process-wide error log. Serializes concurrent `add` calls internally.
pub struct ErrorLog {
    inner: Mutex<Inner>,
    error_dir: PathBuf,
    dedupe_window: Duration,
    mail_interval: Duration,
    notifier: Box<dyn MailNotifier>,
}

impl ErrorLog {
    pub fn new(
        error_dir: PathBuf,
        dedupe_window: Duration,
        mail_interval: Duration,
        notifier: Box<dyn MailNotifier>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: Vec::new(),
                recent: HashMap::new(),
                last_notified: Instant::now(),
                flushed_since_notify: 0,
            }),
            error_dir,
            dedupe_window,
            mail_interval,
            notifier,
        }
    }

    /// Offer a record. Returns whether the log took it; on `false` the
    /// caller owns (and drops) the declined record.
    pub fn add(&self, record: ErrorRecord) -> bool {
        let mut inner = self.inner.lock().expect("error log lock poisoned");
        let key = record.dedupe_key();
        let now = Instant::now();

        let duplicate = inner
            .recent
            .get(&key)
            .is_some_and(|last_seen| now.duration_since(*last_seen) <= self.dedupe_window);
        if duplicate {
            inner.recent.insert(key.clone(), now);
            if let Some(kept) = inner
                .pending
                .iter_mut()
                .rev()
                .find(|r| r.dedupe_key() == key)
            {
                kept.occurrences += 1;
            }
            debug!(kind = %record.kind, "duplicate error coalesced");
            return false;
        }

        inner.recent.insert(key, now);
        inner.pending.push(record);
        true
    }

    /// Flush pending records. Called from the housekeeping loop only, never
    /// concurrently with itself. Returns the number of records written.
    pub fn tick(&self) -> io::Result<usize> {
        let (records, notify) = {
            let mut inner = self.inner.lock().expect("error log lock poisoned");
            let records: Vec<ErrorRecord> = inner.pending.drain(..).collect();

            // Expire dedupe entries outside the window.
            let window = self.dedupe_window;
            inner
                .recent
                .retain(|_, last_seen| last_seen.elapsed() <= window);

            inner.flushed_since_notify += records.len();
            let due = inner.flushed_since_notify > 0
                && inner.last_notified.elapsed() >= self.mail_interval;
            let notify = due.then(|| {
                let count = inner.flushed_since_notify;
                inner.flushed_since_notify = 0;
                inner.last_notified = Instant::now();
                count
            });
            (records, notify)
        };

        if !records.is_empty() {
            self.write_records(&records)?;
        }
        if let Some(count) = notify {
            self.notifier
                .notify(&format!("{count} failure(s) recorded since last notification"));
        }
        Ok(records.len())
    }

    /// Records waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.inner
            .lock()
            .expect("error log lock poisoned")
            .pending
            .len()
    }

    fn write_records(&self, records: &[ErrorRecord]) -> io::Result<()> {
        let file_name = format!("errors-{}.jsonl", Utc::now().format("%Y-%m-%d"));
        let path = self.error_dir.join(file_name);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(file, "{line}")?;
        }
        file.flush()
    }
}
