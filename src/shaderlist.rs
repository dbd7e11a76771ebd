//! Shader-list bookkeeping seam.
//!
//! Request-line jobs register shader request lines per platform; the
//! housekeeping loop ticks the bookkeeping so registrations reach disk.
//! List format and downstream consumption are owned by the collaborator;
//! the file-backed default keeps one deduplicated line file per platform.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, warn};

/// Collaborator interface for shader-list maintenance.
pub trait ShaderListBookkeeping: Send + Sync {
    /// Register a shader request line for a platform.
    fn add_request_line(&self, platform: &str, peer_ip: IpAddr, line: &str);

    /// Periodic bookkeeping, invoked from the housekeeping loop.
    fn tick(&self);
}

/// File-backed default: pending lines accumulate in memory and are merged
/// into `<shader_dir>/<platform>/ShaderList.txt` on each tick.
pub struct FileShaderList {
    dir: PathBuf,
    pending: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl FileShaderList {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl ShaderListBookkeeping for FileShaderList {
    fn add_request_line(&self, platform: &str, peer_ip: IpAddr, line: &str) {
        debug!(%platform, %peer_ip, "shader request line registered");
        let mut pending = self.pending.lock().expect("shader list lock poisoned");
        pending
            .entry(platform.to_string())
            .or_default()
            .insert(line.to_string());
    }

    fn tick(&self) {
        let drained: HashMap<String, BTreeSet<String>> = {
            let mut pending = self.pending.lock().expect("shader list lock poisoned");
            std::mem::take(&mut *pending)
        };

        for (platform, lines) in drained {
            let platform_dir = self.dir.join(&platform);
            let path = platform_dir.join("ShaderList.txt");

            let mut merged: BTreeSet<String> = match fs::read_to_string(&path) {
                Ok(existing) => existing.lines().map(str::to_string).collect(),
                Err(_) => BTreeSet::new(),
            };
            merged.extend(lines);

            let write = fs::create_dir_all(&platform_dir).and_then(|_| {
                let content: String = merged.iter().map(|l| format!("{l}\n")).collect();
                fs::write(&path, content)
            });
            if let Err(e) = write {
                warn!(%platform, error = %e, "failed to persist shader list");
            }
        }
    }
}
