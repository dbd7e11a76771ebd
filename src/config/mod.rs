//! Server environment configuration.
//!
//! The environment is built once at startup from a TOML file merged over
//! built-in defaults, with every configured path normalized to an absolute
//! canonical form. It is immutable afterwards; per-request values (like the
//! shader dump folder for a platform) are derived, never written back.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::net::IpAddr;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Configuration errors. All are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid whitelist entry '{0}'")]
    InvalidWhitelistEntry(String),

    #[error("failed to resolve working directory: {0}")]
    WorkingDir(io::Error),
}

/// Raw TOML file shape; every field optional, merged over defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
    pub accept_poll_ms: Option<u64>,
    pub caching: Option<bool>,
    pub root_dir: Option<PathBuf>,
    pub compiler_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub error_dir: Option<PathBuf>,
    pub shader_dir: Option<PathBuf>,
    pub dedupe_window_secs: Option<u64>,
    pub mail_server: Option<String>,
    pub mail_interval_secs: Option<u64>,
    pub whitelist: Option<Vec<String>>,
    pub platform_folders: Option<HashMap<String, String>>,
}

/// Mail notification settings for failure digests.
#[derive(Debug, Clone)]
pub struct MailSettings {
    /// SMTP relay, if any. `None` keeps notifications log-only.
    pub server: Option<String>,
    /// Minimum spacing between notifications.
    pub interval: Duration,
}

/// Process-wide configuration, constructed once at startup.
#[derive(Debug, Clone)]
pub struct ServerEnvironment {
    pub root_dir: PathBuf,
    pub compiler_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub error_dir: PathBuf,
    pub shader_dir: PathBuf,
    pub port: u16,
    pub max_connections: usize,
    /// Poll spacing for the accept loop.
    pub accept_poll: Duration,
    pub caching: bool,
    /// Window inside which identical error records are coalesced.
    pub dedupe_window: Duration,
    pub mail: MailSettings,
    /// Allowed client addresses. Empty means everyone.
    pub whitelist: Vec<IpAddr>,
    /// Platform name → shader-dump subfolder under `shader_dir`.
    pub platform_folders: HashMap<String, String>,
}

impl ServerEnvironment {
    pub const DEFAULT_PORT: u16 = 61453;
    pub const DEFAULT_MAX_CONNECTIONS: usize = 32;
    pub const DEFAULT_ACCEPT_POLL_MS: u64 = 50;
    pub const DEFAULT_DEDUPE_WINDOW_SECS: u64 = 60;
    pub const DEFAULT_MAIL_INTERVAL_SECS: u64 = 300;

    /// Load configuration: file contents (when given) merged over defaults,
    /// rooted at the process working directory.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                toml::from_str(&text).map_err(|e| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: e,
                })?
            }
            None => ConfigFile::default(),
        };
        let cwd = std::env::current_dir().map_err(ConfigError::WorkingDir)?;
        Self::from_config(file, &cwd)
    }

    /// Build an environment from parsed file contents and a base directory.
    pub fn from_config(file: ConfigFile, base: &Path) -> Result<Self, ConfigError> {
        let root_dir = normalize(base, &file.root_dir.unwrap_or_else(|| base.to_path_buf()));
        let dir = |configured: Option<PathBuf>, default: &str| -> PathBuf {
            normalize(
                &root_dir,
                &configured.unwrap_or_else(|| PathBuf::from(default)),
            )
        };

        let mut whitelist = Vec::new();
        for entry in file.whitelist.unwrap_or_default() {
            let ip: IpAddr = entry
                .parse()
                .map_err(|_| ConfigError::InvalidWhitelistEntry(entry.clone()))?;
            whitelist.push(ip);
        }

        Ok(Self {
            compiler_dir: dir(file.compiler_dir, "Compiler"),
            cache_dir: dir(file.cache_dir, "Cache"),
            temp_dir: dir(file.temp_dir, "Temp"),
            error_dir: dir(file.error_dir, "Error"),
            shader_dir: dir(file.shader_dir, "Shader"),
            root_dir,
            port: file.port.unwrap_or(Self::DEFAULT_PORT),
            max_connections: file
                .max_connections
                .unwrap_or(Self::DEFAULT_MAX_CONNECTIONS)
                .max(1),
            accept_poll: Duration::from_millis(
                file.accept_poll_ms.unwrap_or(Self::DEFAULT_ACCEPT_POLL_MS),
            ),
            caching: file.caching.unwrap_or(true),
            dedupe_window: Duration::from_secs(
                file.dedupe_window_secs
                    .unwrap_or(Self::DEFAULT_DEDUPE_WINDOW_SECS),
            ),
            mail: MailSettings {
                server: file.mail_server,
                interval: Duration::from_secs(
                    file.mail_interval_secs
                        .unwrap_or(Self::DEFAULT_MAIL_INTERVAL_SECS),
                ),
            },
            whitelist,
            platform_folders: file
                .platform_folders
                .unwrap_or_else(default_platform_folders),
        })
    }

    /// All-defaults environment rooted at `root`. Used by tests and by
    /// `check-config` when no file exists yet.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::from_config(ConfigFile::default(), &root)
            .expect("default configuration is always valid")
    }

    /// Create the directories the server writes into.
    pub fn ensure_directories(&self) -> io::Result<()> {
        for dir in [
            &self.compiler_dir,
            &self.cache_dir,
            &self.temp_dir,
            &self.error_dir,
            &self.shader_dir,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Shader-dump folder for a platform, when the platform is recognized.
    pub fn shader_dump_dir(&self, platform: &str) -> Option<PathBuf> {
        self.platform_folders
            .get(platform)
            .map(|folder| self.shader_dir.join(folder))
    }

    /// Whitelist check. An empty whitelist admits every peer.
    pub fn is_peer_allowed(&self, peer: IpAddr) -> bool {
        self.whitelist.is_empty() || self.whitelist.contains(&peer)
    }
}

/// Join relative paths onto `base` and collapse `.`/`..` components without
/// touching the filesystem.
fn normalize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn default_platform_folders() -> HashMap<String, String> {
    [
        ("DX9", "PC-D3D9"),
        ("DX11", "PC-D3D11"),
        ("DX12", "PC-D3D12"),
        ("GL4", "PC-GL4"),
        ("GLES3", "Mobile-GLES3"),
        ("VULKAN", "PC-Vulkan"),
        ("METAL", "Mac-Metal"),
        ("ORBIS", "Orbis"),
        ("DURANGO", "Durango"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
