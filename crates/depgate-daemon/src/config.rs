//! Configuration for depgated

use depgate_core::{ApiConfig, EngineConfig, HeartbeatConfig, PollingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Approval service connection
    #[serde(default)]
    pub api: ApiConfig,

    /// Poll task timing
    #[serde(default)]
    pub polling: PollingConfig,

    /// Org-wide alert pull
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Workspace being watched
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Manifest watcher
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Workspace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace root directory
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Project name reported to the approval service; defaults to the root
    /// directory name
    #[serde(default)]
    pub project_name: Option<String>,

    /// Repository URL reported alongside the project
    #[serde(default)]
    pub repository: Option<String>,

    /// Key for persisted state; defaults to the canonical root path
    #[serde(default)]
    pub workspace_id: Option<String>,

    /// Directory holding persisted state
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            project_name: None,
            repository: None,
            workspace_id: None,
            state_dir: None,
        }
    }
}

/// Manifest watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Milliseconds between workspace scans
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval(),
        }
    }
}

impl WatcherConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms.max(100))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_scan_interval() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `DEPGATE_` environment variables (`DEPGATE_API__TOKEN`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DEPGATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// The engine's view of this configuration.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            api: self.api.clone(),
            polling: self.polling.clone(),
            heartbeat: self.heartbeat.clone(),
        }
    }
}

impl WorkspaceConfig {
    /// Canonical root, or the configured path when it cannot be resolved.
    pub fn resolved_root(&self) -> PathBuf {
        std::fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone())
    }

    pub fn project_name(&self, root: &Path) -> String {
        self.project_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| {
                root.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "workspace".to_string())
    }

    pub fn workspace_id(&self, root: &Path) -> String {
        self.workspace_id
            .clone()
            .unwrap_or_else(|| root.display().to_string())
    }

    /// Configured state directory, else `<data dir>/depgate`.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|dir| dir.join("depgate"))
                .unwrap_or_else(|| PathBuf::from(".depgate"))
        })
    }
}
