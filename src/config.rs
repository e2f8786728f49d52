//! Application configuration.
//!
//! Settings are layered with `figment`, later layers winning:
//!
//! 1. built-in defaults ([`Config::default`])
//! 2. a TOML file (`--config PATH`, or `config.toml` in the platform config
//!    directory)
//! 3. `LAKEDIFF_*` environment variables, nested keys split on `__`
//!    (`LAKEDIFF_GPU__ENABLED=true`)
//! 4. command-line flags, applied by [`Config::apply_analyze`] and
//!    [`Config::apply_copy`]
//!
//! ```toml
//! workers = 16
//! csv_batch_size = 500
//! file_types = ["epub", "pdf"]
//!
//! [gpu]
//! enabled = true
//! threshold = 52428800
//!
//! [copy]
//! conflict = "skip"
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::actions::ConflictPolicy;
use crate::cli::{AnalyzeArgs, CopyArgs};
use crate::hashing::cpu::DEFAULT_WORKERS;
use crate::hashing::gpu::{
    GpuSettings, DEFAULT_GPU_BATCH_SIZE, DEFAULT_GPU_CHUNK_SIZE, DEFAULT_GPU_THRESHOLD,
};
use crate::scanner::{WalkerConfig, DEFAULT_EXTENSIONS};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "LAKEDIFF_";

/// Default number of result rows buffered before a CSV flush.
pub const DEFAULT_CSV_BATCH_SIZE: usize = 100;

/// Accelerator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    /// Try to use an accelerator for full hashes.
    pub enabled: bool,
    /// Device ordinal.
    pub device: u32,
    /// Files at least this large (bytes) are full-hashed on the accelerator.
    pub threshold: u64,
    /// Files per accelerator batch.
    pub batch_size: usize,
    /// Upper bound (bytes) of one staged chunk.
    pub chunk_size: u64,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device: 0,
            threshold: DEFAULT_GPU_THRESHOLD,
            batch_size: DEFAULT_GPU_BATCH_SIZE,
            chunk_size: DEFAULT_GPU_CHUNK_SIZE,
        }
    }
}

/// Copy command settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// What to do when the target name exists.
    pub conflict: ConflictPolicy,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hash worker threads.
    pub workers: usize,
    /// Result rows per CSV flush.
    pub csv_batch_size: usize,
    /// Extensions to scan; empty scans every file.
    pub file_types: Vec<String>,
    /// Follow symbolic links while scanning.
    pub follow_symlinks: bool,
    /// Skip dot-files and dot-directories.
    pub skip_hidden: bool,
    /// Gitignore-style patterns excluded from both scans.
    pub ignore_patterns: Vec<String>,
    /// Accelerator settings.
    pub gpu: GpuConfig,
    /// Copy settings.
    pub copy: CopyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            csv_batch_size: DEFAULT_CSV_BATCH_SIZE,
            file_types: DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
            follow_symlinks: false,
            skip_hidden: false,
            ignore_patterns: Vec::new(),
            gpu: GpuConfig::default(),
            copy: CopyConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path` (or the default location when `None`) and the
    /// environment.
    ///
    /// Never fails: an unreadable or invalid source is logged and the
    /// built-in defaults are used instead.
    #[must_use]
    pub fn load_from_path(path: Option<&Path>) -> Self {
        let file = path.map(Path::to_path_buf).or_else(Self::default_path);
        Self::load_with_env(file.as_deref(), Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn load_with_env(file: Option<&Path>, env: Env) -> Self {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            if file.exists() {
                log::debug!("Loading configuration from {}", file.display());
                figment = figment.merge(Toml::file(file));
            } else {
                log::debug!("No configuration file at {}", file.display());
            }
        }

        match figment.merge(env).extract() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Invalid configuration, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// `config.toml` in the platform configuration directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lakediff").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Overlay `analyze` flags that were given on the command line.
    pub fn apply_analyze(&mut self, args: &AnalyzeArgs) {
        if let Some(workers) = args.workers {
            self.workers = workers;
        }
        if let Some(batch_size) = args.batch_size {
            self.csv_batch_size = batch_size;
        }
        if args.all_files {
            self.file_types.clear();
        } else if !args.file_types.is_empty() {
            self.file_types.clone_from(&args.file_types);
        }
        if args.follow_symlinks {
            self.follow_symlinks = true;
        }
        if args.skip_hidden {
            self.skip_hidden = true;
        }
        self.ignore_patterns.extend(args.ignore_patterns.iter().cloned());
        if args.use_gpu {
            self.gpu.enabled = true;
        }
        if let Some(device) = args.gpu_device {
            self.gpu.device = device;
        }
        if let Some(threshold) = args.gpu_threshold {
            self.gpu.threshold = threshold;
        }
    }

    /// Overlay `copy` flags that were given on the command line.
    pub fn apply_copy(&mut self, args: &CopyArgs) {
        if let Some(conflict) = args.conflict {
            self.copy.conflict = conflict;
        }
    }

    /// Discovery settings.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig::default()
            .with_extensions(&self.file_types)
            .with_ignore_patterns(self.ignore_patterns.clone())
            .with_follow_symlinks(self.follow_symlinks)
            .with_skip_hidden(self.skip_hidden)
    }

    /// Accelerator settings, or `None` when disabled.
    #[must_use]
    pub fn gpu_settings(&self) -> Option<GpuSettings> {
        self.gpu.enabled.then(|| {
            GpuSettings::default()
                .with_device_id(self.gpu.device)
                .with_batch_size(self.gpu.batch_size)
                .with_chunk_size(self.gpu.chunk_size)
        })
    }
}
