//! Configuration file support.
//!
//! Two locations are read:
//! - Global: `<config dir>/runway/config.toml` - user-wide defaults
//! - Project: `.runway/config.toml` - project-specific overrides
//!
//! Project config takes precedence over global config.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default JavaScript package manager for npm-based guest toolchains.
pub const DEFAULT_JS_TOOLCHAIN: &str = "npm";

/// Default remote build service.
pub const DEFAULT_REMOTE_ENDPOINT: &str = "http://localhost:8082";

/// Default delay between remote build status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default Bindle registry.
pub const DEFAULT_REGISTRY_URL: &str = "http://127.0.0.1:8080/v1";

/// Default Kubernetes namespace for deployments.
pub const DEFAULT_NAMESPACE: &str = "runway";

/// runway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Native toolchain overrides
    pub toolchain: ToolchainConfig,

    /// Remote build service settings
    pub remote: RemoteConfig,

    /// Package registry settings
    pub registry: RegistryConfig,

    /// Deployment settings
    pub deploy: DeployConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Package manager used by npm-based toolchains (npm, yarn, pnpm)
    pub js_toolchain: Option<String>,

    /// Tag of the builder images used by the Docker toolchain
    pub builder_tag: Option<String>,
}

/// Per-language native command overrides.
///
/// ```toml
/// [toolchain.commands]
/// rust = ["cargo build --target wasm32-wasip1 --lib --release", "cp ..."]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub commands: HashMap<String, Vec<String>>,
}

/// Remote build service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the build service
    pub endpoint: Option<String>,

    /// Seconds between status checks
    pub poll_interval_secs: Option<u64>,
}

/// Package registry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Bindle server API root
    pub url: Option<String>,
}

/// Deployment configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Kubernetes namespace
    pub namespace: Option<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::io("read config", path, e))?;

        Ok(toml::from_str(&contents)?)
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.js_toolchain.is_some() {
            self.build.js_toolchain = other.build.js_toolchain;
        }
        if other.build.builder_tag.is_some() {
            self.build.builder_tag = other.build.builder_tag;
        }

        // Overrides are per language; the other file only replaces the
        // languages it names.
        self.toolchain.commands.extend(other.toolchain.commands);

        if other.remote.endpoint.is_some() {
            self.remote.endpoint = other.remote.endpoint;
        }
        if other.remote.poll_interval_secs.is_some() {
            self.remote.poll_interval_secs = other.remote.poll_interval_secs;
        }

        if other.registry.url.is_some() {
            self.registry.url = other.registry.url;
        }

        if other.deploy.namespace.is_some() {
            self.deploy.namespace = other.deploy.namespace;
        }
    }

    /// Package manager for npm-based toolchains.
    pub fn js_toolchain(&self) -> &str {
        self.build
            .js_toolchain
            .as_deref()
            .unwrap_or(DEFAULT_JS_TOOLCHAIN)
    }

    /// Builder image tag, defaulting to this tool's version.
    pub fn builder_tag(&self) -> String {
        self.build
            .builder_tag
            .clone()
            .unwrap_or_else(|| format!("v{}", env!("CARGO_PKG_VERSION")))
    }

    /// Remote build service base URL.
    pub fn remote_endpoint(&self) -> &str {
        self.remote
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_REMOTE_ENDPOINT)
    }

    /// Delay between remote status checks, never under one second.
    pub fn poll_interval(&self) -> Duration {
        self.remote
            .poll_interval_secs
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    /// Bindle registry API root.
    pub fn registry_url(&self) -> &str {
        self.registry.url.as_deref().unwrap_or(DEFAULT_REGISTRY_URL)
    }

    /// Kubernetes namespace.
    pub fn namespace(&self) -> &str {
        self.deploy.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.runway/config.toml)
/// 2. Global config
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path));
    }

    config.merge(Config::load_or_default(project_path));

    config
}

/// Global configuration file path.
pub fn global_config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "runway", "runway").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Project configuration file path.
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".runway").join("config.toml")
}
