//! Configuration for coursegate paths and server settings.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (COURSEGATE_HOME, COURSEGATE_CONTENT_ROOT, ...)
//! 2. Config file (.coursegate/config.yaml)
//! 3. Defaults (~/.coursegate)
//!
//! Config file discovery:
//! - Searches current directory and parents for .coursegate/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<std::result::Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Registry state directory (relative to config file)
    pub home: Option<String>,
    /// Content store root (relative to config file)
    pub content_root: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    pub bind: Option<String>,
    pub public_url: Option<String>,
    pub purchase_url_template: Option<String>,
    pub admin_token: Option<String>,
    pub oracle_url: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to coursegate home (registry state)
    pub home: PathBuf,
    /// Absolute path to the content store root
    pub content_root: PathBuf,
    /// Listen address for `coursegate serve`
    pub bind: String,
    /// Public base URL used in redirect targets
    pub public_url: String,
    /// Purchase-page URL template with a `{group}` placeholder
    pub purchase_url_template: Option<String>,
    /// Shared admin bearer token; unset disables admin endpoints
    pub admin_token: Option<String>,
    /// Entitlement oracle endpoint; unset means deny all non-admins
    pub oracle_url: Option<String>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Path to the course registry database.
    pub fn registry_db(&self) -> PathBuf {
        self.home.join("registry.db")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".coursegate").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn env_or(name: &str, fallback: Option<String>) -> Option<String> {
    std::env::var(name).ok().or(fallback)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".coursegate");

    // Check for config file
    let config_file = find_config_file();

    let (paths, server) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;
        (config.paths, config.server.unwrap_or_default())
    } else {
        (PathsConfig::default(), ServerSection::default())
    };

    // Base directory is the parent of .coursegate/ (i.e., grandparent of
    // config.yaml)
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let home = if let Ok(env_home) = std::env::var("COURSEGATE_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = paths.home {
        resolve_path(&base_dir, home_path)
    } else {
        default_home
    };

    let content_root = if let Ok(env_root) = std::env::var("COURSEGATE_CONTENT_ROOT") {
        PathBuf::from(env_root)
    } else if let Some(ref root_path) = paths.content_root {
        resolve_path(&base_dir, root_path)
    } else {
        home.join("content")
    };

    Ok(ResolvedConfig {
        home,
        content_root,
        bind: env_or("COURSEGATE_BIND", server.bind)
            .unwrap_or_else(|| "127.0.0.1:8080".to_string()),
        public_url: env_or("COURSEGATE_PUBLIC_URL", server.public_url)
            .unwrap_or_else(|| "http://127.0.0.1:8080".to_string()),
        purchase_url_template: env_or("COURSEGATE_PURCHASE_URL", server.purchase_url_template),
        admin_token: env_or("COURSEGATE_ADMIN_TOKEN", server.admin_token),
        oracle_url: env_or("COURSEGATE_ORACLE_URL", server.oracle_url),
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
