//! Site configuration module.
//!
//! Handles loading and validating `site.toml`, and turning it into the
//! read-only [`BuildContext`] every pipeline stage receives.
//!
//! ## Config File Location
//!
//! `site.toml` lives in the project root, next to the directories it names:
//!
//! ```text
//! my-site/
//! ├── site.toml
//! ├── content/      # articles_dir
//! ├── layouts/      # layout_dir
//! ├── assets/       # assets_dir
//! └── _site/        # output_dir (generated)
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! articles_dir = "content"
//! output_dir = "_site"
//! layout_dir = "layouts"
//! assets_dir = "assets"
//! base_path = "/"
//!
//! [site]
//! name = "Folio"
//! url = ""                 # Canonical origin, e.g. "https://example.com"
//! description = ""
//! stylesheets = []         # Logical asset names linked from every page
//! # favicon = "favicon.svg"
//!
//! [layouts]
//! mode = "override"        # or "nest"
//!
//! [processing]
//! max_processes = 4        # Max parallel render workers (omit for auto = CPU cores)
//!
//! [dev]
//! debounce_ms = 300
//! ```
//!
//! Config files are sparse; unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the config file looked up in the project root.
pub const CONFIG_FILENAME: &str = "site.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Project configuration loaded from `site.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Content root, relative to the project root.
    pub articles_dir: String,
    /// Output root, relative to the project root.
    pub output_dir: String,
    /// Layout root, relative to the project root.
    pub layout_dir: String,
    /// Static asset root, relative to the project root.
    pub assets_dir: String,
    /// URL prefix every generated link starts with.
    pub base_path: String,
    /// Site-wide metadata used by the outer document template.
    pub site: SiteMetadata,
    pub layouts: LayoutsConfig,
    pub processing: ProcessingConfig,
    pub dev: DevConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            articles_dir: "content".to_string(),
            output_dir: "_site".to_string(),
            layout_dir: "layouts".to_string(),
            assets_dir: "assets".to_string(),
            base_path: "/".to_string(),
            site: SiteMetadata::default(),
            layouts: LayoutsConfig::default(),
            processing: ProcessingConfig::default(),
            dev: DevConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "base_path must start with '/'".into(),
            ));
        }
        if self.site.name.trim().is_empty() {
            return Err(ConfigError::Validation("site.name must not be empty".into()));
        }
        if self.dev.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "dev.debounce_ms must be greater than zero".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        for (key, dir) in [
            ("articles_dir", &self.articles_dir),
            ("output_dir", &self.output_dir),
            ("layout_dir", &self.layout_dir),
            ("assets_dir", &self.assets_dir),
        ] {
            if dir.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        Ok(())
    }
}

/// Site-wide metadata (`[site]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteMetadata {
    /// Site name, used as the `<title>` prefix.
    pub name: String,
    /// Canonical origin without trailing slash. Empty disables canonical links.
    pub url: String,
    /// Fallback meta description for pages without their own.
    pub description: String,
    /// Logical asset names linked as stylesheets from every page.
    pub stylesheets: Vec<String>,
    /// Logical asset name of the favicon.
    pub favicon: Option<String>,
}

impl Default for SiteMetadata {
    fn default() -> Self {
        Self {
            name: "Folio".to_string(),
            url: String::new(),
            description: String::new(),
            stylesheets: Vec::new(),
            favicon: None,
        }
    }
}

/// How per-directory layouts combine along a content file's ancestry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    /// The nearest directory's layout is used alone.
    #[default]
    Override,
    /// The nearest layout is wrapped by every ancestor's `default` layout.
    Nest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutsConfig {
    pub mode: LayoutMode,
}

/// Parallel rendering settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel render workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Development-mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DevConfig {
    /// Quiet period after the last file event before a rebuild starts.
    pub debounce_ms: u64,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Normalize a base path to `/` or `/prefix/`.
pub fn normalize_base_path(base: &str) -> String {
    let trimmed = base.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// Load `site.toml` from the project root.
///
/// A missing file yields the defaults. User values are parsed sparse on top
/// of the defaults and the result is validated.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    load_config_file(&root.join(CONFIG_FILENAME))
}

/// Load a config from an explicit file path. Missing file yields defaults.
pub fn load_config_file(path: &Path) -> Result<SiteConfig, ConfigError> {
    let config = if path.exists() {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)?
    } else {
        SiteConfig::default()
    };
    config.validate()?;
    Ok(config)
}

/// Per-pass, read-only configuration handed to every pipeline stage.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub content_root: PathBuf,
    pub output_root: PathBuf,
    pub layout_root: PathBuf,
    pub asset_root: PathBuf,
    /// Always `/` or `/prefix/`.
    pub base_path: String,
    pub site: SiteMetadata,
    pub layout_mode: LayoutMode,
    /// Development mode: cache-busting asset URLs, inline error pages, watching.
    pub dev: bool,
    pub threads: usize,
    pub debounce_ms: u64,
}

impl BuildContext {
    /// Resolve a [`SiteConfig`] against the project root.
    pub fn from_config(config: &SiteConfig, root: &Path, dev: bool) -> Self {
        Self {
            content_root: root.join(&config.articles_dir),
            output_root: root.join(&config.output_dir),
            layout_root: root.join(&config.layout_dir),
            asset_root: root.join(&config.assets_dir),
            base_path: normalize_base_path(&config.base_path),
            site: config.site.clone(),
            layout_mode: config.layouts.mode,
            dev,
            threads: effective_threads(&config.processing),
            debounce_ms: config.dev.debounce_ms,
        }
    }

    /// Prefix a root-relative URL (`/guide/`) with the base path.
    pub fn href(&self, url: &str) -> String {
        format!("{}{}", self.base_path, url.trim_start_matches('/'))
    }
}

/// Returns a fully-commented stock `site.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Folio Configuration
# ===================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Directories, relative to the directory holding this file.
articles_dir = "content"
output_dir = "_site"
layout_dir = "layouts"
assets_dir = "assets"

# URL prefix for every generated link, e.g. "/docs/" when the site is
# served from a sub-path.
base_path = "/"

# ---------------------------------------------------------------------------
# Site metadata
# ---------------------------------------------------------------------------
[site]
# Prefix of every page <title>: "{name} | {page title}".
name = "Folio"

# Canonical origin without trailing slash. Leave empty to omit canonical links.
url = ""

# Meta description for pages that don't set their own.
description = ""

# Assets (names relative to assets_dir) linked as stylesheets on every page.
stylesheets = []

# Asset used as the favicon.
# favicon = "favicon.svg"

# ---------------------------------------------------------------------------
# Layouts
# ---------------------------------------------------------------------------
[layouts]
# "override": the nearest directory's layout is used on its own.
# "nest":     the nearest layout is wrapped by each ancestor's default.html.
mode = "override"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel render workers for production builds.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Development mode
# ---------------------------------------------------------------------------
[dev]
# Quiet period (milliseconds) after the last file change before rebuilding.
debounce_ms = 300
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_directories() {
        let config = SiteConfig::default();
        assert_eq!(config.articles_dir, "content");
        assert_eq!(config.output_dir, "_site");
        assert_eq!(config.layout_dir, "layouts");
        assert_eq!(config.assets_dir, "assets");
        assert_eq!(config.base_path, "/");
        assert_eq!(config.layouts.mode, LayoutMode::Override);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
base_path = "/docs"

[site]
name = "Handbook"
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.base_path, "/docs");
        assert_eq!(config.site.name, "Handbook");
        // Defaults preserved
        assert_eq!(config.output_dir, "_site");
        assert!(config.site.stylesheets.is_empty());
        assert_eq!(config.dev.debounce_ms, 300);
    }

    #[test]
    fn parse_layout_mode() {
        let config: SiteConfig = toml::from_str("[layouts]\nmode = \"nest\"\n").unwrap();
        assert_eq!(config.layouts.mode, LayoutMode::Nest);
    }

    #[test]
    fn unknown_keys_rejected() {
        let result: Result<SiteConfig, _> = toml::from_str("[site]\ntitle = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_relative_base_path() {
        let config = SiteConfig {
            base_path: "docs/".into(),
            ..SiteConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_zero_debounce() {
        let mut config = SiteConfig::default();
        config.dev.debounce_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn base_path_normalization() {
        assert_eq!(normalize_base_path("/"), "/");
        assert_eq!(normalize_base_path(""), "/");
        assert_eq!(normalize_base_path("/docs"), "/docs/");
        assert_eq!(normalize_base_path("/docs/"), "/docs/");
        assert_eq!(normalize_base_path("/a/b"), "/a/b/");
    }

    #[test]
    fn effective_threads_caps_at_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(cores + 64),
        };
        assert_eq!(effective_threads(&config), cores);
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.site.name, "Folio");
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            "output_dir = \"public\"\n[site]\nname = \"Notes\"\nstylesheets = [\"style.css\"]\n",
        )
        .unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.output_dir, "public");
        assert_eq!(config.site.name, "Notes");
        assert_eq!(config.site.stylesheets, vec!["style.css".to_string()]);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "[site\nname = ").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let config: SiteConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = SiteConfig::default();
        assert_eq!(config.articles_dir, defaults.articles_dir);
        assert_eq!(config.site, defaults.site);
        assert_eq!(config.layouts.mode, defaults.layouts.mode);
        assert_eq!(config.dev.debounce_ms, defaults.dev.debounce_ms);
        config.validate().unwrap();
    }

    #[test]
    fn build_context_resolves_paths_against_root() {
        let root = Path::new("/project");
        let config = SiteConfig {
            base_path: "/docs".into(),
            ..SiteConfig::default()
        };
        let ctx = BuildContext::from_config(&config, root, true);
        assert_eq!(ctx.content_root, Path::new("/project/content"));
        assert_eq!(ctx.output_root, Path::new("/project/_site"));
        assert_eq!(ctx.base_path, "/docs/");
        assert!(ctx.dev);
        assert_eq!(ctx.href("/guide/intro.html"), "/docs/guide/intro.html");
        assert_eq!(ctx.href("/"), "/docs/");
    }
}
