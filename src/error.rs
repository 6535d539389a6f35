//! Error taxonomy shared by the pipeline stages.
//!
//! Two levels:
//!
//! - [`PageError`] is fatal to one content file. The orchestrator catches it
//!   at the per-file boundary, records it, and moves on to the next file.
//! - [`BuildError`] is fatal to the whole pass (missing roots, nothing to
//!   build, write failures).

use crate::assets::AssetError;
use crate::config::ConfigError;
use crate::frontmatter::{FrontmatterError, ValidationError};
use crate::layout::LayoutResolutionError;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Machine-distinguishable kind of a per-file failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    Frontmatter,
    Validation,
    LayoutResolution,
    Render,
    AssetNotFound,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Frontmatter => "FrontmatterError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::LayoutResolution => "LayoutResolutionError",
            ErrorKind::Render => "RenderError",
            ErrorKind::AssetNotFound => "AssetNotFoundError",
            ErrorKind::Io => "IOError",
        };
        f.write_str(name)
    }
}

/// A failure confined to one content file. `path` is relative to the
/// content root.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("{}: {source}", .path.display())]
    Frontmatter {
        path: PathBuf,
        #[source]
        source: FrontmatterError,
    },
    #[error("{}: {source}", .path.display())]
    Validation {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },
    #[error("{}: {source}", .path.display())]
    LayoutResolution {
        path: PathBuf,
        #[source]
        source: LayoutResolutionError,
    },
    #[error("{}: render failed in `{template}`: {message}", .path.display())]
    Render {
        path: PathBuf,
        template: String,
        message: String,
    },
    #[error("{}: unknown asset `{name}`", .path.display())]
    AssetNotFound { path: PathBuf, name: String },
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PageError::Frontmatter { .. } => ErrorKind::Frontmatter,
            PageError::Validation { .. } => ErrorKind::Validation,
            PageError::LayoutResolution { .. } => ErrorKind::LayoutResolution,
            PageError::Render { .. } => ErrorKind::Render,
            PageError::AssetNotFound { .. } => ErrorKind::AssetNotFound,
            PageError::Io { .. } => ErrorKind::Io,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            PageError::Frontmatter { path, .. }
            | PageError::Validation { path, .. }
            | PageError::LayoutResolution { path, .. }
            | PageError::Render { path, .. }
            | PageError::AssetNotFound { path, .. }
            | PageError::Io { path, .. } => path,
        }
    }
}

/// A failure that aborts the whole build pass.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{what} directory not found: {}", .path.display())]
    MissingRoot { what: &'static str, path: PathBuf },
    #[error("no content files found under {}", .0.display())]
    NoContent(PathBuf),
    #[error("layout root {} does not define `default.html`", .0.display())]
    MissingRootLayout(PathBuf),
    #[error("layout template {}: {source}", .path.display())]
    Layout {
        path: PathBuf,
        #[source]
        source: minijinja::Error,
    },
    #[error("asset pipeline: {0}")]
    Asset(#[from] AssetError),
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("file watcher: {0}")]
    Watch(#[from] notify::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("no pages were written ({} failed)", .errors.len())]
    NoPagesWritten { errors: Vec<PageError> },
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_error_reports_kind_and_path() {
        let err = PageError::Validation {
            path: PathBuf::from("guide/intro.md"),
            source: ValidationError::MissingTitle,
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.path(), Path::new("guide/intro.md"));
        assert_eq!(
            err.to_string(),
            "guide/intro.md: missing required field `title`"
        );
    }

    #[test]
    fn error_kind_display_uses_taxonomy_names() {
        assert_eq!(ErrorKind::AssetNotFound.to_string(), "AssetNotFoundError");
        assert_eq!(ErrorKind::Io.to_string(), "IOError");
    }
}
