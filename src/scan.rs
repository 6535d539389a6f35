//! Content discovery.
//!
//! Walks the content root, recognises content files by extension, and turns
//! each one into a [`ContentSource`]: raw text, validated front-matter, and
//! the output path and URL derived from its position in the tree.
//!
//! ## Directory Structure
//!
//! ```text
//! content/
//! ├── index.md            → index.html          URL /
//! ├── about.md            → about.html          URL /about.html
//! ├── _drafts/            (ignored: leading underscore)
//! └── guide/
//!     ├── index.md        → guide/index.html    URL /guide/
//!     ├── intro.md        → guide/intro.html    URL /guide/intro.html
//!     └── widgets.html    → guide/widgets.html  (templated component)
//! ```
//!
//! Output paths and URLs are pure functions of the relative input path, so
//! re-running discovery over an unchanged tree yields identical results.

use crate::error::PageError;
use crate::frontmatter::{self, Frontmatter};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];
const COMPONENT_EXTENSIONS: &[&str] = &["html", "jinja"];

/// How a content body is turned into HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContentKind {
    /// Markdown, converted with pulldown-cmark.
    Markdown,
    /// A template body rendered with the page context in scope.
    Component,
}

impl ContentKind {
    /// Classify a path by extension. `None` for non-content files.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        if MARKDOWN_EXTENSIONS.contains(&ext.as_str()) {
            Some(ContentKind::Markdown)
        } else if COMPONENT_EXTENSIONS.contains(&ext.as_str()) {
            Some(ContentKind::Component)
        } else {
            None
        }
    }
}

/// One content file, immutable for the rest of a build pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSource {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the content root.
    pub rel_path: PathBuf,
    pub kind: ContentKind,
    /// Body text with the front-matter block removed.
    pub body: String,
    pub frontmatter: Frontmatter,
    /// Output path relative to the output root.
    pub output_path: PathBuf,
    /// Root-relative URL, without the base path.
    pub url: String,
}

impl ContentSource {
    /// Build a source from raw file contents: extract, validate, derive paths.
    pub fn parse(
        path: PathBuf,
        rel_path: PathBuf,
        kind: ContentKind,
        raw: &str,
    ) -> Result<Self, PageError> {
        let extracted = frontmatter::extract(raw).map_err(|source| PageError::Frontmatter {
            path: rel_path.clone(),
            source,
        })?;
        let frontmatter =
            frontmatter::validate(extracted.frontmatter).map_err(|source| {
                PageError::Validation {
                    path: rel_path.clone(),
                    source,
                }
            })?;
        let output_path = output_path_for(&rel_path);
        let url = url_for(&output_path);
        Ok(Self {
            path,
            rel_path,
            kind,
            body: extracted.body,
            frontmatter,
            output_path,
            url,
        })
    }

    /// Directory containing this file, relative to the content root.
    pub fn rel_dir(&self) -> &Path {
        self.rel_path.parent().unwrap_or(Path::new(""))
    }

    /// Whether this is a directory index (`index.md`, `index.html`, …).
    pub fn is_index(&self) -> bool {
        self.rel_path.file_stem().is_some_and(|s| s == "index")
    }

    /// Navigation slug: file stem, or the directory name for index files.
    pub fn slug(&self) -> String {
        if self.is_index() {
            self.rel_dir()
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "index".to_string())
        } else {
            self.rel_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        }
    }
}

/// Same relative path with the extension changed to `.html`.
pub fn output_path_for(rel_path: &Path) -> PathBuf {
    rel_path.with_extension("html")
}

/// Root-relative URL for an output path, collapsing `index.html`.
///
/// - `index.html` → `/`
/// - `guide/index.html` → `/guide/`
/// - `guide/intro.html` → `/guide/intro.html`
pub fn url_for(output_path: &Path) -> String {
    let segments: Vec<String> = output_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    match segments.split_last() {
        Some((last, dirs)) if last == "index.html" => {
            if dirs.is_empty() {
                "/".to_string()
            } else {
                format!("/{}/", dirs.join("/"))
            }
        }
        _ => format!("/{}", segments.join("/")),
    }
}

/// A content file found on disk, not yet read.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub rel_path: PathBuf,
    pub kind: ContentKind,
}

/// Whether a path segment is skipped during discovery.
pub fn is_ignored_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

/// Enumerate content files under `root`, sorted by relative path.
pub fn discover(root: &Path) -> std::io::Result<Vec<DiscoveredFile>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_name(&e.file_name().to_string_lossy()));

    for entry in walker {
        let entry = entry.map_err(std::io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(kind) = ContentKind::from_path(entry.path()) else {
            continue;
        };
        let rel_path = entry
            .path()
            .strip_prefix(root)
            .map_err(std::io::Error::other)?
            .to_path_buf();
        files.push(DiscoveredFile {
            path: entry.path().to_path_buf(),
            rel_path,
            kind,
        });
    }

    files.sort();
    Ok(files)
}

/// Whether `path` is a content file `discover` would pick up.
pub fn is_content_path(root: &Path, path: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(root) else {
        return false;
    };
    ContentKind::from_path(path).is_some()
        && rel
            .components()
            .all(|c| !is_ignored_name(&c.as_os_str().to_string_lossy()))
}

/// Read and parse one discovered file.
///
/// Read failures are returned as the outer error (fatal to the pass);
/// front-matter problems as the inner one (fatal to this file only).
pub fn load(file: &DiscoveredFile) -> std::io::Result<Result<ContentSource, PageError>> {
    let raw = fs::read_to_string(&file.path)?;
    Ok(ContentSource::parse(
        file.path.clone(),
        file.rel_path.clone(),
        file.kind,
        &raw,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_helpers::write_file;
    use tempfile::TempDir;

    #[test]
    fn output_path_swaps_extension() {
        assert_eq!(
            output_path_for(Path::new("guide/intro.md")),
            Path::new("guide/intro.html")
        );
        assert_eq!(
            output_path_for(Path::new("widgets.html")),
            Path::new("widgets.html")
        );
    }

    #[test]
    fn url_collapses_index_files() {
        assert_eq!(url_for(Path::new("index.html")), "/");
        assert_eq!(url_for(Path::new("guide/index.html")), "/guide/");
        assert_eq!(url_for(Path::new("guide/intro.html")), "/guide/intro.html");
        assert_eq!(url_for(Path::new("a/b/index.html")), "/a/b/");
    }

    #[test]
    fn content_kind_by_extension() {
        assert_eq!(
            ContentKind::from_path(Path::new("a.md")),
            Some(ContentKind::Markdown)
        );
        assert_eq!(
            ContentKind::from_path(Path::new("a.MARKDOWN")),
            Some(ContentKind::Markdown)
        );
        assert_eq!(
            ContentKind::from_path(Path::new("a.html")),
            Some(ContentKind::Component)
        );
        assert_eq!(ContentKind::from_path(Path::new("a.png")), None);
        assert_eq!(ContentKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn parse_derives_paths_and_slug() {
        let src = ContentSource::parse(
            PathBuf::from("/site/content/guide/index.md"),
            PathBuf::from("guide/index.md"),
            ContentKind::Markdown,
            "---\ntitle: Guide\n---\nHello",
        )
        .unwrap();
        assert_eq!(src.output_path, Path::new("guide/index.html"));
        assert_eq!(src.url, "/guide/");
        assert_eq!(src.slug(), "guide");
        assert!(src.is_index());
        assert_eq!(src.rel_dir(), Path::new("guide"));
        assert_eq!(src.body, "Hello");
    }

    #[test]
    fn root_index_slug_is_index() {
        let src = ContentSource::parse(
            PathBuf::from("/c/index.md"),
            PathBuf::from("index.md"),
            ContentKind::Markdown,
            "---\ntitle: Home\n---\n",
        )
        .unwrap();
        assert_eq!(src.slug(), "index");
        assert_eq!(src.rel_dir(), Path::new(""));
    }

    #[test]
    fn parse_reports_validation_error_with_path() {
        let err = ContentSource::parse(
            PathBuf::from("/c/draft.md"),
            PathBuf::from("draft.md"),
            ContentKind::Markdown,
            "---\ndescription: no title\n---\n",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.path(), Path::new("draft.md"));
    }

    #[test]
    fn parse_reports_frontmatter_error() {
        let err = ContentSource::parse(
            PathBuf::from("/c/broken.md"),
            PathBuf::from("broken.md"),
            ContentKind::Markdown,
            "---\ntitle: Broken\n",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Frontmatter);
    }

    #[test]
    fn discover_finds_content_sorted_and_skips_ignored() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "zeta.md", "x");
        write_file(tmp.path(), "alpha.md", "x");
        write_file(tmp.path(), "guide/intro.md", "x");
        write_file(tmp.path(), "guide/widgets.html", "x");
        write_file(tmp.path(), "guide/photo.png", "x");
        write_file(tmp.path(), "_drafts/wip.md", "x");
        write_file(tmp.path(), ".hidden.md", "x");

        let files = discover(tmp.path()).unwrap();
        let rels: Vec<_> = files.iter().map(|f| f.rel_path.clone()).collect();
        assert_eq!(
            rels,
            vec![
                PathBuf::from("alpha.md"),
                PathBuf::from("guide/intro.md"),
                PathBuf::from("guide/widgets.html"),
                PathBuf::from("zeta.md"),
            ]
        );
        assert_eq!(files[2].kind, ContentKind::Component);
    }

    #[test]
    fn is_content_path_matches_discovery_rules() {
        let root = Path::new("/c");
        assert!(is_content_path(root, Path::new("/c/guide/intro.md")));
        assert!(!is_content_path(root, Path::new("/c/_drafts/wip.md")));
        assert!(!is_content_path(root, Path::new("/c/notes.txt")));
        assert!(!is_content_path(root, Path::new("/elsewhere/a.md")));
    }

    #[test]
    fn load_reads_and_parses() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a.md", "---\ntitle: A\n---\nbody");
        let files = discover(tmp.path()).unwrap();
        let src = load(&files[0]).unwrap().unwrap();
        assert_eq!(src.frontmatter.title, "A");
        assert_eq!(src.url, "/a.html");
    }
}
