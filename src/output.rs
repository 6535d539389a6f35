//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Pages are listed by title first, with the file they came from and the
//! file they became as secondary context. Errors name their kind and the
//! offending content file, then the message on an indented line.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Pages
//! 001 Home → index.html
//!     Source: index.md
//! 002 Intro → guide/intro.html
//!     Source: guide/intro.md
//!
//! Errors
//! 001 ValidationError draft.md
//!     missing required field `title`
//!
//! Built 2 pages, 3 assets (1 failed)
//! ```
//!
//! ## Check
//!
//! ```text
//! Navigation
//! header
//!     001 Home → /
//!     002 Guide → /guide/
//!
//! Checked 4 pages, 0 errors
//! ```
//!
//! ## Rebuild (dev mode)
//!
//! ```text
//! Navigation changed
//! Rendered guide/intro.html
//! Removed old.html
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::error::PageError;
use crate::navigation::NavigationModel;
use crate::pipeline::{BuildReport, CheckReport, RebuildReport};
use crate::scan::ContentSource;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

/// `Errors` block: one header line per error, message indented below.
fn format_errors(errors: &[PageError]) -> Vec<String> {
    let mut lines = Vec::new();
    if errors.is_empty() {
        return lines;
    }
    lines.push("Errors".to_string());
    for (i, err) in errors.iter().enumerate() {
        lines.push(format!(
            "{} {} {}",
            format_index(i + 1),
            err.kind(),
            err.path().display()
        ));
        let message = match err.to_string().split_once(": ") {
            Some((_, rest)) => rest.to_string(),
            None => err.to_string(),
        };
        lines.push(format!("{}{}", indent(1), message));
    }
    lines
}

// ============================================================================
// Build
// ============================================================================

/// Format a full build report.
///
/// `sources` supplies titles and source paths for the written pages.
pub fn format_build_output(
    report: &BuildReport,
    sources: &BTreeMap<PathBuf, ContentSource>,
) -> Vec<String> {
    let by_output: HashMap<&Path, &ContentSource> = sources
        .values()
        .map(|s| (s.output_path.as_path(), s))
        .collect();

    let mut lines = Vec::new();
    if !report.written.is_empty() {
        lines.push("Pages".to_string());
        for (i, output) in report.written.iter().enumerate() {
            match by_output.get(output.as_path()) {
                Some(source) => {
                    lines.push(format!(
                        "{} {} \u{2192} {}",
                        format_index(i + 1),
                        source.frontmatter.title,
                        output.display()
                    ));
                    lines.push(format!(
                        "{}Source: {}",
                        indent(1),
                        source.rel_path.display()
                    ));
                }
                None => lines.push(format!("{} {}", format_index(i + 1), output.display())),
            }
        }
    }

    let errors = format_errors(&report.errors);
    if !errors.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.extend(errors);
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    let mut summary = format!(
        "Built {}, {}",
        plural(report.written.len(), "page"),
        plural(report.assets, "asset")
    );
    if !report.errors.is_empty() {
        summary.push_str(&format!(" ({} failed)", report.errors.len()));
    }
    if report.cancelled {
        summary.push_str(" [cancelled]");
    }
    lines.push(summary);
    lines
}

/// Print build output to stdout.
pub fn print_build_output(report: &BuildReport, sources: &BTreeMap<PathBuf, ContentSource>) {
    for line in format_build_output(report, sources) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Navigation sections with their ordered items.
pub fn format_navigation(navigation: &NavigationModel) -> Vec<String> {
    let mut lines = Vec::new();
    if navigation.is_empty() {
        return lines;
    }
    lines.push("Navigation".to_string());
    for name in navigation.section_names() {
        lines.push(name.to_string());
        for (i, item) in navigation.section(name).iter().enumerate() {
            lines.push(format!(
                "{}{} {} \u{2192} {}",
                indent(1),
                format_index(i + 1),
                item.title,
                item.href
            ));
        }
    }
    lines
}

pub fn format_check_output(report: &CheckReport, navigation: &NavigationModel) -> Vec<String> {
    let mut lines = format_navigation(navigation);
    let errors = format_errors(&report.errors);
    if !errors.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.extend(errors);
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Checked {}, {}",
        plural(report.pages, "page"),
        plural(report.errors.len(), "error")
    ));
    lines
}

pub fn print_check_output(report: &CheckReport, navigation: &NavigationModel) {
    for line in format_check_output(report, navigation) {
        println!("{}", line);
    }
}

// ============================================================================
// Rebuild
// ============================================================================

/// Format an incremental rebuild. Paths are shown relative to the output
/// root; asset paths relative to the assets directory.
pub fn format_rebuild_report(report: &RebuildReport) -> Vec<String> {
    let mut lines = Vec::new();
    if report.full {
        lines.push(format!(
            "Full rebuild: {}",
            plural(report.rendered.len(), "page")
        ));
    } else {
        if report.navigation_changed {
            lines.push("Navigation changed".to_string());
        }
        for template in &report.templates_recompiled {
            lines.push(format!("Recompiled {}", template));
        }
        for asset in &report.assets_refreshed {
            lines.push(format!("Refreshed {}", asset.display()));
        }
        for page in &report.rendered {
            lines.push(format!("Rendered {}", page.display()));
        }
    }
    for page in &report.removed {
        lines.push(format!("Removed {}", page.display()));
    }
    for message in &report.layout_errors {
        lines.push(format!("Layout error: {}", message));
    }
    lines.extend(format_errors(&report.errors));
    lines
}

pub fn print_rebuild_report(report: &RebuildReport) {
    for line in format_rebuild_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::ValidationError;
    use crate::scan::ContentKind;

    fn source(rel: &str, title: &str) -> ContentSource {
        ContentSource::parse(
            PathBuf::from("/c").join(rel),
            PathBuf::from(rel),
            ContentKind::Markdown,
            &format!("---\ntitle: {title}\n---\n"),
        )
        .unwrap()
    }

    fn sources(list: &[ContentSource]) -> BTreeMap<PathBuf, ContentSource> {
        list.iter().map(|s| (s.rel_path.clone(), s.clone())).collect()
    }

    fn validation_error(path: &str) -> PageError {
        PageError::Validation {
            path: PathBuf::from(path),
            source: ValidationError::MissingTitle,
        }
    }

    #[test]
    fn format_index_pads_to_three_digits() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(100), "100");
    }

    #[test]
    fn build_output_lists_pages_then_summary() {
        let srcs = sources(&[source("index.md", "Home"), source("guide/intro.md", "Intro")]);
        let report = BuildReport {
            written: vec![PathBuf::from("index.html"), PathBuf::from("guide/intro.html")],
            assets: 2,
            ..BuildReport::default()
        };
        let lines = format_build_output(&report, &srcs);
        assert_eq!(
            lines,
            vec![
                "Pages",
                "001 Home \u{2192} index.html",
                "    Source: index.md",
                "002 Intro \u{2192} guide/intro.html",
                "    Source: guide/intro.md",
                "",
                "Built 2 pages, 2 assets",
            ]
        );
    }

    #[test]
    fn build_output_reports_errors_with_kind_and_path() {
        let srcs = sources(&[source("index.md", "Home")]);
        let report = BuildReport {
            written: vec![PathBuf::from("index.html")],
            errors: vec![validation_error("draft.md")],
            assets: 1,
            ..BuildReport::default()
        };
        let lines = format_build_output(&report, &srcs);
        assert!(lines.contains(&"Errors".to_string()));
        assert!(lines.contains(&"001 ValidationError draft.md".to_string()));
        assert!(lines.contains(&"    missing required field `title`".to_string()));
        assert_eq!(lines.last().unwrap(), "Built 1 page, 1 asset (1 failed)");
    }

    #[test]
    fn check_output_shows_navigation_sections() {
        let srcs = [source("index.md", "Home"), source("about.md", "About")];
        let nav = NavigationModel::build(&srcs, "/");
        let report = CheckReport {
            pages: 2,
            errors: Vec::new(),
        };
        let lines = format_check_output(&report, &nav);
        assert_eq!(
            lines,
            vec![
                "Navigation",
                "header",
                "    001 About \u{2192} /about.html",
                "    002 Home \u{2192} /",
                "",
                "Checked 2 pages, 0 errors",
            ]
        );
    }

    #[test]
    fn rebuild_report_lists_changes() {
        let report = RebuildReport {
            rendered: vec![PathBuf::from("guide/intro.html")],
            removed: vec![PathBuf::from("old.html")],
            navigation_changed: true,
            ..RebuildReport::default()
        };
        assert_eq!(
            format_rebuild_report(&report),
            vec![
                "Navigation changed",
                "Rendered guide/intro.html",
                "Removed old.html",
            ]
        );
    }

    #[test]
    fn full_rebuild_is_summarised() {
        let report = RebuildReport {
            rendered: vec![PathBuf::from("index.html")],
            full: true,
            ..RebuildReport::default()
        };
        assert_eq!(format_rebuild_report(&report), vec!["Full rebuild: 1 page"]);
    }
}
