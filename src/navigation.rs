//! Navigation model.
//!
//! Built once per pass from every valid [`ContentSource`], then shared
//! read-only by all renders. The stored model has no notion of "current
//! page": [`NavigationModel::view`] projects it for one page, marking the
//! item whose `href` equals that page's own.
//!
//! ## Sections
//!
//! A page's section is its explicit `section` front-matter if set, otherwise
//! its directory: `header` for the content root, the relative directory
//! path (`guide`, `guide/advanced`) below it.
//!
//! Each subdirectory's landing page (its index page, or failing that its
//! first page) is listed one level up, so top-level directories show in the
//! header menu:
//!
//! ```text
//! content/               header:  Home, Guide
//! ├── index.md  Home     guide:   Intro, Widgets
//! └── guide/
//!     ├── index.md  Guide
//!     ├── intro.md  Intro
//!     └── widgets.html  Widgets
//! ```
//!
//! Within a section: `order` ascending (ordered pages first), then title,
//! then relative path.

use crate::scan::ContentSource;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Section name for pages at the content root.
pub const HEADER_SECTION: &str = "header";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationItem {
    pub slug: String,
    pub href: String,
    pub title: String,
    #[serde(skip)]
    pub order: Option<i64>,
    #[serde(skip)]
    pub rel_path: PathBuf,
}

impl NavigationItem {
    fn sort_key(&self) -> (bool, Option<i64>, &str, &Path) {
        (
            self.order.is_none(),
            self.order,
            &self.title,
            &self.rel_path,
        )
    }
}

/// Whether `item` is the page being rendered.
pub fn is_current(item: &NavigationItem, current_href: &str) -> bool {
    item.href == current_href
}

/// `base_path` joined with a root-relative URL.
pub fn href(base_path: &str, url: &str) -> String {
    format!("{}{}", base_path, url.trim_start_matches('/'))
}

/// Section a directory's pages fall into when they set none explicitly.
pub fn directory_section(dir: &Path) -> String {
    if dir.as_os_str().is_empty() {
        HEADER_SECTION.to_string()
    } else {
        dir.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Named sections of ordered items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationModel {
    sections: BTreeMap<String, Vec<NavigationItem>>,
}

impl NavigationModel {
    /// Group and order every page that opts into navigation.
    pub fn build<'s>(
        sources: impl IntoIterator<Item = &'s ContentSource>,
        base_path: &str,
    ) -> Self {
        let listed: Vec<&ContentSource> = sources
            .into_iter()
            .filter(|s| s.frontmatter.nav)
            .collect();
        let landings = landing_pages(&listed);

        let mut sections: BTreeMap<String, Vec<NavigationItem>> = BTreeMap::new();
        for source in &listed {
            let key = match (&source.frontmatter.section, landings.get(&source.rel_path)) {
                (Some(explicit), _) => explicit.clone(),
                (None, Some(parent)) => directory_section(parent),
                (None, None) => directory_section(source.rel_dir()),
            };
            sections.entry(key).or_default().push(item_for(source, base_path));
        }
        for items in sections.values_mut() {
            items.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        }
        Self { sections }
    }

    pub fn section(&self, name: &str) -> &[NavigationItem] {
        self.sections.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn items(&self) -> impl Iterator<Item = &NavigationItem> {
        self.sections.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// The model as seen from the page at `current_href`.
    pub fn view(&self, current_href: &str) -> NavigationView {
        let sections = self
            .sections
            .iter()
            .map(|(name, items)| {
                let marked = items
                    .iter()
                    .map(|item| MarkedItem {
                        slug: item.slug.clone(),
                        href: item.href.clone(),
                        title: item.title.clone(),
                        is_current: is_current(item, current_href),
                    })
                    .collect();
                (name.clone(), marked)
            })
            .collect();
        NavigationView { sections }
    }
}

/// A navigation item with `is_current` resolved for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkedItem {
    pub slug: String,
    pub href: String,
    pub title: String,
    pub is_current: bool,
}

/// Per-page projection of the model; serialises as `section → [item]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NavigationView {
    pub sections: BTreeMap<String, Vec<MarkedItem>>,
}

impl NavigationView {
    pub fn section(&self, name: &str) -> &[MarkedItem] {
        self.sections.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn current_count(&self) -> usize {
        self.sections
            .values()
            .flatten()
            .filter(|i| i.is_current)
            .count()
    }
}

fn item_for(source: &ContentSource, base_path: &str) -> NavigationItem {
    NavigationItem {
        slug: source.slug(),
        href: href(base_path, &source.url),
        title: source.frontmatter.title.clone(),
        order: source.frontmatter.order,
        rel_path: source.rel_path.clone(),
    }
}

/// Landing page of each non-root directory → the parent directory it is
/// promoted into.
fn landing_pages(listed: &[&ContentSource]) -> HashMap<PathBuf, PathBuf> {
    let mut by_dir: BTreeMap<&Path, Vec<&ContentSource>> = BTreeMap::new();
    for &source in listed {
        if source.frontmatter.section.is_none() && !source.rel_dir().as_os_str().is_empty() {
            by_dir.entry(source.rel_dir()).or_default().push(source);
        }
    }

    let mut landings = HashMap::new();
    for (dir, pages) in by_dir {
        let landing = pages.iter().find(|s| s.is_index()).or_else(|| {
            pages.iter().min_by(|a, b| {
                let (a, b) = (item_for(a, ""), item_for(b, ""));
                a.sort_key().cmp(&b.sort_key())
            })
        });
        if let Some(page) = landing {
            let parent = dir.parent().unwrap_or(Path::new("")).to_path_buf();
            landings.insert(page.rel_path.clone(), parent);
        }
    }
    landings
}
