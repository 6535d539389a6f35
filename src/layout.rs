//! Directory-scoped layouts.
//!
//! The layout root mirrors the content tree. Each `*.html` file directly in
//! a layout directory defines a *variant* of that directory's layout, named
//! by its file stem; `default.html` is the variant used unless a page's
//! front-matter asks for another one (`layout: home`).
//!
//! ```text
//! layouts/
//! ├── default.html          ← every page, unless overridden below
//! ├── home.html             ← pages with `layout: home`
//! ├── _partials/nav.html    ← partial: include-only, never selected
//! └── guide/
//!     └── default.html      ← every page under content/guide/
//! ```
//!
//! ## Resolution
//!
//! For a content file in directory `D`, the resolver walks from `D` up to
//! the root and collects every directory that defines at least one variant.
//! In [`LayoutMode::Override`] the nearest one wins outright; in
//! [`LayoutMode::Nest`] its layout is additionally wrapped by each
//! ancestor's `default.html`. The walk is memoised per directory, so sibling
//! files resolve in O(1) after the first.
//!
//! ## Compilation
//!
//! All templates are compiled once into a single `minijinja` environment.
//! In development mode [`LayoutStore::reload`] recompiles only the changed
//! file and bumps a generation counter.

use crate::config::LayoutMode;
use crate::error::BuildError;
use crate::scan::is_ignored_name;
use minijinja::{Environment, Value, context};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Variant used when front-matter names none.
pub const DEFAULT_VARIANT: &str = "default";

const LAYOUT_EXTENSION: &str = "html";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutResolutionError {
    #[error("no layout defined for `{}` or any parent directory", .dir.display())]
    NoLayout { dir: PathBuf },
    #[error("layout `{variant}` is not defined in layout directory `{}`", .dir.display())]
    UnknownVariant { dir: PathBuf, variant: String },
}

/// One layout variant bound to a directory scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutDefinition {
    /// Defining directory, relative to the layout root.
    pub dir: PathBuf,
    pub variant: String,
    /// Template name in the environment (`guide/default.html`).
    pub template: String,
}

/// Values a layout template can see, apart from the wrapped markup.
///
/// The layout contract is `(article_html, context) -> html`; the same
/// context is reused for every stage of a nested chain.
#[derive(Debug, Clone)]
pub struct LayoutContext {
    pub title: String,
    pub description: Option<String>,
    /// Section name → items, with `is_current` resolved for this page.
    pub navigation: Value,
    /// Items of the section this page belongs to.
    pub sidebar: Value,
    pub base_path: String,
    /// `asset(name) -> url`.
    pub asset: Value,
    /// Extra front-matter fields.
    pub page: Value,
    pub site: Value,
    pub url: String,
}

impl LayoutDefinition {
    /// Wrap `inner_html` with this layout.
    pub fn render(
        &self,
        env: &Environment<'_>,
        inner_html: &str,
        ctx: &LayoutContext,
    ) -> Result<String, minijinja::Error> {
        env.get_template(&self.template)?.render(context! {
            title => &ctx.title,
            description => &ctx.description,
            article_html => Value::from_safe_string(inner_html.to_string()),
            navigation => &ctx.navigation,
            sidebar => &ctx.sidebar,
            base_path => &ctx.base_path,
            asset => &ctx.asset,
            page => &ctx.page,
            site => &ctx.site,
            url => &ctx.url,
        })
    }
}

/// Layouts applied to one page, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutChain {
    pub layouts: Vec<LayoutDefinition>,
}

impl LayoutChain {
    pub fn contains_template(&self, template: &str) -> bool {
        self.layouts.iter().any(|l| l.template == template)
    }

    pub fn innermost(&self) -> Option<&LayoutDefinition> {
        self.layouts.first()
    }
}

/// What a layout file change means for already-resolved chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutChange {
    /// An existing variant's template was recompiled.
    Template(String),
    /// A partial changed or a variant appeared/disappeared: every chain may
    /// be affected.
    Structural,
    /// Not a layout file.
    Ignored,
}

/// Compiled layout templates plus the directory → variants index.
pub struct LayoutStore {
    root: PathBuf,
    mode: LayoutMode,
    env: Environment<'static>,
    index: BTreeMap<PathBuf, BTreeMap<String, LayoutDefinition>>,
    /// Template name → source text, for finding `extends`/`include` users.
    sources: BTreeMap<String, String>,
    resolved: HashMap<PathBuf, Vec<PathBuf>>,
    generation: u64,
}

impl LayoutStore {
    /// Discover and compile every template under `root`.
    ///
    /// Fails if the root is missing, a template does not compile, or the
    /// root does not define `default.html`.
    pub fn load(root: &Path, mode: LayoutMode) -> Result<Self, BuildError> {
        if !root.is_dir() {
            return Err(BuildError::MissingRoot {
                what: "layout",
                path: root.to_path_buf(),
            });
        }

        let mut store = Self {
            root: root.to_path_buf(),
            mode,
            env: Environment::new(),
            index: BTreeMap::new(),
            sources: BTreeMap::new(),
            resolved: HashMap::new(),
            generation: 1,
        };

        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| BuildError::io(root, std::io::Error::other(e)))?;
            if entry.file_type().is_file() && is_template(entry.path()) {
                store.compile(entry.path())?;
            }
        }

        if store.definition(Path::new(""), DEFAULT_VARIANT).is_none() {
            return Err(BuildError::MissingRootLayout(root.to_path_buf()));
        }
        Ok(store)
    }

    pub fn env(&self) -> &Environment<'static> {
        &self.env
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bumped on every recompilation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn definition(&self, dir: &Path, variant: &str) -> Option<&LayoutDefinition> {
        self.index.get(dir)?.get(variant)
    }

    /// Every variant defined directly in `dir`.
    pub fn variants(&self, dir: &Path) -> Vec<&str> {
        self.index
            .get(dir)
            .map(|v| v.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Number of memoised directory lookups.
    pub fn cached_resolutions(&self) -> usize {
        self.resolved.len()
    }

    /// Layout directories applying to `content_dir`, nearest first.
    pub fn defining_dirs(&mut self, content_dir: &Path) -> &[PathBuf] {
        let index = &self.index;
        self.resolved
            .entry(content_dir.to_path_buf())
            .or_insert_with(|| walk_up(index, content_dir))
    }

    /// Resolve the layout chain for a page in `content_dir`.
    pub fn resolve(
        &mut self,
        content_dir: &Path,
        variant: Option<&str>,
    ) -> Result<LayoutChain, LayoutResolutionError> {
        let wanted = variant.unwrap_or(DEFAULT_VARIANT);
        let dirs = self.defining_dirs(content_dir).to_vec();
        let Some((nearest, ancestors)) = dirs.split_first() else {
            return Err(LayoutResolutionError::NoLayout {
                dir: content_dir.to_path_buf(),
            });
        };

        let innermost = self.definition(nearest, wanted).cloned().ok_or_else(|| {
            LayoutResolutionError::UnknownVariant {
                dir: nearest.clone(),
                variant: wanted.to_string(),
            }
        })?;

        let mut layouts = vec![innermost];
        if self.mode == LayoutMode::Nest {
            layouts.extend(
                ancestors
                    .iter()
                    .filter_map(|dir| self.definition(dir, DEFAULT_VARIANT).cloned()),
            );
        }
        Ok(LayoutChain { layouts })
    }

    /// Recompile (or drop) the template at `path` after a change on disk.
    pub fn reload(&mut self, path: &Path) -> Result<LayoutChange, BuildError> {
        if !is_template(path) {
            return Ok(LayoutChange::Ignored);
        }
        let Some(name) = self.template_name(path) else {
            return Ok(LayoutChange::Ignored);
        };
        let existed = self.env.get_template(&name).is_ok();

        if path.exists() {
            self.compile(path)?;
        } else {
            self.env.remove_template(&name);
            self.sources.remove(&name);
            self.forget(path);
        }
        self.generation += 1;

        let is_variant = self.variant_key(path).is_some();
        if is_variant && existed && path.exists() && !self.is_referenced(&name) {
            Ok(LayoutChange::Template(name))
        } else {
            self.resolved.clear();
            Ok(LayoutChange::Structural)
        }
    }

    /// Template name for a file under the layout root.
    pub fn template_name(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    /// `(dir, variant)` if `path` is a selectable variant, `None` for partials.
    fn variant_key(&self, path: &Path) -> Option<(PathBuf, String)> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let ignored = rel
            .components()
            .any(|c| is_ignored_name(&c.as_os_str().to_string_lossy()));
        if ignored {
            return None;
        }
        let dir = rel.parent().unwrap_or(Path::new("")).to_path_buf();
        let variant = rel.file_stem()?.to_string_lossy().to_string();
        Some((dir, variant))
    }

    fn compile(&mut self, path: &Path) -> Result<(), BuildError> {
        let Some(name) = self.template_name(path) else {
            return Ok(());
        };
        let source = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        self.env
            .add_template_owned(name.clone(), source.clone())
            .map_err(|source| BuildError::Layout {
                path: path.to_path_buf(),
                source,
            })?;
        self.sources.insert(name.clone(), source);

        if let Some((dir, variant)) = self.variant_key(path) {
            self.index.entry(dir.clone()).or_default().insert(
                variant.clone(),
                LayoutDefinition {
                    dir,
                    variant,
                    template: name,
                },
            );
        }
        tracing::debug!(template = %path.display(), "compiled layout");
        Ok(())
    }

    /// Whether another template names `name` as a string literal, as
    /// `{% extends %}`, `{% include %}` and `{% import %}` do.
    fn is_referenced(&self, name: &str) -> bool {
        let quoted = [format!("\"{name}\""), format!("'{name}'")];
        self.sources
            .iter()
            .filter(|(other, _)| other.as_str() != name)
            .any(|(_, source)| quoted.iter().any(|q| source.contains(q.as_str())))
    }

        fn forget(&mut self, path: &Path) {
        let Some((dir, variant)) = self.variant_key(path) else {
            return;
        };
        if let Some(variants) = self.index.get_mut(&dir) {
            variants.remove(&variant);
            if variants.is_empty() {
                self.index.remove(&dir);
            }
        }
    }
}

fn is_template(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == LAYOUT_EXTENSION)
}

/// Directories from `start` up to the root that define a layout, nearest first.
fn walk_up(
    index: &BTreeMap<PathBuf, BTreeMap<String, LayoutDefinition>>,
    start: &Path,
) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut current = Some(start);
    while let Some(dir) = current {
        if index.contains_key(dir) {
            found.push(dir.to_path_buf());
        }
        current = dir.parent();
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_file;
    use tempfile::TempDir;

    fn layout_tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "default.html", "<main>{{ article_html }}</main>");
        write_file(tmp.path(), "home.html", "<div class=home>{{ article_html }}</div>");
        write_file(
            tmp.path(),
            "_partials/footer.html",
            "<footer>{{ site.name }}</footer>",
        );
        write_file(
            tmp.path(),
            "guide/default.html",
            "<section class=guide>{{ article_html }}</section>",
        );
        tmp
    }

    fn ctx() -> LayoutContext {
        LayoutContext {
            title: "T".into(),
            description: None,
            navigation: Value::from(()),
            sidebar: Value::from(()),
            base_path: "/".into(),
            asset: Value::from(()),
            page: Value::from(()),
            site: context! { name => "Site" },
            url: "/".into(),
        }
    }

    fn templates(chain: &LayoutChain) -> Vec<&str> {
        chain.layouts.iter().map(|l| l.template.as_str()).collect()
    }

    #[test]
    fn nearest_directory_wins() {
        let tmp = layout_tree();
        let mut store = LayoutStore::load(tmp.path(), LayoutMode::Override).unwrap();

        let root = store.resolve(Path::new(""), None).unwrap();
        assert_eq!(templates(&root), vec!["default.html"]);

        let guide = store.resolve(Path::new("guide"), None).unwrap();
        assert_eq!(templates(&guide), vec!["guide/default.html"]);

        // No layout in guide/advanced: inherits guide's
        let deep = store.resolve(Path::new("guide/advanced"), None).unwrap();
        assert_eq!(templates(&deep), vec!["guide/default.html"]);

        // No layout in blog: falls back to root
        let blog = store.resolve(Path::new("blog"), None).unwrap();
        assert_eq!(templates(&blog), vec!["default.html"]);
    }

    #[test]
    fn variant_selected_from_nearest_directory() {
        let tmp = layout_tree();
        let mut store = LayoutStore::load(tmp.path(), LayoutMode::Override).unwrap();

        let home = store.resolve(Path::new(""), Some("home")).unwrap();
        assert_eq!(templates(&home), vec!["home.html"]);

        // guide/ supplies the layout and has no `home` variant
        let err = store.resolve(Path::new("guide"), Some("home")).unwrap_err();
        assert_eq!(
            err,
            LayoutResolutionError::UnknownVariant {
                dir: PathBuf::from("guide"),
                variant: "home".into()
            }
        );
    }

    #[test]
    fn partials_are_not_variants() {
        let tmp = layout_tree();
        let store = LayoutStore::load(tmp.path(), LayoutMode::Override).unwrap();
        assert_eq!(store.variants(Path::new("")), vec!["default", "home"]);
        assert!(store.definition(Path::new("_partials"), "footer").is_none());
        assert!(store.env().get_template("_partials/footer.html").is_ok());
    }

    #[test]
    fn nest_mode_wraps_with_ancestor_defaults() {
        let tmp = layout_tree();
        let mut store = LayoutStore::load(tmp.path(), LayoutMode::Nest).unwrap();
        let chain = store.resolve(Path::new("guide/advanced"), None).unwrap();
        assert_eq!(templates(&chain), vec!["guide/default.html", "default.html"]);
    }

    #[test]
    fn resolution_is_memoized_per_directory() {
        let tmp = layout_tree();
        let mut store = LayoutStore::load(tmp.path(), LayoutMode::Override).unwrap();
        store.resolve(Path::new("guide"), None).unwrap();
        store.resolve(Path::new("guide"), None).unwrap();
        store.resolve(Path::new("guide"), Some("default")).unwrap();
        assert_eq!(store.cached_resolutions(), 1);
        store.resolve(Path::new(""), None).unwrap();
        assert_eq!(store.cached_resolutions(), 2);
    }

    #[test]
    fn missing_root_default_is_fatal() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "guide/default.html", "{{ article_html }}");
        let err = LayoutStore::load(tmp.path(), LayoutMode::Override).err().unwrap();
        assert!(matches!(err, BuildError::MissingRootLayout(_)));
    }

    #[test]
    fn missing_layout_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = LayoutStore::load(&tmp.path().join("nope"), LayoutMode::Override)
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::MissingRoot { what: "layout", .. }));
    }

    #[test]
    fn syntax_error_in_template_is_reported() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "default.html", "{% if %}");
        let err = LayoutStore::load(tmp.path(), LayoutMode::Override).err().unwrap();
        assert!(matches!(err, BuildError::Layout { .. }));
    }

    #[test]
    fn render_wraps_inner_html_unescaped() {
        let tmp = layout_tree();
        let mut store = LayoutStore::load(tmp.path(), LayoutMode::Override).unwrap();
        let chain = store.resolve(Path::new("guide"), None).unwrap();
        let html = chain.layouts[0]
            .render(store.env(), "<p>hi</p>", &ctx())
            .unwrap();
        assert_eq!(html, "<section class=guide><p>hi</p></section>");
    }

    #[test]
    fn reload_recompiles_changed_variant() {
        let tmp = layout_tree();
        let mut store = LayoutStore::load(tmp.path(), LayoutMode::Override).unwrap();
        let before = store.generation();

        let path = write_file(tmp.path(), "guide/default.html", "<article>{{ article_html }}</article>");
        let change = store.reload(&path).unwrap();
        assert_eq!(change, LayoutChange::Template("guide/default.html".into()));
        assert!(store.generation() > before);

        let chain = store.resolve(Path::new("guide"), None).unwrap();
        let html = chain.layouts[0].render(store.env(), "x", &ctx()).unwrap();
        assert_eq!(html, "<article>x</article>");
    }

    #[test]
    fn reload_new_directory_layout_is_structural() {
        let tmp = layout_tree();
        let mut store = LayoutStore::load(tmp.path(), LayoutMode::Override).unwrap();
        assert_eq!(
            templates(&store.resolve(Path::new("blog"), None).unwrap()),
            vec!["default.html"]
        );

        let path = write_file(tmp.path(), "blog/default.html", "<b>{{ article_html }}</b>");
        assert_eq!(store.reload(&path).unwrap(), LayoutChange::Structural);
        assert_eq!(
            templates(&store.resolve(Path::new("blog"), None).unwrap()),
            vec!["blog/default.html"]
        );
    }

    #[test]
    fn reload_removed_variant_falls_back_to_parent() {
        let tmp = layout_tree();
        let mut store = LayoutStore::load(tmp.path(), LayoutMode::Override).unwrap();
        let path = tmp.path().join("guide/default.html");
        fs::remove_file(&path).unwrap();

        assert_eq!(store.reload(&path).unwrap(), LayoutChange::Structural);
        assert_eq!(
            templates(&store.resolve(Path::new("guide"), None).unwrap()),
            vec!["default.html"]
        );
    }

    #[test]
    fn reload_of_extended_variant_is_structural() {
        let tmp = layout_tree();
        write_file(
            tmp.path(),
            "home.html",
            "{% extends \"default.html\" %}",
        );
        let mut store = LayoutStore::load(tmp.path(), LayoutMode::Override).unwrap();

        let path = write_file(tmp.path(), "default.html", "<main class=v2>{{ article_html }}</main>");
        assert_eq!(store.reload(&path).unwrap(), LayoutChange::Structural);

        let chain = store.resolve(Path::new(""), Some("home")).unwrap();
        let html = chain.layouts[0].render(store.env(), "x", &ctx()).unwrap();
        assert_eq!(html, "<main class=v2>x</main>");
    }

    #[test]
    fn reload_of_unreferenced_variant_stays_targeted() {
        let tmp = layout_tree();
        let mut store = LayoutStore::load(tmp.path(), LayoutMode::Override).unwrap();
        let path = write_file(tmp.path(), "home.html", "<div class=home2>{{ article_html }}</div>");
        assert_eq!(
            store.reload(&path).unwrap(),
            LayoutChange::Template("home.html".into())
        );
    }

    #[test]
    fn reload_partial_is_structural() {
        let tmp = layout_tree();
        let mut store = LayoutStore::load(tmp.path(), LayoutMode::Override).unwrap();
        let path = write_file(tmp.path(), "_partials/footer.html", "<footer/>");
        assert_eq!(store.reload(&path).unwrap(), LayoutChange::Structural);
    }

    #[test]
    fn reload_ignores_non_templates() {
        let tmp = layout_tree();
        let mut store = LayoutStore::load(tmp.path(), LayoutMode::Override).unwrap();
        let path = write_file(tmp.path(), "notes.txt", "x");
        assert_eq!(store.reload(&path).unwrap(), LayoutChange::Ignored);
    }
}
