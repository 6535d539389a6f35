//! Build orchestrator.
//!
//! A [`Pipeline`] owns one site's build state and moves through
//!
//! ```text
//! Idle → Discovering → Resolving → Rendering → Writing → Done
//!                 ↑                                        │
//!                 └──────── file change (dev mode) ────────┘
//! ```
//!
//! - **Discovering**: enumerate content files, compile layouts, extract
//!   front-matter. A file with bad front-matter is recorded and skipped.
//! - **Resolving**: build the navigation model once, resolve every page's
//!   layout chain, copy assets. Nothing renders before all three exist.
//! - **Rendering**: compose and write each page. Pages are independent, so
//!   production builds fan out over the rayon pool; each page is flushed as
//!   soon as it is composed.
//! - **Writing**: tally results; in development mode, write inline error
//!   pages in place of failed ones.
//!
//! [`Pipeline::apply_changes`] is the incremental pass used by the watcher.
//! It re-runs only what the changed paths affect.

use crate::assets::{self, AssetLookup};
use crate::config::BuildContext;
use crate::error::{BuildError, PageError};
use crate::frontmatter::ValidationError;
use crate::layout::{LayoutChain, LayoutChange, LayoutResolutionError, LayoutStore};
use crate::navigation::NavigationModel;
use crate::render::{self, Composer};
use crate::scan::{self, ContentKind, ContentSource};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Discovering,
    Resolving,
    Rendering,
    Writing,
    Done,
}

/// Outcome of a full pass.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Pages written, relative to the output root, in content order.
    pub written: Vec<PathBuf>,
    /// Per-file failures, sorted by content path.
    pub errors: Vec<PageError>,
    /// Number of assets copied.
    pub assets: usize,
    /// The pass stopped early on a cancellation request.
    pub cancelled: bool,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }
}

/// Outcome of an incremental pass.
#[derive(Debug, Default)]
pub struct RebuildReport {
    /// Pages re-rendered and written.
    pub rendered: Vec<PathBuf>,
    /// Outputs deleted because their source disappeared.
    pub removed: Vec<PathBuf>,
    pub errors: Vec<PageError>,
    pub navigation_changed: bool,
    /// Assets re-copied, relative to the assets root.
    pub assets_refreshed: Vec<PathBuf>,
    /// Layout templates recompiled in place.
    pub templates_recompiled: Vec<String>,
    /// Layout templates that failed to compile; the previous version stays.
    pub layout_errors: Vec<String>,
    /// Nothing had been built yet, so a full pass ran instead.
    pub full: bool,
    pub cancelled: bool,
}

impl RebuildReport {
    fn from_full(report: BuildReport) -> Self {
        Self {
            rendered: report.written,
            errors: report.errors,
            full: true,
            cancelled: report.cancelled,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rendered.is_empty()
            && self.removed.is_empty()
            && self.errors.is_empty()
            && self.layout_errors.is_empty()
    }
}

/// Outcome of [`Pipeline::check`].
#[derive(Debug, Default)]
pub struct CheckReport {
    pub pages: usize,
    pub errors: Vec<PageError>,
}

/// What a changed path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    Content,
    Layout,
    Asset,
}

/// Layouts and assets from the last full pass, kept for incremental ones.
struct Built {
    layouts: LayoutStore,
    assets: Arc<AssetLookup>,
}

/// One page ready to render.
struct Job<'a> {
    source: &'a ContentSource,
    chain: Result<LayoutChain, LayoutResolutionError>,
}

enum Outcome {
    Written(PathBuf),
    Failed(PageError),
    Skipped,
}

pub struct Pipeline {
    ctx: BuildContext,
    state: BuildState,
    cancel: Arc<AtomicBool>,
    sources: BTreeMap<PathBuf, ContentSource>,
    navigation: NavigationModel,
    built: Option<Built>,
}

/// One-shot full build.
pub fn build(ctx: BuildContext) -> Result<BuildReport, BuildError> {
    Pipeline::new(ctx).run()
}

impl Pipeline {
    pub fn new(ctx: BuildContext) -> Self {
        Self {
            ctx,
            state: BuildState::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
            sources: BTreeMap::new(),
            navigation: NavigationModel::default(),
            built: None,
        }
    }

    /// Share a cancellation flag, e.g. one set from a Ctrl-C handler.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn navigation(&self) -> &NavigationModel {
        &self.navigation
    }

    /// Valid content sources from the latest pass, by relative path.
    pub fn sources(&self) -> &BTreeMap<PathBuf, ContentSource> {
        &self.sources
    }

    pub fn assets(&self) -> Option<&AssetLookup> {
        self.built.as_ref().map(|b| b.assets.as_ref())
    }

    pub fn layouts(&self) -> Option<&LayoutStore> {
        self.built.as_ref().map(|b| &b.layouts)
    }

    /// Full pass: discover, resolve, render and write everything.
    pub fn run(&mut self) -> Result<BuildReport, BuildError> {
        let (mut store, mut errors) = self.discover()?;

        enter(&mut self.state, BuildState::Resolving);
        self.navigation = NavigationModel::build(self.sources.values(), &self.ctx.base_path);
        let jobs = resolve_jobs(&mut store, self.sources.values());
        let lookup = Arc::new(assets::prepare(
            &self.ctx.asset_root,
            &self.ctx.output_root,
            &self.ctx.base_path,
            self.ctx.dev,
        )?);

        enter(&mut self.state, BuildState::Rendering);
        let composer = Composer {
            env: store.env(),
            navigation: &self.navigation,
            assets: Arc::clone(&lookup),
            site: &self.ctx.site,
            base_path: &self.ctx.base_path,
        };
        let output_root = &self.ctx.output_root;
        let cancel = self.cancel.as_ref();
        let outcomes: Vec<Result<Outcome, BuildError>> = if self.ctx.dev {
            jobs.iter()
                .map(|job| render_job(&composer, output_root, cancel, job))
                .collect()
        } else {
            jobs.par_iter()
                .map(|job| render_job(&composer, output_root, cancel, job))
                .collect()
        };

        enter(&mut self.state, BuildState::Writing);
        let mut report = BuildReport {
            assets: lookup.len(),
            ..BuildReport::default()
        };
        for outcome in outcomes {
            match outcome? {
                Outcome::Written(path) => report.written.push(path),
                Outcome::Failed(err) => errors.push(err),
                Outcome::Skipped => report.cancelled = true,
            }
        }
        drop(composer);
        drop(jobs);

        errors.sort_by(|a, b| a.path().cmp(b.path()));
        for err in &errors {
            tracing::warn!(path = %err.path().display(), kind = %err.kind(), "{err}");
            if self.ctx.dev {
                write_error_page(&self.ctx, &self.sources, err)?;
            }
        }
        report.errors = errors;

        self.built = Some(Built {
            layouts: store,
            assets: lookup,
        });
        enter(&mut self.state, BuildState::Done);

        if !self.ctx.dev && report.written.is_empty() && !report.errors.is_empty() {
            return Err(BuildError::NoPagesWritten {
                errors: report.errors,
            });
        }
        tracing::info!(
            pages = report.written.len(),
            failed = report.errors.len(),
            assets = report.assets,
            "build finished"
        );
        Ok(report)
    }

    /// Discovery, extraction and layout resolution without writing anything.
    pub fn check(&mut self) -> Result<CheckReport, BuildError> {
        let (mut store, mut errors) = self.discover()?;
        enter(&mut self.state, BuildState::Resolving);
        self.navigation = NavigationModel::build(self.sources.values(), &self.ctx.base_path);
        for job in resolve_jobs(&mut store, self.sources.values()) {
            if let Err(source) = job.chain {
                errors.push(PageError::LayoutResolution {
                    path: job.source.rel_path.clone(),
                    source,
                });
            }
        }
        errors.sort_by(|a, b| a.path().cmp(b.path()));
        enter(&mut self.state, BuildState::Done);
        Ok(CheckReport {
            pages: self.sources.len(),
            errors,
        })
    }

    /// Incremental pass over a batch of changed paths.
    ///
    /// - content: reload the file, rebuild navigation, re-render the page
    ///   (every page if navigation changed); deleted pages lose their output
    /// - layout: recompile; re-render pages whose chain uses the template,
    ///   or everything for partials and added/removed variants
    /// - asset: re-copy just that asset under a new token; re-render all
    pub fn apply_changes(&mut self, paths: &[PathBuf]) -> Result<RebuildReport, BuildError> {
        let built = match self.built.as_mut() {
            Some(built) => built,
            None => return self.run().map(RebuildReport::from_full),
        };

        enter(&mut self.state, BuildState::Discovering);
        let mut report = RebuildReport::default();
        let mut targets: BTreeSet<PathBuf> = BTreeSet::new();
        let mut rerender_all = false;

        let mut by_kind: BTreeMap<PathBuf, ChangeKind> = BTreeMap::new();
        for path in paths {
            if let Some(kind) = classify(&self.ctx, path) {
                by_kind.insert(path.clone(), kind);
            }
        }

        for (path, kind) in &by_kind {
            match kind {
                ChangeKind::Content => {
                    let changed = reload_content(
                        &self.ctx,
                        &mut self.sources,
                        path,
                        &mut report,
                    )?;
                    targets.extend(changed);
                }
                ChangeKind::Asset => {
                    let lookup = Arc::make_mut(&mut built.assets);
                    assets::refresh(lookup, &self.ctx.asset_root, &self.ctx.output_root, path)?;
                    let rel = path.strip_prefix(&self.ctx.asset_root).unwrap_or(path);
                    report.assets_refreshed.push(rel.to_path_buf());
                    rerender_all = true;
                }
                ChangeKind::Layout => match built.layouts.reload(path) {
                    Ok(LayoutChange::Template(name)) => report.templates_recompiled.push(name),
                    Ok(LayoutChange::Structural) => rerender_all = true,
                    Ok(LayoutChange::Ignored) => {}
                    Err(err) => {
                        tracing::warn!("{err}");
                        report.layout_errors.push(err.to_string());
                    }
                },
            }
        }

        enter(&mut self.state, BuildState::Resolving);
        let navigation = NavigationModel::build(self.sources.values(), &self.ctx.base_path);
        if navigation != self.navigation {
            report.navigation_changed = true;
            rerender_all = true;
            self.navigation = navigation;
        }

        let templates = &report.templates_recompiled;
        let jobs: Vec<Job<'_>> = resolve_jobs(&mut built.layouts, self.sources.values())
            .into_iter()
            .filter(|job| {
                rerender_all
                    || targets.contains(&job.source.rel_path)
                    || job
                        .chain
                        .as_ref()
                        .is_ok_and(|c| templates.iter().any(|t| c.contains_template(t)))
            })
            .collect();

        enter(&mut self.state, BuildState::Rendering);
        let composer = Composer {
            env: built.layouts.env(),
            navigation: &self.navigation,
            assets: Arc::clone(&built.assets),
            site: &self.ctx.site,
            base_path: &self.ctx.base_path,
        };
        let mut failures = Vec::new();
        for job in &jobs {
            match render_job(&composer, &self.ctx.output_root, &self.cancel, job)? {
                Outcome::Written(path) => report.rendered.push(path),
                Outcome::Failed(err) => failures.push(err),
                Outcome::Skipped => report.cancelled = true,
            }
        }
        drop(composer);
        drop(jobs);

        enter(&mut self.state, BuildState::Writing);
        report.errors.extend(failures);
        report.errors.sort_by(|a, b| a.path().cmp(b.path()));
        for err in &report.errors {
            tracing::warn!(path = %err.path().display(), kind = %err.kind(), "{err}");
            if self.ctx.dev {
                write_error_page(&self.ctx, &self.sources, err)?;
            }
        }

        enter(&mut self.state, BuildState::Done);
        tracing::info!(
            rendered = report.rendered.len(),
            removed = report.removed.len(),
            failed = report.errors.len(),
            "rebuild finished"
        );
        Ok(report)
    }

    /// Check roots, compile layouts, discover and extract content.
    fn discover(&mut self) -> Result<(LayoutStore, Vec<PageError>), BuildError> {
        enter(&mut self.state, BuildState::Discovering);
        let roots = [
            ("content", &self.ctx.content_root),
            ("layout", &self.ctx.layout_root),
            ("assets", &self.ctx.asset_root),
        ];
        for (what, path) in roots {
            if !path.is_dir() {
                return Err(BuildError::MissingRoot {
                    what,
                    path: path.clone(),
                });
            }
        }

        let files = scan::discover(&self.ctx.content_root)
            .map_err(|e| BuildError::io(&self.ctx.content_root, e))?;
        if files.is_empty() {
            return Err(BuildError::NoContent(self.ctx.content_root.clone()));
        }
        let store = LayoutStore::load(&self.ctx.layout_root, self.ctx.layout_mode)?;

        self.sources.clear();
        let mut errors = Vec::new();
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
        for file in &files {
            match scan::load(file).map_err(|e| BuildError::io(&file.path, e))? {
                Ok(source) => {
                    // files are sorted, so the first claimant wins
                    if let Some(first) = claimed.get(&source.output_path) {
                        errors.push(duplicate_output(&source, first));
                        continue;
                    }
                    claimed.insert(source.output_path.clone(), source.rel_path.clone());
                    self.sources.insert(source.rel_path.clone(), source);
                }
                Err(err) => errors.push(err),
            }
        }
        tracing::debug!(
            files = files.len(),
            valid = self.sources.len(),
            "content discovered"
        );
        Ok((store, errors))
    }
}

fn enter(state: &mut BuildState, next: BuildState) {
    tracing::debug!(from = ?*state, to = ?next, "build state");
    *state = next;
}

fn classify(ctx: &BuildContext, path: &Path) -> Option<ChangeKind> {
    if path.starts_with(&ctx.output_root) {
        None
    } else if path.starts_with(&ctx.layout_root) {
        Some(ChangeKind::Layout)
    } else if path.starts_with(&ctx.asset_root) {
        Some(ChangeKind::Asset)
    } else if path.starts_with(&ctx.content_root)
        && (scan::is_content_path(&ctx.content_root, path) || !path.exists())
    {
        Some(ChangeKind::Content)
    } else {
        None
    }
}

/// Re-read one changed content path. Returns the pages to re-render.
///
/// A vanished path drops every source at or below it and deletes their
/// outputs.
fn reload_content(
    ctx: &BuildContext,
    sources: &mut BTreeMap<PathBuf, ContentSource>,
    path: &Path,
    report: &mut RebuildReport,
) -> Result<Option<PathBuf>, BuildError> {
    let Ok(rel) = path.strip_prefix(&ctx.content_root).map(Path::to_path_buf) else {
        return Ok(None);
    };

    if !path.exists() {
        let gone: Vec<PathBuf> = sources
            .keys()
            .filter(|k| k.starts_with(&rel))
            .cloned()
            .collect();
        let mut outputs: Vec<PathBuf> = gone
            .iter()
            .filter_map(|key| sources.remove(key))
            .map(|old| old.output_path)
            .collect();
        // a page that only had an error page written has no source entry
        if outputs.is_empty() && ContentKind::from_path(path).is_some() {
            let orphan = scan::output_path_for(&rel);
            if !sources.values().any(|s| s.output_path == orphan) {
                outputs.push(orphan);
            }
        }
        for output in outputs {
            let dest = ctx.output_root.join(&output);
            if dest.exists() {
                fs::remove_file(&dest).map_err(|e| BuildError::io(&dest, e))?;
                report.removed.push(output);
            } else if !gone.is_empty() {
                report.removed.push(output);
            }
        }
        return Ok(None);
    }

    let Some(kind) = ContentKind::from_path(path).filter(|_| path.is_file()) else {
        return Ok(None);
    };
    let parsed = match fs::read_to_string(path) {
        Ok(raw) => ContentSource::parse(path.to_path_buf(), rel.clone(), kind, &raw),
        Err(source) => Err(PageError::Io {
            path: rel.clone(),
            source,
        }),
    };
    match parsed {
        Ok(source) => {
            let first = sources
                .values()
                .find(|s| s.output_path == source.output_path && s.rel_path != rel)
                .map(|s| s.rel_path.clone());
            match first {
                Some(first) if first < rel => {
                    sources.remove(&rel);
                    report.errors.push(duplicate_output(&source, &first));
                    return Ok(None);
                }
                Some(later) => {
                    if let Some(evicted) = sources.remove(&later) {
                        report.errors.push(duplicate_output(&evicted, &rel));
                    }
                }
                None => {}
            }
            sources.insert(rel.clone(), source);
            Ok(Some(rel))
        }
        Err(err) => {
            sources.remove(&rel);
            report.errors.push(err);
            Ok(None)
        }
    }
}

fn resolve_jobs<'s>(
    store: &mut LayoutStore,
    sources: impl Iterator<Item = &'s ContentSource>,
) -> Vec<Job<'s>> {
    sources
        .map(|source| Job {
            source,
            chain: store.resolve(source.rel_dir(), source.frontmatter.layout.as_deref()),
        })
        .collect()
}

/// Compose and write one page. Page-level failures are an `Ok` outcome;
/// only a failed write aborts the pass.
fn render_job(
    composer: &Composer<'_>,
    output_root: &Path,
    cancel: &AtomicBool,
    job: &Job<'_>,
) -> Result<Outcome, BuildError> {
    if cancel.load(Ordering::SeqCst) {
        return Ok(Outcome::Skipped);
    }
    let source = job.source;
    let chain = match &job.chain {
        Ok(chain) => chain,
        Err(err) => {
            return Ok(Outcome::Failed(PageError::LayoutResolution {
                path: source.rel_path.clone(),
                source: err.clone(),
            }));
        }
    };
    let html = match composer.compose(source, chain) {
        Ok(html) => html,
        Err(err) => return Ok(Outcome::Failed(err)),
    };

    let dest = output_root.join(&source.output_path);
    write_atomic(&dest, html.as_bytes()).map_err(|e| BuildError::io(&dest, e))?;
    tracing::debug!(page = %source.output_path.display(), "written");
    Ok(Outcome::Written(source.output_path.clone()))
}

fn duplicate_output(page: &ContentSource, first: &Path) -> PageError {
    PageError::Validation {
        path: page.rel_path.clone(),
        source: ValidationError::DuplicateOutput {
            output: page.output_path.clone(),
            other: first.to_path_buf(),
        },
    }
}

/// Inline error page for a failed source, unless a valid page owns that
/// output path.
fn write_error_page(
    ctx: &BuildContext,
    sources: &BTreeMap<PathBuf, ContentSource>,
    err: &PageError,
) -> Result<(), BuildError> {
    let output = scan::output_path_for(err.path());
    if sources.values().any(|s| s.output_path == output) {
        return Ok(());
    }
    let dest = ctx.output_root.join(output);
    let html = render::error_document(&ctx.site.name, err).into_string();
    write_atomic(&dest, html.as_bytes()).map_err(|e| BuildError::io(&dest, e))
}

/// Write through a temp file in the destination directory, then rename, so
/// readers never observe a half-written file.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = dest.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
