//! Render composer.
//!
//! Turns one [`ContentSource`] into a complete HTML document in three
//! stages, innermost first:
//!
//! 1. **Body**: markdown through pulldown-cmark, or a component body
//!    rendered as a template with `page`, `site`, `base_path` and `asset`
//!    in scope.
//! 2. **Layout chain**: each resolved layout wraps the previous stage's
//!    markup as `article_html`.
//! 3. **Outer document**: a fixed maud template adding `<head>` metadata
//!    and the theme script.
//!
//! Composition is pure: identical inputs give byte-identical output.
//!
//! ## Asset lookups inside templates
//!
//! Templates call `asset("css/site.css")`. A miss aborts the template with a
//! minijinja error; the composer records the missing name on the side so
//! it can report [`PageError::AssetNotFound`] instead of a generic render
//! failure.

use crate::assets::AssetLookup;
use crate::config::SiteMetadata;
use crate::error::PageError;
use crate::layout::{LayoutChain, LayoutContext};
use crate::navigation::{self, NavigationModel};
use crate::scan::{ContentKind, ContentSource};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use minijinja::{Environment, Value, context};
use pulldown_cmark::{Options, Parser, html as md_html};
use std::sync::{Arc, Mutex};

const THEME_SCRIPT: &str = include_str!("../static/theme.js");

/// Template name reported for failures in a component body.
const BODY_TEMPLATE: &str = "<body>";

/// Markdown to HTML with the extensions content authors expect.
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES;
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::new();
    md_html::push_html(&mut out, parser);
    out
}

/// Everything shared by all renders of one pass.
///
/// Holds only read-only references, so one composer serves parallel renders.
pub struct Composer<'a> {
    pub env: &'a Environment<'static>,
    pub navigation: &'a NavigationModel,
    pub assets: Arc<AssetLookup>,
    pub site: &'a SiteMetadata,
    pub base_path: &'a str,
}

/// Records the first asset name a template failed to resolve.
#[derive(Clone, Default)]
struct MissingAsset(Arc<Mutex<Option<String>>>);

impl MissingAsset {
    fn record(&self, name: &str) {
        if let Ok(mut slot) = self.0.lock() {
            slot.get_or_insert_with(|| name.to_string());
        }
    }

    fn take(&self) -> Option<String> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl Composer<'_> {
    /// Render `source` through `chain` into a full HTML document.
    pub fn compose(&self, source: &ContentSource, chain: &LayoutChain) -> Result<String, PageError> {
        let missing = MissingAsset::default();
        let asset = self.asset_function(missing.clone());
        let fm = &source.frontmatter;
        let page_href = navigation::href(self.base_path, &source.url);

        let site = context! {
            name => &self.site.name,
            url => &self.site.url,
            description => &self.site.description,
        };
        let page = Value::from_serialize(&fm.extra);

        let mut html = match source.kind {
            ContentKind::Markdown => markdown_to_html(&source.body),
            ContentKind::Component => self
                .env
                .render_str(
                    &source.body,
                    context! {
                        title => &fm.title,
                        page => &page,
                        site => &site,
                        base_path => self.base_path,
                        asset => &asset,
                        url => &page_href,
                    },
                )
                .map_err(|e| self.failure(source, BODY_TEMPLATE, &e, &missing))?,
        };

        let view = self.navigation.view(&page_href);
        let sidebar = view.section(&navigation::directory_section(source.rel_dir()));
        let ctx = LayoutContext {
            title: fm.title.clone(),
            description: self.description(source).map(str::to_string),
            navigation: Value::from_serialize(&view),
            sidebar: Value::from_serialize(sidebar),
            base_path: self.base_path.to_string(),
            asset,
            page,
            site,
            url: page_href.clone(),
        };

        for layout in &chain.layouts {
            html = layout
                .render(self.env, &html, &ctx)
                .map_err(|e| self.failure(source, &layout.template, &e, &missing))?;
        }

        let head = self.head(source, &page_href)?;
        Ok(base_document(&head, PreEscaped(html)).into_string())
    }

    fn asset_function(&self, missing: MissingAsset) -> Value {
        let assets = Arc::clone(&self.assets);
        Value::from_function(move |name: String| -> Result<String, minijinja::Error> {
            assets.url(&name).map_err(|e| {
                missing.record(&name);
                minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
            })
        })
    }

    /// Page description, falling back to the site's.
    fn description<'s>(&'s self, source: &'s ContentSource) -> Option<&'s str> {
        source
            .frontmatter
            .description
            .as_deref()
            .or_else(|| Some(self.site.description.as_str()).filter(|d| !d.is_empty()))
    }

    fn head(&self, source: &ContentSource, page_href: &str) -> Result<DocumentHead, PageError> {
        let resolve = |name: &str| {
            self.assets.url(name).map_err(|e| PageError::AssetNotFound {
                path: source.rel_path.clone(),
                name: e.name,
            })
        };
        let favicon = self.site.favicon.as_deref().map(resolve).transpose()?;
        let stylesheets = self
            .site
            .stylesheets
            .iter()
            .map(|s| resolve(s))
            .collect::<Result<Vec<_>, _>>()?;
        let canonical = (!self.site.url.is_empty())
            .then(|| format!("{}{}", self.site.url.trim_end_matches('/'), page_href));

        Ok(DocumentHead {
            title: format!("{} | {}", self.site.name, source.frontmatter.title),
            description: self.description(source).map(str::to_string),
            canonical,
            favicon,
            stylesheets,
        })
    }

    fn failure(
        &self,
        source: &ContentSource,
        template: &str,
        err: &minijinja::Error,
        missing: &MissingAsset,
    ) -> PageError {
        if let Some(name) = missing.take() {
            return PageError::AssetNotFound {
                path: source.rel_path.clone(),
                name,
            };
        }
        PageError::Render {
            path: source.rel_path.clone(),
            template: template.to_string(),
            message: format!("{err:#}"),
        }
    }
}

/// `<head>` contents of the outer document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentHead {
    pub title: String,
    pub description: Option<String>,
    pub canonical: Option<String>,
    pub favicon: Option<String>,
    pub stylesheets: Vec<String>,
}

/// The fixed outer HTML document every page is wrapped in.
pub fn base_document(head: &DocumentHead, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (head.title) }
                @if let Some(description) = &head.description {
                    meta name="description" content=(description);
                }
                @if let Some(canonical) = &head.canonical {
                    link rel="canonical" href=(canonical);
                }
                @if let Some(favicon) = &head.favicon {
                    link rel="icon" href=(favicon);
                }
                @for stylesheet in &head.stylesheets {
                    link rel="stylesheet" href=(stylesheet);
                }
                script { (PreEscaped(THEME_SCRIPT)) }
            }
            body {
                (content)
            }
        }
    }
}

/// Inline page written in place of a failed page during development.
pub fn error_document(site_name: &str, error: &PageError) -> Markup {
    let head = DocumentHead {
        title: format!("{} | {}", site_name, error.kind()),
        description: None,
        canonical: None,
        favicon: None,
        stylesheets: Vec::new(),
    };
    base_document(
        &head,
        html! {
            main.build-error {
                h1 { (error.kind()) }
                p { code { (error.path().display()) } }
                pre { (error.to_string()) }
            }
        },
    )
}
