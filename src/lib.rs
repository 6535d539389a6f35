//! # Folio
//!
//! A static site assembler. Content files carrying front-matter become HTML
//! pages at the same relative path, wrapped in layouts chosen per directory,
//! with a navigation model built from every page's title and order.
//!
//! # Architecture: One Pass, Shared Read-Only State
//!
//! A build pass moves through a fixed sequence of states:
//!
//! ```text
//! Idle → Discovering → Resolving → Rendering/Writing → Done
//!          content/      navigation    per page:
//!          layouts/      layout chains   compose → write (temp + rename)
//!          assets/
//! ```
//!
//! Everything a render needs (the [`config::BuildContext`], the
//! [`navigation::NavigationModel`], the [`assets::AssetLookup`] and the
//! compiled layouts) is built before the first page renders and never
//! mutated during the pass, so production builds render pages in parallel
//! with rayon. Development mode loops back from `Done` to re-run only the
//! steps a changed file affects ([`Pipeline::apply_changes`]).
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `site.toml` loading and validation, stock config, [`config::BuildContext`] |
//! | [`error`] | Per-page [`PageError`] and pass-level [`BuildError`], with [`ErrorKind`] |
//! | [`frontmatter`] | YAML/TOML front-matter extraction and validation |
//! | [`scan`] | Content discovery, output path and URL derivation |
//! | [`layout`] | Compiled layout templates and nearest-directory resolution |
//! | [`navigation`] | Navigation sections and the per-page current-marked view |
//! | [`render`] | Markdown/component bodies, layout chain, outer document |
//! | [`assets`] | Fingerprinted asset copies, lookup, cache-control headers |
//! | [`pipeline`] | Build orchestrator: full pass, incremental pass, check |
//! | [`watch`] | Development-mode file watcher with debouncing |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Nearest Layout Wins
//!
//! The layout tree mirrors the content tree. A page uses the layout from the
//! nearest directory (its own, then each ancestor) that defines one; deeper
//! layouts replace shallower ones outright. Sites that want wrapping instead
//! set `[layouts] mode = "nest"`, and the chain grows outward through every
//! ancestor's `default.html`.
//!
//! ## Runtime Templates, Compiled Outer Document
//!
//! Layouts are user files, so they are minijinja templates compiled once per
//! pass. The outer HTML document is fixed for every site and is a maud
//! template: malformed markup there is a compile error, not a runtime one.
//!
//! ## Current Page Is a View, Not State
//!
//! The navigation model never stores which page is current.
//! [`navigation::NavigationModel::view`] marks the item matching the page
//! being rendered, so one model serves every concurrent render.
//!
//! ## Content-Hashed Assets
//!
//! Production asset filenames embed a SHA-256 prefix of their contents and
//! are served `immutable`. Byte-identical inputs give byte-identical output,
//! so a rebuild without changes invalidates nothing. In development the
//! names stay plain and URLs carry a token bumped on every rebuild.

pub mod assets;
pub mod config;
pub mod error;
pub mod frontmatter;
pub mod layout;
pub mod navigation;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod scan;
pub mod watch;

pub use error::{BuildError, ErrorKind, PageError};
pub use pipeline::{BuildReport, Pipeline, RebuildReport, build};

#[cfg(test)]
pub(crate) mod test_helpers;
