//! Static asset pipeline.
//!
//! Copies everything under the assets directory into `{output}/assets/` and
//! builds an [`AssetLookup`] mapping logical names (`css/site.css`) to
//! public URLs. The two build modes trade cacheability differently:
//!
//! | Mode        | Output file                      | URL suffix   | Cache-Control                          |
//! |-------------|----------------------------------|--------------|----------------------------------------|
//! | production  | `assets/css/site.3f2a…c1.css`    | none         | `public, max-age=31536000, immutable`  |
//! | development | `assets/css/site.css`            | `?v={token}` | `no-cache`                             |
//!
//! The production fingerprint is the first 16 hex characters of the file's
//! SHA-256, so URLs change exactly when content does. The development token
//! is a millisecond timestamp that strictly increases on every refresh.
//!
//! Alongside the copies, `asset-manifest.json` (name → URL) and a `_headers`
//! file carrying the cache policy are written to the output root.

use crate::pipeline::write_atomic;
use crate::scan::is_ignored_name;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use walkdir::WalkDir;

/// Output subdirectory holding copied assets.
pub const ASSETS_OUTPUT_DIR: &str = "assets";
pub const MANIFEST_FILENAME: &str = "asset-manifest.json";
pub const HEADERS_FILENAME: &str = "_headers";

pub const IMMUTABLE: &str = "public, max-age=31536000, immutable";
pub const NO_CACHE: &str = "no-cache";

const FINGERPRINT_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("asset manifest: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> AssetError + '_ {
    move |source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Lookup of a name with no matching file in the assets directory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown asset `{name}`")]
pub struct AssetNotFound {
    pub name: String,
}

/// One copied asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRecord {
    /// Logical name relative to the assets directory, `/`-separated.
    pub name: String,
    /// Path of the copy relative to the output root.
    pub output_path: PathBuf,
    /// Public URL, without any dev token.
    pub url: String,
    /// Full SHA-256 of the content.
    pub hash: String,
}

/// Name → URL resolution, frozen for one build pass.
#[derive(Debug, Clone)]
pub struct AssetLookup {
    records: BTreeMap<String, AssetRecord>,
    base_path: String,
    dev: bool,
    token: Option<u64>,
}

impl AssetLookup {
    /// Public URL for a logical asset name.
    pub fn url(&self, name: &str) -> Result<String, AssetNotFound> {
        let record = self.get(name).ok_or_else(|| AssetNotFound {
            name: name.to_string(),
        })?;
        Ok(match self.token {
            Some(token) => format!("{}?v={}", record.url, token),
            None => record.url.clone(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&AssetRecord> {
        self.records.get(name.trim_start_matches('/'))
    }

    pub fn records(&self) -> impl Iterator<Item = &AssetRecord> {
        self.records.values()
    }

    /// Development cache-buster, `None` in production.
    pub fn token(&self) -> Option<u64> {
        self.token
    }

    pub fn is_dev(&self) -> bool {
        self.dev
    }

    /// Cache-Control directive served with the copied assets.
    pub fn cache_control(&self) -> &'static str {
        if self.dev { NO_CACHE } else { IMMUTABLE }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// First [`FINGERPRINT_LEN`] hex characters of the content's SHA-256.
pub fn fingerprint(hash: &str) -> &str {
    &hash[..FINGERPRINT_LEN.min(hash.len())]
}

/// SHA-256 of a byte slice, as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// `css/site.css` + fingerprint → `css/site.{fingerprint}.css`.
fn fingerprinted(rel: &Path, fingerprint: &str) -> PathBuf {
    let stem = rel.file_stem().unwrap_or_default().to_string_lossy();
    let name = match rel.extension() {
        Some(ext) => format!("{}.{}.{}", stem, fingerprint, ext.to_string_lossy()),
        None => format!("{}.{}", stem, fingerprint),
    };
    rel.with_file_name(name)
}

fn logical_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Epoch milliseconds, strictly greater than `previous`.
fn next_token(previous: Option<u64>) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    match previous {
        Some(prev) if now <= prev => prev + 1,
        _ => now,
    }
}

/// Copy every asset into the output tree and build the lookup.
///
/// The `assets/` output directory is cleared first so stale fingerprints
/// from earlier builds do not accumulate.
pub fn prepare(
    assets_dir: &Path,
    output_dir: &Path,
    base_path: &str,
    dev: bool,
) -> Result<AssetLookup, AssetError> {
    let target = output_dir.join(ASSETS_OUTPUT_DIR);
    if target.exists() {
        fs::remove_dir_all(&target).map_err(io_err(&target))?;
    }

    let mut lookup = AssetLookup {
        records: BTreeMap::new(),
        base_path: base_path.to_string(),
        dev,
        token: dev.then(|| next_token(None)),
    };

    let walker = WalkDir::new(assets_dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_name(&e.file_name().to_string_lossy()));
    for entry in walker {
        let entry = entry.map_err(|e| AssetError::Io {
            path: assets_dir.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        if entry.file_type().is_file() {
            let record = copy_asset(assets_dir, output_dir, &lookup, entry.path())?;
            lookup.records.insert(record.name.clone(), record);
        }
    }

    write_metadata(&lookup, output_dir)?;
    tracing::debug!(count = lookup.len(), dev, "assets prepared");
    Ok(lookup)
}

/// Re-copy one changed (or drop one deleted) asset and issue a new token.
///
/// Unchanged assets are left alone; only the edited file is rehashed.
pub fn refresh(
    lookup: &mut AssetLookup,
    assets_dir: &Path,
    output_dir: &Path,
    changed: &Path,
) -> Result<(), AssetError> {
    let Ok(rel) = changed.strip_prefix(assets_dir) else {
        return Ok(());
    };
    let name = logical_name(rel);

    if let Some(old) = lookup.records.remove(&name) {
        let stale = output_dir.join(&old.output_path);
        // dev copies keep their name and are overwritten below
        let overwritten = lookup.dev && changed.is_file();
        if !overwritten && stale.exists() {
            fs::remove_file(&stale).map_err(io_err(&stale))?;
        }
    }
    if changed.is_file() {
        let record = copy_asset(assets_dir, output_dir, lookup, changed)?;
        lookup.records.insert(name, record);
    }
    if lookup.dev {
        lookup.token = Some(next_token(lookup.token));
    }

    write_metadata(lookup, output_dir)
}

fn copy_asset(
    assets_dir: &Path,
    output_dir: &Path,
    lookup: &AssetLookup,
    source: &Path,
) -> Result<AssetRecord, AssetError> {
    let rel = source.strip_prefix(assets_dir).unwrap_or(source);
    let bytes = fs::read(source).map_err(io_err(source))?;
    let hash = hash_bytes(&bytes);

    let rel_out = if lookup.dev {
        rel.to_path_buf()
    } else {
        fingerprinted(rel, fingerprint(&hash))
    };
    let output_path = Path::new(ASSETS_OUTPUT_DIR).join(rel_out);
    let dest = output_dir.join(&output_path);
    write_atomic(&dest, &bytes).map_err(io_err(&dest))?;

    let url = format!("{}{}", lookup.base_path, logical_name(&output_path));
    Ok(AssetRecord {
        name: logical_name(rel),
        output_path,
        url,
        hash,
    })
}

fn write_metadata(lookup: &AssetLookup, output_dir: &Path) -> Result<(), AssetError> {
    let manifest: BTreeMap<&str, String> = lookup
        .records
        .keys()
        .filter_map(|name| Some((name.as_str(), lookup.url(name).ok()?)))
        .collect();
    let json = serde_json::to_string_pretty(&manifest)?;
    let path = output_dir.join(MANIFEST_FILENAME);
    write_atomic(&path, json.as_bytes()).map_err(io_err(&path))?;

    let path = output_dir.join(HEADERS_FILENAME);
    write_atomic(&path, headers_file(lookup).as_bytes()).map_err(io_err(&path))
}

/// `_headers` rules: asset policy for `assets/*`, `no-cache` for pages.
pub fn headers_file(lookup: &AssetLookup) -> String {
    let base = &lookup.base_path;
    format!(
        "{base}{dir}/*\n  Cache-Control: {asset}\n{base}*.html\n  Cache-Control: {page}\n{base}\n  Cache-Control: {page}\n",
        dir = ASSETS_OUTPUT_DIR,
        asset = lookup.cache_control(),
        page = NO_CACHE,
    )
}
