//! Development-mode watch loop.
//!
//! ```text
//! notify events ──▶ Debouncer ──(quiet for debounce_ms)──▶ Pipeline::apply_changes
//! ```
//!
//! Bursts of events are coalesced per path: a file saved five times in
//! quick succession is re-rendered once, from whatever is on disk when the
//! quiet period ends. Editor swap and backup files never reach the pipeline.

use crate::error::BuildError;
use crate::output;
use crate::pipeline::Pipeline;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

/// Upper bound on how long the loop blocks before re-checking the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

// =============================================================================
// Event filtering
// =============================================================================

/// Editor artifacts: swap files, backups, dotfiles.
pub fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bak" | "swp" | "swo" | "swx" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
        || name.starts_with('#')
}

fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Debouncer
// =============================================================================

/// Collects changed paths until no new event has arrived for `window`.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: BTreeSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeSet::new(),
            last_event: None,
        }
    }

    pub fn add(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.add_at(paths, Instant::now());
    }

    fn add_at(&mut self, paths: impl IntoIterator<Item = PathBuf>, at: Instant) {
        self.pending
            .extend(paths.into_iter().filter(|p| !is_temp_file(p)));
        self.last_event = Some(at);
    }

    pub fn ready(&self) -> bool {
        self.ready_at(Instant::now())
    }

    fn ready_at(&self, now: Instant) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| now.duration_since(t) >= self.window)
    }

    /// Drain the batch, sorted and deduplicated.
    pub fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// How long to wait for the next event.
    pub fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            POLL_INTERVAL
        } else {
            self.window.min(POLL_INTERVAL)
        }
    }
}

// =============================================================================
// Loop
// =============================================================================

/// Watch the content, layout and asset roots and apply changes until the
/// pipeline's cancel flag is raised.
///
/// Page failures and layout compile errors are reported and the loop keeps
/// running; only watcher setup failures end it with an error.
pub fn watch(pipeline: &mut Pipeline) -> Result<(), BuildError> {
    let ctx = pipeline.context().clone();
    let stop = pipeline.cancel_flag();

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx)?;
    for root in [&ctx.content_root, &ctx.layout_root, &ctx.asset_root] {
        if root.exists() {
            watcher.watch(root, RecursiveMode::Recursive)?;
            tracing::info!(path = %root.display(), "watching");
        }
    }

    let mut debouncer = Debouncer::new(Duration::from_millis(ctx.debounce_ms));
    while !stop.load(Ordering::SeqCst) {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => debouncer.add(event.paths),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("watch error: {e}"),
            Err(RecvTimeoutError::Timeout) if debouncer.ready() => {
                let batch = debouncer.take();
                tracing::debug!(paths = batch.len(), "change batch");
                match pipeline.apply_changes(&batch) {
                    Ok(report) if !report.is_empty() => {
                        output::print_rebuild_report(&report);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("rebuild failed: {e}"),
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::info!("watcher stopped");
    Ok(())
}
