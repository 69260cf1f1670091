//! Change detection and watch orchestration
//!
//! Maps raw file-system events onto coordinator triggers: a config change
//! refreshes then rebuilds, a source or target change rebuilds. Editor
//! event bursts collapse in the coordinators; a rebuild's own target write
//! is recognized by its recorded write time and suppressed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use globset::{Glob, GlobMatcher};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::bundler::{self, Bundler};
use crate::busy::lock_unpoisoned;
use crate::error::{LupackError, LupackResult};
use crate::manifest::MANIFEST_NAME;
use crate::resolver::{self, PackageManager};
use crate::ui;

/// Poll interval for the shutdown flag while waiting for events.
const RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// Per-path last-write-time cache used to separate real changes from the
/// duplicate events editors emit for one logical save. The first sighting of
/// a path is cached but never counts as a change, so watcher startup does
/// not trigger a spurious rebuild.
#[derive(Default)]
struct ChangeCache {
    seen: HashMap<PathBuf, SystemTime>,
}

impl ChangeCache {
    fn is_really_changed(&mut self, path: &Path) -> bool {
        let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) else {
            // Deleted: a change if we ever saw it, and forgotten either way
            // so a re-created file starts a fresh history.
            return self.seen.remove(path).is_some();
        };
        match self.seen.insert(path.to_path_buf(), modified) {
            Some(previous) => previous < modified,
            None => false,
        }
    }
}

fn map_notify_err(e: notify::Error) -> LupackError {
    LupackError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        e.to_string(),
    ))
}

fn kind_label(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::Create(_) => "created",
        EventKind::Remove(_) => "deleted",
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => "renamed",
        _ => "changed",
    }
}

/// Watch the project and keep the target in sync until `running` clears.
pub fn watch(
    pm: Arc<Mutex<PackageManager>>,
    bundler: Arc<Bundler>,
    running: Arc<AtomicBool>,
) -> LupackResult<()> {
    let (project_dir, source_dirs, sources, target_path, pattern, verbose) = {
        let pm = lock_unpoisoned(&pm);
        let manifest = pm.manifest()?;
        let project_dir = pm.project_dir().to_path_buf();
        let source_dirs: Vec<PathBuf> = manifest
            .sources
            .iter()
            .map(|s| {
                if Path::new(s).is_absolute() {
                    PathBuf::from(s)
                } else {
                    project_dir.join(s)
                }
            })
            .collect();
        (
            project_dir.clone(),
            source_dirs,
            manifest.sources.clone(),
            project_dir.join(&manifest.target),
            manifest.source_extensions.clone(),
            pm.verbose(),
        )
    };
    let manifest_path = project_dir.join(MANIFEST_NAME);
    let matcher = Glob::new(&pattern)
        .map_err(|e| LupackError::SourcePattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?
        .compile_matcher();

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                let label = kind_label(&event.kind);
                for path in event.paths {
                    let _ = tx.send((path, label));
                }
            }
        },
        Config::default(),
    )
    .map_err(map_notify_err)?;

    for dir in &source_dirs {
        watcher
            .watch(dir, RecursiveMode::Recursive)
            .map_err(map_notify_err)?;
        if verbose {
            ui::detail(&format!("-- Watching {}", dir.display()));
        }
    }
    watcher
        .watch(&project_dir, RecursiveMode::NonRecursive)
        .map_err(map_notify_err)?;
    if let Some(target_parent) = target_path.parent() {
        if target_parent != project_dir {
            watcher
                .watch(target_parent, RecursiveMode::NonRecursive)
                .map_err(map_notify_err)?;
        }
    }

    ready_message(&sources, &target_path);

    let mut cache = ChangeCache::default();
    while running.load(Ordering::SeqCst) {
        let Ok((path, label)) = rx.recv_timeout(RECV_TIMEOUT) else {
            continue;
        };

        if path == manifest_path {
            if !cache.is_really_changed(&path) {
                continue;
            }
            ui::step(&format!("  Package config {label} "), MANIFEST_NAME);
            trigger_refresh(&pm, &bundler);
        } else if path == target_path {
            if !cache.is_really_changed(&path) || !bundler.is_target_changed_outside(&target_path)
            {
                continue;
            }
            ui::step(&format!("  Target {label} "), &path.display().to_string());
            trigger_rebuild(&pm, &bundler);
        } else if is_source_event(&path, &source_dirs, &matcher) {
            if !cache.is_really_changed(&path) {
                continue;
            }
            ui::step(&format!("  Source {label} "), &path.display().to_string());
            trigger_rebuild(&pm, &bundler);
        }
    }

    Ok(())
}

fn is_source_event(path: &Path, source_dirs: &[PathBuf], matcher: &GlobMatcher) -> bool {
    source_dirs.iter().any(|dir| {
        path.strip_prefix(dir)
            .map(|relative| matcher.is_match(relative))
            .unwrap_or(false)
    })
}

fn trigger_rebuild(pm: &Arc<Mutex<PackageManager>>, bundler: &Arc<Bundler>) {
    let sources = manifest_sources(pm);
    let target = manifest_target(pm);
    bundler::rebuild_asap(bundler, pm, move || {
        ready_message(&sources, &target);
    });
}

fn trigger_refresh(pm: &Arc<Mutex<PackageManager>>, bundler: &Arc<Bundler>) {
    let pm2 = pm.clone();
    let bundler = bundler.clone();
    resolver::refresh_asap(pm, move || {
        trigger_rebuild(&pm2, &bundler);
    });
}

fn manifest_sources(pm: &Arc<Mutex<PackageManager>>) -> Vec<String> {
    lock_unpoisoned(pm)
        .manifest()
        .map(|m| m.sources.clone())
        .unwrap_or_default()
}

fn manifest_target(pm: &Arc<Mutex<PackageManager>>) -> PathBuf {
    let pm = lock_unpoisoned(pm);
    let target = pm
        .manifest()
        .map(|m| m.target.clone())
        .unwrap_or_default();
    pm.project_dir().join(target)
}

fn ready_message(sources: &[String], target: &Path) {
    println!();
    ui::accent("Watching for changes:");
    ui::route(MANIFEST_NAME, "-> refresh packages");
    if !sources.is_empty() {
        ui::route(&sources.join(","), "-> rebuild modules");
    }
    ui::route(&target.display().to_string(), "-> rebuild modules");
    println!();
    ui::accent("Now you are free to work with your project. Press Ctrl+C to stop.");
    println!();
}
