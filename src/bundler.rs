//! Code assembler
//!
//! Produces the generated code block (ordered concatenation with markers)
//! and idempotently replaces it inside the target file. Everything the user
//! wrote outside the markers is preserved byte-for-byte.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use globset::Glob;
use ignore::WalkBuilder;

use crate::busy::{lock_unpoisoned, BusyState};
use crate::dependency::{Dependency, DependencyKind};
use crate::error::{LupackError, LupackResult};
use crate::loader;
use crate::manifest::MANIFEST_NAME;
use crate::resolver::PackageManager;
use crate::ui;

/// Start marker of the generated block inside the target file.
pub const BLOCK_START: &str = "-- (lupack-generated-code start)";

/// End marker; includes the trailing newline so stripping removes the whole
/// line.
pub const BLOCK_END: &str = "-- (lupack-generated-code end)\n";

/// Coordinator key for rebuild triggers.
pub const REBUILD_KEY: &str = "rebuild";

const IO_ATTEMPTS: u32 = 30;
const IO_DELAY: Duration = Duration::from_millis(200);

/// Assembles the generated block and keeps track of its own target writes
/// so the watcher can tell them apart from external edits.
pub struct Bundler {
    version: String,
    verbose: bool,
    busy: Arc<BusyState>,
    target_last_write: Mutex<Option<SystemTime>>,
}

impl Bundler {
    pub fn new(verbose: bool, version: &str) -> Self {
        Self {
            version: version.to_string(),
            verbose,
            busy: Arc::new(BusyState::new()),
            target_last_write: Mutex::new(None),
        }
    }

    pub fn busy(&self) -> Arc<BusyState> {
        self.busy.clone()
    }

    /// Forget the recorded target write time.
    pub fn clear(&self) {
        *lock_unpoisoned(&self.target_last_write) = None;
    }

    /// Whether the target's current write time differs from the one recorded
    /// after our own last write. True for files we never wrote.
    pub fn is_target_changed_outside(&self, target: &Path) -> bool {
        let recorded = *lock_unpoisoned(&self.target_last_write);
        let current = std::fs::metadata(target).and_then(|m| m.modified()).ok();
        match (recorded, current) {
            (Some(recorded), Some(current)) => recorded != current,
            _ => true,
        }
    }

    /// Regenerate the block inside the target file from the resolved
    /// dependency set and the local sources.
    fn assemble(&self, pm: &PackageManager) -> LupackResult<()> {
        ui::accent("Rebuilding modules");

        let manifest = pm.manifest()?;
        let target_path = pm.project_dir().join(&manifest.target);

        let original = crate::fs::read_with_retry(&target_path, IO_ATTEMPTS, IO_DELAY)?;
        let remainder = strip_generated(&original, &target_path)?;

        let mut header = String::new();
        header.push_str(&format!("\n\n-- Lua Package Manager {}", self.version));
        header.push_str(&format!(
            "\n-- Build time: {}",
            chrono::Local::now().format("%Y.%m.%d %H:%M:%S %z")
        ));
        if manifest.insert_module_loader {
            ui::note(&format!(
                "  Module loader added to the header. To disable, set \"insertModuleLoader\" to false in your {MANIFEST_NAME}"
            ));
            header.push('\n');
            header.push_str(loader::MODULE_LOADER);
        } else {
            ui::note(&format!(
                "  Module loader is skipped according to your {MANIFEST_NAME}"
            ));
        }
        header.push_str("\n\n");

        let mut top = String::new();
        let mut bottom = String::from("\n\n");
        for id in pm.order() {
            let dep = pm
                .dependencies()
                .get(id)
                .ok_or_else(|| LupackError::IndexOutOfSync { id: id.clone() })?;
            let code = self.code_for_dependency(pm, dep, &manifest.source_extensions)?;
            if dep.top_order() {
                top.push_str("\n\n");
                top.push_str(&code);
            } else {
                bottom.push_str("\n\n");
                bottom.push_str(&code);
            }
        }

        bottom.push_str(&self.code_for_sources(
            pm.project_dir(),
            &manifest.sources,
            &manifest.source_extensions,
        )?);

        let assembled = format!("{BLOCK_START}{header}{top}{bottom}\n{BLOCK_END}{remainder}");
        crate::fs::write_with_retry(&target_path, &assembled, IO_ATTEMPTS, IO_DELAY)?;

        // The write above will echo back as a watch event; drop the pending
        // re-trigger and remember the write time so the event is recognized
        // as ours.
        self.busy.unsubscribe(REBUILD_KEY);
        *lock_unpoisoned(&self.target_last_write) =
            std::fs::metadata(&target_path).and_then(|m| m.modified()).ok();

        self.run_after_build(pm.project_dir(), &manifest.after_build);
        Ok(())
    }

    /// One tagged sub-block: start tag, concatenated file contents, end tag.
    fn code_for_dependency(
        &self,
        pm: &PackageManager,
        dep: &Dependency,
        pattern: &str,
    ) -> LupackResult<String> {
        ui::step("  Building ", dep.resource());

        let mut out = format!("-- (lupack-start) {}\n", dep.resource());
        match dep.kind() {
            DependencyKind::Package => {
                let root = pm.dependency_dir(dep);
                for source in dep.sources() {
                    if self.verbose {
                        ui::detail(&format!("-- Generating code for source: {source}"));
                    }
                    for file in source_files(&root.join(source), pattern)? {
                        if self.verbose {
                            ui::detail(&format!("-- Loading code from: {}", file.display()));
                        }
                        out.push_str("\n\n");
                        out.push_str(&std::fs::read_to_string(&file)?);
                    }
                }
            }
            DependencyKind::File => {
                out.push_str(&std::fs::read_to_string(pm.dependency_file(dep))?);
            }
        }
        out.push_str(&format!("\n-- (lupack-end) {}", dep.resource()));
        Ok(out)
    }

    /// The project's own sources, appended after every dependency. Each file
    /// is preceded by a provenance comment naming it.
    fn code_for_sources(
        &self,
        project_dir: &Path,
        sources: &[String],
        pattern: &str,
    ) -> LupackResult<String> {
        let mut out = String::new();
        for source in sources {
            let dir = if Path::new(source).is_absolute() {
                PathBuf::from(source)
            } else {
                project_dir.join(source)
            };
            for file in source_files(&dir, pattern)? {
                ui::step("  Building source ", &file.display().to_string());
                let content =
                    crate::fs::read_with_retry(&file, IO_ATTEMPTS, IO_DELAY)?;
                out.push_str(&format!("\n\n-- {}\n{}", file.display(), content));
            }
        }
        Ok(out)
    }

    /// Post-build command, fire-and-forget: a failure never rolls back the
    /// target write.
    fn run_after_build(&self, project_dir: &Path, command: &str) {
        if command.is_empty() {
            return;
        }
        println!();
        ui::step("  Executing ", command);

        let output = if cfg!(windows) {
            Command::new("cmd").args(["/C", command]).current_dir(project_dir).output()
        } else {
            Command::new("sh").args(["-c", command]).current_dir(project_dir).output()
        };
        match output {
            Ok(output) => {
                print!("{}", String::from_utf8_lossy(&output.stdout));
                if !output.status.success() {
                    ui::warn(&format!(
                        "after-build command failed ({}): {}",
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim_end()
                    ));
                }
            }
            Err(e) => ui::warn(&format!("after-build command failed to start: {e}")),
        }
    }
}

/// Remove the previously generated block. No start marker means no block
/// yet; a start marker without an end marker is a corrupted or foreign file
/// and is never auto-repaired.
pub fn strip_generated(source: &str, path: &Path) -> LupackResult<String> {
    let Some(start) = source.find(BLOCK_START) else {
        return Ok(source.to_string());
    };
    let Some(end) = source[start..].find(BLOCK_END) else {
        return Err(LupackError::TargetEndMissing {
            path: path.to_path_buf(),
            marker: BLOCK_END.trim_end().to_string(),
        });
    };
    let end = start + end + BLOCK_END.len();
    Ok(format!("{}{}", &source[..start], &source[end..]))
}

/// Source files under `dir` matching the extension glob, depth-first and
/// sorted by path so assembly output is deterministic across filesystems.
fn source_files(dir: &Path, pattern: &str) -> LupackResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(LupackError::SourceDirMissing {
            path: dir.to_path_buf(),
        });
    }

    let matcher = Glob::new(pattern)
        .map_err(|e| LupackError::SourcePattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?
        .compile_matcher();

    let walk = WalkBuilder::new(dir)
        .standard_filters(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();

    let mut files = Vec::new();
    for entry in walk {
        let entry = entry.map_err(|e| {
            LupackError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        if matcher.is_match(relative) {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

/// Run a rebuild: the bundler's busy flag covers the critical section, and
/// the resolver lock is held only while assembling.
pub fn rebuild_now(bundler: &Arc<Bundler>, pm: &Arc<Mutex<PackageManager>>) -> LupackResult<()> {
    let _guard = bundler.busy.enter();
    let result = {
        let pm = lock_unpoisoned(pm);
        bundler.assemble(&pm)
    };
    result
}

/// Queue a rebuild through both coordinators: coalesced on the bundler's
/// queue while a build runs, and deferred on the resolver's queue while a
/// refresh runs. Errors abort only this trigger.
pub fn rebuild_asap(
    bundler: &Arc<Bundler>,
    pm: &Arc<Mutex<PackageManager>>,
    on_success: impl FnOnce() + Send + 'static,
) {
    let bundler = bundler.clone();
    let pm = pm.clone();
    let queue = bundler.busy();
    queue.invoke_asap(REBUILD_KEY, move || {
        let resolver_queue = lock_unpoisoned(&pm).busy();
        let bundler = bundler.clone();
        let pm = pm.clone();
        resolver_queue.invoke_asap(REBUILD_KEY, move || {
            match rebuild_now(&bundler, &pm) {
                Ok(()) => on_success(),
                Err(e) => ui::error(&format!("Rebuild failed: {e}")),
            }
        });
    });
}
