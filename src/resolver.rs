//! Dependency resolver and lock-state engine
//!
//! Computes the working dependency set from the declared manifest plus the
//! persisted lock state, re-fetching recursively (with cycle protection)
//! only when the two disagree. The working set is a mapping plus an explicit
//! order index: mapping iteration order is not resolution order, and the
//! bundler must never iterate the mapping directly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::busy::{lock_unpoisoned, BusyState};
use crate::dependency::{self, Dependency, DependencyKind, MAX_RESOLVE_DEPTH};
use crate::error::{LupackError, LupackResult};
use crate::fetch::{extract_zip, Downloader, HttpDownloader};
use crate::lock::{LockState, LOCK_NAME};
use crate::manifest::{self, Manifest, MANIFEST_NAME};
use crate::providers::{host_of, ProviderRegistry};
use crate::ui;

/// Tool-owned work directory inside the project root.
pub const PACKAGE_DIR: &str = ".lupack";

/// Coordinator key for refresh triggers.
pub const REFRESH_KEY: &str = "refresh";

const ARCHIVE_NAME: &str = "lupack-repository.zip";

/// Owns the project's dependency working set and the lock state.
pub struct PackageManager {
    project_dir: PathBuf,
    verbose: bool,
    manifest: Option<Manifest>,
    dependencies: HashMap<String, Dependency>,
    order: Vec<String>,
    busy: Arc<BusyState>,
    providers: ProviderRegistry,
    downloader: Box<dyn Downloader>,
}

impl PackageManager {
    pub fn new(project_dir: &Path, verbose: bool) -> Self {
        Self::with_collaborators(
            project_dir,
            verbose,
            ProviderRegistry::with_defaults(),
            Box::new(HttpDownloader::new()),
        )
    }

    /// Construct with explicit collaborators; used by tests to avoid the
    /// network.
    pub fn with_collaborators(
        project_dir: &Path,
        verbose: bool,
        providers: ProviderRegistry,
        downloader: Box<dyn Downloader>,
    ) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            verbose,
            manifest: None,
            dependencies: HashMap::new(),
            order: Vec::new(),
            busy: Arc::new(BusyState::new()),
            providers,
            downloader,
        }
    }

    pub fn busy(&self) -> Arc<BusyState> {
        self.busy.clone()
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn manifest(&self) -> LupackResult<&Manifest> {
        self.manifest.as_ref().ok_or(LupackError::ManifestNotLoaded)
    }

    /// Resolved working set; iterate via [`Self::order`], never the mapping.
    pub fn dependencies(&self) -> &HashMap<String, Dependency> {
        &self.dependencies
    }

    /// Resolution-order index over the working set.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn dependency_dir(&self, dep: &Dependency) -> PathBuf {
        self.project_dir
            .join(PACKAGE_DIR)
            .join("packages")
            .join(dep.id())
    }

    pub fn dependency_file(&self, dep: &Dependency) -> PathBuf {
        self.dependency_dir(dep).join("src").join("file.lua")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.project_dir.join(PACKAGE_DIR).join(LOCK_NAME)
    }

    fn tmp_dir(&self) -> PathBuf {
        self.project_dir.join(PACKAGE_DIR).join("tmp")
    }

    /// Drop all loaded state; the next refresh starts from disk.
    pub fn clear(&mut self) {
        self.manifest = None;
        self.dependencies.clear();
        self.order.clear();
    }

    /// Bring the working set in sync with the manifest and lock state.
    ///
    /// Without `force_reload`, the lock state is adopted as-is and compared
    /// against the declared dependencies; any mismatch escalates to a full
    /// re-resolution. With `never_reload`, the comparison still runs but no
    /// re-fetch happens (used while preparing an install).
    pub fn refresh(&mut self, force_reload: bool, never_reload: bool) -> LupackResult<()> {
        ui::banner(if force_reload {
            "Refreshing Dependencies"
        } else {
            "Locating Dependencies"
        });

        let old_declared: Vec<(String, String)> = self
            .manifest
            .as_ref()
            .map(|m| {
                m.dependencies
                    .iter()
                    .map(|d| (d.id().to_string(), d.resource().to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let (loaded, warnings) = Manifest::load_or_create(&self.project_dir)?;
        for warning in &warnings {
            ui::warn(warning);
        }
        self.manifest = Some(loaded);
        self.ensure_package_dir()?;

        if self.verbose {
            ui::detail("-- Loading state lock file");
        }
        let lock = LockState::load(&self.lock_path())?;

        let mut force = force_reload;
        if !force {
            match lock {
                None => force = true,
                Some(lock) => {
                    self.dependencies.clear();
                    self.order.clear();
                    for dep in lock.dependencies {
                        self.order.push(dep.id().to_string());
                        self.dependencies.insert(dep.id().to_string(), dep);
                    }
                    let manifest = self.manifest.as_ref().ok_or(LupackError::ManifestNotLoaded)?;
                    force = needs_reload(manifest, &self.dependencies, &old_declared);
                }
            }
        }

        if force && !never_reload {
            self.update_packages()?;
        }

        ui::banner("Refreshing DONE");
        Ok(())
    }

    /// Append a dependency to the manifest and force a refresh. An entry
    /// whose id already exists is reported, not fatal.
    pub fn install_dependency(&mut self, resource: &str, version: &str) -> LupackResult<()> {
        let version = if version.is_empty() { "*" } else { version };
        dependency::validate_version(resource, version)?;

        let id = dependency::generate_id(resource, version);
        if self.dependencies.contains_key(&id) {
            ui::warn("This dependency already exists");
            return Ok(());
        }

        manifest::insert_dependency_entry(&Manifest::path(&self.project_dir), resource, version)?;
        self.refresh(true, false)
    }

    /// Full re-resolution: clear the working set, resolve every declared
    /// dependency recursively and persist the result as the new lock state.
    fn update_packages(&mut self) -> LupackResult<()> {
        let tmp = self.tmp_dir();
        if tmp.exists() {
            std::fs::remove_dir_all(&tmp)?;
        }
        std::fs::create_dir_all(&tmp)?;

        self.dependencies.clear();
        self.order.clear();

        let declared = self.manifest()?.dependencies.clone();
        for dep in declared {
            self.load_dependency(dep, 0)?;
        }

        LockState::save(&self.lock_path(), &self.order, &self.dependencies)
    }

    fn load_dependency(&mut self, mut dep: Dependency, depth: u32) -> LupackResult<()> {
        if depth > MAX_RESOLVE_DEPTH {
            return Err(LupackError::DependencyLoop {
                resource: dep.resource().to_string(),
            });
        }

        let tmp = self.tmp_dir();
        if tmp.exists() {
            std::fs::remove_dir_all(&tmp)?;
        }
        std::fs::create_dir_all(&tmp)?;

        let package = self.download_dependency(&dep, &tmp)?;
        for transitive in package.dependencies {
            // A package listing itself is skipped; anything already resolved
            // is not fetched twice.
            if !transitive.same_as(&dep) && !self.dependencies.contains_key(transitive.id()) {
                self.load_dependency(transitive, depth + 1)?;
            }
        }

        dep.set_sources(package.sources);
        if !self.dependencies.contains_key(dep.id()) {
            self.order.push(dep.id().to_string());
            self.dependencies.insert(dep.id().to_string(), dep);
        }
        Ok(())
    }

    /// Fetch one dependency into its package directory and return the
    /// manifest describing what it contributes.
    fn download_dependency(&self, dep: &Dependency, tmp_root: &Path) -> LupackResult<Manifest> {
        let dir = self.dependency_dir(dep);
        let provider = self.providers.find(dep.resource());

        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }

        let what = match dep.kind() {
            DependencyKind::File => "file",
            DependencyKind::Package => "repository",
        };
        ui::step(&format!("Downloading {what}: "), dep.resource());

        match dep.kind() {
            DependencyKind::File => {
                let allow_hosts = &self.manifest()?.allow_hosts;
                let host = host_of(dep.resource());
                let allowed = provider.is_some()
                    || host
                        .as_deref()
                        .map(|h| allow_hosts.iter().any(|a| a.eq_ignore_ascii_case(h)))
                        .unwrap_or(false);
                if dep.resource().is_empty() || !allowed {
                    return Err(LupackError::HostNotAllowed {
                        resource: dep.resource().to_string(),
                        host: host.unwrap_or_default(),
                    });
                }

                self.downloader.fetch(dep.resource(), &self.dependency_file(dep))?;

                let mut result = Manifest::default();
                result.title = file_stem_of(dep.resource());
                result.sources = vec!["src".to_string()];
                Ok(result)
            }
            DependencyKind::Package => {
                let Some(provider) = provider else {
                    return Err(LupackError::NoProvider {
                        resource: dep.resource().to_string(),
                    });
                };

                let archive = tmp_root.join(ARCHIVE_NAME);
                let url = provider.zip_url(dep.resource(), dep.version());
                self.downloader.fetch(&url, &archive)?;
                if self.verbose {
                    ui::detail(&format!("-- From {url}"));
                    ui::detail("-- Unzipping");
                }
                extract_zip(&archive, &dir, true)?;
                let _ = std::fs::remove_file(&archive);

                let manifest_path = dir.join(MANIFEST_NAME);
                if !manifest_path.exists() {
                    return Err(LupackError::ManifestMissing {
                        resource: dep.resource().to_string(),
                        file: MANIFEST_NAME.to_string(),
                    });
                }
                let content = std::fs::read_to_string(&manifest_path)?;
                let (package, _warnings) = Manifest::parse(&content, dep.resource())?;
                Ok(package)
            }
        }
    }

    fn ensure_package_dir(&self) -> LupackResult<()> {
        if self.verbose {
            ui::detail("-- Refreshing package dir");
        }
        let packages = self.project_dir.join(PACKAGE_DIR).join("packages");
        if !packages.exists() {
            std::fs::create_dir_all(&packages)?;
        }
        Ok(())
    }
}

/// Whether the adopted lock set disagrees with the declarations: a declared
/// dependency missing from the lock, or a dependency declared on the
/// previous pass that has since been removed or never got locked.
fn needs_reload(
    manifest: &Manifest,
    lockset: &HashMap<String, Dependency>,
    old_declared: &[(String, String)],
) -> bool {
    for (old_id, old_resource) in old_declared {
        if !manifest.dependencies.iter().any(|d| d.id() == old_id.as_str()) {
            ui::note(&format!("Dependency removed: {old_resource}"));
            return true;
        }
        if !lockset.contains_key(old_id) {
            return true;
        }
    }
    for dep in &manifest.dependencies {
        if !lockset.contains_key(dep.id()) {
            ui::note(&format!(
                "New dependency found: {} {}",
                dep.resource(),
                dep.version()
            ));
            return true;
        }
    }
    false
}

fn file_stem_of(url: &str) -> String {
    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url);
    name.rsplit_once('.').map_or(name, |(stem, _)| stem).to_string()
}

/// Run a refresh while holding the resolver's busy flag for the critical
/// section; queued handlers drain once the flag clears, after the resolver
/// lock is released.
pub fn refresh_now(
    pm: &Arc<Mutex<PackageManager>>,
    force_reload: bool,
    never_reload: bool,
) -> LupackResult<()> {
    let busy = lock_unpoisoned(pm).busy();
    let _guard = busy.enter();
    let result = lock_unpoisoned(pm).refresh(force_reload, never_reload);
    result
}

/// Install under the busy flag, same discipline as [`refresh_now`].
pub fn install_now(
    pm: &Arc<Mutex<PackageManager>>,
    resource: &str,
    version: &str,
) -> LupackResult<()> {
    let busy = lock_unpoisoned(pm).busy();
    let _guard = busy.enter();
    let result = lock_unpoisoned(pm).install_dependency(resource, version);
    result
}

/// Queue a refresh on the resolver's coordinator: runs now when idle,
/// coalesces with any pending refresh otherwise. Errors abort only this
/// trigger; `then` runs after a successful refresh.
pub fn refresh_asap(pm: &Arc<Mutex<PackageManager>>, then: impl FnOnce() + Send + 'static) {
    let busy = lock_unpoisoned(pm).busy();
    let pm = pm.clone();
    let section = busy.clone();
    busy.invoke_asap(REFRESH_KEY, move || {
        let result = {
            let _guard = section.enter();
            let result = lock_unpoisoned(&pm).refresh(false, false);
            result
        };
        match result {
            Ok(()) => then(),
            Err(e) => ui::error(&format!("Refresh failed: {e}")),
        }
    });
}
