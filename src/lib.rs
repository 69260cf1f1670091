//! lupack - dependency manager and incremental bundler for Lua game maps
//!
//! lupack resolves a project's declared dependency graph, fetches sources
//! from hosting providers, and concatenates them deterministically into a
//! marker-delimited generated block inside the user-owned target script.
//! A watch mode keeps the target in sync with source and config changes.

pub mod bundler;
pub mod busy;
pub mod dependency;
pub mod error;
pub mod fetch;
pub mod fs;
pub mod loader;
pub mod lock;
pub mod manifest;
pub mod providers;
pub mod resolver;
pub mod ui;
pub mod watcher;

// Re-exports for convenience
pub use bundler::{Bundler, BLOCK_END, BLOCK_START, REBUILD_KEY};
pub use busy::BusyState;
pub use dependency::{generate_id, Dependency, DependencyKind};
pub use error::{LupackError, LupackResult};
pub use fetch::Downloader;
pub use manifest::{Manifest, DEFAULT_TARGET, MANIFEST_NAME};
pub use providers::{Provider, ProviderRegistry};
pub use resolver::{PackageManager, PACKAGE_DIR};
pub use watcher::watch;
