//! Shared helpers for integration tests: an isolated temp project, a
//! fixture-backed downloader and a test hosting provider, so no test ever
//! touches the network.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use lupack::bundler::Bundler;
use lupack::fetch::Downloader;
use lupack::providers::{Provider, ProviderRegistry};
use lupack::resolver::PackageManager;
use lupack::{LupackError, LupackResult};

/// Serves fixture bytes by URL and records every fetch.
pub struct FixtureDownloader {
    files: HashMap<String, Vec<u8>>,
    pub fetched: Arc<Mutex<Vec<String>>>,
}

impl FixtureDownloader {
    pub fn new(files: HashMap<String, Vec<u8>>) -> (Self, Arc<Mutex<Vec<String>>>) {
        let fetched = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                files,
                fetched: fetched.clone(),
            },
            fetched,
        )
    }
}

impl Downloader for FixtureDownloader {
    fn fetch(&self, url: &str, dest: &Path) -> LupackResult<()> {
        self.fetched.lock().unwrap().push(url.to_string());
        let Some(bytes) = self.files.get(url) else {
            return Err(LupackError::Download {
                url: url.to_string(),
                message: "no such fixture".to_string(),
            });
        };
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, bytes)?;
        Ok(())
    }
}

/// Provider for the fictional `test.dev` host; archive URLs are
/// `<resource>/zip/<version>`.
pub struct TestHost;

impl Provider for TestHost {
    fn identify(&self, url: &str) -> bool {
        url.contains("test.dev")
    }

    fn zip_url(&self, url: &str, version: &str) -> String {
        format!("{url}/zip/{version}")
    }
}

/// A repository archive the way hosting providers build them: everything
/// wrapped in one synthetic top-level directory.
pub fn package_zip(manifest_json: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        writer
            .start_file("repo-head/lupack.json", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(manifest_json.as_bytes()).unwrap();
        for (name, content) in files {
            writer
                .start_file(format!("repo-head/{name}"), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// Isolated project directory plus a resolver wired to fixtures.
pub struct TestProject {
    pub dir: TempDir,
    pub pm: Arc<Mutex<PackageManager>>,
    pub bundler: Arc<Bundler>,
    pub fetched: Arc<Mutex<Vec<String>>>,
}

impl TestProject {
    pub fn new(manifest_json: &str, fixtures: HashMap<String, Vec<u8>>) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lupack.json"), manifest_json).unwrap();

        let (downloader, fetched) = FixtureDownloader::new(fixtures);
        let mut providers = ProviderRegistry::empty();
        providers.register(Box::new(TestHost));

        let pm = PackageManager::with_collaborators(
            dir.path(),
            false,
            providers,
            Box::new(downloader),
        );
        Self {
            dir,
            pm: Arc::new(Mutex::new(pm)),
            bundler: Arc::new(Bundler::new(false, "0.0.0-test")),
            fetched,
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn target_content(&self) -> String {
        std::fs::read_to_string(self.path("war3map.lua")).unwrap()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

/// Target content with the build-timestamp line masked out, for idempotence
/// comparisons.
pub fn without_timestamp(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.starts_with("-- Build time: "))
        .collect::<Vec<_>>()
        .join("\n")
}
