//! Download and archive collaborators
//!
//! The resolver fetches dependency sources through the `Downloader` trait so
//! tests can substitute a local implementation. Hosting providers wrap
//! repository contents in one synthetic top-level directory inside their
//! archives; extraction can unwrap it.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use zip::ZipArchive;

use crate::error::{LupackError, LupackResult};

/// Fetches a URL to a file on disk.
pub trait Downloader: Send {
    fn fetch(&self, url: &str, dest: &Path) -> LupackResult<()>;
}

/// Blocking HTTP(S) downloader.
pub struct HttpDownloader {
    timeout: Duration,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, url: &str, dest: &Path) -> LupackResult<()> {
        let download_err = |message: String| LupackError::Download {
            url: url.to_string(),
            message,
        };

        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("lupack/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()
            .map_err(|e| download_err(e.to_string()))?;

        let response = client
            .get(url)
            .send()
            .map_err(|e| download_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_err(format!("HTTP {}", response.status())));
        }
        let bytes = response.bytes().map_err(|e| download_err(e.to_string()))?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, &bytes)?;
        Ok(())
    }
}

/// Extract a zip archive into `dest`. With `unwrap_single_root`, a lone
/// top-level directory shared by every entry is dropped from the extracted
/// paths.
pub fn extract_zip(archive_path: &Path, dest: &Path, unwrap_single_root: bool) -> LupackResult<()> {
    let archive_err = |message: String| LupackError::Archive {
        path: archive_path.to_path_buf(),
        message,
    };

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| archive_err(e.to_string()))?;

    let root = if unwrap_single_root {
        single_root(&mut archive).map_err(|e| archive_err(e.to_string()))?
    } else {
        None
    };

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| archive_err(e.to_string()))?;
        let Some(name) = entry.enclosed_name() else {
            return Err(archive_err(format!("unsafe entry path: {}", entry.name())));
        };
        let relative: PathBuf = match &root {
            Some(root) => match name.strip_prefix(root) {
                Ok(stripped) => stripped.to_path_buf(),
                Err(_) => name.clone(),
            },
            None => name.clone(),
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let out = dest.join(&relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
        } else {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut output = File::create(&out)?;
            io::copy(&mut entry, &mut output)?;
        }
    }
    Ok(())
}

/// The single top-level directory shared by every entry, if there is one.
fn single_root<R: io::Read + io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Option<PathBuf>, zip::result::ZipError> {
    let mut root: Option<PathBuf> = None;
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        let Some(name) = entry.enclosed_name() else {
            continue;
        };
        let Some(Component::Normal(first)) = name.components().next() else {
            return Ok(None);
        };
        let first = PathBuf::from(first);
        match &root {
            None => root = Some(first),
            Some(existing) if *existing == first => {}
            Some(_) => return Ok(None),
        }
        // A file at the top level means there is nothing to unwrap.
        if name.components().count() == 1 && !entry.is_dir() {
            return Ok(None);
        }
    }
    Ok(root)
}
