//! Error types for lupack
//!
//! Uses `thiserror` for library errors; the binary wraps them in `anyhow`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for lupack operations
pub type LupackResult<T> = Result<T, LupackError>;

/// Main error type for lupack operations
#[derive(Error, Debug)]
pub enum LupackError {
    /// Unsupported version selector (anything other than `*` or an exact tag)
    #[error("package '{resource}' contains unsupported version syntax, use * or a fully qualified version tag")]
    VersionSyntax { resource: String },

    /// Malformed project or package manifest
    #[error("cannot parse \"{package}\" package: {message}")]
    ManifestParse { package: String, message: String },

    /// A fetched package did not contain a manifest file
    #[error("cannot resolve package: {resource}, file '{file}' not found inside")]
    ManifestMissing { resource: String, file: String },

    /// Project manifest has not been loaded yet
    #[error("project manifest is not loaded, run a refresh first")]
    ManifestNotLoaded,

    /// No registered repository provider identifies the resource URL
    #[error("cannot resolve package: {resource}, no suitable repository provider for this url")]
    NoProvider { resource: String },

    /// Raw-file dependency host is neither allow-listed nor provider-backed
    #[error("cannot resolve package: {resource}, wrong URL host for file type: '{host}'")]
    HostNotAllowed { resource: String, host: String },

    /// Recursive resolution exceeded the depth bound
    #[error("dependency loop detected while resolving '{resource}'")]
    DependencyLoop { resource: String },

    /// The dependency mapping and order index disagree
    #[error("dependency set has no entry '{id}' but the order index lists it, try 'lupack update'")]
    IndexOutOfSync { id: String },

    /// Generated-block start marker present without its end marker
    #[error("cannot clean target file {path}: end marker not found: {marker}")]
    TargetEndMissing { path: PathBuf, marker: String },

    /// A configured source directory does not exist
    #[error("source directory not found: {path}")]
    SourceDirMissing { path: PathBuf },

    /// The configured source-extension glob is invalid
    #[error("invalid source pattern '{pattern}': {message}")]
    SourcePattern { pattern: String, message: String },

    /// Bounded-retry file I/O gave up
    #[error("file still busy after {attempts} attempts: {path}: {message}")]
    RetriesExhausted {
        path: PathBuf,
        attempts: u32,
        message: String,
    },

    /// Malformed lock state
    #[error("invalid lock state in {path}: {message}")]
    LockParse { path: PathBuf, message: String },

    /// Download collaborator failure
    #[error("download failed for {url}: {message}")]
    Download { url: String, message: String },

    /// Archive collaborator failure
    #[error("cannot extract archive {path}: {message}")]
    Archive { path: PathBuf, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for LupackError {
    fn from(e: serde_json::Error) -> Self {
        LupackError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
