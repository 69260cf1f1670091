//! Project manifest (`lupack.json`)
//!
//! User-authored configuration, loaded fresh on every resolution pass. The
//! only in-place mutation ever performed is the textual insertion of a newly
//! installed dependency, which preserves the user's formatting.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::dependency::Dependency;
use crate::error::{LupackError, LupackResult};

/// Manifest file name, for the project and for fetched packages alike.
pub const MANIFEST_NAME: &str = "lupack.json";

/// Default target file the generated block is injected into.
pub const DEFAULT_TARGET: &str = "war3map.lua";

/// Default glob for collecting source files.
pub const DEFAULT_SOURCE_EXTENSIONS: &str = "*.lua";

const DEFAULT_MANIFEST: &str = "{\n  \"title\": \"project\",\n  \"dependencies\": {}\n}\n";

const READ_ATTEMPTS: u32 = 3;
const READ_DELAY: Duration = Duration::from_millis(1000);

/// Parsed project (or fetched package) manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub title: String,
    pub author: String,
    pub license: String,
    pub dependencies: Vec<Dependency>,
    pub sources: Vec<String>,
    pub target: String,
    pub after_build: String,
    pub insert_module_loader: bool,
    pub allow_hosts: Vec<String>,
    pub source_extensions: String,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            title: "project".to_string(),
            author: String::new(),
            license: String::new(),
            dependencies: Vec::new(),
            sources: Vec::new(),
            target: DEFAULT_TARGET.to_string(),
            after_build: String::new(),
            insert_module_loader: true,
            allow_hosts: Vec::new(),
            source_extensions: DEFAULT_SOURCE_EXTENSIONS.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    dependencies: serde_json::Map<String, Value>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    after_build: Option<String>,
    #[serde(default)]
    insert_module_loader: Option<bool>,
    #[serde(default)]
    allow_hosts: Vec<String>,
    #[serde(default)]
    source_extensions: Option<String>,
}

impl Manifest {
    /// Parse a manifest, collecting non-fatal warnings for unknown keys.
    /// `label` names the manifest in error messages: the file name for the
    /// project manifest, the resource for a fetched package.
    pub fn parse(json: &str, label: &str) -> LupackResult<(Self, Vec<String>)> {
        let mut unknown: Vec<String> = Vec::new();
        let mut de = serde_json::Deserializer::from_str(json);
        let raw: RawManifest = serde_ignored::deserialize(&mut de, |path| {
            unknown.push(path.to_string());
        })
        .map_err(|e| LupackError::ManifestParse {
            package: label.to_string(),
            message: e.to_string(),
        })?;

        let mut manifest = Manifest::default();
        if let Some(title) = raw.title {
            manifest.title = title;
        }
        if let Some(author) = raw.author {
            manifest.author = author;
        }
        if let Some(license) = raw.license {
            manifest.license = license;
        }
        if let Some(target) = raw.target {
            manifest.target = target;
        }
        if let Some(after_build) = raw.after_build {
            manifest.after_build = after_build;
        }
        if let Some(insert) = raw.insert_module_loader {
            manifest.insert_module_loader = insert;
        }
        if let Some(extensions) = raw.source_extensions {
            manifest.source_extensions = extensions;
        }
        manifest.sources = raw.sources;
        manifest.allow_hosts = raw.allow_hosts;

        for (name, value) in &raw.dependencies {
            manifest
                .dependencies
                .push(Dependency::from_entry(name, value, &manifest.title)?);
        }

        let warnings = unknown
            .into_iter()
            .map(|key| format!("unknown key '{key}' in {label}"))
            .collect();
        Ok((manifest, warnings))
    }

    /// Load the project manifest, writing the default skeleton first if the
    /// file does not exist yet.
    pub fn load_or_create(project_dir: &Path) -> LupackResult<(Self, Vec<String>)> {
        let path = project_dir.join(MANIFEST_NAME);
        if !path.exists() {
            std::fs::write(&path, DEFAULT_MANIFEST)?;
        }
        let content = crate::fs::read_with_retry(&path, READ_ATTEMPTS, READ_DELAY)?;
        Self::parse(&content, MANIFEST_NAME)
    }

    pub fn path(project_dir: &Path) -> PathBuf {
        project_dir.join(MANIFEST_NAME)
    }
}

/// Textually insert a new dependency entry into the manifest, right after
/// the opening brace of the dependency block; the block is synthesized when
/// absent. Everything the user wrote stays byte-for-byte intact.
pub fn insert_dependency_entry(path: &Path, resource: &str, version: &str) -> LupackResult<()> {
    let text = crate::fs::read_with_retry(path, READ_ATTEMPTS, READ_DELAY)?;
    let updated = insert_entry_text(&text, resource, version);
    std::fs::write(path, updated)?;
    Ok(())
}

fn insert_entry_text(text: &str, resource: &str, version: &str) -> String {
    let version = if version.is_empty() { "*" } else { version };
    let entry = format!("\"{resource}\": \"{version}\"");

    if let Some(dep_pos) = text.find("\"dependencies\"") {
        if let Some(brace_rel) = text[dep_pos..].find('{') {
            let brace = dep_pos + brace_rel;
            let rest = &text[brace + 1..];
            let insertion = if rest.trim_start().starts_with('}') {
                format!("\n        {entry}\n    ")
            } else {
                format!("\n        {entry},")
            };
            return format!("{}{}{}", &text[..brace + 1], insertion, rest);
        }
    }

    if let Some(brace) = text.find('{') {
        let rest = &text[brace + 1..];
        let block = if rest.trim_start().starts_with('}') {
            format!("\n    \"dependencies\": {{\n        {entry}\n    }}\n")
        } else {
            format!("\n    \"dependencies\": {{\n        {entry}\n    }},")
        };
        return format!("{}{}{}", &text[..brace + 1], block, rest);
    }

    format!("{{\n    \"dependencies\": {{\n        {entry}\n    }}\n}}\n")
}
