//! Dependency declarations
//!
//! A dependency is declared in the project manifest either as
//! `"<resource>": "<version>"` or as an object with explicit fields. Its
//! identity is a deterministic, filesystem-safe slug derived from the
//! resource and version.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LupackError, LupackResult};

/// Maximum recursive resolution depth; exceeding it is a cycle error.
pub const MAX_RESOLVE_DEPTH: u32 = 512;

/// What a resource locator points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// A single raw source file.
    File,
    /// A full repository carrying its own manifest.
    Package,
}

/// One declared dependency, plus the source sub-paths it contributed once
/// resolved.
#[derive(Debug, Clone)]
pub struct Dependency {
    resource: String,
    kind: DependencyKind,
    version: String,
    top_order: bool,
    sources: Vec<String>,
    id: String,
}

impl Dependency {
    pub fn new(
        kind: DependencyKind,
        resource: &str,
        version: &str,
        top_order: bool,
    ) -> LupackResult<Self> {
        let resource = resource.trim().to_string();
        validate_version(&resource, version)?;
        let id = generate_id(&resource, version);
        Ok(Self {
            resource,
            kind,
            version: version.to_string(),
            top_order,
            sources: Vec::new(),
            id,
        })
    }

    /// Build a dependency from one manifest (or lock state) entry. `name` is
    /// the map key: the resource for manifest entries, the id for lock
    /// entries (which carry the resource as an explicit field).
    pub fn from_entry(name: &str, value: &Value, package: &str) -> LupackResult<Self> {
        match value {
            Value::String(version) => Self::new(DependencyKind::Package, name, version, false),
            Value::Object(fields) => {
                let resource = match fields.get("resource") {
                    Some(Value::String(r)) => r.as_str(),
                    _ => name,
                };
                let version = match fields.get("version") {
                    Some(Value::String(v)) => v.as_str(),
                    _ => "*",
                };
                let kind = match fields.get("type") {
                    Some(Value::String(t)) if t == "file" => DependencyKind::File,
                    Some(Value::String(t)) if t == "package" => DependencyKind::Package,
                    None => DependencyKind::Package,
                    _ => {
                        return Err(LupackError::ManifestParse {
                            package: package.to_string(),
                            message: format!(
                                "the value of 'dependencies.{resource}.type' must be 'file' or 'package'"
                            ),
                        })
                    }
                };
                let top_order = matches!(fields.get("topOrder"), Some(Value::Bool(true)));
                let mut dep = Self::new(kind, resource, version, top_order)?;
                if let Some(Value::Array(sources)) = fields.get("sources") {
                    dep.sources = sources
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                }
                Ok(dep)
            }
            _ => Err(LupackError::ManifestParse {
                package: package.to_string(),
                message: format!(
                    "the value of 'dependencies.{name}' must be a string or an object"
                ),
            }),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn kind(&self) -> DependencyKind {
        self.kind
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn top_order(&self) -> bool {
        self.top_order
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn set_sources(&mut self, sources: Vec<String>) {
        self.sources = sources;
    }

    /// Two declarations are duplicates iff resource, kind, version and
    /// topOrder all match; contributed sources do not take part.
    pub fn same_as(&self, other: &Dependency) -> bool {
        self.resource == other.resource
            && self.kind == other.kind
            && self.version == other.version
            && self.top_order == other.top_order
    }
}

/// Version selectors are `*` (head revision) or an exact tag. Partial
/// wildcards and range operators are rejected before they can reach the
/// lock state.
pub fn validate_version(resource: &str, version: &str) -> LupackResult<()> {
    let partial_wildcard = version.contains('*') && version.len() > 1;
    if partial_wildcard || version.contains('^') || version.contains('+') {
        return Err(LupackError::VersionSyntax {
            resource: resource.to_string(),
        });
    }
    Ok(())
}

/// Derive the filesystem-safe dependency id from resource and version.
///
/// Dots become underscores before the scheme is stripped, path separators
/// become dots, and the remaining reserved characters collapse to
/// underscores. A trailing dot gets an underscore appended so the slug never
/// ends in a path separator stand-in.
pub fn generate_id(resource: &str, version: &str) -> String {
    let joined = format!("{resource}--{version}");
    let mut id: String = joined
        .replace('.', "_")
        .replace("https", "")
        .replace("http", "")
        .replace("://", "")
        .replace('/', ".")
        .chars()
        .map(|c| match c {
            '>' | '<' | ':' | '\\' | '|' | '?' | '*' | '\t' | ' ' | '\0' => '_',
            c => c,
        })
        .collect();
    if id.ends_with('.') {
        id.push('_');
    }
    id
}
