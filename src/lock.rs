//! Persisted lock state (`.lupack/state.lock.json`)
//!
//! Records the last successfully resolved dependency set in first-resolved
//! order. It is the source of truth for "is a re-fetch needed" and for
//! assembly ordering without re-downloading.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::dependency::Dependency;
use crate::error::{LupackError, LupackResult};

/// Lock file name inside the package work directory.
pub const LOCK_NAME: &str = "state.lock.json";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LockedEntry<'a> {
    resource: &'a str,
    #[serde(rename = "type")]
    kind: crate::dependency::DependencyKind,
    version: &'a str,
    top_order: bool,
    sources: &'a [String],
}

/// The adopted lock state: dependencies in first-resolved order.
#[derive(Debug, Default)]
pub struct LockState {
    pub dependencies: Vec<Dependency>,
}

impl LockState {
    /// Load the lock state; `None` when no lock has been written yet.
    pub fn load(path: &Path) -> LupackResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let value: Value =
            serde_json::from_str(&content).map_err(|e| LupackError::LockParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let Some(entries) = value.get("dependencies").and_then(Value::as_object) else {
            return Err(LupackError::LockParse {
                path: path.to_path_buf(),
                message: "'dependencies' must be an object".to_string(),
            });
        };

        let mut dependencies = Vec::with_capacity(entries.len());
        for (id, entry) in entries {
            dependencies.push(Dependency::from_entry(id, entry, LOCK_NAME)?);
        }
        Ok(Some(Self { dependencies }))
    }

    /// Rewrite the lock wholesale from the resolved working set, iterating
    /// the order index so the persisted object keeps resolution order.
    pub fn save(
        path: &Path,
        order: &[String],
        dependencies: &HashMap<String, Dependency>,
    ) -> LupackResult<()> {
        let mut entries = serde_json::Map::with_capacity(order.len());
        for id in order {
            let dep = dependencies
                .get(id)
                .ok_or_else(|| LupackError::IndexOutOfSync { id: id.clone() })?;
            let entry = LockedEntry {
                resource: dep.resource(),
                kind: dep.kind(),
                version: dep.version(),
                top_order: dep.top_order(),
                sources: dep.sources(),
            };
            entries.insert(id.clone(), serde_json::to_value(entry)?);
        }

        let mut root = serde_json::Map::with_capacity(1);
        root.insert("dependencies".to_string(), Value::Object(entries));
        let content = serde_json::to_string_pretty(&Value::Object(root))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
