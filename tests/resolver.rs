//! Resolver and lock-state behavior against fixture-backed downloads.

mod common;

use std::collections::HashMap;

use common::{package_zip, TestProject};
use lupack::resolver;
use lupack::LupackError;

fn file_manifest(deps: &[(&str, &str)]) -> String {
    let entries: Vec<String> = deps
        .iter()
        .map(|(resource, extra)| format!(r#""{resource}": {{ "type": "file"{extra} }}"#))
        .collect();
    format!(
        r#"{{
    "title": "fixture-project",
    "sources": [],
    "allowHosts": ["files.test"],
    "dependencies": {{ {} }}
}}"#,
        entries.join(", ")
    )
}

#[test]
fn refresh_without_lock_resolves_and_persists() {
    let manifest = file_manifest(&[("https://files.test/a.lua", "")]);
    let fixtures = HashMap::from([(
        "https://files.test/a.lua".to_string(),
        b"print('a')".to_vec(),
    )]);
    let project = TestProject::new(&manifest, fixtures);

    resolver::refresh_now(&project.pm, false, false).unwrap();

    assert_eq!(project.fetch_count(), 1);
    let lock = std::fs::read_to_string(project.path(".lupack/state.lock.json")).unwrap();
    assert!(lock.contains("https://files.test/a.lua"));

    // A second pass adopts the lock without re-downloading.
    resolver::refresh_now(&project.pm, false, false).unwrap();
    assert_eq!(project.fetch_count(), 1);
}

#[test]
fn new_declaration_forces_full_re_resolution() {
    let fixtures = HashMap::from([
        (
            "https://files.test/a.lua".to_string(),
            b"print('a')".to_vec(),
        ),
        (
            "https://files.test/b.lua".to_string(),
            b"print('b')".to_vec(),
        ),
    ]);
    let manifest = file_manifest(&[("https://files.test/a.lua", "")]);
    let project = TestProject::new(&manifest, fixtures);

    resolver::refresh_now(&project.pm, false, false).unwrap();
    assert_eq!(project.fetch_count(), 1);

    // Declare a second dependency; its id is not in the lock state.
    let manifest = file_manifest(&[
        ("https://files.test/a.lua", ""),
        ("https://files.test/b.lua", ""),
    ]);
    std::fs::write(project.path("lupack.json"), manifest).unwrap();

    resolver::refresh_now(&project.pm, false, false).unwrap();
    // Conservative behavior: everything is re-fetched, not just the new one.
    assert_eq!(project.fetch_count(), 3);
    let lock = std::fs::read_to_string(project.path(".lupack/state.lock.json")).unwrap();
    assert!(lock.contains("b.lua"));
}

#[test]
fn removed_declaration_forces_full_re_resolution() {
    let fixtures = HashMap::from([
        (
            "https://files.test/a.lua".to_string(),
            b"print('a')".to_vec(),
        ),
        (
            "https://files.test/b.lua".to_string(),
            b"print('b')".to_vec(),
        ),
    ]);
    let manifest = file_manifest(&[
        ("https://files.test/a.lua", ""),
        ("https://files.test/b.lua", ""),
    ]);
    let project = TestProject::new(&manifest, fixtures);

    resolver::refresh_now(&project.pm, false, false).unwrap();
    assert_eq!(project.fetch_count(), 2);

    // Drop b from the declarations while the resolver instance still
    // remembers the previous pass.
    let manifest = file_manifest(&[("https://files.test/a.lua", "")]);
    std::fs::write(project.path("lupack.json"), manifest).unwrap();

    resolver::refresh_now(&project.pm, false, false).unwrap();
    assert_eq!(project.fetch_count(), 3);
    let lock = std::fs::read_to_string(project.path(".lupack/state.lock.json")).unwrap();
    assert!(!lock.contains("b.lua"));
}

#[test]
fn transitive_dependencies_resolve_before_their_dependent() {
    let leaf_zip = package_zip(
        r#"{ "title": "leaf", "sources": ["src"] }"#,
        &[("src/leaf.lua", "-- leaf")],
    );
    let root_zip = package_zip(
        r#"{
            "title": "root",
            "sources": ["src"],
            "dependencies": { "https://test.dev/leaf": "*" }
        }"#,
        &[("src/root.lua", "-- root")],
    );
    let fixtures = HashMap::from([
        ("https://test.dev/root/zip/*".to_string(), root_zip),
        ("https://test.dev/leaf/zip/*".to_string(), leaf_zip),
    ]);
    let manifest = r#"{
        "title": "p",
        "sources": [],
        "dependencies": { "https://test.dev/root": "*" }
    }"#;
    let project = TestProject::new(manifest, fixtures);

    resolver::refresh_now(&project.pm, false, false).unwrap();

    let pm = project.pm.lock().unwrap();
    let order = pm.order();
    assert_eq!(order.len(), 2);
    let first = pm.dependencies().get(&order[0]).unwrap();
    let second = pm.dependencies().get(&order[1]).unwrap();
    assert_eq!(first.resource(), "https://test.dev/leaf");
    assert_eq!(second.resource(), "https://test.dev/root");
    assert_eq!(second.sources(), ["src"]);
}

#[test]
fn dependency_cycle_fails_with_loop_error() {
    let a_zip = package_zip(
        r#"{ "title": "a", "sources": ["src"],
             "dependencies": { "https://test.dev/b": "*" } }"#,
        &[("src/a.lua", "-- a")],
    );
    let b_zip = package_zip(
        r#"{ "title": "b", "sources": ["src"],
             "dependencies": { "https://test.dev/a": "*" } }"#,
        &[("src/b.lua", "-- b")],
    );
    let fixtures = HashMap::from([
        ("https://test.dev/a/zip/*".to_string(), a_zip),
        ("https://test.dev/b/zip/*".to_string(), b_zip),
    ]);
    let manifest = r#"{
        "title": "p",
        "sources": [],
        "dependencies": { "https://test.dev/a": "*" }
    }"#;
    let project = TestProject::new(manifest, fixtures);

    let err = resolver::refresh_now(&project.pm, false, false).unwrap_err();
    assert!(matches!(err, LupackError::DependencyLoop { .. }));
}

#[test]
fn self_reference_is_skipped_not_a_cycle() {
    let a_zip = package_zip(
        r#"{ "title": "a", "sources": ["src"],
             "dependencies": { "https://test.dev/a": "*" } }"#,
        &[("src/a.lua", "-- a")],
    );
    let fixtures = HashMap::from([("https://test.dev/a/zip/*".to_string(), a_zip)]);
    let manifest = r#"{
        "title": "p",
        "sources": [],
        "dependencies": { "https://test.dev/a": "*" }
    }"#;
    let project = TestProject::new(manifest, fixtures);

    resolver::refresh_now(&project.pm, false, false).unwrap();

    let pm = project.pm.lock().unwrap();
    assert_eq!(pm.order().len(), 1);
    assert_eq!(project.fetched.lock().unwrap().len(), 1);
}

#[test]
fn missing_provider_is_a_fatal_resolution_error() {
    let manifest = r#"{
        "title": "p",
        "sources": [],
        "dependencies": { "https://unknown-host.example/a": "*" }
    }"#;
    let project = TestProject::new(manifest, HashMap::new());

    let err = resolver::refresh_now(&project.pm, false, false).unwrap_err();
    assert!(matches!(err, LupackError::NoProvider { .. }));
}

#[test]
fn file_dependency_host_must_be_allowed() {
    let manifest = r#"{
        "title": "p",
        "sources": [],
        "allowHosts": ["files.test"],
        "dependencies": {
            "https://elsewhere.example/x.lua": { "type": "file" }
        }
    }"#;
    let project = TestProject::new(manifest, HashMap::new());

    let err = resolver::refresh_now(&project.pm, false, false).unwrap_err();
    match err {
        LupackError::HostNotAllowed { host, .. } => assert_eq!(host, "elsewhere.example"),
        other => panic!("expected HostNotAllowed, got {other}"),
    }
}

#[test]
fn fetched_package_without_manifest_is_fatal() {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        use std::io::Write;
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file("repo-head/src/a.lua", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"-- a").unwrap();
        writer.finish().unwrap();
    }
    let fixtures = HashMap::from([("https://test.dev/a/zip/*".to_string(), cursor.into_inner())]);
    let manifest = r#"{
        "title": "p",
        "sources": [],
        "dependencies": { "https://test.dev/a": "*" }
    }"#;
    let project = TestProject::new(manifest, fixtures);

    let err = resolver::refresh_now(&project.pm, false, false).unwrap_err();
    assert!(matches!(err, LupackError::ManifestMissing { .. }));
}

#[test]
fn install_appends_to_manifest_and_forces_refresh() {
    let lib_zip = package_zip(
        r#"{ "title": "lib", "sources": ["src"] }"#,
        &[("src/lib.lua", "-- lib")],
    );
    let fixtures = HashMap::from([("https://test.dev/lib/zip/*".to_string(), lib_zip)]);
    let manifest = r#"{
        "title": "p",
        "sources": [],
        "dependencies": {}
    }"#;
    let project = TestProject::new(manifest, fixtures);

    // Locate without downloading, the way the install command starts.
    resolver::refresh_now(&project.pm, false, true).unwrap();
    assert_eq!(project.fetch_count(), 0);

    let err = resolver::install_now(&project.pm, "https://test.dev/lib", "1.*").unwrap_err();
    assert!(matches!(err, LupackError::VersionSyntax { .. }));

    resolver::install_now(&project.pm, "https://test.dev/lib", "*").unwrap();

    let manifest = std::fs::read_to_string(project.path("lupack.json")).unwrap();
    assert!(manifest.contains("https://test.dev/lib"));
    assert_eq!(project.fetch_count(), 1);
    let lock = std::fs::read_to_string(project.path(".lupack/state.lock.json")).unwrap();
    assert!(lock.contains("https://test.dev/lib"));

    // Installing the same resource again is reported, not fatal, and does
    // not duplicate the entry.
    resolver::install_now(&project.pm, "https://test.dev/lib", "*").unwrap();
    assert_eq!(
        std::fs::read_to_string(project.path("lupack.json"))
            .unwrap()
            .matches("https://test.dev/lib")
            .count(),
        1
    );
}
