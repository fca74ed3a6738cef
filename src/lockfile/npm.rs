//! Normalizer for npm's package-lock.json.
//!
//! npm keeps the whole install graph under a single `packages` map keyed by
//! install path. The root project itself is the entry with the empty-string
//! key; everything else is a transitive package.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::{
    DependencyGraph, LockfileDialect, LockfileError, LockfileResult, RootDeclarations,
    TransitivePackage,
};

/// The lockfile npm writes next to package.json.
pub const LOCKFILE_NAME: &str = "package-lock.json";

const CROSS_MANAGER_HINT: &str =
    "If your project dependencies are managed by pnpm, please run depscope with the --pnpm option.";

#[derive(Debug, Deserialize)]
struct NpmLockfile {
    #[serde(default)]
    packages: BTreeMap<String, NpmPackage>,
}

/// One entry of the `packages` map. Dependency values are kept as raw JSON
/// values so that malformed non-string ranges can be skipped instead of
/// failing the whole parse.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct NpmPackage {
    #[serde(default)]
    dependencies: BTreeMap<String, Value>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, Value>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, Value>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, Value>,
}

/// Loads `<project_dir>/package-lock.json` and normalizes it.
pub fn load(project_dir: &Path) -> LockfileResult<DependencyGraph> {
    let path = project_dir.join(LOCKFILE_NAME);
    if !path.exists() {
        return Err(LockfileError::Missing {
            path,
            hint: CROSS_MANAGER_HINT.to_string(),
        });
    }

    let content = fs::read_to_string(&path).map_err(|source| LockfileError::Io {
        path: path.clone(),
        source,
    })?;
    parse_with_path(&content, &path)
}

/// Parses a package-lock.json from a string.
///
/// # Example
///
/// ```
/// use depscope::lockfile::npm::parse_str;
///
/// let lock = r#"{"packages": {"": {"dependencies": {"react": "^18.0.0"}}}}"#;
/// let graph = parse_str(lock).unwrap();
/// assert_eq!(graph.root.dependencies.get("react").unwrap(), "^18.0.0");
/// ```
pub fn parse_str(content: &str) -> LockfileResult<DependencyGraph> {
    parse_with_path(content, Path::new(LOCKFILE_NAME))
}

fn parse_with_path(content: &str, path: &Path) -> LockfileResult<DependencyGraph> {
    let mut lock: NpmLockfile =
        serde_json::from_str(content).map_err(|err| LockfileError::Parse {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;

    // Removing the root entry here keeps it out of the transitive map, so a
    // root declaration never counts as required by itself.
    let root_entry = lock
        .packages
        .remove("")
        .ok_or_else(|| LockfileError::Parse {
            path: path.to_path_buf(),
            details: "missing root package entry (packages[\"\"]); lockfileVersion 2 or later is required"
                .to_string(),
        })?;

    let root = RootDeclarations {
        dependencies: string_entries(&root_entry.dependencies),
        peer_dependencies: string_entries(&root_entry.peer_dependencies),
        optional_dependencies: string_entries(&root_entry.optional_dependencies),
        dev_dependencies: string_entries(&root_entry.dev_dependencies),
    };

    let transitive = lock
        .packages
        .into_iter()
        .map(|(key, pkg)| {
            let package = TransitivePackage {
                dependencies: string_entries(&pkg.dependencies),
                peer_dependencies: string_entries(&pkg.peer_dependencies),
                optional_dependencies: string_entries(&pkg.optional_dependencies),
            };
            (key, package)
        })
        .collect();

    Ok(DependencyGraph::new(LockfileDialect::Npm, root, transitive))
}

/// Keeps only string-valued ranges, dropping malformed entries.
fn string_entries(map: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .filter_map(|(name, value)| value.as_str().map(|v| (name.clone(), v.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LOCKFILE: &str = r#"{
        "name": "test-app",
        "lockfileVersion": 3,
        "packages": {
            "": {
                "dependencies": {
                    "axios": "^1.6.0",
                    "lodash": "^4.17.21"
                },
                "devDependencies": {
                    "typescript": "^5.3.0"
                },
                "peerDependencies": {
                    "react": ">=16.8.0"
                }
            },
            "node_modules/axios": {
                "version": "1.6.0",
                "dependencies": {
                    "follow-redirects": "^1.15.0",
                    "form-data": "^4.0.0"
                }
            },
            "node_modules/follow-redirects": {
                "version": "1.15.4"
            },
            "node_modules/lodash": {
                "version": "4.17.21"
            }
        }
    }"#;

    #[test]
    fn test_parse_root_declarations() {
        let graph = parse_str(SAMPLE_LOCKFILE).unwrap();

        assert_eq!(graph.dialect, LockfileDialect::Npm);
        assert_eq!(graph.root.dependencies.len(), 2);
        assert_eq!(graph.root.dependencies.get("axios").unwrap(), "^1.6.0");
        assert_eq!(graph.root.dev_dependencies.get("typescript").unwrap(), "^5.3.0");
        assert_eq!(graph.root.peer_dependencies.get("react").unwrap(), ">=16.8.0");
    }

    #[test]
    fn test_root_entry_excluded_from_transitive() {
        let graph = parse_str(SAMPLE_LOCKFILE).unwrap();

        assert!(!graph.transitive.contains_key(""));
        assert_eq!(graph.transitive.len(), 3);
        assert!(graph.transitive.contains_key("node_modules/axios"));
    }

    #[test]
    fn test_reference_count_counts_transitive_edges() {
        let graph = parse_str(SAMPLE_LOCKFILE).unwrap();
        // Only node_modules/axios declares dependencies: 2 edges.
        assert_eq!(graph.reference_count, 2);
    }

    #[test]
    fn test_non_string_ranges_are_skipped() {
        let lock = r#"{
            "packages": {
                "": {"dependencies": {"react": "^18.0.0"}},
                "node_modules/weird": {
                    "dependencies": {"ok": "1.0.0", "bad": {"nested": true}, "worse": 42}
                }
            }
        }"#;
        let graph = parse_str(lock).unwrap();
        let weird = graph.transitive.get("node_modules/weird").unwrap();

        assert_eq!(weird.dependencies.len(), 1);
        assert_eq!(weird.dependencies.get("ok").unwrap(), "1.0.0");
        assert_eq!(graph.reference_count, 1);
    }

    #[test]
    fn test_missing_root_entry_is_parse_error() {
        let lock = r#"{"packages": {"node_modules/react": {}}}"#;
        let err = parse_str(lock).unwrap_err();

        match err {
            LockfileError::Parse { details, .. } => {
                assert!(details.contains("missing root package entry"));
            }
            other => panic!("expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = parse_str("{ not json }").unwrap_err();
        assert!(matches!(err, LockfileError::Parse { .. }));
    }

    #[test]
    fn test_missing_lockfile_hints_at_pnpm() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path()).unwrap_err();

        match err {
            LockfileError::Missing { hint, .. } => assert!(hint.contains("--pnpm")),
            other => panic!("expected Missing error, got {:?}", other),
        }
    }
}
