//! Normalizer for pnpm's pnpm-lock.yaml.
//!
//! pnpm changed its lockfile layout between major versions: v6 keeps the
//! root declarations at the document top level and the transitive packages
//! under `packages`, while v9 nests the root under `importers["."]` and the
//! transitive packages under `snapshots`. The `lockfileVersion` field
//! selects the schema once at load time.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yaml_ng::Value;

use super::{
    DependencyGraph, LockfileDialect, LockfileError, LockfileResult, RootDeclarations,
    TransitivePackage,
};

/// The lockfile pnpm writes next to package.json.
pub const LOCKFILE_NAME: &str = "pnpm-lock.yaml";

const CROSS_MANAGER_HINT: &str =
    "If your project dependencies are managed by npm, please run depscope without the --pnpm option.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PnpmLockfile {
    #[serde(default)]
    lockfile_version: Option<VersionField>,

    // v6 schema: root declarations at the document top level.
    #[serde(default)]
    dependencies: BTreeMap<String, RootSpecifier>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, RootSpecifier>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, RootSpecifier>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, RootSpecifier>,

    // v9 schema: root declarations nested under importers["."].
    #[serde(default)]
    importers: BTreeMap<String, PnpmImporter>,

    // Transitive packages: `packages` in v6, `snapshots` in v9.
    #[serde(default)]
    packages: BTreeMap<String, PnpmSnapshot>,
    #[serde(default)]
    snapshots: BTreeMap<String, PnpmSnapshot>,
}

/// pnpm writes the lockfile version as either a bare number or a quoted
/// string like '6.0'; only the major part selects the schema.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum VersionField {
    Number(f64),
    Text(String),
}

impl VersionField {
    fn major(&self) -> Option<u32> {
        match self {
            VersionField::Number(n) => Some(*n as u32),
            VersionField::Text(s) => s.trim_matches('\'').split('.').next()?.parse().ok(),
        }
    }
}

/// A root declaration value: a `{specifier, version}` mapping in both v6
/// and v9 schemas, with a plain string accepted for resilience.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RootSpecifier {
    Resolved { version: String },
    Plain(String),
}

impl RootSpecifier {
    /// The resolved exact version pnpm recorded for this declaration.
    fn resolved_version(&self) -> &str {
        match self {
            RootSpecifier::Resolved { version } => version,
            RootSpecifier::Plain(version) => version,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PnpmImporter {
    #[serde(default)]
    dependencies: BTreeMap<String, RootSpecifier>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, RootSpecifier>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, RootSpecifier>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, RootSpecifier>,
}

impl PnpmImporter {
    fn into_root(self) -> RootDeclarations {
        RootDeclarations {
            dependencies: resolved_entries(&self.dependencies),
            peer_dependencies: resolved_entries(&self.peer_dependencies),
            optional_dependencies: resolved_entries(&self.optional_dependencies),
            dev_dependencies: resolved_entries(&self.dev_dependencies),
        }
    }
}

/// One transitive package entry. Dependency values are raw YAML values so
/// non-string ranges can be skipped instead of failing the whole parse.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PnpmSnapshot {
    #[serde(default)]
    dependencies: BTreeMap<String, Value>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, Value>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, Value>,
}

impl PnpmSnapshot {
    fn into_transitive(self) -> TransitivePackage {
        TransitivePackage {
            dependencies: string_entries(&self.dependencies),
            peer_dependencies: string_entries(&self.peer_dependencies),
            optional_dependencies: string_entries(&self.optional_dependencies),
        }
    }
}

/// Loads `<project_dir>/pnpm-lock.yaml` and normalizes it.
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

/// Parses a pnpm-lock.yaml from a string.
pub fn parse_str(content: &str) -> LockfileResult<DependencyGraph> {
    parse_with_path(content, Path::new(LOCKFILE_NAME))
}

fn parse_with_path(content: &str, path: &Path) -> LockfileResult<DependencyGraph> {
    let mut lock: PnpmLockfile =
        serde_yaml_ng::from_str(content).map_err(|err| LockfileError::Parse {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;

    // Lockfiles without a version field are treated as the newest schema.
    let major = lock
        .lockfile_version
        .as_ref()
        .and_then(VersionField::major)
        .unwrap_or(9);

    let (root, transitive_source) = if major == 6 {
        let root = RootDeclarations {
            dependencies: resolved_entries(&lock.dependencies),
            peer_dependencies: resolved_entries(&lock.peer_dependencies),
            optional_dependencies: resolved_entries(&lock.optional_dependencies),
            dev_dependencies: resolved_entries(&lock.dev_dependencies),
        };
        (root, lock.packages)
    } else {
        let root = lock
            .importers
            .remove(".")
            .map(PnpmImporter::into_root)
            .unwrap_or_default();
        (root, lock.snapshots)
    };

    let transitive = transitive_source
        .into_iter()
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, snapshot)| (key, snapshot.into_transitive()))
        .collect();

    Ok(DependencyGraph::new(
        LockfileDialect::Pnpm { version: major },
        root,
        transitive,
    ))
}

fn resolved_entries(map: &BTreeMap<String, RootSpecifier>) -> BTreeMap<String, String> {
    map.iter()
        .map(|(name, spec)| (name.clone(), spec.resolved_version().to_string()))
        .collect()
}

/// Keeps only string-valued ranges, dropping malformed entries.
fn string_entries(map: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .filter_map(|(name, value)| value.as_str().map(|v| (name.clone(), v.to_string())))
        .collect()
}
