//! Lockfile normalization for npm and pnpm projects.
//!
//! Both package managers publish structurally different lockfiles; this
//! module parses each of them into one uniform [`DependencyGraph`] so the
//! resolver never has to care which manager produced the data.
//!
//! # Supported formats
//!
//! - **package-lock.json** (npm, lockfileVersion 2/3) - root declarations
//!   live under `packages[""]`
//! - **pnpm-lock.yaml** (pnpm, lockfileVersion 6 and 9) - root declarations
//!   at the document top level (v6) or under `importers["."]` (v9)

pub mod npm;
pub mod pnpm;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while locating or normalizing a lockfile.
///
/// All of these are fatal: a missing or malformed lockfile means the
/// declared dependencies cannot be resolved at all, so nothing is retried.
#[derive(Debug, Error)]
pub enum LockfileError {
    /// The expected lockfile does not exist. The hint names the other
    /// package manager's flag so users of the wrong mode can recover.
    #[error("The {} file does not exist, so dependencies cannot be resolved.\n> {hint}", path.display())]
    Missing { path: PathBuf, hint: String },

    /// The lockfile exists but could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The lockfile content is not valid JSON/YAML for its dialect.
    #[error("Failed to parse {}: {details}", path.display())]
    Parse { path: PathBuf, details: String },
}

/// Result type alias for lockfile operations.
pub type LockfileResult<T> = Result<T, LockfileError>;

/// The lockfile dialect, resolved once at load time.
///
/// Every downstream comparison rule (range splitting, semver satisfaction,
/// exact version identity) branches on this value instead of re-detecting
/// the package manager at each call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockfileDialect {
    /// npm's `packages`-keyed manifest; declared specifiers are ranges.
    Npm,
    /// pnpm's `importers`/`snapshots` manifest; declared specifiers are
    /// already-resolved exact versions. Carries the lockfile major version.
    Pnpm { version: u32 },
}

impl LockfileDialect {
    /// Returns true for the pnpm dialect.
    pub fn is_pnpm(&self) -> bool {
        matches!(self, LockfileDialect::Pnpm { .. })
    }

    /// The lockfile name this dialect reads.
    pub fn lockfile_name(&self) -> &'static str {
        match self {
            LockfileDialect::Npm => npm::LOCKFILE_NAME,
            LockfileDialect::Pnpm { .. } => pnpm::LOCKFILE_NAME,
        }
    }
}

impl fmt::Display for LockfileDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockfileDialect::Npm => write!(f, "npm"),
            LockfileDialect::Pnpm { version } => write!(f, "pnpm (lockfile v{})", version),
        }
    }
}

/// The dependency declarations of the root project, one map per kind.
///
/// The maps are flattened for resolution, but the dev map is kept around so
/// each record can carry its `is_dev` flag.
#[derive(Debug, Clone, Default)]
pub struct RootDeclarations {
    pub dependencies: BTreeMap<String, String>,
    pub peer_dependencies: BTreeMap<String, String>,
    pub optional_dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
}

impl RootDeclarations {
    /// Flattens the four kinds into a single name-ordered map. Later kinds
    /// overwrite earlier ones on name collision (prod, peer, optional, dev).
    pub fn flattened(&self) -> BTreeMap<String, String> {
        let mut merged = self.dependencies.clone();
        merged.extend(self.peer_dependencies.clone());
        merged.extend(self.optional_dependencies.clone());
        merged.extend(self.dev_dependencies.clone());
        merged
    }

    /// Returns true if `name` is declared as a dev dependency.
    pub fn is_dev(&self, name: &str) -> bool {
        self.dev_dependencies.contains_key(name)
    }

    /// Returns true if no dependencies are declared at all.
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
            && self.peer_dependencies.is_empty()
            && self.optional_dependencies.is_empty()
            && self.dev_dependencies.is_empty()
    }
}

/// The dependency declarations of one transitive package.
///
/// Dev dependencies of transitive packages are irrelevant for usage
/// indexing (they are never installed), so only three kinds are kept.
#[derive(Debug, Clone, Default)]
pub struct TransitivePackage {
    pub dependencies: BTreeMap<String, String>,
    pub peer_dependencies: BTreeMap<String, String>,
    pub optional_dependencies: BTreeMap<String, String>,
}

impl TransitivePackage {
    /// The three dependency-kind maps, in indexing order.
    pub fn dependency_kinds(&self) -> [&BTreeMap<String, String>; 3] {
        [
            &self.dependencies,
            &self.peer_dependencies,
            &self.optional_dependencies,
        ]
    }

    /// Number of dependency edges this package contributes.
    pub fn edge_count(&self) -> usize {
        self.dependencies.len() + self.peer_dependencies.len() + self.optional_dependencies.len()
    }
}

/// The normalized install graph extracted from a lockfile.
///
/// Invariant: the synthetic root entry is never present in `transitive`,
/// so a root declaration can not appear to be "used by itself".
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Which lockfile dialect produced this graph.
    pub dialect: LockfileDialect,
    /// The root project's own declarations.
    pub root: RootDeclarations,
    /// Every other package in the install graph, keyed by its lockfile key.
    pub transitive: BTreeMap<String, TransitivePackage>,
    /// Count of transitive dependency edges observed. Display context only.
    pub reference_count: usize,
}

impl DependencyGraph {
    /// Assembles a graph and derives its reference count.
    pub fn new(
        dialect: LockfileDialect,
        root: RootDeclarations,
        transitive: BTreeMap<String, TransitivePackage>,
    ) -> Self {
        let reference_count = transitive.values().map(TransitivePackage::edge_count).sum();
        Self {
            dialect,
            root,
            transitive,
            reference_count,
        }
    }
}

/// Loads and normalizes the lockfile of `project_dir` for the selected
/// package manager.
pub fn load(project_dir: &Path, pnpm: bool) -> LockfileResult<DependencyGraph> {
    if pnpm {
        pnpm::load(project_dir)
    } else {
        npm::load(project_dir)
    }
}

/// Strips parenthesized peer-resolution suffixes from a specifier.
///
/// pnpm encodes peer disambiguation in parentheses, e.g.
/// `18.0.0(react-dom@18.0.0)`; the parenthesized text is not part of the
/// semantic version and must never affect matching.
pub fn strip_peer_suffix(specifier: &str) -> String {
    let mut cleaned = String::with_capacity(specifier.len());
    let mut depth = 0usize;
    for ch in specifier.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => cleaned.push(ch),
            _ => {}
        }
    }
    cleaned
}
