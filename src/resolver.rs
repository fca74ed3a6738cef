//! Declared-dependency resolution against the lockfile usage index.
//!
//! This module decides, for every root-declared dependency, whether some
//! other installed package already requires it. Every declaration produces
//! a record: the ones the lockfile proves used arrive pre-marked
//! referenced, the rest start unreferenced and may be upgraded by the
//! import extractor.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use semver::{Version, VersionReq};

use crate::lockfile::{strip_peer_suffix, DependencyGraph, LockfileDialect};

/// How a dependency was referenced from source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// ES module import declaration: `import x from 'pkg'`
    StaticImport,
    /// CommonJS require call: `require('pkg')`
    Require,
    /// Dynamic import with a literal specifier: `import('pkg')`
    DynamicImport,
    /// Dynamic import/require with a computed specifier; cannot be
    /// attributed to a package name.
    DynamicUnresolved,
    /// Required at a matching specifier by another installed package;
    /// recorded during lockfile resolution, before any source is read.
    LockfileRequirement,
}

impl ReferenceKind {
    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            ReferenceKind::StaticImport => "import",
            ReferenceKind::Require => "require",
            ReferenceKind::DynamicImport => "dynamic import",
            ReferenceKind::DynamicUnresolved => "dynamic",
            ReferenceKind::LockfileRequirement => "lockfile",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Whether a dependency record has been referenced, and how.
///
/// The state is monotonic: it only ever moves from `Unreferenced` to
/// `Referenced`, never back, and the first reference kind sticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageState {
    Unreferenced,
    Referenced(ReferenceKind),
}

impl UsageState {
    /// True once any reference has been recorded.
    pub fn is_referenced(&self) -> bool {
        matches!(self, UsageState::Referenced(_))
    }

    /// True if the reference actually proves usage. Unresolvable dynamic
    /// references do not: they are reported, not counted as used.
    pub fn counts_as_used(&self) -> bool {
        matches!(self, UsageState::Referenced(kind) if *kind != ReferenceKind::DynamicUnresolved)
    }
}

/// A declared dependency annotated with its resolution outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    /// The package name as declared in the manifest.
    pub name: String,
    /// Merged display version; multiple observations join with `" & @"`.
    pub version: String,
    /// Usage annotation, upgraded in place by the import extractor.
    pub state: UsageState,
    /// Whether the root declares this name as a dev dependency.
    pub is_dev: bool,
    /// For dynamic-unresolved records: the verbatim call expression.
    pub call_text: Option<String>,
}

impl DependencyRecord {
    /// A freshly resolved, not-yet-referenced declaration.
    pub fn declared(name: impl Into<String>, version: impl Into<String>, is_dev: bool) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            state: UsageState::Unreferenced,
            is_dev,
            call_text: None,
        }
    }

    /// True for synthetic records produced by computed import specifiers.
    pub fn is_dynamic_unresolved(&self) -> bool {
        self.state == UsageState::Referenced(ReferenceKind::DynamicUnresolved)
    }
}

/// Builds the usage index: which names are required, at which cleaned
/// specifiers, by packages other than the root.
///
/// Parenthesized peer-resolution suffixes are stripped before insertion so
/// they can never affect matching.
pub fn build_usage_index(graph: &DependencyGraph) -> BTreeMap<String, BTreeSet<String>> {
    let mut index: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for package in graph.transitive.values() {
        for kind in package.dependency_kinds() {
            for (name, range) in kind {
                index
                    .entry(name.clone())
                    .or_default()
                    .insert(strip_peer_suffix(range));
            }
        }
    }
    index
}

/// Resolves every root declaration against the usage index and returns one
/// record per declaration, ordered by name.
///
/// A declaration is used when some transitive package requires it at a
/// matching specifier; such records come back already referenced with
/// [`ReferenceKind::LockfileRequirement`]. Names in the ignore set are
/// skipped entirely. Dev declarations are always present so the aggregator
/// can report them separately regardless of usage.
pub fn resolve_declared(
    graph: &DependencyGraph,
    ignore_names: &HashSet<String>,
) -> Vec<DependencyRecord> {
    let index = build_usage_index(graph);
    let mut records: Vec<DependencyRecord> = Vec::new();

    for (name, specifier) in graph.root.flattened() {
        if ignore_names.contains(&name) {
            continue;
        }

        let pure = pure_version(&specifier, graph.dialect);
        let candidates = candidate_versions(index.get(&name), graph.dialect);

        let is_used = match graph.dialect {
            LockfileDialect::Pnpm { .. } => candidates.contains(&pure),
            LockfileDialect::Npm => {
                candidates.contains(&pure)
                    || candidates
                        .iter()
                        .any(|candidate| candidate == "*" || range_satisfied(&pure, candidate))
            }
        };

        let state = if is_used {
            UsageState::Referenced(ReferenceKind::LockfileRequirement)
        } else {
            UsageState::Unreferenced
        };
        push_record(&mut records, &name, &pure, graph.root.is_dev(&name), state);
    }

    records.sort_by(|a, b| a.name.cmp(&b.name));
    records
}

/// Upgrades the named record to referenced. Returns true when a record with
/// that exact name exists, whether or not it was already referenced; the
/// state never downgrades and the first kind annotation wins.
pub fn mark_referenced(
    records: &mut [DependencyRecord],
    name: &str,
    kind: ReferenceKind,
) -> bool {
    match records.iter_mut().find(|record| record.name == name) {
        Some(record) => {
            if !record.state.is_referenced() {
                record.state = UsageState::Referenced(kind);
            }
            true
        }
        None => false,
    }
}

/// Appends a synthetic record for an import/require call whose specifier is
/// not a string literal. The call text is preserved verbatim so the report
/// can show the user exactly what could not be analyzed.
pub fn push_unresolved_dynamic(
    records: &mut Vec<DependencyRecord>,
    argument: &str,
    call_text: &str,
) {
    records.push(DependencyRecord {
        name: argument.to_string(),
        version: String::new(),
        state: UsageState::Referenced(ReferenceKind::DynamicUnresolved),
        is_dev: false,
        call_text: Some(call_text.to_string()),
    });
}

/// Derives the concrete version from a declared specifier.
fn pure_version(specifier: &str, dialect: LockfileDialect) -> String {
    match dialect {
        // npm declarations are ranges; strip the leading operators.
        LockfileDialect::Npm => specifier
            .trim_start_matches(['^', '~', '*', '=', '>', '<', ' '])
            .to_string(),
        // pnpm declarations are resolved versions with an optional peer
        // suffix.
        LockfileDialect::Pnpm { .. } => strip_peer_suffix(specifier),
    }
}

/// Expands the indexed specifiers into individual comparison candidates.
///
/// npm range strings may join alternatives with `" || "`; each alternative
/// is compared on its own. pnpm entries are already exact versions.
fn candidate_versions(
    raw: Option<&BTreeSet<String>>,
    dialect: LockfileDialect,
) -> BTreeSet<String> {
    let Some(raw) = raw else {
        return BTreeSet::new();
    };
    match dialect {
        LockfileDialect::Pnpm { .. } => raw.clone(),
        LockfileDialect::Npm => raw
            .iter()
            .flat_map(|range| range.split(" || "))
            .filter(|alternative| !alternative.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// True when `pure` (a concrete version) satisfies `candidate` (an npm
/// range). Unparseable versions or ranges simply do not match.
fn range_satisfied(pure: &str, candidate: &str) -> bool {
    let Ok(version) = Version::parse(pure) else {
        return false;
    };
    // npm joins comparators with spaces; the semver crate expects commas.
    let normalized = candidate.split_whitespace().collect::<Vec<_>>().join(", ");
    // A bare version is an exact requirement in npm, while the semver crate
    // would default it to caret semantics.
    let normalized = if normalized.starts_with(|c: char| c.is_ascii_digit())
        && !normalized.contains(['x', 'X', '*'])
    {
        format!("={}", normalized)
    } else {
        normalized
    };
    match VersionReq::parse(&normalized) {
        Ok(req) => req.matches(&version),
        Err(_) => false,
    }
}

/// Merges one resolved observation into the record list.
///
/// A second observation for the same name appends its precise version to
/// the display string only while the prior record is still unreferenced;
/// otherwise the version restarts from the new observation. A dev or
/// referenced observation upgrades the merged record either way.
/// Root-declared names are unique per run, so in practice this keeps one
/// version per record.
fn push_record(
    records: &mut Vec<DependencyRecord>,
    name: &str,
    precise: &str,
    is_dev: bool,
    state: UsageState,
) {
    if let Some(previous) = records.iter_mut().find(|record| record.name == name) {
        if !previous.state.is_referenced() && !previous.version.is_empty() {
            previous.version = format!("{} & @{}", previous.version, precise);
        } else {
            previous.version = precise.to_string();
        }
        previous.is_dev = previous.is_dev || is_dev;
        if !previous.state.is_referenced() {
            previous.state = state;
        }
    } else {
        let mut record = DependencyRecord::declared(name, precise, is_dev);
        record.state = state;
        records.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfile::{RootDeclarations, TransitivePackage};
    use std::collections::BTreeMap;

    fn npm_graph(
        root_deps: &[(&str, &str)],
        transitive: &[(&str, &[(&str, &str)])],
    ) -> DependencyGraph {
        graph_with_dialect(LockfileDialect::Npm, root_deps, transitive)
    }

    fn pnpm_graph(
        root_deps: &[(&str, &str)],
        transitive: &[(&str, &[(&str, &str)])],
    ) -> DependencyGraph {
        graph_with_dialect(LockfileDialect::Pnpm { version: 9 }, root_deps, transitive)
    }

    fn graph_with_dialect(
        dialect: LockfileDialect,
        root_deps: &[(&str, &str)],
        transitive: &[(&str, &[(&str, &str)])],
    ) -> DependencyGraph {
        let mut root = RootDeclarations::default();
        for (name, spec) in root_deps {
            root.dependencies
                .insert((*name).to_string(), (*spec).to_string());
        }

        let mut packages = BTreeMap::new();
        for (key, deps) in transitive {
            let mut package = TransitivePackage::default();
            for (name, range) in *deps {
                package
                    .dependencies
                    .insert((*name).to_string(), (*range).to_string());
            }
            packages.insert((*key).to_string(), package);
        }

        DependencyGraph::new(dialect, root, packages)
    }

    fn no_ignores() -> HashSet<String> {
        HashSet::new()
    }

    // ===== Usage index =====

    #[test]
    fn test_usage_index_strips_peer_suffixes() {
        let graph = pnpm_graph(
            &[],
            &[("react-dom@18.0.0", &[("react", "18.0.0(react-dom@18.0.0)")])],
        );
        let index = build_usage_index(&graph);

        assert!(index.get("react").unwrap().contains("18.0.0"));
        assert_eq!(index.get("react").unwrap().len(), 1);
    }

    #[test]
    fn test_usage_index_collects_all_kinds() {
        let mut package = TransitivePackage::default();
        package
            .dependencies
            .insert("a".to_string(), "1.0.0".to_string());
        package
            .peer_dependencies
            .insert("b".to_string(), "^2.0.0".to_string());
        package
            .optional_dependencies
            .insert("c".to_string(), "~3.0.0".to_string());

        let mut transitive = BTreeMap::new();
        transitive.insert("node_modules/x".to_string(), package);
        let graph = DependencyGraph::new(
            LockfileDialect::Npm,
            RootDeclarations::default(),
            transitive,
        );

        let index = build_usage_index(&graph);
        assert_eq!(index.len(), 3);
        assert!(index.contains_key("b"));
        assert!(index.contains_key("c"));
    }

    // ===== npm resolution =====

    #[test]
    fn test_unreferenced_declaration_becomes_unused_record() {
        let graph = npm_graph(&[("lodash", "^4.17.21")], &[]);
        let records = resolve_declared(&graph, &no_ignores());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "lodash");
        assert_eq!(records[0].version, "4.17.21");
        assert_eq!(records[0].state, UsageState::Unreferenced);
        assert!(!records[0].is_dev);
    }

    fn single_state(records: &[DependencyRecord]) -> UsageState {
        assert_eq!(records.len(), 1);
        records[0].state
    }

    #[test]
    fn test_exact_version_match_counts_as_used() {
        let graph = npm_graph(
            &[("ms", "2.1.3")],
            &[("node_modules/debug", &[("ms", "2.1.3")])],
        );
        let records = resolve_declared(&graph, &no_ignores());
        assert_eq!(
            single_state(&records),
            UsageState::Referenced(ReferenceKind::LockfileRequirement)
        );
    }

    #[test]
    fn test_wildcard_candidate_counts_as_used() {
        let graph = npm_graph(
            &[("ms", "^2.1.0")],
            &[("node_modules/anything", &[("ms", "*")])],
        );
        let records = resolve_declared(&graph, &no_ignores());
        assert!(single_state(&records).counts_as_used());
    }

    #[test]
    fn test_semver_range_satisfaction_counts_as_used() {
        let graph = npm_graph(
            &[("follow-redirects", "^1.15.4")],
            &[("node_modules/axios", &[("follow-redirects", "^1.15.0")])],
        );
        let records = resolve_declared(&graph, &no_ignores());
        assert!(single_state(&records).counts_as_used());
    }

    #[test]
    fn test_or_joined_ranges_are_split() {
        let graph = npm_graph(
            &[("glob", "^7.2.3")],
            &[("node_modules/rimraf", &[("glob", "^6.0.0 || ^7.0.0")])],
        );
        let records = resolve_declared(&graph, &no_ignores());
        assert!(single_state(&records).counts_as_used());
    }

    #[test]
    fn test_space_joined_comparators_are_satisfied() {
        let graph = npm_graph(
            &[("semicolons", "^1.2.0")],
            &[("node_modules/x", &[("semicolons", ">=1.0.0 <2.0.0")])],
        );
        let records = resolve_declared(&graph, &no_ignores());
        assert!(single_state(&records).counts_as_used());
    }

    #[test]
    fn test_non_matching_range_stays_unused() {
        let graph = npm_graph(
            &[("lodash", "^4.17.21")],
            &[("node_modules/old-tool", &[("lodash", "^3.0.0")])],
        );
        let records = resolve_declared(&graph, &no_ignores());
        assert_eq!(single_state(&records), UsageState::Unreferenced);
        assert_eq!(records[0].name, "lodash");
    }

    // ===== pnpm resolution =====

    #[test]
    fn test_pnpm_exact_identity_only() {
        let graph = pnpm_graph(
            &[("ms", "2.1.3")],
            &[("debug@4.3.4", &[("ms", "2.1.2")])],
        );
        // 2.1.2 != 2.1.3; pnpm has no range semantics.
        let records = resolve_declared(&graph, &no_ignores());
        assert_eq!(single_state(&records), UsageState::Unreferenced);
    }

    #[test]
    fn test_pnpm_peer_suffix_never_affects_matching() {
        let graph = pnpm_graph(
            &[("react", "18.0.0(react-dom@18.0.0)")],
            &[("react-dom@18.0.0", &[("react", "18.0.0(react-dom@18.0.0)")])],
        );
        let records = resolve_declared(&graph, &no_ignores());
        assert!(single_state(&records).counts_as_used());
    }

    // ===== Ignore filter =====

    #[test]
    fn test_ignored_names_are_excluded_entirely() {
        let graph = npm_graph(&[("left-pad", "^1.3.0"), ("lodash", "^4.17.21")], &[]);
        let ignore: HashSet<String> = ["left-pad".to_string()].into_iter().collect();

        let records = resolve_declared(&graph, &ignore);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "lodash");
    }

    // ===== Record ordering and dev flag =====

    #[test]
    fn test_records_ordered_by_name_case_sensitive() {
        let graph = npm_graph(&[("zod", "^3.0.0"), ("Zebra", "^1.0.0"), ("abc", "^1.0.0")], &[]);
        let records = resolve_declared(&graph, &no_ignores());

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Zebra", "abc", "zod"]);
    }

    #[test]
    fn test_dev_declarations_carry_is_dev() {
        let mut root = RootDeclarations::default();
        root.dev_dependencies
            .insert("typescript".to_string(), "^5.3.0".to_string());
        let graph = DependencyGraph::new(LockfileDialect::Npm, root, BTreeMap::new());

        let records = resolve_declared(&graph, &no_ignores());
        assert_eq!(records.len(), 1);
        assert!(records[0].is_dev);
    }

    #[test]
    fn test_lockfile_used_dev_declaration_still_produces_record() {
        let mut root = RootDeclarations::default();
        root.dev_dependencies
            .insert("esbuild".to_string(), "0.20.0".to_string());
        let mut package = TransitivePackage::default();
        package
            .dependencies
            .insert("esbuild".to_string(), "0.20.0".to_string());
        let mut transitive = BTreeMap::new();
        transitive.insert("node_modules/vite".to_string(), package);
        let graph = DependencyGraph::new(LockfileDialect::Npm, root, transitive);

        let records = resolve_declared(&graph, &no_ignores());
        assert_eq!(records.len(), 1);
        assert!(records[0].is_dev);
        assert_eq!(
            records[0].state,
            UsageState::Referenced(ReferenceKind::LockfileRequirement)
        );
    }

    // ===== Version merge accumulation =====

    #[test]
    fn test_push_record_merges_while_unreferenced() {
        let mut records = Vec::new();
        push_record(&mut records, "pkg", "1.0.0", false, UsageState::Unreferenced);
        push_record(&mut records, "pkg", "2.0.0", false, UsageState::Unreferenced);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].version, "1.0.0 & @2.0.0");
    }

    #[test]
    fn test_push_record_restarts_after_reference() {
        let mut records = Vec::new();
        push_record(&mut records, "pkg", "1.0.0", false, UsageState::Unreferenced);
        mark_referenced(&mut records, "pkg", ReferenceKind::StaticImport);
        push_record(&mut records, "pkg", "2.0.0", false, UsageState::Unreferenced);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].version, "2.0.0");
    }

    #[test]
    fn test_push_record_merge_keeps_dev_flag_from_either_side() {
        let mut records = Vec::new();
        push_record(&mut records, "pkg", "1.0.0", false, UsageState::Unreferenced);
        push_record(&mut records, "pkg", "2.0.0", true, UsageState::Unreferenced);

        assert_eq!(records.len(), 1);
        assert!(records[0].is_dev);
    }

    // ===== Mutation contract =====

    #[test]
    fn test_mark_referenced_upgrades_once() {
        let mut records = vec![DependencyRecord::declared("axios", "1.6.0", false)];

        assert!(mark_referenced(&mut records, "axios", ReferenceKind::Require));
        assert_eq!(
            records[0].state,
            UsageState::Referenced(ReferenceKind::Require)
        );

        // A later reference never downgrades or re-tags.
        assert!(mark_referenced(
            &mut records,
            "axios",
            ReferenceKind::DynamicImport
        ));
        assert_eq!(
            records[0].state,
            UsageState::Referenced(ReferenceKind::Require)
        );
    }

    #[test]
    fn test_mark_referenced_unknown_name() {
        let mut records = vec![DependencyRecord::declared("axios", "1.6.0", false)];
        assert!(!mark_referenced(
            &mut records,
            "lodash",
            ReferenceKind::StaticImport
        ));
    }

    #[test]
    fn test_push_unresolved_dynamic_preserves_call_text() {
        let mut records = Vec::new();
        push_unresolved_dynamic(&mut records, "moduleName", "require(moduleName)");

        assert_eq!(records.len(), 1);
        assert!(records[0].is_dynamic_unresolved());
        assert!(!records[0].state.counts_as_used());
        assert_eq!(
            records[0].call_text.as_deref(),
            Some("require(moduleName)")
        );
    }

    // ===== Determinism =====

    #[test]
    fn test_resolution_is_idempotent() {
        let graph = npm_graph(
            &[("lodash", "^4.17.21"), ("axios", "^1.6.0")],
            &[("node_modules/tool", &[("axios", "^1.0.0")])],
        );
        let first = resolve_declared(&graph, &no_ignores());
        let second = resolve_declared(&graph, &no_ignores());
        assert_eq!(first, second);
    }
}
