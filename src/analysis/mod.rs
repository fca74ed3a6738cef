//! Dependency usage analysis.
//!
//! Combines the lockfile-derived candidate records with the import
//! references found in the project's own sources to decide which declared
//! dependencies are actually unused.

pub mod imports;

pub use imports::{AnalysisError, AnalysisResult, ImportExtractor, SourceLanguage};

use std::collections::HashSet;

use crate::lockfile::DependencyGraph;
use crate::report::Summary;
use crate::resolver::resolve_declared;
use crate::scanner::SourceFile;

/// Resolves declared-dependency usage for a whole project.
///
/// Every root declaration becomes a record; the ones the lockfile already
/// proves used arrive referenced, and every scanned source file then gets a
/// chance to rescue the rest by importing the package. Files with an
/// unrecognized extension are skipped.
pub fn resolve_dependency_usage(
    graph: &DependencyGraph,
    files: &[SourceFile],
    ignore_names: &HashSet<String>,
) -> AnalysisResult<Summary> {
    let mut records = resolve_declared(graph, ignore_names);
    let mut extractor = ImportExtractor::new()?;

    for (index, file) in files.iter().enumerate() {
        let language = file
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(SourceLanguage::from_extension);
        let Some(language) = language else {
            continue;
        };
        extractor.extract(&file.content, language, index, &file.path, &mut records)?;
    }

    Ok(Summary::from_records(records, graph.reference_count))
}
