//! Source file discovery.
//!
//! Walks a project tree collecting the JavaScript/TypeScript sources that
//! feed import extraction, while skipping directories that never contain
//! first-party code.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

/// Extensions recognized as analyzable source files.
pub const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs", "vue"];

const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "generated",
    "coverage",
    ".next",
    ".turbo",
];

/// One discovered source file with its content loaded.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub content: String,
}

/// The result of a scan: the readable sources plus warnings for files that
/// were matched but could not be read.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<SourceFile>,
    pub warnings: Vec<String>,
}

/// User-supplied exclusions applied during the walk.
#[derive(Debug, Default, Clone)]
pub struct ScanFilter {
    /// Directory names to skip anywhere in the tree.
    pub ignore_paths: Vec<String>,
    /// Exact file names to skip.
    pub ignore_files: Vec<String>,
}

impl ScanFilter {
    fn skips_dir(&self, name: &str) -> bool {
        IGNORED_DIRS.contains(&name) || self.ignore_paths.iter().any(|p| p == name)
    }

    fn skips_file(&self, name: &str) -> bool {
        self.ignore_files.iter().any(|f| f == name)
    }
}

fn is_ignored_dir(entry: &DirEntry, filter: &ScanFilter) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| filter.skips_dir(name))
            .unwrap_or(false)
}

fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively collects analyzable sources under `root`.
///
/// Unreadable files (permissions, invalid UTF-8) are reported as warnings
/// rather than aborting the scan. TypeScript declaration files are skipped
/// since their imports are type-only.
pub fn scan_sources(root: &Path, filter: &ScanFilter) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !is_ignored_dir(entry, filter));

    for entry in walker.filter_map(Result::ok) {
        let path = entry.path();
        if !entry.file_type().is_file() || !has_source_extension(path) {
            continue;
        }

        let file_name = entry.file_name().to_str().unwrap_or_default();
        if file_name.ends_with(".d.ts") || filter.skips_file(file_name) {
            continue;
        }

        match fs::read_to_string(path) {
            Ok(content) => {
                let content = if path.extension().and_then(|e| e.to_str()) == Some("vue") {
                    extract_vue_script(&content)
                } else {
                    content
                };
                outcome.files.push(SourceFile {
                    path: path.to_path_buf(),
                    content,
                });
            }
            Err(err) => {
                outcome
                    .warnings
                    .push(format!("Skipped {}: {}", path.display(), err));
            }
        }
    }

    outcome.files.sort_by(|a, b| a.path.cmp(&b.path));
    outcome
}

/// Pulls the `<script>` block out of a Vue single-file component.
///
/// Components without a script block yield an empty string, which parses
/// cleanly and contributes no references.
pub fn extract_vue_script(content: &str) -> String {
    let Some(open_start) = content.find("<script") else {
        return String::new();
    };
    let Some(open_end) = content[open_start..].find('>') else {
        return String::new();
    };
    let body_start = open_start + open_end + 1;
    let Some(close) = content[body_start..].find("</script") else {
        return String::new();
    };
    content[body_start..body_start + close].to_string()
}
