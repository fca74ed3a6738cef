//! Import reference extraction using tree-sitter for JavaScript/TypeScript.
//!
//! This module walks each source file's syntax tree, pulls the module
//! specifier out of static imports, `require` calls and dynamic imports,
//! and upgrades the matching declared-dependency records to referenced.
//! Specifiers that point into a package subpath (including scoped
//! packages) are resolved by walking the path segments back to a declared
//! name.

use std::path::Path;

use thiserror::Error;
use tree_sitter::{Node, Parser, TreeCursor};

use crate::resolver::{mark_referenced, push_unresolved_dynamic, DependencyRecord, ReferenceKind};

/// Errors that can occur during import extraction.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Tree-sitter rejected a source file. Fatal: partial analysis would
    /// silently under-report usage.
    #[error("Failed to parse file at index {index} ({path})\nContent snippet: {snippet}...")]
    SyntaxTree {
        index: usize,
        path: String,
        snippet: String,
    },

    #[error("Tree-sitter language initialization failed")]
    LanguageInit,
}

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Language grammar for a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLanguage {
    JavaScript,
    Jsx,
    TypeScript,
    Tsx,
    /// Vue single-file component; the scanner extracts the script block,
    /// which is parsed with the TypeScript grammar.
    Vue,
}

impl SourceLanguage {
    /// Determine language from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "js" | "mjs" | "cjs" => Some(SourceLanguage::JavaScript),
            "jsx" => Some(SourceLanguage::Jsx),
            "ts" | "mts" | "cts" => Some(SourceLanguage::TypeScript),
            "tsx" => Some(SourceLanguage::Tsx),
            "vue" => Some(SourceLanguage::Vue),
            _ => None,
        }
    }
}

/// Extractor for package references in JavaScript/TypeScript sources.
///
/// Holds one parser per grammar so files of mixed dialects can be
/// processed without re-initializing tree-sitter.
pub struct ImportExtractor {
    js_parser: Parser,
    ts_parser: Parser,
    tsx_parser: Parser,
}

impl ImportExtractor {
    /// Create a new extractor with all grammars initialized.
    pub fn new() -> AnalysisResult<Self> {
        let mut js_parser = Parser::new();
        js_parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .map_err(|_| AnalysisError::LanguageInit)?;

        let mut ts_parser = Parser::new();
        ts_parser
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .map_err(|_| AnalysisError::LanguageInit)?;

        let mut tsx_parser = Parser::new();
        tsx_parser
            .set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())
            .map_err(|_| AnalysisError::LanguageInit)?;

        Ok(Self {
            js_parser,
            ts_parser,
            tsx_parser,
        })
    }

    /// Parses one source file and annotates `records` in place.
    ///
    /// Marking is monotonic: a record referenced by an earlier file is
    /// never reverted by a later one, so file order does not change the
    /// outcome.
    pub fn extract(
        &mut self,
        source: &str,
        language: SourceLanguage,
        index: usize,
        path: &Path,
        records: &mut Vec<DependencyRecord>,
    ) -> AnalysisResult<()> {
        let parser = match language {
            SourceLanguage::JavaScript | SourceLanguage::Jsx => &mut self.js_parser,
            SourceLanguage::TypeScript | SourceLanguage::Vue => &mut self.ts_parser,
            SourceLanguage::Tsx => &mut self.tsx_parser,
        };

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| AnalysisError::SyntaxTree {
                index,
                path: path.display().to_string(),
                snippet: snippet(source),
            })?;

        let mut cursor = tree.root_node().walk();
        visit_node(&mut cursor, source, records);
        Ok(())
    }
}

/// Recursively visit nodes to find import-like constructs.
fn visit_node(cursor: &mut TreeCursor, source: &str, records: &mut Vec<DependencyRecord>) {
    let node = cursor.node();

    match node.kind() {
        "import_statement" => handle_import_statement(&node, source, records),
        "call_expression" => handle_call_expression(&node, source, records),
        _ => {}
    }

    if cursor.goto_first_child() {
        loop {
            visit_node(cursor, source, records);
            if !cursor.goto_next_sibling() {
                break;
            }
        }
        cursor.goto_parent();
    }
}

/// Handles `import ... from 'specifier'` and bare `import 'specifier'`.
fn handle_import_statement(node: &Node, source: &str, records: &mut [DependencyRecord]) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "string" {
            if let Some(specifier) = string_value(&child, source) {
                mark_specifier(records, &specifier, ReferenceKind::StaticImport);
            }
            return;
        }
    }
}

/// Handles `require(...)` and dynamic `import(...)` call expressions.
///
/// Calls with a single string-literal argument resolve like static
/// imports; calls with a single computed argument become synthetic
/// dynamic-unresolved records carrying the verbatim call text.
fn handle_call_expression(node: &Node, source: &str, records: &mut Vec<DependencyRecord>) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };
    let Some(function_text) = node_text(&function, source) else {
        return;
    };
    let kind = match function_text {
        "require" => ReferenceKind::Require,
        "import" => ReferenceKind::DynamicImport,
        _ => return,
    };

    let Some(args) = node.child_by_field_name("arguments") else {
        return;
    };
    let mut cursor = args.walk();
    let arguments: Vec<Node> = args
        .named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect();
    if arguments.len() != 1 {
        return;
    }

    let argument = arguments[0];
    if argument.kind() == "string" {
        if let Some(specifier) = string_value(&argument, source) {
            mark_specifier(records, &specifier, kind);
        }
    } else {
        let argument_text = node_text(&argument, source).unwrap_or_default();
        let call_text = node_text(node, source).unwrap_or_default();
        push_unresolved_dynamic(records, argument_text, call_text);
    }
}

/// Resolves a module specifier against the declared records.
///
/// Relative specifiers are ignored. An exact name match marks directly;
/// otherwise the trailing `/`-delimited segments are stripped one by one
/// until a declared name matches, which covers subpath imports of plain
/// and scoped packages alike.
fn mark_specifier(records: &mut [DependencyRecord], specifier: &str, kind: ReferenceKind) {
    if specifier.starts_with('.') {
        return;
    }
    if mark_referenced(records, specifier, kind) {
        return;
    }

    let mut target = specifier;
    while let Some(slash) = target.rfind('/') {
        target = &target[..slash];
        if mark_referenced(records, target, kind) {
            return;
        }
    }
}

/// Extract the text content of a node.
fn node_text<'a>(node: &Node, source: &'a str) -> Option<&'a str> {
    source.get(node.start_byte()..node.end_byte())
}

/// Extract string value (removes quotes).
fn string_value(node: &Node, source: &str) -> Option<String> {
    let text = node_text(node, source)?;
    let trimmed = text
        .trim_start_matches(['"', '\'', '`'])
        .trim_end_matches(['"', '\'', '`']);
    Some(trimmed.to_string())
}

/// The leading content slice included in syntax-tree error messages.
fn snippet(source: &str) -> String {
    source.chars().take(100).collect()
}
