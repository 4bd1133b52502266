//! Grammar adapters and the caller-owned registry that maps extensions to them.
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tree_sitter::{Language, Node, Parser, Tree};

use crate::error::{Error, Result};
use crate::languages::{GoAdapter, MarkdownAdapter, PythonAdapter, RustAdapter, ShellAdapter, TypeScriptAdapter};
use crate::types::{Symbol, SymbolKind};

/// Turns one file's source text into a flat list of declaration symbols.
///
/// Adapters are stateless: every call builds its own parser, so one adapter
/// instance can be shared across files and threads.
pub trait LanguageAdapter: Send + Sync {
    /// Extract every declaration in `source`. `file` is the project-relative
    /// path recorded on each symbol.
    ///
    /// # Errors
    ///
    /// Returns `Error::ParseFailed` if the grammar cannot be loaded or the
    /// parser gives up on the input.
    fn extract(&self, file: &str, source: &str) -> Result<Vec<Symbol>>;

    /// Human-readable language name.
    fn name(&self) -> &'static str;
}

/// Extension → adapter table, built explicitly by the caller.
#[derive(Clone, Default)]
pub struct LanguageRegistry {
    /// Lowercase extension without the dot → adapter.
    adapters: BTreeMap<String, Arc<dyn LanguageAdapter>>,
}

impl LanguageRegistry {
    /// The adapter for `path`'s extension, if one is registered.
    pub fn adapter_for(&self, path: &Path) -> Option<&dyn LanguageAdapter> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        return self.adapters.get(&ext).map(|a| return a.as_ref());
    }

    /// Registered extensions in sorted order.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        return self.adapters.keys().map(String::as_str);
    }

    /// An empty registry.
    pub fn new() -> Self {
        return Self::default();
    }

    /// Register `adapter` for each of `extensions`, replacing earlier entries.
    pub fn register(&mut self, extensions: &[&str], adapter: Arc<dyn LanguageAdapter>) -> &mut Self {
        for ext in extensions {
            self.adapters.insert(ext.trim_start_matches('.').to_ascii_lowercase(), Arc::clone(&adapter));
        }
        return self;
    }

    /// Registry with every built-in grammar.
    pub fn with_default_adapters() -> Self {
        let mut registry = Self::new();
        registry
            .register(&["go"], Arc::new(GoAdapter))
            .register(&["md", "markdown"], Arc::new(MarkdownAdapter))
            .register(&["py", "pyi"], Arc::new(PythonAdapter))
            .register(&["rs"], Arc::new(RustAdapter))
            .register(&["sh", "bash"], Arc::new(ShellAdapter))
            .register(&["ts", "mts", "cts", "js", "mjs", "cjs"], Arc::new(TypeScriptAdapter::typescript()))
            .register(&["tsx", "jsx"], Arc::new(TypeScriptAdapter::tsx()));
        return registry;
    }
}

impl std::fmt::Debug for LanguageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table: BTreeMap<&str, &str> = self.adapters.iter().map(|(k, v)| return (k.as_str(), v.name())).collect();
        return f.debug_struct("LanguageRegistry").field("adapters", &table).finish();
    }
}

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    return text.split_whitespace().collect::<Vec<_>>().join(" ");
}

/// Declaration text from the node's start up to (not including) `body`,
/// whitespace-normalized, with trailing `:`, `{`, `=`, and `;` removed.
/// Without a body, the whole node text is used.
pub fn header_signature(node: Node<'_>, body: Option<Node<'_>>, source: &str) -> Option<String> {
    let end = body.map_or(node.end_byte(), |b| return b.start_byte());
    let text = source.get(node.start_byte()..end)?;
    let collapsed = collapse_whitespace(text);
    let trimmed = collapsed.trim_end_matches([':', '{', '=', ';', ' ']).to_string();
    return if trimmed.is_empty() { None } else { Some(trimmed) };
}

/// Build a symbol positioned at `node`.
pub fn make_symbol(file: &str, node: Node<'_>, name: &str, kind: SymbolKind) -> Symbol {
    let position = node.start_position();
    return Symbol {
        column: u32::try_from(position.column).unwrap_or(u32::MAX),
        doc: None,
        enclosing: None,
        file: file.to_string(),
        kind,
        line: u32::try_from(position.row).unwrap_or(u32::MAX).saturating_add(1),
        name: name.to_string(),
        signature: None,
    };
}

/// UTF-8 text of a node.
pub fn node_text<'s>(node: Node<'_>, source: &'s str) -> Option<&'s str> {
    return source.get(node.start_byte()..node.end_byte());
}

/// Parse `source` with `language`.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the language cannot be set or parsing fails.
pub fn parse_source(file: &str, source: &str, language: &Language) -> Result<Tree> {
    let mut parser = Parser::new();
    parser.set_language(language).map_err(|e| return Error::ParseFailed {
        file: file.to_string(),
        reason: e.to_string(),
    })?;

    let tree = parser.parse(source, None).ok_or_else(|| return Error::ParseFailed {
        file: file.to_string(),
        reason: "tree-sitter returned None".to_string(),
    })?;
    if tree.root_node().has_error() {
        tracing::debug!(file, "syntax errors present; extracting from partial tree");
    }
    return Ok(tree);
}

/// Contiguous comment block directly above `node`, with each line passed
/// through `strip`. Attribute/decorator siblings between the comment and the
/// node are skipped when `skip` accepts their kind.
pub fn preceding_comments(
    node: Node<'_>,
    source: &str,
    is_comment: impl Fn(&str, &str) -> bool,
    skip: impl Fn(&str) -> bool,
    strip: impl Fn(&str) -> String,
) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut expected_row = node.start_position().row;
    let mut current = node.prev_sibling();

    while let Some(sibling) = current {
        let kind = sibling.kind();
        if skip(kind) {
            expected_row = sibling.start_position().row;
            current = sibling.prev_sibling();
            continue;
        }
        let text = node_text(sibling, source)?;
        // Comments must touch the declaration (or the previous comment line).
        if !is_comment(kind, text) || sibling.end_position().row.saturating_add(1) < expected_row {
            break;
        }
        lines.push(strip(text));
        expected_row = sibling.start_position().row;
        current = sibling.prev_sibling();
    }

    lines.reverse();
    let doc = lines.join("\n").trim().to_string();
    return if doc.is_empty() { None } else { Some(doc) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace() {
        assert_eq!(collapse_whitespace("  def  f(a,\n    b)  "), "def f(a, b)");
    }

    #[test]
    fn default_registry_routes_by_extension() {
        let registry = LanguageRegistry::with_default_adapters();
        assert_eq!(registry.adapter_for(Path::new("a/b.py")).map(|a| a.name()), Some("python"));
        assert_eq!(registry.adapter_for(Path::new("x.TSX")).map(|a| a.name()), Some("typescript"));
        assert_eq!(registry.adapter_for(Path::new("README.md")).map(|a| a.name()), Some("markdown"));
        assert!(registry.adapter_for(Path::new("Makefile")).is_none());
    }

    #[test]
    fn registries_are_independent() {
        let mut custom = LanguageRegistry::new();
        custom.register(&[".py"], Arc::new(PythonAdapter));
        assert_eq!(custom.extensions().collect::<Vec<_>>(), vec!["py"]);
        assert!(LanguageRegistry::new().adapter_for(Path::new("a.py")).is_none());
    }
}
