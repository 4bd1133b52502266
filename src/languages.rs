//! Built-in grammar adapters. Each walks its tree-sitter CST and records
//! declaration-level symbols; anything deeper (bodies, expressions) is ignored.

use std::collections::BTreeSet;

use tree_sitter::{Language, Node};

use crate::error::Result;
use crate::grammar::{
    LanguageAdapter, collapse_whitespace, header_signature, make_symbol, node_text, parse_source, preceding_comments,
};
use crate::types::{Symbol, SymbolKind};

/// Info-string tags whose fenced blocks are extracted as shell.
const SHELL_FENCE_TAGS: &[&str] = &["bash", "console", "sh", "shell", "shell-session", "zsh"];

/// Go: functions, methods, types, interface methods, consts, vars.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoAdapter;

/// Markdown: shell symbols inside fenced `sh`/`bash`/... code blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownAdapter;

/// Python: functions, classes, methods, module assignments, CLI commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonAdapter;

/// Rust: items, impl and trait members, nested modules.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustAdapter;

/// Shell: functions, assignments, aliases.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellAdapter;

/// TypeScript and JavaScript (the TypeScript grammar parses both).
#[derive(Debug, Clone, Copy)]
pub struct TypeScriptAdapter {
    /// Parse with the TSX dialect.
    tsx: bool,
}

impl TypeScriptAdapter {
    /// Adapter for `.tsx`/`.jsx`.
    pub const fn tsx() -> Self {
        return Self { tsx: true };
    }

    /// Adapter for `.ts`/`.js` and friends.
    pub const fn typescript() -> Self {
        return Self { tsx: false };
    }
}

// ── Shared helpers ─────────────────────────────────────────────────────

/// Text of a named field, if present.
fn field_text<'s>(node: Node<'_>, field: &str, source: &'s str) -> Option<&'s str> {
    return node_text(node.child_by_field_name(field)?, source);
}

/// First node of `kind` in `node`'s subtree (pre-order), excluding `node`.
fn first_descendant_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.id() != node.id() && current.kind() == kind {
            return Some(current);
        }
        let mut cursor = current.walk();
        let children: Vec<Node<'t>> = current.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    return None;
}

/// `SCREAMING_SNAKE` names are constants by convention.
fn is_screaming_case(name: &str) -> bool {
    return name.chars().any(|c| return c.is_ascii_alphabetic())
        && name.chars().all(|c| return c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
}

/// Strip a `//`-style marker and surrounding space from one comment line.
fn strip_line_comment(text: &str, marker: &str) -> String {
    return text.trim().trim_start_matches(marker).trim().to_string();
}

/// Strip `/** ... */` framing and leading `*` gutters.
fn strip_block_comment(text: &str) -> String {
    let inner = text.trim().trim_start_matches("/**").trim_start_matches("/*").trim_end_matches("*/");
    return inner
        .lines()
        .map(|l| return l.trim().trim_start_matches('*').trim())
        .filter(|l| return !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
}

/// Type name without generic arguments or reference sigils.
fn base_type_name(text: &str) -> String {
    let head = text.split('<').next().unwrap_or(text);
    return head.trim().trim_start_matches('&').trim_start_matches('*').trim().to_string();
}

/// Quoted string literal → its content.
fn unquote(text: &str) -> &str {
    let trimmed = text.trim();
    for quote in ["\"\"\"", "'''", "\"", "'", "`"] {
        if trimmed.len() >= quote.len().saturating_mul(2)
            && let Some(inner) = trimmed.strip_prefix(quote).and_then(|t| return t.strip_suffix(quote))
        {
            return inner;
        }
    }
    return trimmed;
}

// ── Go ─────────────────────────────────────────────────────────────────

impl LanguageAdapter for GoAdapter {
    fn extract(&self, file: &str, source: &str) -> Result<Vec<Symbol>> {
        let language: Language = tree_sitter_go::LANGUAGE.into();
        let tree = parse_source(file, source, &language)?;
        let mut symbols = Vec::new();

        let root = tree.root_node();
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            match node.kind() {
                "const_declaration" => collect_go_specs(node, source, file, "const_spec", SymbolKind::Constant, &mut symbols),
                "function_declaration" => {
                    if let Some(symbol) = go_function(node, source, file, None) {
                        symbols.push(symbol);
                    }
                },
                "method_declaration" => {
                    let receiver = node
                        .child_by_field_name("receiver")
                        .and_then(|r| return first_descendant_of_kind(r, "type_identifier"))
                        .and_then(|t| return node_text(t, source));
                    if let Some(symbol) = go_function(node, source, file, receiver) {
                        symbols.push(symbol);
                    }
                },
                "type_declaration" => collect_go_types(node, source, file, &mut symbols),
                "var_declaration" => collect_go_specs(node, source, file, "var_spec", SymbolKind::Variable, &mut symbols),
                _ => {},
            }
        }
        return Ok(symbols);
    }

    fn name(&self) -> &'static str {
        return "go";
    }
}

/// `// ...` lines directly above a Go declaration.
fn go_doc(node: Node<'_>, source: &str) -> Option<String> {
    return preceding_comments(
        node,
        source,
        |kind, text| return kind == "comment" && text.starts_with("//"),
        |_| return false,
        |text| return strip_line_comment(text, "//"),
    );
}

/// Function or method (when `receiver` is set).
fn go_function(node: Node<'_>, source: &str, file: &str, receiver: Option<&str>) -> Option<Symbol> {
    let name = field_text(node, "name", source)?;
    let kind = if receiver.is_some() { SymbolKind::Method } else { SymbolKind::Function };
    let mut symbol = make_symbol(file, node, name, kind);
    symbol.signature = header_signature(node, node.child_by_field_name("body"), source);
    symbol.enclosing = receiver.map(String::from);
    symbol.doc = go_doc(node, source);
    return Some(symbol);
}

/// Every `const_spec`/`var_spec` under a declaration, one symbol per name.
fn collect_go_specs(
    declaration: Node<'_>,
    source: &str,
    file: &str,
    spec_kind: &str,
    kind: SymbolKind,
    symbols: &mut Vec<Symbol>,
) {
    let mut stack = vec![declaration];
    let mut specs = Vec::new();
    while let Some(current) = stack.pop() {
        let mut cursor = current.walk();
        for child in current.named_children(&mut cursor) {
            if child.kind() == spec_kind {
                specs.push(child);
            } else if child.kind().ends_with("_list") {
                stack.push(child);
            }
        }
    }
    specs.sort_by_key(|s| return s.start_byte());

    for spec in specs {
        let type_text = field_text(spec, "type", source);
        let doc = go_doc(spec, source).or_else(|| return go_doc(declaration, source));
        let mut cursor = spec.walk();
        for name_node in spec.children_by_field_name("name", &mut cursor) {
            let Some(name) = node_text(name_node, source) else {
                continue;
            };
            let mut symbol = make_symbol(file, spec, name, kind);
            symbol.signature = type_text.map(|t| return collapse_whitespace(&format!("{name} {t}")));
            symbol.doc.clone_from(&doc);
            symbols.push(symbol);
        }
    }
}

/// Named types and aliases, plus interface method sets.
fn collect_go_types(declaration: Node<'_>, source: &str, file: &str, symbols: &mut Vec<Symbol>) {
    let mut cursor = declaration.walk();
    for spec in declaration.named_children(&mut cursor) {
        if spec.kind() != "type_spec" && spec.kind() != "type_alias" {
            continue;
        }
        let (Some(name), Some(type_node)) = (field_text(spec, "name", source), spec.child_by_field_name("type")) else {
            continue;
        };

        let (kind, signature) = match (spec.kind(), type_node.kind()) {
            ("type_spec", "struct_type") => {
                let head = header_signature(spec, Some(type_node), source).unwrap_or_else(|| return name.to_string());
                (SymbolKind::Struct, format!("type {head} struct"))
            },
            ("type_spec", "interface_type") => {
                let head = header_signature(spec, Some(type_node), source).unwrap_or_else(|| return name.to_string());
                (SymbolKind::Interface, format!("type {head} interface"))
            },
            _ => (SymbolKind::TypeAlias, format!("type {}", header_signature(spec, None, source).unwrap_or_default())),
        };

        let mut symbol = make_symbol(file, spec, name, kind);
        symbol.signature = Some(signature);
        symbol.doc = go_doc(spec, source).or_else(|| return go_doc(declaration, source));
        symbols.push(symbol);

        if kind == SymbolKind::Interface {
            let mut members = type_node.walk();
            for member in type_node.named_children(&mut members) {
                if member.kind() != "method_elem" && member.kind() != "method_spec" {
                    continue;
                }
                let Some(method) = field_text(member, "name", source) else {
                    continue;
                };
                let mut symbol = make_symbol(file, member, method, SymbolKind::Method);
                symbol.signature = header_signature(member, None, source);
                symbol.enclosing = Some(name.to_string());
                symbol.doc = go_doc(member, source);
                symbols.push(symbol);
            }
        }
    }
}

// ── Markdown ───────────────────────────────────────────────────────────

impl LanguageAdapter for MarkdownAdapter {
    fn extract(&self, file: &str, source: &str) -> Result<Vec<Symbol>> {
        let language: Language = tree_sitter_md::LANGUAGE.into();
        let tree = parse_source(file, source, &language)?;
        let mut symbols = Vec::new();

        let mut stack = vec![tree.root_node()];
        let mut blocks = Vec::new();
        while let Some(node) = stack.pop() {
            if node.kind() == "fenced_code_block" {
                blocks.push(node);
                continue;
            }
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }

        for block in blocks {
            let Some((content, first_row)) = shell_fence_content(block, source) else {
                continue;
            };
            match ShellAdapter.extract(file, &content) {
                Err(e) => tracing::debug!(file, error = %e, "skipping unparsable shell block"),
                Ok(found) => {
                    let offset = u32::try_from(first_row).unwrap_or(u32::MAX);
                    symbols.extend(found.into_iter().map(|mut s| {
                        s.line = s.line.saturating_add(offset);
                        return s;
                    }));
                },
            }
        }
        return Ok(symbols);
    }

    fn name(&self) -> &'static str {
        return "markdown";
    }
}

/// Content and starting row of a fenced block tagged with a shell language.
/// Console prompts (`$ `) are stripped so the commands parse as a script.
fn shell_fence_content(block: Node<'_>, source: &str) -> Option<(String, usize)> {
    let mut cursor = block.walk();
    let children: Vec<Node<'_>> = block.named_children(&mut cursor).collect();

    let info = children.iter().find(|c| return c.kind() == "info_string")?;
    let tag = node_text(*info, source)?.split_whitespace().next()?.to_ascii_lowercase();
    let tag = tag.trim_start_matches('{').trim_end_matches('}');
    if !SHELL_FENCE_TAGS.contains(&tag) {
        return None;
    }

    let body = children.iter().find(|c| return c.kind() == "code_fence_content")?;
    let text = node_text(*body, source)?;
    let content = if tag == "console" || tag == "shell-session" {
        text.lines().map(|l| return l.strip_prefix("$ ").unwrap_or(l)).collect::<Vec<_>>().join("\n")
    } else {
        text.to_string()
    };
    return Some((content, body.start_position().row));
}

// ── Python ─────────────────────────────────────────────────────────────

impl LanguageAdapter for PythonAdapter {
    fn extract(&self, file: &str, source: &str) -> Result<Vec<Symbol>> {
        let language: Language = tree_sitter_python::LANGUAGE.into();
        let tree = parse_source(file, source, &language)?;
        let mut symbols = Vec::new();
        collect_python_block(tree.root_node(), source, file, None, &mut symbols);
        return Ok(symbols);
    }

    fn name(&self) -> &'static str {
        return "python";
    }
}

/// Walk one module or class body.
fn collect_python_block(block: Node<'_>, source: &str, file: &str, enclosing: Option<&str>, symbols: &mut Vec<Symbol>) {
    let mut cursor = block.walk();
    for node in block.named_children(&mut cursor) {
        match node.kind() {
            "class_definition" => python_class(node, source, file, enclosing, symbols),
            "decorated_definition" => {
                let Some(definition) = node.child_by_field_name("definition") else {
                    continue;
                };
                if definition.kind() == "class_definition" {
                    python_class(definition, source, file, enclosing, symbols);
                } else if let Some(symbol) =
                    python_function(definition, source, file, enclosing, python_is_command(node, source))
                {
                    symbols.push(symbol);
                }
            },
            "expression_statement" if enclosing.is_none() => {
                if let Some(symbol) = python_assignment(node, source, file)
                    && !symbols.iter().any(|s| return s.name == symbol.name && s.enclosing.is_none())
                {
                    symbols.push(symbol);
                }
            },
            "function_definition" => {
                if let Some(symbol) = python_function(node, source, file, enclosing, false) {
                    symbols.push(symbol);
                }
            },
            _ => {},
        }
    }
}

/// Module-level `NAME = ...` / `name: T = ...`.
fn python_assignment(statement: Node<'_>, source: &str, file: &str) -> Option<Symbol> {
    let assignment = statement.named_child(0).filter(|n| return n.kind() == "assignment")?;
    let left = assignment.child_by_field_name("left").filter(|n| return n.kind() == "identifier")?;
    let name = node_text(left, source)?;
    let kind = if is_screaming_case(name) { SymbolKind::Constant } else { SymbolKind::Variable };

    let mut symbol = make_symbol(file, statement, name, kind);
    symbol.signature = field_text(assignment, "type", source).map(|t| return collapse_whitespace(&format!("{name}: {t}")));
    return Some(symbol);
}

/// Class plus its members, recursively.
fn python_class(node: Node<'_>, source: &str, file: &str, enclosing: Option<&str>, symbols: &mut Vec<Symbol>) {
    let Some(name) = field_text(node, "name", source) else {
        return;
    };
    let body = node.child_by_field_name("body");

    let mut symbol = make_symbol(file, node, name, SymbolKind::ClassLike);
    symbol.signature = header_signature(node, body, source);
    symbol.enclosing = enclosing.map(String::from);
    symbol.doc = body.and_then(|b| return python_docstring(b, source));
    symbols.push(symbol);

    if let Some(body) = body {
        collect_python_block(body, source, file, Some(name), symbols);
    }
}

/// Docstring: a string literal as the first statement of a body.
fn python_docstring(body: Node<'_>, source: &str) -> Option<String> {
    let statement = body.named_child(0).filter(|n| return n.kind() == "expression_statement")?;
    let literal = statement.named_child(0).filter(|n| return n.kind() == "string")?;
    let raw = node_text(literal, source)?.trim_start_matches(['r', 'R', 'u', 'U', 'b', 'B', 'f', 'F']);
    let doc = unquote(raw).lines().map(str::trim).collect::<Vec<_>>().join("\n").trim().to_string();
    return if doc.is_empty() { None } else { Some(doc) };
}

/// Function or method; `command` marks click/typer-style registrations.
fn python_function(node: Node<'_>, source: &str, file: &str, enclosing: Option<&str>, command: bool) -> Option<Symbol> {
    let name = field_text(node, "name", source)?;
    let kind = match (command, enclosing) {
        (true, _) => SymbolKind::CommandRegistration,
        (false, Some(_)) => SymbolKind::Method,
        (false, None) => SymbolKind::Function,
    };
    let body = node.child_by_field_name("body");

    let mut symbol = make_symbol(file, node, name, kind);
    symbol.signature = header_signature(node, body, source);
    symbol.enclosing = enclosing.map(String::from);
    symbol.doc = body.and_then(|b| return python_docstring(b, source));
    return Some(symbol);
}

/// Whether a decorated definition carries `@<x>.command(...)` or `@command`.
fn python_is_command(decorated: Node<'_>, source: &str) -> bool {
    let mut cursor = decorated.walk();
    return decorated.named_children(&mut cursor).filter(|c| return c.kind() == "decorator").any(|decorator| {
        let text = node_text(decorator, source).unwrap_or("").trim().trim_start_matches('@');
        let target = text.split('(').next().unwrap_or("").trim();
        return target == "command" || target.ends_with(".command");
    });
}

// ── Rust ───────────────────────────────────────────────────────────────

impl LanguageAdapter for RustAdapter {
    fn extract(&self, file: &str, source: &str) -> Result<Vec<Symbol>> {
        let language: Language = tree_sitter_rust::LANGUAGE.into();
        let tree = parse_source(file, source, &language)?;
        let mut symbols = Vec::new();
        collect_rust_items(tree.root_node(), source, file, &mut symbols);
        return Ok(symbols);
    }

    fn name(&self) -> &'static str {
        return "rust";
    }
}

/// Walk a file or inline module body.
fn collect_rust_items(container: Node<'_>, source: &str, file: &str, symbols: &mut Vec<Symbol>) {
    let mut cursor = container.walk();
    for node in container.named_children(&mut cursor) {
        let body = node.child_by_field_name("body");
        let kind = match node.kind() {
            "const_item" | "static_item" => SymbolKind::Constant,
            "enum_item" => SymbolKind::ClassLike,
            "function_item" | "function_signature_item" => SymbolKind::Function,
            "impl_item" => {
                collect_rust_impl(node, source, file, symbols);
                continue;
            },
            "mod_item" => {
                if let Some(body) = body {
                    collect_rust_items(body, source, file, symbols);
                }
                continue;
            },
            "struct_item" | "union_item" => SymbolKind::Struct,
            "trait_item" => SymbolKind::Interface,
            "type_item" => SymbolKind::TypeAlias,
            _ => continue,
        };
        let Some(symbol) = rust_symbol(node, source, file, kind) else {
            continue;
        };
        let name = symbol.name.clone();
        symbols.push(symbol);

        if kind == SymbolKind::Interface
            && let Some(body) = body
        {
            collect_rust_members(body, source, file, &name, symbols);
        }
    }
}

/// Methods and associated consts of an `impl` block.
fn collect_rust_impl(node: Node<'_>, source: &str, file: &str, symbols: &mut Vec<Symbol>) {
    let Some(type_name) = field_text(node, "type", source).map(base_type_name) else {
        return;
    };
    if let Some(body) = node.child_by_field_name("body") {
        collect_rust_members(body, source, file, &type_name, symbols);
    }
}

/// Members of an impl or trait body, tagged with the owning type.
fn collect_rust_members(body: Node<'_>, source: &str, file: &str, owner: &str, symbols: &mut Vec<Symbol>) {
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        let kind = match member.kind() {
            "const_item" => SymbolKind::Constant,
            "function_item" | "function_signature_item" => SymbolKind::Method,
            "type_item" => SymbolKind::TypeAlias,
            _ => continue,
        };
        if let Some(mut symbol) = rust_symbol(member, source, file, kind) {
            symbol.enclosing = Some(owner.to_string());
            symbols.push(symbol);
        }
    }
}

/// `///` and `/** */` doc comments above an item, skipping attributes.
fn rust_doc(node: Node<'_>, source: &str) -> Option<String> {
    return preceding_comments(
        node,
        source,
        |kind, text| {
            return (kind == "line_comment" && text.starts_with("///") && !text.starts_with("////"))
                || (kind == "block_comment" && text.starts_with("/**"));
        },
        |kind| return kind == "attribute_item",
        |text| {
            if text.starts_with("/**") {
                return strip_block_comment(text);
            }
            return strip_line_comment(text, "///");
        },
    );
}

/// One Rust item. The signature stops at the body or, for consts, the value.
fn rust_symbol(node: Node<'_>, source: &str, file: &str, kind: SymbolKind) -> Option<Symbol> {
    let name = field_text(node, "name", source)?;
    let cut = node.child_by_field_name("body").or_else(|| return node.child_by_field_name("value"));
    let cut = if kind == SymbolKind::TypeAlias { None } else { cut };

    let mut symbol = make_symbol(file, node, name, kind);
    symbol.signature = header_signature(node, cut, source);
    symbol.doc = rust_doc(node, source);
    return Some(symbol);
}

// ── Shell ──────────────────────────────────────────────────────────────

impl LanguageAdapter for ShellAdapter {
    fn extract(&self, file: &str, source: &str) -> Result<Vec<Symbol>> {
        let language: Language = tree_sitter_bash::LANGUAGE.into();
        let tree = parse_source(file, source, &language)?;
        let mut symbols = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();

        let root = tree.root_node();
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            let found = match node.kind() {
                "command" => shell_alias(node, source, file).into_iter().collect(),
                "declaration_command" => shell_declarations(node, source, file),
                "function_definition" => shell_function(node, source, file).into_iter().collect(),
                "variable_assignment" => shell_assignment(node, source, file, SymbolKind::Variable).into_iter().collect(),
                _ => Vec::new(),
            };
            for symbol in found {
                if seen.insert(symbol.name.clone()) {
                    symbols.push(symbol);
                }
            }
        }
        return Ok(symbols);
    }

    fn name(&self) -> &'static str {
        return "shell";
    }
}

/// `alias name=...` registers a command.
fn shell_alias(node: Node<'_>, source: &str, file: &str) -> Option<Symbol> {
    if field_text(node, "name", source)?.trim() != "alias" {
        return None;
    }
    let mut cursor = node.walk();
    let argument = node.children_by_field_name("argument", &mut cursor).next()?;
    let (name, _) = node_text(argument, source)?.split_once('=')?;

    let mut symbol = make_symbol(file, node, name.trim(), SymbolKind::CommandRegistration);
    symbol.signature = header_signature(node, None, source);
    symbol.doc = shell_doc(node, source);
    return Some(symbol);
}

/// `NAME=value`.
fn shell_assignment(node: Node<'_>, source: &str, file: &str, kind: SymbolKind) -> Option<Symbol> {
    let name = field_text(node, "name", source)?;
    let mut symbol = make_symbol(file, node, name, kind);
    symbol.doc = shell_doc(node, source);
    return Some(symbol);
}

/// `export`/`readonly`/`declare` with assignments; `readonly` makes constants.
fn shell_declarations(node: Node<'_>, source: &str, file: &str) -> Vec<Symbol> {
    let keyword = node.child(0).and_then(|k| return node_text(k, source)).unwrap_or("");
    let kind = if keyword == "readonly" { SymbolKind::Constant } else { SymbolKind::Variable };
    let doc = shell_doc(node, source);

    let mut cursor = node.walk();
    return node
        .named_children(&mut cursor)
        .filter(|c| return c.kind() == "variable_assignment")
        .filter_map(|assignment| {
            let mut symbol = shell_assignment(assignment, source, file, kind)?;
            symbol.doc.clone_from(&doc);
            return Some(symbol);
        })
        .collect();
}

/// `# ...` lines directly above a shell statement.
fn shell_doc(node: Node<'_>, source: &str) -> Option<String> {
    return preceding_comments(
        node,
        source,
        |kind, text| return kind == "comment" && !text.starts_with("#!"),
        |_| return false,
        |text| return strip_line_comment(text, "#"),
    );
}

/// `name() { ... }` or `function name { ... }`.
fn shell_function(node: Node<'_>, source: &str, file: &str) -> Option<Symbol> {
    let name = field_text(node, "name", source)?;
    let mut symbol = make_symbol(file, node, name, SymbolKind::Function);
    symbol.signature = header_signature(node, node.child_by_field_name("body"), source);
    symbol.doc = shell_doc(node, source);
    return Some(symbol);
}

// ── TypeScript ─────────────────────────────────────────────────────────

impl LanguageAdapter for TypeScriptAdapter {
    fn extract(&self, file: &str, source: &str) -> Result<Vec<Symbol>> {
        let language: Language = if self.tsx {
            tree_sitter_typescript::LANGUAGE_TSX.into()
        } else {
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
        };
        let tree = parse_source(file, source, &language)?;
        let root = tree.root_node();
        let mut symbols = Vec::new();

        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            if node.kind() == "export_statement" {
                if let Some(declaration) = node.child_by_field_name("declaration") {
                    ts_declaration(declaration, node, source, file, &mut symbols);
                }
                continue;
            }
            ts_declaration(node, node, source, file, &mut symbols);
        }

        collect_ts_command_registrations(root, source, file, &mut symbols);
        return Ok(symbols);
    }

    fn name(&self) -> &'static str {
        return "typescript";
    }
}

/// `*.registerCommand("id", ...)` calls anywhere in the file.
fn collect_ts_command_registrations(root: Node<'_>, source: &str, file: &str, symbols: &mut Vec<Symbol>) {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind() == "call_expression"
            && let Some(symbol) = ts_command_registration(node, source, file)
            && seen.insert(symbol.name.clone())
        {
            symbols.push(symbol);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
}

/// Class members: methods, abstract and signature-only methods.
fn collect_ts_members(body: Node<'_>, source: &str, file: &str, owner: &str, symbols: &mut Vec<Symbol>) {
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        if !matches!(member.kind(), "abstract_method_signature" | "method_definition" | "method_signature") {
            continue;
        }
        let Some(name) = field_text(member, "name", source) else {
            continue;
        };
        let mut symbol = make_symbol(file, member, name, SymbolKind::Method);
        symbol.signature = header_signature(member, member.child_by_field_name("body"), source);
        symbol.enclosing = Some(owner.to_string());
        symbol.doc = ts_doc(member, source);
        symbols.push(symbol);
    }
}

/// `const`/`let`/`var` declarators; function-valued ones become functions.
fn collect_ts_variables(node: Node<'_>, anchor: Node<'_>, source: &str, file: &str, symbols: &mut Vec<Symbol>) {
    let keyword = node.child(0).and_then(|k| return node_text(k, source)).unwrap_or("var");
    let doc = ts_doc(anchor, source);

    let mut cursor = node.walk();
    for declarator in node.named_children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(name_node) = declarator.child_by_field_name("name").filter(|n| return n.kind() == "identifier") else {
            continue;
        };
        let Some(name) = node_text(name_node, source) else {
            continue;
        };
        let value = declarator.child_by_field_name("value");
        let is_function = value.is_some_and(|v| {
            return matches!(v.kind(), "arrow_function" | "function_expression" | "function" | "generator_function");
        });

        let mut symbol = if let (true, Some(value)) = (is_function, value) {
            let params = field_text(value, "parameters", source)
                .map(String::from)
                .or_else(|| return field_text(value, "parameter", source).map(|p| return format!("({p})")))
                .unwrap_or_else(|| return "()".to_string());
            let returns = field_text(value, "return_type", source).unwrap_or("");
            let mut symbol = make_symbol(file, declarator, name, SymbolKind::Function);
            symbol.signature = Some(collapse_whitespace(&format!("{name}{params}{returns}")));
            symbol
        } else {
            let kind = if keyword == "const" { SymbolKind::Constant } else { SymbolKind::Variable };
            let mut symbol = make_symbol(file, declarator, name, kind);
            symbol.signature = field_text(declarator, "type", source)
                .map(|t| return collapse_whitespace(&format!("{name}{t}")));
            symbol
        };
        symbol.doc.clone_from(&doc);
        symbols.push(symbol);
    }
}

/// `registerCommand("id", handler)` → a command symbol named `id`.
fn ts_command_registration(call: Node<'_>, source: &str, file: &str) -> Option<Symbol> {
    let callee = call.child_by_field_name("function")?;
    let method = match callee.kind() {
        "member_expression" => field_text(callee, "property", source)?,
        "identifier" => node_text(callee, source)?,
        _ => return None,
    };
    if method != "registerCommand" && method != "registerTextEditorCommand" {
        return None;
    }
    let arguments = call.child_by_field_name("arguments")?;
    let first = arguments.named_child(0).filter(|a| return a.kind() == "string")?;
    let id = unquote(node_text(first, source)?);
    if id.is_empty() {
        return None;
    }
    return Some(make_symbol(file, call, id, SymbolKind::CommandRegistration));
}

/// One top-level declaration. `anchor` is the node comments attach to
/// (the `export` statement when there is one).
fn ts_declaration(node: Node<'_>, anchor: Node<'_>, source: &str, file: &str, symbols: &mut Vec<Symbol>) {
    let kind = match node.kind() {
        "abstract_class_declaration" | "class_declaration" | "enum_declaration" => SymbolKind::ClassLike,
        "function_declaration" | "function_signature" | "generator_function_declaration" => SymbolKind::Function,
        "interface_declaration" => SymbolKind::Interface,
        "lexical_declaration" | "variable_declaration" => {
            collect_ts_variables(node, anchor, source, file, symbols);
            return;
        },
        "type_alias_declaration" => SymbolKind::TypeAlias,
        _ => return,
    };
    let Some(name) = field_text(node, "name", source) else {
        return;
    };
    let body = if kind == SymbolKind::TypeAlias { None } else { node.child_by_field_name("body") };

    let mut symbol = make_symbol(file, node, name, kind);
    symbol.signature = header_signature(node, body, source);
    symbol.doc = ts_doc(anchor, source);
    symbols.push(symbol);

    if matches!(node.kind(), "abstract_class_declaration" | "class_declaration")
        && let Some(body) = body
    {
        collect_ts_members(body, source, file, name, symbols);
    }
}

/// The `/** ... */` block directly above a declaration.
fn ts_doc(node: Node<'_>, source: &str) -> Option<String> {
    let previous = node.prev_sibling().filter(|p| return p.kind() == "comment")?;
    if previous.end_position().row.saturating_add(1) < node.start_position().row {
        return None;
    }
    let text = node_text(previous, source)?;
    if !text.starts_with("/**") {
        return None;
    }
    let doc = strip_block_comment(text);
    return if doc.is_empty() { None } else { Some(doc) };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(symbols: &'a [Symbol], name: &str) -> &'a Symbol {
        return symbols.iter().find(|s| s.name == name).unwrap_or_else(|| panic!("missing symbol {name}: {symbols:#?}"));
    }

    #[test]
    fn python_functions_classes_and_methods() {
        let source = r#"
MAX_RETRIES = 3
timeout: float = 1.5

def do_thing(x, y=2):
    """Do the thing."""
    return x

class Client(Base):
    """HTTP client."""

    def send(self, payload) -> bool:
        return True

    def _retry(self):
        pass
"#;
        let symbols = PythonAdapter.extract("pkg/client.py", source).unwrap();

        let func = find(&symbols, "do_thing");
        assert_eq!(func.kind, SymbolKind::Function);
        assert_eq!(func.line, 5);
        assert_eq!(func.column, 0);
        assert_eq!(func.signature.as_deref(), Some("def do_thing(x, y=2)"));
        assert_eq!(func.doc.as_deref(), Some("Do the thing."));

        let class = find(&symbols, "Client");
        assert_eq!(class.kind, SymbolKind::ClassLike);
        assert_eq!(class.signature.as_deref(), Some("class Client(Base)"));
        assert_eq!(class.doc.as_deref(), Some("HTTP client."));

        let send = find(&symbols, "send");
        assert_eq!(send.kind, SymbolKind::Method);
        assert_eq!(send.enclosing.as_deref(), Some("Client"));
        assert_eq!(send.signature.as_deref(), Some("def send(self, payload) -> bool"));

        assert_eq!(find(&symbols, "MAX_RETRIES").kind, SymbolKind::Constant);
        let timeout = find(&symbols, "timeout");
        assert_eq!(timeout.kind, SymbolKind::Variable);
        assert_eq!(timeout.signature.as_deref(), Some("timeout: float"));
        assert!(symbols.iter().all(|s| s.file == "pkg/client.py"));
    }

    #[test]
    fn python_click_commands_are_registrations() {
        let source = "@cli.command()\n@click.option('--n')\ndef deploy(n):\n    pass\n\n@staticmethod\ndef helper():\n    pass\n";
        let symbols = PythonAdapter.extract("cli.py", source).unwrap();
        assert_eq!(find(&symbols, "deploy").kind, SymbolKind::CommandRegistration);
        assert_eq!(find(&symbols, "helper").kind, SymbolKind::Function);
    }

    #[test]
    fn rust_items_impls_and_docs() {
        let source = r#"
/// Server configuration.
#[derive(Debug)]
pub struct Config {
    host: String,
}

pub const MAX: u64 = 16;

impl<T> Wrapper<T> {
    /// Build it.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

pub trait Store {
    fn get(&self, key: &str) -> Option<String>;
}

pub type Id = u64;
"#;
        let symbols = RustAdapter.extract("src/lib.rs", source).unwrap();

        let config = find(&symbols, "Config");
        assert_eq!(config.kind, SymbolKind::Struct);
        assert_eq!(config.signature.as_deref(), Some("pub struct Config"));
        assert_eq!(config.doc.as_deref(), Some("Server configuration."));

        assert_eq!(find(&symbols, "MAX").signature.as_deref(), Some("pub const MAX: u64"));

        let new = find(&symbols, "new");
        assert_eq!(new.kind, SymbolKind::Method);
        assert_eq!(new.enclosing.as_deref(), Some("Wrapper"));
        assert_eq!(new.signature.as_deref(), Some("pub fn new(inner: T) -> Self"));
        assert_eq!(new.doc.as_deref(), Some("Build it."));

        let get = find(&symbols, "get");
        assert_eq!(get.enclosing.as_deref(), Some("Store"));
        assert_eq!(find(&symbols, "Store").kind, SymbolKind::Interface);
        assert_eq!(find(&symbols, "Id").kind, SymbolKind::TypeAlias);
    }

    #[test]
    fn typescript_declarations_and_commands() {
        let source = r#"
/** Adds numbers. */
export function add(a: number, b: number): number {
  return a + b;
}

export const double = (n: number): number => n * 2;
const LIMIT: number = 10;

export interface Shape { area(): number }
type Point = { x: number; y: number };

export class Circle implements Shape {
  area(): number { return 1; }
}

export function activate(context: any) {
  context.subscriptions.push(vscode.commands.registerCommand('ext.sayHello', () => {}));
}
"#;
        let symbols = TypeScriptAdapter::typescript().extract("src/ext.ts", source).unwrap();

        let add = find(&symbols, "add");
        assert_eq!(add.kind, SymbolKind::Function);
        assert_eq!(add.signature.as_deref(), Some("function add(a: number, b: number): number"));
        assert_eq!(add.doc.as_deref(), Some("Adds numbers."));

        let double = find(&symbols, "double");
        assert_eq!(double.kind, SymbolKind::Function);
        assert_eq!(double.signature.as_deref(), Some("double(n: number): number"));

        assert_eq!(find(&symbols, "LIMIT").kind, SymbolKind::Constant);
        assert_eq!(find(&symbols, "Shape").kind, SymbolKind::Interface);
        assert_eq!(find(&symbols, "Point").kind, SymbolKind::TypeAlias);
        assert_eq!(find(&symbols, "area").enclosing.as_deref(), Some("Circle"));
        assert_eq!(find(&symbols, "ext.sayHello").kind, SymbolKind::CommandRegistration);
    }

    #[test]
    fn go_types_methods_and_values() {
        let source = r#"package store

// Store keeps things.
type Store struct {
	items map[string]string
}

type Reader interface {
	Read(key string) (string, error)
}

// Get returns a value.
func (s *Store) Get(key string) string {
	return s.items[key]
}

func New() *Store { return &Store{} }

const Version = "1.0"
var cache int
"#;
        let symbols = GoAdapter.extract("store/store.go", source).unwrap();

        let store = find(&symbols, "Store");
        assert_eq!(store.kind, SymbolKind::Struct);
        assert_eq!(store.signature.as_deref(), Some("type Store struct"));
        assert_eq!(store.doc.as_deref(), Some("Store keeps things."));

        let get = find(&symbols, "Get");
        assert_eq!(get.kind, SymbolKind::Method);
        assert_eq!(get.enclosing.as_deref(), Some("Store"));
        assert_eq!(get.signature.as_deref(), Some("func (s *Store) Get(key string) string"));
        assert_eq!(get.doc.as_deref(), Some("Get returns a value."));

        assert_eq!(find(&symbols, "Reader").kind, SymbolKind::Interface);
        assert_eq!(find(&symbols, "Read").enclosing.as_deref(), Some("Reader"));
        assert_eq!(find(&symbols, "New").kind, SymbolKind::Function);
        assert_eq!(find(&symbols, "Version").kind, SymbolKind::Constant);
        assert_eq!(find(&symbols, "cache").kind, SymbolKind::Variable);
    }

    #[test]
    fn shell_functions_variables_and_aliases() {
        let source = "#!/bin/sh\n# Deploy the app.\ndeploy() {\n  echo hi\n}\nreadonly VERSION=1\nexport PATH_EXTRA=/opt\nalias ll='ls -l'\n";
        let symbols = ShellAdapter.extract("scripts/run.sh", source).unwrap();

        let deploy = find(&symbols, "deploy");
        assert_eq!(deploy.kind, SymbolKind::Function);
        assert_eq!(deploy.line, 3);
        assert_eq!(deploy.doc.as_deref(), Some("Deploy the app."));
        assert_eq!(find(&symbols, "VERSION").kind, SymbolKind::Constant);
        assert_eq!(find(&symbols, "PATH_EXTRA").kind, SymbolKind::Variable);
        assert_eq!(find(&symbols, "ll").kind, SymbolKind::CommandRegistration);
    }

    #[test]
    fn markdown_shell_fences_are_extracted_with_offsets() {
        let source = "# Setup\n\nRun this:\n\n```bash\nsetup() {\n  make\n}\n```\n\n```python\ndef ignored(): pass\n```\n";
        let symbols = MarkdownAdapter.extract("docs/setup.md", source).unwrap();

        assert_eq!(symbols.len(), 1, "{symbols:#?}");
        let setup = find(&symbols, "setup");
        assert_eq!(setup.kind, SymbolKind::Function);
        assert_eq!(setup.line, 6);
        assert_eq!(setup.file, "docs/setup.md");
    }

    #[test]
    fn unquote_handles_each_quote_style() {
        assert_eq!(unquote("'a'"), "a");
        assert_eq!(unquote("\"\"\"doc\"\"\""), "doc");
        assert_eq!(unquote("`t`"), "t");
        assert_eq!(unquote("bare"), "bare");
    }
}
