//! Change comparator: semantic diffs between symbol snapshots and file diffs
//! between checksum snapshots.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{FileChange, FileChangeType, SemanticChange, Severity, Symbol, SymbolChangeType};

/// Naming rule that decides whether a declaration is part of a public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Convention {
    /// Exported iff the first letter is uppercase (Go).
    Capitalized,
    /// Everything is public.
    Public,
    /// Private iff the name starts with `_` (or `#` for JS private fields).
    Underscore,
}

impl Convention {
    /// Apply the rule to one name.
    pub fn is_public(self, name: &str) -> bool {
        return match self {
            Self::Capitalized => name.chars().next().is_some_and(char::is_uppercase),
            Self::Public => true,
            Self::Underscore => !name.starts_with('_') && !name.starts_with('#'),
        };
    }
}

/// Extension → naming convention, with a fallback for unknown extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityPolicy {
    /// Lowercase extension without the dot → convention.
    by_extension: BTreeMap<String, Convention>,
    /// Used when no entry matches.
    fallback: Convention,
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        let underscore = [
            "bash", "cjs", "cts", "js", "jsx", "markdown", "md", "mjs", "mts", "py", "pyi", "rs", "sh", "ts", "tsx",
        ];
        let mut by_extension: BTreeMap<String, Convention> =
            underscore.iter().map(|ext| return ((*ext).to_string(), Convention::Underscore)).collect();
        by_extension.insert("go".to_string(), Convention::Capitalized);
        return Self { by_extension, fallback: Convention::Public };
    }
}

impl VisibilityPolicy {
    /// Convention in force for `file`.
    pub fn convention_for(&self, file: &str) -> Convention {
        let ext = Path::new(file).extension().and_then(|e| return e.to_str()).map(str::to_ascii_lowercase);
        return ext.and_then(|e| return self.by_extension.get(&e).copied()).unwrap_or(self.fallback);
    }

    /// Whether `symbol` is public under its file's convention.
    pub fn is_public(&self, symbol: &Symbol) -> bool {
        return self.convention_for(&symbol.file).is_public(&symbol.name);
    }

    /// The defaults with `overrides` layered on top.
    pub fn with_overrides(overrides: &BTreeMap<String, Convention>) -> Self {
        let mut policy = Self::default();
        for (ext, convention) in overrides {
            policy.by_extension.insert(ext.trim_start_matches('.').to_ascii_lowercase(), *convention);
        }
        return policy;
    }
}

/// File-level differences between two checksum maps (relative path → hash).
///
/// Callers apply the same exclude rules to both sides first, so paths that
/// became excluded do not surface as deletions.
pub fn compare_checksums(old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> Vec<FileChange> {
    let mut changes = Vec::new();
    for (file, hash) in new {
        let change_type = match old.get(file) {
            None => FileChangeType::Added,
            Some(previous) if previous != hash => FileChangeType::Modified,
            Some(_) => continue,
        };
        changes.push(FileChange { change_type, file: file.clone() });
    }
    for file in old.keys().filter(|f| return !new.contains_key(*f)) {
        changes.push(FileChange { change_type: FileChangeType::Deleted, file: file.clone() });
    }
    changes.sort_by(|a, b| return (&a.file, a.change_type).cmp(&(&b.file, b.change_type)));
    return changes;
}

/// Classified differences between two symbol snapshots.
///
/// Symbols are matched by `(name, file)`; when a snapshot holds duplicates of
/// one key, the first occurrence is the one compared. Output is ordered
/// breaking-first, then by file, line (removals count as line 0), and name.
pub fn compare_symbols(
    old: &BTreeMap<String, Vec<Symbol>>,
    new: &BTreeMap<String, Vec<Symbol>>,
    policy: &VisibilityPolicy,
) -> Vec<SemanticChange> {
    let old_index = index(old);
    let new_index = index(new);
    let mut changes = Vec::new();

    for (key, current) in &new_index {
        let Some(previous) = old_index.get(key) else {
            changes.push(change(current, SymbolChangeType::Added, None, Severity::NonBreaking));
            continue;
        };
        if previous.signature != current.signature {
            let severity = if policy.is_public(current) { Severity::Breaking } else { Severity::NonBreaking };
            changes.push(change(current, SymbolChangeType::SignatureChanged, Some(previous), severity));
        } else if previous.line != current.line || previous.enclosing != current.enclosing || previous.doc != current.doc {
            changes.push(change(current, SymbolChangeType::Modified, Some(previous), Severity::NonBreaking));
        }
    }

    for (key, previous) in &old_index {
        if new_index.contains_key(key) {
            continue;
        }
        changes.push(SemanticChange {
            change_type: SymbolChangeType::Removed,
            file: previous.file.clone(),
            line: None,
            name: previous.name.clone(),
            new_signature: None,
            old_signature: previous.signature.clone(),
            severity: Severity::Breaking,
            symbol_kind: previous.kind,
        });
    }

    changes.sort_by(|a, b| {
        let rank = |c: &SemanticChange| return c.severity != Severity::Breaking;
        return (rank(a), &a.file, a.line.unwrap_or(0), &a.name, a.change_type).cmp(&(
            rank(b),
            &b.file,
            b.line.unwrap_or(0),
            &b.name,
            b.change_type,
        ));
    });
    return changes;
}

/// A change describing `current`, optionally against its old version.
fn change(current: &Symbol, change_type: SymbolChangeType, previous: Option<&Symbol>, severity: Severity) -> SemanticChange {
    return SemanticChange {
        change_type,
        file: current.file.clone(),
        line: Some(current.line),
        name: current.name.clone(),
        new_signature: current.signature.clone(),
        old_signature: previous.and_then(|p| return p.signature.clone()),
        severity,
        symbol_kind: current.kind,
    };
}

/// `(name, file)` → first symbol with that identity.
fn index(snapshot: &BTreeMap<String, Vec<Symbol>>) -> BTreeMap<(&str, &str), &Symbol> {
    let mut lookup = BTreeMap::new();
    for symbol in snapshot.values().flatten() {
        lookup.entry((symbol.name.as_str(), symbol.file.as_str())).or_insert(symbol);
    }
    return lookup;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SymbolKind;

    fn sym(name: &str, file: &str, line: u32, signature: &str) -> Symbol {
        return Symbol {
            column: 0,
            doc: None,
            enclosing: None,
            file: file.to_string(),
            kind: SymbolKind::Function,
            line,
            name: name.to_string(),
            signature: Some(signature.to_string()),
        };
    }

    fn snapshot(symbols: Vec<Symbol>) -> BTreeMap<String, Vec<Symbol>> {
        let mut map: BTreeMap<String, Vec<Symbol>> = BTreeMap::new();
        for s in symbols {
            map.entry(s.file.clone()).or_default().push(s);
        }
        return map;
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let b = snapshot(vec![sym("a", "x.py", 1, "a()"), sym("b", "y.go", 4, "b()")]);
        assert!(compare_symbols(&b, &b, &VisibilityPolicy::default()).is_empty());

        let c: BTreeMap<String, String> = [("f.txt".to_string(), "h".to_string())].into();
        assert!(compare_checksums(&c, &c).is_empty());
    }

    #[test]
    fn public_signature_change_is_breaking() {
        let old = snapshot(vec![sym("doThing", "a.py", 3, "doThing(x)")]);
        let new = snapshot(vec![sym("doThing", "a.py", 3, "doThing(x, y)")]);
        let changes = compare_symbols(&old, &new, &VisibilityPolicy::default());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, SymbolChangeType::SignatureChanged);
        assert_eq!(changes[0].severity, Severity::Breaking);
        assert_eq!(changes[0].old_signature.as_deref(), Some("doThing(x)"));
        assert_eq!(changes[0].new_signature.as_deref(), Some("doThing(x, y)"));
    }

    #[test]
    fn private_signature_change_is_non_breaking() {
        let old = snapshot(vec![sym("_doThing", "a.py", 3, "_doThing(x)")]);
        let new = snapshot(vec![sym("_doThing", "a.py", 3, "_doThing(x, y)")]);
        let changes = compare_symbols(&old, &new, &VisibilityPolicy::default());
        assert_eq!(changes[0].change_type, SymbolChangeType::SignatureChanged);
        assert_eq!(changes[0].severity, Severity::NonBreaking);
    }

    #[test]
    fn removal_has_no_line_or_new_signature() {
        let old = snapshot(vec![sym("old", "a.py", 12, "old()")]);
        let changes = compare_symbols(&old, &BTreeMap::new(), &VisibilityPolicy::default());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, SymbolChangeType::Removed);
        assert_eq!(changes[0].line, None);
        assert_eq!(changes[0].new_signature, None);
        assert_eq!(changes[0].old_signature.as_deref(), Some("old()"));
        assert_eq!(changes[0].severity, Severity::Breaking);
    }

    #[test]
    fn added_and_removed_come_out_breaking_first() {
        let old = snapshot(vec![sym("func1", "a.py", 1, "func1()")]);
        let new = snapshot(vec![sym("func2", "a.py", 1, "func2()")]);
        let changes = compare_symbols(&old, &new, &VisibilityPolicy::default());

        let summary: Vec<_> = changes.iter().map(|c| (c.name.as_str(), c.change_type, c.severity)).collect();
        assert_eq!(
            summary,
            vec![
                ("func1", SymbolChangeType::Removed, Severity::Breaking),
                ("func2", SymbolChangeType::Added, Severity::NonBreaking),
            ]
        );
    }

    #[test]
    fn moved_or_redocumented_symbol_is_modified() {
        let old = snapshot(vec![sym("f", "a.rs", 1, "fn f()")]);
        let mut moved = sym("f", "a.rs", 7, "fn f()");
        moved.doc = Some("Now documented.".to_string());
        let changes = compare_symbols(&old, &snapshot(vec![moved]), &VisibilityPolicy::default());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, SymbolChangeType::Modified);
        assert_eq!(changes[0].severity, Severity::NonBreaking);
        assert_eq!(changes[0].line, Some(7));
    }

    #[test]
    fn ordering_is_breaking_then_file_then_line() {
        let old = snapshot(vec![
            sym("gone", "b.py", 30, "gone()"),
            sym("api", "a.py", 20, "api(x)"),
            sym("moved", "a.py", 1, "moved()"),
        ]);
        let new = snapshot(vec![
            sym("api", "a.py", 20, "api(x, y)"),
            sym("moved", "a.py", 2, "moved()"),
            sym("fresh", "a.py", 5, "fresh()"),
        ]);
        let changes = compare_symbols(&old, &new, &VisibilityPolicy::default());
        let names: Vec<_> = changes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["api", "gone", "moved", "fresh"]);

        assert_eq!(changes, compare_symbols(&old, &new, &VisibilityPolicy::default()));
    }

    #[test]
    fn duplicate_keys_compare_first_occurrence() {
        let old = snapshot(vec![sym("x", "a.sh", 1, "x()"), sym("x", "a.sh", 9, "x(other)")]);
        let new = snapshot(vec![sym("x", "a.sh", 1, "x()")]);
        assert!(compare_symbols(&old, &new, &VisibilityPolicy::default()).is_empty());
    }

    #[test]
    fn go_uses_capitalization_and_unknown_defaults_public() {
        let policy = VisibilityPolicy::default();
        assert!(policy.is_public(&sym("Handler", "srv/h.go", 1, "")));
        assert!(!policy.is_public(&sym("handler", "srv/h.go", 1, "")));
        assert!(policy.is_public(&sym("_anything", "build.zig", 1, "")));
        assert!(!policy.is_public(&sym("#secret", "a.ts", 1, "")));
    }

    #[test]
    fn overrides_replace_per_extension_conventions() {
        let overrides: BTreeMap<String, Convention> = [(".py".to_string(), Convention::Public)].into();
        let policy = VisibilityPolicy::with_overrides(&overrides);
        assert!(policy.is_public(&sym("_hidden", "a.py", 1, "")));
        assert_eq!(policy.convention_for("main.go"), Convention::Capitalized);
    }

    #[test]
    fn checksum_changes_cover_each_kind() {
        let old: BTreeMap<String, String> =
            [("file.txt".to_string(), "h1".to_string()), ("gone.txt".to_string(), "g".to_string())].into();
        let new: BTreeMap<String, String> =
            [("file.txt".to_string(), "h2".to_string()), ("new.txt".to_string(), "n".to_string())].into();
        assert_eq!(
            compare_checksums(&old, &new),
            vec![
                FileChange { change_type: FileChangeType::Modified, file: "file.txt".into() },
                FileChange { change_type: FileChangeType::Deleted, file: "gone.txt".into() },
                FileChange { change_type: FileChangeType::Added, file: "new.txt".into() },
            ]
        );
    }
}
