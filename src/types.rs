/// Core domain types shared by the extractor, stores, and comparator.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kind of a change produced by a checksum or revision comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeType {
    /// Present now, absent from the old side.
    Added,
    /// Present in the old side, gone now.
    Deleted,
    /// Present on both sides with different content.
    Modified,
}

/// A file-level difference between a baseline and the current tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    /// What happened to the file.
    pub change_type: FileChangeType,
    /// Project-relative, forward-slash path.
    pub file: String,
}

/// A classified difference between two symbol snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticChange {
    /// What happened to the symbol.
    pub change_type: SymbolChangeType,
    /// Project-relative file holding the symbol.
    pub file: String,
    /// Line in the new snapshot; `None` when the symbol was removed.
    pub line: Option<u32>,
    /// Symbol name.
    pub name: String,
    /// Signature on the new side, if any.
    pub new_signature: Option<String>,
    /// Signature on the old side, if any.
    pub old_signature: Option<String>,
    /// Inferred impact on callers.
    pub severity: Severity,
    /// Kind of the symbol (new side when both exist).
    pub symbol_kind: SymbolKind,
}

/// Inferred impact of a semantic change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    /// Callers relying on the old shape may break.
    Breaking,
    /// Additive or internal change.
    NonBreaking,
    /// Impact could not be inferred.
    Unknown,
}

/// One declaration-level entity found in a source file.
///
/// Identity within a snapshot is `(name, file)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    /// Zero-based column of the declaration start.
    #[serde(default)]
    pub column: u32,
    /// Documentation attached to the declaration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    /// Enclosing type name for methods and members.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing: Option<String>,
    /// Project-relative, forward-slash path of the declaring file.
    pub file: String,
    /// What sort of declaration this is.
    pub kind: SymbolKind,
    /// One-based line of the declaration start.
    pub line: u32,
    /// Declared name.
    pub name: String,
    /// Whitespace-normalized declaration header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Kind of a semantic change between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SymbolChangeType {
    /// Only in the new snapshot.
    Added,
    /// Same signature, different line, enclosing scope, or documentation.
    Modified,
    /// Only in the old snapshot.
    Removed,
    /// Present in both with a different signature.
    SignatureChanged,
}

/// Declaration kinds recognized by the grammar adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolKind {
    /// Class, enum, or other nominal type with members.
    ClassLike,
    /// A CLI/editor command registered at runtime.
    CommandRegistration,
    /// Module-level constant.
    Constant,
    /// Free function.
    Function,
    /// Interface, protocol, or trait.
    Interface,
    /// Function defined inside a type.
    Method,
    /// Plain record type.
    Struct,
    /// Type alias.
    TypeAlias,
    /// Module-level mutable binding.
    Variable,
}

/// A file yielded by the enumerator, already validated against the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Canonical absolute location on disk.
    pub absolute: PathBuf,
    /// Project-relative, forward-slash path used as the baseline key.
    pub relative: String,
}
