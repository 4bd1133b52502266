//! Symbol baselines: persisted snapshots of extracted declarations.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lock::BaselineLock;
use crate::persist::{self, Provenance, StagedWrite};
use crate::types::Symbol;

/// Schema version written into new symbol baselines.
pub const SCHEMA_VERSION: &str = "1.0";

/// Every symbol in a project at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolBaseline {
    /// First time a baseline was written at this location.
    pub created_at: String,
    /// Project root the snapshot was taken from.
    pub project_root: String,
    /// Document format version.
    pub schema_version: String,
    /// Relative file → symbols declared in it.
    pub symbols: BTreeMap<String, Vec<Symbol>>,
    /// When this snapshot was last saved.
    pub updated_at: String,
}

impl SymbolBaseline {
    /// A fresh, unsaved baseline.
    pub fn new(project_root: &Path, symbols: BTreeMap<String, Vec<Symbol>>) -> Self {
        return Self {
            created_at: String::new(),
            project_root: project_root.to_string_lossy().into_owned(),
            schema_version: SCHEMA_VERSION.to_string(),
            symbols,
            updated_at: String::new(),
        };
    }

    /// Total number of symbols across all files.
    pub fn symbol_count(&self) -> usize {
        return self.symbols.values().map(Vec::len).sum();
    }
}

impl Provenance for SymbolBaseline {
    fn stamp(&mut self, created_at: Option<String>, now: &str) {
        self.created_at = created_at
            .or_else(|| return Some(self.created_at.clone()).filter(|c| return !c.is_empty()))
            .unwrap_or_else(|| return now.to_string());
        self.updated_at = now.to_string();
    }
}

/// Load a symbol baseline, dropping individual records that do not decode.
///
/// An absent file, or one whose top level is not a baseline document, comes
/// back as `None`.
///
/// # Errors
///
/// Returns `Error::Io` for read failures other than not-found.
pub fn load(path: &Path) -> Result<Option<SymbolBaseline>> {
    let Some(value) = persist::load_json::<serde_json::Value>(path)? else {
        return Ok(None);
    };
    return match decode(&value) {
        Err(e) => {
            tracing::warn!(error = %e, "symbol baseline is unusable; treating as absent");
            Ok(None)
        },
        Ok(baseline) => Ok(Some(baseline)),
    };
}

/// Atomically save a symbol baseline under its lock, preserving `createdAt`.
///
/// # Errors
///
/// Returns `Error::ConcurrencyError`, `Error::SerializationError`, or `Error::Io`.
pub fn save(path: &Path, baseline: &mut SymbolBaseline, lock_timeout: Duration) -> Result<()> {
    return persist::save_json(path, baseline, lock_timeout);
}

/// Stamp and stage a symbol baseline for the locked target.
///
/// # Errors
///
/// Returns `Error::SerializationError` or `Error::Io`.
pub fn stage(lock: &BaselineLock, baseline: &mut SymbolBaseline) -> Result<StagedWrite> {
    return persist::stage_json(lock, baseline);
}

/// Build a baseline from raw JSON, one record at a time.
///
/// # Errors
///
/// Returns `Error::SerializationError` when the document shape itself is wrong.
fn decode(value: &serde_json::Value) -> Result<SymbolBaseline> {
    let document = value.as_object().ok_or_else(|| return malformed("top level is not an object"))?;
    let text = |key: &str| -> String {
        return document.get(key).and_then(serde_json::Value::as_str).unwrap_or_default().to_string();
    };
    let files = document
        .get("symbols")
        .and_then(serde_json::Value::as_object)
        .ok_or_else(|| return malformed("missing `symbols` object"))?;

    let mut symbols: BTreeMap<String, Vec<Symbol>> = BTreeMap::new();
    let mut dropped = 0_usize;
    for (file, records) in files {
        let Some(records) = records.as_array() else {
            tracing::warn!(file = %file, "symbol list is not an array; dropping file entry");
            dropped = dropped.saturating_add(1);
            continue;
        };
        let decoded: Vec<Symbol> = records
            .iter()
            .filter_map(|record| match serde_json::from_value::<Symbol>(record.clone()) {
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "dropping corrupt symbol record");
                    dropped = dropped.saturating_add(1);
                    return None;
                },
                Ok(symbol) => return Some(symbol),
            })
            .collect();
        symbols.insert(file.clone(), decoded);
    }
    if dropped > 0 {
        tracing::info!(dropped, "symbol baseline loaded with corrupt records removed");
    }

    let schema_version = Some(text("schemaVersion")).filter(|v| return !v.is_empty());
    return Ok(SymbolBaseline {
        created_at: text("createdAt"),
        project_root: text("projectRoot"),
        schema_version: schema_version.unwrap_or_else(|| return SCHEMA_VERSION.to_string()),
        symbols,
        updated_at: text("updatedAt"),
    });
}

/// `SerializationError` for the symbol baseline document.
fn malformed(reason: &str) -> Error {
    return Error::SerializationError { file: "symbol-baseline.json".to_string(), reason: reason.to_string() };
}
