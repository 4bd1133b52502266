//! Baseline snapshots and semantic change detection for source trees.
//!
//! `driftline` records two baselines for a project root: content hashes of
//! every tracked file and the declaration-level symbols tree-sitter finds in
//! them. Later runs compare the tree against those baselines and classify
//! what changed, with breaking signature changes reported first.

pub mod boundary;
pub mod checksum;
pub mod compare;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod exclude;
pub mod extractor;
pub mod governor;
pub mod grammar;
pub mod languages;
pub mod lock;
pub mod persist;
pub mod symbols;
pub mod types;
pub mod vcs;
pub mod walker;

pub use crate::engine::{BaselineSummary, Engine};
pub use crate::error::{Error, Result};
