//! Core domain types for kiln.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies. Everything here can be used from any layer of the host.

mod text;
pub use text::{char_count, word_count};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Editor Mode
// ============================================================================

/// Mode flag of the host's source buffer.
///
/// The host owns the buffer; kiln only ever sees immutable snapshots of its
/// text together with this flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorMode {
    /// No classification; the whole buffer renders in the default class.
    #[default]
    PlainText,
    /// C-like source: keyword, literal, and comment classification applies.
    CLikeSource,
}

// ============================================================================
// Highlighting
// ============================================================================

/// Semantic color category assigned to a region of the buffer.
///
/// The keyword-backed variants are listed in the scan order of the keyword
/// table; the pattern-backed variants (`Literal`, `Comment`) are applied
/// afterwards and override keyword marks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorClass {
    #[default]
    Default,
    /// Variable-type keywords (`int`, `double`, ...).
    Type,
    /// Control-flow keywords (`if`, `while`, ...).
    Flow,
    /// Access modifiers and aggregate keywords (`public`, `class`, ...).
    Access,
    /// Standard-library identifiers (`std`, `cout`, ...).
    Std,
    /// Preprocessor directives (`#include`).
    Preproc,
    /// String literals and angle-bracket include targets.
    Literal,
    /// Line and block comments.
    Comment,
}

/// One classified region of the buffer, in byte offsets.
///
/// Spans for unclassified text may be omitted from a highlight result; the
/// gap implies [`ColorClass::Default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSpan {
    pub start: usize,
    pub len: usize,
    pub class: ColorClass,
}

impl HighlightSpan {
    #[must_use]
    pub fn new(start: usize, len: usize, class: ColorClass) -> Self {
        Self { start, len, class }
    }

    /// Byte offset one past the last byte of the span.
    #[must_use]
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// One parsed compiler message. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Source file name as reported by the toolchain.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// Free-text remainder of the diagnostic line.
    pub message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(file: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

// ============================================================================
// Build Artifact
// ============================================================================

/// Result of one compile attempt.
///
/// The paths are process-wide fixed temp names, overwritten on each compile.
/// Whether the binary still exists on disk is checked at run time by the
/// supervisor, not recorded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub source_path: PathBuf,
    pub binary_path: PathBuf,
    /// True iff the toolchain exited with status zero.
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
}

// ============================================================================
// Console Keys
// ============================================================================

/// Keystroke as seen by the console protocol.
///
/// Only the keys the protocol must arbitrate are modeled; everything else is
/// the host widget's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Left,
    Up,
    Copy,
    Cut,
    Paste,
    SelectAll,
}

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Recoverable failure conditions of the process supervisor.
///
/// A failed build is not an error: it yields a [`BuildArtifact`] with
/// `success = false` and whatever diagnostics could be parsed.
#[derive(Debug, Error)]
pub enum ToolchainError {
    /// The compiler executable could not be located or launched.
    #[error("toolchain '{name}' not found")]
    ToolchainNotFound { name: String },

    /// Temp file or directory could not be created, written, or deleted.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A run was requested while a run child is already live.
    #[error("a program is already running")]
    ProcessAlreadyRunning,

    /// Run requested with no successful compile, or the binary is gone.
    #[error("no compiled program available to run")]
    NoExecutableAvailable,

    /// Writing to the run child's stdin failed (child already exited).
    #[error("process is not running")]
    StdinWriteFailure,
}

impl ToolchainError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
