//! Non-fatal findings collected while converting one file.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Address;

/// Pipeline stage that produced a diagnostic or error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Container header parsing.
    Container,
    /// Source table location and decoding.
    Extraction,
    /// Source-to-target model mapping.
    Transformation,
    /// Target image assembly, relocation and self-check.
    Packing,
    /// Accuracy validation.
    Validation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Container => "container",
            Stage::Extraction => "extraction",
            Stage::Transformation => "transformation",
            Stage::Packing => "packing",
            Stage::Validation => "validation",
        };
        f.write_str(name)
    }
}

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational note (e.g. which layout resolution tier was used).
    Info,
    /// Data was clamped, dropped or substituted.
    Warning,
}

/// One recorded finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stage that recorded it.
    pub stage: Stage,
    /// Severity.
    pub severity: Severity,
    /// Address involved, when there is one.
    pub address: Option<Address>,
    /// Human readable description.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            Some(addr) => write!(f, "[{}] {} at {}", self.stage, self.message, addr),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

/// Ordered diagnostics log, moved forward with each stage's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and emit it as a tracing event.
    pub fn warn(&mut self, stage: Stage, address: Option<Address>, message: impl Into<String>) {
        self.push(stage, Severity::Warning, address, message.into());
    }

    /// Record an informational note and emit it as a tracing event.
    pub fn info(&mut self, stage: Stage, address: Option<Address>, message: impl Into<String>) {
        self.push(stage, Severity::Info, address, message.into());
    }

    fn push(&mut self, stage: Stage, severity: Severity, address: Option<Address>, message: String) {
        let entry = Diagnostic {
            stage,
            severity,
            address,
            message,
        };
        match severity {
            Severity::Warning => tracing::warn!(%stage, "{entry}"),
            Severity::Info => tracing::debug!(%stage, "{entry}"),
        }
        self.entries.push(entry);
    }

    /// Append every entry of `other`.
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// All entries in recording order.
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Warnings only.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// Whether any entry mentions `needle` (case-sensitive).
    pub fn mentions(&self, needle: &str) -> bool {
        self.entries.iter().any(|d| d.message.contains(needle))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
