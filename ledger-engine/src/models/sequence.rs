//! Document kinds and serial number formats.

use serde::{Deserialize, Serialize};

/// Document kind, used to scope sequence counters and to tag
/// exchange-rate audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Payment,
    Estimate,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Payment => "payment",
            DocumentKind::Estimate => "estimate",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "payment" => DocumentKind::Payment,
            "estimate" => DocumentKind::Estimate,
            _ => DocumentKind::Invoice,
        }
    }
}

/// Resolved serial number format: configuration data, not logic.
/// A counter value renders as `{prefix}-{zero-padded value}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialNumberFormat {
    pub prefix: String,
    pub width: usize,
}

impl SerialNumberFormat {
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
        }
    }

    /// Render a counter value in this format, e.g. `INV-000042`.
    /// Values wider than `width` keep all their digits.
    pub fn render(&self, value: i64) -> String {
        format!("{}-{:0width$}", self.prefix, value, width = self.width)
    }
}
