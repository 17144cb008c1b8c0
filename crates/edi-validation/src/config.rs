//! Validation configuration

use crate::{Error, Result};
use edi_ir::{Severity, ViolationKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Strictness level for validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrictnessLevel {
    /// Strict: every structural violation halts validation
    Strict,
    /// Moderate: only segments unknown to the schema halt validation
    #[default]
    Moderate,
    /// Lenient: nothing halts validation; unknown segments are skipped
    Lenient,
}

impl StrictnessLevel {
    /// Whether `kind` is fatal at this level by default
    #[must_use]
    pub fn is_fatal(self, kind: ViolationKind) -> bool {
        match self {
            Self::Strict => kind.is_structural(),
            Self::Moderate => kind == ViolationKind::SegmentNotInSchema,
            Self::Lenient => false,
        }
    }
}

/// Validation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Strictness level
    pub strictness: StrictnessLevel,
    /// Continue validation after errors (collect all)
    pub continue_on_error: bool,
    /// Maximum errors before stopping (0 = unlimited)
    pub max_errors: usize,
    /// Additional violation kinds that halt validation
    pub fatal: BTreeSet<ViolationKind>,
    /// Violation kinds reported as warnings, never halting
    pub ignorable: BTreeSet<ViolationKind>,
    /// Check values against enumerated code sets
    pub validate_code_values: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strictness: StrictnessLevel::Moderate,
            continue_on_error: true,
            max_errors: 0,
            fatal: BTreeSet::new(),
            ignorable: BTreeSet::new(),
            validate_code_values: true,
        }
    }
}

impl ValidationConfig {
    /// Configuration for a strictness level, other settings defaulted
    #[must_use]
    pub fn with_strictness(strictness: StrictnessLevel) -> Self {
        Self {
            strictness,
            ..Self::default()
        }
    }

    /// Mark a violation kind as fatal
    #[must_use]
    pub fn fatal(mut self, kind: ViolationKind) -> Self {
        self.fatal.insert(kind);
        self
    }

    /// Mark a violation kind as ignorable
    #[must_use]
    pub fn ignore(mut self, kind: ViolationKind) -> Self {
        self.ignorable.insert(kind);
        self
    }

    /// Severity assigned to a violation of `kind`.
    ///
    /// Ignorable kinds are warnings regardless of any other setting.
    #[must_use]
    pub fn severity_of(&self, kind: ViolationKind) -> Severity {
        if self.ignorable.contains(&kind) {
            Severity::Warning
        } else if self.fatal.contains(&kind)
            || self.strictness.is_fatal(kind)
            || !self.continue_on_error
        {
            Severity::Fatal
        } else {
            Severity::Error
        }
    }

    /// Parse a configuration from YAML
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the document does not describe a configuration.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("YAML parse error: {e}")))
    }

    /// Parse a configuration from JSON
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the document does not describe a configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("JSON parse error: {e}")))
    }
}
