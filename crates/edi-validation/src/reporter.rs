//! Validation reporter
//!
//! Collects the violations a [`Validator`](crate::Validator) emits over a
//! document into a [`ValidationResult`].

use crate::engine::ValidatorState;
use edi_ir::{Severity, Violation, ViolationKind};
use serde::Serialize;
use std::collections::BTreeMap;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// Whether validation passed
    pub is_valid: bool,
    /// Violations of `Error` or `Fatal` severity, in emission order
    pub errors: Vec<Violation>,
    /// Violations of `Warning` or `Info` severity, in emission order
    pub warnings: Vec<Violation>,
    /// Validator state when the result was produced
    pub state: ValidatorState,
}

impl ValidationResult {
    /// Create a new valid result
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            state: ValidatorState::AwaitingInterchange,
        }
    }

    /// Check if there are any errors
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Check if there are any warnings
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Whether a fatal violation halted validation
    #[must_use]
    pub fn halted(&self) -> bool {
        self.state == ValidatorState::Failed
    }

    /// Add a violation, routed by its severity
    pub fn add(&mut self, violation: Violation) {
        if violation.severity >= Severity::Error {
            self.errors.push(violation);
            self.is_valid = false;
        } else {
            self.warnings.push(violation);
        }
    }

    /// Every violation, errors first
    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.errors.iter().chain(&self.warnings)
    }

    /// Number of violations per kind
    #[must_use]
    pub fn count_by_kind(&self) -> BTreeMap<ViolationKind, usize> {
        let mut counts = BTreeMap::new();
        for violation in self.violations() {
            *counts.entry(violation.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Render the result as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::valid()
    }
}

/// Accumulates violations over one document
#[derive(Debug, Default)]
pub struct ValidationReporter {
    result: ValidationResult,
}

impl ValidationReporter {
    /// Create a new validation reporter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record violations returned by the validator
    pub fn record(&mut self, violations: impl IntoIterator<Item = Violation>) {
        for violation in violations {
            self.result.add(violation);
        }
    }

    /// Violations recorded so far
    #[must_use]
    pub fn result(&self) -> &ValidationResult {
        &self.result
    }

    /// Finish the report with the validator's final state
    #[must_use]
    pub fn finish(mut self, state: ValidatorState) -> ValidationResult {
        self.result.state = state;
        self.result
    }
}
