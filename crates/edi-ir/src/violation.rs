//! Validation outcomes reported while reading a document
#![allow(clippy::must_use_candidate)] // Constructor helpers are clear at call sites without #[must_use].

use crate::location::Location;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified validation violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    /// Tag defined by the schema, but not acceptable at this position
    UnexpectedSegment,
    /// Tag the schema does not define anywhere
    SegmentNotInSchema,
    /// A loop occurrence beyond its maximum
    LoopOccursTooManyTimes,
    /// A segment occurrence beyond its maximum
    SegmentExceedsMaximumUse,
    /// A required segment did not occur often enough
    RequiredSegmentMissing,
    /// A required loop did not occur often enough
    RequiredLoopMissing,
    /// A required element or component has no value
    RequiredElementMissing,
    /// More elements than the segment declares
    TooManyDataElements,
    /// More components than the composite declares
    TooManyComponents,
    /// More repetitions than the element allows
    TooManyRepetitions,
    TooShort,
    TooLong,
    InvalidCodeValue,
    InvalidDateOrTimeOrNumber,
    /// Discriminator value matches no alternative implementation
    UnresolvedImplementation,
    /// Schema defect detected while binding the schema
    AmbiguousSchemaDefinition,
}

impl ViolationKind {
    /// Whether the violation concerns the segment/loop structure
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Self::UnexpectedSegment
                | Self::SegmentNotInSchema
                | Self::LoopOccursTooManyTimes
                | Self::SegmentExceedsMaximumUse
                | Self::RequiredSegmentMissing
                | Self::RequiredLoopMissing
                | Self::UnresolvedImplementation
        )
    }

    /// Stable code, matching the serialized form
    pub fn code(self) -> &'static str {
        match self {
            Self::UnexpectedSegment => "UNEXPECTED_SEGMENT",
            Self::SegmentNotInSchema => "SEGMENT_NOT_IN_SCHEMA",
            Self::LoopOccursTooManyTimes => "LOOP_OCCURS_TOO_MANY_TIMES",
            Self::SegmentExceedsMaximumUse => "SEGMENT_EXCEEDS_MAXIMUM_USE",
            Self::RequiredSegmentMissing => "REQUIRED_SEGMENT_MISSING",
            Self::RequiredLoopMissing => "REQUIRED_LOOP_MISSING",
            Self::RequiredElementMissing => "REQUIRED_ELEMENT_MISSING",
            Self::TooManyDataElements => "TOO_MANY_DATA_ELEMENTS",
            Self::TooManyComponents => "TOO_MANY_COMPONENTS",
            Self::TooManyRepetitions => "TOO_MANY_REPETITIONS",
            Self::TooShort => "TOO_SHORT",
            Self::TooLong => "TOO_LONG",
            Self::InvalidCodeValue => "INVALID_CODE_VALUE",
            Self::InvalidDateOrTimeOrNumber => "INVALID_DATE_OR_TIME_OR_NUMBER",
            Self::UnresolvedImplementation => "UNRESOLVED_IMPLEMENTATION",
            Self::AmbiguousSchemaDefinition => "AMBIGUOUS_SCHEMA_DEFINITION",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Severity level for validation messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

/// A single validation outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Violation classification
    pub kind: ViolationKind,

    /// Severity assigned by the validator configuration
    pub severity: Severity,

    /// Where the violation occurred
    pub location: Location,

    /// Offending raw value, if the violation concerns data
    pub value: Option<String>,

    /// Human-readable message
    pub message: String,
}

impl Violation {
    /// Create a new violation with `Error` severity
    pub fn new(kind: ViolationKind, location: Location, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            location,
            value: None,
            message: message.into(),
        }
    }

    /// Attach the offending value
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Override the severity
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Whether the violation halts validation
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.location, self.message)?;
        if let Some(value) = &self.value {
            write!(f, " (value '{value}')")?;
        }
        Ok(())
    }
}
