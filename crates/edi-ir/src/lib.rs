#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # edi-ir
//!
//! Shared vocabulary of the EDI validator.
//!
//! This crate holds the structural events a tokenizer hands to the
//! validator, the coordinates used to address data inside a segment, and
//! the classified violations the validator reports back.

/// Structural events produced by a tokenizer.
pub mod event;
/// Element positions and stream locations.
pub mod location;
/// Violation kinds, severities and outcomes.
pub mod violation;

/// Stream event primitives.
pub use event::{ElementValue, StreamEvent};
/// Coordinates within segments and the stream.
pub use location::{ElementPosition, Location};
/// Validation outcome types.
pub use violation::{Severity, Violation, ViolationKind};

use thiserror::Error;

/// Errors that can occur when working with the IR
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid element position {element}: {reason}")]
    InvalidPosition { element: usize, reason: String },
}

impl Error {
    /// Build an invalid-position error with reason.
    pub fn invalid_position(element: usize, reason: impl Into<String>) -> Self {
        Self::InvalidPosition {
            element,
            reason: reason.into(),
        }
    }
}

/// Crate-local result type for IR operations.
pub type Result<T> = std::result::Result<T, Error>;
