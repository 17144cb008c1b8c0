#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # edi-validation
//!
//! Streaming validation of EDI interchanges against a bound schema.
//!
//! A [`Validator`] consumes tokenizer events one at a time and reports
//! structural violations (segment order, occurrence bounds, unresolved
//! implementations) and value violations (length, code sets, lexical form)
//! as soon as they can be decided.
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use edi_ir::StreamEvent;
//! use edi_schema::{BaseKind, ElementReference, LoopType, Reference, Schema, SegmentType, SimpleType};
//! use edi_validation::{ValidationConfig, validate_events};
//!
//! let name = Arc::new(SimpleType::builder("E93", BaseKind::String).length(1, 35).build().unwrap());
//! let n1 = SegmentType::new("N1").with_element(ElementReference::simple(name).required());
//! let root = LoopType::new("ROOT").with_child(Reference::to_segment(Arc::new(n1)).required());
//! let schema = Arc::new(Schema::bind("DEMO", Arc::new(root)).unwrap());
//!
//! let mut events = vec![StreamEvent::InterchangeStart { version: None }];
//! events.extend(StreamEvent::segment("N1", &["ACME"]));
//! events.push(StreamEvent::InterchangeEnd);
//!
//! let result = validate_events(schema, ValidationConfig::default(), &events).unwrap();
//! assert!(result.is_valid);
//! ```

pub mod config;
pub mod engine;
pub mod reporter;
pub mod rules;

// Re-export main types
pub use config::{StrictnessLevel, ValidationConfig};
pub use engine::{Validator, ValidatorState};
pub use reporter::{ValidationReporter, ValidationResult};
pub use rules::{RuleFailure, check_value};

use edi_ir::StreamEvent;
use edi_schema::Schema;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during validation
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unexpected {event} while {state}")]
    UnexpectedEvent {
        event: &'static str,
        state: ValidatorState,
    },

    #[error("Validation is over ({0}); reset the validator first")]
    Halted(ValidatorState),

    #[error("Schema error: {0}")]
    Schema(#[from] edi_schema::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Validate a complete event stream with a fresh validator.
///
/// The interchange version is taken from the `InterchangeStart` event.
/// Events after a fatal violation are not processed.
///
/// # Errors
///
/// Returns an error when the events are not a well-formed stream.
pub fn validate_events<'a>(
    schema: Arc<Schema>,
    config: ValidationConfig,
    events: impl IntoIterator<Item = &'a StreamEvent>,
) -> Result<ValidationResult> {
    let mut validator = Validator::with_config(schema, config);
    let mut reporter = ValidationReporter::new();

    for event in events {
        reporter.record(validator.handle(event)?);
        if validator.state() == ValidatorState::Failed {
            debug!("Stopping after fatal violation");
            break;
        }
    }

    Ok(reporter.finish(validator.state()))
}
